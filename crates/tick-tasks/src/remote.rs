//! Capability seam to the remote task engine.
//!
//! A [`Connector`] turns endpoint settings into an [`EngineConnection`]; the
//! connection exposes exactly the task operations the client needs. The
//! in-memory engine in [`crate::memory`] is one implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tick_config::KapacitorConfig;
use tick_lang::TaskType;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Resource locator returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            rel: "self".to_string(),
            href: href.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Enabled,
    Disabled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Enabled => "enabled",
            TaskStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database / retention-policy pair a task reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dbrp {
    pub db: String,
    pub rp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    pub link: Link,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub dbrps: Vec<Dbrp>,
    /// Empty when the listing did not ask for it.
    #[serde(default)]
    pub script: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskOptions {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub dbrps: Vec<Dbrp>,
    pub script: String,
    pub status: TaskStatus,
}

/// Only the fields that are set are changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskOptions {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dbrps: Vec<Dbrp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl UpdateTaskOptions {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// `fields` restricts which task fields come back; empty means all.
/// `id` and `link` are always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListTasksOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("no task at {0}")]
    NoSuchTask(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// One live handle to the engine's task API.
#[async_trait]
pub trait EngineConnection: Send + Sync {
    async fn create_task(&self, opts: CreateTaskOptions) -> Result<RemoteTask, RemoteError>;

    async fn task(&self, link: &Link) -> Result<RemoteTask, RemoteError>;

    async fn list_tasks(&self, opts: &ListTasksOptions) -> Result<Vec<RemoteTask>, RemoteError>;

    async fn update_task(
        &self,
        link: &Link,
        opts: UpdateTaskOptions,
    ) -> Result<RemoteTask, RemoteError>;

    async fn delete_task(&self, link: &Link) -> Result<(), RemoteError>;
}

/// Opens connections. Injected into the client at construction.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &KapacitorConfig,
    ) -> Result<Arc<dyn EngineConnection>, RemoteError>;
}
