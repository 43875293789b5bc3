//! Task repository client.
//!
//! Keeps alert rules and the engine's tasks in step: rules are rendered
//! with [`TickGenerator`] on the way out and rebuilt with [`reverse`] on
//! the way in. Every operation opens its own connection through the
//! injected [`Connector`] and can be cancelled through its token.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use orion_error::prelude::*;
use tick_config::KapacitorConfig;
use tick_lang::{AlertRule, HTTP_ENDPOINT, ReverseError, Script, TickGenerator, reverse};
use tokio_util::sync::CancellationToken;

use crate::error::{TaskError, TaskReason, TaskResult};
use crate::id::{IdGenerator, UuidGenerator};
use crate::remote::{
    Connector, CreateTaskOptions, Dbrp, EngineConnection, Link, ListTasksOptions, RemoteError,
    RemoteTask, TaskStatus, UpdateTaskOptions,
};

/// Prepended to every task id this client creates.
pub const PREFIX: &str = "chronograf-v1-";

/// Primary link of the task with `id`.
pub fn href(id: &str) -> String {
    format!("/kapacitor/v1/tasks/{id}")
}

/// Link to the alerts a task emits through its `httpOut` node.
pub fn href_output(id: &str) -> String {
    format!("/kapacitor/v1/tasks/{id}/{HTTP_ENDPOINT}")
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A task as seen from this side: the engine's view plus the rule it encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub href: String,
    pub href_output: String,
    pub status: TaskStatus,
    pub rule: AlertRule,
    pub script: Script,
}

// ---------------------------------------------------------------------------
// TaskClient
// ---------------------------------------------------------------------------

pub struct TaskClient {
    endpoint: KapacitorConfig,
    connector: Arc<dyn Connector>,
    ids: Arc<dyn IdGenerator>,
    generator: TickGenerator,
}

impl TaskClient {
    /// Client with UUID task ids and default script output settings.
    pub fn new(endpoint: KapacitorConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            endpoint,
            connector,
            ids: Arc::new(UuidGenerator),
            generator: TickGenerator::default(),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_generator(mut self, generator: TickGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn href(&self, id: &str) -> String {
        href(id)
    }

    pub fn href_output(&self, id: &str) -> String {
        href_output(id)
    }

    /// Render `rule` and create it as a new, enabled task.
    #[tracing::instrument(name = "tasks.create", skip_all, fields(rule = %rule.name))]
    pub async fn create(&self, cancel: &CancellationToken, rule: &AlertRule) -> TaskResult<Task> {
        let kapa = self.connect(cancel).await?;

        let id = self.ids.generate().map_err(|e| {
            StructError::from(TaskReason::IdGeneration).with_detail(format!("generate task id: {e}"))
        })?;
        let script = self.render(rule)?;
        let kapa_id = format!("{PREFIX}{id}");

        let opts = CreateTaskOptions {
            id: kapa_id.clone(),
            task_type: rule.task_type(),
            dbrps: dbrps(rule),
            script: script.to_string(),
            status: TaskStatus::Enabled,
        };
        let task = race(cancel, "create task", kapa.create_task(opts))
            .await?
            .map_err(|e| remote_error("create task", e))?;

        tick_info!(remote, id = %kapa_id, task_type = %rule.task_type(), "task created");
        Ok(Task {
            href: task.link.href,
            href_output: href_output(&kapa_id),
            status: task.status,
            rule: reconstruct(&kapa_id, &script),
            script,
            id: kapa_id,
        })
    }

    /// Remove the task at `href`.
    #[tracing::instrument(name = "tasks.delete", skip_all, fields(href = %href))]
    pub async fn delete(&self, cancel: &CancellationToken, href: &str) -> TaskResult<()> {
        let kapa = self.connect(cancel).await?;
        race(cancel, "delete task", kapa.delete_task(&Link::new(href)))
            .await?
            .map_err(|e| remote_error("delete task", e))?;
        tick_info!(remote, href = %href, "task deleted");
        Ok(())
    }

    /// Replace the script of the task at `href`.
    ///
    /// The engine only accepts structural changes on a disabled task, so the
    /// update is sent with the task disabled and a second request enables it
    /// again. If that second request fails the new script is already in
    /// place and the task stays disabled; the returned error says so. No
    /// rollback is attempted.
    #[tracing::instrument(name = "tasks.update", skip_all, fields(href = %href, rule = %rule.name))]
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        href: &str,
        rule: &AlertRule,
    ) -> TaskResult<Task> {
        let kapa = self.connect(cancel).await?;
        let script = self.render(rule)?;
        let link = Link::new(href);

        let opts = UpdateTaskOptions {
            task_type: Some(rule.task_type()),
            dbrps: dbrps(rule),
            script: Some(script.to_string()),
            status: Some(TaskStatus::Disabled),
        };
        let updated = race(cancel, "update task", kapa.update_task(&link, opts))
            .await?
            .map_err(|e| remote_error("update task", e))?;
        tick_debug!(remote, id = %updated.id, "task updated, re-enabling");

        let left_disabled = format!("task {} was updated and left disabled", updated.id);
        let enable = kapa.update_task(&link, UpdateTaskOptions::status(TaskStatus::Enabled));
        let enabled = race(cancel, "enable task", enable)
            .await
            .map_err(|e| e.with_detail(format!("cancelled before re-enabling; {left_disabled}")))?
            .map_err(|e| {
                tick_warn!(remote, id = %updated.id, error = %e, "task updated but left disabled");
                StructError::from(TaskReason::RemoteRequest)
                    .with_detail(format!("enable task: {e}; {left_disabled}"))
            })?;

        Ok(Task {
            href: enabled.link.href,
            href_output: href_output(&enabled.id),
            status: enabled.status,
            rule: reconstruct(&enabled.id, &script),
            script,
            id: enabled.id,
        })
    }

    /// Enable the task at `href`. Only `status` and the links of the result
    /// are authoritative.
    #[tracing::instrument(name = "tasks.enable", skip_all, fields(href = %href))]
    pub async fn enable(&self, cancel: &CancellationToken, href: &str) -> TaskResult<Task> {
        self.update_status(cancel, href, TaskStatus::Enabled).await
    }

    /// Disable the task at `href`. Only `status` and the links of the result
    /// are authoritative.
    #[tracing::instrument(name = "tasks.disable", skip_all, fields(href = %href))]
    pub async fn disable(&self, cancel: &CancellationToken, href: &str) -> TaskResult<Task> {
        self.update_status(cancel, href, TaskStatus::Disabled).await
    }

    #[tracing::instrument(name = "tasks.status", skip_all, fields(href = %href))]
    pub async fn status(&self, cancel: &CancellationToken, href: &str) -> TaskResult<TaskStatus> {
        let kapa = self.connect(cancel).await?;
        let task = race(cancel, "fetch task", kapa.task(&Link::new(href)))
            .await?
            .map_err(|e| remote_error("fetch task", e))?;
        Ok(task.status)
    }

    /// Status of every task, keyed by id. Scripts are neither fetched nor parsed.
    #[tracing::instrument(name = "tasks.all_status", skip_all)]
    pub async fn all_status(
        &self,
        cancel: &CancellationToken,
    ) -> TaskResult<BTreeMap<String, TaskStatus>> {
        let kapa = self.connect(cancel).await?;
        let opts = ListTasksOptions {
            fields: vec!["status".to_string()],
        };
        let tasks = race(cancel, "list tasks", kapa.list_tasks(&opts))
            .await?
            .map_err(|e| remote_error("list tasks", e))?;
        Ok(tasks.into_iter().map(|task| (task.id, task.status)).collect())
    }

    /// Rule of the task with `id`. Any failure to fetch the task is reported
    /// as [`TaskReason::NotFound`]; cancellation is reported as such.
    #[tracing::instrument(name = "tasks.get", skip_all, fields(id = %id))]
    pub async fn get(&self, cancel: &CancellationToken, id: &str) -> TaskResult<AlertRule> {
        let kapa = self.connect(cancel).await?;
        let link = Link::new(href(id));
        let task = race(cancel, "fetch task", kapa.task(&link))
            .await?
            .map_err(|e| {
                tick_debug!(remote, id = %id, error = %e, "fetch failed, reporting not found");
                StructError::from(TaskReason::NotFound).with_detail(format!("no alert {id}"))
            })?;
        Ok(reconstruct(&task.id, &Script::new(task.script)))
    }

    /// Every task's rule, keyed by id. A script that cannot be reversed
    /// degrades its own entry only.
    #[tracing::instrument(name = "tasks.all", skip_all)]
    pub async fn all(&self, cancel: &CancellationToken) -> TaskResult<BTreeMap<String, AlertRule>> {
        let kapa = self.connect(cancel).await?;
        let tasks = race(cancel, "list tasks", kapa.list_tasks(&ListTasksOptions::default()))
            .await?
            .map_err(|e| remote_error("list tasks", e))?;
        tick_debug!(remote, tasks = tasks.len(), "listed tasks");
        Ok(tasks
            .into_iter()
            .map(|task| {
                let rule = reconstruct(&task.id, &Script::new(task.script));
                (task.id, rule)
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn connect(&self, cancel: &CancellationToken) -> TaskResult<Arc<dyn EngineConnection>> {
        race(cancel, "connect", self.connector.connect(&self.endpoint))
            .await?
            .map_err(|e| {
                StructError::from(TaskReason::Connection)
                    .with_detail(format!("{}: {e}", self.endpoint.url))
            })
    }

    fn render(&self, rule: &AlertRule) -> TaskResult<Script> {
        self.generator.generate(rule).map_err(|e| {
            StructError::from(TaskReason::Generation).with_detail(format!("rule {:?}: {e}", rule.name))
        })
    }

    async fn update_status(
        &self,
        cancel: &CancellationToken,
        href: &str,
        status: TaskStatus,
    ) -> TaskResult<Task> {
        let kapa = self.connect(cancel).await?;
        let task = self
            .set_status(cancel, kapa.as_ref(), &Link::new(href), status)
            .await?;
        tick_info!(remote, id = %task.id, status = %task.status, "task status changed");
        let script = Script::new(task.script);
        Ok(Task {
            href: task.link.href,
            href_output: href_output(&task.id),
            status: task.status,
            rule: reconstruct(&task.id, &script),
            script,
            id: task.id,
        })
    }

    async fn set_status(
        &self,
        cancel: &CancellationToken,
        kapa: &dyn EngineConnection,
        link: &Link,
        status: TaskStatus,
    ) -> TaskResult<RemoteTask> {
        race(
            cancel,
            "update task status",
            kapa.update_task(link, UpdateTaskOptions::status(status)),
        )
        .await?
        .map_err(|e| remote_error("update task status", e))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run `fut` unless `cancel` fires first.
async fn race<F: Future>(
    cancel: &CancellationToken,
    step: &str,
    fut: F,
) -> TaskResult<F::Output> {
    let cancelled = || {
        StructError::from(TaskReason::Cancelled).with_detail(format!("cancelled during {step}"))
    };
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        output = fut => Ok(output),
    }
}

fn remote_error(step: &str, e: RemoteError) -> TaskError {
    StructError::from(TaskReason::RemoteRequest).with_detail(format!("{step}: {e}"))
}

fn dbrps(rule: &AlertRule) -> Vec<Dbrp> {
    rule.query
        .iter()
        .map(|query| Dbrp {
            db: query.database.clone(),
            rp: query.retention_policy.clone(),
        })
        .collect()
}

/// Rebuild the rule for task `id`. Scripts that do not reverse cleanly
/// degrade: an unsupported shape keeps what was recovered, anything else
/// becomes a rule named after the task with no query.
fn reconstruct(id: &str, script: &Script) -> AlertRule {
    let mut rule = match reverse(script) {
        Ok(rule) => rule,
        Err(ReverseError::Unsupported { reason, partial }) => {
            tick_warn!(codec, id = %id, reason = %reason, "script only partially reversed");
            *partial
        }
        Err(e @ ReverseError::Syntax(_)) => {
            tick_warn!(codec, id = %id, error = %e, "script not reversible");
            AlertRule::default()
        }
    };
    if rule.name.is_empty() {
        rule.name = id.to_string();
    }
    rule.id = id.to_string();
    rule.script = script.clone();
    rule
}
