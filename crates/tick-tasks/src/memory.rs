//! In-process task engine.
//!
//! Behaves like the remote engine for the operations the client uses and
//! can be told to fail specific requests, which is how the partial-failure
//! paths of the client are exercised.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tick_config::KapacitorConfig;
use tokio::sync::Mutex;

use crate::client::href;
use crate::remote::{
    Connector, CreateTaskOptions, EngineConnection, Link, ListTasksOptions, RemoteError,
    RemoteTask, TaskStatus, UpdateTaskOptions,
};

/// A request kind the engine can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Connect,
    Create,
    Fetch,
    List,
    Delete,
    /// Fail updates that request this status.
    UpdateToStatus(TaskStatus),
    /// Never answer; the caller has to cancel.
    Hang,
    /// Never answer updates that request this status.
    HangUpdateToStatus(TaskStatus),
}

#[derive(Default)]
struct EngineState {
    tasks: BTreeMap<String, RemoteTask>,
    faults: HashSet<Fault>,
    requests: Vec<&'static str>,
    connections: usize,
}

#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn inject(&self, fault: Fault) {
        self.state.lock().await.faults.insert(fault);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Store a task directly, bypassing the request log.
    pub async fn insert(&self, task: RemoteTask) {
        self.state.lock().await.tasks.insert(task.id.clone(), task);
    }

    pub async fn tasks(&self) -> Vec<RemoteTask> {
        self.state.lock().await.tasks.values().cloned().collect()
    }

    pub async fn task_by_id(&self, id: &str) -> Option<RemoteTask> {
        self.state.lock().await.tasks.get(id).cloned()
    }

    /// Names of the task requests received so far, in order.
    pub async fn requests(&self) -> Vec<&'static str> {
        self.state.lock().await.requests.clone()
    }

    pub async fn connections(&self) -> usize {
        self.state.lock().await.connections
    }

    /// Record the request, fail it if `fault` is armed and stall it if
    /// `Hang` or `hang` is.
    async fn begin(
        &self,
        request: &'static str,
        fault: Option<Fault>,
        hang: Option<Fault>,
    ) -> Result<(), RemoteError> {
        let hang = {
            let mut state = self.state.lock().await;
            state.requests.push(request);
            if fault.is_some_and(|fault| state.faults.contains(&fault)) {
                return Err(RemoteError::Transport(format!("injected {request} failure")));
            }
            state.faults.contains(&Fault::Hang)
                || hang.is_some_and(|hang| state.faults.contains(&hang))
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

fn find<'a>(
    tasks: &'a mut BTreeMap<String, RemoteTask>,
    link: &Link,
) -> Result<&'a mut RemoteTask, RemoteError> {
    tasks
        .values_mut()
        .find(|task| task.link.href == link.href)
        .ok_or_else(|| RemoteError::NoSuchTask(link.href.clone()))
}

#[async_trait]
impl EngineConnection for MemoryEngine {
    async fn create_task(&self, opts: CreateTaskOptions) -> Result<RemoteTask, RemoteError> {
        self.begin("create", Some(Fault::Create), None).await?;
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&opts.id) {
            return Err(RemoteError::Rejected(format!(
                "task {} already exists",
                opts.id
            )));
        }
        let task = RemoteTask {
            link: Link::new(href(&opts.id)),
            id: opts.id,
            task_type: opts.task_type,
            dbrps: opts.dbrps,
            script: opts.script,
            status: opts.status,
        };
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn task(&self, link: &Link) -> Result<RemoteTask, RemoteError> {
        self.begin("task", Some(Fault::Fetch), None).await?;
        let mut state = self.state.lock().await;
        find(&mut state.tasks, link).map(|task| task.clone())
    }

    async fn list_tasks(&self, opts: &ListTasksOptions) -> Result<Vec<RemoteTask>, RemoteError> {
        self.begin("list", Some(Fault::List), None).await?;
        let state = self.state.lock().await;
        let wants = |field: &str| opts.fields.is_empty() || opts.fields.iter().any(|f| f == field);
        Ok(state
            .tasks
            .values()
            .map(|task| {
                let mut task = task.clone();
                if !wants("script") {
                    task.script.clear();
                }
                if !wants("dbrps") {
                    task.dbrps.clear();
                }
                task
            })
            .collect())
    }

    async fn update_task(
        &self,
        link: &Link,
        opts: UpdateTaskOptions,
    ) -> Result<RemoteTask, RemoteError> {
        self.begin(
            "update",
            opts.status.map(Fault::UpdateToStatus),
            opts.status.map(Fault::HangUpdateToStatus),
        )
        .await?;
        let mut state = self.state.lock().await;
        let task = find(&mut state.tasks, link)?;

        let status = opts.status.unwrap_or(task.status);
        if let Some(task_type) = opts.task_type
            && task_type != task.task_type
            && status == TaskStatus::Enabled
        {
            return Err(RemoteError::Rejected(
                "cannot change the type of an enabled task".into(),
            ));
        }

        if let Some(task_type) = opts.task_type {
            task.task_type = task_type;
        }
        if !opts.dbrps.is_empty() {
            task.dbrps = opts.dbrps;
        }
        if let Some(script) = opts.script {
            task.script = script;
        }
        task.status = status;
        Ok(task.clone())
    }

    async fn delete_task(&self, link: &Link) -> Result<(), RemoteError> {
        self.begin("delete", Some(Fault::Delete), None).await?;
        let mut state = self.state.lock().await;
        let id = find(&mut state.tasks, link)?.id.clone();
        state.tasks.remove(&id);
        Ok(())
    }
}

/// Hands out the shared [`MemoryEngine`] as the connection.
#[derive(Clone)]
pub struct MemoryConnector {
    engine: Arc<MemoryEngine>,
}

impl MemoryConnector {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        _endpoint: &KapacitorConfig,
    ) -> Result<Arc<dyn EngineConnection>, RemoteError> {
        let mut state = self.engine.state.lock().await;
        state.connections += 1;
        if state.faults.contains(&Fault::Connect) {
            return Err(RemoteError::Transport("connection refused".into()));
        }
        Ok(self.engine.clone())
    }
}
