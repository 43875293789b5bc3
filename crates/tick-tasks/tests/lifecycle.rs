use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tick_config::KapacitorConfig;
use tick_lang::{
    AlertRule, Condition, Field, GroupBy, Handler, Level, Operator, QueryConfig, TaskType,
};
use tick_tasks::memory::{Fault, MemoryConnector, MemoryEngine};
use tick_tasks::{
    Connector, CreateTaskOptions, EngineConnection, IdGenerator, Link, ListTasksOptions, PREFIX,
    RemoteError, RemoteTask, TaskClient, TaskReason, TaskStatus, UpdateTaskOptions,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SequenceIds(AtomicUsize);

impl IdGenerator for SequenceIds {
    fn generate(&self) -> anyhow::Result<String> {
        Ok(format!("seq-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

struct FailingIds;

impl IdGenerator for FailingIds {
    fn generate(&self) -> anyhow::Result<String> {
        anyhow::bail!("entropy exhausted")
    }
}

fn endpoint() -> KapacitorConfig {
    KapacitorConfig {
        url: "http://localhost:9092".into(),
        username: None,
        password: None,
    }
}

fn client(engine: &Arc<MemoryEngine>) -> TaskClient {
    TaskClient::new(endpoint(), Arc::new(MemoryConnector::new(engine.clone())))
        .with_id_generator(Arc::new(SequenceIds::default()))
}

fn stream_rule(name: &str) -> AlertRule {
    AlertRule {
        name: name.into(),
        query: Some(QueryConfig {
            database: "telegraf".into(),
            retention_policy: "autogen".into(),
            measurement: "cpu".into(),
            fields: vec![Field {
                name: "usage_idle".into(),
                function: Some(tick_lang::Aggregate::Mean),
            }],
            group_by: GroupBy {
                time: Some(Duration::from_secs(60)),
                tags: vec!["host".into()],
            },
            ..QueryConfig::default()
        }),
        conditions: vec![Condition {
            level: Level::Crit,
            operator: Operator::LessThan,
            value: 10.0,
            upper: None,
        }],
        message: "idle is low".into(),
        handlers: vec![Handler::Slack {
            channel: Some("#ops".into()),
        }],
        ..AlertRule::default()
    }
}

fn batch_rule(name: &str) -> AlertRule {
    AlertRule {
        name: name.into(),
        query: Some(QueryConfig {
            database: "telegraf".into(),
            retention_policy: "autogen".into(),
            raw_text: Some(r#"SELECT max("load1") AS "value" FROM "system""#.into()),
            group_by: GroupBy {
                time: Some(Duration::from_secs(300)),
                tags: vec![],
            },
            ..QueryConfig::default()
        }),
        every: Some(Duration::from_secs(60)),
        conditions: vec![Condition {
            level: Level::Warn,
            operator: Operator::GreaterThan,
            value: 4.0,
            upper: None,
        }],
        ..AlertRule::default()
    }
}

/// The parts of a rule that survive a trip through the engine.
fn content(rule: &AlertRule) -> AlertRule {
    AlertRule {
        id: String::new(),
        script: Default::default(),
        ..rule.clone()
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_prefixes_id_and_derives_links() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();

    let rule = stream_rule("cpu idle");
    let task = client.create(&cancel, &rule).await.unwrap();

    assert_eq!(task.id, format!("{PREFIX}seq-1"));
    assert_eq!(task.href, "/kapacitor/v1/tasks/chronograf-v1-seq-1");
    assert_eq!(task.href_output, "/kapacitor/v1/tasks/chronograf-v1-seq-1/output");
    assert_eq!(task.status, TaskStatus::Enabled);
    assert_eq!(task.rule.id, task.id);
    assert_eq!(task.rule.script, task.script);
    assert_eq!(content(&task.rule), content(&rule));

    let remote = engine.task_by_id(&task.id).await.unwrap();
    assert_eq!(remote.task_type, TaskType::Stream);
    assert_eq!(remote.status, TaskStatus::Enabled);
    assert_eq!(remote.script, task.script.as_str());
    assert_eq!(remote.dbrps.len(), 1);
    assert_eq!(remote.dbrps[0].db, "telegraf");
    assert_eq!(remote.dbrps[0].rp, "autogen");
}

#[tokio::test]
async fn create_classifies_raw_query_as_batch() {
    let engine = MemoryEngine::new();
    let task = client(&engine)
        .create(&CancellationToken::new(), &batch_rule("load"))
        .await
        .unwrap();
    let remote = engine.task_by_id(&task.id).await.unwrap();
    assert_eq!(remote.task_type, TaskType::Batch);
}

#[tokio::test]
async fn create_generation_error_sends_nothing() {
    let engine = MemoryEngine::new();
    let mut rule = stream_rule("broken");
    rule.conditions.clear();

    let err = client(&engine)
        .create(&CancellationToken::new(), &rule)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), &TaskReason::Generation);
    assert!(engine.requests().await.is_empty());
}

#[tokio::test]
async fn create_id_failure_sends_nothing() {
    let engine = MemoryEngine::new();
    let client = TaskClient::new(endpoint(), Arc::new(MemoryConnector::new(engine.clone())))
        .with_id_generator(Arc::new(FailingIds));
    let err = client
        .create(&CancellationToken::new(), &stream_rule("x"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), &TaskReason::IdGeneration);
    assert!(err.to_string().contains("entropy exhausted"), "{err}");
    assert!(engine.requests().await.is_empty());
}

#[tokio::test]
async fn create_remote_failure_leaves_no_task() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();

    engine.inject(Fault::Create).await;
    let err = client.create(&cancel, &stream_rule("a")).await.unwrap_err();
    assert_eq!(err.reason(), &TaskReason::RemoteRequest);
    assert!(engine.tasks().await.is_empty());

    engine.clear_faults().await;
    let task = client.create(&cancel, &stream_rule("b")).await.unwrap();
    let tasks = engine.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
    assert!(task.id.starts_with(PREFIX));
}

#[tokio::test]
async fn connection_failure_is_not_retried() {
    let engine = MemoryEngine::new();
    engine.inject(Fault::Connect).await;

    let err = client(&engine)
        .delete(&CancellationToken::new(), "/kapacitor/v1/tasks/x")
        .await
        .unwrap_err();
    assert_eq!(err.reason(), &TaskReason::Connection);
    assert_eq!(engine.connections().await, 1);
    assert!(engine.requests().await.is_empty());
}

#[tokio::test]
async fn concurrent_creates_get_distinct_ids() {
    let engine = MemoryEngine::new();
    let client = Arc::new(TaskClient::new(
        endpoint(),
        Arc::new(MemoryConnector::new(engine.clone())),
    ));

    let mut handles = Vec::new();
    for n in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .create(&CancellationToken::new(), &stream_rule(&format!("rule {n}")))
                .await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(engine.tasks().await.len(), 8);
    assert_eq!(engine.connections().await, 8);
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_disables_then_enables() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();
    let created = client.create(&cancel, &stream_rule("cpu")).await.unwrap();

    let rule = batch_rule("cpu as batch");
    let updated = client.update(&cancel, &created.href, &rule).await.unwrap();

    assert_eq!(engine.requests().await, vec!["create", "update", "update"]);
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.status, TaskStatus::Enabled);
    assert_eq!(content(&updated.rule), content(&rule));

    let remote = engine.task_by_id(&created.id).await.unwrap();
    assert_eq!(remote.task_type, TaskType::Batch);
    assert_eq!(remote.status, TaskStatus::Enabled);
    assert_eq!(remote.script, updated.script.as_str());
}

#[tokio::test]
async fn update_enable_failure_leaves_task_disabled() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();
    let created = client.create(&cancel, &stream_rule("cpu")).await.unwrap();

    engine.inject(Fault::UpdateToStatus(TaskStatus::Enabled)).await;
    let mut rule = stream_rule("cpu");
    rule.conditions[0].value = 5.0;
    let err = client.update(&cancel, &created.href, &rule).await.unwrap_err();

    assert_eq!(err.reason(), &TaskReason::RemoteRequest);
    assert!(err.to_string().contains("left disabled"), "{err}");

    // Phase one stays committed.
    let remote = engine.task_by_id(&created.id).await.unwrap();
    assert_eq!(remote.status, TaskStatus::Disabled);
    assert_ne!(remote.script, created.script.as_str());
    assert!(remote.script.contains("var crit = 5\n"));
}

#[tokio::test]
async fn cancel_between_update_phases_leaves_task_disabled() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let created = client
        .create(&CancellationToken::new(), &stream_rule("cpu"))
        .await
        .unwrap();

    engine.inject(Fault::HangUpdateToStatus(TaskStatus::Enabled)).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let mut rule = stream_rule("cpu");
    rule.conditions[0].value = 5.0;
    let err = client.update(&cancel, &created.href, &rule).await.unwrap_err();

    assert_eq!(err.reason(), &TaskReason::Cancelled);
    assert!(err.to_string().contains("left disabled"), "{err}");
    assert_eq!(engine.requests().await, vec!["create", "update", "update"]);

    let remote = engine.task_by_id(&created.id).await.unwrap();
    assert_eq!(remote.status, TaskStatus::Disabled);
    assert!(remote.script.contains("var crit = 5\n"));
}

#[tokio::test]
async fn update_generation_error_keeps_remote_untouched() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();
    let created = client.create(&cancel, &stream_rule("cpu")).await.unwrap();

    let mut rule = stream_rule("cpu");
    rule.query = None;
    let err = client.update(&cancel, &created.href, &rule).await.unwrap_err();
    assert_eq!(err.reason(), &TaskReason::Generation);
    assert_eq!(engine.requests().await, vec!["create"]);
}

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enable_disable_and_status() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();
    let created = client.create(&cancel, &stream_rule("cpu")).await.unwrap();

    let disabled = client.disable(&cancel, &created.href).await.unwrap();
    assert_eq!(disabled.status, TaskStatus::Disabled);
    assert_eq!(disabled.href, created.href);
    assert_eq!(
        client.status(&cancel, &created.href).await.unwrap(),
        TaskStatus::Disabled
    );

    let enabled = client.enable(&cancel, &created.href).await.unwrap();
    assert_eq!(enabled.status, TaskStatus::Enabled);
    assert_eq!(enabled.href_output, created.href_output);
    assert_eq!(
        client.status(&cancel, &created.href).await.unwrap().to_string(),
        "enabled"
    );
}

#[tokio::test]
async fn status_of_unknown_task_is_remote_error() {
    let engine = MemoryEngine::new();
    let err = client(&engine)
        .status(&CancellationToken::new(), "/kapacitor/v1/tasks/nope")
        .await
        .unwrap_err();
    assert_eq!(err.reason(), &TaskReason::RemoteRequest);
}

/// Wraps the in-memory engine and records listing options.
struct RecordingEngine {
    inner: Arc<MemoryEngine>,
    listings: Mutex<Vec<ListTasksOptions>>,
}

#[async_trait]
impl EngineConnection for RecordingEngine {
    async fn create_task(&self, opts: CreateTaskOptions) -> Result<RemoteTask, RemoteError> {
        self.inner.create_task(opts).await
    }

    async fn task(&self, link: &Link) -> Result<RemoteTask, RemoteError> {
        self.inner.task(link).await
    }

    async fn list_tasks(&self, opts: &ListTasksOptions) -> Result<Vec<RemoteTask>, RemoteError> {
        self.listings.lock().await.push(opts.clone());
        self.inner.list_tasks(opts).await
    }

    async fn update_task(
        &self,
        link: &Link,
        opts: UpdateTaskOptions,
    ) -> Result<RemoteTask, RemoteError> {
        self.inner.update_task(link, opts).await
    }

    async fn delete_task(&self, link: &Link) -> Result<(), RemoteError> {
        self.inner.delete_task(link).await
    }
}

struct RecordingConnector(Arc<RecordingEngine>);

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(
        &self,
        _endpoint: &KapacitorConfig,
    ) -> Result<Arc<dyn EngineConnection>, RemoteError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn all_status_requests_only_status() {
    let engine = MemoryEngine::new();
    let recording = Arc::new(RecordingEngine {
        inner: engine.clone(),
        listings: Mutex::new(Vec::new()),
    });
    let client = TaskClient::new(endpoint(), Arc::new(RecordingConnector(recording.clone())))
        .with_id_generator(Arc::new(SequenceIds::default()));
    let cancel = CancellationToken::new();

    let a = client.create(&cancel, &stream_rule("a")).await.unwrap();
    let b = client.create(&cancel, &stream_rule("b")).await.unwrap();
    client.disable(&cancel, &b.href).await.unwrap();

    let statuses = client.all_status(&cancel).await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[&a.id], TaskStatus::Enabled);
    assert_eq!(statuses[&b.id], TaskStatus::Disabled);

    let listings = recording.listings.lock().await;
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].fields, vec!["status".to_string()]);
}

// ---------------------------------------------------------------------------
// Get / All
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_reverses_script() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();
    let rule = stream_rule("cpu");
    let created = client.create(&cancel, &rule).await.unwrap();

    let fetched = client.get(&cancel, &created.id).await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.script, created.script);
    assert_eq!(content(&fetched), content(&rule));
}

#[tokio::test]
async fn get_masks_remote_failures_as_not_found() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();

    let err = client.get(&cancel, "chronograf-v1-missing").await.unwrap_err();
    assert_eq!(err.reason(), &TaskReason::NotFound);

    let created = client.create(&cancel, &stream_rule("cpu")).await.unwrap();
    engine.inject(Fault::Fetch).await;
    let err = client.get(&cancel, &created.id).await.unwrap_err();
    assert_eq!(err.reason(), &TaskReason::NotFound);
}

#[tokio::test]
async fn get_does_not_mask_connection_or_cancellation() {
    let engine = MemoryEngine::new();
    let client = client(&engine);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = client.get(&cancel, "chronograf-v1-x").await.unwrap_err();
    assert_eq!(err.reason(), &TaskReason::Cancelled);

    engine.inject(Fault::Connect).await;
    let err = client
        .get(&CancellationToken::new(), "chronograf-v1-x")
        .await
        .unwrap_err();
    assert_eq!(err.reason(), &TaskReason::Connection);
}

#[tokio::test]
async fn all_degrades_only_the_malformed_entry() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();

    let a = client.create(&cancel, &stream_rule("a")).await.unwrap();
    let b = client.create(&cancel, &batch_rule("b")).await.unwrap();
    engine
        .insert(RemoteTask {
            id: "foreign-task".into(),
            link: Link::new("/kapacitor/v1/tasks/foreign-task"),
            task_type: TaskType::Stream,
            dbrps: vec![],
            script: "stream |from( this is not valid".into(),
            status: TaskStatus::Enabled,
        })
        .await;

    let rules = client.all(&cancel).await.unwrap();
    assert_eq!(rules.len(), 3);

    let foreign = &rules["foreign-task"];
    assert_eq!(foreign.id, "foreign-task");
    assert_eq!(foreign.name, "foreign-task");
    assert!(foreign.query.is_none());

    assert_eq!(content(&rules[&a.id]), content(&stream_rule("a")));
    assert_eq!(content(&rules[&b.id]), content(&batch_rule("b")));
    assert_eq!(rules[&b.id].task_type(), TaskType::Batch);
}

#[tokio::test]
async fn all_keeps_partial_rule_for_unsupported_shape() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();
    let created = client.create(&cancel, &stream_rule("partial")).await.unwrap();

    let edited = created
        .script
        .as_str()
        .replace(".stateChangesOnly()", ".stateChangesOnly()\n        .victorOps()");
    let update = UpdateTaskOptions {
        script: Some(edited),
        ..UpdateTaskOptions::default()
    };
    engine
        .update_task(&Link::new(created.href.clone()), update)
        .await
        .unwrap();

    let rules = client.all(&cancel).await.unwrap();
    let rule = &rules[&created.id];
    assert_eq!(rule.name, "partial");
    assert_eq!(rule.query.as_ref().unwrap().measurement, "cpu");
}

// ---------------------------------------------------------------------------
// Delete / cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_removes_task() {
    let engine = MemoryEngine::new();
    let client = client(&engine);
    let cancel = CancellationToken::new();
    let created = client.create(&cancel, &stream_rule("cpu")).await.unwrap();

    client.delete(&cancel, &created.href).await.unwrap();
    assert!(engine.tasks().await.is_empty());

    let err = client.delete(&cancel, &created.href).await.unwrap_err();
    assert_eq!(err.reason(), &TaskReason::RemoteRequest);
}

#[tokio::test]
async fn cancelled_token_short_circuits() {
    let engine = MemoryEngine::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client(&engine)
        .create(&cancel, &stream_rule("cpu"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), &TaskReason::Cancelled);
    assert_eq!(engine.connections().await, 0);
    assert!(engine.tasks().await.is_empty());
}

#[tokio::test]
async fn cancel_during_hung_request() {
    let engine = MemoryEngine::new();
    engine.inject(Fault::Hang).await;
    let client = client(&engine);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = client.create(&cancel, &stream_rule("cpu")).await.unwrap_err();
    assert_eq!(err.reason(), &TaskReason::Cancelled);
    assert_eq!(engine.requests().await, vec!["create"]);
    assert!(engine.tasks().await.is_empty());
}
