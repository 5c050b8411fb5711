//! Integration tests for resource-set execution.
//!
//! Resources here only record their invocations, so the tests exercise the
//! executor's ordering, cancel-pass and failure handling without any cloud.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;
use stratus_reconcile::{
    CancellationToken, ClusterObject, ContextKey, ErrorKind, Operation, Pass, PassInit,
    PassOutcome, ReconcileError, Resource, ResourceSet, Result,
};
use tracing_subscriber::layer::SubscriberExt;

struct TestCluster {
    id: String,
}

impl ClusterObject for TestCluster {
    fn cluster_id(&self) -> &str {
        &self.id
    }

    fn base_domain(&self) -> &str {
        "example.io"
    }
}

fn cluster() -> TestCluster {
    TestCluster {
        id: "c1".to_string(),
    }
}

type Log = Arc<Mutex<Vec<String>>>;

/// Records every call; optionally fails with a fixed error kind.
struct Recording {
    name: &'static str,
    log: Log,
    fail_with: Option<ErrorKind>,
}

impl Recording {
    fn ok(name: &'static str, log: &Log) -> Arc<dyn Resource<TestCluster>> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            fail_with: None,
        })
    }

    fn failing(name: &'static str, log: &Log, kind: ErrorKind) -> Arc<dyn Resource<TestCluster>> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            fail_with: Some(kind),
        })
    }

    fn outcome(&self) -> Result<()> {
        match self.fail_with {
            None => Ok(()),
            Some(ErrorKind::NotFound) => Err(ReconcileError::not_found("precondition")),
            Some(ErrorKind::OperationInProgress) => {
                Err(ReconcileError::operation_in_progress("stack deleting"))
            }
            Some(ErrorKind::AlreadyExists) => Err(ReconcileError::already_exists("record")),
            Some(ErrorKind::Execution) => Err(ReconcileError::execution("upsert failed")),
            Some(ErrorKind::Transport) => Err(ReconcileError::transport("connection reset")),
            Some(ErrorKind::InvalidConfig) => Err(ReconcileError::invalid_config("bad")),
            Some(ErrorKind::Cancelled) => Err(ReconcileError::cancelled("deadline")),
        }
    }
}

#[async_trait]
impl Resource<TestCluster> for Recording {
    fn name(&self) -> &str {
        self.name
    }

    async fn ensure_created(&self, _pass: &mut Pass, _obj: &TestCluster) -> Result<()> {
        self.log.lock().unwrap().push(format!("create:{}", self.name));
        self.outcome()
    }

    async fn ensure_deleted(&self, _pass: &mut Pass, _obj: &TestCluster) -> Result<()> {
        self.log.lock().unwrap().push(format!("delete:{}", self.name));
        self.outcome()
    }
}

fn calls(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_create_runs_in_declared_order() {
    let log = Log::default();
    let set = ResourceSet::new(vec![
        Recording::ok("a", &log),
        Recording::ok("b", &log),
        Recording::ok("c", &log),
    ])
    .unwrap();

    let outcome = set
        .ensure_created(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Completed);
    assert_eq!(calls(&log), vec!["create:a", "create:b", "create:c"]);
}

#[tokio::test]
async fn test_delete_runs_in_reverse_order() {
    let log = Log::default();
    let set = ResourceSet::new(vec![
        Recording::ok("a", &log),
        Recording::ok("b", &log),
        Recording::ok("c", &log),
    ])
    .unwrap();

    let outcome = set
        .ensure_deleted(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(calls(&log), vec!["delete:c", "delete:b", "delete:a"]);
}

#[rstest]
#[case::not_found(ErrorKind::NotFound)]
#[case::in_progress(ErrorKind::OperationInProgress)]
#[tokio::test]
async fn test_cancel_pass_stops_quietly(#[case] kind: ErrorKind) {
    let log = Log::default();
    let set = ResourceSet::new(vec![
        Recording::ok("a", &log),
        Recording::failing("b", &log, kind),
        Recording::ok("c", &log),
    ])
    .unwrap();

    let outcome = set
        .ensure_created(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PassOutcome::Canceled {
            resource: "b".to_string()
        }
    );
    assert_eq!(calls(&log), vec!["create:a", "create:b"]);
}

#[rstest]
#[case::execution(ErrorKind::Execution)]
#[case::transport(ErrorKind::Transport)]
#[case::already_exists(ErrorKind::AlreadyExists)]
#[case::cancelled(ErrorKind::Cancelled)]
#[tokio::test]
async fn test_failure_stops_and_propagates(#[case] kind: ErrorKind) {
    let log = Log::default();
    let set = ResourceSet::new(vec![
        Recording::ok("a", &log),
        Recording::failing("b", &log, kind),
        Recording::ok("c", &log),
    ])
    .unwrap();

    let err = set
        .ensure_created(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), kind);
    assert!(err.to_string().starts_with("create b: "));
    assert_eq!(calls(&log), vec!["create:a", "create:b"]);
}

#[tokio::test]
async fn test_cancel_pass_on_delete_skips_earlier_resources() {
    let log = Log::default();
    let set = ResourceSet::new(vec![
        Recording::ok("a", &log),
        Recording::failing("b", &log, ErrorKind::OperationInProgress),
        Recording::ok("c", &log),
    ])
    .unwrap();

    let outcome = set
        .ensure_deleted(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(!outcome.is_completed());
    assert_eq!(calls(&log), vec!["delete:c", "delete:b"]);
}

#[tokio::test]
async fn test_cancelled_token_runs_nothing() {
    let log = Log::default();
    let set = ResourceSet::new(vec![Recording::ok("a", &log)]).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = set.ensure_created(&cluster(), cancel, None).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(calls(&log).is_empty());
}

#[rstest]
#[case::empty_name(vec!["a", ""])]
#[case::duplicate(vec!["a", "b", "a"])]
fn test_invalid_sets_rejected(#[case] names: Vec<&'static str>) {
    let log = Log::default();
    let resources = names.into_iter().map(|n| Recording::ok(n, &log)).collect();

    let err = ResourceSet::new(resources).unwrap_err();
    assert!(err.is_invalid_config());
}

const ACCOUNT_ID: ContextKey<String> = ContextKey::new("test.account_id");

struct Producer;
struct Consumer {
    seen: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl Resource<TestCluster> for Producer {
    fn name(&self) -> &str {
        "producer"
    }

    async fn ensure_created(&self, pass: &mut Pass, _obj: &TestCluster) -> Result<()> {
        pass.context_mut()
            .set(self.name(), &ACCOUNT_ID, "123456789012".to_string())
    }

    async fn ensure_deleted(&self, pass: &mut Pass, obj: &TestCluster) -> Result<()> {
        self.ensure_created(pass, obj).await
    }
}

#[async_trait]
impl Resource<TestCluster> for Consumer {
    fn name(&self) -> &str {
        "consumer"
    }

    async fn ensure_created(&self, pass: &mut Pass, _obj: &TestCluster) -> Result<()> {
        let id = pass.context().require(&ACCOUNT_ID)?;
        *self.seen.lock().unwrap() = Some(id.clone());
        Ok(())
    }

    async fn ensure_deleted(&self, pass: &mut Pass, obj: &TestCluster) -> Result<()> {
        self.ensure_created(pass, obj).await
    }
}

#[tokio::test]
async fn test_context_flows_between_resources() {
    let seen = Arc::new(Mutex::new(None));
    let set = ResourceSet::new(vec![
        Arc::new(Producer) as Arc<dyn Resource<TestCluster>>,
        Arc::new(Consumer {
            seen: Arc::clone(&seen),
        }),
    ])
    .unwrap();

    set.ensure_created(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("123456789012"));
}

#[tokio::test]
async fn test_consumer_before_producer_fails() {
    // On delete the consumer runs first and the key is not there yet.
    let seen = Arc::new(Mutex::new(None));
    let set = ResourceSet::new(vec![
        Arc::new(Producer) as Arc<dyn Resource<TestCluster>>,
        Arc::new(Consumer {
            seen: Arc::clone(&seen),
        }),
    ])
    .unwrap();

    let err = set
        .ensure_deleted(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert!(seen.lock().unwrap().is_none());
}

struct ProducerInit;

#[async_trait]
impl PassInit<TestCluster> for ProducerInit {
    fn name(&self) -> &str {
        "init"
    }

    async fn init(&self, pass: &mut Pass, _obj: &TestCluster) -> Result<()> {
        pass.context_mut()
            .set(self.name(), &ACCOUNT_ID, "123456789012".to_string())
    }
}

#[rstest]
#[case(Operation::Create)]
#[case(Operation::Delete)]
#[tokio::test]
async fn test_init_runs_before_resources_in_both_directions(#[case] operation: Operation) {
    let seen = Arc::new(Mutex::new(None));
    let set = ResourceSet::new(vec![Arc::new(Consumer {
        seen: Arc::clone(&seen),
    }) as Arc<dyn Resource<TestCluster>>])
    .unwrap()
    .with_init(Arc::new(ProducerInit));

    let mut pass = Pass::new(operation, CancellationToken::new());
    let outcome = set.run(&mut pass, &cluster()).await.unwrap();

    assert_eq!(outcome, PassOutcome::Completed);
    assert_eq!(seen.lock().unwrap().as_deref(), Some("123456789012"));
}

#[tokio::test]
async fn test_passes_do_not_share_context() {
    let set = ResourceSet::new(vec![Arc::new(Producer) as Arc<dyn Resource<TestCluster>>])
        .unwrap();

    let mut first = Pass::new(Operation::Create, CancellationToken::new());
    set.run(&mut first, &cluster()).await.unwrap();
    assert!(first.context().contains(&ACCOUNT_ID));

    let second = Pass::new(Operation::Create, CancellationToken::new());
    assert!(second.context().is_empty());
}

struct Hanging;

#[async_trait]
impl Resource<TestCluster> for Hanging {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn ensure_created(&self, pass: &mut Pass, _obj: &TestCluster) -> Result<()> {
        pass.guard("never returns", async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await
    }

    async fn ensure_deleted(&self, pass: &mut Pass, obj: &TestCluster) -> Result<()> {
        self.ensure_created(pass, obj).await
    }
}

#[tokio::test]
async fn test_pass_deadline_surfaces_cancellation() {
    let set = ResourceSet::new(vec![Arc::new(Hanging) as Arc<dyn Resource<TestCluster>>])
        .unwrap();

    let mut pass = Pass::new(Operation::Create, CancellationToken::new())
        .with_timeout(Duration::from_millis(20));

    let err = tokio::time::timeout(Duration::from_secs(5), set.run(&mut pass, &cluster()))
        .await
        .expect("pass must honour its deadline")
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!err.is_cancel_pass());
}

#[tokio::test]
async fn test_timeout_bounds_entry_point() {
    let set = ResourceSet::new(vec![Arc::new(Hanging) as Arc<dyn Resource<TestCluster>>])
        .unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        set.ensure_deleted(
            &cluster(),
            CancellationToken::new(),
            Some(Duration::from_millis(20)),
        ),
    )
    .await
    .expect("entry point must honour its timeout")
    .unwrap_err();
    assert!(err.is_cancelled());
}

/// Collects formatted log lines in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Captured {
    /// Field maps of every event carrying `message`.
    fn events(&self, message: &str) -> Vec<serde_json::Value> {
        let raw = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
        raw.lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .filter(|event| event["fields"]["message"] == message)
            .map(|event| event["fields"].clone())
            .collect()
    }
}

#[rstest]
#[case::not_found(ErrorKind::NotFound, Some("not found: precondition"))]
#[case::in_progress(ErrorKind::OperationInProgress, Some("operation in progress: stack deleting"))]
#[case::transport(ErrorKind::Transport, None)]
#[case::execution(ErrorKind::Execution, None)]
#[tokio::test]
async fn test_cancel_pass_event(#[case] kind: ErrorKind, #[case] reason: Option<&str>) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json().with_writer(captured.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let log = Log::default();
    let set = ResourceSet::new(vec![
        Recording::ok("a", &log),
        Recording::failing("b", &log, kind),
        Recording::ok("c", &log),
    ])
    .unwrap();
    let _ = set
        .ensure_created(&cluster(), CancellationToken::new(), None)
        .await;

    let events = captured.events("canceling reconciliation pass");
    match reason {
        Some(reason) => {
            assert_eq!(events.len(), 1);
            assert_eq!(events[0]["resource"], "b");
            assert_eq!(events[0]["reason"], reason);
        }
        None => assert!(events.is_empty(), "{events:?}"),
    }
}

#[tokio::test]
async fn test_completed_pass_emits_no_cancel_event() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json().with_writer(captured.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let log = Log::default();
    let set = ResourceSet::new(vec![Recording::ok("a", &log)]).unwrap();
    set.ensure_created(&cluster(), CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(captured.events("canceling reconciliation pass").is_empty());
}
