//! End-to-end scenarios across the orchestrator, registry and distributor.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tether_core::{
    ChangeDistributor, ConditionsEvaluator, ConnectionHandle, ManualClock, MemoryStore,
    RequestOrchestrator, SessionConfig, SessionId, SessionRegistry, UserData,
};
use tether_proto::{
    ChangeAction, Key, Operation, Parameters, Record, ServerMessage, StoreRequest,
};
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    clock: Arc<ManualClock>,
    registry: Arc<SessionRegistry>,
    store: Arc<MemoryStore>,
    orchestrator: RequestOrchestrator,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = SessionConfig::default().with_timeout(Duration::from_secs(60));
        let registry = Arc::new(SessionRegistry::with_clock(config, clock.clone()));
        let predicate = Arc::new(ConditionsEvaluator::new());
        let distributor = Arc::new(ChangeDistributor::new(registry.clone(), predicate.clone()));
        let store = Arc::new(MemoryStore::with_predicate(predicate));
        let orchestrator = RequestOrchestrator::new(registry.clone(), distributor, store.clone());
        Self {
            clock,
            registry,
            store,
            orchestrator,
        }
    }

    fn connect(&self, user: &str) -> (SessionId, UnboundedReceiver<ServerMessage>) {
        let id = self.registry.create_session(UserData::new(user));
        let (handle, receiver) = ConnectionHandle::channel();
        self.registry.attach(&id, handle);
        (id, receiver)
    }
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn notifications(receiver: &mut UnboundedReceiver<ServerMessage>) -> Vec<(ChangeAction, Key)> {
    let mut seen = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        if let ServerMessage::Notification(n) = message {
            seen.push((n.action, n.key));
        }
    }
    seen
}

#[tokio::test]
async fn test_create_reaches_session_with_matching_fetch() {
    let h = Harness::new();
    let (a, mut a_rx) = h.connect("ann");
    let (b, mut b_rx) = h.connect("bob");

    h.orchestrator
        .execute(&a, Operation::Fetch, StoreRequest::new("tasks"))
        .await
        .unwrap();

    h.orchestrator
        .execute(
            &b,
            Operation::Create,
            StoreRequest::new("tasks").with_record(record(json!({ "key": 7, "title": "a" }))),
        )
        .await
        .unwrap();

    assert_eq!(notifications(&mut a_rx), vec![(ChangeAction::Create, Key::number(7))]);
    assert!(notifications(&mut b_rx).is_empty());
    assert!(h.registry.key_timestamp(&a, "tasks", &Key::number(7)).is_some());
}

#[tokio::test]
async fn test_delete_reaches_session_that_refreshed_the_record() {
    let h = Harness::new();
    h.store
        .insert("tasks", Key::number(7), record(json!({ "key": 7, "title": "a" })));
    let (a, mut a_rx) = h.connect("ann");
    let (b, _b_rx) = h.connect("bob");

    h.orchestrator
        .execute(&a, Operation::Refresh, StoreRequest::new("tasks").with_key(7))
        .await
        .unwrap();

    h.orchestrator
        .execute(
            &b,
            Operation::Delete,
            StoreRequest::new("tasks")
                .with_key(7)
                .with_record(record(json!({ "key": 7, "title": "a" }))),
        )
        .await
        .unwrap();

    assert_eq!(notifications(&mut a_rx), vec![(ChangeAction::Delete, Key::number(7))]);
    assert!(h.registry.key_timestamp(&a, "tasks", &Key::number(7)).is_none());
}

#[tokio::test]
async fn test_delete_is_not_sent_on_query_match_alone() {
    let h = Harness::new();
    h.store.insert("tasks", Key::number(1), record(json!({ "key": 1 })));
    let (a, mut a_rx) = h.connect("ann");
    let (b, _b_rx) = h.connect("bob");

    // a ran a matching query but never held the record itself
    let mut params = Parameters::new();
    params.insert("min".to_string(), json!(5));
    h.orchestrator
        .execute(
            &a,
            Operation::Fetch,
            StoreRequest::new("tasks").with_conditions("key >= {min} OR key = 1", params),
        )
        .await
        .unwrap();
    assert_eq!(h.registry.interest_counts(&a), Some((1, 0)));

    h.orchestrator
        .execute(
            &b,
            Operation::Delete,
            StoreRequest::new("tasks")
                .with_key(1)
                .with_record(record(json!({ "key": 1 }))),
        )
        .await
        .unwrap();

    assert!(notifications(&mut a_rx).is_empty());
    assert_eq!(h.registry.pending_count(&a), 0);
}

#[tokio::test]
async fn test_conditions_filter_which_sessions_are_notified() {
    let h = Harness::new();
    let (open, mut open_rx) = h.connect("ann");
    let (done, mut done_rx) = h.connect("bob");
    let (writer, _w_rx) = h.connect("cat");

    for (session, conditions) in [(&open, "done = false"), (&done, "done = true")] {
        h.orchestrator
            .execute(
                session,
                Operation::Fetch,
                StoreRequest::new("tasks").with_conditions(conditions, Parameters::new()),
            )
            .await
            .unwrap();
    }

    h.orchestrator
        .execute(
            &writer,
            Operation::Create,
            StoreRequest::new("tasks").with_record(record(json!({ "done": false }))),
        )
        .await
        .unwrap();

    assert_eq!(notifications(&mut open_rx).len(), 1);
    assert!(notifications(&mut done_rx).is_empty());
}

#[tokio::test]
async fn test_disconnected_session_receives_queue_in_order_on_reconnect() {
    let h = Harness::new();
    let watcher = h.registry.create_session(UserData::new("ann"));
    let (writer, _w_rx) = h.connect("bob");
    h.registry
        .record_query(&watcher, "tasks", None, Parameters::new());

    for n in 1..=3 {
        h.orchestrator
            .execute(
                &writer,
                Operation::Create,
                StoreRequest::new("tasks").with_record(record(json!({ "key": n }))),
            )
            .await
            .unwrap();
    }

    assert_eq!(h.registry.pending_count(&watcher), 3);
    let keys: Vec<Key> = h
        .registry
        .drain_queue(&watcher)
        .into_iter()
        .map(|n| n.key)
        .collect();
    assert_eq!(keys, vec![Key::number(1), Key::number(2), Key::number(3)]);
}

#[tokio::test]
async fn test_logout_of_one_session_keeps_the_other() {
    let h = Harness::new();
    let (first, _rx1) = h.connect("ann");
    let (second, mut rx2) = h.connect("ann");
    let (writer, _w_rx) = h.connect("bob");

    h.orchestrator
        .execute(&second, Operation::Fetch, StoreRequest::new("tasks"))
        .await
        .unwrap();
    assert!(h.registry.logout(&first));

    assert!(!h.registry.check_session(&first));
    assert!(h.registry.check_session(&second));
    assert_eq!(h.registry.interest_counts(&second), Some((1, 0)));

    h.orchestrator
        .execute(
            &writer,
            Operation::Create,
            StoreRequest::new("tasks").with_record(record(json!({ "title": "x" }))),
        )
        .await
        .unwrap();
    assert_eq!(notifications(&mut rx2).len(), 1);
}

#[tokio::test]
async fn test_expired_session_is_not_a_candidate() {
    let h = Harness::new();
    let (stale, _stale_rx) = h.connect("ann");
    h.registry.record_query(&stale, "tasks", None, Parameters::new());
    h.clock.advance(61_000);
    let (writer, _w_rx) = h.connect("bob");

    assert_eq!(h.registry.prune_expired(), 1);
    let report = h
        .orchestrator
        .handle(
            &writer,
            Operation::Create,
            StoreRequest::new("tasks").with_record(record(json!({ "title": "x" }))),
            |reply| assert!(reply.is_ok()),
        )
        .await
        .unwrap();
    assert_eq!(report.candidates, 0);
}
