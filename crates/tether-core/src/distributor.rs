//! Fan-out of committed changes to interested sessions.

use std::sync::Arc;

use tether_proto::ChangeAction;

use crate::backend::QueryPredicate;
use crate::interest::MatchVerdict;
use crate::mutation::StoreMutation;
use crate::session::{PushOutcome, SessionRegistry};

/// What to do with a change for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Push it, or queue it if the push fails.
    Deliver,
    /// The session matched, but the change must not be sent.
    Suppress,
    /// The session has no interest in the change.
    Skip,
}

/// Decide how a change reaches a session with the given verdict.
///
/// A delete only reaches sessions that saw the record itself: a session that
/// merely ran a matching query never held the record.
pub fn disposition(action: ChangeAction, verdict: MatchVerdict) -> Disposition {
    match (action, verdict) {
        (_, MatchVerdict::NoMatch) => Disposition::Skip,
        (ChangeAction::Create, MatchVerdict::BucketKey) => Disposition::Deliver,
        (ChangeAction::Create, MatchVerdict::Query) => Disposition::Deliver,
        (ChangeAction::Update, MatchVerdict::BucketKey) => Disposition::Deliver,
        (ChangeAction::Update, MatchVerdict::Query) => Disposition::Deliver,
        (ChangeAction::Delete, MatchVerdict::BucketKey) => Disposition::Deliver,
        (ChangeAction::Delete, MatchVerdict::Query) => Disposition::Suppress,
    }
}

/// Outcome of one distribution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Sessions other than the originator.
    pub candidates: usize,
    /// Pushed over a live connection.
    pub delivered: usize,
    /// Queued for later delivery.
    pub queued: usize,
    /// Matched, but suppressed by the decision matrix.
    pub suppressed: usize,
    /// No interest.
    pub skipped: usize,
    /// Evicted between enumeration and delivery.
    pub dropped: usize,
}

/// Pushes committed changes to every other session interested in them.
pub struct ChangeDistributor {
    registry: Arc<SessionRegistry>,
    predicate: Arc<dyn QueryPredicate>,
}

impl ChangeDistributor {
    pub fn new(registry: Arc<SessionRegistry>, predicate: Arc<dyn QueryPredicate>) -> Self {
        Self {
            registry,
            predicate,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn predicate(&self) -> &Arc<dyn QueryPredicate> {
        &self.predicate
    }

    /// Deliver or queue a committed change for every interested session
    /// except the one that made it. Best effort: nothing is rolled back.
    pub fn distribute(&self, mutation: &StoreMutation) -> DistributionReport {
        let mut report = DistributionReport::default();
        let notification = mutation.notification();

        tracing::trace!(
            user = %mutation.origin.user,
            bucket = %mutation.bucket,
            key = %mutation.key,
            "skipping originating session"
        );

        for session in self.registry.all_sessions_except(&mutation.origin) {
            report.candidates += 1;

            let verdict = self
                .registry
                .matches(&session, mutation, self.predicate.as_ref());

            match disposition(mutation.action, verdict) {
                Disposition::Skip => report.skipped += 1,
                Disposition::Suppress => report.suppressed += 1,
                Disposition::Deliver => {
                    match self.registry.push(&session, &notification) {
                        PushOutcome::Delivered => {
                            report.delivered += 1;
                            self.registry.record_key(
                                &session,
                                &mutation.bucket,
                                &mutation.key,
                                self.registry.now(),
                            );
                        }
                        PushOutcome::Queued => report.queued += 1,
                        PushOutcome::Gone => {
                            report.dropped += 1;
                            continue;
                        }
                    }

                    if mutation.action == ChangeAction::Delete {
                        self.registry
                            .forget_key(&session, &mutation.bucket, &mutation.key);
                    }
                }
            }
        }

        tracing::debug!(
            action = %mutation.action,
            bucket = %mutation.bucket,
            key = %mutation.key,
            candidates = report.candidates,
            delivered = report.delivered,
            queued = report.queued,
            suppressed = report.suppressed,
            "change distributed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AcceptAll;
    use crate::config::SessionConfig;
    use crate::connection::ConnectionHandle;
    use crate::session::{SessionId, UserData};
    use serde_json::json;
    use tether_proto::{Key, Parameters, Record, ServerMessage};

    fn setup() -> (Arc<SessionRegistry>, ChangeDistributor) {
        let registry = Arc::new(SessionRegistry::new(SessionConfig::default()));
        let distributor = ChangeDistributor::new(registry.clone(), Arc::new(AcceptAll));
        (registry, distributor)
    }

    fn mutation(action: ChangeAction, origin: &SessionId, key: i64) -> StoreMutation {
        let mut record = Record::new();
        record.insert("key".to_string(), json!(key));
        StoreMutation {
            action,
            bucket: "tasks".to_string(),
            key: Key::number(key),
            record,
            origin: origin.clone(),
            committed_at: 0,
        }
    }

    #[test]
    fn test_decision_matrix() {
        use ChangeAction::*;
        use MatchVerdict::*;

        for action in [Create, Update, Delete] {
            assert_eq!(disposition(action, NoMatch), Disposition::Skip);
            assert_eq!(disposition(action, BucketKey), Disposition::Deliver);
        }
        assert_eq!(disposition(Create, Query), Disposition::Deliver);
        assert_eq!(disposition(Update, Query), Disposition::Deliver);
        assert_eq!(disposition(Delete, Query), Disposition::Suppress);
    }

    #[test]
    fn test_originator_never_receives_its_own_change() {
        let (registry, distributor) = setup();
        let origin = registry.create_session(UserData::new("ann"));
        registry.record_query(&origin, "tasks", None, Parameters::new());

        let report = distributor.distribute(&mutation(ChangeAction::Create, &origin, 1));
        assert_eq!(report.candidates, 0);
        assert_eq!(registry.pending_count(&origin), 0);
    }

    #[test]
    fn test_delete_with_query_match_is_suppressed() {
        let (registry, distributor) = setup();
        let origin = registry.create_session(UserData::new("ann"));
        let watcher = registry.create_session(UserData::new("bob"));
        registry.record_query(&watcher, "tasks", None, Parameters::new());

        let report = distributor.distribute(&mutation(ChangeAction::Delete, &origin, 1));
        assert_eq!(report.suppressed, 1);
        assert_eq!(report.delivered + report.queued, 0);
        assert_eq!(registry.pending_count(&watcher), 0);
    }

    #[test]
    fn test_disconnected_session_gets_queued() {
        let (registry, distributor) = setup();
        let origin = registry.create_session(UserData::new("ann"));
        let watcher = registry.create_session(UserData::new("bob"));
        registry.record_query(&watcher, "tasks", None, Parameters::new());

        let report = distributor.distribute(&mutation(ChangeAction::Create, &origin, 1));
        assert_eq!(report.queued, 1);
        assert_eq!(registry.pending_count(&watcher), 1);
        // queued recipients have not seen the record yet
        assert!(registry.key_timestamp(&watcher, "tasks", &Key::number(1)).is_none());
    }

    #[test]
    fn test_delivery_records_key_interest() {
        let (registry, distributor) = setup();
        let origin = registry.create_session(UserData::new("ann"));
        let watcher = registry.create_session(UserData::new("bob"));
        registry.record_query(&watcher, "tasks", None, Parameters::new());
        let (handle, mut receiver) = ConnectionHandle::channel();
        registry.attach(&watcher, handle);

        let report = distributor.distribute(&mutation(ChangeAction::Create, &origin, 9));
        assert_eq!(report.delivered, 1);
        assert!(matches!(receiver.try_recv(), Ok(ServerMessage::Notification(_))));
        assert!(registry.key_timestamp(&watcher, "tasks", &Key::number(9)).is_some());
    }

    #[test]
    fn test_delete_forgets_recipient_key() {
        let (registry, distributor) = setup();
        let origin = registry.create_session(UserData::new("ann"));
        let watcher = registry.create_session(UserData::new("bob"));
        registry.record_key(&watcher, "tasks", &Key::number(3), 1);

        let report = distributor.distribute(&mutation(ChangeAction::Delete, &origin, 3));
        assert_eq!(report.queued, 1);
        assert!(registry.key_timestamp(&watcher, "tasks", &Key::number(3)).is_none());
    }

    #[test]
    fn test_uninterested_sessions_are_skipped() {
        let (registry, distributor) = setup();
        let origin = registry.create_session(UserData::new("ann"));
        let other = registry.create_session(UserData::new("bob"));
        registry.record_query(&other, "notes", None, Parameters::new());

        let report = distributor.distribute(&mutation(ChangeAction::Update, &origin, 1));
        assert_eq!(report.candidates, 1);
        assert_eq!(report.skipped, 1);
    }
}
