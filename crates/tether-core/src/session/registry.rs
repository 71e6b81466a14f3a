//! Registry of live sessions.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tether_proto::{Key, Notification, Parameters, ServerMessage};

use super::{generate_session_key, SessionId, UserData};
use crate::backend::QueryPredicate;
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::connection::ConnectionHandle;
use crate::interest::{InterestTracker, MatchVerdict};
use crate::mutation::StoreMutation;

/// State of one live session.
struct SessionEntry {
    id: SessionId,
    user_data: UserData,
    last_seen: u64,
    tracker: InterestTracker,
    connection: Option<ConnectionHandle>,
    pending: VecDeque<Notification>,
}

impl SessionEntry {
    /// Send over the attached connection, detaching it if it is closed.
    fn try_send(&mut self, notification: &Notification) -> bool {
        let Some(connection) = &self.connection else {
            return false;
        };
        if connection.send(ServerMessage::Notification(notification.clone())) {
            return true;
        }

        tracing::debug!(
            user = %self.id.user,
            session = %self.id,
            connection_id = connection.id(),
            "push failed, detaching connection"
        );
        self.connection = None;
        false
    }

    /// Append to the pending queue, dropping the oldest entry when full.
    fn queue(&mut self, notification: Notification, max_pending: Option<usize>) {
        if let Some(max) = max_pending {
            if self.pending.len() >= max {
                self.pending.pop_front();
                tracing::warn!(
                    user = %self.id.user,
                    session = %self.id,
                    max_pending = max,
                    "pending queue full, dropped oldest notification"
                );
            }
        }
        self.pending.push_back(notification);
    }
}

/// Outcome of [`SessionRegistry::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Sent over the live connection.
    Delivered,
    /// Appended to the pending queue.
    Queued,
    /// The session no longer exists.
    Gone,
}

#[derive(Default)]
struct RegistryState {
    /// Sessions keyed by creation sequence, so iteration follows insertion order.
    sessions: BTreeMap<u64, SessionEntry>,
    /// Sequence numbers of each session.
    index: HashMap<SessionId, u64>,
    /// Sequence numbers of each user's sessions.
    users: HashMap<String, Vec<u64>>,
    next_seq: u64,
}

impl RegistryState {
    fn get(&self, id: &SessionId) -> Option<&SessionEntry> {
        self.index.get(id).and_then(|seq| self.sessions.get(seq))
    }

    fn get_mut(&mut self, id: &SessionId) -> Option<&mut SessionEntry> {
        let seq = *self.index.get(id)?;
        self.sessions.get_mut(&seq)
    }

    fn remove(&mut self, id: &SessionId) -> Option<SessionEntry> {
        let seq = self.index.remove(id)?;
        if let Some(seqs) = self.users.get_mut(&id.user) {
            seqs.retain(|s| *s != seq);
            if seqs.is_empty() {
                self.users.remove(&id.user);
            }
        }
        self.sessions.remove(&seq)
    }
}

/// All live sessions, their interests, connections and pending queues.
///
/// Every method is a short synchronous critical section; the lock is never
/// held across an await point. Operations on a session that has been evicted
/// are no-ops that report `false` or [`MatchVerdict::NoMatch`].
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Create a registry on the wall clock.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry on a custom clock.
    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current time in milliseconds on the registry's clock.
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn timeout_millis(&self) -> u64 {
        self.config.timeout.as_millis() as u64
    }

    /// Open a session for an authenticated user.
    pub fn create_session(&self, user_data: UserData) -> SessionId {
        let id = SessionId::new(user_data.user.clone(), generate_session_key());
        let now = self.now();

        let mut state = self.state.write();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.sessions.insert(
            seq,
            SessionEntry {
                id: id.clone(),
                user_data,
                last_seen: now,
                tracker: InterestTracker::new(),
                connection: None,
                pending: VecDeque::new(),
            },
        );
        state.index.insert(id.clone(), seq);
        state.users.entry(id.user.clone()).or_default().push(seq);
        let sessions = state.sessions.len();
        drop(state);

        tracing::info!(user = %id.user, session = %id, sessions, "session created");
        id
    }

    /// Validate a session and slide its expiry forward.
    ///
    /// An expired session is evicted on the spot.
    pub fn check_session(&self, id: &SessionId) -> bool {
        let now = self.now();
        let timeout = self.timeout_millis();

        let mut state = self.state.write();
        let Some(entry) = state.get_mut(id) else {
            return false;
        };

        if now.saturating_sub(entry.last_seen) <= timeout {
            entry.last_seen = now;
            return true;
        }

        let idle_ms = now.saturating_sub(entry.last_seen);
        state.remove(id);
        drop(state);

        tracing::info!(user = %id.user, session = %id, idle_ms, "session timed out");
        false
    }

    /// Identity attached to a session.
    pub fn user_data(&self, id: &SessionId) -> Option<UserData> {
        self.state.read().get(id).map(|e| e.user_data.clone())
    }

    /// End a session. Returns false if it did not exist.
    pub fn logout(&self, id: &SessionId) -> bool {
        let removed = self.state.write().remove(id);
        match removed {
            Some(_) => {
                tracing::info!(user = %id.user, session = %id, "session logged out");
                true
            }
            None => false,
        }
    }

    /// Snapshot of live sessions in creation order, without `excluded`.
    pub fn all_sessions_except(&self, excluded: &SessionId) -> std::vec::IntoIter<SessionId> {
        let state = self.state.read();
        state
            .sessions
            .values()
            .filter(|e| &e.id != excluded)
            .map(|e| e.id.clone())
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Push a notification over the session's connection.
    ///
    /// Returns false when no connection is attached, the connection is closed
    /// or the session is gone. A closed connection is detached.
    pub fn deliver(&self, id: &SessionId, notification: &Notification) -> bool {
        self.state
            .write()
            .get_mut(id)
            .is_some_and(|entry| entry.try_send(notification))
    }

    /// Queue a notification for later delivery. Returns false if the session
    /// is gone.
    ///
    /// When the queue is full the oldest entry is dropped.
    pub fn enqueue(&self, id: &SessionId, notification: Notification) -> bool {
        let mut state = self.state.write();
        let Some(entry) = state.get_mut(id) else {
            return false;
        };
        entry.queue(notification, self.config.max_pending);
        true
    }

    /// Deliver a notification, or queue it if it cannot be delivered.
    ///
    /// Both steps run under one lock, so a concurrent [`attach`] either sees
    /// the queued entry and flushes it or is seen by the delivery.
    ///
    /// [`attach`]: SessionRegistry::attach
    pub fn push(&self, id: &SessionId, notification: &Notification) -> PushOutcome {
        let mut state = self.state.write();
        let Some(entry) = state.get_mut(id) else {
            return PushOutcome::Gone;
        };
        if entry.try_send(notification) {
            return PushOutcome::Delivered;
        }
        entry.queue(notification.clone(), self.config.max_pending);
        PushOutcome::Queued
    }

    /// Take every queued notification in FIFO order.
    pub fn drain_queue(&self, id: &SessionId) -> Vec<Notification> {
        let mut state = self.state.write();
        match state.get_mut(id) {
            Some(entry) => std::mem::take(&mut entry.pending).into(),
            None => Vec::new(),
        }
    }

    /// Number of queued notifications.
    pub fn pending_count(&self, id: &SessionId) -> usize {
        self.state.read().get(id).map_or(0, |e| e.pending.len())
    }

    /// Attach a push connection, replacing any previous one.
    ///
    /// Queued notifications are flushed into the new connection first, in
    /// FIFO order, so they always precede live pushes.
    pub fn attach(&self, id: &SessionId, connection: ConnectionHandle) -> bool {
        let connection_id = connection.id();
        let mut state = self.state.write();
        let Some(entry) = state.get_mut(id) else {
            return false;
        };

        entry.connection = Some(connection);
        let mut flushed = 0;
        while let Some(notification) = entry.pending.pop_front() {
            if !entry.try_send(&notification) {
                entry.pending.push_front(notification);
                break;
            }
            flushed += 1;
        }
        drop(state);

        tracing::debug!(
            user = %id.user,
            session = %id,
            connection_id,
            flushed,
            "connection attached"
        );
        true
    }

    /// Detach the connection if it is still `connection_id`.
    pub fn detach(&self, id: &SessionId, connection_id: u64) -> bool {
        let mut state = self.state.write();
        let Some(entry) = state.get_mut(id) else {
            return false;
        };
        if entry.connection.as_ref().map(ConnectionHandle::id) != Some(connection_id) {
            return false;
        }
        entry.connection = None;
        drop(state);

        tracing::debug!(user = %id.user, session = %id, connection_id, "connection detached");
        true
    }

    /// Whether a live connection is attached.
    pub fn is_connected(&self, id: &SessionId) -> bool {
        self.state
            .read()
            .get(id)
            .and_then(|e| e.connection.as_ref())
            .is_some_and(|c| !c.is_closed())
    }

    pub fn record_query(
        &self,
        id: &SessionId,
        bucket: &str,
        conditions: Option<String>,
        parameters: Parameters,
    ) {
        if let Some(entry) = self.state.write().get_mut(id) {
            entry.tracker.record_query(bucket, conditions, parameters);
        }
    }

    pub fn record_key(&self, id: &SessionId, bucket: &str, key: &Key, timestamp: u64) {
        if let Some(entry) = self.state.write().get_mut(id) {
            entry.tracker.record_key(bucket, key, timestamp);
        }
    }

    pub fn forget_key(&self, id: &SessionId, bucket: &str, key: &Key) {
        if let Some(entry) = self.state.write().get_mut(id) {
            entry.tracker.forget_key(bucket, key);
        }
    }

    pub fn forget_records(&self, id: &SessionId, records: &[(String, Key)]) {
        if let Some(entry) = self.state.write().get_mut(id) {
            entry.tracker.forget_records(records);
        }
    }

    /// Classify a mutation against a session's interests.
    pub fn matches(
        &self,
        id: &SessionId,
        mutation: &StoreMutation,
        predicate: &dyn QueryPredicate,
    ) -> MatchVerdict {
        match self.state.read().get(id) {
            Some(entry) => entry.tracker.matches(mutation, predicate),
            None => MatchVerdict::NoMatch,
        }
    }

    /// Timestamp of a record in a session's key interest.
    pub fn key_timestamp(&self, id: &SessionId, bucket: &str, key: &Key) -> Option<u64> {
        self.state
            .read()
            .get(id)
            .and_then(|e| e.tracker.key_timestamp(bucket, key))
    }

    /// Number of queries and keys a session tracks.
    pub fn interest_counts(&self, id: &SessionId) -> Option<(usize, usize)> {
        self.state
            .read()
            .get(id)
            .map(|e| (e.tracker.query_count(), e.tracker.key_count()))
    }

    /// Evict every session idle past the timeout.
    pub fn prune_expired(&self) -> usize {
        let now = self.now();
        let timeout = self.timeout_millis();

        let mut state = self.state.write();
        let expired: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|e| now.saturating_sub(e.last_seen) > timeout)
            .map(|e| e.id.clone())
            .collect();
        for id in &expired {
            state.remove(id);
        }
        drop(state);

        for id in &expired {
            tracing::info!(user = %id.user, session = %id, "session expired");
        }
        expired.len()
    }

    pub fn session_count(&self) -> usize {
        self.state.read().sessions.len()
    }

    pub fn user_count(&self) -> usize {
        self.state.read().users.len()
    }

    /// Drop every session, closing their push channels.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.state.write();
            let count = state.sessions.len();
            *state = RegistryState::default();
            count
        };
        tracing::info!(sessions = dropped, "session registry shut down");
    }
}
