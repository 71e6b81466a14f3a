//! Committed changes handed to the distributor.

use tether_proto::{ChangeAction, Key, Notification, Record, Relation};

use crate::session::SessionId;

/// A committed change, with relation fields already merged into the record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMutation {
    pub action: ChangeAction,
    pub bucket: String,
    pub key: Key,
    pub record: Record,
    /// Session whose request committed the change.
    pub origin: SessionId,
    /// Commit time in milliseconds.
    pub committed_at: u64,
}

impl StoreMutation {
    /// The notification pushed to interested sessions.
    pub fn notification(&self) -> Notification {
        Notification::new(
            self.action,
            self.bucket.clone(),
            self.key.clone(),
            self.record.clone(),
        )
    }
}

/// Merge relation fields into a record.
///
/// A to-one relation sets its property to the first key, or `null` when it
/// has none. A to-many relation sets its property to the key list.
pub fn materialize_relations(record: &mut Record, relations: &[Relation]) {
    for relation in relations {
        record.insert(relation.property_name.clone(), relation.property_value());
    }
}

/// Set the primary key field of a record if it is missing.
pub(crate) fn ensure_key_field(record: &mut Record, field: &str, key: &Key) {
    if !record.contains_key(field) {
        record.insert(field.to_string(), key.to_value());
    }
}
