//! Per-session interest tracking.
//!
//! A session is interested in a record if it fetched a query the record
//! satisfies, or if it has seen the record itself. The tracker holds both
//! kinds of interest and answers how a mutated record relates to them.

use std::collections::HashMap;

use tether_proto::{Key, Parameters};

use crate::backend::QueryPredicate;
use crate::mutation::StoreMutation;

/// A query a session has fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryInterest {
    pub conditions: Option<String>,
    pub parameters: Parameters,
}

/// How a mutated record relates to a session's interests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVerdict {
    /// Neither a known key nor a matching query.
    NoMatch,
    /// The session has seen this exact record.
    BucketKey,
    /// The record satisfies a query the session fetched.
    Query,
}

/// Queries and record keys one session has seen.
#[derive(Debug, Default)]
pub struct InterestTracker {
    queries: HashMap<String, Vec<QueryInterest>>,
    keys: HashMap<String, HashMap<Key, u64>>,
}

impl InterestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a fetched query. Duplicates are kept.
    pub fn record_query(
        &mut self,
        bucket: &str,
        conditions: Option<String>,
        parameters: Parameters,
    ) {
        self.queries
            .entry(bucket.to_string())
            .or_default()
            .push(QueryInterest {
                conditions,
                parameters,
            });
    }

    /// Remember a seen record, refreshing its timestamp if already known.
    pub fn record_key(&mut self, bucket: &str, key: &Key, timestamp: u64) {
        self.keys
            .entry(bucket.to_string())
            .or_default()
            .insert(key.clone(), timestamp);
    }

    /// Forget a seen record.
    pub fn forget_key(&mut self, bucket: &str, key: &Key) {
        if let Some(keys) = self.keys.get_mut(bucket) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys.remove(bucket);
            }
        }
    }

    /// Forget several seen records.
    pub fn forget_records(&mut self, records: &[(String, Key)]) {
        for (bucket, key) in records {
            self.forget_key(bucket, key);
        }
    }

    /// Classify a mutation against this tracker. Key interest wins over
    /// query interest.
    pub fn matches(
        &self,
        mutation: &StoreMutation,
        predicate: &dyn QueryPredicate,
    ) -> MatchVerdict {
        if self
            .keys
            .get(&mutation.bucket)
            .is_some_and(|keys| keys.contains_key(&mutation.key))
        {
            return MatchVerdict::BucketKey;
        }

        let Some(queries) = self.queries.get(&mutation.bucket) else {
            return MatchVerdict::NoMatch;
        };

        let hit = queries.iter().any(|query| match &query.conditions {
            None => true,
            Some(conditions) if conditions.trim().is_empty() => true,
            Some(conditions) => predicate.evaluate(conditions, &query.parameters, &mutation.record),
        });

        if hit {
            MatchVerdict::Query
        } else {
            MatchVerdict::NoMatch
        }
    }

    /// Timestamp of a seen record.
    pub fn key_timestamp(&self, bucket: &str, key: &Key) -> Option<u64> {
        self.keys.get(bucket).and_then(|keys| keys.get(key)).copied()
    }

    pub fn query_count(&self) -> usize {
        self.queries.values().map(Vec::len).sum()
    }

    pub fn key_count(&self) -> usize {
        self.keys.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.keys.is_empty()
    }
}
