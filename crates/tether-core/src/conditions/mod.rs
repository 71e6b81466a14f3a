//! Conditions language used to filter fetches and match stored queries.
//!
//! A conditions string such as `status = 'open' AND owner = {me}` is compiled
//! once and cached. Strings that fail to compile never match. The cache holds
//! at most `max_entries` strings and evicts the least recently used one.

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tether_proto::{Parameters, Record};

use crate::backend::QueryPredicate;

pub use ast::{CompareOp, Expr, Literal, Operand};
pub use error::ConditionsError;
pub use eval::evaluate;
pub use parser::{parse, MAX_DEPTH};

/// Default number of compiled conditions strings kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// A compiled conditions string and when it was last used.
struct CachedConditions {
    expr: Option<Arc<Expr>>,
    last_used: AtomicU64,
}

/// [`QueryPredicate`] over the conditions language, with a bounded compile cache.
pub struct ConditionsEvaluator {
    cache: DashMap<String, CachedConditions>,
    max_entries: usize,
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl Default for ConditionsEvaluator {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ConditionsEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator caching at most `max_entries` strings (at least one).
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            cache: DashMap::new(),
            max_entries: max_entries.max(1),
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Compiled form of a conditions string, or `None` if it does not parse.
    pub fn compile(&self, conditions: &str) -> Option<Arc<Expr>> {
        let now = self.clock.fetch_add(1, Ordering::Relaxed);
        if let Some(cached) = self.cache.get(conditions) {
            cached.last_used.store(now, Ordering::Relaxed);
            return cached.expr.clone();
        }

        let compiled = match parse(conditions) {
            Ok(expr) => Some(Arc::new(expr)),
            Err(e) => {
                tracing::warn!(conditions, error = %e, "invalid conditions never match");
                None
            }
        };

        while self.cache.len() >= self.max_entries {
            if !self.evict_lru() {
                break;
            }
        }
        self.cache.insert(
            conditions.to_string(),
            CachedConditions {
                expr: compiled.clone(),
                last_used: AtomicU64::new(now),
            },
        );
        compiled
    }

    /// Drop the least recently used entry. Returns false if the cache was empty.
    fn evict_lru(&self) -> bool {
        // No shard guard may be alive when `remove` runs.
        let oldest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                if self.cache.remove(&key).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                true
            }
            None => false,
        }
    }

    /// Number of cached conditions strings.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Maximum number of cached conditions strings.
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Entries evicted to stay within capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl QueryPredicate for ConditionsEvaluator {
    fn evaluate(&self, conditions: &str, parameters: &Parameters, record: &Record) -> bool {
        match self.compile(conditions) {
            Some(expr) => evaluate(&expr, record, parameters),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluator_caches_compiled_conditions() {
        let evaluator = ConditionsEvaluator::new();
        let record = json!({ "n": 1 }).as_object().cloned().unwrap();

        assert!(evaluator.evaluate("n = 1", &Parameters::new(), &record));
        assert!(!evaluator.evaluate("n = 2", &Parameters::new(), &record));
        assert!(evaluator.evaluate("n = 1", &Parameters::new(), &record));
        assert_eq!(evaluator.cached(), 2);
    }

    #[test]
    fn test_invalid_conditions_never_match() {
        let evaluator = ConditionsEvaluator::new();
        let record = Record::new();

        assert!(!evaluator.evaluate("n = = 1", &Parameters::new(), &record));
        assert!(evaluator.compile("n = = 1").is_none());
    }

    #[test]
    fn test_cache_stays_within_capacity() {
        let evaluator = ConditionsEvaluator::with_capacity(16);
        let record = json!({ "n": 3 }).as_object().cloned().unwrap();

        for i in 0..5_000 {
            evaluator.evaluate(&format!("n = {}", i), &Parameters::new(), &record);
            evaluator.evaluate(&format!("n = = {}", i), &Parameters::new(), &record);
        }

        assert_eq!(evaluator.cached(), 16);
        assert_eq!(evaluator.evictions(), 10_000 - 16);
        assert!(evaluator.evaluate("n = 3", &Parameters::new(), &record));
    }

    #[test]
    fn test_recently_used_entries_survive_eviction() {
        let evaluator = ConditionsEvaluator::with_capacity(2);

        evaluator.compile("a = 1");
        evaluator.compile("b = 1");
        evaluator.compile("a = 1");
        evaluator.compile("c = 1");

        assert_eq!(evaluator.cached(), 2);
        assert!(evaluator.cache.contains_key("a = 1"));
        assert!(!evaluator.cache.contains_key("b = 1"));
    }

    #[test]
    fn test_deeply_nested_conditions_never_match() {
        let evaluator = ConditionsEvaluator::new();
        let record = json!({ "x": true }).as_object().cloned().unwrap();
        let nested = format!("{}x{}", "(".repeat(100_000), ")".repeat(100_000));

        assert!(!evaluator.evaluate(&nested, &Parameters::new(), &record));
        assert!(evaluator.compile(&nested).is_none());
        assert!(evaluator.evaluate(&format!("{}x", "!".repeat(2)), &Parameters::new(), &record));
    }
}
