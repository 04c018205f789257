//! Candidate pool
//!
//! Per-run collection of candidate edition keys found under blocking
//! keys. Advisory only: newly written editions are registered in memory
//! so later records in the same run can find them even while the store's
//! own index lags.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::index::KeyType;
use crate::store::{DocStore, Query, StoreError};

/// Store queries are batched to at most this many key values each.
pub const MAX_QUERY_KEYS: usize = 100;

/// Candidate editions from two sources: batched store hits, held per key
/// type (a batched query does not report which value matched), and
/// same-run registrations, held per key type and value.
#[derive(Debug, Default)]
pub struct CandidatePool {
    hits: BTreeMap<KeyType, BTreeSet<String>>,
    registered: BTreeMap<KeyType, HashMap<String, BTreeSet<String>>>,
}

impl CandidatePool {
    /// Query the store for candidate editions per blocking key. Edition
    /// keys are deduplicated across key types within this one build call.
    pub fn build(
        store: &dyn DocStore,
        fields: &BTreeMap<KeyType, Vec<String>>,
    ) -> Result<Self, StoreError> {
        let mut pool = CandidatePool::default();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (kind, values) in fields {
            for chunk in values.chunks(MAX_QUERY_KEYS) {
                let found = store.query(&Query::EditionsByIndexKey(*kind, chunk.to_vec()))?;
                for edition_key in found {
                    if seen.insert(edition_key.clone()) {
                        pool.hits.entry(*kind).or_default().insert(edition_key);
                    }
                }
            }
        }
        Ok(pool)
    }

    pub fn is_empty(&self) -> bool {
        self.hits.values().all(BTreeSet::is_empty)
            && self
                .registered
                .values()
                .all(|m| m.values().all(BTreeSet::is_empty))
    }

    /// Candidate edition keys in deterministic (key type, then key) order,
    /// without repeats.
    pub fn candidates(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for keys in self.hits.values() {
            for key in keys {
                if seen.insert(key.clone()) {
                    out.push(key.clone());
                }
            }
        }
        for by_value in self.registered.values() {
            let mut values: Vec<_> = by_value.keys().collect();
            values.sort();
            for value in values {
                for key in &by_value[value] {
                    if seen.insert(key.clone()) {
                        out.push(key.clone());
                    }
                }
            }
        }
        out
    }

    /// Registered edition keys held under any of the given blocking keys,
    /// in deterministic order without repeats. Batched store hits are not
    /// consulted; they carry no per-value attribution.
    pub fn lookup(&self, fields: &BTreeMap<KeyType, Vec<String>>) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (kind, values) in fields {
            let Some(by_value) = self.registered.get(kind) else {
                continue;
            };
            for value in values {
                let Some(keys) = by_value.get(value) else {
                    continue;
                };
                for key in keys {
                    if seen.insert(key.clone()) {
                        out.push(key.clone());
                    }
                }
            }
        }
        out
    }

    /// Record a freshly written edition under each of its blocking keys so
    /// subsequent records in this run can match against it.
    pub fn register(&mut self, edition_key: &str, fields: &BTreeMap<KeyType, Vec<String>>) {
        for (kind, values) in fields {
            for value in values {
                self.registered
                    .entry(*kind)
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .insert(edition_key.to_string());
            }
        }
    }
}
