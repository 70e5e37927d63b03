//! Result Store - bounded in-memory cache of analysis results
//!
//! Keyed by fix id. When full, the oldest *inserted* entry is evicted;
//! lookups never refresh an entry's position. Starts empty, holds nothing
//! durable. The daemon shares one instance behind a `tokio::sync::RwLock`.

use crate::analysis::AnalysisResult;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Default number of results kept in memory
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct ResultStore {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, AnalysisResult>,
}

impl ResultStore {
    /// A capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Store a result under its fix id, returning the evicted id if any.
    ///
    /// Re-inserting an existing id replaces the value and keeps its slot.
    pub fn insert(&mut self, result: AnalysisResult) -> Option<String> {
        let id = result.fix_id.clone();

        if let Some(existing) = self.entries.get_mut(&id) {
            *existing = result;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.order.pop_front().map(|oldest| {
                self.entries.remove(&oldest);
                debug!("Result store full, evicted {}", oldest);
                oldest
            })
        } else {
            None
        };

        self.order.push_back(id.clone());
        self.entries.insert(id, result);
        evicted
    }

    pub fn get(&self, fix_id: &str) -> Option<&AnalysisResult> {
        self.entries.get(fix_id)
    }

    pub fn contains(&self, fix_id: &str) -> bool {
        self.entries.contains_key(fix_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> AnalysisResult {
        AnalysisResult {
            fix_id: id.to_string(),
            timestamp: chrono::Utc::now(),
            issues_found: 0,
            known_issues: Vec::new(),
            ai_issues: Vec::new(),
            analysis: String::new(),
            fix_script: format!("# script {}", id),
            ai_insights: None,
            partial: false,
        }
    }

    #[test]
    fn test_starts_empty() {
        let store = ResultStore::default();
        assert!(store.is_empty());
        assert_eq!(store.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_evicts_oldest_inserted_first() {
        let mut store = ResultStore::new(3);
        for id in ["a", "b", "c"] {
            assert_eq!(store.insert(result(id)), None);
        }
        assert_eq!(store.insert(result("d")), Some("a".to_string()));
        assert_eq!(store.insert(result("e")), Some("b".to_string()));
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_none());
        assert_eq!(store.len(), 3);
        assert!(store.contains("c") && store.contains("d") && store.contains("e"));
    }

    #[test]
    fn test_lookup_does_not_refresh() {
        let mut store = ResultStore::new(2);
        store.insert(result("a"));
        store.insert(result("b"));
        assert!(store.get("a").is_some());
        assert_eq!(store.insert(result("c")), Some("a".to_string()));
    }

    #[test]
    fn test_reinsert_replaces_in_place() {
        let mut store = ResultStore::new(2);
        store.insert(result("a"));
        store.insert(result("b"));
        let mut updated = result("a");
        updated.analysis = "updated".to_string();
        assert_eq!(store.insert(updated), None);
        assert_eq!(store.get("a").unwrap().analysis, "updated");
        assert_eq!(store.len(), 2);
        // "a" is still the oldest insertion
        assert_eq!(store.insert(result("c")), Some("a".to_string()));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut store = ResultStore::new(0);
        store.insert(result("a"));
        assert_eq!(store.insert(result("b")), Some("a".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_round_trip_script_is_identical() {
        let mut store = ResultStore::new(4);
        let original = result("rt");
        let script = original.fix_script.clone();
        store.insert(original);
        assert_eq!(store.get("rt").unwrap().fix_script.as_bytes(), script.as_bytes());
    }
}
