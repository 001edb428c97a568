// src/recording/log_store.rs
//! Bounded, insertion-ordered record log
//!
//! Eviction always removes the oldest records; the newest record is never
//! evicted by its own append.

use crate::recording::record::CaptureRecord;
use std::collections::VecDeque;

/// Bounded log of capture records
#[derive(Debug, Clone)]
pub struct LogStore {
    records: VecDeque<CaptureRecord>,
    cap: usize,
}

impl LogStore {
    /// Create an empty store; a zero cap is raised to one
    pub fn new(cap: usize) -> Self {
        Self {
            records: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Rebuild a store from persisted records, keeping only the newest `cap`
    pub fn from_records(records: Vec<CaptureRecord>, cap: usize) -> Self {
        let mut store = Self {
            records: records.into(),
            cap: cap.max(1),
        };
        store.enforce_cap();
        store
    }

    /// Append a record and evict past the cap, returning the number evicted
    pub fn push(&mut self, record: CaptureRecord) -> usize {
        self.records.push_back(record);
        self.enforce_cap()
    }

    /// Change the cap and evict if needed
    pub fn set_cap(&mut self, cap: usize) -> usize {
        self.cap = cap.max(1);
        self.enforce_cap()
    }

    /// Drop the oldest records until at most `max` remain
    pub fn trim_to(&mut self, max: usize) -> usize {
        let excess = self.records.len().saturating_sub(max);
        self.records.drain(..excess);
        excess
    }

    fn enforce_cap(&mut self) -> usize {
        self.trim_to(self.cap)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Owned copy of the records in arrival order
    pub fn snapshot(&self) -> Vec<CaptureRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::record::ApiType;
    use proptest::prelude::*;

    fn record(url: &str) -> CaptureRecord {
        CaptureRecord::new(ApiType::Fetch, url)
    }

    #[test]
    fn test_evicts_oldest() {
        let mut store = LogStore::new(2);
        store.push(record("A"));
        store.push(record("B"));
        assert_eq!(store.push(record("C")), 1);

        let urls: Vec<_> = store.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["B", "C"]);
    }

    #[test]
    fn test_from_records_applies_cap() {
        let store = LogStore::from_records(vec![record("1"), record("2"), record("3")], 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.snapshot()[0].url, "2");
    }

    #[test]
    fn test_lowering_cap_trims() {
        let mut store = LogStore::new(10);
        for i in 0..5 {
            store.push(record(&i.to_string()));
        }
        assert_eq!(store.set_cap(3), 2);
        assert_eq!(store.snapshot()[0].url, "2");
    }

    #[test]
    fn test_trim_to_larger_bound_is_noop() {
        let mut store = LogStore::new(10);
        store.push(record("x"));
        assert_eq!(store.trim_to(5), 0);
        assert_eq!(store.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_length_bounded_and_newest_retained(cap in 1usize..20, count in 0usize..60) {
            let mut store = LogStore::new(cap);
            for i in 0..count {
                store.push(record(&i.to_string()));
                prop_assert!(store.len() <= cap);
            }

            let expected: Vec<String> = (count.saturating_sub(cap)..count)
                .map(|i| i.to_string())
                .collect();
            let actual: Vec<String> = store.iter().map(|r| r.url.clone()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
