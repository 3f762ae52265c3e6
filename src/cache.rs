//! Per-surface catalog cache scoped to a configuration fingerprint.
//!
//! Each media-type partition keeps its last materialized list together
//! with the page the next load will request. Entries are only valid under
//! the fingerprint they were stored with: the first access under another
//! fingerprint drops every partition and every prefetch slot at once.

use std::collections::HashMap;
use tracing::debug;

use crate::api::Partition;
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub items: Vec<T>,
    /// Page the next load for this partition requests
    pub page: u32,
    pub has_more: bool,
}

/// Single-slot read-ahead for one partition
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchEntry<T> {
    pub expected_page: u32,
    pub payload: Vec<T>,
    pub has_more: bool,
    pub next_page: Option<u32>,
}

#[derive(Debug)]
pub struct CacheStore<T> {
    fingerprint: Option<Fingerprint>,
    entries: HashMap<Partition, CacheEntry<T>>,
    prefetch: HashMap<Partition, PrefetchEntry<T>>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self {
            fingerprint: None,
            entries: HashMap::new(),
            prefetch: HashMap::new(),
        }
    }
}

impl<T: Clone> CacheStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Switch to `fingerprint`, clearing everything if it differs.
    /// Returns true when a clear happened.
    pub fn ensure(&mut self, fingerprint: &Fingerprint) -> bool {
        if self.fingerprint.as_ref() == Some(fingerprint) {
            return false;
        }
        if self.fingerprint.is_some() {
            debug!(old = ?self.fingerprint, new = %fingerprint, "fingerprint changed, clearing cache");
        }
        self.clear_all();
        self.fingerprint = Some(fingerprint.clone());
        true
    }

    pub fn get(&mut self, fingerprint: &Fingerprint, partition: Partition) -> Option<&CacheEntry<T>> {
        self.ensure(fingerprint);
        self.entries.get(&partition)
    }

    pub fn put(&mut self, fingerprint: &Fingerprint, partition: Partition, entry: CacheEntry<T>) {
        self.ensure(fingerprint);
        self.entries.insert(partition, entry);
    }

    /// Drops every partition and every prefetch slot
    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.prefetch.clear();
    }

    /// Rejects read-ahead fetched under any fingerprint but the live one
    pub fn store_prefetch(
        &mut self,
        fingerprint: &Fingerprint,
        partition: Partition,
        entry: PrefetchEntry<T>,
    ) -> bool {
        if self.fingerprint.as_ref() != Some(fingerprint) {
            return false;
        }
        self.prefetch.insert(partition, entry);
        true
    }

    pub fn clear_prefetch(&mut self, partition: Partition) {
        self.prefetch.remove(&partition);
    }

    /// Consume the slot for `partition`. A slot for a different page is
    /// discarded rather than kept.
    pub fn take_prefetch(
        &mut self,
        fingerprint: &Fingerprint,
        partition: Partition,
        page: u32,
    ) -> Option<PrefetchEntry<T>> {
        self.ensure(fingerprint);
        let entry = self.prefetch.remove(&partition)?;
        if entry.expected_page == page {
            Some(entry)
        } else {
            debug!(
                partition = partition.as_str(),
                expected = entry.expected_page,
                requested = page,
                "discarding mismatched prefetch"
            );
            None
        }
    }

    pub fn prefetched_page(&self, partition: Partition) -> Option<u32> {
        self.prefetch.get(&partition).map(|e| e.expected_page)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{FilterPreferences, Identity};

    fn fp(user: &str) -> Fingerprint {
        FilterPreferences::default().fingerprint(&Identity::User(user.to_string()))
    }

    fn entry(items: &[u32], page: u32) -> CacheEntry<u32> {
        CacheEntry {
            items: items.to_vec(),
            page,
            has_more: true,
        }
    }

    fn slot(page: u32) -> PrefetchEntry<u32> {
        PrefetchEntry {
            expected_page: page,
            payload: vec![99],
            has_more: true,
            next_page: Some(page + 1),
        }
    }

    #[test]
    fn test_hit_under_same_fingerprint() {
        let mut cache = CacheStore::new();
        let a = fp("a");
        cache.put(&a, Partition::Mixed, entry(&[1, 2], 2));
        cache.put(&a, Partition::Movie, entry(&[3], 2));
        assert_eq!(cache.get(&a, Partition::Mixed), Some(&entry(&[1, 2], 2)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_mismatch_clears_every_partition() {
        let mut cache = CacheStore::new();
        let a = fp("a");
        cache.put(&a, Partition::Mixed, entry(&[1], 2));
        cache.put(&a, Partition::Tv, entry(&[2], 2));
        assert!(cache.store_prefetch(&a, Partition::Tv, slot(2)));

        assert!(cache.get(&fp("b"), Partition::Movie).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.prefetched_page(Partition::Tv), None);
        assert!(cache.get(&a, Partition::Mixed).is_none());
    }

    #[test]
    fn test_prefetch_from_stale_fingerprint_rejected() {
        let mut cache: CacheStore<u32> = CacheStore::new();
        let a = fp("a");
        let b = fp("b");
        cache.ensure(&a);
        cache.ensure(&b);
        assert!(!cache.store_prefetch(&a, Partition::Mixed, slot(2)));
        assert_eq!(cache.prefetched_page(Partition::Mixed), None);
    }

    #[test]
    fn test_prefetch_consumed_once_and_mismatch_discards() {
        let mut cache: CacheStore<u32> = CacheStore::new();
        let a = fp("a");
        cache.ensure(&a);

        assert!(cache.store_prefetch(&a, Partition::Mixed, slot(2)));
        assert!(cache.take_prefetch(&a, Partition::Mixed, 2).is_some());
        assert!(cache.take_prefetch(&a, Partition::Mixed, 2).is_none());

        assert!(cache.store_prefetch(&a, Partition::Mixed, slot(3)));
        assert!(cache.take_prefetch(&a, Partition::Mixed, 1).is_none());
        assert_eq!(cache.prefetched_page(Partition::Mixed), None);
    }

    #[test]
    fn test_clear_prefetch_leaves_other_partitions() {
        let mut cache: CacheStore<u32> = CacheStore::new();
        let a = fp("a");
        cache.ensure(&a);
        assert!(cache.store_prefetch(&a, Partition::Mixed, slot(2)));
        assert!(cache.store_prefetch(&a, Partition::Tv, slot(3)));

        cache.clear_prefetch(Partition::Mixed);
        assert_eq!(cache.prefetched_page(Partition::Mixed), None);
        assert_eq!(cache.prefetched_page(Partition::Tv), Some(3));
    }
}
