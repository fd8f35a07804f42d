// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Loop-suppression cache.
//!
//! A bounded, expiring memo keyed on `(ElementRef, ValueHash)`. The Monitor
//! inserts after a successful AAS write; the Controller checks before
//! processing an inbound AAS event (and vice versa for the echo of its own
//! OPC UA writes). A hit means the change is a round-trip echo of a write
//! the bridge itself performed, and is dropped.
//!
//! Entries are evicted by LRU when the cache is full and by TTL on both
//! insert and lookup. The size bound is enforced on insert.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::address::ElementRef;
use crate::codec::ValueHash;

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 2048;

/// Default entry time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

// =============================================================================
// SuppressionCache
// =============================================================================

/// Bounded LRU cache with TTL, shared between Monitor and Controller.
#[derive(Debug)]
pub struct SuppressionCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<(ElementRef, ValueHash), EntryMeta>,
    // LRU order index: insertion sequence -> key.
    order: BTreeMap<u64, (ElementRef, ValueHash)>,
    next_seq: u64,
}

#[derive(Debug)]
struct EntryMeta {
    inserted: Instant,
    seq: u64,
}

impl SuppressionCache {
    /// Creates a cache with the given TTL and size bound.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Remembers a value hash for an element.
    ///
    /// Re-inserting an existing key refreshes both its timestamp and its
    /// LRU position.
    pub fn insert(&self, element: &ElementRef, hash: ValueHash) {
        if self.ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("suppression cache poisoned");

        let key = (element.clone(), hash);
        if let Some(old) = inner.entries.remove(&key) {
            inner.order.remove(&old.seq);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(key, EntryMeta { inserted: now, seq });

        self.prune(&mut inner, now);
        while inner.entries.len() > self.max_entries {
            let oldest_seq = match inner.order.keys().next().copied() {
                Some(seq) => seq,
                None => break,
            };
            if let Some(key) = inner.order.remove(&oldest_seq) {
                inner.entries.remove(&key);
            }
        }
    }

    /// Returns `true` if an unexpired entry matches the element and hash.
    ///
    /// A hit consumes the entry: one remembered write suppresses exactly one
    /// echo, so a genuine repeat of the same value later still propagates.
    pub fn matches(&self, element: &ElementRef, hash: &ValueHash) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("suppression cache poisoned");
        self.prune(&mut inner, now);

        let key = (element.clone(), *hash);
        match inner.entries.remove(&key) {
            Some(meta) => {
                inner.order.remove(&meta.seq);
                now.duration_since(meta.inserted) <= self.ttl
            }
            None => false,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("suppression cache poisoned").entries.len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        let mut expired: Vec<u64> = Vec::new();
        for (&seq, key) in inner.order.iter() {
            let meta = match inner.entries.get(key) {
                Some(meta) => meta,
                None => {
                    expired.push(seq);
                    continue;
                }
            };
            if now.duration_since(meta.inserted) > self.ttl {
                expired.push(seq);
            } else {
                // Order index is insertion-ordered, the rest is younger.
                break;
            }
        }
        for seq in expired {
            if let Some(key) = inner.order.remove(&seq) {
                inner.entries.remove(&key);
            }
        }
    }
}

impl Default for SuppressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::hash;
    use crate::xsd::XsdValue;

    fn element(name: &str) -> ElementRef {
        ElementRef::new("urn:sm:test", name)
    }

    #[test]
    fn test_insert_and_match() {
        let cache = SuppressionCache::new(Duration::from_secs(60), 16);
        let h = hash(&XsdValue::Double(42.0));

        assert!(!cache.matches(&element("A"), &h));
        cache.insert(&element("A"), h);
        assert!(cache.matches(&element("A"), &h));
        // A hit consumes the entry.
        assert!(!cache.matches(&element("A"), &h));
    }

    #[test]
    fn test_different_value_does_not_match() {
        let cache = SuppressionCache::new(Duration::from_secs(60), 16);
        cache.insert(&element("A"), hash(&XsdValue::Double(42.0)));
        assert!(!cache.matches(&element("A"), &hash(&XsdValue::Double(43.0))));
    }

    #[test]
    fn test_size_bound_evicts_lru() {
        let cache = SuppressionCache::new(Duration::from_secs(60), 3);
        for i in 0..5 {
            cache.insert(&element(&format!("E{}", i)), hash(&XsdValue::Int(i)));
        }
        assert_eq!(cache.len(), 3);
        // The two oldest were evicted.
        assert!(!cache.matches(&element("E0"), &hash(&XsdValue::Int(0))));
        assert!(!cache.matches(&element("E1"), &hash(&XsdValue::Int(1))));
        assert!(cache.matches(&element("E4"), &hash(&XsdValue::Int(4))));
    }

    #[test]
    fn test_never_exceeds_bound() {
        let cache = SuppressionCache::new(Duration::from_secs(60), 8);
        for i in 0..100 {
            cache.insert(&element(&format!("E{}", i)), hash(&XsdValue::Int(i)));
            assert!(cache.len() <= 8);
        }
    }

    #[test]
    fn test_expired_entries_are_not_honored() {
        let cache = SuppressionCache::new(Duration::from_millis(10), 16);
        let h = hash(&XsdValue::Double(1.0));
        cache.insert(&element("A"), h);
        std::thread::sleep(Duration::from_millis(25));
        assert!(!cache.matches(&element("A"), &h));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = SuppressionCache::new(Duration::ZERO, 16);
        let h = hash(&XsdValue::Double(1.0));
        cache.insert(&element("A"), h);
        assert!(!cache.matches(&element("A"), &h));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let cache = SuppressionCache::new(Duration::from_secs(60), 2);
        let h0 = hash(&XsdValue::Int(0));
        cache.insert(&element("A"), h0);
        cache.insert(&element("B"), hash(&XsdValue::Int(1)));
        // Refresh A, making B the LRU victim.
        cache.insert(&element("A"), h0);
        cache.insert(&element("C"), hash(&XsdValue::Int(2)));
        assert!(cache.matches(&element("A"), &h0));
        assert!(!cache.matches(&element("B"), &hash(&XsdValue::Int(1))));
    }
}
