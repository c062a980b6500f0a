//! Global cache manager (spec.md C9): a byte-budgeted registry shared by the
//! forward index (C4) and the clustered posting store (C5), keyed by
//! `CacheKey` (segment, field).

use crate::core::config::{CircuitBreakerLimit, EngineSettings};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::CacheStats;
use crate::core::types::CacheKey;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-entry granularity: forward-index entries are tracked per docId,
/// posting entries per term (spec.md §4.8).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SubKey {
    ForwardDoc(i32),
    PostingTerm(Box<[u8]>),
}

type EntryKey = (CacheKey, SubKey);

struct Registry {
    lru: Mutex<LruCache<EntryKey, u64>>,
    overhead: Mutex<std::collections::HashMap<CacheKey, u64>>,
}

impl Registry {
    fn new() -> Self {
        Registry {
            lru: Mutex::new(LruCache::new(NonZeroUsize::new(usize::MAX).unwrap())),
            overhead: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn entry_count(&self) -> usize {
        self.lru.lock().len()
    }
}

/// Byte-budgeted registry for forward-index vectors and clustered postings.
/// Two independent [`Registry`]s share one byte counter and one budget, per
/// spec.md §4.8 ("Two sub-caches ... Both expose reserve/release").
pub struct CacheManager {
    budget_bytes: u64,
    bytes_in_use: AtomicU64,
    evictions: AtomicU64,
    budget_refusals: AtomicU64,
    forward: Registry,
    posting: Registry,
}

impl CacheManager {
    pub fn new(settings: &EngineSettings, heap_size_bytes: u64) -> Self {
        CacheManager::with_budget(settings.circuit_breaker_limit, heap_size_bytes)
    }

    pub fn with_budget(limit: CircuitBreakerLimit, heap_size_bytes: u64) -> Self {
        CacheManager {
            budget_bytes: limit.resolve_bytes(heap_size_bytes),
            bytes_in_use: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            budget_refusals: AtomicU64::new(0),
            forward: Registry::new(),
            posting: Registry::new(),
        }
    }

    /// Registers the fixed per-(segment,field) structural overhead (empty
    /// slot array, empty posting map) unconditionally — this accounting
    /// happens regardless of budget, so a 0-byte budget still reflects the
    /// per-index overhead (spec.md §4.8, "Budget policy").
    pub fn register_overhead(&self, key: CacheKey, forward_bytes: u64, posting_bytes: u64) {
        self.forward.overhead.lock().insert(key, forward_bytes);
        self.posting.overhead.lock().insert(key, posting_bytes);
        self.bytes_in_use
            .fetch_add(forward_bytes + posting_bytes, Ordering::Relaxed);
    }

    pub fn reserve_forward_doc(&self, key: CacheKey, doc_id: i32, bytes: u64) -> Result<()> {
        self.reserve(&self.forward, (key, SubKey::ForwardDoc(doc_id)), bytes)
    }

    pub fn release_forward_doc(&self, key: CacheKey, doc_id: i32, bytes: u64) {
        self.release(&self.forward, &(key, SubKey::ForwardDoc(doc_id)), bytes);
    }

    pub fn touch_forward_doc(&self, key: CacheKey, doc_id: i32) {
        self.forward
            .lru
            .lock()
            .get(&(key, SubKey::ForwardDoc(doc_id)));
    }

    pub fn reserve_posting_term(&self, key: CacheKey, term: &[u8], bytes: u64) -> Result<()> {
        self.reserve(
            &self.posting,
            (key, SubKey::PostingTerm(term.into())),
            bytes,
        )
    }

    pub fn release_posting_term(&self, key: CacheKey, term: &[u8], bytes: u64) {
        self.release(
            &self.posting,
            &(key, SubKey::PostingTerm(term.into())),
            bytes,
        );
    }

    pub fn touch_posting_term(&self, key: CacheKey, term: &[u8]) {
        self.posting
            .lru
            .lock()
            .get(&(key, SubKey::PostingTerm(term.into())));
    }

    fn reserve(&self, registry: &Registry, entry: EntryKey, bytes: u64) -> Result<()> {
        if self.try_bump(bytes) {
            registry.lru.lock().put(entry, bytes);
            return Ok(());
        }

        let freed = self.evict_until(registry, bytes);
        if freed >= bytes && self.try_bump(bytes) {
            registry.lru.lock().put(entry, bytes);
            Ok(())
        } else {
            self.budget_refusals.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "logging")]
            log::warn!(
                "cache reserve of {bytes} bytes refused, budget {} bytes in use",
                self.budget_bytes
            );
            Err(Error::new(
                ErrorKind::Budget,
                format!("cache reserve of {bytes} bytes refused, budget {}", self.budget_bytes),
            ))
        }
    }

    fn release(&self, registry: &Registry, entry: &EntryKey, bytes: u64) {
        if registry.lru.lock().pop(entry).is_some() {
            self.bytes_in_use.fetch_sub(bytes, Ordering::Relaxed);
        }
    }

    fn try_bump(&self, bytes: u64) -> bool {
        let mut current = self.bytes_in_use.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.budget_bytes {
                return false;
            }
            match self.bytes_in_use.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Evicts least-recently-used entries from `registry` until at least
    /// `needed` bytes would fit, or the registry is empty. Runs under the
    /// registry's own mutex so concurrent reads of the other registry are
    /// never blocked (spec.md §4.8, "Eviction MUST NOT block concurrent
    /// reads").
    fn evict_until(&self, registry: &Registry, needed: u64) -> u64 {
        let mut freed = 0u64;
        let mut lru = registry.lru.lock();
        while freed < needed {
            let Some((_, bytes)) = lru.pop_lru() else {
                break;
            };
            self.bytes_in_use.fetch_sub(bytes, Ordering::Relaxed);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            freed += bytes;
        }
        #[cfg(feature = "logging")]
        if freed > 0 {
            log::debug!("evicted {freed} bytes to satisfy a reserve of {needed} bytes");
        }
        freed
    }

    /// Purges every entry (overhead and cached items, both registries)
    /// carrying `key`, releasing their bytes in one pass (spec.md §4.8,
    /// "Removal by CacheKey").
    pub fn remove_segment(&self, key: CacheKey) -> u64 {
        let mut released = 0u64;

        for registry in [&self.forward, &self.posting] {
            if let Some(bytes) = registry.overhead.lock().remove(&key) {
                released += bytes;
            }
            let mut lru = registry.lru.lock();
            let stale: Vec<EntryKey> = lru
                .iter()
                .filter(|((k, _), _)| *k == key)
                .map(|(k, _)| k.clone())
                .collect();
            for entry in stale {
                if let Some(bytes) = lru.pop(&entry) {
                    released += bytes;
                }
            }
        }

        self.bytes_in_use.fetch_sub(released, Ordering::Relaxed);
        released
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.bytes_in_use.load(Ordering::Relaxed)
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            forward_index_entries: self.forward.entry_count(),
            posting_entries: self.posting.entry_count(),
            bytes_in_use: self.bytes_in_use(),
            budget_bytes: self.budget_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
            budget_refusals: self.budget_refusals.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FieldId, SegmentId};

    fn key() -> CacheKey {
        CacheKey::new(SegmentId::new(), FieldId(1))
    }

    #[test]
    fn reserve_and_release_round_trip_bytes_in_use() {
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000), 0);
        let k = key();
        cache.reserve_forward_doc(k, 1, 100).unwrap();
        assert_eq!(cache.bytes_in_use(), 100);
        cache.release_forward_doc(k, 1, 100);
        assert_eq!(cache.bytes_in_use(), 0);
    }

    #[test]
    fn zero_budget_always_refuses_reserve() {
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(0), 0);
        let k = key();
        assert!(cache.reserve_forward_doc(k, 1, 1).is_err());
    }

    #[test]
    fn zero_budget_still_registers_overhead() {
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(0), 0);
        let k = key();
        cache.register_overhead(k, 40, 24);
        assert_eq!(cache.bytes_in_use(), 64);
    }

    #[test]
    fn reserve_evicts_lru_entries_when_over_budget() {
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(150), 0);
        let k = key();
        cache.reserve_forward_doc(k, 1, 100).unwrap();
        cache.reserve_forward_doc(k, 2, 100).unwrap();
        assert!(cache.bytes_in_use() <= 150);
        assert!(cache.stats().evictions >= 1);
    }

    #[test]
    fn remove_segment_releases_all_its_bytes() {
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(10_000), 0);
        let k = key();
        cache.register_overhead(k, 10, 10);
        cache.reserve_forward_doc(k, 1, 50).unwrap();
        cache.reserve_posting_term(k, b"term", 30).unwrap();
        let before = cache.bytes_in_use();
        assert_eq!(before, 100);

        let released = cache.remove_segment(k);
        assert_eq!(released, 100);
        assert_eq!(cache.bytes_in_use(), 0);
    }
}
