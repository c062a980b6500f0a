//! Forward-index store (spec.md C4): per-segment, per-field array mapping
//! docId to its full sparse vector.

use crate::cache::CacheManager;
use crate::clustering::VectorReader;
use crate::core::error::Result;
use crate::core::types::CacheKey;
use crate::sparse::SparseVector;
use std::sync::{Arc, OnceLock};

/// Fixed-capacity slot array, one slot per docId in `[0, doc_count)`. Each
/// slot is a `OnceLock`: the first successful `insert` wins, later inserts to
/// an occupied slot are silently dropped — exactly the compare-and-set
/// semantics spec.md §4.3 asks for, with no extra locking needed on the read
/// path.
pub struct ForwardIndex {
    slots: Box<[OnceLock<Arc<SparseVector>>]>,
}

impl ForwardIndex {
    pub fn new(doc_count: usize) -> Self {
        let mut slots = Vec::with_capacity(doc_count);
        slots.resize_with(doc_count, OnceLock::new);
        ForwardIndex {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Best-effort byte estimate of the empty slot array, used to register
    /// the structural cache overhead at segment-open time (spec.md §4.8,
    /// S5).
    pub fn empty_ram_bytes(doc_count: usize) -> u64 {
        (doc_count * std::mem::size_of::<OnceLock<Arc<SparseVector>>>()) as u64
    }

    /// Never blocks: a single atomic load per spec.md §4.3.
    pub fn read(&self, doc_id: i32) -> Option<Arc<SparseVector>> {
        let slot = self.slots.get(usize::try_from(doc_id).ok()?)?;
        slot.get().cloned()
    }

    /// No-op if `doc_id` is out of range or the slot is already occupied. On
    /// the winning first write, accounts the vector's bytes via `cache`
    /// before publishing, so a budget refusal leaves the slot untouched
    /// rather than set-then-rolled-back.
    pub fn insert(
        &self,
        doc_id: i32,
        v: SparseVector,
        cache: &CacheManager,
        key: CacheKey,
    ) -> Result<()> {
        let Ok(idx) = usize::try_from(doc_id) else {
            return Ok(());
        };
        let Some(slot) = self.slots.get(idx) else {
            return Ok(());
        };
        if slot.get().is_some() {
            return Ok(());
        }

        let bytes = v.ram_bytes_used() as u64;
        cache.reserve_forward_doc(key, doc_id, bytes)?;

        if slot.set(Arc::new(v)).is_err() {
            // Lost the race to a concurrent insert on the same slot: release
            // the reservation we just took, the other writer owns it.
            cache.release_forward_doc(key, doc_id, bytes);
        }
        Ok(())
    }

    /// Best-effort RAM estimate: slot array overhead plus every published
    /// vector's own accounting.
    pub fn ram_bytes_used(&self) -> u64 {
        let overhead = Self::empty_ram_bytes(self.slots.len());
        let vectors: u64 = self
            .slots
            .iter()
            .filter_map(|s| s.get())
            .map(|v| v.ram_bytes_used() as u64)
            .sum();
        overhead + vectors
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl VectorReader for ForwardIndex {
    fn read(&self, doc_id: i32) -> Option<Arc<SparseVector>> {
        ForwardIndex::read(self, doc_id)
    }
}

/// Persisted-side counterpart to [`ForwardIndex`], implemented by the codec
/// (C6) reader over a sealed segment's forward-index file.
pub trait PersistedForwardIndexReader: Send + Sync {
    fn read(&self, doc_id: i32) -> Result<Option<SparseVector>>;
}

/// Composes an in-memory reader/writer pair with a persisted fallback,
/// per spec.md §4.3's three-step semantics.
pub struct CacheGatedForwardIndexReader<'a> {
    memory: &'a ForwardIndex,
    persisted: &'a dyn PersistedForwardIndexReader,
    cache: &'a CacheManager,
    key: CacheKey,
}

impl<'a> CacheGatedForwardIndexReader<'a> {
    pub fn new(
        memory: &'a ForwardIndex,
        persisted: &'a dyn PersistedForwardIndexReader,
        cache: &'a CacheManager,
        key: CacheKey,
    ) -> Self {
        CacheGatedForwardIndexReader {
            memory,
            persisted,
            cache,
            key,
        }
    }

    pub fn read(&self, doc_id: i32) -> Result<Option<Arc<SparseVector>>> {
        if let Some(v) = self.memory.read(doc_id) {
            return Ok(Some(v));
        }

        let Some(v) = self.persisted.read(doc_id)? else {
            return Ok(None);
        };

        // Opportunistic warm of the in-memory side; failures (budget
        // refusal, lost race) are ignored per spec.md §4.3 step 3.
        let _ = self.memory.insert(doc_id, v.clone(), self.cache, self.key);
        Ok(Some(Arc::new(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CircuitBreakerLimit;
    use crate::core::types::{FieldId, SegmentId};

    fn key() -> CacheKey {
        CacheKey::new(SegmentId::new(), FieldId(0))
    }

    struct EmptyPersisted;
    impl PersistedForwardIndexReader for EmptyPersisted {
        fn read(&self, _doc_id: i32) -> Result<Option<SparseVector>> {
            Ok(None)
        }
    }

    struct StaticPersisted(SparseVector);
    impl PersistedForwardIndexReader for StaticPersisted {
        fn read(&self, _doc_id: i32) -> Result<Option<SparseVector>> {
            Ok(Some(self.0.clone()))
        }
    }

    #[test]
    fn read_returns_none_for_empty_or_out_of_range_slot() {
        let idx = ForwardIndex::new(4);
        assert!(idx.read(0).is_none());
        assert!(idx.read(100).is_none());
        assert!(idx.read(-1).is_none());
    }

    #[test]
    fn insert_then_read_round_trips() {
        let idx = ForwardIndex::new(4);
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        let v = SparseVector::from_pairs(vec![(1, 10)]);
        idx.insert(1, v.clone(), &cache, key()).unwrap();
        assert_eq!(idx.read(1).unwrap().as_ref(), &v);
    }

    #[test]
    fn second_insert_to_occupied_slot_is_a_no_op() {
        let idx = ForwardIndex::new(4);
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        let first = SparseVector::from_pairs(vec![(1, 10)]);
        let second = SparseVector::from_pairs(vec![(2, 20)]);
        idx.insert(1, first.clone(), &cache, key()).unwrap();
        idx.insert(1, second, &cache, key()).unwrap();
        assert_eq!(idx.read(1).unwrap().as_ref(), &first);
    }

    #[test]
    fn insert_dropped_when_budget_refuses() {
        let idx = ForwardIndex::new(4);
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(0), 0);
        let v = SparseVector::from_pairs(vec![(1, 10)]);
        assert!(idx.insert(1, v, &cache, key()).is_err());
        assert!(idx.read(1).is_none());
    }

    #[test]
    fn cache_gated_reader_falls_back_to_persisted_and_warms_memory() {
        let memory = ForwardIndex::new(4);
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        let stored = SparseVector::from_pairs(vec![(7, 40)]);
        let persisted = StaticPersisted(stored.clone());
        let reader = CacheGatedForwardIndexReader::new(&memory, &persisted, &cache, key());

        let result = reader.read(2).unwrap().unwrap();
        assert_eq!(result.as_ref(), &stored);
        assert_eq!(memory.read(2).unwrap().as_ref(), &stored);
    }

    #[test]
    fn cache_gated_reader_returns_none_when_both_sides_empty() {
        let memory = ForwardIndex::new(4);
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        let persisted = EmptyPersisted;
        let reader = CacheGatedForwardIndexReader::new(&memory, &persisted, &cache, key());
        assert!(reader.read(3).unwrap().is_none());
    }
}
