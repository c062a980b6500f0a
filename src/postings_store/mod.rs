//! Clustered-posting store (spec.md C5): per (segment, field), an in-memory
//! map from term to its [`PostingClusters`].

use crate::cache::CacheManager;
use crate::clustering::PostingClusters;
use crate::core::error::Result;
use crate::core::types::CacheKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Estimate of `PostingClusters`' RAM footprint, used for cache accounting.
fn posting_clusters_bytes(clusters: &PostingClusters) -> u64 {
    clusters
        .clusters()
        .iter()
        .map(|c| {
            let summary_bytes = c
                .summary()
                .map(|s| s.ram_bytes_used())
                .unwrap_or(0);
            (c.len() * (4 + 1)) as u64 + summary_bytes as u64
        })
        .sum()
}

/// In-memory term -> clusters map for one (segment, field). Locking follows
/// the teacher's `index_cache`/`hybrid_index_cache` shape: a single
/// read-write lock guarding a plain `HashMap`, published entries are
/// immutable `Arc`s so readers never clone the underlying data.
pub struct ClusteredPostingIndex {
    terms: RwLock<HashMap<Box<[u8]>, Arc<PostingClusters>>>,
}

impl ClusteredPostingIndex {
    pub fn new() -> Self {
        ClusteredPostingIndex {
            terms: RwLock::new(HashMap::new()),
        }
    }

    /// Best-effort byte estimate of the empty map, for structural cache
    /// overhead registration (spec.md §4.8, S5).
    pub fn empty_ram_bytes() -> u64 {
        std::mem::size_of::<HashMap<Box<[u8]>, Arc<PostingClusters>>>() as u64
    }

    pub fn read(&self, term: &[u8]) -> Option<Arc<PostingClusters>> {
        self.terms.read().get(term).cloned()
    }

    /// Clones the term key, reserves its byte cost from `cache`, then
    /// publishes atomically. On a duplicate term, keeps the first insertion
    /// (spec.md §4.4) — the reservation for a rejected duplicate is released
    /// immediately.
    pub fn insert(
        &self,
        term: &[u8],
        clusters: PostingClusters,
        cache: &CacheManager,
        key: CacheKey,
    ) -> Result<()> {
        if self.terms.read().contains_key(term) {
            return Ok(());
        }

        let bytes = posting_clusters_bytes(&clusters);
        cache.reserve_posting_term(key, term, bytes)?;

        let mut terms = self.terms.write();
        if terms.contains_key(term) {
            drop(terms);
            cache.release_posting_term(key, term, bytes);
            return Ok(());
        }
        terms.insert(term.into(), Arc::new(clusters));
        Ok(())
    }

    pub fn get_terms(&self) -> Vec<Box<[u8]>> {
        self.terms.read().keys().cloned().collect()
    }

    pub fn size(&self) -> u64 {
        self.terms.read().len() as u64
    }
}

impl Default for ClusteredPostingIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::scorer::PostingsLookup for ClusteredPostingIndex {
    fn get(&self, term: &[u8]) -> Option<Arc<PostingClusters>> {
        self.read(term)
    }
}

/// Persisted-side counterpart to [`ClusteredPostingIndex`], implemented by
/// the codec (C6) reader over a sealed segment's term dictionary + posting
/// file.
pub trait PersistedPostingsReader: Send + Sync {
    fn read(&self, term: &[u8]) -> Result<Option<PostingClusters>>;
    fn get_terms(&self) -> Result<Vec<Box<[u8]>>>;
}

/// Composes an in-memory store with a persisted reader, identical semantics
/// to [`crate::forward_index::CacheGatedForwardIndexReader`] except
/// `get_terms()` always asks the persisted side: the cache is authoritative
/// for values but not for the term universe, since entries may have been
/// evicted (spec.md §4.4).
pub struct CacheGatedPostingsReader<'a> {
    memory: &'a ClusteredPostingIndex,
    persisted: &'a dyn PersistedPostingsReader,
    cache: &'a CacheManager,
    key: CacheKey,
}

impl<'a> CacheGatedPostingsReader<'a> {
    pub fn new(
        memory: &'a ClusteredPostingIndex,
        persisted: &'a dyn PersistedPostingsReader,
        cache: &'a CacheManager,
        key: CacheKey,
    ) -> Self {
        CacheGatedPostingsReader {
            memory,
            persisted,
            cache,
            key,
        }
    }

    pub fn read(&self, term: &[u8]) -> Result<Option<Arc<PostingClusters>>> {
        if let Some(v) = self.memory.read(term) {
            return Ok(Some(v));
        }

        let Some(clusters) = self.persisted.read(term)? else {
            return Ok(None);
        };
        let warmed = Arc::new(clusters);
        let _ = self
            .memory
            .insert(term, (*warmed).clone(), self.cache, self.key);
        Ok(Some(warmed))
    }

    pub fn get_terms(&self) -> Result<Vec<Box<[u8]>>> {
        self.persisted.get_terms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CircuitBreakerLimit;
    use crate::core::types::{FieldId, SegmentId};
    use crate::sparse::DocWeight;

    fn key() -> CacheKey {
        CacheKey::new(SegmentId::new(), FieldId(2))
    }

    struct EmptyPersisted;
    impl PersistedPostingsReader for EmptyPersisted {
        fn read(&self, _term: &[u8]) -> Result<Option<PostingClusters>> {
            Ok(None)
        }
        fn get_terms(&self) -> Result<Vec<Box<[u8]>>> {
            Ok(Vec::new())
        }
    }

    fn one_cluster_postings() -> PostingClusters {
        use crate::clustering::{ClusteringAlgorithm, RandomClustering, VectorReader};
        use crate::sparse::SparseVector;
        use rand::SeedableRng;
        use std::collections::HashMap as Map;
        use std::sync::Arc as StdArc;

        struct R(Map<i32, StdArc<SparseVector>>);
        impl VectorReader for R {
            fn read(&self, doc_id: i32) -> Option<StdArc<SparseVector>> {
                self.0.get(&doc_id).cloned()
            }
        }

        let mut map = Map::new();
        map.insert(1, StdArc::new(SparseVector::from_pairs(vec![(5, 10)])));
        let reader = R(map);
        let docs = vec![DocWeight::new(1, 10)];
        let algo = RandomClustering::new(0.0, 0.4).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let clusters = algo.cluster(&docs, &reader, 6, &mut rng).unwrap();
        PostingClusters::new(clusters)
    }

    #[test]
    fn insert_then_read_round_trips() {
        let store = ClusteredPostingIndex::new();
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        let clusters = one_cluster_postings();
        store.insert(b"term", clusters, &cache, key()).unwrap();
        assert!(store.read(b"term").is_some());
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn duplicate_term_keeps_first_insertion() {
        let store = ClusteredPostingIndex::new();
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        let first = one_cluster_postings();
        let first_cluster_count = first.cluster_count();
        store.insert(b"term", first, &cache, key()).unwrap();

        let second = PostingClusters::new(Vec::new());
        store.insert(b"term", second, &cache, key()).unwrap();

        assert_eq!(store.read(b"term").unwrap().cluster_count(), first_cluster_count);
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn get_terms_reflects_inserted_terms() {
        let store = ClusteredPostingIndex::new();
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        store
            .insert(b"alpha", one_cluster_postings(), &cache, key())
            .unwrap();
        store
            .insert(b"beta", one_cluster_postings(), &cache, key())
            .unwrap();
        let mut terms = store.get_terms();
        terms.sort();
        assert_eq!(terms, vec![b"alpha".to_vec().into_boxed_slice(), b"beta".to_vec().into_boxed_slice()]);
    }

    #[test]
    fn cache_gated_reader_get_terms_uses_persisted_side_only() {
        let store = ClusteredPostingIndex::new();
        let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1_000_000), 0);
        store
            .insert(b"warm", one_cluster_postings(), &cache, key())
            .unwrap();
        let persisted = EmptyPersisted;
        let reader = CacheGatedPostingsReader::new(&store, &persisted, &cache, key());
        // "warm" lives only in memory; get_terms() must not see it.
        assert!(reader.get_terms().unwrap().is_empty());
    }
}
