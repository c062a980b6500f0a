//! Query scorer (spec.md C8): walks a query's pruned tokens over the
//! clustered posting store, skipping clusters whose summary can't possibly
//! beat the current top-K threshold.

use crate::clustering::PostingClusters;
use crate::core::error::Result;
use crate::forward_index::ForwardIndex;
use crate::sparse::SparseVector;
use roaring::RoaringBitmap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Looks up a term's clusters for one (segment, field); implemented by
/// [`crate::postings_store::ClusteredPostingIndex`] or a cache-gated
/// composition over it.
pub trait PostingsLookup {
    fn get(&self, term: &[u8]) -> Option<std::sync::Arc<PostingClusters>>;
}

/// Bounded min-heap of `(doc_id, score)` ordered by score, capacity `k`
/// (spec.md §4.7 "scoreHeap"). Exposes `threshold()` once full: the lowest
/// score currently retained, below which (after `heapFactor` slack) a
/// cluster can be skipped outright.
pub struct ScoreHeap {
    capacity: usize,
    heap: BinaryHeap<Reverse<(i32, i32)>>,
}

impl ScoreHeap {
    pub fn new(capacity: usize) -> Self {
        ScoreHeap {
            capacity: capacity.max(1),
            heap: BinaryHeap::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, doc_id: i32, score: i32) {
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse((score, doc_id)));
        } else if let Some(&Reverse((min_score, _))) = self.heap.peek() {
            if score > min_score {
                self.heap.pop();
                self.heap.push(Reverse((score, doc_id)));
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// The lowest score currently retained; only meaningful once full.
    pub fn threshold(&self) -> Option<i32> {
        self.heap.peek().map(|&Reverse((score, _))| score)
    }

    /// Drains the heap, returning entries sorted ascending by docId
    /// (spec.md §4.7 step 2; ties on score are unspecified per spec.md §8).
    pub fn into_sorted_by_doc_id(self) -> Vec<(i32, i32)> {
        let mut out: Vec<(i32, i32)> = self
            .heap
            .into_iter()
            .map(|Reverse((score, doc_id))| (doc_id, score))
            .collect();
        out.sort_unstable_by_key(|&(doc_id, _)| doc_id);
        out
    }
}

/// Query scorer over one segment's field (spec.md C8).
pub struct QueryScorer<'a> {
    postings: &'a dyn PostingsLookup,
    forward_index: &'a ForwardIndex,
}

impl<'a> QueryScorer<'a> {
    pub fn new(postings: &'a dyn PostingsLookup, forward_index: &'a ForwardIndex) -> Self {
        QueryScorer {
            postings,
            forward_index,
        }
    }

    /// `query` is already pruned to its top `query_cut` tokens and
    /// `query_dense` is its dense materialization, both precomputed once by
    /// the caller (spec.md §4.7 "Inputs").
    pub fn search(
        &self,
        query: &SparseVector,
        query_dense: &[u8],
        k: usize,
        heap_factor: f32,
        filter: Option<&RoaringBitmap>,
        cancelled: &AtomicBool,
    ) -> Result<Vec<(i32, i32)>> {
        let mut heap = ScoreHeap::new(k);
        let mut visited = RoaringBitmap::new();

        for &term_token in query.tokens() {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            // Big-endian so ascending token order matches the ascending
            // lexicographic byte order the term dictionary (C6) requires.
            let term_bytes = term_token.to_be_bytes();
            let Some(clusters) = self.postings.get(&term_bytes) else {
                continue;
            };

            for cluster in clusters.clusters() {
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }

                if !cluster.should_not_skip() {
                    if let Some(summary) = cluster.summary() {
                        let s = summary.dot_dense(query_dense);
                        if heap.is_full() {
                            if let Some(threshold) = heap.threshold() {
                                if (s as f32) * heap_factor < threshold as f32 {
                                    continue;
                                }
                            }
                        }
                    }
                }

                for doc_id in cluster.doc_ids() {
                    let doc_id = *doc_id;
                    if let Some(filter) = filter {
                        if !filter.contains(doc_id as u32) {
                            continue;
                        }
                    }
                    if visited.contains(doc_id as u32) {
                        continue;
                    }
                    visited.insert(doc_id as u32);

                    let Some(vector) = self.forward_index.read(doc_id) else {
                        continue;
                    };
                    let score = vector.dot_dense(query_dense);
                    heap.push(doc_id, score);
                }
            }
        }

        Ok(heap.into_sorted_by_doc_id())
    }
}
