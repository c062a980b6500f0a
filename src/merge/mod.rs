//! Segment merge pipeline (spec.md C7): combines S input segments' postings
//! for one field into a single clustered posting set, re-using the
//! teacher's `rayon`-backed worker-pool construction
//! (`parallel::indexer::ParallelIndexer`) for the per-term-batch fan-out.

use crate::clustering::{ClusteringAlgorithm, PostingClusters, VectorReader};
use crate::core::error::{Error, ErrorKind, Result};
use crate::sparse::{DocWeight, Quantizer};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Terms are batched at roughly this size before being handed to the
/// worker pool (spec.md §4.6, "batch size ≈ 50").
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// A posting weight as stored in an input segment: already-quantized (a
/// native sparse segment) or a raw float frequency awaiting quantization
/// (spec.md §4.6 step 2).
#[derive(Debug, Clone, Copy)]
pub enum RawWeight {
    Quantized(u8),
    Float(f32),
}

#[derive(Debug, Clone, Copy)]
pub struct RawPosting {
    pub old_doc_id: i32,
    pub weight: RawWeight,
}

/// One input segment's postings for the field being merged.
pub trait SegmentPostingsSource: Send + Sync {
    fn get_terms(&self) -> Vec<Box<[u8]>>;
    fn read_raw_postings(&self, term: &[u8]) -> Result<Vec<RawPosting>>;
}

/// Pairs an input source with the host-supplied `oldDocId -> newDocId` map;
/// `None` means the doc was dropped by the merge (spec.md §4.6 step 2).
pub struct MergeInput<'a> {
    pub source: &'a dyn SegmentPostingsSource,
    pub doc_id_map: &'a dyn Fn(i32) -> Option<i32>,
}

/// Resolves one term's postings across all input segments into a single
/// doc-id-ascending, deduplicated list (spec.md §4.6 step 2).
pub fn merged_posting_for_term(term: &[u8], inputs: &[MergeInput<'_>]) -> Result<Vec<DocWeight>> {
    let mut merged = Vec::new();
    for input in inputs {
        for raw in input.source.read_raw_postings(term)? {
            let Some(new_doc_id) = (input.doc_id_map)(raw.old_doc_id) else {
                continue; // Dropped doc: map returned "no value".
            };
            let weight = match raw.weight {
                RawWeight::Quantized(byte) => {
                    // Self-consistency check for the open question of
                    // whether re-derivation from float matches the stored
                    // byte: the byte must at least be a fixed point of the
                    // quantizer (spec.md §9, Open Questions #1).
                    debug_assert_eq!(
                        Quantizer::quantize(Quantizer::dequantize(byte)).ok(),
                        Some(byte),
                        "stored quantized byte is not a fixed point of the quantizer"
                    );
                    byte
                }
                RawWeight::Float(f) => Quantizer::quantize(f)?,
            };
            merged.push(DocWeight::new(new_doc_id, weight));
        }
    }
    merged.sort_unstable_by_key(|d| d.doc_id);
    merged.dedup_by_key(|d| d.doc_id);
    Ok(merged)
}

/// Parameters controlling how clustering is fanned out across term batches.
pub struct MergeConfig<'a> {
    pub clustering: &'a dyn ClusteringAlgorithm,
    pub reader: &'a dyn VectorReader,
    pub dim: u32,
    pub cluster_ratio: f32,
    pub batch_size: usize,
    pub thread_count: usize,
    pub seed: u64,
}

impl<'a> MergeConfig<'a> {
    pub fn new(
        clustering: &'a dyn ClusteringAlgorithm,
        reader: &'a dyn VectorReader,
        dim: u32,
        cluster_ratio: f32,
    ) -> Self {
        MergeConfig {
            clustering,
            reader,
            dim,
            cluster_ratio,
            batch_size: DEFAULT_BATCH_SIZE,
            thread_count: num_cpus::get().max(1),
            seed: 0,
        }
    }
}

pub struct MergeOutcome {
    pub postings: Vec<(Box<[u8]>, PostingClusters)>,
    /// Set if `cancelled` fired before all term batches were processed;
    /// `postings` holds whatever completed so far (spec.md §7, "callers may
    /// treat partial results as valid").
    pub cancelled: bool,
}

/// Runs the full merge for one field: union of terms, per-term merged
/// postings, batched clustering. Batches with `cluster_ratio == 0` run
/// inline rather than through the worker pool (spec.md §4.6 step 3).
pub fn merge_segments(
    inputs: &[MergeInput<'_>],
    config: &MergeConfig<'_>,
    cancelled: &AtomicBool,
) -> Result<MergeOutcome> {
    let mut terms: BTreeSet<Box<[u8]>> = BTreeSet::new();
    for input in inputs {
        terms.extend(input.source.get_terms());
    }
    let terms: Vec<Box<[u8]>> = terms.into_iter().collect();

    // Built once for the whole merge and reused across every batch, matching
    // the teacher's `ParallelIndexer::new()` (one pool for the indexer's
    // lifetime, not per chunk).
    let pool = if config.cluster_ratio == 0.0 {
        None
    } else {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.thread_count)
                .build()
                .map_err(|e| Error::new(ErrorKind::Invariant, format!("worker pool build: {e}")))?,
        )
    };

    let mut postings = Vec::with_capacity(terms.len());
    for (batch_index, batch) in terms.chunks(config.batch_size.max(1)).enumerate() {
        if cancelled.load(Ordering::Relaxed) {
            #[cfg(feature = "logging")]
            log::debug!(
                "merge cancelled after {} of {} term batches",
                batch_index,
                terms.len().div_ceil(config.batch_size.max(1))
            );
            return Ok(MergeOutcome {
                postings,
                cancelled: true,
            });
        }

        let batch_results: Result<Vec<(Box<[u8]>, PostingClusters)>> = match &pool {
            None => batch
                .iter()
                .map(|term| cluster_one_term(term, inputs, config, batch_index))
                .collect(),
            Some(pool) => pool.install(|| {
                batch
                    .par_iter()
                    .enumerate()
                    .map(|(i, term)| {
                        cluster_one_term(term, inputs, config, batch_index * config.batch_size + i)
                    })
                    .collect()
            }),
        };

        // Results are collected in submission order above (sequential
        // `.map()`/indexed `.par_iter()` both preserve input order), so the
        // output dictionary's term ordering matches `terms` without an
        // explicit re-sort (spec.md §4.6 step 4).
        postings.extend(batch_results?);
    }

    Ok(MergeOutcome {
        postings,
        cancelled: false,
    })
}

fn cluster_one_term(
    term: &[u8],
    inputs: &[MergeInput<'_>],
    config: &MergeConfig<'_>,
    task_index: usize,
) -> Result<(Box<[u8]>, PostingClusters)> {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::hash::{Hash, Hasher};

    let docs = merged_posting_for_term(term, inputs)?;

    // Deterministic per-term seed so re-running the merge over the same
    // inputs reproduces the same clustering (spec.md §4.6, "Merge MUST be
    // idempotent ... deterministic under a seed derived from segment
    // identity").
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    config.seed.hash(&mut hasher);
    term.hash(&mut hasher);
    task_index.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());

    let clusters = config
        .clustering
        .cluster(&docs, config.reader, config.dim, &mut rng)?;
    Ok((term.into(), PostingClusters::new(clusters)))
}
