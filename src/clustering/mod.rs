//! Posting clustering engine (spec.md C3): partitions a term's posting list
//! into mutually-similar clusters and computes a pruned summary vector per
//! cluster, the building block the query scorer (C8) uses to skip whole
//! clusters during search.

use crate::core::error::{Error, ErrorKind, Result};
use crate::sparse::{DocWeight, SparseVector};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use std::sync::Arc;

/// Maps a docId to its full sparse vector. Implemented by the forward index
/// (C4); kept as a trait here so the clustering engine has no dependency on
/// the forward-index module's storage details.
pub trait VectorReader {
    fn read(&self, doc_id: i32) -> Option<Arc<SparseVector>>;
}

/// One cluster of postings sharing a summary vector. Immutable once built.
#[derive(Debug, Clone)]
pub struct DocumentCluster {
    doc_ids: Box<[i32]>,
    weights: Box<[u8]>,
    summary: Option<SparseVector>,
    should_not_skip: bool,
}

impl DocumentCluster {
    /// `entries` must be non-empty and will be sorted ascending by doc id.
    fn new(mut entries: Vec<DocWeight>, summary: Option<SparseVector>) -> Self {
        entries.sort_unstable_by_key(|e| e.doc_id);
        let should_not_skip = summary.is_none();
        let (doc_ids, weights): (Vec<i32>, Vec<u8>) =
            entries.into_iter().map(|e| (e.doc_id, e.weight)).unzip();
        DocumentCluster {
            doc_ids: doc_ids.into_boxed_slice(),
            weights: weights.into_boxed_slice(),
            summary,
            should_not_skip,
        }
    }

    /// Rebuilds a cluster from decoded record fields, validating the
    /// ascending-docId invariant the codec (C6) must enforce on read
    /// (spec.md §7, `CorruptionError` on "non-ascending docIds").
    pub fn from_decoded(
        doc_ids: Box<[i32]>,
        weights: Box<[u8]>,
        summary: Option<SparseVector>,
        should_not_skip: bool,
    ) -> Result<Self> {
        if doc_ids.len() != weights.len() {
            return Err(Error::new(
                ErrorKind::Corruption,
                "doc id and weight arrays differ in length",
            ));
        }
        if !doc_ids.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::new(
                ErrorKind::Corruption,
                "decoded cluster doc ids are not strictly ascending",
            ));
        }
        Ok(DocumentCluster {
            doc_ids,
            weights,
            summary,
            should_not_skip,
        })
    }

    pub fn doc_ids(&self) -> &[i32] {
        &self.doc_ids
    }

    pub fn weights(&self) -> &[u8] {
        &self.weights
    }

    pub fn summary(&self) -> Option<&SparseVector> {
        self.summary.as_ref()
    }

    pub fn should_not_skip(&self) -> bool {
        self.should_not_skip
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DocWeight> + '_ {
        self.doc_ids
            .iter()
            .zip(self.weights.iter())
            .map(|(&doc_id, &weight)| DocWeight { doc_id, weight })
    }
}

/// An ordered sequence of clusters for one term. Order is the order
/// clustering produced and MUST be preserved across persistence — it defines
/// the scorer's skipping order (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct PostingClusters(Vec<DocumentCluster>);

impl PostingClusters {
    pub fn new(clusters: Vec<DocumentCluster>) -> Self {
        PostingClusters(clusters)
    }

    pub fn clusters(&self) -> &[DocumentCluster] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.0.len()
    }
}

pub trait ClusteringAlgorithm {
    /// `dim` is the field's token-id upper bound, used to densify vectors
    /// once per center-assignment pass rather than per (center, doc) pair.
    fn cluster(
        &self,
        docs: &[DocWeight],
        reader: &dyn VectorReader,
        dim: u32,
        rng: &mut StdRng,
    ) -> Result<Vec<DocumentCluster>>;
}

/// Default clustering algorithm (spec.md §4.2): randomly sampled centers,
/// greedy nearest-center assignment, coordinate-max summary with mass-ratio
/// pruning.
#[derive(Debug, Clone, Copy)]
pub struct RandomClustering {
    pub cluster_ratio: f32,
    pub summary_prune_ratio: f32,
}

impl RandomClustering {
    pub fn new(cluster_ratio: f32, summary_prune_ratio: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&cluster_ratio) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("cluster_ratio must be in [0,1], got {cluster_ratio}"),
            ));
        }
        if !(0.0..=1.0).contains(&summary_prune_ratio) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("summary_prune_ratio must be in [0,1], got {summary_prune_ratio}"),
            ));
        }
        Ok(RandomClustering {
            cluster_ratio,
            summary_prune_ratio,
        })
    }
}

impl ClusteringAlgorithm for RandomClustering {
    fn cluster(
        &self,
        docs: &[DocWeight],
        reader: &dyn VectorReader,
        dim: u32,
        rng: &mut StdRng,
    ) -> Result<Vec<DocumentCluster>> {
        if self.cluster_ratio == 0.0 {
            // Disables pruning entirely: a single unprunable cluster, always
            // scored (spec.md §4.2 step 1).
            return Ok(vec![DocumentCluster::new(docs.to_vec(), None)]);
        }

        let n = docs.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let k = ((n as f32 * self.cluster_ratio).ceil() as usize).clamp(1, n);

        let center_indices = sample(rng, n, k).into_vec();
        let centers: Vec<Arc<SparseVector>> = center_indices
            .iter()
            .filter_map(|&idx| reader.read(docs[idx].doc_id))
            .collect();
        if centers.is_empty() {
            // All sampled centers had missing vectors: fall back to a single
            // unprunable cluster rather than producing zero clusters.
            return Ok(vec![DocumentCluster::new(docs.to_vec(), None)]);
        }

        let mut buckets: Vec<Vec<DocWeight>> = vec![Vec::new(); centers.len()];

        for &doc in docs {
            let Some(v) = reader.read(doc.doc_id) else {
                continue; // Dropped: reader has no vector for this doc.
            };
            let dense = v.to_dense(dim);
            let mut best_idx = 0usize;
            let mut best_score = i32::MIN;
            for (i, center) in centers.iter().enumerate() {
                let score = center.dot_dense(&dense);
                if score > best_score {
                    best_score = score;
                    best_idx = i;
                }
            }
            buckets[best_idx].push(doc);
        }

        let mut clusters = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            if bucket.is_empty() {
                continue;
            }
            let members: Vec<Arc<SparseVector>> = bucket
                .iter()
                .filter_map(|d| reader.read(d.doc_id))
                .collect();
            let summary = build_summary(&members, self.summary_prune_ratio);
            clusters.push(DocumentCluster::new(bucket, Some(summary)));
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "clustered {} postings into {} clusters (cluster_ratio={})",
            n,
            clusters.len(),
            self.cluster_ratio
        );

        Ok(clusters)
    }
}

/// Coordinate-wise maximum across member vectors, pruned by dropping the
/// lowest-weight tokens until the retained mass ratio is
/// `>= 1 - summary_prune_ratio` (spec.md §4.2 "Summary (pruning) procedure").
/// This is the only variant of the two the original source mixed together
/// that preserves the scorer's upper-bound invariant (spec.md §8, invariant
/// 5) — see DESIGN.md.
fn build_summary(members: &[Arc<SparseVector>], summary_prune_ratio: f32) -> SparseVector {
    use std::collections::HashMap;

    let mut max_weight: HashMap<u32, u8> = HashMap::new();
    for member in members {
        for (token, weight) in member.iter() {
            max_weight
                .entry(token)
                .and_modify(|m| *m = (*m).max(weight))
                .or_insert(weight);
        }
    }

    let mut by_weight: Vec<(u32, u8)> = max_weight.into_iter().collect();
    by_weight.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let total_mass: u64 = by_weight.iter().map(|&(_, w)| w as u64).sum();
    let target_mass = (total_mass as f64 * (1.0 - summary_prune_ratio as f64)).ceil() as u64;

    let mut retained = Vec::with_capacity(by_weight.len());
    let mut acc: u64 = 0;
    for &(token, weight) in &by_weight {
        if acc >= target_mass && !retained.is_empty() {
            break;
        }
        retained.push((token, weight));
        acc += weight as u64;
    }

    SparseVector::from_pairs(retained)
}
