//! Per-term record layout (spec.md §4.5):
//! ```text
//! record  := numClusters (varu64) cluster{numClusters}
//! cluster := numDocs (varu64)
//!            (docId varu32, weightByte) × numDocs
//!            shouldNotSkip (u8 ∈ {0,1})
//!            summaryLen (varu64)
//!            (token varu32, weightByte) × summaryLen
//! ```

use super::varint::{read_varu32, read_varu64, write_varu32, write_varu64};
use crate::clustering::{DocumentCluster, PostingClusters};
use crate::core::error::{Error, ErrorKind, Result};
use crate::sparse::SparseVector;

pub fn encode_posting_clusters(clusters: &PostingClusters) -> Vec<u8> {
    let mut out = Vec::new();
    write_varu64(&mut out, clusters.cluster_count() as u64);
    for cluster in clusters.clusters() {
        encode_cluster(&mut out, cluster);
    }
    out
}

fn encode_cluster(out: &mut Vec<u8>, cluster: &DocumentCluster) {
    write_varu64(out, cluster.len() as u64);
    for (doc_id, weight) in cluster.doc_ids().iter().zip(cluster.weights()) {
        write_varu32(out, *doc_id as u32);
        out.push(*weight);
    }
    out.push(cluster.should_not_skip() as u8);
    match cluster.summary() {
        Some(summary) => {
            write_varu64(out, summary.len() as u64);
            for (token, weight) in summary.iter() {
                write_varu32(out, token);
                out.push(weight);
            }
        }
        None => write_varu64(out, 0),
    }
}

/// Decodes a record from `bytes`, returning the clusters and the number of
/// bytes consumed (the caller may have more records packed after this one).
pub fn decode_posting_clusters(bytes: &[u8]) -> Result<(PostingClusters, usize)> {
    let mut pos = 0usize;
    let (num_clusters, n) = read_varu64(&bytes[pos..])?;
    pos += n;

    let mut clusters = Vec::with_capacity(num_clusters as usize);
    for _ in 0..num_clusters {
        let (cluster, consumed) = decode_cluster(&bytes[pos..])?;
        clusters.push(cluster);
        pos += consumed;
    }
    Ok((PostingClusters::new(clusters), pos))
}

fn decode_cluster(bytes: &[u8]) -> Result<(DocumentCluster, usize)> {
    let mut pos = 0usize;

    let (num_docs, n) = read_varu64(&bytes[pos..])?;
    pos += n;

    let mut doc_ids = Vec::with_capacity(num_docs as usize);
    let mut weights = Vec::with_capacity(num_docs as usize);
    for _ in 0..num_docs {
        let (doc_id, n) = read_varu32(&bytes[pos..])?;
        pos += n;
        let weight = *bytes.get(pos).ok_or_else(|| {
            Error::new(ErrorKind::Corruption, "truncated record: missing weight byte")
        })?;
        pos += 1;
        doc_ids.push(doc_id as i32);
        weights.push(weight);
    }

    let should_not_skip_byte = *bytes
        .get(pos)
        .ok_or_else(|| Error::new(ErrorKind::Corruption, "truncated record: missing shouldNotSkip"))?;
    pos += 1;
    let should_not_skip = match should_not_skip_byte {
        0 => false,
        1 => true,
        other => {
            return Err(Error::new(
                ErrorKind::Corruption,
                format!("shouldNotSkip byte must be 0 or 1, got {other}"),
            ))
        }
    };

    let (summary_len, n) = read_varu64(&bytes[pos..])?;
    pos += n;
    let summary = if summary_len == 0 {
        None
    } else {
        let mut pairs = Vec::with_capacity(summary_len as usize);
        for _ in 0..summary_len {
            let (token, n) = read_varu32(&bytes[pos..])?;
            pos += n;
            let weight = *bytes.get(pos).ok_or_else(|| {
                Error::new(ErrorKind::Corruption, "truncated record: missing summary weight")
            })?;
            pos += 1;
            pairs.push((token, weight));
        }
        Some(SparseVector::from_pairs(pairs))
    };

    let cluster = DocumentCluster::from_decoded(
        doc_ids.into_boxed_slice(),
        weights.into_boxed_slice(),
        summary,
        should_not_skip,
    )?;
    Ok((cluster, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{ClusteringAlgorithm, RandomClustering, VectorReader};
    use crate::sparse::DocWeight;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MapReader(HashMap<i32, Arc<SparseVector>>);
    impl VectorReader for MapReader {
        fn read(&self, doc_id: i32) -> Option<Arc<SparseVector>> {
            self.0.get(&doc_id).cloned()
        }
    }

    fn sample_postings() -> PostingClusters {
        let mut map = HashMap::new();
        let mut docs = Vec::new();
        for i in 0..10 {
            map.insert(
                i,
                Arc::new(SparseVector::from_pairs(vec![(10, (i as u8) + 1), (20, 5)])),
            );
            docs.push(DocWeight::new(i, 5));
        }
        let reader = MapReader(map);
        let algo = RandomClustering::new(0.4, 0.3).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        let clusters = algo.cluster(&docs, &reader, 21, &mut rng).unwrap();
        PostingClusters::new(clusters)
    }

    #[test]
    fn round_trip_is_byte_identical_modulo_header_footer() {
        let original = sample_postings();
        let encoded = encode_posting_clusters(&original);
        let (decoded, consumed) = decode_posting_clusters(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.cluster_count(), original.cluster_count());
        for (a, b) in decoded.clusters().iter().zip(original.clusters()) {
            assert_eq!(a.doc_ids(), b.doc_ids());
            assert_eq!(a.weights(), b.weights());
            assert_eq!(a.should_not_skip(), b.should_not_skip());
            assert_eq!(a.summary(), b.summary());
        }
    }

    #[test]
    fn cluster_ratio_zero_round_trips_unprunable_cluster() {
        let mut map = HashMap::new();
        map.insert(1, Arc::new(SparseVector::from_pairs(vec![(1, 9)])));
        let reader = MapReader(map);
        let docs = vec![DocWeight::new(1, 9)];
        let algo = RandomClustering::new(0.0, 0.4).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let clusters = PostingClusters::new(algo.cluster(&docs, &reader, 2, &mut rng).unwrap());

        let encoded = encode_posting_clusters(&clusters);
        let (decoded, _) = decode_posting_clusters(&encoded).unwrap();
        assert!(decoded.clusters()[0].should_not_skip());
        assert!(decoded.clusters()[0].summary().is_none());
    }

    #[test]
    fn truncated_bytes_surface_a_corruption_error() {
        let encoded = encode_posting_clusters(&sample_postings());
        let truncated = &encoded[..encoded.len() - 1];
        assert!(decode_posting_clusters(truncated).is_err());
    }
}
