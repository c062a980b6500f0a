//! Binary codec (spec.md C6): per-term record layout, fixed file
//! header/footer, and the on-disk term dictionary, assembled into the
//! writer/reader pair used to seal and reopen one (segment, field)'s
//! postings.

pub mod file;
pub mod record;
pub mod term_dictionary;
pub mod varint;

use crate::clustering::PostingClusters;
use crate::core::error::Result;
use crate::core::types::SegmentId;
use file::{FileHeader, FileSuffix};
use std::io::Write;
use term_dictionary::{TermDictionary, TermDictionaryBuilder};

/// Writes the postings file and term-dictionary file for one (segment,
/// field), sealing both with header + CRC32 footer on [`finish`].
///
/// [`finish`]: SegmentFieldWriter::finish
pub struct SegmentFieldWriter {
    segment_id: SegmentId,
    postings_body: Vec<u8>,
    dict_builder: TermDictionaryBuilder,
}

impl SegmentFieldWriter {
    pub fn new(segment_id: SegmentId) -> Self {
        SegmentFieldWriter {
            segment_id,
            postings_body: Vec::new(),
            dict_builder: TermDictionaryBuilder::new(),
        }
    }

    /// Terms MUST be written in ascending order (the merge pipeline's union
    /// of terms is already sorted).
    pub fn write_term(&mut self, term: &[u8], clusters: &PostingClusters) -> Result<()> {
        let offset = self.postings_body.len() as u64;
        let encoded = record::encode_posting_clusters(clusters);
        self.postings_body.extend_from_slice(&encoded);
        self.dict_builder.insert(term, offset)
    }

    /// Returns `(term_dictionary_bytes, postings_file_bytes)`, both sealed
    /// with header and checksum footer, ready to be written to disk by the
    /// caller (or handed straight to [`SegmentFieldReader::open`] in tests).
    pub fn finish(self) -> Result<(Vec<u8>, Vec<u8>)> {
        let dict_body = self.dict_builder.into_bytes()?;

        let dict_header = FileHeader {
            segment_id: self.segment_id,
            suffix: FileSuffix::TermDictionary,
        };
        let mut dict_file = dict_header.encode().to_vec();
        dict_file.extend_from_slice(&dict_body);
        file::write_footer(&mut dict_file, &dict_body);

        let postings_header = FileHeader {
            segment_id: self.segment_id,
            suffix: FileSuffix::Postings,
        };
        let mut postings_file = postings_header.encode().to_vec();
        postings_file.extend_from_slice(&self.postings_body);
        file::write_footer(&mut postings_file, &self.postings_body);

        Ok((dict_file, postings_file))
    }
}

/// Writes `bytes` to `path`, truncating any existing file. A thin wrapper
/// so callers don't need `std::fs` directly; kept here rather than in
/// `file` since it is a disk-writing concern, not a framing one.
pub fn write_file(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

/// Opens a sealed (segment, field) file pair for reading, validating both
/// headers and checksums eagerly.
pub struct SegmentFieldReader {
    dict: TermDictionary,
    postings_body: Vec<u8>,
}

impl SegmentFieldReader {
    pub fn open(dict_bytes: &[u8], postings_bytes: &[u8]) -> Result<Self> {
        let (_header, dict_body) =
            file::read_and_validate(dict_bytes, FileSuffix::TermDictionary)?;
        let (_header, postings_body) =
            file::read_and_validate(postings_bytes, FileSuffix::Postings)?;
        let dict = TermDictionary::open(dict_body)?;
        Ok(SegmentFieldReader {
            dict,
            postings_body,
        })
    }

    pub fn read(&self, term: &[u8]) -> Result<Option<PostingClusters>> {
        let Some(offset) = self.dict.get(term) else {
            return Ok(None);
        };
        let (clusters, _consumed) =
            record::decode_posting_clusters(&self.postings_body[offset as usize..])?;
        Ok(Some(clusters))
    }

    pub fn get_terms(&self) -> Vec<Box<[u8]>> {
        self.dict.get_terms()
    }

    pub fn term_count(&self) -> usize {
        self.dict.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{ClusteringAlgorithm, RandomClustering, VectorReader};
    use crate::sparse::{DocWeight, SparseVector};
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MapReader(HashMap<i32, Arc<SparseVector>>);
    impl VectorReader for MapReader {
        fn read(&self, doc_id: i32) -> Option<Arc<SparseVector>> {
            self.0.get(&doc_id).cloned()
        }
    }

    fn build_clusters(seed: u64, base_token: u32) -> PostingClusters {
        let mut map = HashMap::new();
        let mut docs = Vec::new();
        for i in 0..8 {
            map.insert(
                i,
                Arc::new(SparseVector::from_pairs(vec![(base_token, (i as u8) + 1)])),
            );
            docs.push(DocWeight::new(i, 1));
        }
        let reader = MapReader(map);
        let algo = RandomClustering::new(0.3, 0.2).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        PostingClusters::new(algo.cluster(&docs, &reader, base_token + 1, &mut rng).unwrap())
    }

    #[test]
    fn write_then_open_round_trips_every_term() {
        let segment_id = SegmentId::new();
        let mut writer = SegmentFieldWriter::new(segment_id);
        writer.write_term(b"alpha", &build_clusters(1, 10)).unwrap();
        writer.write_term(b"beta", &build_clusters(2, 20)).unwrap();
        writer.write_term(b"gamma", &build_clusters(3, 30)).unwrap();
        let (dict_bytes, postings_bytes) = writer.finish().unwrap();

        let reader = SegmentFieldReader::open(&dict_bytes, &postings_bytes).unwrap();
        assert_eq!(reader.term_count(), 3);
        assert!(reader.read(b"alpha").unwrap().is_some());
        assert!(reader.read(b"beta").unwrap().is_some());
        assert!(reader.read(b"missing").unwrap().is_none());
    }

    #[test]
    fn corrupted_postings_file_is_rejected_on_open() {
        let segment_id = SegmentId::new();
        let mut writer = SegmentFieldWriter::new(segment_id);
        writer.write_term(b"alpha", &build_clusters(1, 10)).unwrap();
        let (dict_bytes, mut postings_bytes) = writer.finish().unwrap();

        let last = postings_bytes.len() - 1;
        postings_bytes[last] ^= 0xff;
        assert!(SegmentFieldReader::open(&dict_bytes, &postings_bytes).is_err());
    }

    #[test]
    fn write_file_then_reopen_from_disk_round_trips() {
        use tempfile::NamedTempFile;

        let segment_id = SegmentId::new();
        let mut writer = SegmentFieldWriter::new(segment_id);
        writer.write_term(b"alpha", &build_clusters(1, 10)).unwrap();
        writer.write_term(b"beta", &build_clusters(2, 20)).unwrap();
        let (dict_bytes, postings_bytes) = writer.finish().unwrap();

        let dict_file = NamedTempFile::new().unwrap();
        let postings_file = NamedTempFile::new().unwrap();
        write_file(dict_file.path(), &dict_bytes).unwrap();
        write_file(postings_file.path(), &postings_bytes).unwrap();

        let dict_on_disk = std::fs::read(dict_file.path()).unwrap();
        let postings_on_disk = std::fs::read(postings_file.path()).unwrap();
        let reader = SegmentFieldReader::open(&dict_on_disk, &postings_on_disk).unwrap();

        assert_eq!(reader.term_count(), 2);
        assert!(reader.read(b"alpha").unwrap().is_some());
        assert!(reader.read(b"beta").unwrap().is_some());
    }
}
