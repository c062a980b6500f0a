//! On-disk term dictionary (spec.md §4.5: "stores, per term, the file
//! offset of the record ..., enabling O(1) random access"). Backed by
//! `fst::Map`, generalizing the teacher's in-memory
//! `index::inverted::TermDictionary` (a `HashMap`) into a compact,
//! binary-searchable on-disk structure.

use crate::core::error::{Error, ErrorKind, Result};
use fst::map::Map as FstMap;
use fst::{IntoStreamer, MapBuilder, Streamer};

pub struct TermDictionaryBuilder {
    builder: MapBuilder<Vec<u8>>,
    last_term: Option<Vec<u8>>,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        TermDictionaryBuilder {
            builder: MapBuilder::memory(),
            last_term: None,
        }
    }

    /// Terms MUST be inserted in strictly ascending lexicographic order
    /// (the merge pipeline produces the union of terms pre-sorted).
    pub fn insert(&mut self, term: &[u8], offset: u64) -> Result<()> {
        if let Some(last) = &self.last_term {
            if term <= last.as_slice() {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "term dictionary keys must be inserted in ascending order",
                ));
            }
        }
        self.builder
            .insert(term, offset)
            .map_err(|e| Error::new(ErrorKind::Corruption, format!("term dictionary build: {e}")))?;
        self.last_term = Some(term.to_vec());
        Ok(())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.builder
            .into_inner()
            .map_err(|e| Error::new(ErrorKind::Corruption, format!("term dictionary finalize: {e}")))
    }
}

impl Default for TermDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TermDictionary {
    map: FstMap<Vec<u8>>,
}

impl TermDictionary {
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let map = FstMap::new(bytes)?;
        Ok(TermDictionary { map })
    }

    /// O(1)-amortized (finite-state-transducer lookup, not a linear scan)
    /// offset lookup.
    pub fn get(&self, term: &[u8]) -> Option<u64> {
        self.map.get(term)
    }

    pub fn get_terms(&self) -> Vec<Box<[u8]>> {
        let mut stream = self.map.stream();
        let mut terms = Vec::new();
        while let Some((term, _offset)) = stream.next() {
            terms.push(term.to_vec().into_boxed_slice());
        }
        terms
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_the_stored_offset() {
        let mut builder = TermDictionaryBuilder::new();
        builder.insert(b"alpha", 0).unwrap();
        builder.insert(b"beta", 120).unwrap();
        builder.insert(b"gamma", 340).unwrap();
        let bytes = builder.into_bytes().unwrap();

        let dict = TermDictionary::open(bytes).unwrap();
        assert_eq!(dict.get(b"beta"), Some(120));
        assert_eq!(dict.get(b"missing"), None);
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn out_of_order_insert_is_rejected() {
        let mut builder = TermDictionaryBuilder::new();
        builder.insert(b"beta", 0).unwrap();
        assert!(builder.insert(b"alpha", 1).is_err());
    }

    #[test]
    fn get_terms_returns_every_key_in_order() {
        let mut builder = TermDictionaryBuilder::new();
        builder.insert(b"alpha", 0).unwrap();
        builder.insert(b"beta", 1).unwrap();
        let dict = TermDictionary::open(builder.into_bytes().unwrap()).unwrap();
        assert_eq!(
            dict.get_terms(),
            vec![
                b"alpha".to_vec().into_boxed_slice(),
                b"beta".to_vec().into_boxed_slice()
            ]
        );
    }
}
