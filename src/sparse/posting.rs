use serde::{Deserialize, Serialize};

/// A single (docId, quantized weight) posting entry. Sequences of these are
/// the raw, unclustered postings for one term (spec.md §3, C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocWeight {
    pub doc_id: i32,
    pub weight: u8,
}

impl DocWeight {
    pub fn new(doc_id: i32, weight: u8) -> Self {
        DocWeight { doc_id, weight }
    }
}

/// Merges two doc-id-ascending posting slices, matching entries that share a
/// doc id and keeping `a`'s weight on a collision. Used by the merge
/// pipeline (C7) when combining input segments' postings for one term.
pub fn sorted_merge<'a>(
    a: &'a [DocWeight],
    b: &'a [DocWeight],
) -> impl Iterator<Item = DocWeight> + 'a {
    SortedMerge {
        a,
        b,
        i: 0,
        j: 0,
    }
}

struct SortedMerge<'a> {
    a: &'a [DocWeight],
    b: &'a [DocWeight],
    i: usize,
    j: usize,
}

impl Iterator for SortedMerge<'_> {
    type Item = DocWeight;

    fn next(&mut self) -> Option<DocWeight> {
        match (self.a.get(self.i), self.b.get(self.j)) {
            (Some(&x), Some(&y)) => {
                if x.doc_id <= y.doc_id {
                    self.i += 1;
                    if x.doc_id == y.doc_id {
                        self.j += 1;
                    }
                    Some(x)
                } else {
                    self.j += 1;
                    Some(y)
                }
            }
            (Some(&x), None) => {
                self.i += 1;
                Some(x)
            }
            (None, Some(&y)) => {
                self.j += 1;
                Some(y)
            }
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_merge_interleaves_and_dedups() {
        let a = [DocWeight::new(1, 1), DocWeight::new(3, 3), DocWeight::new(5, 5)];
        let b = [DocWeight::new(2, 2), DocWeight::new(3, 30), DocWeight::new(4, 4)];
        let merged: Vec<_> = sorted_merge(&a, &b).map(|d| d.doc_id).collect();
        assert_eq!(merged, vec![1, 2, 3, 4, 5]);
    }
}
