use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document identifier, dense per (segment, field).
pub type DocId = i32;

/// Sparse-vector coordinate identifier (token id assigned by the upstream
/// sparse encoder). The domain is known a priori (e.g. 30,000-60,000) but not
/// fixed at compile time, so it is carried as a plain `u32`.
pub type Token = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId(pub u32);

/// Eviction/accounting granularity for the cache manager: one entry per
/// (segment, field) pair, matching spec.md's `CacheKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub segment_id: SegmentId,
    pub field_id: FieldId,
}

impl CacheKey {
    pub fn new(segment_id: SegmentId, field_id: FieldId) -> Self {
        CacheKey {
            segment_id,
            field_id,
        }
    }
}
