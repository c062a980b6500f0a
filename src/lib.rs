//! A SEISMIC-style approximate nearest-neighbor index core for sparse,
//! high-dimensional vectors.
//!
//! ```text
//! sparse          — quantized sparse vectors and raw posting entries (C1, C2)
//! clustering      — posting clustering + pruned summaries (C3)
//! forward_index   — per-segment docId -> SparseVector store (C4)
//! postings_store  — per-segment term -> PostingClusters store (C5)
//! codec           — binary on-disk record/file/term-dictionary format (C6)
//! merge           — segment-merge pipeline (C7)
//! scorer          — heap-pruned query scorer (C8)
//! cache           — byte-budgeted cache manager shared by C4 and C5 (C9)
//! ```
//!
//! A segment's field is assembled from these pieces: a [`forward_index::ForwardIndex`]
//! and a [`postings_store::ClusteredPostingIndex`] are populated at build or
//! merge time, sealed to disk through [`codec::SegmentFieldWriter`], and
//! queried through [`scorer::QueryScorer`] once reopened via
//! [`codec::SegmentFieldReader`]. All byte accounting for both stores flows
//! through one shared [`cache::CacheManager`].

pub mod cache;
pub mod clustering;
pub mod codec;
pub mod core;
pub mod forward_index;
pub mod merge;
pub mod postings_store;
pub mod scorer;
pub mod sparse;

pub use core::error::{Error, ErrorKind, Result};
