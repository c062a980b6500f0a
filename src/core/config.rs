use crate::core::error::{Error, ErrorKind, Result};

/// Default fraction of a term's posting length retained when `n_postings ==
/// -1` (spec.md §6, `n_postings` field description).
pub const DEFAULT_POSTING_PRUNE_RATIO: f32 = 0.1;
pub const DEFAULT_POSTING_MINIMUM_LENGTH: usize = 2_000;

/// Cache budget expressed the way the host configures it: either a
/// percentage of some externally-tracked heap size, or an absolute byte
/// count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitBreakerLimit {
    Percentage(f32),
    Bytes(u64),
}

impl CircuitBreakerLimit {
    /// Resolve to an absolute byte budget given the current heap size (only
    /// relevant for the `Percentage` variant).
    pub fn resolve_bytes(&self, heap_size_bytes: u64) -> u64 {
        match self {
            CircuitBreakerLimit::Bytes(b) => *b,
            CircuitBreakerLimit::Percentage(p) => {
                ((heap_size_bytes as f64) * (*p as f64 / 100.0)) as u64
            }
        }
    }
}

impl Default for CircuitBreakerLimit {
    fn default() -> Self {
        CircuitBreakerLimit::Percentage(10.0)
    }
}

/// Node-wide settings (spec.md §6 "Settings").
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub index_thread_qty: usize,
    pub circuit_breaker_limit: CircuitBreakerLimit,
    pub stats_enabled: bool,
    pub reranker_max_document_fields: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        EngineSettings {
            index_thread_qty: (cpus / 2).max(1).min(cpus),
            circuit_breaker_limit: CircuitBreakerLimit::default(),
            stats_enabled: false,
            reranker_max_document_fields: 50,
        }
    }
}

impl EngineSettings {
    /// Clamp a requested thread count into `[1, cpus]`, per spec.md §6.
    pub fn with_index_thread_qty(mut self, requested: usize) -> Self {
        let cpus = num_cpus::get().max(1);
        self.index_thread_qty = requested.max(1).min(cpus);
        self
    }
}

/// Per-field mapping parameters, read once at field-create time and
/// immutable afterwards (spec.md §6 table).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMappingParameters {
    pub n_postings: i64,
    pub summary_prune_ratio: f32,
    pub cluster_ratio: f32,
    pub approximate_threshold: u64,
}

impl Default for FieldMappingParameters {
    fn default() -> Self {
        FieldMappingParameters {
            n_postings: 6_000,
            summary_prune_ratio: 0.4,
            cluster_ratio: 0.1,
            approximate_threshold: 1_000_000,
        }
    }
}

impl FieldMappingParameters {
    /// Resolve `n_postings` against the documented `-1` sentinel.
    pub fn resolved_n_postings(&self, doc_count: usize) -> usize {
        if self.n_postings < 0 {
            ((doc_count as f32) * DEFAULT_POSTING_PRUNE_RATIO)
                .round()
                .max(DEFAULT_POSTING_MINIMUM_LENGTH as f32) as usize
        } else {
            self.n_postings as usize
        }
    }

    /// Whether this field, at the given doc count, should build a SEISMIC
    /// index at all or degrade to plain postings (spec.md §6,
    /// `approximate_threshold`).
    pub fn seismic_enabled(&self, doc_count: u64) -> bool {
        doc_count >= self.approximate_threshold
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.summary_prune_ratio) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "summary_prune_ratio must be in [0,1], got {}",
                    self.summary_prune_ratio
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.cluster_ratio) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("cluster_ratio must be in [0,1], got {}", self.cluster_ratio),
            ));
        }
        Ok(())
    }
}
