use crate::core::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telemetry surfaced when `EngineSettings::stats_enabled` is set
/// (spec.md §6, `neural.stats_enabled`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub start_time: DateTime<Utc>,
    pub segment_count: usize,
    pub total_documents: u64,
    pub forward_index_bytes: u64,
    pub posting_bytes: u64,
    pub cache_stats: CacheStats,
}

impl IndexStats {
    /// Wire encoding for a host that ships stats across a process boundary
    /// (e.g. to a monitoring sidecar), matching the teacher's use of
    /// `bincode` for its own on-disk/on-wire struct encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub forward_index_entries: usize,
    pub posting_entries: usize,
    pub bytes_in_use: u64,
    pub budget_bytes: u64,
    pub evictions: u64,
    pub budget_refusals: u64,
}

impl CacheStats {
    pub fn utilization(&self) -> f32 {
        if self.budget_bytes == 0 {
            0.0
        } else {
            self.bytes_in_use as f32 / self.budget_bytes as f32
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_round_trip_through_bincode() {
        let stats = IndexStats {
            start_time: Utc::now(),
            segment_count: 3,
            total_documents: 1_000,
            forward_index_bytes: 4_096,
            posting_bytes: 2_048,
            cache_stats: CacheStats {
                forward_index_entries: 10,
                posting_entries: 20,
                bytes_in_use: 6_144,
                budget_bytes: 1 << 20,
                evictions: 1,
                budget_refusals: 0,
            },
        };

        let bytes = stats.to_bytes().unwrap();
        let decoded = IndexStats::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.segment_count, stats.segment_count);
        assert_eq!(decoded.total_documents, stats.total_documents);
        assert_eq!(decoded.cache_stats.bytes_in_use, stats.cache_stats.bytes_in_use);
    }

    #[test]
    fn from_bytes_on_garbage_is_an_error() {
        assert!(IndexStats::from_bytes(&[0xff, 0x00, 0x11]).is_err());
    }
}
