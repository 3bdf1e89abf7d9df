//! Cache statistics report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::VolatileSnapshot;
use crate::coordinator::MetricsSnapshot;
use crate::domain::ports::DurableStats;

/// Aggregated, read-only view of both tiers and the coordinator counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Key namespace in the volatile tier
    pub namespace: String,
    pub volatile: VolatileSnapshot,
    /// TTL applied to session and event-list entries
    pub default_ttl_seconds: u64,
    /// TTL applied to season schedules
    pub schedule_ttl_seconds: u64,
    /// `None` when no durable store is configured or it failed to report
    pub durable: Option<DurableStats>,
    pub durable_error: Option<String>,
    pub coordinator: MetricsSnapshot,
    pub generated_at: DateTime<Utc>,
}

impl StatsReport {
    pub fn connected(&self) -> bool {
        self.volatile.connected
    }

    /// Entries served by the in-process fallback map
    pub fn fallback_entries(&self) -> usize {
        self.volatile.fallback_entries
    }
}
