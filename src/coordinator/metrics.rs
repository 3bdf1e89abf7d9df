//! Coordinator Metrics Collection
//!
//! Per-tier hit/miss counters and write outcomes for monitoring cache health.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Coordinator metrics collector
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    // Read path
    volatile_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    decode_failures: AtomicU64,

    // Write path
    stores: AtomicU64,
    store_failures: AtomicU64,
    volatile_write_failures: AtomicU64,
    repopulations: AtomicU64,

    // Maintenance
    invalidations: AtomicU64,
    purged_sessions: AtomicU64,
    durable_errors: AtomicU64,

    // Origin fetches driven through single-flight
    fetches: AtomicU64,
    coalesced: AtomicU64,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_volatile_hit(&self) {
        self.volatile_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_durable_hit(&self) {
        self.durable_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self, durable_ok: bool) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        if !durable_ok {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_volatile_write_failure(&self) {
        self.volatile_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repopulation(&self) {
        self.repopulations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purge(&self, count: usize) {
        self.purged_sessions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_durable_error(&self) {
        self.durable_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn volatile_hits(&self) -> u64 {
        self.volatile_hits.load(Ordering::Relaxed)
    }

    pub fn durable_hits(&self) -> u64 {
        self.durable_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn repopulations(&self) -> u64 {
        self.repopulations.load(Ordering::Relaxed)
    }

    /// Fraction of lookups answered by either tier
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.volatile_hits() + self.durable_hits()) as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            volatile_hits: self.volatile_hits(),
            durable_hits: self.durable_hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            volatile_write_failures: self.volatile_write_failures.load(Ordering::Relaxed),
            repopulations: self.repopulations(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            purged_sessions: self.purged_sessions.load(Ordering::Relaxed),
            durable_errors: self.durable_errors.load(Ordering::Relaxed),
            fetches: self.fetches(),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CoordinatorMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub volatile_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub decode_failures: u64,
    pub stores: u64,
    pub store_failures: u64,
    pub volatile_write_failures: u64,
    pub repopulations: u64,
    pub invalidations: u64,
    pub purged_sessions: u64,
    pub durable_errors: u64,
    pub fetches: u64,
    pub coalesced: u64,
}
