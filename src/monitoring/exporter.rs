//! Prometheus Exporter
//!
//! Mirrors a [`StatsReport`] into a private registry and renders it in the
//! text exposition format. Coordinator counters are monotonic, so each
//! render advances the Prometheus counters by the delta since the last one.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder,
};

use super::report::StatsReport;
use crate::error::{Error, Result};

/// Prometheus view of the cache tiers
pub struct MetricsExporter {
    registry: Registry,

    lookups: IntCounterVec,
    stores: IntCounter,
    store_failures: IntCounter,
    volatile_write_failures: IntCounter,
    repopulations: IntCounter,
    invalidations: IntCounter,
    purged_sessions: IntCounter,
    durable_errors: IntCounter,
    origin_fetches: IntCounter,
    coalesced: IntCounter,
    degradations: IntCounter,

    volatile_connected: IntGauge,
    volatile_keys: IntGauge,
    fallback_entries: IntGauge,
    durable_rows: IntGaugeVec,
    durable_size_bytes: IntGauge,
}

fn registration(name: &str) -> impl FnOnce(prometheus::Error) -> Error + '_ {
    move |e| Error::Internal(format!("Failed to register {}: {}", name, e))
}

impl MetricsExporter {
    /// Create an exporter with all metrics registered
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(name, help, registry).map_err(registration(name))
        };
        let gauge = |name: &str, help: &str| {
            register_int_gauge_with_registry!(name, help, registry).map_err(registration(name))
        };

        let lookups = register_int_counter_vec_with_registry!(
            "pitwall_lookups_total",
            "Lookups by the tier that answered them",
            &["tier"],
            registry
        )
        .map_err(registration("pitwall_lookups_total"))?;

        let durable_rows = register_int_gauge_vec_with_registry!(
            "pitwall_durable_rows",
            "Rows held by the durable store",
            &["kind"],
            registry
        )
        .map_err(registration("pitwall_durable_rows"))?;

        Ok(Self {
            lookups,
            stores: counter("pitwall_stores_total", "Store operations")?,
            store_failures: counter(
                "pitwall_store_failures_total",
                "Store operations that were not durably persisted",
            )?,
            volatile_write_failures: counter(
                "pitwall_volatile_write_failures_total",
                "Best-effort volatile writes that failed",
            )?,
            repopulations: counter(
                "pitwall_repopulations_total",
                "Volatile entries refilled from the durable store",
            )?,
            invalidations: counter("pitwall_invalidations_total", "Invalidation calls")?,
            purged_sessions: counter(
                "pitwall_purged_sessions_total",
                "Session results removed by retention sweeps",
            )?,
            durable_errors: counter("pitwall_durable_errors_total", "Durable store failures")?,
            origin_fetches: counter(
                "pitwall_origin_fetches_total",
                "Remote origin fetches driven by the coordinator",
            )?,
            coalesced: counter(
                "pitwall_coalesced_lookups_total",
                "Concurrent misses that joined an in-flight fetch",
            )?,
            degradations: counter(
                "pitwall_volatile_degradations_total",
                "Switches from the volatile backend to the in-process fallback",
            )?,
            volatile_connected: gauge(
                "pitwall_volatile_connected",
                "Whether the volatile backend is reachable",
            )?,
            volatile_keys: gauge(
                "pitwall_volatile_keys",
                "Keys under the namespace in the volatile backend",
            )?,
            fallback_entries: gauge(
                "pitwall_fallback_entries",
                "Entries held by the in-process fallback map",
            )?,
            durable_rows,
            durable_size_bytes: gauge(
                "pitwall_durable_size_bytes",
                "Approximate size of the durable store",
            )?,
            registry,
        })
    }

    /// Update all metrics from `report` and encode them
    pub fn render(&self, report: &StatsReport) -> Result<Vec<u8>> {
        let m = &report.coordinator;
        advance(&self.lookups.with_label_values(&["volatile"]), m.volatile_hits);
        advance(&self.lookups.with_label_values(&["durable"]), m.durable_hits);
        advance(&self.lookups.with_label_values(&["miss"]), m.misses);
        advance(&self.stores, m.stores);
        advance(&self.store_failures, m.store_failures);
        advance(&self.volatile_write_failures, m.volatile_write_failures);
        advance(&self.repopulations, m.repopulations);
        advance(&self.invalidations, m.invalidations);
        advance(&self.purged_sessions, m.purged_sessions);
        advance(&self.durable_errors, m.durable_errors);
        advance(&self.origin_fetches, m.fetches);
        advance(&self.coalesced, m.coalesced);
        advance(&self.degradations, report.volatile.degradations);

        self.volatile_connected
            .set(i64::from(report.volatile.connected));
        self.volatile_keys
            .set(report.volatile.backend_keys.unwrap_or(0) as i64);
        self.fallback_entries
            .set(report.volatile.fallback_entries as i64);

        if let Some(durable) = &report.durable {
            self.durable_rows
                .with_label_values(&["seasons"])
                .set(durable.seasons as i64);
            self.durable_rows
                .with_label_values(&["events"])
                .set(durable.events as i64);
            self.durable_rows
                .with_label_values(&["sessions"])
                .set(durable.sessions as i64);
            self.durable_size_bytes.set(durable.size_bytes as i64);
        }

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }

    /// Content type of [`render`](Self::render) output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

/// Move a counter forward to `value`
fn advance(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::VolatileSnapshot;
    use crate::coordinator::MetricsSnapshot;
    use crate::domain::ports::DurableStats;
    use chrono::Utc;

    fn report(volatile_hits: u64) -> StatsReport {
        StatsReport {
            namespace: "pitwall".to_string(),
            volatile: VolatileSnapshot {
                connected: true,
                endpoint: "***".to_string(),
                fallback_entries: 2,
                backend_keys: Some(7),
                backend: None,
                degradations: 1,
                error: None,
            },
            default_ttl_seconds: 3600,
            schedule_ttl_seconds: 86400,
            durable: Some(DurableStats {
                seasons: 4,
                events: 24,
                sessions: 96,
                sessions_by_year: Vec::new(),
                size_bytes: 4096,
            }),
            durable_error: None,
            coordinator: MetricsSnapshot {
                volatile_hits,
                ..Default::default()
            },
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_exposes_tiers() {
        let exporter = MetricsExporter::new().unwrap();
        let text = String::from_utf8(exporter.render(&report(5)).unwrap()).unwrap();

        assert!(text.contains("pitwall_lookups_total{tier=\"volatile\"} 5"));
        assert!(text.contains("pitwall_volatile_connected 1"));
        assert!(text.contains("pitwall_volatile_keys 7"));
        assert!(text.contains("pitwall_durable_rows{kind=\"sessions\"} 96"));
        assert!(text.contains("pitwall_durable_size_bytes 4096"));
    }

    #[test]
    fn test_counters_follow_snapshot() {
        let exporter = MetricsExporter::new().unwrap();
        exporter.render(&report(5)).unwrap();
        let text = String::from_utf8(exporter.render(&report(9)).unwrap()).unwrap();
        assert!(text.contains("pitwall_lookups_total{tier=\"volatile\"} 9"));
    }

    #[test]
    fn test_exporters_are_independent() {
        assert!(MetricsExporter::new().is_ok());
        assert!(MetricsExporter::new().is_ok());
    }
}
