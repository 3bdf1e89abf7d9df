//! Health and Statistics Reporting
//!
//! Read-only views over the cache tiers:
//!
//! - **Health** (`health.rs`) - per-tier connectivity checks
//! - **Report** (`report.rs`) - aggregated cardinality counters
//! - **Exporter** (`exporter.rs`) - Prometheus text exposition

pub mod exporter;
pub mod health;
pub mod report;

pub use exporter::MetricsExporter;
pub use health::{HealthReport, HealthStatus, TierCheck};
pub use report::StatsReport;
