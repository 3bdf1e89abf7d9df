//! Pitwall - Tiered Cache-Aside Coordinator
//!
//! Serves motorsport session timing data (season schedules, per-event
//! session lists and per-session results) from the fastest tier holding
//! it, and keeps the tiers consistent under TTL expiry and invalidation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Coordinator                             │
//! │        lookup / store / invalidate / stats / health              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌─────────────┐  │
//! │  │  VolatileCache   │──▶│   DurableStore   │──▶│   Origin    │  │
//! │  │ (Redis/fallback) │   │     (SQLite)     │   │ (caller's)  │  │
//! │  └──────────────────┘   └──────────────────┘   └─────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The volatile tier may vanish at any time; the coordinator then serves
//! the same contract from an in-process map. The durable store is the
//! system of record and survives restarts. The remote origin is never
//! called by this crate except through the fetch closures handed to
//! [`Coordinator::session_or_fetch`] and [`Coordinator::schedule_or_fetch`].
//!
//! # Modules
//!
//! - [`adapters`] - Redis, SQLite and in-memory implementations of the ports
//! - [`cache`] - volatile tier adapter with degraded-mode fallback
//! - [`config`] - runtime configuration
//! - [`coordinator`] - cache-aside orchestration
//! - [`domain`] - record types, keys and ports
//! - [`error`] - error types
//! - [`monitoring`] - health, statistics and Prometheus exposition
//! - [`server`] - HTTP probe and metrics endpoints

pub mod adapters;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod monitoring;
pub mod server;

// Re-export commonly used types
pub use cache::VolatileCache;
pub use config::Config;
pub use coordinator::Coordinator;
pub use domain::model::{Cell, Driver, Event, EventStatus, SessionResult, SessionSummary, SessionType};
pub use error::{Error, ErrorKind, Result};
pub use monitoring::{HealthReport, HealthStatus, StatsReport};
