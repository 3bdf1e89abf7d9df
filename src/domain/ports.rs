//! Domain Ports (Port/Adapter Pattern)
//!
//! The coordinator depends only on these traits. Infrastructure adapters in
//! [`crate::adapters`] implement them for Redis, SQLite and an in-process
//! stand-in used by tests and embedded deployments.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  VolatileConnector │ VolatileBackend │ DurableStore │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │   RedisConnector │ InMemoryBackend │ SqliteStore    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Port methods report failures as [`crate::Error`]; translating those into
//! hit/miss and success flags is the job of the cache adapter and the
//! coordinator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::model::{Event, SessionResult, SessionSummary};
use crate::error::Result;

// =============================================================================
// Volatile Tier Ports
// =============================================================================

/// Server details reported by a volatile backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Server version, if the backend reports one
    pub version: Option<String>,
    /// Human-readable memory usage
    pub used_memory: Option<String>,
}

/// A shared key/value service with per-entry TTL.
///
/// Implementations must apply the TTL themselves; callers never sweep.
#[async_trait]
pub trait VolatileBackend: Send + Sync {
    /// Fetch a value
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// Delete every key starting with `prefix`
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize>;

    /// Count live keys starting with `prefix`
    async fn count_prefix(&self, prefix: &str) -> Result<usize>;

    /// Round-trip health probe
    async fn ping(&self) -> Result<()>;

    /// Server details
    async fn info(&self) -> Result<BackendInfo>;
}

/// Opens connections to a volatile backend.
///
/// Kept separate from [`VolatileBackend`] so the cache adapter can retry a
/// connection after running degraded.
#[async_trait]
pub trait VolatileConnector: Send + Sync {
    /// Establish a connection
    async fn connect(&self) -> Result<Arc<dyn VolatileBackend>>;

    /// Address shown in reports and logs
    fn endpoint(&self) -> String;
}

// =============================================================================
// Durable Tier Port
// =============================================================================

/// Session count for one season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    pub year: i32,
    pub sessions: u64,
}

/// Cardinality and size of the durable store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableStats {
    pub seasons: u64,
    pub events: u64,
    pub sessions: u64,
    pub sessions_by_year: Vec<YearCount>,
    /// Approximate storage size in bytes
    pub size_bytes: u64,
}

/// Local relational store; the system of record.
///
/// Every upsert replaces by key and every multi-row write is a single
/// transaction.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert_season(&self, year: i32) -> Result<()>;

    async fn upsert_seasons(&self, years: &[i32]) -> Result<()>;

    /// Stored seasons, newest first
    async fn list_seasons(&self) -> Result<Vec<i32>>;

    async fn upsert_event(&self, event: &Event) -> Result<()>;

    async fn upsert_events(&self, events: &[Event]) -> Result<()>;

    /// Events of one season in round order
    async fn list_events_by_year(&self, year: i32) -> Result<Vec<Event>>;

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>>;

    async fn upsert_session_result(&self, result: &SessionResult) -> Result<()>;

    async fn get_session_result(&self, session_id: &str) -> Result<Option<SessionResult>>;

    async fn session_exists(&self, session_id: &str) -> Result<bool>;

    async fn list_sessions_for_event(&self, event_id: &str) -> Result<Vec<SessionSummary>>;

    async fn list_sessions_for_round(&self, year: i32, round: u32) -> Result<Vec<SessionSummary>>;

    /// Delete one session result, returning whether it existed
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Delete every session result of one round
    async fn delete_sessions_for_round(&self, year: i32, round: u32) -> Result<usize>;

    /// Delete session results fetched more than `days` days ago
    async fn purge_older_than(&self, days: u32) -> Result<usize>;

    async fn stats(&self) -> Result<DurableStats>;
}
