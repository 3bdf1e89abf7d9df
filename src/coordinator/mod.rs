//! Cache-Aside Coordinator
//!
//! Orchestrates the volatile tier and the durable store behind the
//! lookup/store contract used by the presentation layer.
//!
//! # Read path
//!
//! ```text
//! lookup ──▶ VolatileCache ──hit──▶ value
//!                 │ miss
//!                 ▼
//!           DurableStore ──hit──▶ value  (+ async volatile refill)
//!                 │ miss
//!                 ▼
//!               None  ──▶ caller fetches from the origin, then store()
//! ```
//!
//! # Write path
//!
//! The durable store is written first and decides the returned success
//! flag. The volatile write is best-effort; a failure there is logged and
//! counted but never fails the call.
//!
//! No backend error escapes this type. Callers observe a hit, a miss, or a
//! boolean success flag.

mod freshness;
mod metrics;
mod singleflight;

pub use freshness::{ScheduleFreshness, MIN_EVENTS_CURRENT, MIN_EVENTS_HISTORIC};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
pub use singleflight::SingleFlight;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{RedisConnector, SqliteStore};
use crate::cache::{Envelope, VolatileCache};
use crate::config::Config;
use crate::domain::keys::{self, KeyBuilder};
use crate::domain::model::{Event, SessionResult, SessionSummary, SessionType};
use crate::domain::ports::DurableStore;
use crate::error::{Error, Result};
use crate::monitoring::{HealthReport, StatsReport, TierCheck};

/// Tiered cache-aside coordinator
pub struct Coordinator {
    config: Config,
    keys: KeyBuilder,
    volatile: Arc<VolatileCache>,
    durable: Option<Arc<dyn DurableStore>>,
    freshness: ScheduleFreshness,
    session_flights: SingleFlight<Option<SessionResult>>,
    schedule_flights: SingleFlight<Option<Vec<Event>>>,
    metrics: Arc<CoordinatorMetrics>,
    started_at: Instant,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("namespace", &self.keys.namespace())
            .field("volatile_connected", &self.volatile.is_connected())
            .field("durable", &self.durable.is_some())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl Coordinator {
    /// Assemble a coordinator from already-built tiers.
    ///
    /// `durable` may be `None`, in which case every volatile miss is a true
    /// miss.
    pub fn new(
        config: Config,
        volatile: Arc<VolatileCache>,
        durable: Option<Arc<dyn DurableStore>>,
    ) -> Self {
        Self {
            keys: KeyBuilder::new(config.namespace.clone()),
            freshness: ScheduleFreshness::new(config.current_season),
            config,
            volatile,
            durable,
            session_flights: SingleFlight::new(),
            schedule_flights: SingleFlight::new(),
            metrics: Arc::new(CoordinatorMetrics::new()),
            started_at: Instant::now(),
        }
    }

    /// Build the Redis and SQLite tiers described by `config` and connect.
    ///
    /// Fails only on an invalid configuration. An unreachable Redis leaves
    /// the coordinator degraded; an unusable database file leaves it without
    /// a durable tier.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;

        let connector = Arc::new(RedisConnector::new(config.redis_url.clone()));
        let volatile = Arc::new(VolatileCache::new(connector, config.operation_timeout));
        volatile.connect().await;

        let path = config.db_path.clone();
        let opened = tokio::task::spawn_blocking(move || SqliteStore::open(path))
            .await
            .map_err(Error::from)
            .and_then(|opened| opened);

        let durable: Option<Arc<dyn DurableStore>> = match opened {
            Ok(store) => Some(Arc::new(store.with_timeout(config.operation_timeout))),
            Err(e) => {
                warn!(
                    "Durable store at {} unavailable: {}. Continuing without it.",
                    config.db_path.display(),
                    e
                );
                None
            }
        };

        Ok(Self::new(config, volatile, durable))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn volatile(&self) -> &Arc<VolatileCache> {
        &self.volatile
    }

    pub fn durable(&self) -> Option<&Arc<dyn DurableStore>> {
        self.durable.as_ref()
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    pub fn freshness(&self) -> ScheduleFreshness {
        self.freshness
    }

    /// Whether a schedule of `events` rounds for `year` can be served
    /// without refetching
    pub fn is_schedule_complete(&self, year: i32, events: usize) -> bool {
        self.freshness.is_complete(year, events)
    }

    // =========================================================================
    // Session results
    // =========================================================================

    /// Look up one session result, volatile tier first
    #[instrument(skip(self))]
    pub async fn lookup_session_result(
        &self,
        year: i32,
        round: u32,
        session_type: &SessionType,
    ) -> Option<SessionResult> {
        let key = self.keys.session(year, round, session_type);
        if let Some(result) = self.read_volatile::<SessionResult>(&key).await {
            self.metrics.record_volatile_hit();
            debug!("Volatile hit for {}", key);
            return Some(result);
        }

        let session_id = keys::session_id(year, round, session_type);
        let found = match &self.durable {
            Some(store) => match store.get_session_result(&session_id).await {
                Ok(found) => found,
                Err(e) => {
                    self.durable_failed("session lookup", &e);
                    None
                }
            },
            None => None,
        };

        match found {
            Some(result) => {
                self.metrics.record_durable_hit();
                debug!("Durable hit for {}", session_id);
                self.repopulate(key, &result, self.config.default_ttl);
                Some(result)
            }
            None => {
                self.metrics.record_miss();
                debug!("Miss for {}", session_id);
                None
            }
        }
    }

    /// Persist a session result, then refresh the volatile copy.
    ///
    /// Returns whether the result was durably stored (or, without a durable
    /// tier, whether it reached the volatile tier). A zero `ttl` means the
    /// default TTL.
    #[instrument(skip(self, result), fields(session_id = %result.session_id))]
    pub async fn store_session_result(
        &self,
        result: &SessionResult,
        ttl: Option<Duration>,
    ) -> bool {
        let durable_ok = match &self.durable {
            Some(store) => match store.upsert_session_result(result).await {
                Ok(()) => Some(true),
                Err(e) => {
                    self.durable_failed("session upsert", &e);
                    Some(false)
                }
            },
            None => None,
        };

        let key = self
            .keys
            .session(result.year, result.round, &result.session_type);
        let ttl = effective_ttl(ttl, self.config.default_ttl);
        let volatile_ok = self.write_volatile(&key, result, ttl).await;

        // The event's cached session list no longer includes this session
        self.volatile
            .delete(&self.keys.event(result.year, result.round))
            .await;

        let ok = durable_ok.unwrap_or(volatile_ok);
        self.metrics.record_store(ok);
        ok
    }

    /// Remove one session result from both tiers. Removing a session that
    /// was never stored succeeds.
    #[instrument(skip(self))]
    pub async fn invalidate_session(
        &self,
        year: i32,
        round: u32,
        session_type: &SessionType,
    ) -> bool {
        self.metrics.record_invalidation();

        let volatile_ok = self
            .volatile
            .delete_many(&[
                self.keys.session(year, round, session_type),
                self.keys.event(year, round),
            ])
            .await;

        let durable_ok = match &self.durable {
            Some(store) => {
                let session_id = keys::session_id(year, round, session_type);
                match store.delete_session(&session_id).await {
                    Ok(_) => true,
                    Err(e) => {
                        self.durable_failed("session delete", &e);
                        false
                    }
                }
            }
            None => true,
        };

        volatile_ok && durable_ok
    }

    /// Fetch-through helper: serve from the tiers, otherwise run `fetch`
    /// once for all concurrent callers and store what it returns.
    #[instrument(skip(self, fetch))]
    pub async fn session_or_fetch<F, Fut>(
        &self,
        year: i32,
        round: u32,
        session_type: &SessionType,
        fetch: F,
    ) -> Option<SessionResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<SessionResult>>,
    {
        if let Some(result) = self.lookup_session_result(year, round, session_type).await {
            return Some(result);
        }

        let key = self.keys.session(year, round, session_type);
        let (result, joined) = self
            .session_flights
            .run(&key, async {
                // A flight that just finished may have stored the result
                if let Some(found) = self.lookup_session_result(year, round, session_type).await {
                    return Some(found);
                }
                self.metrics.record_fetch();
                match fetch().await {
                    Some(fetched) => {
                        self.store_session_result(&fetched, None).await;
                        Some(fetched)
                    }
                    None => {
                        debug!("Origin has no result for {}", key);
                        None
                    }
                }
            })
            .await;

        if joined {
            self.metrics.record_coalesced();
        }
        result
    }

    // =========================================================================
    // Event session lists
    // =========================================================================

    /// Sessions stored for one event
    #[instrument(skip(self))]
    pub async fn lookup_event_sessions(&self, year: i32, round: u32) -> Option<Vec<SessionSummary>> {
        let key = self.keys.event(year, round);
        if let Some(sessions) = self.read_volatile::<Vec<SessionSummary>>(&key).await {
            self.metrics.record_volatile_hit();
            return Some(sessions);
        }

        let sessions = match &self.durable {
            Some(store) => match store.list_sessions_for_round(year, round).await {
                Ok(sessions) => sessions,
                Err(e) => {
                    self.durable_failed("session listing", &e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if sessions.is_empty() {
            self.metrics.record_miss();
            return None;
        }

        self.metrics.record_durable_hit();
        self.repopulate(key, &sessions, self.config.default_ttl);
        Some(sessions)
    }

    /// Cache the session list of one event. The durable tier derives this
    /// list from stored session results, so only the volatile tier is
    /// written.
    #[instrument(skip(self, sessions), fields(count = sessions.len()))]
    pub async fn store_event_sessions(
        &self,
        year: i32,
        round: u32,
        sessions: &[SessionSummary],
        ttl: Option<Duration>,
    ) -> bool {
        let key = self.keys.event(year, round);
        let ttl = effective_ttl(ttl, self.config.default_ttl);
        self.write_volatile(&key, &sessions, ttl).await
    }

    /// Remove every session result of one event, plus its session list,
    /// from both tiers. Other events are untouched and event rows are kept.
    #[instrument(skip(self))]
    pub async fn invalidate_event(&self, year: i32, round: u32) -> bool {
        self.metrics.record_invalidation();

        let removed = self
            .volatile
            .delete_by_prefix(&self.keys.event_sessions_prefix(year, round))
            .await;
        let volatile_ok = self.volatile.delete(&self.keys.event(year, round)).await;

        let durable_ok = match &self.durable {
            Some(store) => match store.delete_sessions_for_round(year, round).await {
                Ok(deleted) => {
                    debug!("Deleted {} durable sessions for {}_{}", deleted, year, round);
                    true
                }
                Err(e) => {
                    self.durable_failed("event invalidation", &e);
                    false
                }
            },
            None => true,
        };

        info!(
            "Invalidated event {}_{} ({} volatile keys)",
            year, round, removed
        );
        volatile_ok && durable_ok
    }

    // =========================================================================
    // Season schedules
    // =========================================================================

    /// Events of one season in round order
    #[instrument(skip(self))]
    pub async fn lookup_schedule(&self, year: i32) -> Option<Vec<Event>> {
        let key = self.keys.schedule(year);
        if let Some(events) = self.read_volatile::<Vec<Event>>(&key).await {
            self.metrics.record_volatile_hit();
            return Some(events);
        }

        let events = match &self.durable {
            Some(store) => match store.list_events_by_year(year).await {
                Ok(events) => events,
                Err(e) => {
                    self.durable_failed("schedule lookup", &e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if events.is_empty() {
            self.metrics.record_miss();
            return None;
        }

        self.metrics.record_durable_hit();
        self.repopulate(key, &events, self.config.schedule_ttl());
        Some(events)
    }

    /// Persist a season schedule in one transaction, then cache it with the
    /// schedule TTL. An empty schedule is not stored.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn store_schedule(&self, year: i32, events: &[Event], ttl: Option<Duration>) -> bool {
        if events.is_empty() {
            debug!("Ignoring empty schedule for {}", year);
            return true;
        }
        if let Some(stray) = events.iter().find(|e| e.year != year) {
            warn!(
                "Schedule for {} contains event {} of season {}",
                year, stray.event_id, stray.year
            );
        }

        let durable_ok = match &self.durable {
            Some(store) => match store.upsert_events(events).await {
                Ok(()) => Some(true),
                Err(e) => {
                    self.durable_failed("schedule upsert", &e);
                    Some(false)
                }
            },
            None => None,
        };

        let ttl = effective_ttl(ttl, self.config.schedule_ttl());
        let volatile_ok = self
            .write_volatile(&self.keys.schedule(year), &events, ttl)
            .await;

        let ok = durable_ok.unwrap_or(volatile_ok);
        self.metrics.record_store(ok);
        ok
    }

    /// Fetch-through helper for schedules. A stored schedule that fails the
    /// completeness check is refetched; if the origin then has nothing, the
    /// stored schedule is served anyway.
    #[instrument(skip(self, fetch))]
    pub async fn schedule_or_fetch<F, Fut>(&self, year: i32, fetch: F) -> Option<Vec<Event>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Vec<Event>>>,
    {
        let stale = match self.lookup_schedule(year).await {
            Some(events) if self.freshness.is_complete(year, events.len()) => return Some(events),
            Some(events) => {
                debug!(
                    "Schedule for {} has {} of {} expected events; refetching",
                    year,
                    events.len(),
                    self.freshness.min_events(year)
                );
                Some(events)
            }
            None => None,
        };

        let key = self.keys.schedule(year);
        let (events, joined) = self
            .schedule_flights
            .run(&key, async {
                let stale = match self.lookup_schedule(year).await {
                    Some(events) if self.freshness.is_complete(year, events.len()) => {
                        return Some(events);
                    }
                    Some(events) => Some(events),
                    None => stale,
                };
                self.metrics.record_fetch();
                match fetch().await {
                    Some(fetched) if !fetched.is_empty() => {
                        self.store_schedule(year, &fetched, None).await;
                        Some(fetched)
                    }
                    _ => stale,
                }
            })
            .await;

        if joined {
            self.metrics.record_coalesced();
        }
        events
    }

    // =========================================================================
    // Seasons and maintenance
    // =========================================================================

    /// Register supported seasons in one transaction
    #[instrument(skip(self, years), fields(count = years.len()))]
    pub async fn register_seasons(&self, years: &[i32]) -> bool {
        let Some(store) = &self.durable else {
            return false;
        };
        match store.upsert_seasons(years).await {
            Ok(()) => {
                info!("Registered {} seasons", years.len());
                true
            }
            Err(e) => {
                self.durable_failed("season registration", &e);
                false
            }
        }
    }

    /// Registered seasons, newest first. Without a durable tier this is the
    /// configured season range.
    pub async fn list_seasons(&self) -> Vec<i32> {
        let fallback = || {
            let mut years = self.config.seasons();
            years.reverse();
            years
        };
        let Some(store) = &self.durable else {
            return fallback();
        };
        match store.list_seasons().await {
            Ok(years) if !years.is_empty() => years,
            Ok(_) => fallback(),
            Err(e) => {
                self.durable_failed("season listing", &e);
                fallback()
            }
        }
    }

    /// Delete durable session results fetched more than `days` days ago
    #[instrument(skip(self))]
    pub async fn purge_stale_sessions(&self, days: u32) -> usize {
        let Some(store) = &self.durable else {
            return 0;
        };
        match store.purge_older_than(days).await {
            Ok(count) => {
                self.metrics.record_purge(count);
                count
            }
            Err(e) => {
                self.durable_failed("retention sweep", &e);
                0
            }
        }
    }

    /// Empty the volatile tier for this namespace, including the fallback
    /// map. The durable store is left untouched.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> usize {
        let removed = self
            .volatile
            .delete_by_prefix(&self.keys.namespace_prefix())
            .await;
        self.volatile.fallback().clear();
        info!("Cleared {} volatile keys under {}", removed, self.keys.namespace());
        removed
    }

    // =========================================================================
    // Introspection and lifecycle
    // =========================================================================

    /// Aggregate counters from both tiers
    pub async fn stats(&self) -> StatsReport {
        let volatile = self
            .volatile
            .snapshot(&self.keys.namespace_prefix())
            .await;

        let (durable, durable_error) = match &self.durable {
            Some(store) => match store.stats().await {
                Ok(stats) => (Some(stats), None),
                Err(e) => (None, Some(e.to_string())),
            },
            None => (None, None),
        };

        StatsReport {
            namespace: self.keys.namespace().to_string(),
            volatile,
            default_ttl_seconds: self.config.default_ttl.as_secs(),
            schedule_ttl_seconds: self.config.schedule_ttl().as_secs(),
            durable,
            durable_error,
            coordinator: self.metrics.snapshot(),
            generated_at: Utc::now(),
        }
    }

    /// Probe both tiers, reconnecting the volatile tier first if it is
    /// degraded
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthReport {
        let volatile = async {
            let start = Instant::now();
            let check = if !self.volatile.is_connected() && !self.volatile.connect().await {
                TierCheck::fallback(
                    "volatile",
                    format!(
                        "{} unreachable; serving from in-process fallback",
                        self.volatile.endpoint()
                    ),
                )
            } else {
                match self.volatile.try_ping().await {
                    Ok(()) => TierCheck::healthy("volatile"),
                    Err(e) if e.is_connectivity() => TierCheck::fallback("volatile", e.to_string()),
                    Err(e) => TierCheck::error("volatile", e.to_string()),
                }
            };
            check.with_duration(start.elapsed())
        };

        let durable = async {
            let store = self.durable.as_ref()?;
            let start = Instant::now();
            let check = match store.list_seasons().await {
                Ok(_) => TierCheck::healthy("durable"),
                Err(e) => TierCheck::error("durable", e.to_string()),
            };
            Some(check.with_duration(start.elapsed()))
        };

        // Probe both tiers concurrently
        let (volatile, durable) = futures::join!(volatile, durable);
        let checks: Vec<TierCheck> = std::iter::once(volatile).chain(durable).collect();

        let report = HealthReport::new(
            self.volatile.is_connected(),
            checks,
            self.started_at.elapsed(),
        );
        debug!("Health check: {}", report.status);
        report
    }

    /// Drop the volatile connection; later calls run degraded
    pub async fn shutdown(&self) {
        self.volatile.disconnect().await;
        info!("Coordinator shut down");
    }

    // =========================================================================
    // Tier helpers
    // =========================================================================

    async fn read_volatile<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.volatile.get(key).await?;
        match Envelope::<T>::decode(&bytes) {
            Ok(envelope) => Some(envelope.payload),
            Err(e) => {
                self.metrics.record_decode_failure();
                warn!("Discarding malformed cache entry {}: {}", key, e);
                self.volatile.delete(key).await;
                None
            }
        }
    }

    async fn write_volatile<T: Serialize>(&self, key: &str, payload: &T, ttl: Duration) -> bool {
        let bytes = match Envelope::new(payload, ttl).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return false;
            }
        };
        if self.volatile.set(key, bytes, ttl).await {
            true
        } else {
            self.metrics.record_volatile_write_failure();
            warn!("Volatile write failed for {}", key);
            false
        }
    }

    /// Refill the volatile tier in the background after a durable hit
    fn repopulate<T: Serialize>(&self, key: String, payload: &T, ttl: Duration) {
        let bytes = match Envelope::new(payload, ttl).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };

        let volatile = Arc::clone(&self.volatile);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            if volatile.set(&key, bytes, ttl).await {
                metrics.record_repopulation();
                debug!("Repopulated {}", key);
            } else {
                metrics.record_volatile_write_failure();
            }
        });
    }

    fn durable_failed(&self, operation: &str, cause: &Error) {
        self.metrics.record_durable_error();
        warn!(
            "Durable store {} failed ({}): {}. Treating as a miss.",
            operation,
            cause.kind(),
            cause
        );
    }
}

/// `None` and zero both mean "use the default"
fn effective_ttl(ttl: Option<Duration>, default: Duration) -> Duration {
    ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(default)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBackend;
    use assert_matches::assert_matches;

    const TIMEOUT: Duration = Duration::from_millis(200);

    struct Harness {
        backend: InMemoryBackend,
        store: Arc<SqliteStore>,
        coordinator: Coordinator,
    }

    async fn harness() -> Harness {
        let backend = InMemoryBackend::new();
        let volatile = Arc::new(VolatileCache::new(Arc::new(backend.clone()), TIMEOUT));
        assert!(volatile.connect().await);
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = Config {
            current_season: 2024,
            ..Config::default()
        };
        let coordinator = Coordinator::new(
            config,
            volatile,
            Some(Arc::clone(&store) as Arc<dyn DurableStore>),
        );
        Harness {
            backend,
            store,
            coordinator,
        }
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..50 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    /// Durable store whose first `blind` session reads miss, as if the row
    /// landed just after the caller looked
    struct LateRow {
        inner: SqliteStore,
        blind: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DurableStore for LateRow {
        async fn upsert_season(&self, year: i32) -> Result<()> {
            self.inner.upsert_season(year).await
        }
        async fn upsert_seasons(&self, years: &[i32]) -> Result<()> {
            self.inner.upsert_seasons(years).await
        }
        async fn list_seasons(&self) -> Result<Vec<i32>> {
            self.inner.list_seasons().await
        }
        async fn upsert_event(&self, event: &Event) -> Result<()> {
            self.inner.upsert_event(event).await
        }
        async fn upsert_events(&self, events: &[Event]) -> Result<()> {
            self.inner.upsert_events(events).await
        }
        async fn list_events_by_year(&self, year: i32) -> Result<Vec<Event>> {
            self.inner.list_events_by_year(year).await
        }
        async fn get_event(&self, event_id: &str) -> Result<Option<Event>> {
            self.inner.get_event(event_id).await
        }
        async fn upsert_session_result(&self, result: &SessionResult) -> Result<()> {
            self.inner.upsert_session_result(result).await
        }
        async fn get_session_result(&self, session_id: &str) -> Result<Option<SessionResult>> {
            use std::sync::atomic::Ordering;
            let blind = self
                .blind
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if blind {
                return Ok(None);
            }
            self.inner.get_session_result(session_id).await
        }
        async fn session_exists(&self, session_id: &str) -> Result<bool> {
            self.inner.session_exists(session_id).await
        }
        async fn list_sessions_for_event(&self, event_id: &str) -> Result<Vec<SessionSummary>> {
            self.inner.list_sessions_for_event(event_id).await
        }
        async fn list_sessions_for_round(
            &self,
            year: i32,
            round: u32,
        ) -> Result<Vec<SessionSummary>> {
            self.inner.list_sessions_for_round(year, round).await
        }
        async fn delete_session(&self, session_id: &str) -> Result<bool> {
            self.inner.delete_session(session_id).await
        }
        async fn delete_sessions_for_round(&self, year: i32, round: u32) -> Result<usize> {
            self.inner.delete_sessions_for_round(year, round).await
        }
        async fn purge_older_than(&self, days: u32) -> Result<usize> {
            self.inner.purge_older_than(days).await
        }
        async fn stats(&self) -> Result<crate::domain::ports::DurableStats> {
            self.inner.stats().await
        }
    }

    #[test]
    fn test_effective_ttl() {
        let default = Duration::from_secs(3600);
        assert_eq!(effective_ttl(None, default), default);
        assert_eq!(effective_ttl(Some(Duration::ZERO), default), default);
        assert_eq!(
            effective_ttl(Some(Duration::from_secs(5)), default),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_store_writes_both_tiers() {
        let h = harness().await;
        let result = SessionResult::new(2024, 5, SessionType::Race);

        assert!(h.coordinator.store_session_result(&result, None).await);
        assert!(h.store.session_exists("2024_5_R").await.unwrap());
        assert_eq!(h.backend.len(), 1);
    }

    #[tokio::test]
    async fn test_durable_hit_repopulates_volatile() {
        let h = harness().await;
        let result = SessionResult::new(2024, 5, SessionType::Qualifying);
        h.store.upsert_session_result(&result).await.unwrap();

        let found = h
            .coordinator
            .lookup_session_result(2024, 5, &SessionType::Qualifying)
            .await;
        assert_eq!(found, Some(result));
        assert_eq!(h.coordinator.metrics().durable_hits(), 1);

        let backend = h.backend.clone();
        eventually(|| {
            let backend = backend.clone();
            async move { backend.len() == 1 }
        })
        .await;

        h.coordinator
            .lookup_session_result(2024, 5, &SessionType::Qualifying)
            .await
            .unwrap();
        assert_eq!(h.coordinator.metrics().volatile_hits(), 1);
    }

    #[tokio::test]
    async fn test_malformed_volatile_entry_is_a_miss() {
        let h = harness().await;
        let key = h.coordinator.keys().session(2024, 1, &SessionType::Race);
        h.coordinator
            .volatile()
            .set(&key, bytes::Bytes::from_static(b"not json"), Duration::from_secs(60))
            .await;

        assert_eq!(
            h.coordinator
                .lookup_session_result(2024, 1, &SessionType::Race)
                .await,
            None
        );
        assert_eq!(h.coordinator.metrics().snapshot().decode_failures, 1);
        assert!(h.backend.is_empty());
    }

    #[tokio::test]
    async fn test_store_drops_stale_event_list() {
        let h = harness().await;
        let first = SessionResult::new(2024, 5, SessionType::Practice1);
        h.coordinator.store_session_result(&first, None).await;
        h.coordinator
            .store_event_sessions(2024, 5, &[first.summary()], None)
            .await;

        let race = SessionResult::new(2024, 5, SessionType::Race);
        h.coordinator.store_session_result(&race, None).await;

        let listed = h.coordinator.lookup_event_sessions(2024, 5).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_skipped_when_row_lands_before_flight() {
        let inner = SqliteStore::open_in_memory().unwrap();
        let stored = SessionResult::new(2024, 6, SessionType::Race);
        inner.upsert_session_result(&stored).await.unwrap();

        let durable = Arc::new(LateRow {
            inner,
            blind: std::sync::atomic::AtomicUsize::new(1),
        });
        let coordinator = Coordinator::new(
            Config::default(),
            Arc::new(VolatileCache::fallback_only(TIMEOUT)),
            Some(durable as Arc<dyn DurableStore>),
        );

        let fetches = std::sync::atomic::AtomicUsize::new(0);
        let found = coordinator
            .session_or_fetch(2024, 6, &SessionType::Race, || async {
                fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                None
            })
            .await;

        assert_eq!(found, Some(stored));
        assert_eq!(fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(coordinator.metrics().fetches(), 0);
    }

    #[tokio::test]
    async fn test_without_durable_tier() {
        let volatile = Arc::new(VolatileCache::fallback_only(TIMEOUT));
        let coordinator = Coordinator::new(Config::default(), volatile, None);
        let result = SessionResult::new(2024, 1, SessionType::Race);

        assert!(coordinator.store_session_result(&result, None).await);
        assert!(coordinator
            .lookup_session_result(2024, 1, &SessionType::Race)
            .await
            .is_some());
        assert!(!coordinator.register_seasons(&[2024]).await);
        assert_eq!(coordinator.purge_stale_sessions(30).await, 0);
        assert!(coordinator.stats().await.durable.is_none());
    }

    #[tokio::test]
    async fn test_list_seasons_falls_back_to_config() {
        let volatile = Arc::new(VolatileCache::fallback_only(TIMEOUT));
        let config = Config {
            first_season: 2022,
            current_season: 2024,
            ..Config::default()
        };
        let coordinator = Coordinator::new(config, volatile, None);
        assert_eq!(coordinator.list_seasons().await, vec![2024, 2023, 2022]);
    }

    #[tokio::test]
    async fn test_health_reports_fallback() {
        let h = harness().await;
        assert_eq!(
            h.coordinator.health_check().await.status,
            crate::monitoring::HealthStatus::Healthy
        );

        h.backend.set_reachable(false);
        let report = h.coordinator.health_check().await;
        assert_eq!(report.status, crate::monitoring::HealthStatus::Fallback);
        assert!(!report.connected);
        assert_matches!(report.check("durable"), Some(check) if check.status.is_healthy());
    }

    #[tokio::test]
    async fn test_health_reconnects() {
        let h = harness().await;
        h.backend.set_reachable(false);
        h.coordinator.health_check().await;

        h.backend.set_reachable(true);
        let report = h.coordinator.health_check().await;
        assert!(report.connected);
        assert!(report.status.is_healthy());
    }

    #[tokio::test]
    async fn test_stats_masks_endpoint() {
        let h = harness().await;
        h.coordinator
            .store_session_result(&SessionResult::new(2024, 1, SessionType::Race), None)
            .await;

        let stats = h.coordinator.stats().await;
        assert!(stats.connected());
        assert_eq!(stats.volatile.endpoint, "***");
        assert_eq!(stats.volatile.backend_keys, Some(1));
        assert_eq!(stats.default_ttl_seconds, 3600);
        assert_eq!(stats.schedule_ttl_seconds, 86400);
        assert_eq!(stats.durable.map(|d| d.sessions), Some(1));
    }

    #[tokio::test]
    async fn test_connect_with_unreachable_redis() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            redis_url: "redis://127.0.0.1:1".to_string(),
            db_path: dir.path().join("pitwall.db"),
            operation_timeout: Duration::from_millis(500),
            ..Config::default()
        };

        let coordinator = Coordinator::connect(config).await.unwrap();
        assert!(!coordinator.volatile().is_connected());
        assert!(coordinator.durable().is_some());

        let result = SessionResult::new(2024, 1, SessionType::Race);
        assert!(coordinator.store_session_result(&result, None).await);
        assert_eq!(
            coordinator
                .lookup_session_result(2024, 1, &SessionType::Race)
                .await,
            Some(result)
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = Config {
            namespace: "bad:ns".to_string(),
            ..Config::default()
        };
        assert_matches!(Coordinator::connect(config).await.err(), Some(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_debug_summarizes_tiers() {
        let h = harness().await;
        let debug = format!("{:?}", h.coordinator);
        assert!(debug.contains("namespace: \"pitwall\""));
        assert!(debug.contains("volatile_connected: true"));
        assert!(debug.contains("durable: true"));
    }
}
