//! SQLite Durable Store
//!
//! Implements [`DurableStore`] over a single SQLite connection.
//!
//! # Design
//!
//! - The connection sits behind a mutex; each port call takes it once on a
//!   blocking worker, so one logical write is one transaction
//! - Timestamps are stored as fixed-width RFC 3339 strings with nanosecond
//!   precision; lexical order equals time order, which the retention sweep
//!   relies on
//! - Result payloads are JSON columns decoded outside the row mapper so a
//!   malformed row surfaces as a serialization error, not a SQL error
//! - WAL journal mode lets readers proceed while a write commits

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::schema;
use crate::domain::model::{Event, SessionResult, SessionSummary, SessionType};
use crate::domain::ports::{DurableStats, DurableStore, YearCount};
use crate::error::{Error, Result};

/// Default deadline for one store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const UPSERT_SEASON: &str = "
    INSERT INTO seasons (year, created_at, updated_at) VALUES (?1, ?2, ?2)
    ON CONFLICT(year) DO UPDATE SET updated_at = excluded.updated_at";

const UPSERT_EVENT: &str = "
    INSERT OR REPLACE INTO events
        (event_id, year, round_number, event_name, event_date, country, location,
         status, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
        COALESCE((SELECT created_at FROM events WHERE event_id = ?1), ?9), ?9)";

const SELECT_EVENT: &str = "
    SELECT event_id, year, round_number, event_name, event_date, country, location
    FROM events";

const UPSERT_SESSION: &str = "
    INSERT OR REPLACE INTO session_results
        (session_id, event_id, year, round_number, session_key, session_name,
         session_type, data_json, drivers_json, columns_json, fetched_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const SELECT_SUMMARY: &str = "
    SELECT session_id, session_key, session_name, updated_at FROM session_results";

/// SQLite-backed durable store; clones share the connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    timeout: Duration,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) a database file and apply migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)?;
        conn.busy_timeout(DEFAULT_STORE_TIMEOUT)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        prepare(&mut conn)?;

        info!("Durable store initialized at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
            timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        prepare(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
            timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Override the per-call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on a blocking worker
    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(Error::timeout(operation, self.timeout)),
        }
    }
}

/// Settings shared by file-backed and in-memory connections, then migrations.
///
/// Session results routinely arrive before their event or season row, so
/// the schema's foreign keys stay unenforced whatever the build default is.
fn prepare(conn: &mut Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", false)?;
    schema::migrate(conn)?;
    Ok(())
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn upsert_season(&self, year: i32) -> Result<()> {
        self.run("upsert season", move |conn| {
            conn.execute(UPSERT_SEASON, params![year, timestamp(&Utc::now())])?;
            Ok(())
        })
        .await
    }

    async fn upsert_seasons(&self, years: &[i32]) -> Result<()> {
        let years = years.to_vec();
        self.run("upsert seasons", move |conn| {
            let now = timestamp(&Utc::now());
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(UPSERT_SEASON)?;
                for year in &years {
                    stmt.execute(params![year, now])?;
                }
            }
            tx.commit()?;
            debug!("Stored {} seasons", years.len());
            Ok(())
        })
        .await
    }

    async fn list_seasons(&self) -> Result<Vec<i32>> {
        self.run("list seasons", |conn| {
            let mut stmt = conn.prepare_cached("SELECT year FROM seasons ORDER BY year DESC")?;
            let years = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i32>>>()?;
            Ok(years)
        })
        .await
    }

    async fn upsert_event(&self, event: &Event) -> Result<()> {
        self.upsert_events(std::slice::from_ref(event)).await
    }

    async fn upsert_events(&self, events: &[Event]) -> Result<()> {
        let events = events.to_vec();
        self.run("upsert events", move |conn| {
            let now = Utc::now();
            let stamp = timestamp(&now);
            let today = now.date_naive();

            let tx = conn.transaction()?;
            {
                let mut season = tx.prepare_cached(UPSERT_SEASON)?;
                let mut stmt = tx.prepare_cached(UPSERT_EVENT)?;
                for event in &events {
                    season.execute(params![event.year, stamp])?;
                    stmt.execute(params![
                        event.event_id,
                        event.year,
                        event.round,
                        event.name,
                        event.date.map(|d| d.to_string()),
                        event.country,
                        event.location,
                        // Snapshot only; reads re-derive status from the date
                        event.status_at(today).as_str(),
                        stamp,
                    ])?;
                }
            }
            tx.commit()?;
            debug!("Stored {} events", events.len());
            Ok(())
        })
        .await
    }

    async fn list_events_by_year(&self, year: i32) -> Result<Vec<Event>> {
        self.run("list events", move |conn| {
            let sql = format!("{} WHERE year = ?1 ORDER BY round_number", SELECT_EVENT);
            let mut stmt = conn.prepare_cached(&sql)?;
            let events = stmt
                .query_map(params![year], event_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
        .await
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>> {
        let event_id = event_id.to_string();
        self.run("get event", move |conn| {
            let sql = format!("{} WHERE event_id = ?1", SELECT_EVENT);
            let event = conn
                .query_row(&sql, params![event_id], event_from_row)
                .optional()?;
            Ok(event)
        })
        .await
    }

    async fn upsert_session_result(&self, result: &SessionResult) -> Result<()> {
        let data_json = serde_json::to_string(&result.rows)?;
        let drivers_json = serde_json::to_string(&result.drivers)?;
        let columns_json = serde_json::to_string(&result.columns)?;
        let result = result.clone();

        self.run("upsert session", move |conn| {
            conn.execute(
                UPSERT_SESSION,
                params![
                    result.session_id,
                    result.event_id,
                    result.year,
                    result.round,
                    result.session_type.code(),
                    result.session_name,
                    result.session_type.kind().as_str(),
                    data_json,
                    drivers_json,
                    columns_json,
                    timestamp(&result.fetched_at),
                    timestamp(&result.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_session_result(&self, session_id: &str) -> Result<Option<SessionResult>> {
        let session_id = session_id.to_string();
        let row = self
            .run("get session", move |conn| {
                let row = conn
                    .query_row(
                        "SELECT session_id, event_id, year, round_number, session_key,
                                session_name, data_json, drivers_json, columns_json,
                                fetched_at, updated_at
                         FROM session_results WHERE session_id = ?1",
                        params![session_id],
                        SessionRow::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(SessionRow::decode).transpose()
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.run("session exists", move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM session_results WHERE session_id = ?1",
                    params![session_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn list_sessions_for_event(&self, event_id: &str) -> Result<Vec<SessionSummary>> {
        let event_id = event_id.to_string();
        self.run("list event sessions", move |conn| {
            let sql = format!("{} WHERE event_id = ?1 ORDER BY session_id", SELECT_SUMMARY);
            let mut stmt = conn.prepare_cached(&sql)?;
            let sessions = stmt
                .query_map(params![event_id], summary_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
        .await
    }

    async fn list_sessions_for_round(&self, year: i32, round: u32) -> Result<Vec<SessionSummary>> {
        self.run("list round sessions", move |conn| {
            let sql = format!(
                "{} WHERE year = ?1 AND round_number = ?2 ORDER BY session_id",
                SELECT_SUMMARY
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let sessions = stmt
                .query_map(params![year, round], summary_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
        .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.run("delete session", move |conn| {
            let n = conn.execute(
                "DELETE FROM session_results WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn delete_sessions_for_round(&self, year: i32, round: u32) -> Result<usize> {
        self.run("delete round sessions", move |conn| {
            let n = conn.execute(
                "DELETE FROM session_results WHERE year = ?1 AND round_number = ?2",
                params![year, round],
            )?;
            Ok(n)
        })
        .await
    }

    async fn purge_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.run("purge sessions", move |conn| {
            let n = conn.execute(
                "DELETE FROM session_results WHERE fetched_at < ?1",
                params![timestamp(&cutoff)],
            )?;
            if n > 0 {
                info!("Purged {} session results older than {} days", n, days);
            }
            Ok(n)
        })
        .await
    }

    async fn stats(&self) -> Result<DurableStats> {
        self.run("stats", |conn| {
            let count = |table: &str| -> rusqlite::Result<u64> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
            };

            let seasons = count("seasons")?;
            let events = count("events")?;
            let sessions = count("session_results")?;

            let mut stmt = conn.prepare_cached(
                "SELECT year, COUNT(*) FROM session_results GROUP BY year ORDER BY year",
            )?;
            let sessions_by_year = stmt
                .query_map([], |row| {
                    Ok(YearCount {
                        year: row.get(0)?,
                        sessions: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

            Ok(DurableStats {
                seasons,
                events,
                sessions,
                sessions_by_year,
                size_bytes: (page_count * page_size) as u64,
            })
        })
        .await
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

/// Fixed-width UTC timestamp
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let date = row
        .get::<_, Option<String>>(4)?
        .map(|raw| raw.parse::<NaiveDate>().map_err(|e| conversion_error(4, e)))
        .transpose()?;

    Ok(Event {
        event_id: row.get(0)?,
        year: row.get(1)?,
        round: row.get(2)?,
        name: row.get(3)?,
        date,
        country: row.get(5)?,
        location: row.get(6)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SessionSummary> {
    let session_type = SessionType::from(row.get::<_, String>(1)?);
    let session_name = row
        .get::<_, Option<String>>(2)?
        .unwrap_or_else(|| session_type.name().to_string());

    Ok(SessionSummary {
        session_id: row.get(0)?,
        session_type,
        session_name,
        updated_at: timestamp_at(row, 3)?,
    })
}

/// Raw `session_results` row before JSON decoding
struct SessionRow {
    session_id: String,
    event_id: String,
    year: i32,
    round: u32,
    session_key: String,
    session_name: Option<String>,
    data_json: String,
    drivers_json: Option<String>,
    columns_json: Option<String>,
    fetched_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            event_id: row.get(1)?,
            year: row.get(2)?,
            round: row.get(3)?,
            session_key: row.get(4)?,
            session_name: row.get(5)?,
            data_json: row.get(6)?,
            drivers_json: row.get(7)?,
            columns_json: row.get(8)?,
            fetched_at: timestamp_at(row, 9)?,
            updated_at: timestamp_at(row, 10)?,
        })
    }

    fn decode(self) -> Result<SessionResult> {
        let session_type = SessionType::from(self.session_key);
        let session_name = self
            .session_name
            .unwrap_or_else(|| session_type.name().to_string());

        Ok(SessionResult {
            session_id: self.session_id,
            event_id: self.event_id,
            year: self.year,
            round: self.round,
            session_type,
            session_name,
            rows: serde_json::from_str(&self.data_json)?,
            drivers: decode_optional(self.drivers_json.as_deref())?,
            columns: decode_optional(self.columns_json.as_deref())?,
            fetched_at: self.fetched_at,
            updated_at: self.updated_at,
        })
    }
}

fn decode_optional<T>(raw: Option<&str>) -> Result<Vec<T>>
where
    T: serde::de::DeserializeOwned,
{
    match raw {
        Some(json) => Ok(serde_json::from_str(json)?),
        None => Ok(Vec::new()),
    }
}

// =============================================================================
// Tests
// =============================================================================
