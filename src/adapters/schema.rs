//! SQLite schema and migrations
//!
//! Migrations are applied in order and tracked with `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Ordered schema migrations; index + 1 is the resulting `user_version`
const MIGRATIONS: &[&str] = &[
    // 1: base tables
    r#"
    CREATE TABLE IF NOT EXISTS seasons (
        year INTEGER PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS events (
        event_id TEXT PRIMARY KEY,
        year INTEGER NOT NULL,
        round_number INTEGER NOT NULL,
        event_name TEXT NOT NULL,
        event_date TEXT,
        country TEXT,
        location TEXT,
        status TEXT NOT NULL DEFAULT 'unknown',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (year) REFERENCES seasons(year)
    );

    CREATE TABLE IF NOT EXISTS session_results (
        session_id TEXT PRIMARY KEY,
        event_id TEXT NOT NULL,
        year INTEGER NOT NULL,
        round_number INTEGER NOT NULL,
        session_key TEXT NOT NULL,
        session_name TEXT,
        session_type TEXT,
        data_json TEXT NOT NULL,
        drivers_json TEXT,
        columns_json TEXT,
        fetched_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (event_id) REFERENCES events(event_id),
        FOREIGN KEY (year) REFERENCES seasons(year)
    );

    CREATE INDEX IF NOT EXISTS idx_events_year ON events(year);
    CREATE INDEX IF NOT EXISTS idx_sessions_event ON session_results(event_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_year ON session_results(year);
    "#,
    // 2: one event per round, round-scoped session lookups, retention sweeps
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_events_year_round ON events(year, round_number);
    CREATE INDEX IF NOT EXISTS idx_sessions_round ON session_results(year, round_number);
    CREATE INDEX IF NOT EXISTS idx_sessions_fetched ON session_results(fetched_at);
    "#,
];

/// Latest schema version
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the database up to [`SCHEMA_VERSION`]
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!("Applied durable store migration {}", version);
    }

    Ok(SCHEMA_VERSION)
}

// =============================================================================
// Tests
// =============================================================================
