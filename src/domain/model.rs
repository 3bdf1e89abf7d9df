//! Record types held by the cache tiers
//!
//! Three logical record kinds flow through the coordinator: season years,
//! event schedules and session results. Event status is never stored as a
//! fact; it is derived from the event date whenever it is asked for.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::keys;

// =============================================================================
// Events
// =============================================================================

/// Where an event sits relative to "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Current,
    Completed,
    Unknown,
}

impl EventStatus {
    /// Derive the status of an event dated `date` as seen on `today`.
    ///
    /// An event stays `Current` from the day before its date until four days
    /// after it.
    pub fn derive(date: Option<NaiveDate>, today: NaiveDate) -> Self {
        let Some(date) = date else {
            return EventStatus::Unknown;
        };
        let days = (today - date).num_days();
        if days > 4 {
            EventStatus::Completed
        } else if days >= -1 {
            EventStatus::Current
        } else {
            EventStatus::Upcoming
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Current => "current",
            EventStatus::Completed => "completed",
            EventStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One round of a season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub event_id: String,
    /// Season year
    pub year: i32,
    /// Round number, unique within the season
    pub round: u32,
    /// Event name
    pub name: String,
    /// Main event date
    pub date: Option<NaiveDate>,
    /// Host country
    pub country: Option<String>,
    /// Circuit location
    pub location: Option<String>,
}

impl Event {
    /// Create an event with the identifier derived from year and round
    pub fn new(year: i32, round: u32, name: impl Into<String>) -> Self {
        Self {
            event_id: keys::event_id(year, round),
            year,
            round,
            name: name.into(),
            date: None,
            country: None,
            location: None,
        }
    }

    /// Use an identifier supplied by the origin
    pub fn with_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Status as of `today`
    pub fn status_at(&self, today: NaiveDate) -> EventStatus {
        EventStatus::derive(self.date, today)
    }

    /// Status as of the current UTC date
    pub fn status(&self) -> EventStatus {
        self.status_at(Utc::now().date_naive())
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Broad classification of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Practice,
    Qualifying,
    Sprint,
    Race,
    Other,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Practice => "practice",
            SessionKind::Qualifying => "qualifying",
            SessionKind::Sprint => "sprint",
            SessionKind::Race => "race",
            SessionKind::Other => "other",
        }
    }
}

/// Timed session within an event, identified by its short code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionType {
    Practice1,
    Practice2,
    Practice3,
    Qualifying,
    Sprint,
    SprintShootout,
    SprintQualifying,
    Race,
    /// Code not in the catalogue, kept verbatim
    Other(String),
}

impl SessionType {
    /// Every catalogued session type in weekend order
    pub const ALL: [SessionType; 8] = [
        SessionType::Practice1,
        SessionType::Practice2,
        SessionType::Practice3,
        SessionType::SprintShootout,
        SessionType::SprintQualifying,
        SessionType::Sprint,
        SessionType::Qualifying,
        SessionType::Race,
    ];

    /// Short code used in identifiers and keys
    pub fn code(&self) -> &str {
        match self {
            SessionType::Practice1 => "FP1",
            SessionType::Practice2 => "FP2",
            SessionType::Practice3 => "FP3",
            SessionType::Qualifying => "Q",
            SessionType::Sprint => "S",
            SessionType::SprintShootout => "SS",
            SessionType::SprintQualifying => "SQ",
            SessionType::Race => "R",
            SessionType::Other(code) => code,
        }
    }

    /// Human-readable session name
    pub fn name(&self) -> &str {
        match self {
            SessionType::Practice1 => "Practice 1",
            SessionType::Practice2 => "Practice 2",
            SessionType::Practice3 => "Practice 3",
            SessionType::Qualifying => "Qualifying",
            SessionType::Sprint => "Sprint",
            SessionType::SprintShootout => "Sprint Shootout",
            SessionType::SprintQualifying => "Sprint Qualifying",
            SessionType::Race => "Race",
            SessionType::Other(code) => code,
        }
    }

    pub fn kind(&self) -> SessionKind {
        match self {
            SessionType::Practice1 | SessionType::Practice2 | SessionType::Practice3 => {
                SessionKind::Practice
            }
            SessionType::Qualifying
            | SessionType::SprintShootout
            | SessionType::SprintQualifying => SessionKind::Qualifying,
            SessionType::Sprint => SessionKind::Sprint,
            SessionType::Race => SessionKind::Race,
            SessionType::Other(_) => SessionKind::Other,
        }
    }
}

impl From<&str> for SessionType {
    fn from(code: &str) -> Self {
        match code {
            "FP1" => SessionType::Practice1,
            "FP2" => SessionType::Practice2,
            "FP3" => SessionType::Practice3,
            "Q" => SessionType::Qualifying,
            "S" => SessionType::Sprint,
            "SS" => SessionType::SprintShootout,
            "SQ" => SessionType::SprintQualifying,
            "R" => SessionType::Race,
            other => SessionType::Other(other.to_string()),
        }
    }
}

impl From<String> for SessionType {
    fn from(code: String) -> Self {
        SessionType::from(code.as_str())
    }
}

impl From<SessionType> for String {
    fn from(session_type: SessionType) -> Self {
        session_type.code().to_string()
    }
}

impl FromStr for SessionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(SessionType::from(s))
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One typed cell of a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Driver roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    /// Display name
    pub name: String,
    /// Three-letter driver code
    pub code: String,
}

impl Driver {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// Timing results of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Composite identifier `{year}_{round}_{code}`
    pub session_id: String,
    /// Parent event
    pub event_id: String,
    pub year: i32,
    pub round: u32,
    pub session_type: SessionType,
    /// Human session name
    pub session_name: String,
    /// Ordered result rows
    pub rows: Vec<Vec<Cell>>,
    /// Ordered driver roster
    pub drivers: Vec<Driver>,
    /// Column headers for `rows`
    pub columns: Vec<String>,
    /// When the origin produced this result
    pub fetched_at: DateTime<Utc>,
    /// When this record last changed
    pub updated_at: DateTime<Utc>,
}

impl SessionResult {
    /// Create an empty result stamped with the current time
    pub fn new(year: i32, round: u32, session_type: SessionType) -> Self {
        let now = Utc::now();
        Self {
            session_id: keys::session_id(year, round, &session_type),
            event_id: keys::event_id(year, round),
            year,
            round,
            session_name: session_type.name().to_string(),
            session_type,
            rows: Vec::new(),
            drivers: Vec::new(),
            columns: Vec::new(),
            fetched_at: now,
            updated_at: now,
        }
    }

    /// Use an event identifier supplied by the origin
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Cell>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_drivers(mut self, drivers: Vec<Driver>) -> Self {
        self.drivers = drivers;
        self
    }

    /// Summary row for per-event session listings
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            session_type: self.session_type.clone(),
            session_name: self.session_name.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry for a stored session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub session_type: SessionType,
    pub session_name: String,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_event_status_windows() {
        let race = Some(day(2024, 5, 19));
        assert_eq!(EventStatus::derive(race, day(2024, 5, 10)), EventStatus::Upcoming);
        assert_eq!(EventStatus::derive(race, day(2024, 5, 17)), EventStatus::Upcoming);
        assert_eq!(EventStatus::derive(race, day(2024, 5, 18)), EventStatus::Current);
        assert_eq!(EventStatus::derive(race, day(2024, 5, 19)), EventStatus::Current);
        assert_eq!(EventStatus::derive(race, day(2024, 5, 23)), EventStatus::Current);
        assert_eq!(EventStatus::derive(race, day(2024, 5, 24)), EventStatus::Completed);
        assert_eq!(EventStatus::derive(None, day(2024, 5, 24)), EventStatus::Unknown);
    }

    #[test]
    fn test_event_defaults() {
        let event = Event::new(2024, 5, "Emilia Romagna Grand Prix")
            .with_date(day(2024, 5, 19))
            .with_country("Italy");
        assert_eq!(event.event_id, "2024_5");
        assert_eq!(event.status_at(day(2024, 6, 1)), EventStatus::Completed);
        assert_eq!(event.country.as_deref(), Some("Italy"));
    }

    #[test]
    fn test_session_type_codes() {
        for session_type in SessionType::ALL {
            assert_eq!(SessionType::from(session_type.code()), session_type);
        }
        assert_eq!(SessionType::from("R").name(), "Race");
        assert_eq!(SessionType::from("SS").kind(), SessionKind::Qualifying);
        assert_eq!(
            SessionType::from("WARMUP"),
            SessionType::Other("WARMUP".to_string())
        );
    }

    #[test]
    fn test_session_type_serializes_as_code() {
        let json = serde_json::to_string(&SessionType::Practice1).unwrap();
        assert_eq!(json, "\"FP1\"");
        let back: SessionType = serde_json::from_str("\"Q\"").unwrap();
        assert_eq!(back, SessionType::Qualifying);
    }

    #[test]
    fn test_cells_keep_their_types() {
        let row: Vec<Cell> = vec![
            1i64.into(),
            "VER".into(),
            Cell::Float(78.5),
            Cell::Float(3.0),
            Cell::Null,
            true.into(),
        ];
        let json = serde_json::to_string(&row).unwrap();
        let back: Vec<Cell> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_session_result_defaults() {
        let result = SessionResult::new(2024, 5, SessionType::Practice1);
        assert_eq!(result.session_id, "2024_5_FP1");
        assert_eq!(result.event_id, "2024_5");
        assert_eq!(result.session_name, "Practice 1");
        assert_eq!(result.summary().session_type, SessionType::Practice1);
    }
}
