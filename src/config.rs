//! Runtime configuration
//!
//! One explicit [`Config`] value is built by the process entry point and
//! handed to each component. Defaults match a local single-node setup and
//! every field can be overridden from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Datelike;

use crate::error::{Error, Result};

/// Default volatile cache address
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Default entry TTL (one hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Longest accepted base TTL (one year)
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Default durable store location
pub const DEFAULT_DB_PATH: &str = "pitwall.db";

/// Default key namespace
pub const DEFAULT_NAMESPACE: &str = "pitwall";

/// Default per-call deadline for tier I/O
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Default retention window for session results
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Oldest season seeded at startup
pub const DEFAULT_FIRST_SEASON: i32 = 2021;

/// Schedules live this many times longer than the base TTL
pub const SCHEDULE_TTL_MULTIPLIER: u32 = 24;

/// Configuration for the coordinator and its tiers
#[derive(Debug, Clone)]
pub struct Config {
    /// Volatile cache connection address
    pub redis_url: String,

    /// Default TTL for volatile entries
    pub default_ttl: Duration,

    /// Durable store path
    pub db_path: PathBuf,

    /// Prefix applied to every cache key
    pub namespace: String,

    /// Deadline applied to every tier call
    pub operation_timeout: Duration,

    /// Seasons at or after this year use the current-season completeness rule
    pub current_season: i32,

    /// First season registered at startup
    pub first_season: i32,

    /// Age after which session results are swept
    pub retention_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            default_ttl: DEFAULT_TTL,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            namespace: DEFAULT_NAMESPACE.to_string(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            current_season: chrono::Utc::now().year(),
            first_season: DEFAULT_FIRST_SEASON,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl Config {
    /// Build a configuration from defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CACHE_TTL_SECONDS")? {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("PITWALL_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(namespace) = lookup("PITWALL_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PITWALL_OP_TIMEOUT_MS")? {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(year) = parse_var::<i32>(&lookup, "PITWALL_CURRENT_SEASON")? {
            config.current_season = year;
        }
        if let Some(year) = parse_var::<i32>(&lookup, "PITWALL_FIRST_SEASON")? {
            config.first_season = year;
        }
        if let Some(days) = parse_var::<u32>(&lookup, "PITWALL_RETENTION_DAYS")? {
            config.retention_days = days;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the tiers cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(Error::Config(format!(
                "namespace must be non-empty and contain no ':' (got {:?})",
                self.namespace
            )));
        }
        if self.default_ttl.is_zero() {
            return Err(Error::Config("default TTL must be positive".to_string()));
        }
        if self.default_ttl > MAX_TTL {
            return Err(Error::Config(format!(
                "default TTL {}s exceeds the {}s maximum",
                self.default_ttl.as_secs(),
                MAX_TTL.as_secs()
            )));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::Config(
                "operation timeout must be positive".to_string(),
            ));
        }
        if self.first_season > self.current_season {
            return Err(Error::Config(format!(
                "first season {} is after current season {}",
                self.first_season, self.current_season
            )));
        }
        Ok(())
    }

    /// TTL used for season schedules
    pub fn schedule_ttl(&self) -> Duration {
        self.default_ttl.saturating_mul(SCHEDULE_TTL_MULTIPLIER)
    }

    /// Seasons registered at startup, oldest first
    pub fn seasons(&self) -> Vec<i32> {
        (self.first_season..=self.current_season).collect()
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.db_path, PathBuf::from("pitwall.db"));
        assert_eq!(config.retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_schedule_ttl_is_24x() {
        let config = Config::default();
        assert_eq!(config.schedule_ttl(), Duration::from_secs(3600 * 24));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://cache:6380"),
            ("CACHE_TTL_SECONDS", "60"),
            ("PITWALL_DB_PATH", "/tmp/data.db"),
            ("PITWALL_OP_TIMEOUT_MS", "250"),
            ("PITWALL_CURRENT_SEASON", "2024"),
            ("PITWALL_FIRST_SEASON", "2022"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6380");
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.db_path, PathBuf::from("/tmp/data.db"));
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.seasons(), vec![2022, 2023, 2024]);
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = Config::from_lookup(lookup_from(&[("CACHE_TTL_SECONDS", "soon")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_ttl_upper_bound() {
        let err = Config::from_lookup(lookup_from(&[("CACHE_TTL_SECONDS", "18446744073709551615")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let at_limit = Config {
            default_ttl: MAX_TTL,
            ..Config::default()
        };
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.schedule_ttl(), MAX_TTL * SCHEDULE_TTL_MULTIPLIER);
    }

    #[test]
    fn test_schedule_ttl_saturates() {
        let config = Config {
            default_ttl: Duration::MAX,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.schedule_ttl(), Duration::MAX);
    }

    #[test]
    fn test_validate_rejects_bad_namespace() {
        let config = Config {
            namespace: "a:b".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
