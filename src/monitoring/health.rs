//! Health Checks
//!
//! Tier connectivity reports for readiness probes and operators.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Volatile tier reachable
    Healthy,
    /// Volatile tier unreachable; serving from the in-process map
    Fallback,
    /// The check itself failed; the fallback map keeps serving
    Error,
}

impl HealthStatus {
    /// Requests are still being answered
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Fallback)
    }

    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Fallback => 1,
            HealthStatus::Error => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Fallback => "fallback",
            HealthStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCheck {
    /// Tier name
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    /// Duration of check
    pub duration_ms: u64,
}

impl TierCheck {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: 0,
        }
    }

    pub fn fallback(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Fallback,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Error,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// Overall health response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status across all checks
    pub status: HealthStatus,
    /// Volatile tier reachable after the check
    pub connected: bool,
    pub checks: Vec<TierCheck>,
    pub version: String,
    pub uptime_seconds: u64,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(connected: bool, checks: Vec<TierCheck>, uptime: Duration) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max_by_key(HealthStatus::severity)
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            connected,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
            checked_at: Utc::now(),
        }
    }

    /// Look up one tier's check by name
    pub fn check(&self, name: &str) -> Option<&TierCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}
