//! Cache key and record identifier construction
//!
//! Every volatile key lives under the application namespace:
//!
//! ```text
//! {ns}:session:{year}:{round}:{code}   one session result
//! {ns}:event:{year}:{round}            session list of one event
//! {ns}:schedule:{year}                 event list of one season
//! ```

use super::model::SessionType;

/// Session identifier `{year}_{round}_{code}`
pub fn session_id(year: i32, round: u32, session_type: &SessionType) -> String {
    format!("{}_{}_{}", year, round, session_type.code())
}

/// Default event identifier `{year}_{round}`
pub fn event_id(year: i32, round: u32) -> String {
    format!("{}_{}", year, round)
}

/// Builds namespaced cache keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    namespace: String,
}

impl KeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn session(&self, year: i32, round: u32, session_type: &SessionType) -> String {
        format!(
            "{}:session:{}:{}:{}",
            self.namespace,
            year,
            round,
            session_type.code()
        )
    }

    /// Prefix shared by every session key of one event
    pub fn event_sessions_prefix(&self, year: i32, round: u32) -> String {
        format!("{}:session:{}:{}:", self.namespace, year, round)
    }

    pub fn event(&self, year: i32, round: u32) -> String {
        format!("{}:event:{}:{}", self.namespace, year, round)
    }

    pub fn schedule(&self, year: i32) -> String {
        format!("{}:schedule:{}", self.namespace, year)
    }

    /// Prefix shared by every key this application owns
    pub fn namespace_prefix(&self) -> String {
        format!("{}:", self.namespace)
    }
}

// =============================================================================
// Tests
// =============================================================================
