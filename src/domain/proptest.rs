//! Property-Based Tests for Keys and Derived Status
//!
//! # Test Properties
//!
//! 1. **Prefix containment**: a session key always falls under its own
//!    event prefix and never under another round's prefix
//! 2. **Namespace containment**: every key falls under the namespace prefix
//! 3. **Status monotonicity**: as "today" moves forward an event never goes
//!    back from completed to current or from current to upcoming

#![cfg(test)]

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use super::keys::{self, KeyBuilder};
use super::model::{EventStatus, SessionType};

// =============================================================================
// Property Strategies
// =============================================================================

fn session_type_strategy() -> impl Strategy<Value = SessionType> {
    prop_oneof![
        Just(SessionType::Practice1),
        Just(SessionType::Practice2),
        Just(SessionType::Practice3),
        Just(SessionType::Qualifying),
        Just(SessionType::Sprint),
        Just(SessionType::SprintShootout),
        Just(SessionType::Race),
        "[A-Z]{1,6}".prop_map(SessionType::from),
    ]
}

fn status_rank(status: EventStatus) -> u8 {
    match status {
        EventStatus::Upcoming => 0,
        EventStatus::Current => 1,
        EventStatus::Completed => 2,
        EventStatus::Unknown => u8::MAX,
    }
}

// =============================================================================
// Key Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_session_key_under_own_event_prefix(
        year in 1950i32..2100,
        round in 1u32..30,
        other_round in 1u32..30,
        session_type in session_type_strategy(),
    ) {
        let keys = KeyBuilder::new("pitwall");
        let key = keys.session(year, round, &session_type);

        prop_assert!(key.starts_with(&keys.event_sessions_prefix(year, round)));
        prop_assert!(key.starts_with(&keys.namespace_prefix()));
        if other_round != round {
            prop_assert!(!key.starts_with(&keys.event_sessions_prefix(year, other_round)));
        }
    }

    #[test]
    fn prop_session_id_is_unique_per_triple(
        year in 1950i32..2100,
        round_a in 1u32..30,
        round_b in 1u32..30,
        session_type in session_type_strategy(),
    ) {
        let a = keys::session_id(year, round_a, &session_type);
        let b = keys::session_id(year, round_b, &session_type);
        prop_assert_eq!(a == b, round_a == round_b);
    }
}

// =============================================================================
// Status Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_status_never_moves_backwards(
        offset in -60i64..60,
        step in 0i64..30,
    ) {
        let date = NaiveDate::from_ymd_opt(2024, 7, 7).unwrap();
        let earlier = date + Duration::days(offset);
        let later = earlier + Duration::days(step);

        let before = EventStatus::derive(Some(date), earlier);
        let after = EventStatus::derive(Some(date), later);
        prop_assert!(status_rank(before) <= status_rank(after));
    }
}
