//! Schedule completeness heuristic
//!
//! A cached season schedule is trusted only once it holds a plausible number
//! of rounds. Seasons still in progress (or in the future) may legitimately
//! publish fewer rounds than historic ones.

/// Minimum rounds for a season at or after the current season
pub const MIN_EVENTS_CURRENT: usize = 15;

/// Minimum rounds for a season before the current season
pub const MIN_EVENTS_HISTORIC: usize = 20;

/// Decides whether a stored schedule is complete enough to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleFreshness {
    current_season: i32,
}

impl ScheduleFreshness {
    pub fn new(current_season: i32) -> Self {
        Self { current_season }
    }

    pub fn current_season(&self) -> i32 {
        self.current_season
    }

    /// Rounds a schedule for `year` needs before it is trusted
    pub fn min_events(&self, year: i32) -> usize {
        if year >= self.current_season {
            MIN_EVENTS_CURRENT
        } else {
            MIN_EVENTS_HISTORIC
        }
    }

    /// `false` means the caller should refetch from the origin
    pub fn is_complete(&self, year: i32, events: usize) -> bool {
        events >= self.min_events(year)
    }
}
