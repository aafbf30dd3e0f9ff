//! User-activity tracking.
//!
//! Records the most recent interaction with progress-dependent UI and
//! derives "is the user actively engaged" from it. Infallible by
//! construction: a timestamp plus a threshold, no state machine. The
//! engine consults this to decide whether a background update would be
//! disruptive.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;

/// Tracks the last user interaction and the activity grace period.
pub struct ActivityTracker {
    last_interaction: Mutex<Option<DateTime<Utc>>>,
    grace_period: Duration,
    clock: Arc<dyn Clock>,
}

impl ActivityTracker {
    /// Create a tracker with the given grace period.
    pub fn new(grace_period_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            last_interaction: Mutex::new(None),
            grace_period: Duration::seconds(grace_period_secs as i64),
            clock,
        }
    }

    /// Stamp an interaction at the current time.
    ///
    /// Called by any read path that displays progress data. Side effect
    /// only; never blocks on anything but its own mutex, never errors.
    pub fn record_interaction(&self) {
        let mut last = self.last_interaction.lock().unwrap();
        *last = Some(self.clock.now());
    }

    /// Whether the last interaction was within the grace period.
    pub fn is_user_active(&self) -> bool {
        let last = self.last_interaction.lock().unwrap();
        match *last {
            Some(at) => self.clock.now() - at < self.grace_period,
            None => false,
        }
    }

    /// The most recent interaction timestamp, if any.
    pub fn last_interaction_at(&self) -> Option<DateTime<Utc>> {
        *self.last_interaction.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn tracker() -> (Arc<ManualClock>, ActivityTracker) {
        let start = Utc.with_ymd_and_hms(2025, 3, 12, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let tracker = ActivityTracker::new(30, clock.clone());
        (clock, tracker)
    }

    #[test]
    fn test_inactive_before_any_interaction() {
        let (_, tracker) = tracker();
        assert!(!tracker.is_user_active());
        assert!(tracker.last_interaction_at().is_none());
    }

    #[test]
    fn test_active_within_grace_period() {
        let (clock, tracker) = tracker();
        tracker.record_interaction();
        assert!(tracker.is_user_active());

        clock.advance(Duration::seconds(29));
        assert!(tracker.is_user_active());
    }

    #[test]
    fn test_inactive_after_grace_period() {
        let (clock, tracker) = tracker();
        tracker.record_interaction();

        clock.advance(Duration::seconds(30));
        assert!(!tracker.is_user_active());
    }

    #[test]
    fn test_interaction_extends_the_window() {
        let (clock, tracker) = tracker();
        tracker.record_interaction();
        clock.advance(Duration::seconds(25));
        tracker.record_interaction();
        clock.advance(Duration::seconds(25));
        assert!(tracker.is_user_active());
    }
}
