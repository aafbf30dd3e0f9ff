//! Week-boundary detection.
//!
//! Pure functions over the wall clock. The week convention is ISO-8601
//! (Monday start, week 1 contains the first Thursday of the year), applied
//! to the instant the engine's clock reports. Accumulated weekly counters
//! lose their meaning the moment the week key changes; the engine resolves
//! a rollover with a full resync, never by patching individual entries, so
//! this module only reports *that* the week changed, not by how many weeks.

use chrono::{DateTime, Datelike, Utc};

use super::types::{ProgressCache, WeekKey};

/// The week key for a given instant.
pub fn current_week_key(now: DateTime<Utc>) -> WeekKey {
    let iso = now.iso_week();
    WeekKey {
        iso_year: iso.year(),
        week: iso.week(),
    }
}

/// Whether the cache's stamped week no longer matches the current week.
///
/// An unstamped cache has nothing to invalidate and never rolls over.
pub fn has_rolled_over(cache: &ProgressCache, now: DateTime<Utc>) -> bool {
    match cache.week_stamp {
        Some(stamp) => stamp != current_week_key(now),
        None => false,
    }
}
