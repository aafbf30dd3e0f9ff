//! Core types for the weekly progress cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Habit identifier (matches the server-side entity id).
pub type HabitId = String;

/// Identifies a calendar week (ISO year + ISO week number).
///
/// Formats as `2025-W11`. All cached entries belong to exactly one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    pub iso_year: i32,
    pub week: u32,
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.iso_year, self.week)
    }
}

/// Provenance of the most recent cache mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteSource {
    UserAction,
    ServerSync,
    Invalidation,
}

/// Relationship of the cache to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Never populated (cold start, or cleared on logout).
    Empty,
    /// Holds entries for the stamped week.
    Populated,
    /// A week rollover cleared the entries; a resync is pending.
    /// Reads during this state should show a loading affordance.
    StalePendingRollover,
}

/// Why a server snapshot is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    /// Scheduled background poll. May be deferred while the user is active.
    Periodic,
    /// Explicit refresh (foreground transition, manual sync, targeted
    /// refetch). Applies immediately and replaces matching entries.
    ForcedRefresh,
    /// Resync after a week rollover. Applies immediately and replaces
    /// matching entries.
    PostRollover,
}

impl SyncReason {
    /// Whether this snapshot replaces matching local entries regardless of
    /// their timestamps.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, SyncReason::ForcedRefresh | SyncReason::PostRollover)
    }
}

/// Per-habit aggregate for the current week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyProgress {
    pub habit_id: HabitId,
    /// Verifications recorded this week. May exceed `target_count`.
    pub current_count: u32,
    pub target_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// One record in a server-provided snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub habit_id: HabitId,
    pub current_count: u32,
    pub target_count: u32,
    /// Server-side last-update timestamp. Conflict resolution compares
    /// these, never arrival order.
    pub updated_at: DateTime<Utc>,
}

/// A full or partial set of per-habit progress from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub records: Vec<SnapshotRecord>,
}

impl ProgressSnapshot {
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        Self { records }
    }
}

/// The canonical cached state. Owned exclusively by the engine; everything
/// else reads through engine operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressCache {
    pub entries: HashMap<HabitId, WeeklyProgress>,
    /// Which calendar week the entries reflect. Unset until first populated.
    pub week_stamp: Option<WeekKey>,
    /// Last time the cache was confirmed consistent with the server.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_write_source: Option<WriteSource>,
    pub state: CacheState,
}

impl ProgressCache {
    /// An empty cache, as created at session start before any sync.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            week_stamp: None,
            last_synced_at: None,
            last_write_source: None,
            state: CacheState::Empty,
        }
    }
}

impl Default for ProgressCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts from a snapshot application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStats {
    /// Records inserted for habits not previously cached.
    pub inserted: usize,
    /// Records that replaced an existing entry.
    pub updated: usize,
    /// Records rejected because the local entry was newer.
    pub rejected_stale: usize,
}

/// Result of submitting a snapshot to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The snapshot was applied synchronously.
    Applied(ApplyStats),
    /// The user is active; the snapshot was queued for retry.
    Deferred { retry_at: DateTime<Utc> },
    /// A rollover resync is pending; periodic data for the old week was
    /// discarded in favor of the queued authoritative refetch.
    RejectedPendingRollover,
}

/// What the rollover check decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverOutcome {
    /// The cache already reflects the current week.
    Current,
    /// The caller should fetch a fresh snapshot now and apply it with the
    /// given reason.
    FetchNow(SyncReason),
    /// The user is active; the refetch was queued for retry.
    Deferred { retry_at: DateTime<Utc> },
}

/// Current sync status, for hosts that surface loading/error affordances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: CacheState,
    pub week_stamp: Option<WeekKey>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Deferred payloads waiting for the user to go inactive.
    pub pending_deferred: usize,
    /// When the cache entered `Empty`, if it has never been populated.
    pub empty_since: Option<DateTime<Utc>>,
}
