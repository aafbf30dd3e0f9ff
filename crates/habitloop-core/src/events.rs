use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::progress::{ApplyStats, SyncReason, WeekKey};

/// Every accepted cache mutation (and every decision not to mutate)
/// produces an Event. Hosts subscribe via the engine's broadcast channel;
/// the persistence collaborator uses these as its write-through signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A user action incremented a habit's weekly count.
    ProgressRecorded {
        habit_id: String,
        current_count: u32,
        at: DateTime<Utc>,
    },
    /// A server snapshot was applied to the cache.
    SnapshotApplied {
        reason: SyncReason,
        stats: ApplyStats,
        at: DateTime<Utc>,
    },
    /// A periodic snapshot arrived while the user was active and was queued.
    SnapshotDeferred {
        reason: SyncReason,
        retry_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// An incoming record was older than the local entry. Diagnostic only;
    /// never user-visible.
    StaleWriteRejected {
        habit_id: String,
        local_updated_at: DateTime<Utc>,
        incoming_updated_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// The calendar week changed; entries were invalidated pending resync.
    WeekRolledOver {
        from: Option<WeekKey>,
        to: WeekKey,
        at: DateTime<Utc>,
    },
    /// A sync cycle was skipped because the gateway failed. The next cycle
    /// retries naturally.
    SyncSkipped {
        error: String,
        at: DateTime<Utc>,
    },
    /// The cache was reset to empty (logout).
    CacheCleared {
        at: DateTime<Utc>,
    },
}
