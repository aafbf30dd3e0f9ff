//! Weekly progress cache: types, consistency engine, week boundaries,
//! deferred-retry queue.
//!
//! The engine owns the cache; the scheduler, activity tracker and week
//! detector only invoke its operations.

pub mod engine;
pub mod retry;
pub mod types;
pub mod week;

#[cfg(test)]
mod engine_tests;

pub use engine::{DrainOutcome, ProgressEngine};
pub use retry::{DeferredPayload, DeferredQueue, DeferredSync};
pub use types::{
    ApplyStats, CacheState, HabitId, ProgressCache, ProgressSnapshot, RolloverOutcome,
    SnapshotOutcome, SnapshotRecord, SyncReason, SyncStatus, WeekKey, WeeklyProgress, WriteSource,
};
pub use week::{current_week_key, has_rolled_over};
