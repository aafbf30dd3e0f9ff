//! Consistency engine for the weekly progress cache.
//!
//! The engine is the single owner of [`ProgressCache`]. Writers never touch
//! the cache directly; they submit candidate writes through the operations
//! here, which serialize against each other behind one mutex. Network I/O
//! never happens under that mutex -- fetching is the caller's job, and
//! results re-enter through [`ProgressEngine::apply_server_snapshot`].
//!
//! ## Write precedence
//!
//! - User actions apply immediately, always.
//! - Authoritative snapshots (`ForcedRefresh`, `PostRollover`) replace the
//!   entries they contain.
//! - Periodic snapshots win per record only with a strictly newer
//!   `updated_at`, and are deferred (never dropped) while the user is
//!   active.
//!
//! ## Cache states
//!
//! ```text
//! Empty -> Populated -> StalePendingRollover -> Populated (loop)
//! ```
//!
//! with an independent "has deferred work" dimension carried by the retry
//! queue.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::activity::ActivityTracker;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncPolicy;
use crate::error::CacheError;
use crate::events::Event;

use super::retry::{DeferredPayload, DeferredQueue};
use super::types::{
    ApplyStats, CacheState, ProgressCache, ProgressSnapshot, RolloverOutcome, SnapshotOutcome,
    SyncReason, SyncStatus, WeeklyProgress, WriteSource,
};
use super::week;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result of draining the deferred-retry queue.
#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// Deferred snapshots applied this pass.
    pub applied: usize,
    /// Deferred fetches now due; the caller performs them and feeds the
    /// results back through `apply_server_snapshot`.
    pub fetches: Vec<SyncReason>,
}

/// Owner of the progress cache and arbiter of all writes to it.
pub struct ProgressEngine {
    cache: Mutex<ProgressCache>,
    deferred: Mutex<DeferredQueue>,
    empty_since: Mutex<Option<DateTime<Utc>>>,
    activity: Arc<ActivityTracker>,
    clock: Arc<dyn Clock>,
    policy: SyncPolicy,
    events: broadcast::Sender<Event>,
}

impl ProgressEngine {
    /// Create an engine with an empty cache and the system clock.
    pub fn new(policy: SyncPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Create an engine driven by the given clock (for testing, or for
    /// hosts that shift week boundaries into the user's local offset).
    pub fn with_clock(policy: SyncPolicy, clock: Arc<dyn Clock>) -> Self {
        let activity = Arc::new(ActivityTracker::new(policy.grace_period_secs, clock.clone()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let empty_since = Some(clock.now());
        Self {
            cache: Mutex::new(ProgressCache::new()),
            deferred: Mutex::new(DeferredQueue::new()),
            empty_since: Mutex::new(empty_since),
            activity,
            clock,
            policy,
            events,
        }
    }

    /// The shared activity tracker. UI read paths call
    /// `record_interaction()` on it whenever progress data is displayed.
    pub fn activity(&self) -> Arc<ActivityTracker> {
        self.activity.clone()
    }

    /// Convenience passthrough for hosts that only hold the engine.
    pub fn record_interaction(&self) {
        self.activity.record_interaction();
    }

    /// Subscribe to cache mutation events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Adopt a previously persisted cache.
    ///
    /// If the persisted week no longer matches the current week, the
    /// entries are invalidated on the spot and the cache waits for a
    /// resync -- stale-week data must never be readable.
    pub fn restore(&self, persisted: ProgressCache) {
        let now = self.clock.now();
        let mut cache = self.cache.lock().unwrap();
        *cache = persisted;

        let rolled = week::has_rolled_over(&cache, now);
        let from = cache.week_stamp;
        if rolled {
            let to = week::current_week_key(now);
            cache.entries.clear();
            cache.week_stamp = Some(to);
            cache.state = CacheState::StalePendingRollover;
            cache.last_write_source = Some(WriteSource::Invalidation);
        }
        let state = cache.state;
        drop(cache);

        *self.empty_since.lock().unwrap() = match state {
            CacheState::Empty => Some(now),
            _ => None,
        };
        if rolled {
            self.emit(Event::WeekRolledOver {
                from,
                to: week::current_week_key(now),
                at: now,
            });
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Look up a habit's progress for the current week.
    ///
    /// Pure read. Callers displaying the result are responsible for
    /// stamping the interaction via [`ActivityTracker::record_interaction`].
    pub fn get(&self, habit_id: &str) -> Result<WeeklyProgress, CacheError> {
        let cache = self.cache.lock().unwrap();
        cache
            .entries
            .get(habit_id)
            .cloned()
            .ok_or_else(|| CacheError::NotFound {
                habit_id: habit_id.to_string(),
            })
    }

    /// All cached entries, ordered by habit id for stable output.
    pub fn list(&self) -> Vec<WeeklyProgress> {
        let cache = self.cache.lock().unwrap();
        let mut entries: Vec<_> = cache.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.habit_id.cmp(&b.habit_id));
        entries
    }

    pub fn cache_state(&self) -> CacheState {
        self.cache.lock().unwrap().state
    }

    /// Whether the cache is overdue for a server consistency check.
    pub fn is_stale(&self) -> bool {
        let now = self.clock.now();
        let cache = self.cache.lock().unwrap();
        match cache.last_synced_at {
            Some(at) => now - at > Duration::seconds(self.policy.sync_interval_secs as i64),
            None => true,
        }
    }

    /// Current sync status, including how long the cache has sat empty.
    pub fn status(&self) -> SyncStatus {
        let cache = self.cache.lock().unwrap();
        let status = SyncStatus {
            state: cache.state,
            week_stamp: cache.week_stamp,
            last_synced_at: cache.last_synced_at,
            pending_deferred: 0,
            empty_since: *self.empty_since.lock().unwrap(),
        };
        drop(cache);
        SyncStatus {
            pending_deferred: self.deferred.lock().unwrap().len(),
            ..status
        }
    }

    /// Clone of the cache for the persistence collaborator. Hosts call
    /// this after observing a mutation event and hand the result to their
    /// store.
    pub fn cache_snapshot(&self) -> ProgressCache {
        self.cache.lock().unwrap().clone()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Record a user verification: increment the habit's weekly count.
    ///
    /// Never deferred -- the user caused this change and must see it
    /// immediately. Counts only increase here; a lower server value can
    /// displace a user write only via the timestamp rules in
    /// [`apply_server_snapshot`](Self::apply_server_snapshot).
    pub fn apply_user_action(
        &self,
        habit_id: &str,
        delta: u32,
    ) -> Result<WeeklyProgress, CacheError> {
        let now = self.clock.now();
        let mut cache = self.cache.lock().unwrap();
        let entry = cache
            .entries
            .get_mut(habit_id)
            .ok_or_else(|| CacheError::NotFound {
                habit_id: habit_id.to_string(),
            })?;

        entry.current_count = entry.current_count.saturating_add(delta);
        // updated_at never moves backwards, even under clock skew.
        entry.updated_at = entry.updated_at.max(now);
        let updated = entry.clone();
        cache.last_write_source = Some(WriteSource::UserAction);
        drop(cache);

        self.emit(Event::ProgressRecorded {
            habit_id: updated.habit_id.clone(),
            current_count: updated.current_count,
            at: now,
        });
        Ok(updated)
    }

    /// Submit a server snapshot.
    ///
    /// - Absent entries are inserted unconditionally.
    /// - Present entries are replaced if the incoming `updated_at` is
    ///   strictly newer, or if the reason is authoritative.
    /// - A `Periodic` snapshot arriving while the user is active is queued
    ///   for retry instead of applied.
    /// - A `Periodic` snapshot arriving while a rollover resync is pending
    ///   is discarded: its records describe the old week, and the queued
    ///   authoritative refetch supersedes it.
    pub fn apply_server_snapshot(
        &self,
        snapshot: ProgressSnapshot,
        reason: SyncReason,
    ) -> SnapshotOutcome {
        if reason == SyncReason::Periodic {
            if self.cache.lock().unwrap().state == CacheState::StalePendingRollover {
                tracing::debug!("periodic snapshot discarded: rollover resync pending");
                return SnapshotOutcome::RejectedPendingRollover;
            }
            if self.activity.is_user_active() {
                let now = self.clock.now();
                let retry_at = now + Duration::seconds(self.policy.retry_cadence_secs as i64);
                self.deferred.lock().unwrap().schedule(
                    DeferredPayload::Snapshot { snapshot, reason },
                    retry_at,
                );
                self.emit(Event::SnapshotDeferred {
                    reason,
                    retry_at,
                    at: now,
                });
                return SnapshotOutcome::Deferred { retry_at };
            }
        }
        SnapshotOutcome::Applied(self.apply_snapshot_now(snapshot, reason))
    }

    fn apply_snapshot_now(&self, snapshot: ProgressSnapshot, reason: SyncReason) -> ApplyStats {
        let now = self.clock.now();
        let mut stats = ApplyStats::default();
        let mut rejections = Vec::new();

        let mut cache = self.cache.lock().unwrap();
        for record in snapshot.records {
            match cache.entries.get(&record.habit_id) {
                None => {
                    cache.entries.insert(
                        record.habit_id.clone(),
                        WeeklyProgress {
                            habit_id: record.habit_id,
                            current_count: record.current_count,
                            target_count: record.target_count,
                            updated_at: record.updated_at,
                        },
                    );
                    stats.inserted += 1;
                }
                Some(local) => {
                    if reason.is_authoritative() || record.updated_at > local.updated_at {
                        cache.entries.insert(
                            record.habit_id.clone(),
                            WeeklyProgress {
                                habit_id: record.habit_id,
                                current_count: record.current_count,
                                target_count: record.target_count,
                                updated_at: record.updated_at,
                            },
                        );
                        stats.updated += 1;
                    } else {
                        stats.rejected_stale += 1;
                        rejections.push((
                            record.habit_id.clone(),
                            local.updated_at,
                            record.updated_at,
                        ));
                    }
                }
            }
        }
        if cache.week_stamp.is_none() {
            cache.week_stamp = Some(week::current_week_key(now));
        }
        cache.last_synced_at = Some(now);
        cache.last_write_source = Some(WriteSource::ServerSync);
        cache.state = CacheState::Populated;
        drop(cache);

        *self.empty_since.lock().unwrap() = None;
        for (habit_id, local_updated_at, incoming_updated_at) in rejections {
            self.emit(Event::StaleWriteRejected {
                habit_id,
                local_updated_at,
                incoming_updated_at,
                at: now,
            });
        }
        self.emit(Event::SnapshotApplied {
            reason,
            stats,
            at: now,
        });
        stats
    }

    /// Detect and handle a week rollover.
    ///
    /// Idempotent within a week: entries are only mutated when the current
    /// week key differs from the stamp. On rollover the entries are
    /// cleared, the stamp advances, and the cache waits in
    /// `StalePendingRollover` until an authoritative resync lands. The
    /// rollover is always resolved by a full refetch: the return value
    /// tells the caller to fetch now, or that the fetch was queued because
    /// the user is mid-interaction.
    pub fn check_and_handle_rollover(&self) -> RolloverOutcome {
        let now = self.clock.now();
        let mut cache = self.cache.lock().unwrap();
        let rolled = week::has_rolled_over(&cache, now);
        if rolled {
            let from = cache.week_stamp;
            let to = week::current_week_key(now);
            cache.entries.clear();
            cache.week_stamp = Some(to);
            cache.state = CacheState::StalePendingRollover;
            cache.last_write_source = Some(WriteSource::Invalidation);
            drop(cache);
            self.emit(Event::WeekRolledOver { from, to, at: now });
        } else {
            if cache.state != CacheState::StalePendingRollover {
                return RolloverOutcome::Current;
            }
            drop(cache);
        }

        // A resync is owed: either the week just rolled, or an earlier
        // rollover has not been resolved yet.
        if self.activity.is_user_active() {
            let retry_at = now + Duration::seconds(self.policy.rollover_retry_secs as i64);
            self.deferred.lock().unwrap().schedule(
                DeferredPayload::Fetch {
                    reason: SyncReason::PostRollover,
                },
                retry_at,
            );
            RolloverOutcome::Deferred { retry_at }
        } else {
            RolloverOutcome::FetchNow(SyncReason::PostRollover)
        }
    }

    /// Queue a fetch for later (used when a due fetch could not complete,
    /// e.g. the gateway failed mid-rollover-resync).
    pub fn defer_fetch(&self, reason: SyncReason) {
        let retry_at =
            self.clock.now() + Duration::seconds(self.policy.rollover_retry_secs as i64);
        self.deferred
            .lock()
            .unwrap()
            .schedule(DeferredPayload::Fetch { reason }, retry_at);
    }

    /// Drain due deferred work, re-evaluating activity for each item.
    ///
    /// Snapshots whose time has come are re-submitted through the normal
    /// precedence rules (and re-queued if the user became active again).
    /// Due fetches are returned for the caller to execute.
    pub fn flush_deferred(&self) -> DrainOutcome {
        let now = self.clock.now();
        let ready = self.deferred.lock().unwrap().drain_ready(now);
        let mut outcome = DrainOutcome::default();

        for item in ready {
            match item.payload {
                DeferredPayload::Snapshot { snapshot, reason } => {
                    match self.apply_server_snapshot(snapshot, reason) {
                        SnapshotOutcome::Applied(_) => outcome.applied += 1,
                        // Re-queued (still active) or superseded by a
                        // pending rollover resync.
                        SnapshotOutcome::Deferred { .. }
                        | SnapshotOutcome::RejectedPendingRollover => {}
                    }
                }
                DeferredPayload::Fetch { reason } => {
                    if self.activity.is_user_active() {
                        let retry_at =
                            now + Duration::seconds(self.policy.retry_cadence_secs as i64);
                        self.deferred
                            .lock()
                            .unwrap()
                            .schedule(DeferredPayload::Fetch { reason }, retry_at);
                    } else {
                        outcome.fetches.push(reason);
                    }
                }
            }
        }
        outcome
    }

    /// Reset to the empty state (logout). Deferred work is dropped with
    /// the cache it belonged to.
    pub fn clear(&self) {
        let now = self.clock.now();
        let mut cache = self.cache.lock().unwrap();
        *cache = ProgressCache::new();
        cache.last_write_source = Some(WriteSource::Invalidation);
        drop(cache);

        self.deferred.lock().unwrap().clear();
        *self.empty_since.lock().unwrap() = Some(now);
        self.emit(Event::CacheCleared { at: now });
    }

    /// Note a failed sync cycle so observers see it. The cache is left
    /// untouched: a failed fetch never escalates to a destructive
    /// overwrite.
    pub fn note_gateway_failure(&self, error: &crate::error::GatewayError) {
        self.emit(Event::SyncSkipped {
            error: error.to_string(),
            at: self.clock.now(),
        });
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine; events are best-effort diagnostics.
        let _ = self.events.send(event);
    }
}
