//! Engine behavior tests: write precedence, deferral, rollover.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;

use crate::clock::ManualClock;
use crate::config::SyncPolicy;
use crate::events::Event;
use crate::progress::types::{
    CacheState, ProgressSnapshot, RolloverOutcome, SnapshotOutcome, SnapshotRecord, SyncReason,
};
use crate::progress::ProgressEngine;

fn t0() -> chrono::DateTime<Utc> {
    // Wednesday, ISO week 11 of 2025.
    Utc.with_ymd_and_hms(2025, 3, 12, 12, 0, 0).unwrap()
}

fn engine() -> (Arc<ManualClock>, ProgressEngine) {
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = ProgressEngine::with_clock(SyncPolicy::default(), clock.clone());
    (clock, engine)
}

fn record(habit_id: &str, count: u32, updated_at: chrono::DateTime<Utc>) -> SnapshotRecord {
    SnapshotRecord {
        habit_id: habit_id.to_string(),
        current_count: count,
        target_count: 5,
        updated_at,
    }
}

fn seed(engine: &ProgressEngine, count: u32, updated_at: chrono::DateTime<Utc>) {
    let outcome = engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", count, updated_at)]),
        SyncReason::ForcedRefresh,
    );
    assert!(matches!(outcome, SnapshotOutcome::Applied(_)));
}

#[test]
fn test_first_snapshot_populates_empty_cache() {
    let (_, engine) = engine();
    assert_eq!(engine.cache_state(), CacheState::Empty);
    assert!(engine.status().empty_since.is_some());

    seed(&engine, 2, t0());

    assert_eq!(engine.cache_state(), CacheState::Populated);
    assert!(engine.status().empty_since.is_none());
    assert_eq!(engine.get("habit-a").unwrap().current_count, 2);
    assert_eq!(engine.status().week_stamp.unwrap().week, 11);
}

#[test]
fn test_user_action_visible_immediately() {
    let (_, engine) = engine();
    seed(&engine, 2, t0());

    let updated = engine.apply_user_action("habit-a", 1).unwrap();
    assert_eq!(updated.current_count, 3);
    assert_eq!(engine.get("habit-a").unwrap().current_count, 3);
}

#[test]
fn test_user_action_unknown_habit_is_not_found() {
    let (_, engine) = engine();
    seed(&engine, 2, t0());

    let err = engine.apply_user_action("habit-z", 1).unwrap_err();
    assert!(err.to_string().contains("habit-z"));
    // No-op: existing entries untouched.
    assert_eq!(engine.get("habit-a").unwrap().current_count, 2);
}

#[test]
fn test_user_action_applies_even_while_active() {
    let (_, engine) = engine();
    seed(&engine, 0, t0());

    engine.record_interaction();
    engine.apply_user_action("habit-a", 1).unwrap();
    assert_eq!(engine.get("habit-a").unwrap().current_count, 1);
}

#[test]
fn test_stale_periodic_record_rejected() {
    // The scenario from the product defect: a periodic snapshot fetched
    // before a user action must not roll the count back.
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    clock.advance(Duration::seconds(60));
    engine.apply_user_action("habit-a", 1).unwrap();
    let user_write_at = engine.get("habit-a").unwrap().updated_at;

    // Server data stamped between the seed and the user write.
    let outcome = engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 2, t0() + Duration::seconds(30))]),
        SyncReason::Periodic,
    );
    match outcome {
        SnapshotOutcome::Applied(stats) => {
            assert_eq!(stats.rejected_stale, 1);
            assert_eq!(stats.updated, 0);
        }
        other => panic!("expected Applied, got {:?}", other),
    }
    let entry = engine.get("habit-a").unwrap();
    assert_eq!(entry.current_count, 3);
    assert_eq!(entry.updated_at, user_write_at);
}

#[test]
fn test_newer_periodic_record_wins() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    clock.advance(Duration::seconds(60));
    let outcome = engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 4, t0() + Duration::seconds(45))]),
        SyncReason::Periodic,
    );
    assert!(matches!(outcome, SnapshotOutcome::Applied(_)));
    assert_eq!(engine.get("habit-a").unwrap().current_count, 4);
}

#[test]
fn test_forced_refresh_replaces_regardless_of_timestamp() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());
    clock.advance(Duration::seconds(60));
    engine.apply_user_action("habit-a", 3).unwrap();

    // Older timestamp, but authoritative.
    let outcome = engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 1, t0() - Duration::seconds(10))]),
        SyncReason::ForcedRefresh,
    );
    assert!(matches!(outcome, SnapshotOutcome::Applied(_)));
    assert_eq!(engine.get("habit-a").unwrap().current_count, 1);
}

#[test]
fn test_periodic_deferred_while_active_then_applied() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    engine.record_interaction();
    let outcome = engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 4, t0() + Duration::seconds(5))]),
        SyncReason::Periodic,
    );
    assert!(matches!(outcome, SnapshotOutcome::Deferred { .. }));
    assert_eq!(engine.get("habit-a").unwrap().current_count, 2);
    assert_eq!(engine.status().pending_deferred, 1);

    // Still within the grace period: the drain re-defers.
    clock.advance(Duration::seconds(15));
    let drained = engine.flush_deferred();
    assert_eq!(drained.applied, 0);
    assert_eq!(engine.status().pending_deferred, 1);

    // 31 seconds after the interaction the user counts as inactive.
    clock.advance(Duration::seconds(16));
    let drained = engine.flush_deferred();
    assert_eq!(drained.applied, 1);
    assert_eq!(engine.get("habit-a").unwrap().current_count, 4);
    assert_eq!(engine.status().pending_deferred, 0);
}

#[test]
fn test_deferred_snapshot_coalesces_to_latest() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    engine.record_interaction();
    for count in [3, 4, 5] {
        engine.apply_server_snapshot(
            ProgressSnapshot::new(vec![record(
                "habit-a",
                count,
                t0() + Duration::seconds(count as i64),
            )]),
            SyncReason::Periodic,
        );
    }
    assert_eq!(engine.status().pending_deferred, 1);

    clock.advance(Duration::seconds(40));
    engine.flush_deferred();
    assert_eq!(engine.get("habit-a").unwrap().current_count, 5);
}

#[test]
fn test_deferral_emits_event_and_preserves_local_reads() {
    let (_, engine) = engine();
    let mut events = engine.subscribe();
    seed(&engine, 2, t0());

    engine.record_interaction();
    engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 9, t0() + Duration::seconds(1))]),
        SyncReason::Periodic,
    );

    let mut saw_deferred = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::SnapshotDeferred { .. }) {
            saw_deferred = true;
        }
    }
    assert!(saw_deferred);
    assert_eq!(engine.get("habit-a").unwrap().current_count, 2);
}

#[test]
fn test_rollover_clears_and_restamps() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());
    assert_eq!(engine.status().week_stamp.unwrap().week, 11);

    // Into ISO week 12.
    clock.set(Utc.with_ymd_and_hms(2025, 3, 17, 8, 0, 0).unwrap());
    let outcome = engine.check_and_handle_rollover();
    assert_eq!(
        outcome,
        RolloverOutcome::FetchNow(SyncReason::PostRollover)
    );
    assert_eq!(engine.cache_state(), CacheState::StalePendingRollover);
    assert_eq!(engine.status().week_stamp.unwrap().week, 12);
    assert!(engine.get("habit-a").is_err());
}

#[test]
fn test_rollover_idempotent_within_week() {
    let (_, engine) = engine();
    seed(&engine, 2, t0());

    assert_eq!(engine.check_and_handle_rollover(), RolloverOutcome::Current);
    assert_eq!(engine.check_and_handle_rollover(), RolloverOutcome::Current);
    assert_eq!(engine.get("habit-a").unwrap().current_count, 2);
    assert_eq!(engine.cache_state(), CacheState::Populated);
}

#[test]
fn test_rollover_deferred_while_active() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    clock.set(Utc.with_ymd_and_hms(2025, 3, 17, 8, 0, 0).unwrap());
    engine.record_interaction();
    let outcome = engine.check_and_handle_rollover();
    assert!(matches!(outcome, RolloverOutcome::Deferred { .. }));
    // Entries are still invalidated immediately; only the refetch waits.
    assert_eq!(engine.cache_state(), CacheState::StalePendingRollover);

    // Once inactive, the drain hands the fetch back to the caller.
    clock.advance(Duration::seconds(90));
    let drained = engine.flush_deferred();
    assert_eq!(drained.fetches, vec![SyncReason::PostRollover]);
}

#[test]
fn test_post_rollover_snapshot_resolves_stale_state() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    let monday = Utc.with_ymd_and_hms(2025, 3, 17, 8, 0, 0).unwrap();
    clock.set(monday);
    engine.check_and_handle_rollover();

    engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 0, monday)]),
        SyncReason::PostRollover,
    );
    assert_eq!(engine.cache_state(), CacheState::Populated);
    assert_eq!(engine.get("habit-a").unwrap().current_count, 0);
}

#[test]
fn test_periodic_discarded_while_rollover_pending() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    clock.set(Utc.with_ymd_and_hms(2025, 3, 17, 8, 0, 0).unwrap());
    engine.check_and_handle_rollover();

    // In-flight periodic data from the old week must not repopulate the
    // cleared cache.
    let outcome = engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 6, t0())]),
        SyncReason::Periodic,
    );
    assert_eq!(outcome, SnapshotOutcome::RejectedPendingRollover);
    assert!(engine.get("habit-a").is_err());
    assert_eq!(engine.cache_state(), CacheState::StalePendingRollover);
}

#[test]
fn test_failed_rollover_fetch_can_be_requeued() {
    let (clock, engine) = engine();
    seed(&engine, 2, t0());

    clock.set(Utc.with_ymd_and_hms(2025, 3, 17, 8, 0, 0).unwrap());
    assert!(matches!(
        engine.check_and_handle_rollover(),
        RolloverOutcome::FetchNow(_)
    ));

    // Caller's fetch failed; it parks the fetch for retry.
    engine.defer_fetch(SyncReason::PostRollover);
    assert_eq!(engine.status().pending_deferred, 1);

    clock.advance(Duration::seconds(61));
    let drained = engine.flush_deferred();
    assert_eq!(drained.fetches, vec![SyncReason::PostRollover]);
}

#[test]
fn test_clear_resets_to_empty_and_drops_deferred_work() {
    let (_, engine) = engine();
    seed(&engine, 2, t0());
    engine.record_interaction();
    engine.apply_server_snapshot(
        ProgressSnapshot::new(vec![record("habit-a", 4, t0())]),
        SyncReason::Periodic,
    );
    assert_eq!(engine.status().pending_deferred, 1);

    engine.clear();
    assert_eq!(engine.cache_state(), CacheState::Empty);
    assert_eq!(engine.status().pending_deferred, 0);
    assert!(engine.status().empty_since.is_some());
    assert!(engine.get("habit-a").is_err());
}

#[test]
fn test_restore_adopts_fresh_cache() {
    let (_, engine) = engine();
    seed(&engine, 3, t0());
    let persisted = engine.cache_snapshot();

    let (_, restored) = self::engine();
    restored.restore(persisted);
    assert_eq!(restored.cache_state(), CacheState::Populated);
    assert_eq!(restored.get("habit-a").unwrap().current_count, 3);
}

#[test]
fn test_restore_invalidates_stale_week() {
    let (_, engine) = engine();
    seed(&engine, 3, t0());
    let persisted = engine.cache_snapshot();

    // Reopen the session a week later.
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 19, 9, 0, 0).unwrap() + Duration::weeks(1),
    ));
    let restored = ProgressEngine::with_clock(SyncPolicy::default(), clock);
    restored.restore(persisted);

    assert_eq!(restored.cache_state(), CacheState::StalePendingRollover);
    assert!(restored.get("habit-a").is_err());
}

#[test]
fn test_is_stale_tracks_sync_age() {
    let (clock, engine) = engine();
    assert!(engine.is_stale());

    seed(&engine, 1, t0());
    assert!(!engine.is_stale());

    clock.advance(Duration::seconds(301));
    assert!(engine.is_stale());
}

proptest! {
    /// Sequences of user actions never decrease the visible count.
    #[test]
    fn prop_user_actions_monotonic(deltas in prop::collection::vec(0u32..20, 1..32)) {
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = ProgressEngine::with_clock(SyncPolicy::default(), clock.clone());
        engine.apply_server_snapshot(
            ProgressSnapshot::new(vec![record("habit-a", 0, t0())]),
            SyncReason::ForcedRefresh,
        );

        let mut last = 0;
        for delta in deltas {
            clock.advance(Duration::seconds(1));
            engine.apply_user_action("habit-a", delta).unwrap();
            let count = engine.get("habit-a").unwrap().current_count;
            prop_assert!(count >= last);
            last = count;
        }
    }

    /// The record with the later `updated_at` wins regardless of the order
    /// in which the two snapshots are submitted.
    #[test]
    fn prop_last_writer_wins_by_timestamp(
        swap in any::<bool>(),
        offset_a in 1i64..3600,
        offset_b in 1i64..3600,
    ) {
        prop_assume!(offset_a != offset_b);
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = ProgressEngine::with_clock(SyncPolicy::default(), clock.clone());

        let older = record("habit-a", 1, t0() + Duration::seconds(offset_a.min(offset_b)));
        let newer = record("habit-a", 2, t0() + Duration::seconds(offset_a.max(offset_b)));
        let (first, second) = if swap {
            (newer.clone(), older.clone())
        } else {
            (older.clone(), newer.clone())
        };

        clock.advance(Duration::seconds(7200));
        engine.apply_server_snapshot(ProgressSnapshot::new(vec![first]), SyncReason::Periodic);
        engine.apply_server_snapshot(ProgressSnapshot::new(vec![second]), SyncReason::Periodic);

        let entry = engine.get("habit-a").unwrap();
        prop_assert_eq!(entry.current_count, 2);
        prop_assert_eq!(entry.updated_at, newer.updated_at);
    }
}
