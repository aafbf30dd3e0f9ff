//! Background sync scheduler.
//!
//! Drives the engine from two timers on one spawned task: the periodic
//! poll interval, and the faster cadence that re-checks deferred work.
//! Gateway I/O happens here, outside the engine's serialization domain;
//! only results re-enter the engine. A failed cycle is logged and skipped
//! -- it never falls back to a destructive full overwrite, the next tick
//! simply retries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::SyncPolicy;
use crate::error::{CoreError, GatewayError};
use crate::gateway::ProgressGateway;
use crate::progress::{
    ProgressEngine, ProgressSnapshot, RolloverOutcome, SnapshotOutcome, SyncReason, WeeklyProgress,
};

/// Periodic driver for background synchronization.
pub struct SyncScheduler {
    engine: Arc<ProgressEngine>,
    gateway: Arc<dyn ProgressGateway>,
    policy: SyncPolicy,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<ProgressEngine>,
        gateway: Arc<dyn ProgressGateway>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            engine,
            gateway,
            policy,
            task: Mutex::new(None),
        }
    }

    /// Begin the repeating sync loop. Idempotent: calling while already
    /// running is a no-op, not a second timer. The first cycle runs
    /// immediately (startup sync).
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap();
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        let engine = self.engine.clone();
        let gateway = self.gateway.clone();
        let policy = self.policy.clone();
        *task = Some(tokio::spawn(async move {
            run_loop(engine, gateway, policy).await;
        }));
    }

    /// Cancel the sync loop. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// One manual sync cycle with the given reason.
    pub async fn sync_now(&self, reason: SyncReason) -> Result<SnapshotOutcome, GatewayError> {
        fetch_and_apply(&self.engine, self.gateway.as_ref(), &self.policy, reason).await
    }

    /// Forced consistency check on an app-lifecycle transition to the
    /// foreground: resolve any rollover, then refresh if the cache is
    /// overdue. Returns the applied outcome, or `None` when nothing needed
    /// fetching.
    pub async fn on_foreground(&self) -> Result<Option<SnapshotOutcome>, GatewayError> {
        let reason = match self.engine.check_and_handle_rollover() {
            RolloverOutcome::FetchNow(reason) => reason,
            RolloverOutcome::Deferred { .. } => return Ok(None),
            RolloverOutcome::Current => {
                if !self.engine.is_stale() {
                    return Ok(None);
                }
                SyncReason::ForcedRefresh
            }
        };

        match self.sync_now(reason).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) => {
                if reason == SyncReason::PostRollover {
                    // Keep the rollover resync alive; the retry loop will
                    // pick it up.
                    self.engine.defer_fetch(reason);
                }
                Err(err)
            }
        }
    }

    /// Targeted single-habit refetch, the recovery path for a local
    /// `NotFound`.
    pub async fn refresh_habit(&self, habit_id: &str) -> Result<WeeklyProgress, CoreError> {
        let secs = self.policy.gateway_timeout_secs;
        let record = timeout(Duration::from_secs(secs), self.gateway.fetch_habit(habit_id))
            .await
            .map_err(|_| GatewayError::Timeout { timeout_secs: secs })?
            .map_err(CoreError::Gateway)?;

        self.engine
            .apply_server_snapshot(ProgressSnapshot::new(vec![record]), SyncReason::ForcedRefresh);
        self.engine.get(habit_id).map_err(CoreError::Cache)
    }
}

async fn run_loop(
    engine: Arc<ProgressEngine>,
    gateway: Arc<dyn ProgressGateway>,
    policy: SyncPolicy,
) {
    let mut sync_tick = interval(Duration::from_secs(policy.sync_interval_secs));
    let mut retry_tick = interval(Duration::from_secs(policy.retry_cadence_secs));
    sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sync_tick.tick() => {
                run_sync_cycle(&engine, gateway.as_ref(), &policy).await;
            }
            _ = retry_tick.tick() => {
                run_retry_cycle(&engine, gateway.as_ref(), &policy).await;
            }
        }
    }
}

/// One periodic cycle: rollover check, then fetch and apply.
async fn run_sync_cycle(engine: &ProgressEngine, gateway: &dyn ProgressGateway, policy: &SyncPolicy) {
    let reason = match engine.check_and_handle_rollover() {
        RolloverOutcome::FetchNow(reason) => reason,
        // The resync is queued; periodic data for the old week would be
        // discarded anyway, so this cycle has nothing to do.
        RolloverOutcome::Deferred { .. } => return,
        RolloverOutcome::Current => SyncReason::Periodic,
    };

    if let Err(err) = fetch_and_apply(engine, gateway, policy, reason).await {
        tracing::warn!(error = %err, reason = ?reason, "sync cycle skipped");
        engine.note_gateway_failure(&err);
        if reason == SyncReason::PostRollover {
            engine.defer_fetch(reason);
        }
    }
}

/// One retry cycle: drain deferred work and execute any due fetches.
async fn run_retry_cycle(
    engine: &ProgressEngine,
    gateway: &dyn ProgressGateway,
    policy: &SyncPolicy,
) {
    let drained = engine.flush_deferred();
    for reason in drained.fetches {
        if let Err(err) = fetch_and_apply(engine, gateway, policy, reason).await {
            tracing::warn!(error = %err, reason = ?reason, "deferred fetch failed");
            engine.note_gateway_failure(&err);
            engine.defer_fetch(reason);
        }
    }
}

async fn fetch_and_apply(
    engine: &ProgressEngine,
    gateway: &dyn ProgressGateway,
    policy: &SyncPolicy,
    reason: SyncReason,
) -> Result<SnapshotOutcome, GatewayError> {
    let secs = policy.gateway_timeout_secs;
    let snapshot = timeout(Duration::from_secs(secs), gateway.fetch_snapshot())
        .await
        .map_err(|_| GatewayError::Timeout { timeout_secs: secs })??;
    Ok(engine.apply_server_snapshot(snapshot, reason))
}
