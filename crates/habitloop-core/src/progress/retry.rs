//! Deferred-sync retry queue.
//!
//! Server-originated work that cannot be applied yet (the user is active)
//! is parked here as `(payload, next_attempt_at)` pairs and drained by one
//! timer loop. Deferred work is postponed, never dropped. The queue is
//! session-ephemeral: deferral only exists to ride out a grace period, so
//! nothing here is persisted.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::types::{ProgressSnapshot, SyncReason};

/// Work that was postponed.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredPayload {
    /// A fetched snapshot waiting to be applied.
    Snapshot {
        snapshot: ProgressSnapshot,
        reason: SyncReason,
    },
    /// A fetch that still needs to happen (rollover resync).
    Fetch { reason: SyncReason },
}

/// Coalescing key: at most one pending item per kind. A newer snapshot
/// wholesale-replaces a queued one; per-record conflict rules still apply
/// when it is finally applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DeferredKind {
    Snapshot,
    Fetch,
}

impl DeferredPayload {
    fn kind(&self) -> DeferredKind {
        match self {
            DeferredPayload::Snapshot { .. } => DeferredKind::Snapshot,
            DeferredPayload::Fetch { .. } => DeferredKind::Fetch,
        }
    }
}

/// A queued payload with its retry time.
#[derive(Debug, Clone)]
pub struct DeferredSync {
    pub payload: DeferredPayload,
    pub next_attempt_at: DateTime<Utc>,
    /// How many times this payload has been postponed.
    pub attempts: u32,
}

/// Queue of deferred sync work, drained on a fixed cadence.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    pending: HashMap<DeferredKind, DeferredSync>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Queue a payload for retry at `next_attempt_at`.
    ///
    /// A payload of the same kind already queued is replaced; its attempt
    /// count carries over so callers can observe how long work has waited.
    pub fn schedule(&mut self, payload: DeferredPayload, next_attempt_at: DateTime<Utc>) {
        let attempts = self
            .pending
            .get(&payload.kind())
            .map(|p| p.attempts + 1)
            .unwrap_or(0);
        self.pending.insert(
            payload.kind(),
            DeferredSync {
                payload,
                next_attempt_at,
                attempts,
            },
        );
    }

    /// Remove and return every payload whose retry time has arrived.
    pub fn drain_ready(&mut self, now: DateTime<Utc>) -> Vec<DeferredSync> {
        let mut ready = Vec::new();
        self.pending.retain(|_, item| {
            if item.next_attempt_at <= now {
                ready.push(item.clone());
                false
            } else {
                true
            }
        });
        ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Time until the earliest queued retry, if any.
    pub fn time_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.pending
            .values()
            .map(|p| p.next_attempt_at)
            .min()
            .map(|t| if t > now { t - now } else { Duration::zero() })
    }
}
