//! # Habitloop Core Library
//!
//! Core business logic for the Habitloop habit-tracking client: the weekly
//! progress cache and the machinery that keeps it consistent while user
//! actions, background polls, week rollovers, and app-lifecycle
//! transitions all write to it concurrently. Hosts (CLI, GUI shells) are
//! thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Progress Engine**: single owner of the cache; serializes every
//!   write and arbitrates conflicts by server timestamp, never by arrival
//!   order
//! - **Activity Tracker**: "is the user mid-interaction" signal that gates
//!   disruptive background updates
//! - **Sync Scheduler**: periodic gateway polling plus the retry loop that
//!   drains deferred work
//! - **Storage**: JSON cache snapshots and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`ProgressEngine`]: cache owner and conflict arbiter
//! - [`SyncScheduler`]: background sync driver
//! - [`ProgressGateway`]: async trait the host's transport implements
//! - [`Config`]: application configuration management

pub mod activity;
pub mod client_id;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod progress;
pub mod scheduler;
pub mod storage;

pub use activity::ActivityTracker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, GatewayConfig, SyncPolicy};
pub use error::{CacheError, ConfigError, CoreError, GatewayError, StoreError};
pub use events::Event;
pub use gateway::{HttpProgressGateway, ProgressGateway};
pub use progress::{
    ApplyStats, CacheState, HabitId, ProgressCache, ProgressEngine, ProgressSnapshot,
    RolloverOutcome, SnapshotOutcome, SnapshotRecord, SyncReason, SyncStatus, WeekKey,
    WeeklyProgress, WriteSource,
};
pub use scheduler::SyncScheduler;
pub use storage::CacheStore;
