//! Sync subcommand: manual sync cycles and sync status.

use clap::Subcommand;
use std::error::Error;

use habitloop_core::{SnapshotOutcome, SyncReason};

use super::AppContext;

/// Sync actions.
#[derive(Subcommand)]
pub enum SyncAction {
    /// Run one sync cycle now
    Now {
        /// Replace matching local entries regardless of timestamps
        #[arg(long)]
        forced: bool,
    },
    /// Show sync status
    Status,
}

/// Run the sync command.
pub fn run(action: SyncAction) -> Result<(), Box<dyn Error>> {
    let ctx = AppContext::init()?;
    match action {
        SyncAction::Now { forced } => sync_now(&ctx, forced),
        SyncAction::Status => show_status(&ctx),
    }
}

fn sync_now(ctx: &AppContext, forced: bool) -> Result<(), Box<dyn Error>> {
    let reason = if forced {
        SyncReason::ForcedRefresh
    } else {
        SyncReason::Periodic
    };

    let scheduler = ctx.scheduler()?;
    let outcome = super::runtime()?.block_on(scheduler.sync_now(reason))?;
    ctx.persist()?;

    match outcome {
        SnapshotOutcome::Applied(stats) => {
            println!(
                "Synced: {} inserted, {} updated, {} stale rejected",
                stats.inserted, stats.updated, stats.rejected_stale
            );
        }
        SnapshotOutcome::Deferred { retry_at } => {
            println!("Deferred until {} (user active)", retry_at.format("%H:%M:%S"));
        }
        SnapshotOutcome::RejectedPendingRollover => {
            println!("Skipped: waiting for the new week's data");
        }
    }
    Ok(())
}

fn show_status(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    let status = ctx.engine.status();

    println!("State: {:?}", status.state);
    match status.week_stamp {
        Some(week) => println!("Week: {}", week),
        None => println!("Week: (unset)"),
    }
    match status.last_synced_at {
        Some(at) => println!("Last synced: {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => println!("Last synced: never"),
    }
    println!("Pending deferred: {}", status.pending_deferred);
    if let Some(since) = status.empty_since {
        println!("Empty since: {}", since.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
