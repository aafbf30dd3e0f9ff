//! Habit subcommand: read and record weekly progress.

use clap::Subcommand;
use std::error::Error;

use habitloop_core::{CacheError, CoreError, WeeklyProgress};

use super::AppContext;

/// Habit progress actions.
#[derive(Subcommand)]
pub enum HabitAction {
    /// List all habits cached for the current week
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one habit's weekly progress
    Get {
        /// Habit identifier
        habit_id: String,
    },
    /// Record completed verifications for a habit
    Log {
        /// Habit identifier
        habit_id: String,
        /// Number of verifications to add
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

/// Run the habit command.
pub fn run(action: HabitAction) -> Result<(), Box<dyn Error>> {
    let ctx = AppContext::init()?;
    match action {
        HabitAction::List { json } => list(&ctx, json),
        HabitAction::Get { habit_id } => get(&ctx, &habit_id),
        HabitAction::Log { habit_id, count } => log(&ctx, &habit_id, count),
    }
}

fn list(ctx: &AppContext, json: bool) -> Result<(), Box<dyn Error>> {
    ctx.engine.record_interaction();
    let entries = ctx.engine.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No habits cached for the current week.");
        return Ok(());
    }
    for entry in entries {
        print_entry(&entry);
    }
    Ok(())
}

fn get(ctx: &AppContext, habit_id: &str) -> Result<(), Box<dyn Error>> {
    ctx.engine.record_interaction();
    match ctx.engine.get(habit_id) {
        Ok(entry) => {
            print_entry(&entry);
            Ok(())
        }
        Err(CacheError::NotFound { .. }) => {
            // Recover with a targeted refetch before giving up.
            let scheduler = ctx.scheduler()?;
            let entry = super::runtime()?.block_on(scheduler.refresh_habit(habit_id))?;
            ctx.persist()?;
            print_entry(&entry);
            Ok(())
        }
    }
}

fn log(ctx: &AppContext, habit_id: &str, count: u32) -> Result<(), Box<dyn Error>> {
    ctx.engine.record_interaction();
    let entry = match ctx.engine.apply_user_action(habit_id, count) {
        Ok(entry) => entry,
        Err(CacheError::NotFound { .. }) => {
            // Unknown locally: fetch the habit, then apply the increment.
            let scheduler = ctx.scheduler()?;
            let rt = super::runtime()?;
            rt.block_on(scheduler.refresh_habit(habit_id))?;
            ctx.engine
                .apply_user_action(habit_id, count)
                .map_err(CoreError::Cache)?
        }
    };
    ctx.persist()?;
    print_entry(&entry);
    Ok(())
}

fn print_entry(entry: &WeeklyProgress) {
    println!(
        "{}: {}/{} (updated {})",
        entry.habit_id,
        entry.current_count,
        entry.target_count,
        entry.updated_at.format("%Y-%m-%d %H:%M"),
    );
}
