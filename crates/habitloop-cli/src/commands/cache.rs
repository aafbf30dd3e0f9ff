//! Cache subcommand: inspect and reset the local cache.

use clap::Subcommand;
use std::error::Error;

use super::AppContext;

/// Cache management actions.
#[derive(Subcommand)]
pub enum CacheAction {
    /// Show the raw cached state
    Show,
    /// Clear the cache and its persisted snapshot (logout)
    Clear,
}

/// Run the cache command.
pub fn run(action: CacheAction) -> Result<(), Box<dyn Error>> {
    let ctx = AppContext::init()?;
    match action {
        CacheAction::Show => show(&ctx),
        CacheAction::Clear => clear(&ctx),
    }
}

fn show(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    let cache = ctx.engine.cache_snapshot();
    println!("{}", serde_json::to_string_pretty(&cache)?);
    Ok(())
}

fn clear(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    ctx.engine.clear();
    ctx.store.remove()?;
    println!("Cache cleared.");
    Ok(())
}
