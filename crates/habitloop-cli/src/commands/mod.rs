//! CLI subcommands.
//!
//! Each invocation builds one engine (the session's single cache owner),
//! restores the persisted cache into it, runs the requested operation, and
//! persists the result. The engine and its collaborators are wired here --
//! nothing in the core reaches for globals.

pub mod cache;
pub mod habit;
pub mod sync;

use std::error::Error;
use std::sync::Arc;

use habitloop_core::client_id::get_or_create_client_id;
use habitloop_core::{CacheStore, Config, HttpProgressGateway, ProgressEngine, SyncScheduler};

/// Composition root shared by the subcommands.
pub(crate) struct AppContext {
    pub config: Config,
    pub store: CacheStore,
    pub engine: Arc<ProgressEngine>,
}

impl AppContext {
    pub fn init() -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let store = CacheStore::new();
        let engine = Arc::new(ProgressEngine::new(config.sync.clone()));
        if let Some(cache) = store.load() {
            engine.restore(cache);
        }
        Ok(Self {
            config,
            store,
            engine,
        })
    }

    /// Build a scheduler bound to this context's engine and the configured
    /// HTTP gateway.
    pub fn scheduler(&self) -> Result<SyncScheduler, Box<dyn Error>> {
        let mut gateway = HttpProgressGateway::new(
            &self.config.gateway,
            self.config.sync.gateway_timeout_secs,
        )?;
        if let Ok(client_id) = get_or_create_client_id() {
            gateway = gateway.with_client_id(client_id);
        }
        Ok(SyncScheduler::new(
            self.engine.clone(),
            Arc::new(gateway),
            self.config.sync.clone(),
        ))
    }

    /// Write the current cache back to disk.
    pub fn persist(&self) -> Result<(), Box<dyn Error>> {
        self.store.persist(&self.engine.cache_snapshot())?;
        Ok(())
    }
}

/// Runtime for commands that hit the network.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn Error>> {
    Ok(tokio::runtime::Runtime::new()?)
}
