//! Remote data gateway.
//!
//! The only outbound dependency of the core: an async source of server
//! progress snapshots. The engine never calls it directly -- the scheduler
//! (or a host-initiated refresh) fetches here, off the cache's
//! serialization domain, and re-enters the engine with the result.

pub mod http;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::progress::{ProgressSnapshot, SnapshotRecord};

/// Fetches progress data from the server.
///
/// Implementations must supply server-side `updated_at` timestamps that are
/// comparable across fetches; conflict resolution depends on them.
#[async_trait]
pub trait ProgressGateway: Send + Sync {
    /// Fetch the full weekly progress snapshot for the configured user.
    async fn fetch_snapshot(&self) -> Result<ProgressSnapshot, GatewayError>;

    /// Fetch a single habit's progress (targeted recovery after a local
    /// `NotFound`).
    async fn fetch_habit(&self, habit_id: &str) -> Result<SnapshotRecord, GatewayError>;
}

pub use http::HttpProgressGateway;
