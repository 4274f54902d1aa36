//! Cluster leadership for the scheduler.
//!
//! Every node registers itself as a candidate at a path derived from its
//! layer. The coordination service elects one leader per path and reports
//! transitions through [`LeaderLatchListener`] callbacks, which
//! [`LeadershipChannel`] turns into a stream of [`LeadershipEvent`]s.
//!
//! - [`LeadershipRegistrar`]: derives and registers the path
//! - [`local::LocalElection`]: in-process election service

pub mod channel;
pub mod local;
pub mod registrar;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoordinationError;

pub use channel::{LeadershipChannel, LeadershipEvent};
pub use local::{LocalCoordination, LocalElection};
pub use registrar::LeadershipRegistrar;

/// Election group path for the scheduler of `layer`.
pub fn leadership_path(layer: &str) -> String {
    format!("/{}/jobs/quartz/executor", layer)
}

/// Edge-triggered leadership callbacks.
///
/// Invoked by the coordination service on a thread it owns, possibly more
/// than once in a row for the same edge.
pub trait LeaderLatchListener: Send + Sync {
    fn on_promoted(&self);
    fn on_demoted(&self);
}

/// Distributed election service the scheduler relies on.
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Make this node a candidate in the election group at `path`.
    async fn register_leadership_component(&self, path: &str) -> Result<(), CoordinationError>;

    async fn is_leader(&self, path: &str) -> Result<bool, CoordinationError>;

    async fn add_listener(
        &self,
        listener: Arc<dyn LeaderLatchListener>,
        path: &str,
    ) -> Result<(), CoordinationError>;
}
