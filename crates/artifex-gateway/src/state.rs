//! Shared application state.

use std::sync::Arc;

use artifex_generation::application::{CommandBus, QueryBus};
use artifex_generation::projections::ProjectionStore;

use crate::auth::AuthProvider;
use crate::registry::ConnectionRegistry;

/// Application state shared across all connection tasks and handlers.
#[derive(Clone)]
pub struct AppState {
    /// Write side.
    pub command_bus: Arc<CommandBus>,
    /// Read side.
    pub query_bus: Arc<QueryBus>,
    /// Projection store, for subscription snapshots.
    pub projections: Arc<ProjectionStore>,
    /// Live connections and subscription indices.
    pub registry: Arc<ConnectionRegistry>,
    /// Token verifier.
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        command_bus: Arc<CommandBus>,
        query_bus: Arc<QueryBus>,
        projections: Arc<ProjectionStore>,
        registry: Arc<ConnectionRegistry>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            command_bus,
            query_bus,
            projections,
            registry,
            auth,
        }
    }
}
