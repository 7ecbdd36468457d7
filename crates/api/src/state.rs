use std::sync::Arc;

use twingraph_import::runner::ImportJobRunner;
use twingraph_import::ImportServices;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: twingraph_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Starts import jobs on this instance and tracks the ones running here.
    pub runner: ImportJobRunner,
}

impl AppState {
    pub fn services(&self) -> &ImportServices {
        self.runner.services()
    }
}
