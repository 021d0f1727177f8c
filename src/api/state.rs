//! Application state for the API server

use crate::{Config, Harvester};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The harvester service
    pub harvester: Arc<Harvester>,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(harvester: Arc<Harvester>, config: Arc<Config>) -> Self {
        Self { harvester, config }
    }
}
