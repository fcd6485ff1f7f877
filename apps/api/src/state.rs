use std::sync::Arc;

use crate::config::Config;
use crate::plan::jobs::JobStore;
use crate::plan::worker::Worker;
use crate::portfolio::store::PortfolioStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Job records keyed by plan key. Redis in production, in-process otherwise.
    pub jobs: Arc<dyn JobStore>,
    /// Spawned by the generate handler; shares `jobs`.
    pub worker: Worker,
    pub portfolio: Arc<dyn PortfolioStore>,
    pub config: Config,
}
