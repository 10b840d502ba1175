use std::sync::Arc;

use crate::config::AppConfig;
use crate::progression::ProgressionEngine;
use crate::store::TrackStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<ProgressionEngine>,
    pub store: Arc<dyn TrackStore>,
}
