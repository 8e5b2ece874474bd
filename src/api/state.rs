use std::sync::Arc;

use crate::analysis::AnalysisRequest;
use crate::config::AppConfig;
use crate::session::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: AppConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    /// Request defaults from configuration, before query overrides.
    pub fn base_request(&self) -> AnalysisRequest {
        AnalysisRequest::from_config(&self.config)
    }
}
