//! Application state for the inference server
//!
//! The diagnosis service is loaded once at startup and only read afterwards.
//! Handlers share it through an `Arc`; forward passes still take the
//! predictor lock inside the service since Burn parameters are not `Sync`.

use std::sync::Arc;
use std::time::Instant;

use plantvillage_tl::backend::DefaultBackend;
use plantvillage_tl::inference::DiagnosisService;

/// Shared application state
pub struct AppState {
    /// Loaded model, catalog and remedy client
    pub service: Arc<DiagnosisService<DefaultBackend>>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: DiagnosisService<DefaultBackend>) -> Self {
        Self {
            service: Arc::new(service),
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
