// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod classifier;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod phone;
pub mod reputation;
pub mod stats;

// ---- Re-exports for stable public API ----
pub use crate::config::GuardConfig;
pub use crate::models::{AnalysisResponse, Decision};
pub use crate::orchestrator::AnalysisService;

use std::sync::Arc;

use axum::Router;

/// Build the service from `cfg` and return the HTTP router around it.
/// `/metrics` is not included; the binary merges it once the recorder exists.
pub fn app(cfg: &GuardConfig) -> Router {
    let service = Arc::new(AnalysisService::from_config(cfg));
    api::create_router(api::AppState::new(service, cfg.max_text_length))
}
