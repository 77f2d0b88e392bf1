//! PSA API Service Library
//!
//! HTTP surface for post-storm assessment: point queries against extracted
//! model output and the model-output upload workflow of a model run.

pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Extension, Router,
};

use crate::state::AppState;

/// Build the application router around shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/psa-filter", get(handlers::psa::psa_filter_handler))
        .route("/nsem/:id", get(handlers::nsem::get_model_run_handler))
        .route(
            "/nsem/:id/model-output",
            patch(handlers::nsem::submit_model_output_handler),
        )
        .route(
            "/nsem/:id/covered-data",
            post(handlers::nsem::request_covered_data_handler),
        )
        .route("/health", get(handlers::health::health_handler))
        .layer(Extension(state))
}
