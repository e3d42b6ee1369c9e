//! obd-api - HTTP read API for the OBD telemetry pipeline
//!
//! A thin consumer of the pipeline: JSON views over the reading store and
//! an SSE stream over a bus subscription.
//!
//! # Usage
//!
//! ```ignore
//! use obd_api::{create_router, AppState};
//! use obd_pipeline::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::start(&PipelineConfig::default()).await?;
//! let router = create_router(AppState::new(&pipeline));
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the read API router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/metrics", get(handlers::metrics::list_metrics))
        .route("/api/obd-data", get(handlers::metrics::get_obd_data))
        .route("/api/metrics/{metric_id}", get(handlers::metrics::get_metric))
        .route(
            "/api/metrics/{metric_id}/history",
            get(handlers::metrics::get_history),
        )
        .route(
            "/api/metrics/{metric_id}/stats",
            get(handlers::metrics::get_stats),
        )
        .route(
            "/api/metrics/{metric_id}/aggregate",
            get(handlers::metrics::get_aggregate),
        )
        .route("/api/mil-status", get(handlers::mil::get_mil_status))
        .route("/api/link", get(handlers::link::get_link))
        .route("/api/stream", get(handlers::streams::stream_readings))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
