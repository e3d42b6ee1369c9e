//! Streaming handlers
//!
//! Server-Sent Events fed by a fan-out bus subscription. The subscription
//! lives inside the response stream, so a client disconnect drops it and
//! unsubscribes.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use obd_core::MetricId;
use obd_pipeline::Filter;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the reading stream
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Comma-separated metric ids; every metric when absent
    pub metrics: Option<String>,
}

fn parse_filter(state: &AppState, metrics: Option<&str>) -> Result<Filter, ApiError> {
    let Some(list) = metrics else {
        return Ok(Filter::All);
    };

    let ids: Vec<MetricId> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(MetricId::new)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::BadRequest("metrics filter is empty".to_string()));
    }
    for id in &ids {
        state.registry().describe(id)?;
    }
    Ok(Filter::metrics(ids))
}

/// GET /api/stream?metrics=engine-rpm,vehicle-speed
pub async fn stream_readings(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_filter(&state, query.metrics.as_deref())?;
    let mut subscription = state.store().bus().subscribe(filter);
    tracing::debug!(subscription = %subscription.id(), "SSE stream opened");

    let stream = async_stream::stream! {
        while let Some(reading) = subscription.recv().await {
            match Event::default().event("reading").json_data(&reading) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(e) => tracing::warn!(metric = %reading.metric, error = %e, "Failed to encode reading"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
