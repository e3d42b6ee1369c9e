//! Metric handlers
//!
//! Read-only views over the reading store: the registry listing, the
//! dashboard snapshot, per-metric latest value, history, statistics and
//! windowed means.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use obd_conv::MetricDescriptor;
use obd_core::{FieldStats, Freshness, LinkStatus, MetricId, Reading, WindowMean};
use obd_pipeline::ReadingView;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Response Types
// =============================================================================

#[derive(Serialize)]
pub struct MetricListResponse {
    pub count: usize,
    pub items: Vec<MetricInfo>,
}

/// Registry entry as exposed to clients
#[derive(Serialize)]
pub struct MetricInfo {
    pub id: MetricId,
    pub name: String,
    /// Request text, e.g. "010C"
    pub pid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub min: f64,
    pub max: f64,
    pub interval_ms: u64,
    pub precision: u8,
    pub rule: &'static str,
}

impl From<&MetricDescriptor> for MetricInfo {
    fn from(desc: &MetricDescriptor) -> Self {
        Self {
            id: desc.id.clone(),
            name: desc.name.clone(),
            pid: desc.pid.to_string(),
            unit: desc.unit.clone(),
            min: desc.range.min,
            max: desc.range.max,
            interval_ms: desc.interval_ms,
            precision: desc.effective_precision(),
            rule: desc.rule.kind(),
        }
    }
}

/// Everything a dashboard needs in one poll
#[derive(Serialize)]
pub struct ObdDataResponse {
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    pub link: LinkStatus,
    pub freshness_threshold_ms: u64,
    pub metrics: BTreeMap<MetricId, ReadingView>,
}

/// Display state of a single metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricState {
    NoData,
    Live,
    Stale,
    Invalid,
}

impl From<Freshness> for MetricState {
    fn from(freshness: Freshness) -> Self {
        match freshness {
            Freshness::Live => MetricState::Live,
            Freshness::Stale => MetricState::Stale,
            Freshness::Invalid => MetricState::Invalid,
        }
    }
}

#[derive(Serialize)]
pub struct MetricValueResponse {
    pub metric: MetricId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub state: MetricState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<ReadingView>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Return only the most recent `limit` readings
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub metric: MetricId,
    pub count: usize,
    pub readings: Vec<Reading>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub metric: MetricId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Absent until the metric has at least one ok reading
    pub stats: Option<FieldStats>,
}

/// Default aggregation window (10 minutes)
const DEFAULT_WINDOW_MS: u64 = 600_000;

#[derive(Debug, Deserialize)]
pub struct AggregateQuery {
    pub window_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct AggregateResponse {
    pub metric: MetricId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub window_ms: u64,
    pub count: usize,
    pub points: Vec<WindowMean>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/metrics
pub async fn list_metrics(State(state): State<AppState>) -> Json<MetricListResponse> {
    let items: Vec<MetricInfo> = state.registry().all().iter().map(MetricInfo::from).collect();
    Json(MetricListResponse {
        count: items.len(),
        items,
    })
}

/// GET /api/obd-data
pub async fn get_obd_data(State(state): State<AppState>) -> Json<ObdDataResponse> {
    let now = Utc::now();
    let store = state.store();
    Json(ObdDataResponse {
        vehicle_id: state.vehicle_id().to_string(),
        timestamp: now,
        link: state.supervisor().status(),
        freshness_threshold_ms: store.freshness_threshold().as_millis() as u64,
        metrics: store.snapshot_view(now),
    })
}

/// GET /api/metrics/{metric_id}
pub async fn get_metric(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
) -> Result<Json<MetricValueResponse>, ApiError> {
    let desc = state.describe(&metric_id)?;
    let view = state.store().view(&desc.id, Utc::now())?;

    Ok(Json(MetricValueResponse {
        metric: desc.id.clone(),
        name: desc.name.clone(),
        unit: desc.unit.clone(),
        state: view
            .as_ref()
            .map_or(MetricState::NoData, |v| v.freshness.into()),
        reading: view,
    }))
}

/// GET /api/metrics/{metric_id}/history
pub async fn get_history(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let desc = state.describe(&metric_id)?;
    let mut readings = state.store().history(&desc.id)?;

    if let Some(limit) = query.limit {
        let skip = readings.len().saturating_sub(limit);
        readings.drain(..skip);
    }

    Ok(Json(HistoryResponse {
        metric: desc.id.clone(),
        count: readings.len(),
        readings,
    }))
}

/// GET /api/metrics/{metric_id}/stats
pub async fn get_stats(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
) -> Result<Json<StatsResponse>, ApiError> {
    let desc = state.describe(&metric_id)?;
    Ok(Json(StatsResponse {
        metric: desc.id.clone(),
        unit: desc.unit.clone(),
        stats: state.store().stats(&desc.id)?,
    }))
}

/// GET /api/metrics/{metric_id}/aggregate?window_ms=60000
pub async fn get_aggregate(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
    Query(query): Query<AggregateQuery>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let desc = state.describe(&metric_id)?;
    let window_ms = query.window_ms.unwrap_or(DEFAULT_WINDOW_MS);
    let points = state
        .store()
        .aggregate(&desc.id, Duration::from_millis(window_ms))?;

    Ok(Json(AggregateResponse {
        metric: desc.id.clone(),
        unit: desc.unit.clone(),
        window_ms,
        count: points.len(),
        points,
    }))
}
