//! Check engine light handler
//!
//! Combines the MIL lamp bit and the stored trouble code count, both
//! decoded from Mode 01 PID 01, into one view.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use obd_pipeline::ReadingView;
use serde::Serialize;

use super::metrics::MetricState;
use crate::error::ApiError;
use crate::state::AppState;

const MIL_METRIC: &str = "mil-status";
const DTC_COUNT_METRIC: &str = "dtc-count";

#[derive(Serialize)]
pub struct MilStatusResponse {
    pub vehicle_id: String,
    /// Lamp lit; absent until a valid reading arrives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mil_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtc_count: Option<u32>,
    /// Worst state of the two readings
    pub state: MetricState,
    /// Timestamp of the older of the two readings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

fn state_of(view: Option<&ReadingView>) -> MetricState {
    view.map_or(MetricState::NoData, |v| v.freshness.into())
}

fn severity(state: MetricState) -> u8 {
    match state {
        MetricState::Live => 0,
        MetricState::Stale => 1,
        MetricState::Invalid => 2,
        MetricState::NoData => 3,
    }
}

fn value_of(view: Option<&ReadingView>) -> Option<f64> {
    view.and_then(|v| v.reading.value.as_ref()).map(|v| v.as_f64())
}

/// GET /api/mil-status
pub async fn get_mil_status(
    State(state): State<AppState>,
) -> Result<Json<MilStatusResponse>, ApiError> {
    let now = Utc::now();
    let mil = state.describe(MIL_METRIC)?;
    let dtc = state.describe(DTC_COUNT_METRIC)?;
    let mil = state.store().view(&mil.id, now)?;
    let dtc = state.store().view(&dtc.id, now)?;

    let states = [state_of(mil.as_ref()), state_of(dtc.as_ref())];
    let worst = states
        .into_iter()
        .max_by_key(|s| severity(*s))
        .unwrap_or(MetricState::NoData);
    let checked_at = match (&mil, &dtc) {
        (Some(m), Some(d)) => Some(m.reading.timestamp.min(d.reading.timestamp)),
        _ => None,
    };

    Ok(Json(MilStatusResponse {
        vehicle_id: state.vehicle_id().to_string(),
        mil_on: value_of(mil.as_ref()).map(|v| v != 0.0),
        dtc_count: value_of(dtc.as_ref()).map(|v| v as u32),
        state: worst,
        checked_at,
    }))
}
