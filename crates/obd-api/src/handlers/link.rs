//! Link status handler

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use obd_core::{LinkStatus, MetricId};
use obd_pipeline::PollPhase;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct LinkResponse {
    pub adapter: String,
    #[serde(flatten)]
    pub status: LinkStatus,
    pub polling: BTreeMap<MetricId, PollInfo>,
}

/// Scheduler view of one metric
#[derive(Serialize)]
pub struct PollInfo {
    pub phase: PollPhase,
    pub interval_ms: u64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /api/link
pub async fn get_link(State(state): State<AppState>) -> Json<LinkResponse> {
    let polling = state
        .scheduler()
        .poll_statuses()
        .into_iter()
        .map(|(id, status)| {
            let info = PollInfo {
                phase: status.phase,
                interval_ms: status.interval.as_millis() as u64,
                consecutive_failures: status.consecutive_failures,
                last_error: status.last_error,
            };
            (id, info)
        })
        .collect();

    Json(LinkResponse {
        adapter: state.supervisor().describe(),
        status: state.supervisor().status(),
        polling,
    })
}
