//! Pipeline startup errors

use obd_core::TelemetryError;
use thiserror::Error;

use crate::link::LinkError;
use crate::persistence::SinkError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Link setup failed: {0}")]
    Link(#[from] LinkError),

    #[error("Persistence setup failed: {0}")]
    Sink(#[from] SinkError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
