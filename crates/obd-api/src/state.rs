//! Application state for the read API

use std::sync::Arc;

use obd_conv::{MetricDescriptor, MetricRegistry};
use obd_core::MetricId;
use obd_pipeline::{ConnectionSupervisor, Pipeline, PollScheduler, ReadingStore};

use crate::error::ApiError;

/// Application state shared across all handlers
///
/// Holds handles into a running pipeline; handlers only read from the store
/// or subscribe to its bus.
#[derive(Clone)]
pub struct AppState {
    vehicle_id: Arc<str>,
    registry: Arc<MetricRegistry>,
    store: Arc<ReadingStore>,
    supervisor: Arc<ConnectionSupervisor>,
    scheduler: Arc<PollScheduler>,
}

impl AppState {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            vehicle_id: Arc::from(pipeline.vehicle_id()),
            registry: pipeline.registry().clone(),
            store: pipeline.store().clone(),
            supervisor: pipeline.supervisor().clone(),
            scheduler: pipeline.scheduler().clone(),
        }
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// Look up a metric by its path id
    pub fn describe(&self, id: &str) -> Result<&MetricDescriptor, ApiError> {
        Ok(self.registry.describe(&MetricId::new(id))?)
    }
}
