//! Pipeline assembly
//!
//! Builds every component from a [`PipelineConfig`], spawns the supervisor,
//! scheduler and recorder tasks, and tears them down in order.

use std::collections::BTreeMap;
use std::sync::Arc;

use obd_conv::MetricRegistry;
use obd_core::{LinkStatus, MetricId, Reading};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::{FanoutBus, Filter, Subscription};
use crate::config::{PersistenceConfig, PipelineConfig};
use crate::error::PipelineResult;
use crate::link::{create_link, LinkAdapter};
use crate::persistence::{create_sink, spawn_recorder, PersistenceSink};
use crate::scheduler::PollScheduler;
use crate::store::ReadingStore;
use crate::supervisor::ConnectionSupervisor;

/// Running telemetry pipeline
pub struct Pipeline {
    vehicle_id: String,
    registry: Arc<MetricRegistry>,
    store: Arc<ReadingStore>,
    bus: FanoutBus,
    supervisor: Arc<ConnectionSupervisor>,
    scheduler: Arc<PollScheduler>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    recorder: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Build the registry, link and sink named in `config` and start
    pub async fn start(config: &PipelineConfig) -> PipelineResult<Self> {
        let registry = match &config.metrics {
            Some(path) => MetricRegistry::from_file(path)?,
            None => MetricRegistry::standard()?,
        };
        let link = create_link(&config.link)?;
        let sink = match &config.persistence {
            PersistenceConfig::None => None,
            other => Some(create_sink(other, &config.vehicle_id).await?),
        };
        Self::start_with(config, registry, link, sink)
    }

    /// Start with an explicit registry, link and sink
    ///
    /// Interval and history overrides naming unknown metrics fail here, before
    /// any task is spawned.
    pub fn start_with(
        config: &PipelineConfig,
        registry: MetricRegistry,
        link: Arc<dyn LinkAdapter>,
        sink: Option<Arc<dyn PersistenceSink>>,
    ) -> PipelineResult<Self> {
        let registry = Arc::new(registry.with_intervals(&config.polling.intervals)?);
        let bus = FanoutBus::new(config.bus.queue_capacity);
        let store = Arc::new(ReadingStore::new(&registry, &config.store, bus.clone())?);
        let supervisor = Arc::new(ConnectionSupervisor::new(link, config.reconnect.clone()));
        let scheduler = Arc::new(PollScheduler::new(
            registry.clone(),
            supervisor.clone(),
            store.clone(),
            config.polling.clone(),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            ("supervisor", tokio::spawn(supervisor.clone().run(shutdown_rx.clone()))),
            ("scheduler", tokio::spawn(scheduler.clone().run(shutdown_rx))),
        ];
        let recorder = sink.map(|sink| spawn_recorder(sink, bus.subscribe(Filter::All)));

        info!(
            vehicle_id = %config.vehicle_id,
            metrics = registry.len(),
            link = %supervisor.describe(),
            "Telemetry pipeline started"
        );

        Ok(Self {
            vehicle_id: config.vehicle_id.clone(),
            registry,
            store,
            bus,
            supervisor,
            scheduler,
            shutdown,
            tasks,
            recorder,
        })
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.store
    }

    pub fn bus(&self) -> &FanoutBus {
        &self.bus
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn scheduler(&self) -> &Arc<PollScheduler> {
        &self.scheduler
    }

    pub fn link_status(&self) -> LinkStatus {
        self.supervisor.status()
    }

    pub fn subscribe(&self, filter: Filter) -> Subscription {
        self.bus.subscribe(filter)
    }

    pub fn snapshot(&self) -> BTreeMap<MetricId, Reading> {
        self.store.snapshot()
    }

    /// Stop polling, drop the link and close every subscription
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Pipeline task ended abnormally");
            }
        }

        self.bus.close();
        if let Some(recorder) = self.recorder {
            if let Err(e) = recorder.await {
                warn!(task = "recorder", error = %e, "Pipeline task ended abnormally");
            }
        }
        info!("Telemetry pipeline stopped");
    }
}
