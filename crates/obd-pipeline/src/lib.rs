//! obd-pipeline - Live OBD-II telemetry pipeline
//!
//! Sits between the vehicle's diagnostic link and any number of consumers:
//!
//! ```text
//! LinkAdapter → ConnectionSupervisor → PollScheduler → decode
//!     → ReadingStore → FanoutBus → subscribers (SSE, recorder, ...)
//! ```
//!
//! - [`supervisor`] keeps the link up and serialises requests
//! - [`scheduler`] polls each metric at its own interval with failure backoff
//! - [`store`] holds the latest value and bounded history per metric
//! - [`bus`] fans readings out without ever blocking the producer
//! - [`persistence`] forwards readings to a time-series sink
//! - [`pipeline`] wires everything together from a [`PipelineConfig`]

pub mod bus;
pub mod config;
pub mod error;
pub mod link;
pub mod persistence;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod supervisor;

pub use bus::{FanoutBus, Filter, Subscription};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use link::{create_link, LinkAdapter, LinkError};
pub use persistence::{JsonLinesSink, NullSink, PersistenceSink, SinkError};
pub use pipeline::Pipeline;
pub use scheduler::{PollPhase, PollScheduler, PollStatus};
pub use store::{ReadingStore, ReadingView, UpdateOutcome};
pub use supervisor::ConnectionSupervisor;
