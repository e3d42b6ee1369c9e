//! Vehicle link layer
//!
//! This module provides adapters for talking to the vehicle:
//! - ELM327 interpreter over TCP (Wi-Fi OBD dongles)
//! - Simulated vehicle for demos and tests
//!
//! # Example
//!
//! ```ignore
//! use obd_pipeline::link::create_link;
//! use obd_pipeline::config::LinkConfig;
//!
//! let link = create_link(&LinkConfig::default())?;
//! link.connect().await?;
//! let frame = link.request(Pid::current(0x0C)).await?;
//! ```

mod adapter;
pub mod elm327;
pub mod error;
pub mod mock;

pub use adapter::LinkAdapter;
pub use error::LinkError;

use std::sync::Arc;

use crate::config::LinkConfig;

/// Create a link adapter based on configuration
pub fn create_link(config: &LinkConfig) -> Result<Arc<dyn LinkAdapter>, LinkError> {
    match config {
        LinkConfig::Elm327(cfg) => {
            if cfg.host.is_empty() {
                return Err(LinkError::InvalidConfig("elm327 host is empty".to_string()));
            }
            Ok(Arc::new(elm327::Elm327Adapter::new(cfg)))
        }
        LinkConfig::Mock(cfg) => Ok(Arc::new(mock::MockLinkAdapter::new(cfg))),
    }
}
