//! Vehicle link status models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of the vehicle link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No link and no attempt in progress
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Link up, requests accepted
    Connected,
    /// Waiting out the backoff delay after a failed attempt
    Reconnecting,
}

/// Liveness of the vehicle link as seen by all other components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub state: LinkState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Connection attempts that failed since the last successful connect
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<DateTime<Utc>>,
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: LinkState::Disconnected,
            last_error: None,
            consecutive_failures: 0,
            connected_since: None,
        }
    }
}
