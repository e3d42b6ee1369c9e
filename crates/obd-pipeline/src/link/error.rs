//! Vehicle link errors

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Adapter answered but no ECU responded to the parameter
    #[error("No data")]
    NoData,

    #[error("Link not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LinkError {
    /// Whether the error means the physical link is gone
    pub fn is_link_loss(&self) -> bool {
        matches!(self, LinkError::Closed | LinkError::Io(_))
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => LinkError::Closed,
            _ => LinkError::Io(err.to_string()),
        }
    }
}
