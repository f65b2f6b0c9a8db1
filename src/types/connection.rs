//! Connection lifecycle types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection state of the heart rate monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Connecting or connected.
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Why the monitor left (or could not enter) an active connection.
///
/// Carried as the error code of a `Disconnected` event. A user-initiated
/// disconnect carries no error.
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LinkError {
    #[error("heart rate transport unavailable")]
    TransportUnavailable,

    #[error("no RR intervals received before the connect timeout")]
    ConnectTimeout,

    #[error("too many consecutive invalid RR intervals")]
    UnstableLink,

    #[error("connection lost")]
    ConnectionLost,
}
