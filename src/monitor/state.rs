//! Connection state machine
//!
//! Pure bookkeeping for `Disconnected -> Connecting -> Connected`. Timers,
//! transport calls and notifications live in the actor; this type only says
//! which transitions are legal.

use thiserror::Error;

use crate::types::{ConnectionState, LinkError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot connect while {0}")]
    Busy(ConnectionState),

    #[error("not connected")]
    NotActive,

    #[error("no previously connected device")]
    NoLastAddress,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
    /// Survives disconnects so `reconnect` knows where to go
    address: Option<String>,
    last_error: Option<LinkError>,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn last_error(&self) -> Option<LinkError> {
        self.last_error
    }

    /// Check that a connect attempt may start, without changing state.
    pub fn can_connect(&self) -> Result<(), TransitionError> {
        match self.state {
            ConnectionState::Disconnected => Ok(()),
            busy => Err(TransitionError::Busy(busy)),
        }
    }

    /// `Disconnected -> Connecting`, remembering `address`.
    pub fn begin_connect(&mut self, address: &str) -> Result<(), TransitionError> {
        self.can_connect()?;
        self.state = ConnectionState::Connecting;
        self.address = Some(address.to_string());
        self.last_error = None;
        Ok(())
    }

    /// `Connecting -> Connected`. Returns `false` for a stale or duplicate signal.
    pub fn link_up(&mut self) -> bool {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            true
        } else {
            false
        }
    }

    /// Any active state `-> Disconnected`. Returns the state that was left.
    pub fn close(&mut self, error: Option<LinkError>) -> Result<ConnectionState, TransitionError> {
        if !self.state.is_active() {
            return Err(TransitionError::NotActive);
        }
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        self.last_error = error;
        Ok(previous)
    }

    /// Address to use for `reconnect`.
    pub fn reconnect_address(&self) -> Result<String, TransitionError> {
        self.address.clone().ok_or(TransitionError::NoLastAddress)
    }
}
