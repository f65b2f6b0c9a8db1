//! Heart rate sensor transport
//!
//! The monitor never talks to a radio directly. A transport performs
//! discovery, connection and characteristic reads, and reports everything it
//! observes as `TransportEvent`s on a link channel that the monitor drains.
//! `simulated::SimulatedSensor` is the in-process implementation used by the
//! CLI and tests.

pub mod simulated;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::defaults::LINK_CHANNEL_CAPACITY;
use crate::types::DeviceDescriptor;

pub use simulated::SimulatedSensor;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport unavailable")]
    Unavailable,

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Connection error: {0}")]
    ConnectionFailed(String),
}

/// Everything a transport reports to the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Link layer is up with the requested device
    LinkConnected,
    /// Link layer dropped without being asked to
    LinkDisconnected,
    /// Heart Rate Measurement notification
    Measurement {
        payload: Vec<u8>,
        /// Receipt time (monotonic ms, transport clock)
        received_at_ms: u64,
    },
    /// Battery Level characteristic value
    BatteryLevel(Vec<u8>),
    /// Manufacturer Name characteristic value
    Manufacturer(Vec<u8>),
    /// Model Number characteristic value
    Model(Vec<u8>),
    /// Scan result
    DeviceFound(DeviceDescriptor),
}

pub type LinkSender = mpsc::Sender<TransportEvent>;
pub type LinkReceiver = mpsc::Receiver<TransportEvent>;

/// Channel carrying transport events to the monitor.
pub fn link_channel() -> (LinkSender, LinkReceiver) {
    mpsc::channel(LINK_CHANNEL_CAPACITY)
}

/// Central-role operations the monitor needs from a heart rate transport.
///
/// Calls return once the request has been issued. Outcomes (link up, data,
/// scan results) arrive later on the link channel.
#[async_trait]
pub trait HeartRateTransport: Send + Sync {
    /// Whether the underlying adapter can be used at all.
    fn is_available(&self) -> bool;

    /// Start connecting to the device at `address`.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Tear down the current connection, if any.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Begin reporting nearby devices as `DeviceFound`.
    async fn start_scan(&self) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;
}
