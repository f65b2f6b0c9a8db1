//! HeartWave: real-time heart rate variability and coherence
//!
//! Pipeline from BLE Heart Rate Measurement records to live statistics.
//!
//! ## Architecture
//!
//! - **Acquisition**: Heart Rate Measurement decoding and RR timestamping
//! - **Stream**: validation, rejection counters and windowed statistics
//! - **Coherence**: zone classification with hysteresis
//! - **Monitor**: connection state machine, timeouts and event bus
//! - **Transport / Storage**: sensor link and last-device persistence

pub mod acquisition;
pub mod coherence;
pub mod config;
pub mod monitor;
pub mod storage;
pub mod stream;
pub mod transport;
pub mod types;

// Re-export configuration
pub use config::MonitorConfig;

// Re-export commonly used types
pub use types::{ConnectionState, DeviceDescriptor, DeviceInfo, LinkError, RrSample};

// Re-export the pipeline
pub use coherence::{CoherenceZone, ZoneChange, ZoneClassifier};
pub use monitor::{HeartRateMonitor, MonitorEvent, MonitorHandle, MonitorStatus};
pub use storage::{DeviceStore, InMemoryDeviceStore, SledDeviceStore, StorageError};
pub use stream::{AddOutcome, HeartRateRange, SampleStream, Scope, StreamSnapshot};
pub use transport::{HeartRateTransport, SimulatedSensor, TransportError, TransportEvent};
