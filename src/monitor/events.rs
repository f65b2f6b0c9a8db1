//! Monitor events and the subscriber bus.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::coherence::CoherenceZone;
use crate::stream::StreamSnapshot;
use crate::types::{DeviceDescriptor, DeviceInfo, LinkError};

/// Status and metric changes published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Connecting {
        address: String,
    },
    Connected {
        address: String,
    },
    /// `error` is `None` for a requested disconnect
    Disconnected {
        error: Option<LinkError>,
    },
    NewSamples {
        added: usize,
        snapshot: StreamSnapshot,
    },
    SamplesDropped {
        count: usize,
    },
    ZoneChanged {
        from: CoherenceZone,
        to: CoherenceZone,
    },
    BatteryLevelChanged {
        level: u8,
    },
    DeviceInfoChanged {
        info: DeviceInfo,
    },
    DeviceFound {
        device: DeviceDescriptor,
    },
    ScanStopped,
}

/// Fan-out of `MonitorEvent`s.
///
/// Publishing never blocks. Each subscriber sees events in publish order; one
/// that falls more than the bus capacity behind receives
/// `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: MonitorEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
