//! Heart Rate Monitor Actor - owns the sample stream and the connection lifecycle
//!
//! A single task serializes everything that touches monitor state:
//! - commands from `MonitorHandle`s
//! - transport events from the link channel
//! - the connect / first-data deadline and the scan deadline
//!
//! Deadlines are plain `Option<Instant>` fields. Cancelling one is clearing
//! the field inside this task, so a deadline can never fire after the action
//! that cancelled it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{EventBus, MonitorEvent};
use super::state::ConnectionMachine;
use crate::acquisition::{
    decode_battery_level, decode_heart_rate, decode_measurement, decode_utf8_characteristic,
};
use crate::config::defaults::{COMMAND_CHANNEL_CAPACITY, EVENT_BUS_CAPACITY};
use crate::config::MonitorConfig;
use crate::storage::DeviceStore;
use crate::stream::{AddOutcome, HeartRateRange, SampleStream, StreamSnapshot};
use crate::transport::{HeartRateTransport, LinkReceiver, TransportEvent};
use crate::types::{ConnectionState, DeviceInfo, LinkError, RrSample};

// ============================================================================
// Commands
// ============================================================================

/// Commands for HeartRateMonitor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Check the transport and reconnect to the stored device, if any
    Initialize {
        response_tx: oneshot::Sender<Result<Option<String>, LinkError>>,
    },
    Connect {
        address: String,
        response_tx: oneshot::Sender<bool>,
    },
    Reconnect {
        response_tx: oneshot::Sender<bool>,
    },
    Disconnect {
        response_tx: oneshot::Sender<bool>,
    },
    StartScan {
        response_tx: oneshot::Sender<bool>,
    },
    StopScan {
        response_tx: oneshot::Sender<bool>,
    },
    GetSnapshot {
        response_tx: oneshot::Sender<StreamSnapshot>,
    },
    GetSamples {
        response_tx: oneshot::Sender<Vec<RrSample>>,
    },
    GetHeartRateSeries {
        response_tx: oneshot::Sender<Vec<(u64, f64)>>,
    },
    GetHeartRateRange {
        begin_ms: u64,
        end_ms: u64,
        response_tx: oneshot::Sender<Option<HeartRateRange>>,
    },
    GetStatus {
        response_tx: oneshot::Sender<MonitorStatus>,
    },
}

/// Connection-side view of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub state: ConnectionState,
    pub address: Option<String>,
    pub last_error: Option<LinkError>,
    pub scanning: bool,
    pub device: DeviceInfo,
}

// ============================================================================
// Actor Handle
// ============================================================================

/// Handle to interact with HeartRateMonitor
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<MonitorCommand>,
    events: EventBus,
}

impl MonitorHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(command(response_tx))
            .await
            .context("Heart rate monitor channel closed")?;
        response_rx.await.context("Response channel closed")
    }

    /// Subscribe to status and metric events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Verify the transport and auto-connect to the stored device.
    ///
    /// Returns the stored address, if there was one. Fails with
    /// `LinkError::TransportUnavailable` when the transport cannot be used.
    pub async fn initialize(&self) -> Result<Option<String>> {
        let outcome = self
            .request(|response_tx| MonitorCommand::Initialize { response_tx })
            .await?;
        Ok(outcome?)
    }

    /// Start connecting to `address`. `false` if the attempt could not start.
    pub async fn connect(&self, address: impl Into<String>) -> Result<bool> {
        let address = address.into();
        self.request(|response_tx| MonitorCommand::Connect { address, response_tx })
            .await
    }

    /// Connect again to the last device.
    pub async fn reconnect(&self) -> Result<bool> {
        self.request(|response_tx| MonitorCommand::Reconnect { response_tx })
            .await
    }

    pub async fn disconnect(&self) -> Result<bool> {
        self.request(|response_tx| MonitorCommand::Disconnect { response_tx })
            .await
    }

    pub async fn start_scan(&self) -> Result<bool> {
        self.request(|response_tx| MonitorCommand::StartScan { response_tx })
            .await
    }

    pub async fn stop_scan(&self) -> Result<bool> {
        self.request(|response_tx| MonitorCommand::StopScan { response_tx })
            .await
    }

    pub async fn snapshot(&self) -> Result<StreamSnapshot> {
        self.request(|response_tx| MonitorCommand::GetSnapshot { response_tx })
            .await
    }

    pub async fn samples(&self) -> Result<Vec<RrSample>> {
        self.request(|response_tx| MonitorCommand::GetSamples { response_tx })
            .await
    }

    pub async fn heart_rate_series(&self) -> Result<Vec<(u64, f64)>> {
        self.request(|response_tx| MonitorCommand::GetHeartRateSeries { response_tx })
            .await
    }

    /// Heart rate extrema strictly between two timestamps.
    pub async fn heart_rate_range(&self, begin_ms: u64, end_ms: u64) -> Result<Option<HeartRateRange>> {
        self.request(|response_tx| MonitorCommand::GetHeartRateRange {
            begin_ms,
            end_ms,
            response_tx,
        })
        .await
    }

    pub async fn status(&self) -> Result<MonitorStatus> {
        self.request(|response_tx| MonitorCommand::GetStatus { response_tx })
            .await
    }
}

// ============================================================================
// Heart Rate Monitor
// ============================================================================

#[derive(Debug, Clone)]
struct Settings {
    connect_timeout: Duration,
    scan_period: Duration,
    max_rejections_in_a_row: u32,
    address_key: String,
}

impl Settings {
    fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(cfg.connection.connect_timeout_ms),
            scan_period: Duration::from_millis(cfg.connection.scan_period_ms),
            max_rejections_in_a_row: cfg.connection.max_rejections_in_a_row,
            address_key: cfg.storage.device_address_key.clone(),
        }
    }
}

/// Heart rate monitor - connection state machine wrapped around a `SampleStream`
pub struct HeartRateMonitor {
    transport: Arc<dyn HeartRateTransport>,
    store: Arc<dyn DeviceStore>,
    settings: Settings,
    /// Command receiver
    rx: mpsc::Receiver<MonitorCommand>,
    /// Transport events
    link: LinkReceiver,
    link_open: bool,
    events: EventBus,
    stream: SampleStream,
    machine: ConnectionMachine,
    device: DeviceInfo,
    scanning: bool,
    /// Pending connect / first-data timeout
    connect_deadline: Option<Instant>,
    scan_deadline: Option<Instant>,
}

impl HeartRateMonitor {
    /// Create new monitor and handle
    pub fn new(
        transport: Arc<dyn HeartRateTransport>,
        link: LinkReceiver,
        store: Arc<dyn DeviceStore>,
        config: &MonitorConfig,
    ) -> (Self, MonitorHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let events = EventBus::new(EVENT_BUS_CAPACITY);

        let monitor = Self {
            transport,
            store,
            settings: Settings::from_config(config),
            rx,
            link,
            link_open: true,
            events: events.clone(),
            stream: SampleStream::with_config(config),
            machine: ConnectionMachine::new(),
            device: DeviceInfo::default(),
            scanning: false,
            connect_deadline: None,
            scan_deadline: None,
        };

        (monitor, MonitorHandle { tx, events })
    }

    /// Run the monitor loop until `shutdown` fires or every handle is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(store = self.store.backend_name(), "HeartRateMonitor starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                event = self.link.recv(), if self.link_open => match event {
                    Some(event) => self.handle_link_event(event).await,
                    None => self.on_link_closed().await,
                },

                () = wait_until(self.connect_deadline) => self.on_connect_timeout().await,

                () = wait_until(self.scan_deadline) => {
                    self.stop_scan().await;
                }
            }
        }

        if self.machine.state().is_active() {
            self.close(None).await;
        }
        info!("HeartRateMonitor stopped");
    }

    async fn handle_command(&mut self, cmd: MonitorCommand) {
        match cmd {
            MonitorCommand::Initialize { response_tx } => {
                let result = self.initialize().await;
                let _ = response_tx.send(result);
            }
            MonitorCommand::Connect { address, response_tx } => {
                let ok = self.connect(address).await;
                let _ = response_tx.send(ok);
            }
            MonitorCommand::Reconnect { response_tx } => {
                let ok = self.reconnect().await;
                let _ = response_tx.send(ok);
            }
            MonitorCommand::Disconnect { response_tx } => {
                let ok = self.close(None).await;
                let _ = response_tx.send(ok);
            }
            MonitorCommand::StartScan { response_tx } => {
                let ok = self.start_scan().await;
                let _ = response_tx.send(ok);
            }
            MonitorCommand::StopScan { response_tx } => {
                let ok = self.stop_scan().await;
                let _ = response_tx.send(ok);
            }
            MonitorCommand::GetSnapshot { response_tx } => {
                let _ = response_tx.send(self.stream.snapshot());
            }
            MonitorCommand::GetSamples { response_tx } => {
                let _ = response_tx.send(self.stream.samples().to_vec());
            }
            MonitorCommand::GetHeartRateSeries { response_tx } => {
                let _ = response_tx.send(self.stream.heart_rate_series());
            }
            MonitorCommand::GetHeartRateRange {
                begin_ms,
                end_ms,
                response_tx,
            } => {
                let _ = response_tx.send(self.stream.heart_rate_range(begin_ms, end_ms));
            }
            MonitorCommand::GetStatus { response_tx } => {
                let _ = response_tx.send(self.status());
            }
        }
    }

    fn status(&self) -> MonitorStatus {
        MonitorStatus {
            state: self.machine.state(),
            address: self.machine.address().map(str::to_string),
            last_error: self.machine.last_error(),
            scanning: self.scanning,
            device: self.device.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    async fn initialize(&mut self) -> Result<Option<String>, LinkError> {
        if !self.transport.is_available() {
            error!("Heart rate transport unavailable");
            return Err(LinkError::TransportUnavailable);
        }

        let stored = self.stored_address();
        if let Some(address) = &stored {
            if self.machine.can_connect().is_ok() {
                info!(address = %address, "Reconnecting to stored heart rate device");
                self.connect(address.clone()).await;
            }
        }
        Ok(stored)
    }

    async fn connect(&mut self, address: String) -> bool {
        if !self.transport.is_available() {
            warn!(address = %address, "Connect refused: transport unavailable");
            return false;
        }
        if let Err(e) = self.machine.can_connect() {
            warn!(address = %address, error = %e, "Connect refused");
            return false;
        }
        if let Err(e) = self.transport.connect(&address).await {
            warn!(address = %address, error = %e, "Transport could not start connection");
            return false;
        }
        if let Err(e) = self.machine.begin_connect(&address) {
            warn!(address = %address, error = %e, "Connect refused");
            return false;
        }

        self.persist_address(&address);
        self.connect_deadline = Some(Instant::now() + self.settings.connect_timeout);
        info!(address = %address, "Connecting to heart rate device");
        self.events.publish(MonitorEvent::Connecting { address });
        true
    }

    async fn reconnect(&mut self) -> bool {
        let address = match self.machine.reconnect_address() {
            Ok(address) => Some(address),
            Err(_) => self.stored_address(),
        };
        match address {
            Some(address) => self.connect(address).await,
            None => {
                warn!("Reconnect requested with no previously connected device");
                false
            }
        }
    }

    /// Leave any active state. Returns `false` when already disconnected.
    async fn close(&mut self, error: Option<LinkError>) -> bool {
        if self.machine.close(error).is_err() {
            return false;
        }
        self.connect_deadline = None;

        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Transport disconnect failed");
        }
        self.device.clear();
        self.stream.clear();

        match error {
            Some(e) => warn!(error = %e, "Heart rate device disconnected"),
            None => info!("Heart rate device disconnected"),
        }
        self.events.publish(MonitorEvent::Disconnected { error });
        true
    }

    async fn on_connect_timeout(&mut self) {
        self.connect_deadline = None;
        if self.machine.state().is_active() {
            warn!(
                timeout_ms = duration_ms(self.settings.connect_timeout),
                "No RR intervals received in time"
            );
            self.close(Some(LinkError::ConnectTimeout)).await;
        }
    }

    async fn on_link_closed(&mut self) {
        warn!("Transport link channel closed");
        self.link_open = false;
        if self.machine.state().is_active() {
            self.close(Some(LinkError::ConnectionLost)).await;
        }
    }

    fn stored_address(&self) -> Option<String> {
        match self.store.get(&self.settings.address_key) {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Failed to read stored device address");
                None
            }
        }
    }

    fn persist_address(&self, address: &str) {
        if let Err(e) = self.store.put(&self.settings.address_key, address) {
            warn!(address = %address, error = %e, "Failed to store device address");
        }
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    async fn start_scan(&mut self) -> bool {
        if !self.transport.is_available() {
            warn!("Scan refused: transport unavailable");
            return false;
        }
        if let Err(e) = self.transport.start_scan().await {
            warn!(error = %e, "Scan failed to start");
            return false;
        }
        self.scanning = true;
        self.scan_deadline = Some(Instant::now() + self.settings.scan_period);
        info!(period_ms = duration_ms(self.settings.scan_period), "Scanning for heart rate devices");
        true
    }

    async fn stop_scan(&mut self) -> bool {
        self.scan_deadline = None;
        if !self.scanning {
            return false;
        }
        self.scanning = false;
        if let Err(e) = self.transport.stop_scan().await {
            warn!(error = %e, "Scan failed to stop cleanly");
        }
        info!("Scan stopped");
        self.events.publish(MonitorEvent::ScanStopped);
        true
    }

    // ------------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------------

    async fn handle_link_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LinkConnected => self.on_link_connected(),
            TransportEvent::LinkDisconnected => {
                if self.machine.state().is_active() {
                    self.close(Some(LinkError::ConnectionLost)).await;
                } else {
                    debug!("Ignoring link-disconnected while already disconnected");
                }
            }
            TransportEvent::Measurement {
                payload,
                received_at_ms,
            } => self.on_measurement(&payload, received_at_ms).await,
            TransportEvent::BatteryLevel(value) => self.on_battery_level(&value),
            TransportEvent::Manufacturer(value) => {
                self.on_device_string(&value, |info, s| info.manufacturer = Some(s));
            }
            TransportEvent::Model(value) => {
                self.on_device_string(&value, |info, s| info.model = Some(s));
            }
            TransportEvent::DeviceFound(device) => {
                if self.scanning {
                    debug!(device = %device, "Heart rate device found");
                    self.events.publish(MonitorEvent::DeviceFound { device });
                }
            }
        }
    }

    fn on_link_connected(&mut self) {
        if !self.machine.link_up() {
            debug!(state = %self.machine.state(), "Ignoring stale link-connected signal");
            return;
        }
        // the connect deadline keeps running until the first accepted sample
        self.stream.clear();

        let address = self.machine.address().unwrap_or_default().to_string();
        info!(address = %address, "Heart rate device connected");
        self.events.publish(MonitorEvent::Connected { address });
    }

    async fn on_measurement(&mut self, payload: &[u8], received_at_ms: u64) {
        if !self.machine.state().is_active() {
            debug!("Ignoring measurement while disconnected");
            return;
        }
        match decode_measurement(payload, received_at_ms) {
            Ok(candidates) if candidates.is_empty() => {
                debug!(
                    heart_rate = ?decode_heart_rate(payload).ok(),
                    "Measurement carried no RR intervals"
                );
            }
            Ok(candidates) => self.ingest(candidates).await,
            Err(e) => warn!(error = %e, len = payload.len(), "Dropping malformed heart rate measurement"),
        }
    }

    /// Feed one packet's candidates through the stream.
    async fn ingest(&mut self, candidates: Vec<RrSample>) {
        let mut added = 0usize;
        let mut dropped = 0usize;

        for candidate in candidates {
            match self.stream.push(candidate) {
                AddOutcome::Accepted { zone_change } => {
                    added += 1;
                    self.connect_deadline = None;
                    if let Some(change) = zone_change {
                        info!(from = %change.from, to = %change.to, "Coherence zone changed");
                        self.events.publish(MonitorEvent::ZoneChanged {
                            from: change.from,
                            to: change.to,
                        });
                    }
                }
                AddOutcome::Rejected(_) => dropped += 1,
            }

            let run = self.stream.rejections_in_a_row();
            if run >= self.settings.max_rejections_in_a_row {
                warn!(
                    out_of_range = self.stream.out_of_range_in_a_row(),
                    outliers = self.stream.outliers_in_a_row(),
                    "Too many invalid RR intervals in a row"
                );
                self.close(Some(LinkError::UnstableLink)).await;
                return;
            }
        }

        if dropped > 0 {
            self.events.publish(MonitorEvent::SamplesDropped { count: dropped });
        }
        if added > 0 {
            self.events.publish(MonitorEvent::NewSamples {
                added,
                snapshot: self.stream.snapshot(),
            });
        }
    }

    fn on_battery_level(&mut self, value: &[u8]) {
        match decode_battery_level(value) {
            Ok(level) => {
                if self.device.battery_level != Some(level) {
                    self.device.battery_level = Some(level);
                    debug!(level, "Battery level");
                    self.events.publish(MonitorEvent::BatteryLevelChanged { level });
                }
            }
            Err(e) => warn!(error = %e, "Invalid battery level value"),
        }
    }

    fn on_device_string(&mut self, value: &[u8], apply: impl FnOnce(&mut DeviceInfo, String)) {
        match decode_utf8_characteristic(value) {
            Ok(text) => {
                apply(&mut self.device, text);
                self.events.publish(MonitorEvent::DeviceInfoChanged {
                    info: self.device.clone(),
                });
            }
            Err(e) => warn!(error = %e, "Invalid device information value"),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(10_000)), 10_000);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
