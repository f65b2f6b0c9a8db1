//! Simulated heart rate sensor
//!
//! Advertises a fixed set of mock devices and, once connected, streams Heart
//! Rate Measurement records whose RR intervals follow a bounded random walk.
//! A configurable fraction of beats is replaced with an implausible interval
//! to exercise rejection and unstable-link handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{HeartRateTransport, LinkSender, TransportError, TransportEvent};
use crate::acquisition::HrmFrameBuilder;
use crate::config::defaults::{SIM_BATTERY_LEVEL, SIM_GLITCH_RR_MS};
use crate::config::SimulatorConfig;
use crate::types::DeviceDescriptor;

/// Manufacturer string reported by simulated devices.
pub const SIM_MANUFACTURER: &str = "HeartWave Labs";

/// Delay between consecutive scan results.
const SCAN_RESULT_SPACING: Duration = Duration::from_millis(150);

/// Standard deviation of the beat-to-beat RR step (ms).
const RR_STEP_STD_DEV: f64 = 25.0;

/// The devices a simulated scan reports.
pub fn mock_devices() -> Vec<DeviceDescriptor> {
    (1..=4)
        .map(|i| DeviceDescriptor::new(format!("Mock HRM {i}"), format!("00:1A:7D:DA:71:0{i}")))
        .collect()
}

pub struct SimulatedSensor {
    link: LinkSender,
    devices: Vec<DeviceDescriptor>,
    profile: SimulatorConfig,
    epoch: Instant,
    available: AtomicBool,
    session: Mutex<Option<CancellationToken>>,
    scan: Mutex<Option<CancellationToken>>,
}

impl SimulatedSensor {
    pub fn new(link: LinkSender, profile: SimulatorConfig) -> Self {
        Self {
            link,
            devices: mock_devices(),
            profile,
            epoch: Instant::now(),
            available: AtomicBool::new(true),
            session: Mutex::new(None),
            scan: Mutex::new(None),
        }
    }

    /// Simulate the adapter being switched off or on.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

}

/// Store `next` in `slot`, cancelling whatever task the old token guarded.
fn replace_token(slot: &Mutex<Option<CancellationToken>>, next: Option<CancellationToken>) {
    let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = current.take() {
        previous.cancel();
    }
    *current = next;
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        replace_token(&self.session, None);
        replace_token(&self.scan, None);
    }
}

#[async_trait]
impl HeartRateTransport for SimulatedSensor {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        if !self.is_available() {
            return Err(TransportError::Unavailable);
        }
        let device = self
            .devices
            .iter()
            .find(|d| d.address == address)
            .cloned()
            .ok_or_else(|| TransportError::UnknownDevice(address.to_string()))?;

        let token = CancellationToken::new();
        replace_token(&self.session, Some(token.clone()));

        info!(device = %device, "Simulated sensor connecting");
        tokio::spawn(stream_beats(
            self.link.clone(),
            device,
            self.profile.clone(),
            self.epoch,
            token,
        ));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        replace_token(&self.session, None);
        Ok(())
    }

    async fn start_scan(&self) -> Result<(), TransportError> {
        if !self.is_available() {
            return Err(TransportError::Unavailable);
        }
        let token = CancellationToken::new();
        replace_token(&self.scan, Some(token.clone()));

        let link = self.link.clone();
        let devices = self.devices.clone();
        tokio::spawn(async move {
            for device in devices {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(SCAN_RESULT_SPACING) => {}
                }
                if link.send(TransportEvent::DeviceFound(device)).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        replace_token(&self.scan, None);
        Ok(())
    }
}

/// Bounded random walk over RR intervals.
struct RrGenerator {
    rng: StdRng,
    current: f64,
    min: f64,
    max: f64,
    glitch_rate: f64,
}

impl RrGenerator {
    fn new(profile: &SimulatorConfig) -> Self {
        let min = f64::from(profile.min_rr_ms);
        let max = f64::from(profile.max_rr_ms.max(profile.min_rr_ms));
        let mut rng = StdRng::from_entropy();
        let current = rng.gen_range(min..=max);
        Self {
            rng,
            current,
            min,
            max,
            glitch_rate: profile.glitch_rate,
        }
    }

    /// Next (real beat length, reported RR) pair in ms.
    fn next(&mut self) -> (u16, u16) {
        let z: f64 = self.rng.sample(StandardNormal);
        self.current = (self.current + z * RR_STEP_STD_DEV).clamp(self.min, self.max);
        let beat = self.current.round() as u16;
        let reported = if self.rng.gen::<f64>() < self.glitch_rate {
            SIM_GLITCH_RR_MS
        } else {
            beat
        };
        (beat, reported)
    }
}

async fn stream_beats(
    link: LinkSender,
    device: DeviceDescriptor,
    profile: SimulatorConfig,
    epoch: Instant,
    token: CancellationToken,
) {
    let greeting = [
        TransportEvent::LinkConnected,
        TransportEvent::BatteryLevel(vec![SIM_BATTERY_LEVEL]),
        TransportEvent::Manufacturer(SIM_MANUFACTURER.as_bytes().to_vec()),
        TransportEvent::Model(device.display_name().as_bytes().to_vec()),
    ];
    for event in greeting {
        if token.is_cancelled() || link.send(event).await.is_err() {
            return;
        }
    }

    let mut generator = RrGenerator::new(&profile);
    loop {
        let (beat, reported) = generator.next();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(u64::from(beat))) => {}
        }

        let heart_rate = 60_000 / reported.max(1);
        let payload = HrmFrameBuilder::new(heart_rate)
            .sensor_contact(true)
            .rr_interval(reported)
            .build();
        let received_at_ms = u64::try_from(epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        let event = TransportEvent::Measurement {
            payload,
            received_at_ms,
        };
        if link.send(event).await.is_err() {
            break;
        }
    }
    debug!(device = %device.address, "Simulated beat stream stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::decode_rr_intervals;
    use crate::transport::link_channel;

    #[tokio::test(start_paused = true)]
    async fn test_scan_reports_all_devices() {
        let (tx, mut rx) = link_channel();
        let sensor = SimulatedSensor::new(tx, SimulatorConfig::default());
        sensor.start_scan().await.unwrap();

        let mut found = Vec::new();
        for _ in 0..4 {
            match rx.recv().await {
                Some(TransportEvent::DeviceFound(d)) => found.push(d),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(found, mock_devices());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_streams_measurements() {
        let (tx, mut rx) = link_channel();
        let sensor = SimulatedSensor::new(tx, SimulatorConfig::default());
        let address = mock_devices()[0].address.clone();
        sensor.connect(&address).await.unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::LinkConnected));
        assert_eq!(rx.recv().await, Some(TransportEvent::BatteryLevel(vec![SIM_BATTERY_LEVEL])));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Manufacturer(_))));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Model(_))));

        for _ in 0..5 {
            match rx.recv().await {
                Some(TransportEvent::Measurement { payload, .. }) => {
                    let rr = decode_rr_intervals(&payload).unwrap();
                    assert_eq!(rr.len(), 1);
                    assert!((900..=1200).contains(&rr[0]), "rr {} out of profile", rr[0]);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_stream() {
        let (tx, mut rx) = link_channel();
        let sensor = SimulatedSensor::new(tx, SimulatorConfig::default());
        sensor.connect(&mock_devices()[1].address).await.unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::LinkConnected));
        sensor.disconnect().await.unwrap();

        // drain anything sent before the cancellation landed
        tokio::time::sleep(Duration::from_secs(5)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_scan_ends_discovery() {
        let (tx, mut rx) = link_channel();
        let sensor = SimulatedSensor::new(tx, SimulatorConfig::default());
        sensor.start_scan().await.unwrap();
        assert!(matches!(rx.recv().await, Some(TransportEvent::DeviceFound(_))));

        sensor.stop_scan().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarted_scan_replaces_previous() {
        let (tx, mut rx) = link_channel();
        let sensor = SimulatedSensor::new(tx, SimulatorConfig::default());
        sensor.start_scan().await.unwrap();
        sensor.start_scan().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        let mut found = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, TransportEvent::DeviceFound(_)));
            found += 1;
        }
        assert_eq!(found, mock_devices().len());
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let (tx, _rx) = link_channel();
        let sensor = SimulatedSensor::new(tx, SimulatorConfig::default());
        assert_eq!(
            sensor.connect("FF:FF").await,
            Err(TransportError::UnknownDevice("FF:FF".into()))
        );
    }

    #[tokio::test]
    async fn test_unavailable_adapter() {
        let (tx, _rx) = link_channel();
        let sensor = SimulatedSensor::new(tx, SimulatorConfig::default());
        sensor.set_available(false);
        assert!(!sensor.is_available());
        assert_eq!(sensor.start_scan().await, Err(TransportError::Unavailable));
    }

    #[test]
    fn test_glitches_replace_reported_interval() {
        let profile = SimulatorConfig {
            glitch_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let mut generator = RrGenerator::new(&profile);
        for _ in 0..20 {
            let (beat, reported) = generator.next();
            assert!((900..=1200).contains(&beat));
            assert_eq!(reported, SIM_GLITCH_RR_MS);
        }
    }
}
