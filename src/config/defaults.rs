//! System-wide default constants.
//!
//! Every tunable in `MonitorConfig` falls back to one of these values, so a
//! monitor built without a config file behaves exactly like the reference
//! device service. Grouped by subsystem.

// ============================================================================
// Sample Validation
// ============================================================================

/// Lowest plausible heart rate (bpm). Slower beats are rejected as out of range.
pub const MIN_HEART_RATE_BPM: f64 = 25.0;

/// Highest plausible heart rate (bpm). Faster beats are rejected as out of range.
pub const MAX_HEART_RATE_BPM: f64 = 190.0;

/// Beat-to-beat heart rate ratio above which a sample counts as an outlier.
///
/// `max(hr, hr_prev) / min(hr, hr_prev) > 1.5`
pub const OUTLIER_RATIO: f64 = 1.5;

/// Number of consecutive outliers rejected before the next one is trusted.
pub const OUTLIER_TOLERANCE: u32 = 3;

// ============================================================================
// Statistics
// ============================================================================

/// Trailing window for "instant" statistics, in accumulated RR milliseconds.
pub const TIME_WINDOW_MS: u64 = 20_000;

/// Milliseconds per minute, the numerator of every bpm conversion.
pub const MS_PER_MINUTE: f64 = 60_000.0;

/// Scale applied to `ln(rmssd)` to produce the HRV score.
pub const HRV_LN_SCALE: f64 = 20.0;

// ============================================================================
// Coherence
// ============================================================================

/// Lower bounds (percent) of the six coherence zones, lowest first.
pub const ZONE_LOWER_BOUNDS: [f64; 6] = [0.0, 20.0, 35.0, 50.0, 65.0, 80.0];

/// Consecutive classifications a candidate zone needs before it is committed.
pub const ZONE_HITS: u32 = 3;

// ============================================================================
// Connection
// ============================================================================

/// Time allowed between `connect` and the first accepted sample (ms).
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Length of a device scan before it is stopped automatically (ms).
pub const SCAN_PERIOD_MS: u64 = 10_000;

/// Consecutive rejected samples (out of range + outliers) that mark the link unstable.
pub const MAX_REJECTIONS_IN_A_ROW: u32 = 5;

/// Capacity of the monitor's command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the transport event channel feeding the monitor.
pub const LINK_CHANNEL_CAPACITY: usize = 256;

/// Per-subscriber event buffer. Subscribers that fall further behind lag.
pub const EVENT_BUS_CAPACITY: usize = 256;

// ============================================================================
// Storage
// ============================================================================

/// Key under which the last connected device address is stored.
pub const DEVICE_ADDRESS_KEY: &str = "heart_rate_device_address_key";

/// Default sled database directory.
pub const STORAGE_PATH: &str = "./data/heartwave";

/// Placeholder shown for device information that has not been read yet.
pub const UNKNOWN_DEVICE_FIELD: &str = "na";

// ============================================================================
// Simulator
// ============================================================================

/// Shortest simulated RR interval (ms).
pub const SIM_MIN_RR_MS: u16 = 900;

/// Longest simulated RR interval (ms).
pub const SIM_MAX_RR_MS: u16 = 1_200;

/// Battery level reported by simulated devices (percent).
pub const SIM_BATTERY_LEVEL: u8 = 87;

/// Interval substituted for a corrupted simulated beat (ms). 250 ms = 240 bpm.
pub const SIM_GLITCH_RR_MS: u16 = 250;
