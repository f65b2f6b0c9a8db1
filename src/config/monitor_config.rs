//! Monitor Configuration - validation, statistics and connection tunables as TOML
//!
//! Each section implements `Default` with the values in `defaults.rs`, so a
//! missing file or a missing key never changes behaviour.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable pointing at a TOML config file.
pub const CONFIG_ENV_VAR: &str = "HEARTWAVE_CONFIG";

/// Config file looked up in the current working directory.
pub const LOCAL_CONFIG_FILE: &str = "heartwave.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a heart rate monitor deployment.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$HEARTWAVE_CONFIG` env var
/// 2. `./heartwave.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Physiological plausibility rules
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Windowed statistics
    #[serde(default)]
    pub statistics: StatisticsConfig,

    /// Coherence zone hysteresis
    #[serde(default)]
    pub coherence: CoherenceConfig,

    /// Connection lifecycle timers and limits
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Last-device persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Simulated sensor used by the CLI and tests
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HEARTWAVE_CONFIG` environment variable
    /// 2. `./heartwave.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded monitor config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded monitor config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only produce warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Monitor config saved");
        Ok(())
    }

    /// Validate all tunables for internal consistency.
    ///
    /// Rules:
    /// - The heart rate range must be positive and non-empty
    /// - The outlier ratio must exceed 1.0
    /// - Windows, timeouts and hit counts must be > 0
    /// - Simulated RR bounds must be ordered and non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let v = &self.validation;
        if v.min_heart_rate_bpm <= 0.0 {
            errors.push(format!(
                "validation.min_heart_rate_bpm ({:.1}) must be > 0",
                v.min_heart_rate_bpm
            ));
        }
        if v.max_heart_rate_bpm <= v.min_heart_rate_bpm {
            errors.push(format!(
                "validation.max_heart_rate_bpm ({:.1}) must be greater than min_heart_rate_bpm ({:.1})",
                v.max_heart_rate_bpm, v.min_heart_rate_bpm
            ));
        }
        if v.outlier_ratio <= 1.0 {
            errors.push(format!(
                "validation.outlier_ratio ({:.2}) must be > 1.0",
                v.outlier_ratio
            ));
        }

        if self.statistics.time_window_ms == 0 {
            errors.push("statistics.time_window_ms must be > 0".to_string());
        }
        if self.coherence.zone_hits == 0 {
            errors.push("coherence.zone_hits must be > 0".to_string());
        }

        let c = &self.connection;
        if c.connect_timeout_ms == 0 {
            errors.push("connection.connect_timeout_ms must be > 0".to_string());
        }
        if c.scan_period_ms == 0 {
            errors.push("connection.scan_period_ms must be > 0".to_string());
        }
        if c.max_rejections_in_a_row == 0 {
            errors.push("connection.max_rejections_in_a_row must be > 0".to_string());
        }

        if self.storage.device_address_key.trim().is_empty() {
            errors.push("storage.device_address_key must not be empty".to_string());
        }

        let s = &self.simulator;
        if s.min_rr_ms == 0 {
            errors.push("simulator.min_rr_ms must be > 0".to_string());
        }
        if s.max_rr_ms < s.min_rr_ms {
            errors.push(format!(
                "simulator.max_rr_ms ({}) must be >= min_rr_ms ({})",
                s.max_rr_ms, s.min_rr_ms
            ));
        }
        if !(0.0..=1.0).contains(&s.glitch_rate) {
            errors.push(format!(
                "simulator.glitch_rate ({:.3}) must be within 0.0-1.0",
                s.glitch_rate
            ));
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Validation Rules
// ============================================================================

/// Plausibility rules applied to every incoming RR interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Beats slower than this are out of range (bpm)
    #[serde(default = "default_min_hr")]
    pub min_heart_rate_bpm: f64,

    /// Beats faster than this are out of range (bpm)
    #[serde(default = "default_max_hr")]
    pub max_heart_rate_bpm: f64,

    /// Beat-to-beat ratio above which a sample is an outlier
    #[serde(default = "default_outlier_ratio")]
    pub outlier_ratio: f64,

    /// Consecutive outliers rejected before one is accepted
    #[serde(default = "default_outlier_tolerance")]
    pub outlier_tolerance: u32,
}

fn default_min_hr() -> f64 { defaults::MIN_HEART_RATE_BPM }
fn default_max_hr() -> f64 { defaults::MAX_HEART_RATE_BPM }
fn default_outlier_ratio() -> f64 { defaults::OUTLIER_RATIO }
fn default_outlier_tolerance() -> u32 { defaults::OUTLIER_TOLERANCE }

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_heart_rate_bpm: default_min_hr(),
            max_heart_rate_bpm: default_max_hr(),
            outlier_ratio: default_outlier_ratio(),
            outlier_tolerance: default_outlier_tolerance(),
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Trailing window for instant statistics (accumulated RR ms)
    #[serde(default = "default_time_window")]
    pub time_window_ms: u64,
}

fn default_time_window() -> u64 { defaults::TIME_WINDOW_MS }

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self { time_window_ms: default_time_window() }
    }
}

// ============================================================================
// Coherence
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceConfig {
    /// Hits a candidate zone needs before it replaces the current zone
    #[serde(default = "default_zone_hits")]
    pub zone_hits: u32,
}

fn default_zone_hits() -> u32 { defaults::ZONE_HITS }

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self { zone_hits: default_zone_hits() }
    }
}

// ============================================================================
// Connection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Deadline for the first accepted sample after connecting (ms)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Automatic scan stop (ms)
    #[serde(default = "default_scan_period")]
    pub scan_period_ms: u64,

    /// Consecutive rejections that force an `UnstableLink` disconnect
    #[serde(default = "default_max_rejections")]
    pub max_rejections_in_a_row: u32,
}

fn default_connect_timeout() -> u64 { defaults::CONNECT_TIMEOUT_MS }
fn default_scan_period() -> u64 { defaults::SCAN_PERIOD_MS }
fn default_max_rejections() -> u32 { defaults::MAX_REJECTIONS_IN_A_ROW }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            scan_period_ms: default_scan_period(),
            max_rejections_in_a_row: default_max_rejections(),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Key holding the last connected device address
    #[serde(default = "default_device_key")]
    pub device_address_key: String,
}

fn default_storage_path() -> PathBuf { PathBuf::from(defaults::STORAGE_PATH) }
fn default_device_key() -> String { defaults::DEVICE_ADDRESS_KEY.to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            device_address_key: default_device_key(),
        }
    }
}

// ============================================================================
// Simulator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Shortest generated RR interval (ms)
    #[serde(default = "default_sim_min_rr")]
    pub min_rr_ms: u16,

    /// Longest generated RR interval (ms)
    #[serde(default = "default_sim_max_rr")]
    pub max_rr_ms: u16,

    /// Fraction of beats replaced by an implausible interval (0.0-1.0)
    #[serde(default)]
    pub glitch_rate: f64,
}

fn default_sim_min_rr() -> u16 { defaults::SIM_MIN_RR_MS }
fn default_sim_max_rr() -> u16 { defaults::SIM_MAX_RR_MS }

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_rr_ms: default_sim_min_rr(),
            max_rr_ms: default_sim_max_rr(),
            glitch_rate: 0.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
