//! Monitor Configuration Module
//!
//! Provides validation, statistics and connection tunables loaded from TOML,
//! replacing the fixed constants of the device service.
//!
//! ## Loading Order
//!
//! 1. `HEARTWAVE_CONFIG` environment variable (path to TOML file)
//! 2. `heartwave.toml` in the current working directory
//! 3. Built-in defaults (see `defaults.rs`)
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(MonitorConfig::load());
//!
//! // Anywhere in the codebase:
//! let window = config::get().statistics.time_window_ms;
//! ```

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;

use std::sync::OnceLock;

/// Global monitor configuration, initialized once at startup.
static MONITOR_CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

/// Built-in defaults handed out when `init()` was never called.
static DEFAULT_CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

/// Initialize the global monitor configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: MonitorConfig) {
    if MONITOR_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global monitor configuration.
///
/// Falls back to `MonitorConfig::default()` before `init()` so library users
/// and unit tests never need a config file.
pub fn get() -> &'static MonitorConfig {
    MONITOR_CONFIG
        .get()
        .unwrap_or_else(|| DEFAULT_CONFIG.get_or_init(MonitorConfig::default))
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    MONITOR_CONFIG.get().is_some()
}
