//! Sensor identity and device information

use serde::{Deserialize, Serialize};

use crate::config::defaults::UNKNOWN_DEVICE_FIELD;

/// A sensor reported by the transport during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: Option<String>,
    pub address: String,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Name for display, falling back to the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Battery and identification read from the connected sensor.
///
/// Every field is `None` until the corresponding characteristic has been
/// read, and everything is cleared on disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Battery level (percent)
    pub battery_level: Option<u8>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl DeviceInfo {
    pub fn manufacturer_or_unknown(&self) -> &str {
        self.manufacturer.as_deref().unwrap_or(UNKNOWN_DEVICE_FIELD)
    }

    pub fn model_or_unknown(&self) -> &str {
        self.model.as_deref().unwrap_or(UNKNOWN_DEVICE_FIELD)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
