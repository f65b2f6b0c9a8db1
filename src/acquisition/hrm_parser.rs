//! Heart Rate Measurement Parser
//!
//! Decodes the BLE Heart Rate Measurement characteristic (0x2A37):
//!
//! ```text
//! [flags][hr:u8 | hr:u16le][energy:u16le]?[rr:u16le]*
//! ```
//!
//! Flags:
//! - bit 0 (0x01): heart rate value is 16 bit
//! - bit 1 (0x02): sensor contact detected
//! - bit 2 (0x04): sensor contact feature supported
//! - bit 3 (0x08): energy expended field present
//! - bit 4 (0x10): RR intervals present
//!
//! RR values are read as milliseconds, in transmission order, so the most
//! recently elapsed interval is last. Also decodes the battery level (0x2A19)
//! and the UTF-8 device information strings (0x2A29, 0x2A24).

use thiserror::Error;

use crate::types::RrSample;

/// Measurement flag bits
pub mod flags {
    pub const HEART_RATE_U16: u8 = 0x01;
    pub const SENSOR_CONTACT_DETECTED: u8 = 0x02;
    pub const SENSOR_CONTACT_SUPPORTED: u8 = 0x04;
    pub const ENERGY_EXPENDED_PRESENT: u8 = 0x08;
    pub const RR_INTERVAL_PRESENT: u8 = 0x10;
}

/// Upper bound on RR values read from one record.
pub const MAX_RR_INTERVALS: usize = 9;

/// Measurement decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty characteristic value")]
    Empty,

    #[error("malformed record: {field} needs {needed} bytes, record has {len}")]
    MalformedRecord {
        field: &'static str,
        needed: usize,
        len: usize,
    },
}

/// A fully decoded Heart Rate Measurement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartRateMeasurement {
    pub heart_rate_bpm: u16,
    /// `None` when the sensor does not support contact detection
    pub sensor_contact: Option<bool>,
    /// Accumulated energy (kJ)
    pub energy_expended_kj: Option<u16>,
    pub rr_intervals: Vec<u16>,
}

impl HeartRateMeasurement {
    pub fn parse(record: &[u8]) -> Result<Self, DecodeError> {
        let Some(&flag_byte) = record.first() else {
            return Err(DecodeError::Empty);
        };

        let wide = flag_byte & flags::HEART_RATE_U16 != 0;
        let heart_rate_bpm = if wide {
            read_u16(record, 1, "16-bit heart rate")?
        } else {
            u16::from(*record.get(1).ok_or(DecodeError::MalformedRecord {
                field: "8-bit heart rate",
                needed: 2,
                len: record.len(),
            })?)
        };

        let mut offset = if wide { 3 } else { 2 };

        let energy_expended_kj = if flag_byte & flags::ENERGY_EXPENDED_PRESENT != 0 {
            let energy = read_u16(record, offset, "energy expended")?;
            offset += 2;
            Some(energy)
        } else {
            None
        };

        let sensor_contact = (flag_byte & flags::SENSOR_CONTACT_SUPPORTED != 0)
            .then_some(flag_byte & flags::SENSOR_CONTACT_DETECTED != 0);

        let rr_intervals = if flag_byte & flags::RR_INTERVAL_PRESENT != 0 {
            record
                .get(offset..)
                .unwrap_or_default()
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|&rr| rr != 0)
                .take(MAX_RR_INTERVALS)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            heart_rate_bpm,
            sensor_contact,
            energy_expended_kj,
            rr_intervals,
        })
    }
}

fn read_u16(record: &[u8], offset: usize, field: &'static str) -> Result<u16, DecodeError> {
    record
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(DecodeError::MalformedRecord {
            field,
            needed: offset + 2,
            len: record.len(),
        })
}

/// Decode the RR intervals of a measurement record.
///
/// Returns an empty list when the RR-present flag is clear.
pub fn decode_rr_intervals(record: &[u8]) -> Result<Vec<u16>, DecodeError> {
    HeartRateMeasurement::parse(record).map(|m| m.rr_intervals)
}

/// Decode the sensor's own heart rate value (bpm).
pub fn decode_heart_rate(record: &[u8]) -> Result<u16, DecodeError> {
    HeartRateMeasurement::parse(record).map(|m| m.heart_rate_bpm)
}

/// Reconstruct per-beat timestamps from the receipt time of a record.
///
/// The last interval ends at `received_at_ms`; each earlier beat ends one
/// later interval before the next: `ts[i] = ts[i+1] - d[i+1]`.
pub fn assign_timestamps(received_at_ms: u64, intervals: &[u16]) -> Vec<u64> {
    let mut timestamps = vec![0; intervals.len()];
    let mut t = received_at_ms;
    for (i, interval) in intervals.iter().enumerate().rev() {
        timestamps[i] = t;
        t = t.saturating_sub(u64::from(*interval));
    }
    timestamps
}

/// Decode a record into unvalidated, timestamped sample candidates.
pub fn decode_measurement(record: &[u8], received_at_ms: u64) -> Result<Vec<RrSample>, DecodeError> {
    let intervals = decode_rr_intervals(record)?;
    let timestamps = assign_timestamps(received_at_ms, &intervals);
    Ok(timestamps
        .into_iter()
        .zip(intervals)
        .map(|(ts, rr)| RrSample::new(ts, u32::from(rr)))
        .collect())
}

/// Decode the Battery Level characteristic (percent, clamped to 100).
pub fn decode_battery_level(value: &[u8]) -> Result<u8, DecodeError> {
    value
        .first()
        .map(|&level| level.min(100))
        .ok_or(DecodeError::Empty)
}

/// Decode a UTF-8 device information string (manufacturer, model).
pub fn decode_utf8_characteristic(value: &[u8]) -> Result<String, DecodeError> {
    if value.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(String::from_utf8_lossy(value)
        .trim_end_matches('\0')
        .trim()
        .to_string())
}

/// Heart Rate Measurement record builder (for testing/simulation)
pub struct HrmFrameBuilder {
    heart_rate: u16,
    wide: bool,
    sensor_contact: Option<bool>,
    energy_expended: Option<u16>,
    rr_intervals: Vec<u16>,
}

impl HrmFrameBuilder {
    pub fn new(heart_rate: u16) -> Self {
        Self {
            heart_rate,
            wide: heart_rate > u16::from(u8::MAX),
            sensor_contact: None,
            energy_expended: None,
            rr_intervals: Vec::new(),
        }
    }

    pub fn wide_heart_rate(&mut self) -> &mut Self {
        self.wide = true;
        self
    }

    pub fn sensor_contact(&mut self, detected: bool) -> &mut Self {
        self.sensor_contact = Some(detected);
        self
    }

    pub fn energy_expended(&mut self, kj: u16) -> &mut Self {
        self.energy_expended = Some(kj);
        self
    }

    pub fn rr_interval(&mut self, ms: u16) -> &mut Self {
        self.rr_intervals.push(ms);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut flag_byte = 0u8;
        if self.wide {
            flag_byte |= flags::HEART_RATE_U16;
        }
        if let Some(detected) = self.sensor_contact {
            flag_byte |= flags::SENSOR_CONTACT_SUPPORTED;
            if detected {
                flag_byte |= flags::SENSOR_CONTACT_DETECTED;
            }
        }
        if self.energy_expended.is_some() {
            flag_byte |= flags::ENERGY_EXPENDED_PRESENT;
        }
        if !self.rr_intervals.is_empty() {
            flag_byte |= flags::RR_INTERVAL_PRESENT;
        }

        let mut record = vec![flag_byte];
        if self.wide {
            record.extend_from_slice(&self.heart_rate.to_le_bytes());
        } else {
            record.push(u8::try_from(self.heart_rate).unwrap_or(u8::MAX));
        }
        if let Some(kj) = self.energy_expended {
            record.extend_from_slice(&kj.to_le_bytes());
        }
        for rr in &self.rr_intervals {
            record.extend_from_slice(&rr.to_le_bytes());
        }
        record
    }
}
