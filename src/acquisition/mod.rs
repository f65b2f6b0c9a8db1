//! Sensor data acquisition module
//!
//! Turns raw characteristic values from a heart rate sensor into RR interval
//! candidates and device information.

pub mod hrm_parser;

pub use hrm_parser::{
    assign_timestamps, decode_battery_level, decode_heart_rate, decode_measurement, decode_rr_intervals,
    decode_utf8_characteristic, DecodeError, HeartRateMeasurement, HrmFrameBuilder,
};
