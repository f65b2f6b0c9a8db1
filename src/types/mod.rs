//! Shared data structures for the heart rate pipeline
//!
//! - `RrSample`: one validated beat-to-beat interval
//! - `DeviceDescriptor`, `DeviceInfo`: what the transport tells us about a sensor
//! - `ConnectionState`, `LinkError`: connection lifecycle vocabulary

mod connection;
mod device;
mod sample;

pub use connection::*;
pub use device::*;
pub use sample::*;
