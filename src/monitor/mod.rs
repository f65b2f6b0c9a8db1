//! Heart Rate Monitor
//!
//! Connection lifecycle, validation-driven link supervision and event
//! publication around a single `SampleStream`.
//!
//! ## Architecture
//!
//! ```text
//! HeartRateTransport ──TransportEvent──▶ HeartRateMonitor (actor) ──MonitorEvent──▶ EventBus
//!                                              ▲
//!                     MonitorHandle ──MonitorCommand──┘
//! ```
//!
//! - `state`: legal `Disconnected -> Connecting -> Connected` transitions
//! - `actor`: the task owning the stream, deadlines and the transport
//! - `events`: broadcast of status and metric changes

pub mod actor;
pub mod events;
pub mod state;

pub use actor::{HeartRateMonitor, MonitorCommand, MonitorHandle, MonitorStatus};
pub use events::{EventBus, MonitorEvent};
pub use state::{ConnectionMachine, TransitionError};
