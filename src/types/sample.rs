//! RR interval sample type

use serde::{Deserialize, Serialize};

use crate::config::defaults::MS_PER_MINUTE;

/// One heartbeat interval.
///
/// Candidates come out of the decoder with only `timestamp_ms` and
/// `interval_ms` set. `SampleStream` fills in `diff_from_previous` and
/// `trend` when it accepts the sample; after that the sample is never
/// modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrSample {
    /// When the beat occurred (monotonic device-relative ms)
    pub timestamp_ms: u64,
    /// Time since the previous beat (ms)
    pub interval_ms: u32,
    /// `interval_ms` minus the previous accepted sample's interval
    pub diff_from_previous: Option<i64>,
    /// Same strict sign of difference as the previous sample ("BFS")
    pub trend: bool,
}

impl RrSample {
    /// Build an unvalidated candidate.
    pub fn new(timestamp_ms: u64, interval_ms: u32) -> Self {
        Self {
            timestamp_ms,
            interval_ms,
            diff_from_previous: None,
            trend: false,
        }
    }

    /// Instantaneous heart rate implied by this interval.
    ///
    /// A zero interval yields `f64::INFINITY`, which every range check rejects.
    pub fn heart_rate_bpm(&self) -> f64 {
        MS_PER_MINUTE / f64::from(self.interval_ms)
    }

    /// Link this sample to the previously accepted one.
    ///
    /// The trend flag is set only when both this and the previous difference
    /// exist and share a strict sign.
    pub(crate) fn linked_to(self, previous: Option<&RrSample>) -> Self {
        let diff = previous.map(|p| i64::from(self.interval_ms) - i64::from(p.interval_ms));
        let trend = match (diff, previous.and_then(|p| p.diff_from_previous)) {
            (Some(d), Some(prev)) => (d > 0 && prev > 0) || (d < 0 && prev < 0),
            _ => false,
        };
        Self {
            diff_from_previous: diff,
            trend,
            ..self
        }
    }
}
