//! Windowed statistics over accepted RR samples.
//!
//! Every metric is computed over a `Scope`: the whole stream, or a trailing
//! window found by walking back from the newest sample and summing
//! `interval_ms` until the sum meets or exceeds the window length. The sample
//! that crosses the boundary is inside the window.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::defaults::{HRV_LN_SCALE, MS_PER_MINUTE};
use crate::types::RrSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Total,
    Window { ms: u64 },
}

/// Lowest and highest per-beat heart rate in a range of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateRange {
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl HeartRateRange {
    fn of(bpm: f64) -> Self {
        Self { min_bpm: bpm, max_bpm: bpm }
    }

    fn include(self, bpm: f64) -> Self {
        Self {
            min_bpm: self.min_bpm.min(bpm),
            max_bpm: self.max_bpm.max(bpm),
        }
    }
}

/// Index of the oldest sample inside `scope`.
pub fn scope_start(samples: &[RrSample], scope: Scope) -> usize {
    let Scope::Window { ms } = scope else {
        return 0;
    };
    let mut sum = 0u64;
    for (i, sample) in samples.iter().enumerate().rev() {
        sum += u64::from(sample.interval_ms);
        if sum >= ms {
            return i;
        }
    }
    0
}

pub fn in_scope(samples: &[RrSample], scope: Scope) -> &[RrSample] {
    &samples[scope_start(samples, scope)..]
}

/// `60000 / mean(interval)`, or 0 with no samples.
pub fn heart_rate(samples: &[RrSample], scope: Scope) -> f64 {
    let scoped = in_scope(samples, scope);
    if scoped.is_empty() {
        return 0.0;
    }
    let mean = scoped.iter().map(|s| f64::from(s.interval_ms)).mean();
    MS_PER_MINUTE / mean
}

/// Root mean square of successive differences.
///
/// Uses every successive pair whose newer sample lies in `scope`. Needs at
/// least two samples, otherwise 0.
pub fn rmssd(samples: &[RrSample], scope: Scope) -> f64 {
    let from = scope_start(samples, scope).saturating_sub(1);
    let diffs: Vec<f64> = samples[from..]
        .windows(2)
        .map(|pair| f64::from(pair[1].interval_ms) - f64::from(pair[0].interval_ms))
        .collect();
    if diffs.is_empty() {
        return 0.0;
    }
    diffs.iter().quadratic_mean()
}

/// `ln(rmssd) * 20`, or 0 when rmssd is 0.
pub fn hrv(samples: &[RrSample], scope: Scope) -> f64 {
    let value = rmssd(samples, scope);
    if value > 0.0 {
        value.ln() * HRV_LN_SCALE
    } else {
        0.0
    }
}

/// Percentage of samples in scope with the trend flag set.
pub fn coherence(samples: &[RrSample], scope: Scope) -> f64 {
    let scoped = in_scope(samples, scope);
    if scoped.is_empty() {
        return 0.0;
    }
    let trending = scoped.iter().filter(|s| s.trend).count();
    100.0 * trending as f64 / scoped.len() as f64
}

/// Heart rate extrema in scope.
pub fn heart_rate_extrema(samples: &[RrSample], scope: Scope) -> Option<HeartRateRange> {
    in_scope(samples, scope)
        .iter()
        .map(RrSample::heart_rate_bpm)
        .fold(None, |range: Option<HeartRateRange>, bpm| {
            Some(range.map_or_else(|| HeartRateRange::of(bpm), |r| r.include(bpm)))
        })
}

/// Heart rate extrema of samples strictly between `begin_ms` and `end_ms`.
///
/// Scans from the newest sample and stops at the first one older than
/// `begin_ms`. `None` when nothing falls inside.
pub fn heart_rate_range(samples: &[RrSample], begin_ms: u64, end_ms: u64) -> Option<HeartRateRange> {
    let mut range: Option<HeartRateRange> = None;
    for sample in samples.iter().rev() {
        if sample.timestamp_ms < begin_ms {
            break;
        }
        if sample.timestamp_ms > begin_ms && sample.timestamp_ms < end_ms {
            let bpm = sample.heart_rate_bpm();
            range = Some(range.map_or_else(|| HeartRateRange::of(bpm), |r| r.include(bpm)));
        }
    }
    range
}

/// `(timestamp_ms, bpm)` for every sample, oldest first.
pub fn heart_rate_series(samples: &[RrSample]) -> Vec<(u64, f64)> {
    samples
        .iter()
        .map(|s| (s.timestamp_ms, s.heart_rate_bpm()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepted-looking samples with consecutive timestamps and linked diffs.
    fn linked(intervals: &[u32]) -> Vec<RrSample> {
        let mut out: Vec<RrSample> = Vec::new();
        let mut t = 0u64;
        for &rr in intervals {
            t += u64::from(rr);
            let s = RrSample::new(t, rr).linked_to(out.last());
            out.push(s);
        }
        out
    }

    const WINDOW: Scope = Scope::Window { ms: 20_000 };

    #[test]
    fn test_empty_stream_metrics_are_zero() {
        assert_eq!(heart_rate(&[], Scope::Total), 0.0);
        assert_eq!(hrv(&[], Scope::Total), 0.0);
        assert_eq!(coherence(&[], WINDOW), 0.0);
        assert!(heart_rate_extrema(&[], WINDOW).is_none());
    }

    #[test]
    fn test_heart_rate_from_mean_interval() {
        let samples = linked(&[800, 1000, 1200]);
        assert!((heart_rate(&samples, Scope::Total) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_includes_boundary_sample() {
        // 30 x 1000 ms: a 20 s window holds exactly the last 20
        let samples = linked(&[1000; 30]);
        assert_eq!(scope_start(&samples, WINDOW), 10);
        assert_eq!(in_scope(&samples, WINDOW).len(), 20);
        // 30 x 900 ms: 22 samples sum to 19 800, the 23rd crosses
        let samples = linked(&[900; 30]);
        assert_eq!(in_scope(&samples, WINDOW).len(), 23);
    }

    #[test]
    fn test_short_stream_window_is_everything() {
        let samples = linked(&[800, 800]);
        assert_eq!(scope_start(&samples, WINDOW), 0);
    }

    #[test]
    fn test_windowed_heart_rate_ignores_old_samples() {
        let mut intervals = vec![500; 10];
        intervals.extend([1000; 25]);
        let samples = linked(&intervals);
        assert!((heart_rate(&samples, WINDOW) - 60.0).abs() < 1e-9);
        assert!(heart_rate(&samples, Scope::Total) > 60.0);
    }

    #[test]
    fn test_rmssd() {
        // diffs +100, -100, +100 -> rms 100
        let samples = linked(&[800, 900, 800, 900]);
        assert!((rmssd(&samples, Scope::Total) - 100.0).abs() < 1e-9);
        assert!((hrv(&samples, Scope::Total) - 100f64.ln() * 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_rmssd_needs_two_samples() {
        assert_eq!(rmssd(&linked(&[800]), Scope::Total), 0.0);
    }

    #[test]
    fn test_constant_rhythm_has_zero_hrv() {
        assert_eq!(hrv(&linked(&[800; 10]), Scope::Total), 0.0);
    }

    #[test]
    fn test_coherence_percentage() {
        // diffs: -, +10, +10, +10, -30 -> trend on samples 2 and 3
        let samples = linked(&[800, 810, 820, 830, 800]);
        assert!((coherence(&samples, Scope::Total) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_extrema_in_window() {
        let samples = linked(&[600, 1000, 750]);
        let range = heart_rate_extrema(&samples, WINDOW).unwrap();
        assert_eq!(range.min_bpm, 60.0);
        assert_eq!(range.max_bpm, 100.0);
    }

    #[test]
    fn test_range_between_is_strict() {
        // timestamps 1000, 2000, 3000, 4000
        let samples = linked(&[1000, 1000, 1000, 1000]);
        assert!(heart_rate_range(&samples, 1000, 2000).is_none());
        let range = heart_rate_range(&samples, 1000, 4000).unwrap();
        assert_eq!(range, HeartRateRange { min_bpm: 60.0, max_bpm: 60.0 });
    }

    #[test]
    fn test_range_between_no_match() {
        let samples = linked(&[1000, 1000]);
        assert!(heart_rate_range(&samples, 5000, 9000).is_none());
        assert!(heart_rate_range(&[], 0, u64::MAX).is_none());
    }

    #[test]
    fn test_series() {
        let samples = linked(&[1000, 500]);
        assert_eq!(heart_rate_series(&samples), vec![(1000, 60.0), (1500, 120.0)]);
    }
}
