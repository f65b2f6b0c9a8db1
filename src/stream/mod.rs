//! RR Sample Stream
//!
//! Append-only sequence of accepted RR samples plus the bookkeeping that
//! decides whether a link is trustworthy:
//!
//! - every candidate goes through `ValidationRules`
//! - rejections are counted in total and per consecutive run
//! - accepted samples are linked to their predecessor (diff / trend)
//! - each accepted sample re-runs the coherence zone classifier
//!
//! Aggregates are memoized in `OnceCell`s and dropped on every accepted
//! sample, so repeated reads between packets cost nothing.

pub mod statistics;
pub mod validation;

use std::cell::OnceCell;

use serde::Serialize;
use tracing::debug;

use crate::coherence::{CoherenceZone, ZoneChange, ZoneClassifier};
use crate::config::{self, MonitorConfig};
use crate::types::RrSample;

pub use statistics::{HeartRateRange, Scope};
pub use validation::{Rejection, ValidationRules, Verdict};

// ============================================================================
// Add Outcome
// ============================================================================

/// Result of offering one candidate to the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddOutcome {
    Accepted { zone_change: Option<ZoneChange> },
    Rejected(Rejection),
}

impl AddOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AddOutcome::Accepted { .. })
    }
}

// ============================================================================
// Cached Aggregates
// ============================================================================

#[derive(Debug, Clone, Default)]
struct StatsCache {
    heart_rate: OnceCell<f64>,
    instant_heart_rate: OnceCell<f64>,
    hrv: OnceCell<f64>,
    instant_hrv: OnceCell<f64>,
    coherence: OnceCell<f64>,
    instant_coherence: OnceCell<f64>,
    instant_extrema: OnceCell<Option<HeartRateRange>>,
}

// ============================================================================
// Sample Stream
// ============================================================================

#[derive(Debug, Clone)]
pub struct SampleStream {
    samples: Vec<RrSample>,
    rules: ValidationRules,
    window: Scope,
    measured_time_ms: u64,
    dropped_total: u64,
    out_of_range_in_a_row: u32,
    outliers_in_a_row: u32,
    classifier: ZoneClassifier,
    cache: StatsCache,
}

impl Default for SampleStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStream {
    /// Stream configured from the global config (defaults before `config::init`).
    pub fn new() -> Self {
        Self::with_config(config::get())
    }

    pub fn with_config(cfg: &MonitorConfig) -> Self {
        Self {
            samples: Vec::new(),
            rules: ValidationRules::from_config(&cfg.validation),
            window: Scope::Window {
                ms: cfg.statistics.time_window_ms,
            },
            measured_time_ms: 0,
            dropped_total: 0,
            out_of_range_in_a_row: 0,
            outliers_in_a_row: 0,
            classifier: ZoneClassifier::new(cfg.coherence.zone_hits),
            cache: StatsCache::default(),
        }
    }

    /// Offer a candidate. Returns `true` if it was accepted.
    pub fn add(&mut self, candidate: RrSample) -> bool {
        self.push(candidate).is_accepted()
    }

    /// Offer a candidate and report what happened to it.
    pub fn push(&mut self, candidate: RrSample) -> AddOutcome {
        let previous = self.samples.last();
        match self.rules.assess(&candidate, previous, self.outliers_in_a_row) {
            Verdict::Reject(rejection) => {
                self.dropped_total += 1;
                if rejection.out_of_range {
                    self.out_of_range_in_a_row += 1;
                }
                if rejection.outlier {
                    self.outliers_in_a_row += 1;
                }
                debug!(
                    interval_ms = candidate.interval_ms,
                    out_of_range = rejection.out_of_range,
                    outlier = rejection.outlier,
                    dropped_total = self.dropped_total,
                    "RR interval rejected"
                );
                AddOutcome::Rejected(rejection)
            }
            Verdict::Accept => {
                let timestamp_ms = previous
                    .map_or(candidate.timestamp_ms, |p| candidate.timestamp_ms.max(p.timestamp_ms));
                let sample = RrSample {
                    timestamp_ms,
                    ..candidate
                }
                .linked_to(previous);

                self.out_of_range_in_a_row = 0;
                self.outliers_in_a_row = 0;
                self.cache = StatsCache::default();
                self.samples.push(sample);
                self.measured_time_ms += u64::from(sample.interval_ms);

                let score = self.instant_coherence();
                let zone_change = self.classifier.observe(score);
                AddOutcome::Accepted { zone_change }
            }
        }
    }

    /// Drop every sample and reset counters and zone state.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.measured_time_ms = 0;
        self.dropped_total = 0;
        self.out_of_range_in_a_row = 0;
        self.outliers_in_a_row = 0;
        self.classifier.reset();
        self.cache = StatsCache::default();
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RrSample> {
        self.samples.get(index)
    }

    pub fn last(&self) -> Option<&RrSample> {
        self.samples.last()
    }

    pub fn samples(&self) -> &[RrSample] {
        &self.samples
    }

    /// Sum of accepted intervals (ms).
    pub fn measured_time_ms(&self) -> u64 {
        self.measured_time_ms
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// `dropped / (dropped + accepted)`, 0 before any candidate.
    pub fn dropped_rate(&self) -> f64 {
        let offered = self.dropped_total + self.samples.len() as u64;
        if offered == 0 {
            0.0
        } else {
            self.dropped_total as f64 / offered as f64
        }
    }

    pub fn out_of_range_in_a_row(&self) -> u32 {
        self.out_of_range_in_a_row
    }

    pub fn outliers_in_a_row(&self) -> u32 {
        self.outliers_in_a_row
    }

    /// Both consecutive-rejection counters combined.
    pub fn rejections_in_a_row(&self) -> u32 {
        self.out_of_range_in_a_row + self.outliers_in_a_row
    }

    pub fn zone(&self) -> CoherenceZone {
        self.classifier.current()
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    pub fn heart_rate(&self) -> f64 {
        *self
            .cache
            .heart_rate
            .get_or_init(|| statistics::heart_rate(&self.samples, Scope::Total))
    }

    pub fn instant_heart_rate(&self) -> f64 {
        *self
            .cache
            .instant_heart_rate
            .get_or_init(|| statistics::heart_rate(&self.samples, self.window))
    }

    pub fn hrv(&self) -> f64 {
        *self
            .cache
            .hrv
            .get_or_init(|| statistics::hrv(&self.samples, Scope::Total))
    }

    pub fn instant_hrv(&self) -> f64 {
        *self
            .cache
            .instant_hrv
            .get_or_init(|| statistics::hrv(&self.samples, self.window))
    }

    pub fn coherence(&self) -> f64 {
        *self
            .cache
            .coherence
            .get_or_init(|| statistics::coherence(&self.samples, Scope::Total))
    }

    pub fn instant_coherence(&self) -> f64 {
        *self
            .cache
            .instant_coherence
            .get_or_init(|| statistics::coherence(&self.samples, self.window))
    }

    /// Lowest and highest beat in the trailing window.
    pub fn instant_heart_rate_range(&self) -> Option<HeartRateRange> {
        *self
            .cache
            .instant_extrema
            .get_or_init(|| statistics::heart_rate_extrema(&self.samples, self.window))
    }

    /// Heart rate extrema strictly between two timestamps.
    pub fn heart_rate_range(&self, begin_ms: u64, end_ms: u64) -> Option<HeartRateRange> {
        statistics::heart_rate_range(&self.samples, begin_ms, end_ms)
    }

    pub fn heart_rate_series(&self) -> Vec<(u64, f64)> {
        statistics::heart_rate_series(&self.samples)
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            size: self.len(),
            last: self.last().copied(),
            measured_time_ms: self.measured_time_ms,
            dropped_total: self.dropped_total,
            dropped_rate: self.dropped_rate(),
            heart_rate_bpm: self.heart_rate(),
            instant_heart_rate_bpm: self.instant_heart_rate(),
            instant_range: self.instant_heart_rate_range(),
            hrv: self.hrv(),
            instant_hrv: self.instant_hrv(),
            coherence: self.coherence(),
            instant_coherence: self.instant_coherence(),
            zone: self.zone(),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of the stream's statistics, handed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSnapshot {
    pub size: usize,
    pub last: Option<RrSample>,
    pub measured_time_ms: u64,
    pub dropped_total: u64,
    pub dropped_rate: f64,
    pub heart_rate_bpm: f64,
    pub instant_heart_rate_bpm: f64,
    pub instant_range: Option<HeartRateRange>,
    pub hrv: f64,
    pub instant_hrv: f64,
    pub coherence: f64,
    pub instant_coherence: f64,
    pub zone: CoherenceZone,
}

/// `HH:MM:SS` rendering of a duration in milliseconds.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(stream: &mut SampleStream, intervals: &[u32]) -> Vec<bool> {
        let mut t = stream.last().map_or(0, |s| s.timestamp_ms);
        intervals
            .iter()
            .map(|&rr| {
                t += u64::from(rr);
                stream.add(RrSample::new(t, rr))
            })
            .collect()
    }

    fn stream() -> SampleStream {
        SampleStream::with_config(&MonitorConfig::default())
    }

    #[test]
    fn test_measured_time_is_sum_of_accepted() {
        let mut s = stream();
        feed(&mut s, &[800, 820, 300, 790]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.measured_time_ms(), 800 + 820 + 790);
        assert_eq!(s.dropped_total(), 1);
    }

    #[test]
    fn test_spike_rejected_as_outlier() {
        let mut s = stream();
        let accepted = feed(&mut s, &[800, 800, 800, 2000, 800, 800, 800]);
        assert_eq!(accepted, vec![true, true, true, false, true, true, true]);
        assert_eq!(s.dropped_total(), 1);
        assert_eq!(s.outliers_in_a_row(), 0);
    }

    #[test]
    fn test_out_of_range_counted() {
        let mut s = stream();
        let accepted = feed(&mut s, &[800, 800, 800, 300]);
        assert_eq!(accepted, vec![true, true, true, false]);
        assert_eq!(s.out_of_range_in_a_row(), 1);
        // 200 bpm vs 75 bpm is also an outlier
        assert_eq!(s.outliers_in_a_row(), 1);
        assert!(feed(&mut s, &[800])[0]);
        assert_eq!(s.rejections_in_a_row(), 0);
    }

    #[test]
    fn test_fourth_consecutive_outlier_accepted() {
        let mut s = stream();
        feed(&mut s, &[600]);
        let accepted = feed(&mut s, &[1200, 1200, 1200, 1200]);
        assert_eq!(accepted, vec![false, false, false, true]);
        assert_eq!(s.outliers_in_a_row(), 0);
        assert_eq!(s.last().map(|l| l.interval_ms), Some(1200));
    }

    #[test]
    fn test_out_of_range_always_rejected() {
        let mut s = stream();
        let accepted = feed(&mut s, &[3000; 6]);
        assert!(accepted.iter().all(|a| !a));
        assert!(s.is_empty());
        assert_eq!(s.out_of_range_in_a_row(), 6);
        assert_eq!(s.outliers_in_a_row(), 0);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut s = stream();
        assert!(s.add(RrSample::new(10_000, 800)));
        assert!(s.add(RrSample::new(9_500, 810)));
        assert_eq!(s.get(1).map(|x| x.timestamp_ms), Some(10_000));
    }

    #[test]
    fn test_diff_and_trend_linked_on_accept() {
        let mut s = stream();
        feed(&mut s, &[800, 850, 900]);
        assert_eq!(s.get(0).and_then(|x| x.diff_from_previous), None);
        assert_eq!(s.get(1).and_then(|x| x.diff_from_previous), Some(50));
        assert!(s.get(2).is_some_and(|x| x.trend));
    }

    #[test]
    fn test_cache_invalidated_on_accept() {
        let mut s = stream();
        feed(&mut s, &[1000]);
        assert_eq!(s.heart_rate(), 60.0);
        feed(&mut s, &[500 + 250]);
        assert!(s.heart_rate() > 60.0);
    }

    #[test]
    fn test_dropped_rate() {
        let mut s = stream();
        assert_eq!(s.dropped_rate(), 0.0);
        feed(&mut s, &[800, 800, 800, 100]);
        assert!((s.dropped_rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut s = stream();
        feed(&mut s, &[800, 820, 300]);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.measured_time_ms(), 0);
        assert_eq!(s.dropped_total(), 0);
        assert_eq!(s.rejections_in_a_row(), 0);
        assert_eq!(s.zone().index, 0);
        assert_eq!(s.heart_rate(), 0.0);
    }

    #[test]
    fn test_rising_rhythm_raises_zone() {
        let mut s = stream();
        // strictly increasing intervals: every sample after the second trends
        let intervals: Vec<u32> = (0..40).map(|i| 700 + i * 5).collect();
        let mut t = 0;
        let mut changes = Vec::new();
        for rr in intervals {
            t += u64::from(rr);
            if let AddOutcome::Accepted { zone_change: Some(c) } = s.push(RrSample::new(t, rr)) {
                changes.push(c);
            }
        }
        assert!(!changes.is_empty());
        assert!(changes.iter().all(|c| c.to.index == c.from.index + 1));
        assert_eq!(s.zone().index, changes.len());
    }

    #[test]
    fn test_snapshot_matches_accessors() {
        let mut s = stream();
        feed(&mut s, &[800, 900, 800, 900]);
        let snap = s.snapshot();
        assert_eq!(snap.size, 4);
        assert_eq!(snap.hrv, s.hrv());
        assert_eq!(snap.instant_coherence, s.instant_coherence());
        assert_eq!(snap.last, s.last().copied());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3_723_000), "01:02:03");
    }
}
