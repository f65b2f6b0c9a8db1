//! Physiological plausibility rules for RR candidates.
//!
//! Two independent checks run on every candidate:
//! - **Out of range**: implied heart rate outside `[min, max]` bpm. Always rejected.
//! - **Outlier**: `max(hr, hr_prev) / min(hr, hr_prev)` above the ratio
//!   against the last accepted sample. Rejected only while fewer than
//!   `outlier_tolerance` outliers have been rejected in a row, so a genuine
//!   sustained change in rate is eventually accepted.

use serde::Serialize;

use crate::config::ValidationConfig;
use crate::types::RrSample;

/// Which rules fired for a rejected candidate. Both may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rejection {
    pub out_of_range: bool,
    pub outlier: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRules {
    pub min_heart_rate_bpm: f64,
    pub max_heart_rate_bpm: f64,
    pub outlier_ratio: f64,
    pub outlier_tolerance: u32,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

impl ValidationRules {
    pub fn from_config(cfg: &ValidationConfig) -> Self {
        Self {
            min_heart_rate_bpm: cfg.min_heart_rate_bpm,
            max_heart_rate_bpm: cfg.max_heart_rate_bpm,
            outlier_ratio: cfg.outlier_ratio,
            outlier_tolerance: cfg.outlier_tolerance,
        }
    }

    pub fn is_out_of_range(&self, heart_rate_bpm: f64) -> bool {
        !(self.min_heart_rate_bpm..=self.max_heart_rate_bpm).contains(&heart_rate_bpm)
    }

    pub fn is_outlier(&self, heart_rate_bpm: f64, previous_bpm: f64) -> bool {
        let ratio = heart_rate_bpm.max(previous_bpm) / heart_rate_bpm.min(previous_bpm);
        ratio > self.outlier_ratio
    }

    /// Judge `candidate` against the last accepted sample.
    pub fn assess(
        &self,
        candidate: &RrSample,
        previous: Option<&RrSample>,
        outliers_in_a_row: u32,
    ) -> Verdict {
        let hr = candidate.heart_rate_bpm();
        let out_of_range = self.is_out_of_range(hr);
        let outlier = previous.is_some_and(|p| self.is_outlier(hr, p.heart_rate_bpm()));

        if out_of_range || (outlier && outliers_in_a_row < self.outlier_tolerance) {
            Verdict::Reject(Rejection { out_of_range, outlier })
        } else {
            Verdict::Accept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(interval_ms: u32) -> RrSample {
        RrSample::new(0, interval_ms)
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let rules = ValidationRules::default();
        assert!(!rules.is_out_of_range(25.0));
        assert!(!rules.is_out_of_range(190.0));
        assert!(rules.is_out_of_range(24.9));
        assert!(rules.is_out_of_range(190.1));
        assert!(rules.is_out_of_range(f64::INFINITY));
    }

    #[test]
    fn test_first_sample_cannot_be_outlier() {
        let rules = ValidationRules::default();
        assert_eq!(rules.assess(&sample(1500), None, 0), Verdict::Accept);
    }

    #[test]
    fn test_outlier_ratio_is_symmetric() {
        let rules = ValidationRules::default();
        assert!(rules.is_outlier(120.0, 60.0));
        assert!(rules.is_outlier(60.0, 120.0));
        assert!(!rules.is_outlier(90.0, 60.0));
    }

    #[test]
    fn test_outlier_accepted_once_tolerance_reached() {
        let rules = ValidationRules::default();
        let prev = sample(800);
        let spike = sample(2000);
        assert!(matches!(
            rules.assess(&spike, Some(&prev), 2),
            Verdict::Reject(Rejection { outlier: true, out_of_range: false })
        ));
        assert_eq!(rules.assess(&spike, Some(&prev), 3), Verdict::Accept);
    }

    #[test]
    fn test_out_of_range_rejected_regardless_of_outlier_run() {
        let rules = ValidationRules::default();
        let prev = sample(800);
        let verdict = rules.assess(&sample(300), Some(&prev), 10);
        assert_eq!(
            verdict,
            Verdict::Reject(Rejection { out_of_range: true, outlier: true })
        );
    }
}
