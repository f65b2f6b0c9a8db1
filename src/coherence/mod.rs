//! Coherence Zone Classifier
//!
//! Maps the instant coherence score onto six ordered zones with hysteresis:
//!
//! 1. The natural zone is the highest zone whose lower bound is <= score.
//! 2. It is clamped to at most one zone away from the current zone.
//! 3. The clamped zone becomes the candidate. A repeated candidate gains a
//!    hit, a different one replaces it with zero hits.
//! 4. A candidate other than the current zone is committed once it has
//!    collected the required number of hits.
//!
//! Zone changes are returned to the caller, which publishes them.

use serde::Serialize;

use crate::config::defaults::ZONE_LOWER_BOUNDS;

/// One coherence band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoherenceZone {
    pub index: usize,
    /// Lowest score (percent) belonging to this zone
    pub lower_bound: f64,
    /// Presentation identifier
    pub label: &'static str,
}

/// All zones, lowest first.
pub const ZONES: [CoherenceZone; 6] = [
    CoherenceZone { index: 0, lower_bound: ZONE_LOWER_BOUNDS[0], label: "very_low" },
    CoherenceZone { index: 1, lower_bound: ZONE_LOWER_BOUNDS[1], label: "low" },
    CoherenceZone { index: 2, lower_bound: ZONE_LOWER_BOUNDS[2], label: "medium_low" },
    CoherenceZone { index: 3, lower_bound: ZONE_LOWER_BOUNDS[3], label: "medium_high" },
    CoherenceZone { index: 4, lower_bound: ZONE_LOWER_BOUNDS[4], label: "high" },
    CoherenceZone { index: 5, lower_bound: ZONE_LOWER_BOUNDS[5], label: "very_high" },
];

/// Index of the highest zone.
pub const TOP_ZONE: usize = ZONES.len() - 1;

impl CoherenceZone {
    /// Zone by index, saturating at the top zone.
    pub fn at(index: usize) -> Self {
        ZONES[index.min(TOP_ZONE)]
    }
}

impl std::fmt::Display for CoherenceZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label)
    }
}

/// Highest zone whose lower bound is <= `score`. NaN maps to zone 0.
pub fn natural_zone(score: f64) -> usize {
    ZONES
        .iter()
        .rposition(|z| score >= z.lower_bound)
        .unwrap_or(0)
}

/// A committed zone transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneChange {
    pub from: CoherenceZone,
    pub to: CoherenceZone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    zone: usize,
    hits: u32,
}

/// Hysteresis state machine over `ZONES`.
#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    current: usize,
    candidate: Option<Candidate>,
    required_hits: u32,
}

impl ZoneClassifier {
    pub fn new(required_hits: u32) -> Self {
        Self {
            current: 0,
            candidate: None,
            required_hits,
        }
    }

    pub fn current(&self) -> CoherenceZone {
        CoherenceZone::at(self.current)
    }

    /// Pending candidate zone and its hit count.
    pub fn candidate(&self) -> Option<(CoherenceZone, u32)> {
        self.candidate.map(|c| (CoherenceZone::at(c.zone), c.hits))
    }

    /// Natural zone for `score`, clamped to one step from the current zone.
    pub fn classify(&self, score: f64) -> usize {
        let lowest = self.current.saturating_sub(1);
        let highest = (self.current + 1).min(TOP_ZONE);
        natural_zone(score).clamp(lowest, highest)
    }

    /// Feed one score. Returns the transition when a candidate is committed.
    pub fn observe(&mut self, score: f64) -> Option<ZoneChange> {
        let zone = self.classify(score);
        let hits = match self.candidate {
            Some(c) if c.zone == zone => c.hits + 1,
            _ => 0,
        };
        self.candidate = Some(Candidate { zone, hits });

        if zone == self.current || hits < self.required_hits {
            return None;
        }

        let from = self.current();
        self.current = zone;
        self.candidate = None;
        Some(ZoneChange {
            from,
            to: self.current(),
        })
    }

    /// Back to zone 0 with no candidate.
    pub fn reset(&mut self) {
        self.current = 0;
        self.candidate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(classifier: &mut ZoneClassifier, score: f64, times: usize) -> Vec<ZoneChange> {
        (0..times).filter_map(|_| classifier.observe(score)).collect()
    }

    #[test]
    fn test_natural_zone_boundaries() {
        assert_eq!(natural_zone(0.0), 0);
        assert_eq!(natural_zone(19.9), 0);
        assert_eq!(natural_zone(20.0), 1);
        assert_eq!(natural_zone(49.9), 2);
        assert_eq!(natural_zone(50.0), 3);
        assert_eq!(natural_zone(80.0), 5);
        assert_eq!(natural_zone(100.0), 5);
        assert_eq!(natural_zone(f64::NAN), 0);
    }

    #[test]
    fn test_classify_clamps_to_neighbour() {
        let classifier = ZoneClassifier::new(3);
        assert_eq!(classifier.classify(100.0), 1);
        assert_eq!(classifier.classify(0.0), 0);
    }

    #[test]
    fn test_promotion_after_required_hits() {
        let mut classifier = ZoneClassifier::new(3);
        // First sighting sets hits = 0, three repeats reach 3
        assert!(feed(&mut classifier, 25.0, 3).is_empty());
        assert_eq!(classifier.candidate().map(|(z, h)| (z.index, h)), Some((1, 2)));

        let change = classifier.observe(25.0).expect("fourth classification commits");
        assert_eq!(change.from.index, 0);
        assert_eq!(change.to.index, 1);
        assert_eq!(classifier.current().index, 1);
        assert!(classifier.candidate().is_none());
    }

    #[test]
    fn test_never_skips_a_zone() {
        let mut classifier = ZoneClassifier::new(3);
        let changes = feed(&mut classifier, 95.0, 40);
        assert_eq!(changes.len(), TOP_ZONE);
        for change in &changes {
            assert_eq!(change.to.index, change.from.index + 1);
        }
        assert_eq!(classifier.current().index, TOP_ZONE);
    }

    #[test]
    fn test_descends_one_step_at_a_time() {
        let mut classifier = ZoneClassifier::new(3);
        feed(&mut classifier, 95.0, 40);
        let change = feed(&mut classifier, 0.0, 4);
        assert_eq!(change.len(), 1);
        assert_eq!(change[0].from.index, 5);
        assert_eq!(change[0].to.index, 4);
    }

    #[test]
    fn test_flicker_resets_candidate() {
        let mut classifier = ZoneClassifier::new(3);
        for _ in 0..10 {
            assert!(classifier.observe(25.0).is_none());
            assert!(classifier.observe(25.0).is_none());
            // back to the current zone: candidate replaced
            assert!(classifier.observe(5.0).is_none());
        }
        assert_eq!(classifier.current().index, 0);
    }

    #[test]
    fn test_reset() {
        let mut classifier = ZoneClassifier::new(1);
        feed(&mut classifier, 40.0, 2);
        assert_eq!(classifier.current().index, 1);
        classifier.reset();
        assert_eq!(classifier.current().index, 0);
        assert!(classifier.candidate().is_none());
    }
}
