//! Decoder-to-stream scenarios
//!
//! Raw Heart Rate Measurement records are decoded and fed through a
//! `SampleStream`, checking the statistics a subscriber would see.

use heartwave::acquisition::{decode_measurement, HrmFrameBuilder};
use heartwave::coherence::ZoneClassifier;
use heartwave::config::MonitorConfig;
use heartwave::stream::{AddOutcome, SampleStream};

fn stream() -> SampleStream {
    SampleStream::with_config(&MonitorConfig::default())
}

fn record(intervals: &[u16]) -> Vec<u8> {
    let mut builder = HrmFrameBuilder::new(72);
    builder.sensor_contact(true).energy_expended(12);
    for &rr in intervals {
        builder.rr_interval(rr);
    }
    builder.build()
}

/// Decode each record received at the given time and push every candidate.
fn ingest(stream: &mut SampleStream, records: &[(u64, Vec<u16>)]) -> Vec<AddOutcome> {
    let mut outcomes = Vec::new();
    for (received_at_ms, intervals) in records {
        for candidate in decode_measurement(&record(intervals), *received_at_ms).unwrap() {
            outcomes.push(stream.push(candidate));
        }
    }
    outcomes
}

#[test]
fn steady_rhythm_across_packets() {
    let mut s = stream();
    let records: Vec<(u64, Vec<u16>)> = (1..=10).map(|i| (i * 2_000, vec![1000, 1000])).collect();
    let outcomes = ingest(&mut s, &records);

    assert!(outcomes.iter().all(AddOutcome::is_accepted));
    assert_eq!(s.len(), 20);
    assert_eq!(s.measured_time_ms(), 20_000);
    assert!((s.heart_rate() - 60.0).abs() < 1e-9);
    assert_eq!(s.hrv(), 0.0);
    assert_eq!(s.coherence(), 0.0);
    assert_eq!(s.zone().label, "very_low");

    let stamps: Vec<u64> = s.samples().iter().take(4).map(|x| x.timestamp_ms).collect();
    assert_eq!(stamps, vec![1_000, 2_000, 3_000, 4_000]);
}

#[test]
fn isolated_spike_is_dropped() {
    let mut s = stream();
    ingest(&mut s, &[(2_400, vec![800, 800, 800]), (4_400, vec![2000])]);
    ingest(&mut s, &[(6_800, vec![800, 800, 800])]);

    assert_eq!(s.len(), 6);
    assert_eq!(s.dropped_total(), 1);
    assert!((s.instant_heart_rate() - 75.0).abs() < 1e-9);
    let range = s.instant_heart_rate_range().unwrap();
    assert_eq!(range.min_bpm, 75.0);
    assert_eq!(range.max_bpm, 75.0);
}

#[test]
fn sustained_rate_change_is_eventually_accepted() {
    let mut s = stream();
    ingest(&mut s, &[(3_000, vec![1000, 1000, 1000])]);
    let outcomes = ingest(&mut s, &[(5_000, vec![500, 500, 500, 500])]);
    let accepted: Vec<bool> = outcomes.iter().map(AddOutcome::is_accepted).collect();
    assert_eq!(accepted, vec![false, false, false, true]);
    assert_eq!(s.rejections_in_a_row(), 0);
    assert!((s.last().unwrap().heart_rate_bpm() - 120.0).abs() < 1e-9);
}

#[test]
fn alternating_rhythm_has_variability_but_no_coherence() {
    let mut s = stream();
    ingest(&mut s, &[(3_400, vec![800, 900, 800, 900])]);
    assert!((s.hrv() - 100f64.ln() * 20.0).abs() < 1e-9);
    assert_eq!(s.coherence(), 0.0);
}

#[test]
fn zone_promotion_needs_repeated_classification() {
    let mut classifier = ZoneClassifier::new(3);
    assert_eq!(classifier.observe(90.0), None);
    assert_eq!(classifier.observe(90.0), None);
    assert_eq!(classifier.observe(90.0), None);
    let change = classifier.observe(90.0).unwrap();
    assert_eq!((change.from.index, change.to.index), (0, 1));

    // one step at a time, even with a very high score
    for _ in 0..3 {
        assert_eq!(classifier.observe(90.0), None);
    }
    assert_eq!(classifier.observe(90.0).map(|c| c.to.label), Some("medium_low"));

    // an interrupted run starts counting again
    classifier.observe(0.0);
    classifier.observe(0.0);
    classifier.observe(90.0);
    classifier.observe(0.0);
    assert_eq!(classifier.current().index, 2);
}
