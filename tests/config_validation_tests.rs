//! Config Validation Tests
//!
//! Typo detection and physiological range checks, exercised through the
//! public config API without starting a monitor.

use heartwave::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use heartwave::config::{ConfigError, MonitorConfig};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_outlier_ratio_warns_with_suggestion() {
    let toml_str = r#"
[validation]
outlier_raito = 1.4
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("outlier_raito"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("validation.outlier_ratio")
    );
}

#[test]
fn typo_in_section_name_warns() {
    let toml_str = r#"
[conection]
connect_timeout_ms = 5000
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(!warnings.is_empty());
    assert!(warnings.iter().any(|w| w.suggestion.as_deref() == Some("connection")));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[validation]
min_heart_rate_bpm = 30.0
max_heart_rate_bpm = 200.0
outlier_ratio = 1.4
outlier_tolerance = 2

[statistics]
time_window_ms = 30000

[coherence]
zone_hits = 4

[connection]
connect_timeout_ms = 8000
scan_period_ms = 5000
max_rejections_in_a_row = 6

[storage]
path = "/tmp/heartwave-test"
device_address_key = "last_device"

[simulator]
min_rr_ms = 700
max_rr_ms = 1000
glitch_rate = 0.02
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());

    let cfg = MonitorConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(cfg.validation.outlier_tolerance, 2);
    assert_eq!(cfg.statistics.time_window_ms, 30_000);
    assert_eq!(cfg.coherence.zone_hits, 4);
    assert_eq!(cfg.connection.max_rejections_in_a_row, 6);
    assert_eq!(cfg.storage.device_address_key, "last_device");
    assert_eq!(cfg.simulator.max_rr_ms, 1000);
}

#[test]
fn unknown_key_does_not_break_loading() {
    let cfg = MonitorConfig::from_toml_str(
        r#"
[statistics]
time_window_ms = 15000
colour = "red"
"#,
    )
    .unwrap();
    assert_eq!(cfg.statistics.time_window_ms, 15_000);
}

#[test]
fn garbage_key_has_no_suggestion() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("zzzzzzzzzzzz", &known), None);
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn defaults_have_no_range_findings() {
    let (errors, warnings) = validate_physical_ranges(&MonitorConfig::default());
    assert!(errors.is_empty());
    assert!(warnings.is_empty());
}

#[test]
fn huge_outlier_ratio_warns() {
    let mut cfg = MonitorConfig::default();
    cfg.validation.outlier_ratio = 4.0;
    let (errors, warnings) = validate_physical_ranges(&cfg);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.field == "validation.outlier_ratio"));
    assert!(cfg.validate().is_ok(), "warnings never fail validation");
}

#[test]
fn zero_timeout_is_validation_error() {
    let err = MonitorConfig::from_toml_str(
        r#"
[connection]
connect_timeout_ms = 0
"#,
    )
    .unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.contains("connect_timeout_ms")));
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn wrong_type_is_parse_error() {
    let err = MonitorConfig::from_toml_str(
        r#"
[coherence]
zone_hits = "three"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}
