//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physiological range checks.
//!
//! The raw TOML is first walked as a `toml::Value` tree and compared against
//! the known key set, producing "did you mean?" warnings. Serde
//! deserialization runs afterwards. Warnings never break a config.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `MonitorConfig`.
///
/// Any new field added to `MonitorConfig` must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [validation]
        "validation",
        "validation.min_heart_rate_bpm",
        "validation.max_heart_rate_bpm",
        "validation.outlier_ratio",
        "validation.outlier_tolerance",
        // [statistics]
        "statistics",
        "statistics.time_window_ms",
        // [coherence]
        "coherence",
        "coherence.zone_hits",
        // [connection]
        "connection",
        "connection.connect_timeout_ms",
        "connection.scan_period_ms",
        "connection.max_rejections_in_a_row",
        // [storage]
        "storage",
        "storage.path",
        "storage.device_address_key",
        // [simulator]
        "simulator",
        "simulator.min_rr_ms",
        "simulator.max_rr_ms",
        "simulator.glitch_rate",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collects all dotted key paths of a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Parse errors are left for serde to report.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physiological Range Validation
// ============================================================================

/// Validate physiological ranges on a parsed `MonitorConfig`.
///
/// Returns (errors, warnings). Errors are impossible values, warnings are
/// suspicious but usable.
pub fn validate_physical_ranges(
    config: &super::MonitorConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let v = &config.validation;

    // The RR field is a u16 of milliseconds; 60000 / 65535 ~= 0.92 bpm
    if v.min_heart_rate_bpm < 1.0 {
        errors.push(format!(
            "validation.min_heart_rate_bpm = {:.1} is below anything a u16 RR interval can encode",
            v.min_heart_rate_bpm
        ));
    }

    if v.max_heart_rate_bpm > 300.0 {
        warnings.push(ValidationWarning {
            field: "validation.max_heart_rate_bpm".to_string(),
            message: format!(
                "max_heart_rate_bpm = {:.1} is above any human heart rate (300 bpm)",
                v.max_heart_rate_bpm
            ),
            suggestion: None,
        });
    }

    if v.outlier_ratio > 3.0 {
        warnings.push(ValidationWarning {
            field: "validation.outlier_ratio".to_string(),
            message: format!(
                "outlier_ratio = {:.2} effectively disables beat-to-beat outlier rejection",
                v.outlier_ratio
            ),
            suggestion: None,
        });
    }

    let window = config.statistics.time_window_ms;
    if window > 0 && !(5_000..=300_000).contains(&window) {
        warnings.push(ValidationWarning {
            field: "statistics.time_window_ms".to_string(),
            message: format!(
                "time_window_ms = {window} is outside the typical short-term HRV range (5-300 s)"
            ),
            suggestion: None,
        });
    }

    let s = &config.simulator;
    if s.min_rr_ms > 0 {
        let sim_max_hr = 60_000.0 / f64::from(s.min_rr_ms);
        let sim_min_hr = 60_000.0 / f64::from(s.max_rr_ms.max(1));
        if sim_max_hr > v.max_heart_rate_bpm || sim_min_hr < v.min_heart_rate_bpm {
            warnings.push(ValidationWarning {
                field: "simulator".to_string(),
                message: format!(
                    "simulated RR range {}-{} ms produces beats outside the accepted heart rate range",
                    s.min_rr_ms, s.max_rr_ms
                ),
                suggestion: None,
            });
        }
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("zone_hits", "zone_hits"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("zone_hit", "zone_hits"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let value: toml::Value = "[connection]\nconnect_timeout_ms = 1\n".parse().unwrap();
        let keys = walk_toml_keys(&value, "");
        assert!(keys.contains(&"connection".to_string()));
        assert!(keys.contains(&"connection.connect_timeout_ms".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("[coherence]\nzone_hit = 4\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "coherence.zone_hit");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("coherence.zone_hits"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let text = MonitorConfig::default().to_toml().unwrap();
        assert!(validate_unknown_keys(&text).is_empty());
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let warnings = validate_unknown_keys("[dashboard]\nport = 8080\n");
        assert!(warnings.iter().any(|w| w.field == "dashboard"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("zzzzzzzzzzzzzzzzzzzz", &known).is_none());
    }

    #[test]
    fn test_physical_range_defaults_clean() {
        let (errors, warnings) = validate_physical_ranges(&MonitorConfig::default());
        assert!(errors.is_empty());
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_physical_range_min_hr_too_low() {
        let mut config = MonitorConfig::default();
        config.validation.min_heart_rate_bpm = 0.5;
        let (errors, _) = validate_physical_ranges(&config);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_simulator_outside_accepted_range_warns() {
        let mut config = MonitorConfig::default();
        config.simulator.min_rr_ms = 200;
        let (_, warnings) = validate_physical_ranges(&config);
        assert!(warnings.iter().any(|w| w.field == "simulator"));
    }
}
