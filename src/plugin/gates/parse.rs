//! Threshold and metric extraction shared by the built-in gates

use crate::core::ConfigMap;
use crate::plugin::StageSnapshot;
use regex::RegexBuilder;

/// First run of digits (and `.`) after `label` in `text`
///
/// Characters between the label and the number are skipped. Returns `None`
/// when the label is absent or no number follows.
pub fn number_after(text: &str, label: &str, ignore_case: bool) -> Option<f64> {
    let label = RegexBuilder::new(&regex::escape(label))
        .case_insensitive(ignore_case)
        .build()
        .ok()?;
    let rest = &text[label.find(text)?.end()..];

    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.trim_end_matches('.').parse().ok()
}

/// First label in `labels` that yields a number
pub fn first_number(text: &str, labels: &[&str], ignore_case: bool) -> Option<f64> {
    labels
        .iter()
        .find_map(|label| number_after(text, label, ignore_case))
}

/// Numeric metadata value; unparsable or non-finite values count as absent
pub fn metadata_number(snapshot: &StageSnapshot, key: &str) -> Option<f64> {
    snapshot
        .metadata_value(key)?
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Threshold from gate config; accepts numbers and numeric strings
pub fn threshold(config: &ConfigMap, key: &str, default: f64) -> f64 {
    config
        .get(key)
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Render a count-like value without a trailing `.0`
pub fn count(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
