use std::{path::Path, time::Duration};

use chrono::{Local, SecondsFormat, Utc};
use serde_json::Value;

/// Reads a loosely typed flag such as `1`, `yes`, `T` or `false`. Anything
/// unrecognised yields `default`.
pub fn booleanize(input: Option<&str>, default: bool) -> bool {
    let Some(value) = input.map(str::trim).filter(|v| !v.is_empty()) else {
        return default;
    };

    if leading_integer(value).is_some_and(|n| n > 0) {
        return true;
    }

    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "1" => true,
        "n" | "no" | "f" | "false" | "0" => false,
        _ => default,
    }
}

fn leading_integer(value: &str) -> Option<i64> {
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

pub fn is_running_in_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }

    std::fs::read_to_string("/proc/self/cgroup")
        .map(|cgroup| cgroup.contains("docker"))
        .unwrap_or(false)
}

/// Formats a byte count with metric units and one decimal, e.g. `12.3 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 1000 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = next;
    }

    format!("{:.1} {}", value, unit)
}

/// Elapsed time truncated to whole seconds, e.g. `1m 5s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let truncated = Duration::from_secs(elapsed.as_secs());
    if truncated.is_zero() {
        return format!("{}ms", elapsed.as_millis());
    }

    humantime::format_duration(truncated).to_string()
}

pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn local_timestamp(format: &str) -> String {
    Local::now().format(format).to_string()
}

/// Renders structured data as an indented `key: value` block.
pub fn render_data(data: &Value) -> String {
    let mut lines = Vec::new();
    render_value(data, 0, &mut lines);
    lines.join("\n")
}

fn render_value(value: &Value, indent: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) if map.is_empty() => lines.push(format!("{}{{}}", pad)),
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::Object(inner) if !inner.is_empty() => {
                        lines.push(format!("{}{}:", pad, key));
                        render_value(value, indent + 1, lines);
                    }
                    Value::Array(items) if !items.is_empty() => {
                        lines.push(format!("{}{}:", pad, key));
                        render_value(value, indent + 1, lines);
                    }
                    _ => lines.push(format!("{}{}: {}", pad, key, scalar(value))),
                }
            }
        }
        Value::Array(items) if items.is_empty() => lines.push(format!("{}(empty array)", pad)),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        lines.push(format!("{}-", pad));
                        render_value(item, indent + 1, lines);
                    }
                    _ => lines.push(format!("{}- {}", pad, scalar(item))),
                }
            }
        }
        _ => lines.push(format!("{}{}", pad, scalar(value))),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) if s.is_empty() => "(empty string)".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(_) => "{}".to_string(),
        Value::Array(_) => "(empty array)".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn booleanize_recognises_numbers() {
        assert!(!booleanize(Some("0"), false));
        assert!(!booleanize(Some("0"), true));
        assert!(booleanize(Some("1"), false));
        assert!(booleanize(Some("01"), false));
        assert!(booleanize(Some("42abc"), false));
    }

    #[test]
    fn booleanize_recognises_words_case_insensitively() {
        for yes in ["y", "yes", "t", "true", "YES", " True "] {
            assert!(booleanize(Some(yes), false), "{yes} should be true");
        }
        for no in ["n", "no", "f", "false", "NO", "False"] {
            assert!(!booleanize(Some(no), true), "{no} should be false");
        }
    }

    #[test]
    fn booleanize_honours_default_when_unrecognised() {
        assert!(!booleanize(Some("-1"), false));
        assert!(booleanize(Some("-1"), true));
        assert!(!booleanize(Some("yesss"), false));
        assert!(booleanize(Some("yesss"), true));
        assert!(booleanize(None, true));
        assert!(!booleanize(Some(""), false));
    }

    #[test]
    fn format_bytes_uses_metric_units() {
        assert_eq!(format_bytes(999), "999 B");
        assert_eq!(format_bytes(1_500), "1.5 kB");
        assert_eq!(format_bytes(12_345_678), "12.3 MB");
    }

    #[test]
    fn format_elapsed_truncates_to_seconds() {
        assert_eq!(format_elapsed(Duration::from_millis(65_400)), "1m 5s");
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn render_data_nests_objects_and_arrays() {
        let rendered = render_data(&json!({
            "user": { "name": "ada", "tags": ["a", "b"] },
            "empty": ""
        }));

        assert_eq!(
            rendered,
            "empty: (empty string)\nuser:\n  name: ada\n  tags:\n    - a\n    - b"
        );
    }
}
