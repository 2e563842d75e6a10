//! Shared helper functions for CLI commands

use miette::Result;

use crate::entities::value::MeasurementValue;

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Escape a string for CSV output
///
/// Handles commas, quotes, and newlines according to RFC 4180.
pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Render an optional value for tables; absent values show as "-"
pub fn format_value(value: Option<&MeasurementValue>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Split a `slug=value` argument
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((slug, value)) if !slug.trim().is_empty() => {
            Ok((slug.trim().to_string(), value.to_string()))
        }
        _ => Err(miette::miette!(
            "expected SLUG=VALUE, got '{}'",
            raw
        )),
    }
}
