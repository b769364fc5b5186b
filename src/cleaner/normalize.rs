use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::ValidationError;
use crate::models::RawValue;
use crate::utils::normalize_ws;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y"];

/// Drop control characters, collapse whitespace.
pub fn text(s: &str) -> String {
    let kept: String = s
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    normalize_ws(&kept)
}

pub fn rating(value: &RawValue) -> Result<u8, ValidationError> {
    let invalid = || ValidationError::InvalidRating(display(value));
    let n = match value {
        RawValue::Number(n) => n.as_f64().ok_or_else(invalid)?,
        RawValue::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        RawValue::Bool(_) => return Err(invalid()),
    };
    if n.fract() != 0.0 || !(1.0..=5.0).contains(&n) {
        return Err(invalid());
    }
    Ok(n as u8)
}

/// Parse to UTC, truncated to whole seconds so the canonical text form is lossless.
pub fn date(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let s = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|n| n.and_utc())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc())
        })
        .ok_or_else(|| ValidationError::InvalidDate(raw.to_string()))?;
    Ok(parsed.with_nanosecond(0).unwrap_or(parsed))
}

/// Anything not clearly affirmative is `false`.
pub fn verified(value: Option<&RawValue>) -> bool {
    match value {
        Some(RawValue::Bool(b)) => *b,
        Some(RawValue::Number(n)) => n.as_f64() == Some(1.0),
        Some(RawValue::Text(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "1" | "verified"
        ),
        None => false,
    }
}

pub fn display(value: &RawValue) -> String {
    match value {
        RawValue::Bool(b) => b.to_string(),
        RawValue::Number(n) => n.to_string(),
        RawValue::Text(s) => s.clone(),
    }
}
