//! Value parsing helpers shared by collectors.
//!
//! RouterOS reports most statistics as plain decimal strings, but durations
//! (`1w2d3h4m5s`) and paired counters (`tx,rx`) need dedicated handling.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Errors produced while converting a device-reported field.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// Duration string did not match any recognised unit layout.
    #[error("invalid duration value: '{0}'")]
    Duration(String),

    /// Pair value was not two comma-separated numbers.
    #[error("invalid dual value: '{0}'")]
    DualValue(String),

    /// Plain numeric field could not be converted.
    #[error("invalid number: '{0}'")]
    Number(String),
}

impl ParseError {
    /// Values standing in for a pair that failed to parse: both halves NaN.
    ///
    /// Collectors drop the pair instead of emitting these; they exist for
    /// callers that must keep a slot per half.
    pub fn placeholders(&self) -> Option<(f64, f64)> {
        match self {
            Self::DualValue(_) => Some((f64::NAN, f64::NAN)),
            Self::Duration(_) | Self::Number(_) => None,
        }
    }
}

/// Unit multipliers (in seconds) matching the capture groups of the duration regex.
const DURATION_UNITS: [f64; 6] = [604_800.0, 86_400.0, 3_600.0, 60.0, 1.0, 0.001];

fn duration_regex() -> &'static Regex {
    static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
    DURATION_REGEX.get_or_init(|| {
        Regex::new(r"^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?(?:(\d+)ms)?$")
            .expect("failed to compile duration regex")
    })
}

/// Parse a RouterOS duration string into seconds.
///
/// Units must appear in descending order (`w`, `d`, `h`, `m`, `s`, `ms`) and
/// at least one of them must be present.
///
/// # Examples
///
/// ```
/// use mikrotik_exporter::parse::parse_duration;
///
/// assert_eq!(parse_duration("1h30m").unwrap(), 5400.0);
/// assert_eq!(parse_duration("2w3d").unwrap(), 2.0 * 604800.0 + 3.0 * 86400.0);
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(value: &str) -> Result<f64, ParseError> {
    let caps = duration_regex()
        .captures(value.trim())
        .ok_or_else(|| ParseError::Duration(value.to_string()))?;

    let mut seconds = 0.0;
    let mut matched = false;
    for (i, unit) in DURATION_UNITS.iter().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            let n: u64 = m
                .as_str()
                .parse()
                .map_err(|_| ParseError::Duration(value.to_string()))?;
            seconds += n as f64 * unit;
            matched = true;
        }
    }

    if !matched {
        return Err(ParseError::Duration(value.to_string()));
    }
    Ok(seconds)
}

/// Split a `first,second` pair into two floats.
///
/// Used for counters RouterOS reports as `tx,rx`.
pub fn parse_dual_value(value: &str) -> Result<(f64, f64), ParseError> {
    let err = || ParseError::DualValue(value.to_string());
    let (first, second) = value.split_once(',').ok_or_else(err)?;
    let first = first.trim().parse::<f64>().map_err(|_| err())?;
    let second = second.trim().parse::<f64>().map_err(|_| err())?;
    Ok((first, second))
}

/// Parse a plain decimal field.
pub fn parse_number(value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::Number(value.to_string()))
}

/// Map RouterOS boolean strings to `1.0`/`0.0`.
pub fn bool_value(value: &str) -> f64 {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") {
        1.0
    } else {
        0.0
    }
}
