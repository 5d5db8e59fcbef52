//! Human-readable durations such as `90s`, `20m` or `1h30m`

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::{Error, Result};

static FULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:ms|h|m|s))+$").expect("duration pattern is valid")
});

static PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(ms|h|m|s)").expect("duration part pattern is valid"));

/// Parse a duration written as one or more `<number><unit>` parts.
///
/// Units are `ms`, `s`, `m` and `h`. Whitespace around the input is ignored.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    let invalid = || Error::InvalidDuration {
        input: input.to_string(),
    };

    if !FULL.is_match(trimmed) {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    for part in PART.captures_iter(trimmed) {
        let amount: u64 = part[1].parse().map_err(|_| invalid())?;
        let unit = match &part[2] {
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(3600),
            _ => return Err(invalid()),
        };
        let amount = u32::try_from(amount).map_err(|_| invalid())?;
        total = unit
            .checked_mul(amount)
            .and_then(|d| total.checked_add(d))
            .ok_or_else(invalid)?;
    }
    Ok(total)
}

/// Render a duration in the same notation [`parse_duration`] accepts.
pub fn format_duration(duration: Duration) -> String {
    let mut millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in [("h", 3_600_000u128), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
        let count = millis / size;
        if count > 0 {
            out.push_str(&format!("{count}{unit}"));
            millis %= size;
        }
    }
    out
}

/// `#[serde(with = "schema_model::duration::serde_text")]` support.
pub mod serde_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
