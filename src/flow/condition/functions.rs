// SPDX-License-Identifier: MIT

//! Built-in condition functions

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

use crate::flow::error::ExpressionError;

/// Accepted argument counts per function: (min, max)
pub static FUNCTIONS: Lazy<HashMap<&'static str, (usize, usize)>> = Lazy::new(|| {
    HashMap::from([
        ("now", (0, 1)),
        ("datetime", (1, 1)),
        ("datetime.offset", (2, 2)),
        ("datetime.timezone", (2, 2)),
        ("lowercase", (1, 1)),
        ("uppercase", (1, 1)),
    ])
});

/// Check that `name` exists and accepts `count` arguments
pub fn check_arity(name: &str, count: usize) -> Result<(), ExpressionError> {
    let (min, max) = FUNCTIONS
        .get(name)
        .ok_or_else(|| ExpressionError::UnknownFunction(name.to_string()))?;
    if count < *min || count > *max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}-{}", min, max)
        };
        return Err(ExpressionError::Arity {
            function: name.to_string(),
            expected,
            found: count,
        });
    }
    Ok(())
}

/// Call a function with fully resolved arguments
pub fn call(name: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    check_arity(name, args.len())?;
    match name {
        "now" => {
            let now = Utc::now().fixed_offset();
            match args.first() {
                Some(tz) => Ok(format_datetime(parse_timezone(name, tz)?.convert(now))),
                None => Ok(format_datetime(now)),
            }
        }
        "datetime" => Ok(format_datetime(to_datetime(name, &args[0])?)),
        "datetime.offset" => {
            let dt = to_datetime(name, &args[0])?;
            let delta = parse_offset(name, &args[1])?;
            dt.checked_add_signed(delta)
                .map(format_datetime)
                .ok_or_else(|| ExpressionError::invalid_argument(name, "offset out of range"))
        }
        "datetime.timezone" => {
            let dt = to_datetime(name, &args[0])?;
            let zone = parse_timezone(name, &args[1])?;
            Ok(format_datetime(zone.convert(dt)))
        }
        "lowercase" => Ok(Value::String(expect_str(name, &args[0])?.to_lowercase())),
        "uppercase" => Ok(Value::String(expect_str(name, &args[0])?.to_uppercase())),
        other => Err(ExpressionError::UnknownFunction(other.to_string())),
    }
}

fn expect_str<'a>(function: &str, value: &'a Value) -> Result<&'a str, ExpressionError> {
    value
        .as_str()
        .ok_or_else(|| ExpressionError::invalid_argument(function, format!("expected a string, got {}", value)))
}

fn format_datetime(dt: DateTime<FixedOffset>) -> Value {
    Value::String(dt.to_rfc3339())
}

/// Parse a datetime string. Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` (both read as UTC) and plain dates.
pub fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

fn to_datetime(function: &str, value: &Value) -> Result<DateTime<FixedOffset>, ExpressionError> {
    match value {
        Value::String(s) => parse_datetime(s)
            .ok_or_else(|| ExpressionError::invalid_argument(function, format!("'{}' is not a datetime", s))),
        Value::Number(n) => {
            let seconds = n
                .as_f64()
                .ok_or_else(|| ExpressionError::invalid_argument(function, "invalid timestamp"))?;
            let whole = seconds.trunc() as i64;
            let nanos = ((seconds - seconds.trunc()) * 1e9) as u32;
            Utc.timestamp_opt(whole, nanos)
                .single()
                .map(|dt| dt.fixed_offset())
                .ok_or_else(|| ExpressionError::invalid_argument(function, "timestamp out of range"))
        }
        other => Err(ExpressionError::invalid_argument(
            function,
            format!("cannot convert {} to a datetime", other),
        )),
    }
}

/// Parse offsets like `-1m`, `+2 days`, `3h`
fn parse_offset(function: &str, value: &Value) -> Result<Duration, ExpressionError> {
    let text = expect_str(function, value)?.trim();
    let invalid = || ExpressionError::invalid_argument(function, format!("invalid offset '{}'", text));

    let (sign, rest) = match text.chars().next() {
        Some('-') => (-1, &text[1..]),
        Some('+') => (1, &text[1..]),
        _ => (1, text),
    };
    let rest = rest.trim();
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let amount: i64 = rest[..digits_end].parse().map_err(|_| invalid())?;
    let amount = amount * sign;

    let delta = match rest[digits_end..].trim().to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::try_seconds(amount),
        "m" | "min" | "minute" | "minutes" => Duration::try_minutes(amount),
        "h" | "hour" | "hours" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        "w" | "week" | "weeks" => Duration::try_weeks(amount),
        _ => None,
    };
    delta.ok_or_else(invalid)
}

enum Zone {
    Fixed(FixedOffset),
    /// IANA zone; the offset depends on the instant converted
    Named(Tz),
}

impl Zone {
    fn convert(&self, dt: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            Zone::Fixed(offset) => dt.with_timezone(offset),
            Zone::Named(tz) => dt.with_timezone(tz).fixed_offset(),
        }
    }
}

/// Parse `UTC`, `Z`, a fixed offset like `+02:00` / `-0530`, or an IANA
/// zone name like `Europe/Warsaw`
fn parse_timezone(function: &str, value: &Value) -> Result<Zone, ExpressionError> {
    let text = expect_str(function, value)?.trim();
    let invalid = || ExpressionError::invalid_argument(function, format!("unknown timezone '{}'", text));

    if text.eq_ignore_ascii_case("utc") || text == "Z" {
        return FixedOffset::east_opt(0).map(Zone::Fixed).ok_or_else(invalid);
    }

    let sign = match text.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return text.parse::<Tz>().map(Zone::Named).map_err(|_| invalid()),
    };
    let digits: String = text[1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .map(Zone::Fixed)
        .ok_or_else(invalid)
}
