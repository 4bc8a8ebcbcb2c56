//! Go-compatible duration text (`300ms`, `1.5s`, `1h30m`).
//!
//! Flags and config files carry timeouts in the syntax operators already use
//! for Kubernetes components, so parsing accepts exactly that grammar: an
//! optional sign followed by one or more `<decimal><unit>` pairs, with units
//! `ns`, `us` (`µs`, `μs`), `ms`, `s`, `m`, `h`. Negative values are rejected
//! because a timeout can't be negative.

use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Largest duration Go can represent; anything longer is rejected.
const MAX_NANOS: u128 = i64::MAX as u128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration {text:?}: {reason}")]
pub struct DurationError {
    pub text: String,
    pub reason: &'static str,
}

fn invalid(text: &str, reason: &'static str) -> DurationError {
    DurationError {
        text: text.to_string(),
        reason,
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

/// Parse a Go-style duration string.
pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    let mut s = text;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    } else if let Some(rest) = s.strip_prefix('-') {
        s = rest;
        negative = true;
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid(text, "empty"));
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        let (int_part, rest) = split_digits(s);
        let (frac_part, rest) = match rest.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", rest),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(text, "expected a number"));
        }

        let unit_end = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (unit, tail) = rest.split_at(unit_end);
        if unit.is_empty() {
            return Err(invalid(text, "missing unit"));
        }
        let scale = unit_nanos(unit).ok_or_else(|| invalid(text, "unknown unit"))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid(text, "overflow"))?
        };
        let value = whole
            .checked_mul(scale)
            .ok_or_else(|| invalid(text, "overflow"))?;

        // Digits past nanosecond precision can't change the result.
        let mut frac: u128 = 0;
        let mut denom: u128 = 1;
        for digit in frac_part.bytes().take(18) {
            frac = frac * 10 + u128::from(digit - b'0');
            denom *= 10;
        }
        let value = value
            .checked_add(frac * scale / denom)
            .ok_or_else(|| invalid(text, "overflow"))?;

        total = total
            .checked_add(value)
            .filter(|t| *t <= MAX_NANOS)
            .ok_or_else(|| invalid(text, "overflow"))?;
        s = tail;
    }

    if negative && total > 0 {
        return Err(invalid(text, "negative durations are not allowed"));
    }
    Ok(Duration::from_nanos(total as u64))
}

fn fraction(rem: u128, digits: usize) -> String {
    if rem == 0 {
        return String::new();
    }
    let padded = format!("{:0width$}", rem, width = digits);
    format!(".{}", padded.trim_end_matches('0'))
}

/// Format a duration the way Go's `time.Duration.String` does (`1h0m0s`, `1.5s`, `300ms`).
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_SEC {
        let (digits, unit) = match nanos {
            n if n < 1_000 => (0, "ns"),
            n if n < 1_000_000 => (3, "µs"),
            _ => (6, "ms"),
        };
        let scale = 10u128.pow(digits as u32);
        return format!("{}{}{}", nanos / scale, fraction(nanos % scale, digits), unit);
    }

    let secs = nanos / NANOS_PER_SEC;
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!(
        "{}{}s",
        secs % 60,
        fraction(nanos % NANOS_PER_SEC, 9)
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_units() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("+5s").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn parses_fractions_and_compounds() {
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(
            parse_duration("1m0.25s").unwrap(),
            Duration::from_millis(60_250)
        );
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["", "s", "10", "10x", "1.5.5s", "-5s", "abc", ".s", "1h-2m"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
        assert!(parse_duration("9999999999999h").is_err());
        // Whole part fits, the fraction tips it over.
        let edge = format!("{}.999999999us", u128::MAX / 1000);
        assert!(parse_duration(&edge).is_err());
    }

    #[test]
    fn formats_like_go() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(7)), "7ns");
        assert_eq!(format_duration(Duration::from_nanos(1_500)), "1.5µs");
        assert_eq!(format_duration(Duration::from_millis(300)), "300ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m0s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m0s");
    }

    #[test]
    fn parse_format_is_idempotent() {
        for text in ["300ms", "1.5s", "1h30m", "45s", "2h0m5.000001s", "1.5µs", "0"] {
            let once = parse_duration(text).unwrap();
            let formatted = format_duration(once);
            let twice = parse_duration(&formatted).unwrap();
            assert_eq!(once, twice, "{text}");
            assert_eq!(format_duration(twice), formatted);
        }
    }
}
