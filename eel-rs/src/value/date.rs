//! Timestamp parsing, formatting and epoch-second conversion.
//!
//! Text is parsed with *reducible precision*: a bare year is a valid date,
//! and every lower field down to fractional seconds may be added. The `-`,
//! `:` and `T`/space separators are each optional, so `20240131T2359` and
//! `2024-01-31 23:59` name the same minute. Missing fields take their
//! minimum value and a missing zone means UTC.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Timelike, Utc};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use regex::Regex;

use super::decimal::{Decimal, RoundingMode};

/// A timestamp with its zone offset.
pub type Timestamp = DateTime<FixedOffset>;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^
            (?P<year>[+-]?\d{4})
            (?: -?(?P<month>\d{2})
              (?: -?(?P<day>\d{2})
                (?: [T\x20]?(?P<hour>\d{2})
                  (?: :?(?P<minute>\d{2})
                    (?: :?(?P<second>\d{2})
                      (?: [.,](?P<fraction>\d{1,9}) )?
                    )?
                  )?
                )?
              )?
            )?
            \x20*
            (?P<zone> [Zz] | [+-]\d{2}(?: :?\d{2} )? )?
            $",
        )
        .expect("date pattern is valid")
    })
}

/// The Unix epoch in UTC.
pub fn epoch() -> Timestamp {
    DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Utc.fix())
}

/// Parse the reducible-precision ISO-8601 form.
pub fn parse(text: &str) -> Option<Timestamp> {
    let caps = pattern().captures(text.trim())?;
    let field = |name: &str, default: u32| -> Option<u32> {
        match caps.name(name) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    let nanos = match caps.name("fraction") {
        Some(m) => format!("{:0<9}", m.as_str()).parse().ok()?,
        None => 0,
    };
    let naive = NaiveDate::from_ymd_opt(year, field("month", 1)?, field("day", 1)?)?
        .and_hms_nano_opt(
            field("hour", 0)?,
            field("minute", 0)?,
            field("second", 0)?,
            nanos,
        )?;
    let offset = match caps.name("zone").map(|m| m.as_str()) {
        None | Some("Z") | Some("z") => Utc.fix(),
        Some(zone) => parse_offset(zone)?,
    };
    offset.from_local_datetime(&naive).single()
}

/// `+HH`, `+HHMM` or `+HH:MM`.
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = match digits.get(2..4) {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// ISO-8601 with a numeric offset; the fraction is printed only when
/// non-zero, without trailing zeros.
pub fn format(ts: &Timestamp) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = ts.nanosecond() % NANOS_PER_SECOND as u32;
    if nanos != 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push_str(&ts.format("%:z").to_string());
    out
}

/// Signed seconds since the epoch, fractional when sub-second precision exists.
pub fn to_seconds(ts: &Timestamp) -> Decimal {
    let nanos = BigInt::from(ts.timestamp()) * NANOS_PER_SECOND
        + BigInt::from(ts.timestamp_subsec_nanos());
    Decimal::new(nanos, 9)
}

/// Epoch seconds to a UTC timestamp; digits beyond nanoseconds are dropped.
pub fn from_seconds(seconds: &Decimal) -> Option<Timestamp> {
    if seconds.integer_digits() > 19 {
        return None;
    }
    let seconds = &seconds.round_to_scale(9, RoundingMode::Floor).ok()?;
    let whole = seconds.floor();
    let fraction = seconds - &Decimal::from(whole.clone());
    let nanos = (&fraction * &Decimal::from(NANOS_PER_SECOND)).trunc().to_u32()?;
    let utc = DateTime::<Utc>::from_timestamp(whole.to_i64()?, nanos)?;
    Some(utc.with_timezone(&Utc.fix()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(text: &str) -> String {
        format(&parse(text).expect("parsable date"))
    }

    #[test]
    fn year_alone() {
        assert_eq!(utc("2024"), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn reducible_precision() {
        assert_eq!(utc("2024-03"), "2024-03-01T00:00:00+00:00");
        assert_eq!(utc("2024-03-15"), "2024-03-15T00:00:00+00:00");
        assert_eq!(utc("2024-03-15T10"), "2024-03-15T10:00:00+00:00");
        assert_eq!(utc("2024-03-15 10:30"), "2024-03-15T10:30:00+00:00");
        assert_eq!(utc("2024-03-15T10:30:45"), "2024-03-15T10:30:45+00:00");
    }

    #[test]
    fn compact_form() {
        assert_eq!(utc("20240315103045"), "2024-03-15T10:30:45+00:00");
        assert_eq!(utc("20240315T1030"), "2024-03-15T10:30:00+00:00");
    }

    #[test]
    fn fractions_are_kept_and_trimmed() {
        assert_eq!(utc("2024-03-15T10:30:45.250"), "2024-03-15T10:30:45.25+00:00");
        assert_eq!(utc("2024-03-15T10:30:45.000"), "2024-03-15T10:30:45+00:00");
    }

    #[test]
    fn zones() {
        assert_eq!(utc("2024-03-15T10:30:00Z"), "2024-03-15T10:30:00+00:00");
        assert_eq!(utc("2024-03-15T10:30:00+02:00"), "2024-03-15T10:30:00+02:00");
        assert_eq!(utc("2024-03-15T10:30:00-0530"), "2024-03-15T10:30:00-05:30");
        assert_eq!(utc("2024-03-15T10:30:00 +01"), "2024-03-15T10:30:00+01:00");
    }

    #[test]
    fn rejects_invalid_dates() {
        assert!(parse("").is_none());
        assert!(parse("2024-13-01").is_none());
        assert!(parse("2024-02-30").is_none());
        assert!(parse("yesterday").is_none());
        assert!(parse("2024-01-01T25").is_none());
    }

    #[test]
    fn epoch_seconds_round_trip() {
        let ts = parse("1970-01-01T00:00:01.5Z").unwrap();
        assert_eq!(to_seconds(&ts), "1.5".parse::<Decimal>().unwrap());
        let back = from_seconds(&"1.5".parse().unwrap()).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn negative_fractional_seconds() {
        let ts = from_seconds(&"-1.5".parse().unwrap()).unwrap();
        assert_eq!(format(&ts), "1969-12-31T23:59:58.5+00:00");
        assert_eq!(to_seconds(&ts), "-1.5".parse::<Decimal>().unwrap());
    }

    #[test]
    fn epoch_formats_with_numeric_offset() {
        assert_eq!(format(&epoch()), "1970-01-01T00:00:00+00:00");
    }
}
