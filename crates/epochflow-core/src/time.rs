//! Instants, durations and epoch arithmetic
//!
//! Instants are `chrono::DateTime<Utc>` and durations are `chrono::Duration`.
//! The epoch engine works at nanosecond resolution: [`EPSILON`] is one
//! nanosecond and [`eps_before`] yields the latest instant strictly before a
//! given epoch, which is the timestamp stamped on that epoch's output.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Smallest representable step between two instants.
pub const EPSILON: Duration = Duration::nanoseconds(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid duration literal: {0}")]
    InvalidDuration(String),

    #[error("Invalid timestamp literal: {0}")]
    InvalidTimestamp(String),
}

/// The Unix epoch, used as the default alignment origin for periodic epochs.
pub fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_nanos(0)
}

/// Nanoseconds since the Unix epoch, saturating outside the i64 range.
pub fn to_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt()
        .unwrap_or(if t.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

pub fn from_nanos(ns: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_nanos(ns)
}

/// The instant one [`EPSILON`] before `t`, or `t` itself at the lower bound
/// of the representable range.
pub fn eps_before(t: DateTime<Utc>) -> DateTime<Utc> {
    t.checked_sub_signed(EPSILON).unwrap_or(t)
}

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Nanoseconds since the Unix epoch over the full range of `DateTime<Utc>`.
fn wide_nanos(t: DateTime<Utc>) -> i128 {
    t.timestamp() as i128 * NANOS_PER_SEC + t.timestamp_subsec_nanos() as i128
}

fn from_wide_nanos(ns: i128) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(ns.div_euclid(NANOS_PER_SEC)).ok()?;
    let nanos = ns.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// First epoch of the grid `on + k * every` strictly after `t`.
///
/// Returns `None` when `every` is not positive or the result falls outside
/// the representable range.
pub fn align_after(t: DateTime<Utc>, on: DateTime<Utc>, every: Duration) -> Option<DateTime<Utc>> {
    let step = every.num_seconds() as i128 * NANOS_PER_SEC + every.subsec_nanos() as i128;
    if step <= 0 {
        return None;
    }
    let origin = wide_nanos(on);
    let k = (wide_nanos(t) - origin).div_euclid(step) + 1;
    from_wide_nanos(origin + k * step)
}

/// Parse a duration literal such as `500ms`, `5s`, `1m30s`, `2h` or `1d`.
///
/// Supported units: `ns`, `us`, `ms`, `s`, `m`, `h`, `d`, `w`.
pub fn parse_duration(literal: &str) -> Result<Duration, TimeError> {
    let err = || TimeError::InvalidDuration(literal.to_string());
    let text = literal.trim();
    if text.is_empty() {
        return Err(err());
    }

    let mut total = Duration::zero();
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(err)?;
        if digits == 0 {
            return Err(err());
        }
        let amount: i64 = rest[..digits].parse().map_err(|_| err())?;
        rest = &rest[digits..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ns" => Duration::nanoseconds(amount),
            "us" => Duration::microseconds(amount),
            "ms" => Duration::milliseconds(amount),
            "s" => Duration::try_seconds(amount).ok_or_else(err)?,
            "m" => Duration::try_minutes(amount).ok_or_else(err)?,
            "h" => Duration::try_hours(amount).ok_or_else(err)?,
            "d" => Duration::try_days(amount).ok_or_else(err)?,
            "w" => Duration::try_weeks(amount).ok_or_else(err)?,
            _ => return Err(err()),
        };
        total = total.checked_add(&part).ok_or_else(err)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

/// Parse an RFC 3339 instant such as `2024-01-01T00:00:00Z`.
pub fn parse_instant(literal: &str) -> Result<DateTime<Utc>, TimeError> {
    DateTime::parse_from_rfc3339(literal.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| TimeError::InvalidTimestamp(literal.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_eps_before_sorts_first() {
        let t = at(10);
        let eob = eps_before(t);
        assert!(eob < t);
        assert_eq!(t - eob, EPSILON);
    }

    #[test]
    fn test_align_after_from_origin() {
        let every = Duration::seconds(5);
        assert_eq!(align_after(at(1), unix_epoch(), every), Some(at(5)));
        assert_eq!(align_after(at(5), unix_epoch(), every), Some(at(10)));
        assert_eq!(align_after(at(9), unix_epoch(), every), Some(at(10)));
    }

    #[test]
    fn test_align_after_with_phase() {
        let every = Duration::seconds(10);
        let on = at(3);
        assert_eq!(align_after(at(0), on, every), Some(at(3)));
        assert_eq!(align_after(at(3), on, every), Some(at(13)));
        assert_eq!(align_after(at(27), on, every), Some(at(33)));
    }

    #[test]
    fn test_align_after_before_origin() {
        let every = Duration::seconds(10);
        assert_eq!(align_after(at(-15), at(0), every), Some(at(-10)));
    }

    #[test]
    fn test_align_after_rejects_zero_interval() {
        assert_eq!(align_after(at(1), unix_epoch(), Duration::zero()), None);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("100ns").unwrap(), Duration::nanoseconds(100));
        assert_eq!(parse_duration("10us").unwrap(), Duration::microseconds(10));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::milliseconds(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::seconds(5));
        assert_eq!(parse_duration("2h").unwrap(), Duration::hours(2));
        assert_eq!(parse_duration("1d").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("1w").unwrap(), Duration::weeks(1));
    }

    #[test]
    fn test_parse_duration_compound() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::seconds(90));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in ["", "s", "5", "5x", "five seconds", "-5s", "5s3"] {
            assert!(parse_duration(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_parse_instant() {
        let t = parse_instant("1970-01-01T00:00:10Z").unwrap();
        assert_eq!(t, at(10));
        assert!(matches!(
            parse_instant("yesterday"),
            Err(TimeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_align_after_past_nanosecond_range() {
        let t = parse_instant("2300-01-01T00:00:01Z").unwrap();
        let next = align_after(t, unix_epoch(), Duration::seconds(5));
        assert_eq!(next, Some(parse_instant("2300-01-01T00:00:05Z").unwrap()));

        let t = parse_instant("1600-06-01T00:00:03Z").unwrap();
        let next = align_after(t, unix_epoch(), Duration::seconds(10));
        assert_eq!(next, Some(parse_instant("1600-06-01T00:00:10Z").unwrap()));
    }

    #[test]
    fn test_align_after_interval_wider_than_nanos() {
        let every = Duration::days(200 * 365);
        assert_eq!(align_after(at(1), unix_epoch(), every), Some(unix_epoch() + every));
    }

    #[test]
    fn test_align_after_out_of_range_is_none() {
        let every = Duration::days(365);
        assert_eq!(align_after(DateTime::<Utc>::MAX_UTC, unix_epoch(), every), None);
    }

    #[test]
    fn test_eps_before_saturates_at_min() {
        assert_eq!(eps_before(DateTime::<Utc>::MIN_UTC), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_nanos_roundtrip() {
        let t = DateTime::from_timestamp(1_700_000_000, 123).unwrap();
        assert_eq!(from_nanos(to_nanos(t)), t);
    }
}
