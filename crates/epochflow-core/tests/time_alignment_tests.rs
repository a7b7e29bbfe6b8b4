//! Property and coverage tests for epochflow_core time arithmetic.

use chrono::{DateTime, Duration, Utc};
use epochflow_core::time::{align_after, eps_before, from_nanos, parse_duration, EPSILON};
use epochflow_core::Value;
use proptest::prelude::*;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

// =============================================================================
// Alignment properties
// =============================================================================

proptest! {
    /// The next epoch is strictly after `t` and at most one interval away.
    #[test]
    fn align_after_is_next_grid_point(
        t in -1_000_000_000_000i64..1_000_000_000_000i64,
        on in -1_000_000_000i64..1_000_000_000i64,
        every in 1i64..10_000_000_000i64,
    ) {
        let t = from_nanos(t);
        let on = from_nanos(on);
        let every = Duration::nanoseconds(every);
        let next = align_after(t, on, every).unwrap();

        prop_assert!(next > t);
        prop_assert!(next - t <= every);
        let offset = (next - on).num_nanoseconds().unwrap();
        prop_assert_eq!(offset.rem_euclid(every.num_nanoseconds().unwrap()), 0);
    }

    /// Output timestamps sort before the epoch and after everything earlier.
    #[test]
    fn eps_before_is_immediate_predecessor(secs in -1_000_000i64..1_000_000i64) {
        let epoch = at(secs);
        let eob = eps_before(epoch);
        prop_assert!(eob < epoch);
        prop_assert!(eob >= epoch - EPSILON);
    }
}

proptest! {
    /// Grid arithmetic holds across the whole calendar, not just the
    /// nanosecond-representable years.
    #[test]
    fn align_after_spans_full_range(
        t in -200_000_000_000i64..200_000_000_000i64,
        every in 1i64..1_000_000i64,
    ) {
        let t = at(t);
        let every = Duration::seconds(every);
        let next = align_after(t, at(0), every).unwrap();

        prop_assert!(next > t);
        prop_assert!(next - t <= every);
        prop_assert_eq!(next.timestamp().rem_euclid(every.num_seconds()), 0);
    }
}

#[test]
fn align_after_past_year_2262() {
    let t = DateTime::parse_from_rfc3339("2300-01-01T00:00:01.5Z")
        .unwrap()
        .with_timezone(&Utc);
    let next = align_after(t, at(0), Duration::milliseconds(250)).unwrap();
    assert_eq!(next - t, Duration::milliseconds(250));
}

#[test]
fn align_after_beyond_calendar_is_none() {
    assert_eq!(align_after(DateTime::<Utc>::MAX_UTC, at(0), Duration::days(1)), None);
}

#[test]
fn eps_before_saturates_at_lower_bound() {
    assert_eq!(eps_before(DateTime::<Utc>::MIN_UTC), DateTime::<Utc>::MIN_UTC);
}

// =============================================================================
// Literal parsing
// =============================================================================

#[test]
fn parse_duration_matches_value_display() {
    for literal in ["5s", "2m", "3h", "1d", "250ms", "40us", "7ns"] {
        let d = parse_duration(literal).unwrap();
        assert_eq!(format!("{}", Value::duration(d)), literal);
    }
}

#[test]
fn parse_duration_large_minutes() {
    assert_eq!(parse_duration("90m").unwrap(), Duration::minutes(90));
}

#[test]
fn align_after_on_grid_point_moves_forward() {
    let every = Duration::seconds(5);
    let next = align_after(at(10), at(0), every).unwrap();
    assert_eq!(next, at(15));
}
