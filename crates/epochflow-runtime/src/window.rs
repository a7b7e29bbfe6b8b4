//! Sliding time window over a reducer
//!
//! A [`Window`] buffers the points folded into the reducer it wraps, and on
//! [`advance`](Window::advance) ages out every point at or before
//! `eob - over`. Retracting reducers are updated incrementally; the others are
//! reset and replayed from the buffered points still live.

use crate::aggregation::Reducer;
use crate::error::EvalError;
use crate::point::SharedPoint;
use chrono::{DateTime, Duration, Utc};
use epochflow_core::Value;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct Window {
    over: Duration,
    reducer: Box<dyn Reducer>,
    /// Timed points, ordered by timestamp.
    points: VecDeque<SharedPoint>,
    /// Timeless points never age out.
    timeless: Vec<SharedPoint>,
    advanced_to: Option<DateTime<Utc>>,
}

impl Window {
    pub fn new(over: Duration, reducer: Box<dyn Reducer>) -> Self {
        Self {
            over,
            reducer,
            points: VecDeque::new(),
            timeless: Vec::new(),
            advanced_to: None,
        }
    }

    pub fn over(&self) -> Duration {
        self.over
    }

    /// Number of points currently held, timeless ones included.
    pub fn len(&self) -> usize {
        self.points.len() + self.timeless.len()
    }

    /// Iterate the buffered timed points in timestamp order.
    pub fn points(&self) -> impl Iterator<Item = &SharedPoint> {
        self.points.iter()
    }

    fn push(&mut self, point: SharedPoint) {
        let Some(time) = point.time else {
            self.timeless.push(point);
            return;
        };
        // Out-of-order arrivals go to their sorted position.
        let at = self
            .points
            .partition_point(|p| p.time.is_some_and(|t| t <= time));
        if at == self.points.len() {
            self.points.push_back(point);
        } else {
            self.points.insert(at, point);
        }
    }

    fn replay(&mut self) {
        self.reducer.reset();
        for p in self.timeless.iter().chain(self.points.iter()) {
            self.reducer.update(p);
        }
    }

    /// Discard all buffered points and the reducer state.
    pub fn clear(&mut self) {
        self.points.clear();
        self.timeless.clear();
        self.reducer.reset();
        self.advanced_to = None;
    }
}

impl Reducer for Window {
    fn name(&self) -> &str {
        self.reducer.name()
    }

    fn update(&mut self, point: &SharedPoint) {
        self.reducer.update(point);
        self.push(Arc::clone(point));
    }

    fn advance(&mut self, eob: DateTime<Utc>) {
        debug_assert!(
            !matches!(self.advanced_to, Some(prev) if prev > eob),
            "window advanced backwards"
        );
        self.advanced_to = Some(eob);

        // A cutoff before the representable range expires nothing.
        let expired = match eob.checked_sub_signed(self.over) {
            Some(cutoff) => self
                .points
                .partition_point(|p| p.time.is_some_and(|t| t <= cutoff)),
            None => 0,
        };
        if expired > 0 {
            let mut incremental = true;
            for p in self.points.drain(..expired) {
                if incremental && !self.reducer.retract(&p) {
                    incremental = false;
                }
            }
            if !incremental {
                self.replay();
            }
        }
        self.reducer.advance(eob);
    }

    /// Per-epoch reset. A sliding window only loses content by aging out, so
    /// the buffered points and the state derived from them stay.
    fn reset(&mut self) {}

    fn is_empty(&self) -> bool {
        self.points.is_empty() && self.timeless.is_empty()
    }

    fn result(&self) -> Result<Value, EvalError> {
        self.reducer.result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{Count, Max, Sum};
    use crate::point::Point;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn pt(secs: i64, value: f64) -> SharedPoint {
        Arc::new(Point::at(at(secs)).with_field("value", value))
    }

    #[test]
    fn test_window_ages_out_points() {
        let mut w = Window::new(Duration::seconds(5), Box::new(Count::new(None)));
        for s in [1, 2, 3, 6, 7] {
            w.update(&pt(s, 1.0));
        }
        assert_eq!(w.result(), Ok(Value::Int(5)));

        // window is (3, 8]
        w.advance(at(8));
        assert_eq!(w.result(), Ok(Value::Int(2)));
        assert_eq!(w.len(), 2);

        w.advance(at(20));
        assert_eq!(w.result(), Ok(Value::Int(0)));
        assert!(w.is_empty());
    }

    #[test]
    fn test_window_lower_bound_is_exclusive() {
        let mut w = Window::new(Duration::seconds(5), Box::new(Count::new(None)));
        w.update(&pt(5, 1.0));
        w.advance(at(10));
        assert!(w.is_empty());
    }

    #[test]
    fn test_non_retracting_reducer_is_replayed() {
        let mut w = Window::new(Duration::seconds(5), Box::new(Max::new("value")));
        w.update(&pt(1, 100.0));
        w.update(&pt(4, 3.0));
        w.update(&pt(5, 7.0));
        assert_eq!(w.result(), Ok(Value::Float(100.0)));

        w.advance(at(8));
        assert_eq!(w.result(), Ok(Value::Float(7.0)));
    }

    #[test]
    fn test_out_of_order_points_are_sorted() {
        let mut w = Window::new(Duration::seconds(5), Box::new(Sum::new("value")));
        w.update(&pt(7, 1.0));
        w.update(&pt(2, 10.0));
        w.update(&pt(6, 100.0));
        let times: Vec<_> = w.points().map(|p| p.time.unwrap()).collect();
        assert_eq!(times, vec![at(2), at(6), at(7)]);

        w.advance(at(8));
        assert_eq!(w.result(), Ok(Value::Float(101.0)));
    }

    #[test]
    fn test_timeless_points_never_age_out() {
        let mut w = Window::new(Duration::seconds(1), Box::new(Count::new(None)));
        w.update(&Arc::new(Point::new().with_field("value", 1.0)));
        w.update(&pt(1, 1.0));
        w.advance(at(100));
        assert_eq!(w.result(), Ok(Value::Int(1)));
        assert!(!w.is_empty());
    }

    #[test]
    fn test_window_wider_than_time_range_keeps_everything() {
        let over = crate::options::ReduceOptions::new()
            .with_over("100000000d")
            .validate()
            .unwrap()
            .over
            .unwrap();
        let mut w = Window::new(over, Box::new(Count::new(None)));
        w.update(&pt(1, 1.0));
        w.advance(at(5));
        assert_eq!(w.result(), Ok(Value::Int(1)));
    }

    #[test]
    fn test_reset_keeps_history_and_clear_drops_it() {
        let mut w = Window::new(Duration::seconds(10), Box::new(Count::new(None)));
        w.update(&pt(1, 1.0));
        w.reset();
        assert_eq!(w.result(), Ok(Value::Int(1)));
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.result(), Ok(Value::Int(0)));
    }
}
