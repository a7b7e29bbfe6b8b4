//! Reducers: incremental aggregation state for one output slot.
//!
//! The epoch engine consumes reducers only through the [`Reducer`] trait:
//! points are folded in with `update`, windows age them out with `retract`
//! (or a reset-and-replay when retraction is unsupported), the engine clears
//! them with `reset` at epoch boundaries and reads them with `result`.
//!
//! # Built-in reducers
//!
//! | Function | Description | Retractable |
//! |----------|-------------|-------------|
//! | [`Count`] | Count points (optionally those carrying a field) | Yes |
//! | [`Sum`] | Sum of a numeric field | Yes |
//! | [`Avg`] | Average of a numeric field | Yes |
//! | [`StdDev`] | Sample standard deviation (Welford) | Yes |
//! | [`Min`] / [`Max`] | Extremes of a numeric field | No |
//! | [`First`] / [`Last`] | First / last value of a field | No |
//!
//! # Example
//!
//! ```rust,ignore
//! use epochflow_runtime::aggregation::{self, ReduceSpec};
//!
//! let spec = ReduceSpec::new()
//!     .add("count", aggregation::count())
//!     .add("total", aggregation::sum("bytes"))
//!     .add("p_avg", aggregation::avg("latency"));
//! ```

use crate::error::EvalError;
use crate::groups::Row;
use crate::point::{Point, SharedPoint};
use chrono::{DateTime, Utc};
use epochflow_core::Value;
use std::sync::Arc;

/// Incremental aggregation state for one output slot of a row.
pub trait Reducer: Send {
    /// Returns the name of this reducer (e.g., "sum", "avg").
    fn name(&self) -> &str;

    /// Fold one point into the state.
    fn update(&mut self, point: &SharedPoint);

    /// Remove a previously folded point. Returns `false` when the reducer
    /// cannot retract, in which case the caller resets and replays.
    fn retract(&mut self, _point: &SharedPoint) -> bool {
        false
    }

    /// Age state to the end-of-batch instant. No-op unless windowed.
    fn advance(&mut self, _eob: DateTime<Utc>) {}

    /// Clear to the identity state.
    fn reset(&mut self);

    /// Whether any point currently contributes to the state.
    fn is_empty(&self) -> bool;

    /// Current aggregate value.
    fn result(&self) -> Result<Value, EvalError>;
}

/// Builds a fresh reducer for each new row.
pub type ReducerFactory = Arc<dyn Fn() -> Box<dyn Reducer> + Send + Sync>;

/// Numeric accumulator shared by the sum-like reducers.
///
/// Non-numeric values are counted rather than folded so that the type error
/// surfaces at evaluation time and disappears once the offending point is
/// retracted.
#[derive(Debug, Default, Clone)]
struct Numeric {
    total: f64,
    n: u64,
    invalid: u64,
    invalid_type: Option<&'static str>,
}

impl Numeric {
    fn add(&mut self, value: Option<&Value>) {
        match value {
            None | Some(Value::Null) => {}
            Some(v) if v.is_numeric() => {
                self.total += v.as_float().unwrap_or_default();
                self.n += 1;
            }
            Some(v) => {
                self.invalid += 1;
                self.invalid_type = Some(v.type_name());
            }
        }
    }

    fn remove(&mut self, value: Option<&Value>) {
        match value {
            None | Some(Value::Null) => {}
            Some(v) if v.is_numeric() => {
                self.n = self.n.saturating_sub(1);
                self.total = if self.n == 0 {
                    0.0
                } else {
                    self.total - v.as_float().unwrap_or_default()
                };
            }
            Some(_) => self.invalid = self.invalid.saturating_sub(1),
        }
    }

    fn check(&self, reducer: &str, field: &str) -> Result<(), EvalError> {
        if self.invalid == 0 {
            return Ok(());
        }
        Err(EvalError::runtime(format!(
            "{}({}): cannot aggregate {} value",
            reducer,
            field,
            self.invalid_type.unwrap_or("non-numeric")
        )))
    }

    fn is_empty(&self) -> bool {
        self.n == 0 && self.invalid == 0
    }
}

/// Count of points, or of points carrying a non-null `field`.
pub struct Count {
    field: Option<String>,
    n: u64,
}

impl Count {
    pub fn new(field: Option<String>) -> Self {
        Self { field, n: 0 }
    }

    fn counts(&self, point: &Point) -> bool {
        match &self.field {
            None => true,
            Some(f) => point.get(f).is_some_and(|v| !v.is_null()),
        }
    }
}

impl Reducer for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn update(&mut self, point: &SharedPoint) {
        if self.counts(point) {
            self.n += 1;
        }
    }

    fn retract(&mut self, point: &SharedPoint) -> bool {
        if self.counts(point) {
            self.n = self.n.saturating_sub(1);
        }
        true
    }

    fn reset(&mut self) {
        self.n = 0;
    }

    fn is_empty(&self) -> bool {
        self.n == 0
    }

    fn result(&self) -> Result<Value, EvalError> {
        Ok(Value::Int(self.n as i64))
    }
}

/// Sum aggregation
pub struct Sum {
    field: String,
    acc: Numeric,
}

impl Sum {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            acc: Numeric::default(),
        }
    }
}

impl Reducer for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn update(&mut self, point: &SharedPoint) {
        self.acc.add(point.get(&self.field));
    }

    fn retract(&mut self, point: &SharedPoint) -> bool {
        self.acc.remove(point.get(&self.field));
        true
    }

    fn reset(&mut self) {
        self.acc = Numeric::default();
    }

    fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    fn result(&self) -> Result<Value, EvalError> {
        self.acc.check("sum", &self.field)?;
        Ok(Value::Float(self.acc.total))
    }
}

/// Average aggregation; `null` over an empty window.
pub struct Avg {
    field: String,
    acc: Numeric,
}

impl Avg {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            acc: Numeric::default(),
        }
    }
}

impl Reducer for Avg {
    fn name(&self) -> &str {
        "avg"
    }

    fn update(&mut self, point: &SharedPoint) {
        self.acc.add(point.get(&self.field));
    }

    fn retract(&mut self, point: &SharedPoint) -> bool {
        self.acc.remove(point.get(&self.field));
        true
    }

    fn reset(&mut self) {
        self.acc = Numeric::default();
    }

    fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    fn result(&self) -> Result<Value, EvalError> {
        self.acc.check("avg", &self.field)?;
        if self.acc.n == 0 {
            return Ok(Value::Null);
        }
        Ok(Value::Float(self.acc.total / self.acc.n as f64))
    }
}

/// Sample standard deviation (Welford's online algorithm, with removal).
pub struct StdDev {
    field: String,
    count: u64,
    mean: f64,
    m2: f64,
    invalid: u64,
}

impl StdDev {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            count: 0,
            mean: 0.0,
            m2: 0.0,
            invalid: 0,
        }
    }
}

impl Reducer for StdDev {
    fn name(&self) -> &str {
        "stddev"
    }

    fn update(&mut self, point: &SharedPoint) {
        match point.get(&self.field) {
            None | Some(Value::Null) => {}
            Some(v) if v.is_numeric() => {
                let x = v.as_float().unwrap_or_default();
                self.count += 1;
                let delta = x - self.mean;
                self.mean += delta / self.count as f64;
                self.m2 += delta * (x - self.mean);
            }
            Some(_) => self.invalid += 1,
        }
    }

    fn retract(&mut self, point: &SharedPoint) -> bool {
        match point.get(&self.field) {
            None | Some(Value::Null) => {}
            Some(v) if v.is_numeric() => {
                let x = v.as_float().unwrap_or_default();
                if self.count <= 1 {
                    self.count = 0;
                    self.mean = 0.0;
                    self.m2 = 0.0;
                } else {
                    self.count -= 1;
                    let delta = x - self.mean;
                    self.mean -= delta / self.count as f64;
                    self.m2 = (self.m2 - delta * (x - self.mean)).max(0.0);
                }
            }
            Some(_) => self.invalid = self.invalid.saturating_sub(1),
        }
        true
    }

    fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.invalid = 0;
    }

    fn is_empty(&self) -> bool {
        self.count == 0 && self.invalid == 0
    }

    fn result(&self) -> Result<Value, EvalError> {
        if self.invalid > 0 {
            return Err(EvalError::runtime(format!(
                "stddev({}): cannot aggregate non-numeric value",
                self.field
            )));
        }
        if self.count < 2 {
            return Ok(Value::Null);
        }
        Ok(Value::Float((self.m2 / (self.count - 1) as f64).sqrt()))
    }
}

#[derive(Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

/// Shared state for [`Min`] and [`Max`].
struct ExtremeState {
    which: Extreme,
    field: String,
    best: Option<f64>,
    acc: Numeric,
}

impl ExtremeState {
    fn new(which: Extreme, field: String) -> Self {
        Self {
            which,
            field,
            best: None,
            acc: Numeric::default(),
        }
    }

    fn update(&mut self, point: &Point) {
        let value = point.get(&self.field);
        self.acc.add(value);
        if let Some(x) = value.filter(|v| v.is_numeric()).and_then(Value::as_float) {
            self.best = Some(match (self.best, self.which) {
                (None, _) => x,
                (Some(b), Extreme::Min) => b.min(x),
                (Some(b), Extreme::Max) => b.max(x),
            });
        }
    }

    fn reset(&mut self) {
        self.best = None;
        self.acc = Numeric::default();
    }

    fn result(&self, name: &str) -> Result<Value, EvalError> {
        self.acc.check(name, &self.field)?;
        Ok(self.best.map(Value::Float).unwrap_or(Value::Null))
    }
}

/// Minimum of a numeric field. Not retractable.
pub struct Min(ExtremeState);

impl Min {
    pub fn new(field: impl Into<String>) -> Self {
        Self(ExtremeState::new(Extreme::Min, field.into()))
    }
}

impl Reducer for Min {
    fn name(&self) -> &str {
        "min"
    }

    fn update(&mut self, point: &SharedPoint) {
        self.0.update(point);
    }

    fn reset(&mut self) {
        self.0.reset();
    }

    fn is_empty(&self) -> bool {
        self.0.acc.is_empty()
    }

    fn result(&self) -> Result<Value, EvalError> {
        self.0.result("min")
    }
}

/// Maximum of a numeric field. Not retractable.
pub struct Max(ExtremeState);

impl Max {
    pub fn new(field: impl Into<String>) -> Self {
        Self(ExtremeState::new(Extreme::Max, field.into()))
    }
}

impl Reducer for Max {
    fn name(&self) -> &str {
        "max"
    }

    fn update(&mut self, point: &SharedPoint) {
        self.0.update(point);
    }

    fn reset(&mut self) {
        self.0.reset();
    }

    fn is_empty(&self) -> bool {
        self.0.acc.is_empty()
    }

    fn result(&self) -> Result<Value, EvalError> {
        self.0.result("max")
    }
}

/// First value of a field.
pub struct First {
    field: String,
    value: Option<Value>,
    seen: u64,
}

impl First {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: None,
            seen: 0,
        }
    }
}

impl Reducer for First {
    fn name(&self) -> &str {
        "first"
    }

    fn update(&mut self, point: &SharedPoint) {
        self.seen += 1;
        if self.value.is_none() {
            self.value = point.get(&self.field).cloned();
        }
    }

    fn reset(&mut self) {
        self.value = None;
        self.seen = 0;
    }

    fn is_empty(&self) -> bool {
        self.seen == 0
    }

    fn result(&self) -> Result<Value, EvalError> {
        Ok(self.value.clone().unwrap_or(Value::Null))
    }
}

/// Last value of a field.
pub struct Last {
    field: String,
    value: Option<Value>,
    seen: u64,
}

impl Last {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: None,
            seen: 0,
        }
    }
}

impl Reducer for Last {
    fn name(&self) -> &str {
        "last"
    }

    fn update(&mut self, point: &SharedPoint) {
        self.seen += 1;
        if let Some(v) = point.get(&self.field) {
            self.value = Some(v.clone());
        }
    }

    fn reset(&mut self) {
        self.value = None;
        self.seen = 0;
    }

    fn is_empty(&self) -> bool {
        self.seen == 0
    }

    fn result(&self) -> Result<Value, EvalError> {
        Ok(self.value.clone().unwrap_or(Value::Null))
    }
}

pub fn count() -> ReducerFactory {
    Arc::new(|| Box::new(Count::new(None)))
}

pub fn count_field(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(Count::new(Some(field.clone()))))
}

pub fn sum(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(Sum::new(field.clone())))
}

pub fn avg(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(Avg::new(field.clone())))
}

pub fn stddev(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(StdDev::new(field.clone())))
}

pub fn min(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(Min::new(field.clone())))
}

pub fn max(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(Max::new(field.clone())))
}

pub fn first(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(First::new(field.clone())))
}

pub fn last(field: impl Into<String>) -> ReducerFactory {
    let field = field.into();
    Arc::new(move || Box::new(Last::new(field.clone())))
}

/// Look up a built-in reducer by name.
///
/// `count` without a field counts every point; all other reducers require a
/// field.
pub fn by_name(name: &str, field: Option<&str>) -> Option<ReducerFactory> {
    match (name, field) {
        ("count", None) => Some(count()),
        ("count", Some(f)) => Some(count_field(f)),
        ("sum", Some(f)) => Some(sum(f)),
        ("avg", Some(f)) => Some(avg(f)),
        ("stddev", Some(f)) => Some(stddev(f)),
        ("min", Some(f)) => Some(min(f)),
        ("max", Some(f)) => Some(max(f)),
        ("first", Some(f)) => Some(first(f)),
        ("last", Some(f)) => Some(last(f)),
        _ => None,
    }
}

/// Output expression: fills an output point from a row's reducers.
///
/// The point already carries the epoch timestamp and the group-by fields.
pub trait RowExpr: Send + Sync {
    fn evaluate(&self, point: &mut Point, row: &Row) -> Result<(), EvalError>;
}

impl<F> RowExpr for F
where
    F: Fn(&mut Point, &Row) -> Result<(), EvalError> + Send + Sync,
{
    fn evaluate(&self, point: &mut Point, row: &Row) -> Result<(), EvalError> {
        self(point, row)
    }
}

/// The reduce expression: named reducer slots plus an optional custom
/// output expression. Without one, each slot's result is written under its
/// alias.
#[derive(Clone, Default)]
pub struct ReduceSpec {
    aliases: Vec<String>,
    factories: Vec<ReducerFactory>,
    expr: Option<Arc<dyn RowExpr>>,
}

impl ReduceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, alias: impl Into<String>, factory: ReducerFactory) -> Self {
        self.aliases.push(alias.into());
        self.factories.push(factory);
        self
    }

    pub fn with_expr(mut self, expr: impl RowExpr + 'static) -> Self {
        self.expr = Some(Arc::new(expr));
        self
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Fresh reducers, one per slot, in slot order.
    pub fn instantiate(&self) -> Vec<Box<dyn Reducer>> {
        self.factories.iter().map(|make| make()).collect()
    }

    pub fn evaluate(&self, point: &mut Point, row: &Row) -> Result<(), EvalError> {
        match &self.expr {
            Some(expr) => expr.evaluate(point, row),
            None => {
                for (alias, reducer) in row.slots() {
                    point.set(alias, reducer.result()?);
                }
                Ok(())
            }
        }
    }
}
