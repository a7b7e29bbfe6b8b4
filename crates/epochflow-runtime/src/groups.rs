//! Group table: per-key aggregation rows
//!
//! Every point is routed by the values of its group-by fields to a [`Row`]
//! holding one reducer per output slot. Rows are created on first lookup.
//! Without group-by fields the table holds exactly one row under the empty
//! key, which exists before any point arrives.

use crate::aggregation::{ReduceSpec, Reducer};
use crate::error::EvalError;
use crate::point::{Point, SharedPoint};
use crate::window::Window;
use chrono::{DateTime, Duration, Utc};
use epochflow_core::Value;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Ordered values of the group-by fields of a point.
///
/// Equality follows [`Value::same_key`], so float keys compare by bit pattern.
#[derive(Debug, Clone, Default)]
pub struct GroupKey(SmallVec<[Value; 2]>);

impl GroupKey {
    /// The key of the single row of an ungrouped table.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a.same_key(b))
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in &self.0 {
            v.hash(state);
        }
    }
}

impl<I: Into<Value>> FromIterator<I> for GroupKey {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Per-key aggregation state: one reducer per output slot.
pub struct Row {
    aliases: Arc<[String]>,
    reducers: Vec<Box<dyn Reducer>>,
}

impl Row {
    pub fn update(&mut self, point: &SharedPoint) {
        for r in &mut self.reducers {
            r.update(point);
        }
    }

    pub fn advance(&mut self, eob: DateTime<Utc>) {
        for r in &mut self.reducers {
            r.advance(eob);
        }
    }

    pub fn reset(&mut self) {
        for r in &mut self.reducers {
            r.reset();
        }
    }

    /// True when no reducer holds any contribution.
    pub fn is_empty(&self) -> bool {
        self.reducers.iter().all(|r| r.is_empty())
    }

    /// Current value of the slot named `alias`.
    pub fn result(&self, alias: &str) -> Result<Value, EvalError> {
        self.aliases
            .iter()
            .position(|a| a == alias)
            .map(|i| self.reducers[i].result())
            .unwrap_or_else(|| Err(EvalError::internal(format!("no reducer slot '{}'", alias))))
    }

    /// Slots in declaration order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, &dyn Reducer)> {
        self.aliases
            .iter()
            .map(String::as_str)
            .zip(self.reducers.iter().map(|r| r.as_ref()))
    }
}

fn build_row(spec: &ReduceSpec, aliases: &Arc<[String]>, over: Option<Duration>) -> Row {
    let reducers = spec
        .instantiate()
        .into_iter()
        .map(|r| match over {
            Some(over) => Box::new(Window::new(over, r)) as Box<dyn Reducer>,
            None => r,
        })
        .collect();
    Row {
        aliases: Arc::clone(aliases),
        reducers,
    }
}

pub struct GroupTable {
    by: Vec<String>,
    spec: ReduceSpec,
    aliases: Arc<[String]>,
    over: Option<Duration>,
    rows: FxHashMap<GroupKey, Row>,
}

impl GroupTable {
    /// A table keyed by the `by` fields. With `over`, every reducer is
    /// wrapped in a [`Window`] of that duration.
    pub fn new(by: Vec<String>, spec: ReduceSpec, over: Option<Duration>) -> Self {
        let aliases: Arc<[String]> = spec.aliases().into();
        let mut table = Self {
            by,
            spec,
            aliases,
            over,
            rows: FxHashMap::default(),
        };
        table.seed();
        table
    }

    fn seed(&mut self) {
        if self.by.is_empty() {
            let row = build_row(&self.spec, &self.aliases, self.over);
            self.rows.insert(GroupKey::empty(), row);
        }
    }

    pub fn by(&self) -> &[String] {
        &self.by
    }

    pub fn is_windowed(&self) -> bool {
        self.over.is_some()
    }

    pub fn spec(&self) -> &ReduceSpec {
        &self.spec
    }

    /// The group key of `point`; missing fields key as null.
    pub fn key_of(&self, point: &Point) -> GroupKey {
        self.by
            .iter()
            .map(|f| point.get(f).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// The row for `point`'s key, created if absent.
    pub fn lookup(&mut self, point: &Point) -> &mut Row {
        let key = self.key_of(point);
        let (spec, aliases, over) = (&self.spec, &self.aliases, self.over);
        self.rows
            .entry(key)
            .or_insert_with(|| build_row(spec, aliases, over))
    }

    pub fn get_row(&self, key: &GroupKey) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &Row)> {
        self.rows.iter()
    }

    /// Apply `f` to every live row. Order is unspecified.
    pub fn for_each(&mut self, mut f: impl FnMut(&GroupKey, &mut Row)) {
        for (key, row) in self.rows.iter_mut() {
            f(key, row);
        }
    }

    pub fn delete(&mut self, key: &GroupKey) -> Option<Row> {
        self.rows.remove(key)
    }

    /// Re-initialize every row's reducers, keeping the key set.
    pub fn reset_rows(&mut self) {
        self.for_each(|_, row| row.reset());
    }

    /// Drop every row. An ungrouped table gets its single row back.
    pub fn reset_table(&mut self) {
        self.rows.clear();
        self.seed();
    }

    /// Write the key's values into `point` under the group-by field names.
    pub fn mixin_key(&self, point: &mut Point, key: &GroupKey) {
        for (field, value) in self.by.iter().zip(key.values()) {
            point.set(field.as_str(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
