//! Runtime values carried by point fields

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration as StdDuration;

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[derive(Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(i64), // nanoseconds since epoch
    Duration(u64),  // nanoseconds
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Timestamp(_) => "timestamp",
            Value::Duration(_) => "duration",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Build a timestamp value from a UTC instant.
    ///
    /// Instants outside the nanosecond-representable range (roughly 1677..2262)
    /// saturate at `i64::MIN` or `i64::MAX`; option validation refuses those.
    pub fn timestamp(t: DateTime<Utc>) -> Self {
        Value::Timestamp(crate::time::to_nanos(t))
    }

    /// Build a duration value. Negative durations clamp to zero.
    pub fn duration(d: chrono::Duration) -> Self {
        Value::Duration(d.num_nanoseconds().unwrap_or(i64::MAX).max(0) as u64)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ns) => Some(DateTime::<Utc>::from_timestamp_nanos(*ns)),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<chrono::Duration> {
        match self {
            Value::Duration(ns) => i64::try_from(*ns).ok().map(chrono::Duration::nanoseconds),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Identity comparison used for grouping.
    ///
    /// Unlike `==`, floats compare by bit pattern so that `NaN` keys group
    /// together, and `Int(1)` never equals `Float(1.0)`.
    pub fn same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_key(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_key(vb))
            }
            _ => self == other,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(n) => n.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Timestamp(ts) => ts.hash(state),
            Value::Duration(d) => d.hash(state),
            Value::Array(a) => a.hash(state),
            Value::Map(m) => {
                m.len().hash(state);
                for (k, v) in m {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Timestamp(ts) => {
                let dt = DateTime::<Utc>::from_timestamp_nanos(*ts);
                write!(f, "@{}", dt.format("%Y-%m-%dT%H:%M:%S%.fZ"))
            }
            Value::Duration(d) => {
                let dur = StdDuration::from_nanos(*d);
                if dur.as_secs() >= 86400 {
                    write!(f, "{}d", dur.as_secs() / 86400)
                } else if dur.as_secs() >= 3600 {
                    write!(f, "{}h", dur.as_secs() / 3600)
                } else if dur.as_secs() >= 60 {
                    write!(f, "{}m", dur.as_secs() / 60)
                } else if dur.as_secs() > 0 {
                    write!(f, "{}s", dur.as_secs())
                } else if dur.as_millis() > 0 {
                    write!(f, "{}ms", dur.as_millis())
                } else if dur.as_micros() > 0 {
                    write!(f, "{}us", dur.as_micros())
                } else {
                    write!(f, "{}ns", dur.as_nanos())
                }
            }
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::timestamp(t)
    }
}

impl From<chrono::Duration> for Value {
    fn from(d: chrono::Duration) -> Self {
        Value::duration(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
