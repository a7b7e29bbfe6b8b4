//! Points and batch marks flowing through the reduce operator

use chrono::{DateTime, Utc};
use epochflow_core::Value;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Type alias for IndexMap with FxBuildHasher for faster hashing of point fields.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// A shared reference to a Point.
///
/// Windows buffer the points they have seen; sharing avoids one deep clone per
/// windowed reducer in a row.
pub type SharedPoint = Arc<Point>;

/// A record: ordered fields plus an optional timestamp.
///
/// Timeless points (control records) are always admitted and never age out of
/// a window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: FxIndexMap<String, Value>,
}

impl Point {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a point stamped with `time`.
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            time: Some(time),
            fields: IndexMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn with_time(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.time = time;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|v| v.as_float())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(|v| v.as_int())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn is_timeless(&self) -> bool {
        self.time.is_none()
    }
}

/// Upstream batch boundary signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    pub time: DateTime<Utc>,
}

impl Mark {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_point_at() {
        let p = Point::at(at(5));
        assert_eq!(p.time, Some(at(5)));
        assert!(p.fields.is_empty());
        assert!(!p.is_timeless());
    }

    #[test]
    fn test_point_with_fields_keeps_order() {
        let p = Point::new()
            .with_field("b", 1i64)
            .with_field("a", "x")
            .with_field("c", 2.5f64);
        let keys: Vec<&str> = p.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert!(p.is_timeless());
    }

    #[test]
    fn test_point_typed_getters() {
        let p = Point::new()
            .with_field("price", 19.5f64)
            .with_field("qty", 3i64)
            .with_field("host", "web-1");
        assert_eq!(p.get_float("price"), Some(19.5));
        assert_eq!(p.get_float("qty"), Some(3.0));
        assert_eq!(p.get_int("qty"), Some(3));
        assert_eq!(p.get_str("host"), Some("web-1"));
        assert_eq!(p.get_str("qty"), None);
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn test_point_set_overwrites() {
        let mut p = Point::new().with_field("k", "first");
        p.set("k", "second");
        assert_eq!(p.get_str("k"), Some("second"));
        assert_eq!(p.fields.len(), 1);
    }

    #[test]
    fn test_point_json_omits_missing_time() {
        let p = Point::new().with_field("count", 0i64);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"fields":{"count":0}}"#);
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
