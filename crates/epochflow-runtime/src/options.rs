//! Reduce operator options
//!
//! [`ReduceOptions`] is the raw, user-facing option set. It can be built in
//! code, parsed from YAML or TOML, or taken from a generic option map, and is
//! checked once by [`ReduceOptions::validate`] into a typed [`ReduceConfig`].
//!
//! # Example YAML options:
//! ```yaml
//! every: 5s
//! over: 1m
//! groupby: [host]
//! forget: true
//! ```
//!
//! Duration options accept literals such as `500ms`, `5s`, `1m`, `2h`, `1d`.
//! Instant options accept RFC 3339 strings such as `2024-01-01T00:00:00Z`.

use crate::error::ConfigError;
use chrono::{DateTime, Duration, Utc};
use epochflow_core::time::{self, unix_epoch};
use epochflow_core::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Names accepted by [`ReduceOptions::from_map`].
pub const OPTION_NAMES: &[&str] = &[
    "acc", "every", "forget", "from", "groupby", "on", "over", "reset", "to",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReduceOptions {
    /// Periodic epoch interval; selects the periodic trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every: Option<Value>,

    /// Epoch alignment: a duration offset from the Unix epoch, or an instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<Value>,

    /// Sliding window duration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,

    /// Accumulate across epochs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acc: Option<Value>,

    /// Inverse of `acc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<Value>,

    /// Drop idle groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forget: Option<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groupby: Vec<String>,
}

/// Validated reduce configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceConfig {
    pub groupby: Vec<String>,
    pub over: Option<Duration>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub accumulate: bool,
    pub forget: bool,
    /// Periodic interval; `None` selects batch triggering.
    pub every: Option<Duration>,
    /// Alignment origin of periodic epochs.
    pub on: DateTime<Utc>,
}

impl ReduceConfig {
    /// Earliest epoch that may be evaluated. A bound past the representable
    /// range saturates, leaving no valid epoch.
    pub fn min_epoch(&self) -> Option<DateTime<Utc>> {
        match (self.from, self.over) {
            (Some(from), Some(over)) => Some(
                from.checked_add_signed(over)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            (from, _) => from,
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.every.is_some()
    }

    /// Rows keep a sliding window per reducer.
    pub fn is_windowed(&self) -> bool {
        self.over.is_some()
    }
}

impl ReduceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_every(mut self, every: impl Into<Value>) -> Self {
        self.every = Some(every.into());
        self
    }

    pub fn with_on(mut self, on: impl Into<Value>) -> Self {
        self.on = Some(on.into());
        self
    }

    pub fn with_over(mut self, over: impl Into<Value>) -> Self {
        self.over = Some(over.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<Value>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<Value>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_acc(mut self, acc: bool) -> Self {
        self.acc = Some(Value::Bool(acc));
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = Some(Value::Bool(reset));
        self
    }

    pub fn with_forget(mut self, forget: bool) -> Self {
        self.forget = Some(Value::Bool(forget));
        self
    }

    pub fn with_groupby<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groupby = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Load options from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => Self::from_yaml(&content).or_else(|_| Self::from_toml(&content)),
        }
    }

    /// Parse options from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse options from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build options from a generic name → value map, as handed over by an
    /// upstream query compiler.
    pub fn from_map(map: IndexMap<String, Value>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        for (name, value) in map {
            match name.as_str() {
                "every" => options.every = Some(value),
                "on" => options.on = Some(value),
                "over" => options.over = Some(value),
                "from" => options.from = Some(value),
                "to" => options.to = Some(value),
                "acc" => options.acc = Some(value),
                "reset" => options.reset = Some(value),
                "forget" => options.forget = Some(value),
                "groupby" => options.groupby = field_names(value)?,
                _ => return Err(ConfigError::UnknownOption(name)),
            }
        }
        Ok(options)
    }

    /// Merge another option set into this one (other values take precedence if set)
    pub fn merge(&mut self, other: ReduceOptions) {
        let slots = [
            (&mut self.every, other.every),
            (&mut self.on, other.on),
            (&mut self.over, other.over),
            (&mut self.from, other.from),
            (&mut self.to, other.to),
            (&mut self.acc, other.acc),
            (&mut self.reset, other.reset),
            (&mut self.forget, other.forget),
        ];
        for (slot, value) in slots {
            if value.is_some() {
                *slot = value;
            }
        }
        if !other.groupby.is_empty() {
            self.groupby = other.groupby;
        }
    }

    /// Check the options and derive the effective configuration.
    pub fn validate(&self) -> Result<ReduceConfig, ConfigError> {
        let over = present(&self.over)
            .map(|v| duration("over", v))
            .transpose()?;
        let from = present(&self.from)
            .map(|v| instant("from", v))
            .transpose()?;
        let to = present(&self.to).map(|v| instant("to", v)).transpose()?;
        if (from.is_some() || to.is_some()) && over.is_none() {
            return Err(ConfigError::BoundWithoutWindow);
        }

        let acc = present(&self.acc)
            .map(|v| boolean("acc", v))
            .transpose()?
            .unwrap_or(false);
        let reset = present(&self.reset)
            .map(|v| boolean("reset", v))
            .transpose()?;
        let forget = present(&self.forget)
            .map(|v| boolean("forget", v))
            .transpose()?;

        let accumulate = acc || reset == Some(false);
        if forget == Some(true) && accumulate {
            return Err(ConfigError::ForgetWithoutReset);
        }
        if forget == Some(true) && self.groupby.is_empty() {
            return Err(ConfigError::ForgetWithoutGrouping);
        }
        let forget = match forget {
            Some(f) => f,
            None => !accumulate && !self.groupby.is_empty(),
        };

        let every = match present(&self.every) {
            Some(v) => {
                let every = duration("every", v)?;
                if every <= Duration::zero() {
                    return Err(ConfigError::IntervalNotPositive);
                }
                Some(every)
            }
            None => None,
        };

        let on = match (present(&self.on), every) {
            (Some(_), None) => return Err(ConfigError::AlignmentWithoutInterval),
            (Some(v), Some(every)) => alignment(v, every)?,
            (None, _) => from.or(to).unwrap_or_else(unix_epoch),
        };

        Ok(ReduceConfig {
            groupby: self.groupby.clone(),
            over,
            from,
            to,
            accumulate,
            forget,
            every,
            on,
        })
    }
}

/// A null option counts as not given.
fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null())
}

fn duration(option: &str, value: &Value) -> Result<Duration, ConfigError> {
    let parsed = match value {
        Value::Duration(_) => value.as_duration(),
        Value::Str(s) => time::parse_duration(s).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ConfigError::DurationExpected {
        option: option.to_string(),
        value: value.to_string(),
    })
}

fn instant(option: &str, value: &Value) -> Result<DateTime<Utc>, ConfigError> {
    let parsed = match value {
        // Saturated by Value::timestamp: the real instant is out of range.
        Value::Timestamp(i64::MIN | i64::MAX) => None,
        Value::Timestamp(_) => value.as_timestamp(),
        Value::Str(s) => time::parse_instant(s).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ConfigError::InstantExpected {
        option: option.to_string(),
        value: value.to_string(),
    })
}

fn boolean(option: &str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| ConfigError::BooleanExpected {
        option: option.to_string(),
        value: value.to_string(),
    })
}

/// `on` is either a phase offset from the Unix epoch or an instant.
fn alignment(value: &Value, every: Duration) -> Result<DateTime<Utc>, ConfigError> {
    if let Ok(offset) = duration("on", value) {
        if offset > every {
            return Err(ConfigError::AlignmentExceedsInterval);
        }
        return unix_epoch()
            .checked_add_signed(offset)
            .ok_or_else(|| ConfigError::DurationExpected {
                option: "on".to_string(),
                value: value.to_string(),
            });
    }
    instant("on", value).map_err(|_| ConfigError::AlignmentTypeInvalid {
        value: value.to_string(),
    })
}

fn field_names(value: Value) -> Result<Vec<String>, ConfigError> {
    let invalid = |v: &Value| ConfigError::Parse(format!("groupby expects field names, got {}", v));
    match value {
        Value::Str(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::Str(s) => Ok(s),
                other => Err(invalid(&other)),
            })
            .collect(),
        other => Err(invalid(&other)),
    }
}
