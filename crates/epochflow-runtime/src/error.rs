//! Error types for the reduce operator
//!
//! Two tiers: [`ConfigError`] is raised once at construction and is fatal;
//! [`EvalError`] is raised while evaluating a row at an epoch boundary, where
//! the data-level `Runtime` class is downgraded to a warning for that row.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("option -{option} expects a duration, got {value}")]
    DurationExpected { option: String, value: String },

    #[error("option -{option} expects a moment, got {value}")]
    InstantExpected { option: String, value: String },

    #[error("option -{option} expects a boolean, got {value}")]
    BooleanExpected { option: String, value: String },

    #[error("-from and -to require -over")]
    BoundWithoutWindow,

    #[error("-forget requires -reset: forgetting is meaningless while accumulating")]
    ForgetWithoutReset,

    #[error("-forget requires group-by fields")]
    ForgetWithoutGrouping,

    #[error("-every must be a positive duration")]
    IntervalNotPositive,

    #[error("-on duration must not exceed -every")]
    AlignmentExceedsInterval,

    #[error("option -on expects a duration or a moment, got {value}")]
    AlignmentTypeInvalid { value: String },

    #[error("-on requires -every")]
    AlignmentWithoutInterval,

    #[error("unknown option -{0}")]
    UnknownOption(String),

    #[error("failed to parse options: {0}")]
    Parse(String),

    #[error("failed to read options from {0}: {1}")]
    Io(PathBuf, String),
}

impl ConfigError {
    /// Stable code for diagnostics and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::DurationExpected { .. } => "duration-expected",
            ConfigError::InstantExpected { .. } => "instant-expected",
            ConfigError::BooleanExpected { .. } => "boolean-expected",
            ConfigError::BoundWithoutWindow => "bound-without-window",
            ConfigError::ForgetWithoutReset => "forget-without-reset",
            ConfigError::ForgetWithoutGrouping => "forget-without-grouping",
            ConfigError::IntervalNotPositive => "interval-not-positive",
            ConfigError::AlignmentExceedsInterval => "alignment-exceeds-interval",
            ConfigError::AlignmentTypeInvalid { .. } => "alignment-type-invalid",
            ConfigError::AlignmentWithoutInterval => "alignment-without-interval",
            ConfigError::UnknownOption(_) => "unknown-option",
            ConfigError::Parse(_) => "parse",
            ConfigError::Io(..) => "io",
        }
    }
}

/// Failure while evaluating the output expression of one row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Data-level problem, e.g. a type mismatch inside an aggregate.
    #[error("{0}")]
    Runtime(String),

    /// Broken invariant; never downgraded.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EvalError::Runtime(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EvalError::Internal(message.into())
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, EvalError::Runtime(_))
    }
}

/// Error returned by driver callbacks; aborts the operator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("evaluation aborted: {0}")]
    Eval(#[from] EvalError),
}

pub type ReduceResult<T> = Result<T, ReduceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_kinds_are_distinct() {
        let errors = vec![
            ConfigError::DurationExpected {
                option: "over".into(),
                value: "3".into(),
            },
            ConfigError::InstantExpected {
                option: "from".into(),
                value: "3".into(),
            },
            ConfigError::BooleanExpected {
                option: "acc".into(),
                value: "3".into(),
            },
            ConfigError::BoundWithoutWindow,
            ConfigError::ForgetWithoutReset,
            ConfigError::ForgetWithoutGrouping,
            ConfigError::IntervalNotPositive,
            ConfigError::AlignmentExceedsInterval,
            ConfigError::AlignmentTypeInvalid { value: "x".into() },
            ConfigError::AlignmentWithoutInterval,
            ConfigError::UnknownOption("bogus".into()),
            ConfigError::Parse("bad".into()),
            ConfigError::Io(PathBuf::from("x.toml"), "missing".into()),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(ConfigError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::DurationExpected {
            option: "over".into(),
            value: "\"soon\"".into(),
        };
        assert_eq!(err.to_string(), "option -over expects a duration, got \"soon\"");
        assert_eq!(
            ConfigError::UnknownOption("bogus".into()).to_string(),
            "unknown option -bogus"
        );
    }

    #[test]
    fn test_eval_error_classes() {
        assert!(EvalError::runtime("bad sum").is_runtime());
        assert!(!EvalError::internal("broken").is_runtime());
        let err: ReduceError = EvalError::internal("broken").into();
        assert_eq!(err.to_string(), "evaluation aborted: internal error: broken");
    }
}
