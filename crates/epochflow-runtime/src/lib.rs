//! Epochflow Runtime - epoch-driven windowed aggregation
//!
//! This crate provides the `reduce` operator of a streaming dataflow: points
//! are grouped by key, folded into per-group reducers (optionally over a
//! sliding window) and summarized into one output point per group whenever an
//! epoch boundary is crossed. Epochs come either from upstream marks
//! ([`BatchTrigger`]) or from a self-clocked interval ([`PeriodicTrigger`]).
//!
//! ```rust,ignore
//! use epochflow_runtime::{aggregation, reduce, DriverContext, ReduceOptions, ReduceSpec};
//!
//! let options = ReduceOptions::new().with_every("5s").with_groupby(["host"]);
//! let spec = ReduceSpec::new().add("count", aggregation::count());
//! let mut driver = reduce(&options, spec, DriverContext::new())?;
//! ```

pub mod aggregation;
pub mod emit;
pub mod engine;
pub mod error;
pub mod groups;
pub mod options;
pub mod point;
pub mod schedule;
pub mod stream;
pub mod trigger;
pub mod window;

pub use aggregation::{ReduceSpec, Reducer, ReducerFactory, RowExpr};
pub use emit::{ChannelEmitter, CollectingEmitter, Emitter, Output, EMIT_BATCH_SIZE};
pub use engine::{EpochEngine, EpochState};
pub use error::{ConfigError, EvalError, ReduceError, ReduceResult};
pub use groups::{GroupKey, GroupTable, Row};
pub use options::{ReduceConfig, ReduceOptions};
pub use point::{Mark, Point, SharedPoint};
pub use schedule::EpochSchedule;
pub use stream::{channel, drive, spawn_reduce, spawn_ticker, Input, InputSender, InputStream};
pub use trigger::{reduce, BatchTrigger, DriverContext, EpochDriver, PeriodicTrigger, TriggerKind};
pub use window::Window;
