//! # Epochflow Core
//!
//! Foundational value and time types shared by the epochflow reduce operator.
//!
//! - **Values**: the runtime representation of point fields ([`Value`])
//! - **Time**: instants, durations, the epoch epsilon, periodic alignment and
//!   literal parsing ([`time`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use epochflow_core::{time, Value};
//!
//! let every = time::parse_duration("5s")?;
//! let over = Value::duration(every);
//! assert_eq!(over.as_duration(), Some(every));
//! ```
//!
//! ## See Also
//!
//! - [`epochflow_runtime`](../epochflow_runtime): the epoch engine and triggers

pub mod time;
pub mod value;

pub use time::TimeError;
pub use value::Value;
