//! Epoch triggers
//!
//! An [`EpochDriver`] decides when epoch boundaries are crossed and forwards
//! the engine's output downstream. Two strategies exist:
//!
//! - [`BatchTrigger`]: epochs are upstream marks; without marks, a single
//!   evaluation happens at end of stream.
//! - [`PeriodicTrigger`]: epochs fall every `-every`, aligned on `-on`.
//!
//! [`reduce`] validates the options and picks the strategy.

mod batch;
mod periodic;

pub use batch::BatchTrigger;
pub use periodic::PeriodicTrigger;

use crate::aggregation::ReduceSpec;
use crate::emit::{Emitter, EMIT_BATCH_SIZE};
use crate::engine::EpochEngine;
use crate::error::{ConfigError, ReduceResult};
use crate::options::ReduceOptions;
use crate::point::{Mark, Point};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Batch,
    Periodic,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Batch => write!(f, "batch"),
            TriggerKind::Periodic => write!(f, "periodic"),
        }
    }
}

/// Runtime context handed to a driver at construction.
#[derive(Debug, Clone)]
pub struct DriverContext {
    /// Processing clock. Ticks at or before it are forwarded but do not
    /// move epochs.
    pub now: DateTime<Utc>,
    /// Stable-sort each epoch's output by timestamp.
    pub sort_output: bool,
    /// Batch size of the one-shot end-of-stream emission.
    pub emit_batch_size: usize,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            now: Utc::now(),
            sort_output: false,
            emit_batch_size: EMIT_BATCH_SIZE,
        }
    }
}

impl DriverContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn sorted(mut self) -> Self {
        self.sort_output = true;
        self
    }

    pub fn with_emit_batch_size(mut self, size: usize) -> Self {
        self.emit_batch_size = size.max(1);
        self
    }
}

/// A triggering strategy driving one [`EpochEngine`].
///
/// Callbacks are delivered in arrival order by a single task.
#[async_trait]
pub trait EpochDriver: Send {
    fn kind(&self) -> TriggerKind;

    fn engine(&self) -> &EpochEngine;

    fn engine_mut(&mut self) -> &mut EpochEngine;

    /// Handle a batch of points.
    fn process(&mut self, points: Vec<Point>, out: &mut dyn Emitter) -> ReduceResult<()>;

    /// Handle an upstream batch boundary.
    fn mark(&mut self, mark: Mark, out: &mut dyn Emitter) -> ReduceResult<()>;

    /// Handle a liveness tick from the scheduler.
    fn tick(&mut self, time: DateTime<Utc>, out: &mut dyn Emitter) -> ReduceResult<()>;

    /// Handle end of stream: flush what remains and signal downstream.
    async fn eof(&mut self, out: &mut dyn Emitter) -> ReduceResult<()>;

    fn admit(&mut self, time: Option<DateTime<Utc>>, out: &mut dyn Emitter) -> ReduceResult<bool> {
        self.engine_mut().admit(time, out)
    }

    fn ingest(&mut self, point: Point) {
        self.engine_mut().ingest(point);
    }

    fn advance_epoch(
        &mut self,
        epoch: Option<DateTime<Utc>>,
        out: &mut dyn Emitter,
    ) -> ReduceResult<Vec<Point>> {
        self.engine_mut().advance_epoch(epoch, out)
    }
}

/// Build the reduce operator: validate `options` and pick the trigger.
pub fn reduce(
    options: &ReduceOptions,
    spec: ReduceSpec,
    ctx: DriverContext,
) -> Result<Box<dyn EpochDriver>, ConfigError> {
    let config = options.validate()?;
    let periodic = config.every.zip(Some(config.on));
    let engine = EpochEngine::new(config, spec, ctx.sort_output);

    let driver: Box<dyn EpochDriver> = match periodic {
        Some((every, on)) => Box::new(PeriodicTrigger::new(engine, every, on, ctx)),
        None => Box::new(BatchTrigger::new(engine, ctx)),
    };
    info!(
        "Built {} reduce over {} slots (groupby: {:?})",
        driver.kind(),
        driver.engine().table().spec().len(),
        driver.engine().table().by()
    );
    Ok(driver)
}
