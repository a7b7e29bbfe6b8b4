//! Epoch engine: admission, routing and per-epoch evaluation
//!
//! The engine owns the group table and the epoch bookkeeping. Triggers decide
//! *when* an epoch boundary is crossed; the engine decides what a boundary
//! produces:
//!
//! 1. epochs only move forward and must lie inside the configured range,
//! 2. windowed rows are aged to the end of the batch and, with `forget`,
//!    rows left empty are dropped,
//! 3. every remaining row is evaluated into one output point stamped one
//!    epsilon before the epoch,
//! 4. unless accumulating, rows are reset (or the whole table discarded).

use crate::aggregation::ReduceSpec;
use crate::emit::Emitter;
use crate::error::ReduceResult;
use crate::groups::{GroupKey, GroupTable};
use crate::options::ReduceConfig;
use crate::point::{Point, SharedPoint};
use chrono::{DateTime, Utc};
use epochflow_core::time::eps_before;
use tracing::{debug, trace, warn};

/// Epoch bookkeeping of one engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochState {
    /// Most recently completed epoch; `None` before the first one.
    pub last_epoch: Option<DateTime<Utc>>,
    /// Points admitted since the last evaluation.
    pub batch_size: usize,
}

pub struct EpochEngine {
    config: ReduceConfig,
    table: GroupTable,
    state: EpochState,
    sort_output: bool,
}

impl EpochEngine {
    /// Build an engine for a validated configuration. With `sort_output`,
    /// each epoch's points are stable-sorted by timestamp.
    pub fn new(config: ReduceConfig, spec: ReduceSpec, sort_output: bool) -> Self {
        let table = GroupTable::new(config.groupby.clone(), spec, config.over);
        Self {
            config,
            table,
            state: EpochState::default(),
            sort_output,
        }
    }

    pub fn config(&self) -> &ReduceConfig {
        &self.config
    }

    pub fn table(&self) -> &GroupTable {
        &self.table
    }

    pub fn state(&self) -> EpochState {
        self.state
    }

    pub fn last_epoch(&self) -> Option<DateTime<Utc>> {
        self.state.last_epoch
    }

    pub fn batch_size(&self) -> usize {
        self.state.batch_size
    }

    /// Whether a point stamped `time` may be aggregated.
    ///
    /// A time at or past `to` closes the range: the final epoch at `to` is
    /// evaluated and emitted, and the point is refused.
    pub fn admit(
        &mut self,
        time: Option<DateTime<Utc>>,
        out: &mut dyn Emitter,
    ) -> ReduceResult<bool> {
        let Some(t) = time else {
            return Ok(true);
        };
        if let Some(from) = self.config.from {
            if t < from {
                trace!("Dropping point at {} before -from {}", t, from);
                return Ok(false);
            }
        }
        if let Some(to) = self.config.to {
            if t >= to {
                let points = self.advance_epoch(Some(to), out)?;
                if !points.is_empty() {
                    out.emit(points);
                }
                trace!("Dropping point at {} at or after -to {}", t, to);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Route a point to its row and fold it into every reducer.
    pub fn ingest(&mut self, point: impl Into<SharedPoint>) {
        let point = point.into();
        self.table.lookup(&point).update(&point);
        self.state.batch_size += 1;
    }

    /// Whether `epoch` lies in the evaluable range.
    pub fn good_epoch(&self, epoch: DateTime<Utc>) -> bool {
        if let Some(min) = self.config.min_epoch() {
            if epoch < min {
                return false;
            }
        }
        match self.config.to {
            Some(to) => epoch <= to,
            None => true,
        }
    }

    /// Evaluate every row at `epoch`. `None` is a one-shot evaluation whose
    /// points carry no timestamp.
    ///
    /// An epoch out of range or not past the last one yields nothing and
    /// leaves the rows untouched. Rows failing with a runtime error are
    /// reported through [`Emitter::warning`] and skipped; any other error
    /// aborts.
    pub fn advance_epoch(
        &mut self,
        epoch: Option<DateTime<Utc>>,
        out: &mut dyn Emitter,
    ) -> ReduceResult<Vec<Point>> {
        if let Some(epoch) = epoch {
            let stale = self.state.last_epoch.is_some_and(|last| epoch <= last);
            if stale || !self.good_epoch(epoch) {
                trace!("Skipping epoch {} (last {:?})", epoch, self.state.last_epoch);
                self.state.batch_size = 0;
                return Ok(Vec::new());
            }
            self.state.last_epoch = Some(epoch);
        }
        let eob = epoch.map(eps_before);

        if let Some(eob) = eob.filter(|_| self.table.is_windowed()) {
            self.table.for_each(|_, row| row.advance(eob));
            if self.config.forget {
                let idle: Vec<GroupKey> = self
                    .table
                    .iter()
                    .filter(|(_, row)| row.is_empty())
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &idle {
                    self.table.delete(key);
                }
            }
        }

        let mut points = Vec::with_capacity(self.table.len());
        for (key, row) in self.table.iter() {
            let mut point = Point::new().with_time(eob);
            self.table.mixin_key(&mut point, key);
            match self.table.spec().evaluate(&mut point, row) {
                Ok(()) => points.push(point),
                Err(e) if e.is_runtime() => {
                    warn!("Skipping group {:?} at {:?}: {}", key.values(), eob, e);
                    out.warning(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !self.config.accumulate {
            if self.table.is_windowed() || !self.config.forget {
                self.table.reset_rows();
            } else {
                self.table.reset_table();
            }
        }

        debug!(
            "Epoch {:?}: {} points from {} admitted",
            epoch,
            points.len(),
            self.state.batch_size
        );
        self.state.batch_size = 0;
        if self.sort_output {
            points.sort_by_key(|p| p.time);
        }
        Ok(points)
    }

    /// Drop all rows and epoch bookkeeping.
    pub fn reset(&mut self) {
        self.table = GroupTable::new(
            self.config.groupby.clone(),
            self.table.spec().clone(),
            self.config.over,
        );
        self.state = EpochState::default();
    }
}
