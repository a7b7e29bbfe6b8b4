//! Self-clocked periodic epochs

use super::{DriverContext, EpochDriver, TriggerKind};
use crate::emit::Emitter;
use crate::engine::EpochEngine;
use crate::error::ReduceResult;
use crate::point::{Mark, Point};
use crate::schedule::EpochSchedule;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Evaluates at `on + k * every`, clocked by the timestamps it sees.
pub struct PeriodicTrigger {
    engine: EpochEngine,
    ctx: DriverContext,
    schedule: EpochSchedule,
}

impl PeriodicTrigger {
    pub fn new(engine: EpochEngine, every: Duration, on: DateTime<Utc>, ctx: DriverContext) -> Self {
        let config = engine.config();
        let mut schedule = EpochSchedule::new(every, on, config.to);
        if let Some(from) = config.from {
            schedule.start(from);
        }
        Self {
            engine,
            ctx,
            schedule,
        }
    }

    pub fn schedule(&self) -> &EpochSchedule {
        &self.schedule
    }

    /// Evaluate and emit every epoch reached by `t`.
    fn catch_up(&mut self, t: DateTime<Utc>, out: &mut dyn Emitter) -> ReduceResult<()> {
        while let Some(epoch) = self.schedule.due(t) {
            self.evaluate(Some(epoch), out)?;
        }
        Ok(())
    }

    fn evaluate(&mut self, epoch: Option<DateTime<Utc>>, out: &mut dyn Emitter) -> ReduceResult<()> {
        let points = self.engine.advance_epoch(epoch, out)?;
        if !points.is_empty() {
            out.emit(points);
        }
        Ok(())
    }
}

#[async_trait]
impl EpochDriver for PeriodicTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Periodic
    }

    fn engine(&self) -> &EpochEngine {
        &self.engine
    }

    fn engine_mut(&mut self) -> &mut EpochEngine {
        &mut self.engine
    }

    fn process(&mut self, points: Vec<Point>, out: &mut dyn Emitter) -> ReduceResult<()> {
        for point in points {
            if let Some(t) = point.time {
                self.catch_up(t, out)?;
            }
            if self.admit(point.time, out)? {
                self.ingest(point);
            }
        }
        Ok(())
    }

    /// Marks only move the clock; the periodic operator emits none.
    fn mark(&mut self, mark: Mark, out: &mut dyn Emitter) -> ReduceResult<()> {
        self.catch_up(mark.time, out)
    }

    fn tick(&mut self, time: DateTime<Utc>, out: &mut dyn Emitter) -> ReduceResult<()> {
        if time > self.ctx.now {
            self.catch_up(time, out)?;
        }
        out.emit_tick(time);
        Ok(())
    }

    async fn eof(&mut self, out: &mut dyn Emitter) -> ReduceResult<()> {
        // A stream that never reached an epoch still reports once.
        if self.engine.batch_size() == 0 && self.engine.last_epoch().is_none() {
            self.evaluate(self.schedule.next_epoch(), out)?;
        }
        // A trailing partial batch closes at the next scheduled epoch, which
        // the engine refuses when it lies past `-to`.
        if self.engine.batch_size() > 0 {
            self.evaluate(self.schedule.next_epoch(), out)?;
        }
        out.emit_eof();
        Ok(())
    }
}
