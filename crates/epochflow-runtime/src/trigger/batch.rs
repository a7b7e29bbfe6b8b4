//! Mark-driven epochs

use super::{DriverContext, EpochDriver, TriggerKind};
use crate::emit::{emit_chunked, Emitter};
use crate::engine::EpochEngine;
use crate::error::ReduceResult;
use crate::point::{Mark, Point};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Evaluates at every upstream mark after the first. A stream without marks
/// is evaluated once at end of stream, at `-to` when configured.
pub struct BatchTrigger {
    engine: EpochEngine,
    ctx: DriverContext,
    marks_seen: bool,
}

impl BatchTrigger {
    pub fn new(engine: EpochEngine, ctx: DriverContext) -> Self {
        Self {
            engine,
            ctx,
            marks_seen: false,
        }
    }

    /// Whether the upstream delimits batches with marks.
    pub fn marks_seen(&self) -> bool {
        self.marks_seen
    }
}

#[async_trait]
impl EpochDriver for BatchTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Batch
    }

    fn engine(&self) -> &EpochEngine {
        &self.engine
    }

    fn engine_mut(&mut self) -> &mut EpochEngine {
        &mut self.engine
    }

    fn process(&mut self, points: Vec<Point>, out: &mut dyn Emitter) -> ReduceResult<()> {
        for point in points {
            if self.admit(point.time, out)? {
                self.ingest(point);
            }
        }
        Ok(())
    }

    fn mark(&mut self, mark: Mark, out: &mut dyn Emitter) -> ReduceResult<()> {
        // The first mark opens the first batch.
        if self.marks_seen {
            let points = self.advance_epoch(Some(mark.time), out)?;
            if !points.is_empty() {
                out.emit(points);
            }
        } else {
            self.marks_seen = true;
        }
        out.emit_mark(mark);
        Ok(())
    }

    fn tick(&mut self, time: DateTime<Utc>, out: &mut dyn Emitter) -> ReduceResult<()> {
        if !self.marks_seen && time > self.ctx.now {
            self.admit(Some(time), out)?;
        }
        out.emit_tick(time);
        Ok(())
    }

    async fn eof(&mut self, out: &mut dyn Emitter) -> ReduceResult<()> {
        if !self.marks_seen {
            let to = self.engine.config().to;
            let points = self.advance_epoch(to, out)?;
            emit_chunked(out, points, self.ctx.emit_batch_size).await;
        }
        out.emit_eof();
        Ok(())
    }
}
