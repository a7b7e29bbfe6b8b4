//! Downstream emission for the reduce operator
//!
//! Drivers hand their output to an [`Emitter`]: batches of points, forwarded
//! marks and ticks, per-row warnings and the end-of-stream signal.
//! [`ChannelEmitter`] forwards to a tokio channel; [`CollectingEmitter`]
//! buffers everything in memory.

use crate::error::EvalError;
use crate::point::{Mark, Point};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

/// Largest batch handed downstream by a one-shot end-of-stream emission.
pub const EMIT_BATCH_SIZE: usize = 20_000;

/// One downstream message.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Points(Vec<Point>),
    Mark(Mark),
    Tick(DateTime<Utc>),
    Warning(EvalError),
    Eof,
}

/// Downstream collaborator of an epoch driver.
pub trait Emitter: Send {
    fn emit(&mut self, points: Vec<Point>);

    fn emit_mark(&mut self, mark: Mark);

    fn emit_tick(&mut self, time: DateTime<Utc>);

    fn emit_eof(&mut self);

    /// Diagnostic channel for rows whose evaluation failed.
    fn warning(&mut self, err: EvalError);
}

/// Buffers every output in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEmitter {
    pub outputs: Vec<Output>,
}

impl CollectingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All emitted points, batches concatenated.
    pub fn points(&self) -> Vec<Point> {
        self.batches().into_iter().flatten().cloned().collect()
    }

    pub fn batches(&self) -> Vec<&Vec<Point>> {
        self.outputs
            .iter()
            .filter_map(|o| match o {
                Output::Points(points) => Some(points),
                _ => None,
            })
            .collect()
    }

    pub fn marks(&self) -> Vec<Mark> {
        self.outputs
            .iter()
            .filter_map(|o| match o {
                Output::Mark(m) => Some(*m),
                _ => None,
            })
            .collect()
    }

    pub fn ticks(&self) -> Vec<DateTime<Utc>> {
        self.outputs
            .iter()
            .filter_map(|o| match o {
                Output::Tick(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<&EvalError> {
        self.outputs
            .iter()
            .filter_map(|o| match o {
                Output::Warning(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn saw_eof(&self) -> bool {
        self.outputs.iter().any(|o| matches!(o, Output::Eof))
    }

    pub fn take(&mut self) -> Vec<Output> {
        std::mem::take(&mut self.outputs)
    }
}

impl Emitter for CollectingEmitter {
    fn emit(&mut self, points: Vec<Point>) {
        self.outputs.push(Output::Points(points));
    }

    fn emit_mark(&mut self, mark: Mark) {
        self.outputs.push(Output::Mark(mark));
    }

    fn emit_tick(&mut self, time: DateTime<Utc>) {
        self.outputs.push(Output::Tick(time));
    }

    fn emit_eof(&mut self) {
        self.outputs.push(Output::Eof);
    }

    fn warning(&mut self, err: EvalError) {
        self.outputs.push(Output::Warning(err));
    }
}

/// Forwards outputs to an unbounded channel. Outputs sent after the receiver
/// is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<Output>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::UnboundedSender<Output>) -> Self {
        Self { tx }
    }

    /// An emitter together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Output>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, output: Output) {
        if self.tx.send(output).is_err() {
            debug!("Output receiver dropped, discarding output");
        }
    }
}

impl Emitter for ChannelEmitter {
    fn emit(&mut self, points: Vec<Point>) {
        self.send(Output::Points(points));
    }

    fn emit_mark(&mut self, mark: Mark) {
        self.send(Output::Mark(mark));
    }

    fn emit_tick(&mut self, time: DateTime<Utc>) {
        self.send(Output::Tick(time));
    }

    fn emit_eof(&mut self) {
        self.send(Output::Eof);
    }

    fn warning(&mut self, err: EvalError) {
        self.send(Output::Warning(err));
    }
}

/// Split `points` into consecutive batches of at most `size` points.
pub fn chunks(points: Vec<Point>, size: usize) -> Vec<Vec<Point>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(points.len().div_ceil(size));
    let mut rest = points.into_iter().peekable();
    while rest.peek().is_some() {
        batches.push(rest.by_ref().take(size).collect());
    }
    batches
}

/// Emit `points` in batches of at most `size`, yielding to the runtime
/// between batches. Nothing is emitted for an empty result.
pub async fn emit_chunked(out: &mut dyn Emitter, points: Vec<Point>, size: usize) {
    for (i, batch) in chunks(points, size).into_iter().enumerate() {
        if i > 0 {
            tokio::task::yield_now().await;
        }
        out.emit(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new().with_field("i", i as i64))
            .collect()
    }

    #[test]
    fn test_chunks_sizes() {
        let batches = chunks(points(5), 2);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(chunks(Vec::new(), 2).is_empty());
    }

    #[tokio::test]
    async fn test_emit_chunked_preserves_order() {
        let mut out = CollectingEmitter::new();
        emit_chunked(&mut out, points(7), 3).await;
        assert_eq!(out.batches().len(), 3);
        assert_eq!(out.points(), points(7));
    }

    #[tokio::test]
    async fn test_emit_chunked_empty_emits_nothing() {
        let mut out = CollectingEmitter::new();
        emit_chunked(&mut out, Vec::new(), EMIT_BATCH_SIZE).await;
        assert!(out.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_channel_emitter_forwards() {
        let (mut out, mut rx) = ChannelEmitter::channel();
        out.emit(points(1));
        out.warning(EvalError::runtime("bad"));
        out.emit_eof();
        assert_eq!(rx.recv().await, Some(Output::Points(points(1))));
        assert_eq!(
            rx.recv().await,
            Some(Output::Warning(EvalError::runtime("bad")))
        );
        assert_eq!(rx.recv().await, Some(Output::Eof));
    }

    #[test]
    fn test_channel_emitter_survives_dropped_receiver() {
        let (mut out, rx) = ChannelEmitter::channel();
        drop(rx);
        out.emit_eof();
    }
}
