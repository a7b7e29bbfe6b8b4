//! Channel plumbing around an epoch driver
//!
//! An upstream task sends [`Input`] messages through an [`InputSender`]; a
//! reduce task reads them from an [`InputStream`] and delivers them to its
//! [`EpochDriver`] in arrival order.

use crate::emit::Emitter;
use crate::error::ReduceResult;
use crate::point::{Mark, Point};
use crate::trigger::EpochDriver;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// One upstream message.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Points(Vec<Point>),
    Mark(Mark),
    Tick(DateTime<Utc>),
    Eof,
}

/// Receiving end of a reduce input channel.
pub struct InputStream {
    pub name: String,
    receiver: mpsc::Receiver<Input>,
}

impl InputStream {
    pub fn new(name: impl Into<String>, receiver: mpsc::Receiver<Input>) -> Self {
        Self {
            name: name.into(),
            receiver,
        }
    }

    /// Next input, or `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<Input> {
        self.receiver.recv().await
    }
}

/// Sender half for producing inputs
#[derive(Debug, Clone)]
pub struct InputSender {
    pub name: String,
    sender: mpsc::Sender<Input>,
}

impl InputSender {
    pub fn new(name: impl Into<String>, sender: mpsc::Sender<Input>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }

    pub async fn send(&self, input: Input) -> Result<(), mpsc::error::SendError<Input>> {
        self.sender.send(input).await
    }

    pub async fn send_points(&self, points: Vec<Point>) -> Result<(), mpsc::error::SendError<Input>> {
        self.send(Input::Points(points)).await
    }

    pub async fn send_mark(&self, time: DateTime<Utc>) -> Result<(), mpsc::error::SendError<Input>> {
        self.send(Input::Mark(Mark::new(time))).await
    }

    pub async fn send_tick(&self, time: DateTime<Utc>) -> Result<(), mpsc::error::SendError<Input>> {
        self.send(Input::Tick(time)).await
    }

    pub async fn send_eof(&self) -> Result<(), mpsc::error::SendError<Input>> {
        self.send(Input::Eof).await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Create an input channel pair
pub fn channel(name: impl Into<String>, buffer: usize) -> (InputSender, InputStream) {
    let name = name.into();
    let (tx, rx) = mpsc::channel(buffer);
    (InputSender::new(name.clone(), tx), InputStream::new(name, rx))
}

/// Deliver every input of `stream` to `driver` until end of stream.
///
/// A channel closed without an explicit [`Input::Eof`] ends the stream the
/// same way.
pub async fn drive(
    driver: &mut dyn EpochDriver,
    stream: &mut InputStream,
    out: &mut dyn Emitter,
) -> ReduceResult<()> {
    while let Some(input) = stream.next().await {
        match input {
            Input::Points(points) => driver.process(points, out)?,
            Input::Mark(mark) => driver.mark(mark, out)?,
            Input::Tick(time) => driver.tick(time, out)?,
            Input::Eof => return driver.eof(out).await,
        }
    }
    debug!("Stream {} closed without end of stream", stream.name);
    driver.eof(out).await
}

/// Run `driver` over `stream` on its own task.
pub fn spawn_reduce<E>(
    mut driver: Box<dyn EpochDriver>,
    mut stream: InputStream,
    mut out: E,
) -> JoinHandle<ReduceResult<()>>
where
    E: Emitter + 'static,
{
    tokio::spawn(async move {
        let result = drive(driver.as_mut(), &mut stream, &mut out).await;
        if let Err(e) = &result {
            error!("Reduce on stream {} aborted: {}", stream.name, e);
        }
        result
    })
}

/// Spawn a task sending a wall-clock tick every `interval`
///
/// Ticks let a periodic reduce close epochs while upstream is idle. The task
/// stops once the input channel closes.
pub fn spawn_ticker(interval: Duration, sender: InputSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            "Ticker for {} starting with interval: {:?}",
            sender.name, interval
        );

        let mut interval_timer = tokio::time::interval(interval);
        // Skip the immediate first tick
        interval_timer.tick().await;

        loop {
            interval_timer.tick().await;
            if sender.send_tick(Utc::now()).await.is_err() {
                debug!("Ticker for {} stopping: channel closed", sender.name);
                break;
            }
        }
    })
}
