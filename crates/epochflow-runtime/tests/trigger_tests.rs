//! End-to-end trigger scenarios through `reduce`.

use chrono::{DateTime, Utc};
use epochflow_core::time::{eps_before, unix_epoch};
use epochflow_runtime::aggregation::{self, ReduceSpec};
use epochflow_runtime::emit::{CollectingEmitter, Output};
use epochflow_runtime::options::ReduceOptions;
use epochflow_runtime::point::{Mark, Point};
use epochflow_runtime::stream::{channel, spawn_reduce};
use epochflow_runtime::trigger::{reduce, DriverContext, EpochDriver, TriggerKind};
use epochflow_runtime::ChannelEmitter;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ctx() -> DriverContext {
    DriverContext::new().with_now(unix_epoch()).sorted()
}

fn build(options: ReduceOptions, spec: ReduceSpec, ctx: DriverContext) -> Box<dyn EpochDriver> {
    reduce(&options, spec, ctx).ok().unwrap()
}

fn counting() -> ReduceSpec {
    ReduceSpec::new().add("count", aggregation::count())
}

#[tokio::test]
async fn periodic_count_every_five_seconds() {
    init_tracing();
    let mut driver = build(ReduceOptions::new().with_every("5s"), counting(), ctx());
    let mut out = CollectingEmitter::new();

    let points = [1, 2, 3, 6, 7].map(|s| Point::at(at(s))).to_vec();
    driver.process(points, &mut out).unwrap();
    driver.eof(&mut out).await.unwrap();

    let summary: Vec<_> = out
        .points()
        .iter()
        .map(|p| (p.time, p.get_int("count")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Some(eps_before(at(5))), Some(3)),
            (Some(eps_before(at(10))), Some(2)),
        ]
    );
    assert_eq!(out.outputs.last(), Some(&Output::Eof));
}

#[tokio::test]
async fn periodic_without_points_reports_zero_once() {
    let mut driver = build(ReduceOptions::new().with_every("5s"), counting(), ctx());
    let mut out = CollectingEmitter::new();
    driver.eof(&mut out).await.unwrap();

    let points = out.points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].get_int("count"), Some(0));
}

#[tokio::test]
async fn periodic_grouped_with_phase() {
    let options = ReduceOptions::new()
        .with_every("10s")
        .with_on("5s")
        .with_groupby(["host"]);
    let mut driver = build(options, counting(), ctx());
    let mut out = CollectingEmitter::new();

    let points = vec![
        Point::at(at(1)).with_field("host", "a"),
        Point::at(at(2)).with_field("host", "b"),
        Point::at(at(3)).with_field("host", "a"),
        Point::at(at(12)).with_field("host", "b"),
    ];
    driver.process(points, &mut out).unwrap();
    driver.eof(&mut out).await.unwrap();

    let batches = out.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 2);
    assert!(batches[0]
        .iter()
        .all(|p| p.time == Some(eps_before(at(5)))));
    assert_eq!(batches[1].len(), 1);
    assert_eq!(batches[1][0].time, Some(eps_before(at(15))));
    assert_eq!(batches[1][0].get_str("host"), Some("b"));
}

#[tokio::test]
async fn batch_marks_delimit_epochs() {
    let mut driver = build(ReduceOptions::new(), counting(), ctx());
    assert_eq!(driver.kind(), TriggerKind::Batch);
    let mut out = CollectingEmitter::new();

    driver.mark(Mark::new(at(0)), &mut out).unwrap();
    driver
        .process(vec![Point::at(at(1)), Point::at(at(2))], &mut out)
        .unwrap();
    driver.mark(Mark::new(at(3)), &mut out).unwrap();
    driver.process(vec![Point::at(at(4))], &mut out).unwrap();
    driver.mark(Mark::new(at(6)), &mut out).unwrap();
    driver.eof(&mut out).await.unwrap();

    let counts: Vec<_> = out.points().iter().map(|p| p.get_int("count")).collect();
    assert_eq!(counts, vec![Some(2), Some(1)]);
    assert_eq!(out.marks().len(), 3);
    assert!(out.saw_eof());
}

#[tokio::test]
async fn batch_eof_emits_in_chunks() {
    let options = ReduceOptions::new().with_groupby(["id"]);
    let mut driver = build(options, counting(), ctx().with_emit_batch_size(4));
    let mut out = CollectingEmitter::new();

    let points = (0..10)
        .map(|i| Point::at(at(i)).with_field("id", i))
        .collect();
    driver.process(points, &mut out).unwrap();
    driver.eof(&mut out).await.unwrap();

    let sizes: Vec<usize> = out.batches().iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert!(out.points().iter().all(|p| p.time.is_none()));
    assert_eq!(out.outputs.last(), Some(&Output::Eof));
}

#[tokio::test]
async fn batch_eof_at_to_stamps_output() {
    let options = ReduceOptions::new().with_over("1m").with_to(at(30));
    let mut driver = build(options, counting(), ctx());
    let mut out = CollectingEmitter::new();

    driver.process(vec![Point::at(at(10))], &mut out).unwrap();
    driver.eof(&mut out).await.unwrap();

    let points = out.points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].time, Some(eps_before(at(30))));
}

#[tokio::test]
async fn spawned_reduce_over_channels() {
    let (sender, stream) = channel("metrics", 16);
    let (emitter, mut rx) = ChannelEmitter::channel();
    let driver = build(ReduceOptions::new().with_every("5s"), counting(), ctx());
    let handle = spawn_reduce(driver, stream, emitter);

    sender
        .send_points(vec![Point::at(at(1)), Point::at(at(2))])
        .await
        .unwrap();
    sender.send_tick(at(5)).await.unwrap();
    sender.send_points(vec![Point::at(at(7))]).await.unwrap();
    sender.send_eof().await.unwrap();
    handle.await.unwrap().unwrap();

    let mut outputs = Vec::new();
    while let Some(output) = rx.recv().await {
        outputs.push(output);
    }
    let counts: Vec<_> = outputs
        .iter()
        .filter_map(|o| match o {
            Output::Points(points) => points[0].get_int("count"),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![2, 1]);
    assert!(outputs.contains(&Output::Tick(at(5))));
    assert_eq!(outputs.last(), Some(&Output::Eof));
}
