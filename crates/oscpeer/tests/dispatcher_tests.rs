//! Bundle scheduling tests
//!
//! Covers the dispatcher's timetag handling:
//! - future-dated bundles fire no earlier than their timetag
//! - bundles fire in timetag order, insertion order on ties
//! - nested bundles schedule independently
//! - stopping the scheduler discards queued bundles

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use oscpeer::{Dispatcher, OscBundle, OscMessage, OscPacket, OscType};
use oscpeer_core::time;
use tokio::time::sleep;

mod common;
use common::MessageCollector;

fn message(addr: &str, args: Vec<OscType>) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    })
}

fn bundle_at(timetag: rosc::OscTime, content: Vec<OscPacket>) -> OscPacket {
    OscPacket::Bundle(OscBundle { timetag, content })
}

#[tokio::test]
async fn test_future_bundle_fires_after_timetag() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/test", collector.handler()).unwrap();

    let timetag = time::timetag_in(Duration::from_millis(200));
    dispatcher.dispatch(&bundle_at(timetag, vec![message("/test", vec![])]));

    // not yet due
    sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.count(), 0);

    assert!(
        collector.wait_for_count(1, Duration::from_millis(500)).await,
        "bundle should fire after its timetag"
    );
    assert_eq!(collector.count(), 1);

    dispatcher.stop_scheduler().await;
}

#[tokio::test]
async fn test_bundles_fire_in_timetag_order() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/seq", collector.handler()).unwrap();

    // schedule out of order: 300ms, 100ms, 200ms
    for (offset_ms, id) in [(300u64, 3i32), (100, 1), (200, 2)] {
        let timetag = time::timetag_in(Duration::from_millis(offset_ms));
        dispatcher.dispatch(&bundle_at(
            timetag,
            vec![message("/seq", vec![OscType::Int(id)])],
        ));
    }

    assert!(collector.wait_for_count(3, Duration::from_secs(1)).await);

    let ids: Vec<i32> = collector
        .messages()
        .iter()
        .map(|m| match m.args[0] {
            OscType::Int(i) => i,
            _ => panic!("expected int arg"),
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    dispatcher.stop_scheduler().await;
}

#[tokio::test]
async fn test_equal_timetags_preserve_insertion_order() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/tie", collector.handler()).unwrap();

    let timetag = time::timetag_in(Duration::from_millis(100));
    for id in 0..4i32 {
        dispatcher.dispatch(&bundle_at(
            timetag,
            vec![message("/tie", vec![OscType::Int(id)])],
        ));
    }

    assert!(collector.wait_for_count(4, Duration::from_secs(1)).await);

    let ids: Vec<i32> = collector
        .messages()
        .iter()
        .map(|m| match m.args[0] {
            OscType::Int(i) => i,
            _ => panic!("expected int arg"),
        })
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);

    dispatcher.stop_scheduler().await;
}

#[tokio::test]
async fn test_nested_future_bundle_scheduled_not_immediate() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/test", collector.handler()).unwrap();

    let inner = bundle_at(
        time::timetag_in(Duration::from_millis(150)),
        vec![message("/test", vec![])],
    );
    let outer = bundle_at(time::IMMEDIATE, vec![inner]);

    dispatcher.dispatch(&outer);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(collector.count(), 0, "nested future bundle must wait");

    assert!(collector.wait_for_count(1, Duration::from_millis(500)).await);

    dispatcher.stop_scheduler().await;
}

#[tokio::test]
async fn test_nested_past_bundle_fires_immediately() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/test", collector.handler()).unwrap();

    let past = time::from_system_time(SystemTime::now() - Duration::from_secs(1));
    let outer = bundle_at(
        time::IMMEDIATE,
        vec![bundle_at(past, vec![message("/test", vec![])])],
    );

    dispatcher.dispatch(&outer);
    assert_eq!(collector.count(), 1);
}

#[tokio::test]
async fn test_stop_discards_queued_bundles() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/test", collector.handler()).unwrap();

    let timetag = time::timetag_in(Duration::from_millis(150));
    dispatcher.dispatch(&bundle_at(timetag, vec![message("/test", vec![])]));

    dispatcher.stop_scheduler().await;
    sleep(Duration::from_millis(300)).await;
    assert_eq!(collector.count(), 0, "queued bundle outlives no scheduler");
}

#[tokio::test]
async fn test_scheduler_restarts_after_stop() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/test", collector.handler()).unwrap();

    dispatcher.start_scheduler();
    dispatcher.stop_scheduler().await;

    let timetag = time::timetag_in(Duration::from_millis(50));
    dispatcher.dispatch(&bundle_at(timetag, vec![message("/test", vec![])]));

    assert!(collector.wait_for_count(1, Duration::from_millis(500)).await);

    dispatcher.stop_scheduler().await;
}

#[tokio::test]
async fn test_panicking_handler_does_not_kill_worker() {
    let dispatcher = Arc::new(Dispatcher::new());
    let collector = MessageCollector::new();
    dispatcher.add_handler("/boom", |_| panic!("bad handler")).unwrap();
    dispatcher.add_handler("/ok", collector.handler()).unwrap();

    dispatcher.dispatch(&bundle_at(
        time::timetag_in(Duration::from_millis(50)),
        vec![message("/boom", vec![])],
    ));
    dispatcher.dispatch(&bundle_at(
        time::timetag_in(Duration::from_millis(100)),
        vec![message("/ok", vec![])],
    ));

    assert!(
        collector.wait_for_count(1, Duration::from_secs(1)).await,
        "worker should survive a panicking handler"
    );

    dispatcher.stop_scheduler().await;
}
