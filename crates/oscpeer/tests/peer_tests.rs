//! Peer transport tests
//!
//! End-to-end peer pairs on the loopback interface:
//! - UDP and TCP round-trips, both framings
//! - TCP symmetry: the first sender connects, the other side accepts
//! - strict UDP source filtering
//! - lifecycle idempotence and silence after stop

use std::sync::Arc;
use std::time::Duration;

use oscpeer::{Framing, MessageBuilder, OscBundle, OscPacket, Peer, PeerBuilder};
use oscpeer_core::time;
use tokio::time::sleep;

mod common;
use common::{free_tcp_port, free_udp_port, MessageCollector};

async fn udp_pair() -> (Arc<Peer>, Arc<Peer>) {
    let port_a = free_udp_port();
    let port_b = free_udp_port();

    let a = Arc::new(
        PeerBuilder::new("127.0.0.1", port_b)
            .udp("127.0.0.1", port_a)
            .build()
            .expect("peer a"),
    );
    let b = Arc::new(
        PeerBuilder::new("127.0.0.1", port_a)
            .udp("127.0.0.1", port_b)
            .build()
            .expect("peer b"),
    );

    a.start_listening().await.expect("a listening");
    b.start_listening().await.expect("b listening");
    (a, b)
}

/// TCP pair with the given framing: `a` connects out, `b` accepts.
async fn tcp_pair(framing: Framing) -> (Arc<Peer>, Arc<Peer>) {
    let port_b = free_tcp_port();

    let a = Arc::new(
        PeerBuilder::new("127.0.0.1", port_b)
            .tcp()
            .framing(framing)
            .build()
            .expect("peer a"),
    );
    // b never dials out; its remote port is irrelevant
    let b = Arc::new(
        PeerBuilder::new("127.0.0.1", 1)
            .tcp_listener("127.0.0.1", port_b)
            .framing(framing)
            .build()
            .expect("peer b"),
    );

    b.start_listening().await.expect("b listening");
    a.start_listening().await.expect("a listening");
    (a, b)
}

fn test_message() -> oscpeer::OscMessage {
    MessageBuilder::new("/test/message")
        .arg(42i32)
        .arg("Hello_World!")
        .build()
}

#[tokio::test]
async fn test_udp_round_trip() {
    let (a, b) = udp_pair().await;

    let collector = MessageCollector::new();
    b.dispatcher()
        .add_handler("/test/message", collector.handler())
        .unwrap();

    let sent = test_message();
    a.send(&sent).await.expect("send");

    assert!(collector.wait_for_count(1, Duration::from_secs(1)).await);
    assert_eq!(collector.messages()[0], sent);

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_udp_bidirectional() {
    let (a, b) = udp_pair().await;

    let at_a = MessageCollector::new();
    let at_b = MessageCollector::new();
    a.dispatcher().add_handler("/from/b", at_a.handler()).unwrap();
    b.dispatcher().add_handler("/from/a", at_b.handler()).unwrap();

    a.send(&MessageBuilder::new("/from/a").arg(1i32).build())
        .await
        .unwrap();
    b.send(&MessageBuilder::new("/from/b").arg(2i32).build())
        .await
        .unwrap();

    assert!(at_a.wait_for_count(1, Duration::from_secs(1)).await);
    assert!(at_b.wait_for_count(1, Duration::from_secs(1)).await);

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_tcp_round_trip_length_prefixed() {
    let (a, b) = tcp_pair(Framing::Osc11).await;

    let collector = MessageCollector::new();
    b.dispatcher()
        .add_handler("/test/message", collector.handler())
        .unwrap();

    let sent = test_message();
    a.send(&sent).await.expect("send");

    assert!(collector.wait_for_count(1, Duration::from_secs(1)).await);
    assert_eq!(collector.messages()[0], sent);

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_tcp_round_trip_slip() {
    let (a, b) = tcp_pair(Framing::Osc10).await;

    let collector = MessageCollector::new();
    b.dispatcher()
        .add_handler("/blob", collector.handler())
        .unwrap();

    // blob containing the SLIP delimiter and escape bytes
    let sent = MessageBuilder::new("/blob")
        .arg(vec![0xC0u8, 0xDB, 0x00, 0xC0])
        .build();
    a.send(&sent).await.expect("send");

    assert!(collector.wait_for_count(1, Duration::from_secs(1)).await);
    assert_eq!(collector.messages()[0], sent);

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_tcp_reply_uses_accepted_connection() {
    // either-first symmetry: a dials, b adopts the inbound connection and
    // replies over it
    let (a, b) = tcp_pair(Framing::Osc11).await;

    let at_a = MessageCollector::new();
    a.dispatcher().add_handler("/pong", at_a.handler()).unwrap();

    let replier = b.clone();
    b.dispatcher()
        .add_handler("/ping", move |_| {
            let replier = replier.clone();
            tokio::spawn(async move {
                let _ = replier.send(&MessageBuilder::new("/pong").build()).await;
            });
        })
        .unwrap();

    a.send(&MessageBuilder::new("/ping").build()).await.unwrap();

    assert!(at_a.wait_for_count(1, Duration::from_secs(1)).await);

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_udp_source_filtering_is_strict() {
    let port_a = free_udp_port();
    let port_b = free_udp_port();

    let a = Arc::new(
        PeerBuilder::new("127.0.0.1", port_b)
            .udp("127.0.0.1", port_a)
            .build()
            .unwrap(),
    );
    let b = Arc::new(
        PeerBuilder::new("127.0.0.1", port_a)
            .udp("127.0.0.1", port_b)
            .build()
            .unwrap(),
    );
    a.start_listening().await.unwrap();
    b.start_listening().await.unwrap();

    let collector = MessageCollector::new();
    b.dispatcher().add_handler("/test/*", collector.handler()).unwrap();

    // a third socket sends a valid packet to b's receive port
    let stranger = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let packet = OscPacket::Message(MessageBuilder::new("/test/intruder").build());
    let bytes = rosc::encoder::encode(&packet).unwrap();
    stranger
        .send_to(&bytes, format!("127.0.0.1:{}", port_b))
        .await
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.count(), 0, "foreign datagram must be dropped");

    // traffic from the configured remote still flows
    a.send(&MessageBuilder::new("/test/ok").build()).await.unwrap();
    assert!(collector.wait_for_count(1, Duration::from_secs(1)).await);
    assert_eq!(collector.messages()[0].addr, "/test/ok");

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_send_before_listening() {
    let port_a = free_udp_port();
    let port_b = free_udp_port();

    let a = Arc::new(
        PeerBuilder::new("127.0.0.1", port_b)
            .udp("127.0.0.1", port_a)
            .build()
            .unwrap(),
    );
    let b = Arc::new(
        PeerBuilder::new("127.0.0.1", port_a)
            .udp("127.0.0.1", port_b)
            .build()
            .unwrap(),
    );

    let collector = MessageCollector::new();
    b.dispatcher().add_handler("/early", collector.handler()).unwrap();
    b.start_listening().await.unwrap();

    // a never started listening; send must still work
    a.send(&MessageBuilder::new("/early").build()).await.unwrap();
    assert!(collector.wait_for_count(1, Duration::from_secs(1)).await);

    b.stop_listening().await;
}

#[tokio::test]
async fn test_bundle_over_the_wire() {
    let (a, b) = udp_pair().await;

    let collector = MessageCollector::new();
    b.dispatcher().add_handler("/bundle/*", collector.handler()).unwrap();

    let bundle = OscPacket::Bundle(OscBundle {
        timetag: time::IMMEDIATE,
        content: vec![
            OscPacket::Message(MessageBuilder::new("/bundle/first").arg(1i32).build()),
            OscPacket::Message(MessageBuilder::new("/bundle/second").arg(2i32).build()),
        ],
    });
    a.send_packet(&bundle).await.unwrap();

    assert!(collector.wait_for_count(2, Duration::from_secs(1)).await);
    let addrs: Vec<String> = collector.messages().iter().map(|m| m.addr.clone()).collect();
    assert_eq!(addrs, vec!["/bundle/first", "/bundle/second"]);

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_scheduled_bundle_over_the_wire() {
    let (a, b) = udp_pair().await;

    let collector = MessageCollector::new();
    b.dispatcher().add_handler("/later", collector.handler()).unwrap();

    let bundle = OscPacket::Bundle(OscBundle {
        timetag: time::timetag_in(Duration::from_millis(200)),
        content: vec![OscPacket::Message(MessageBuilder::new("/later").build())],
    });
    a.send_packet(&bundle).await.unwrap();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.count(), 0, "not due yet");

    assert!(collector.wait_for_count(1, Duration::from_secs(1)).await);

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_lifecycle_is_idempotent() {
    let (a, b) = udp_pair().await;

    // repeated starts and stops settle in the same states
    a.start_listening().await.unwrap();
    a.start_listening().await.unwrap();
    a.stop_listening().await;
    a.stop_listening().await;
    a.start_listening().await.unwrap();

    let collector = MessageCollector::new();
    a.dispatcher().add_handler("/again", collector.handler()).unwrap();
    b.send(&MessageBuilder::new("/again").build()).await.unwrap();
    assert!(
        collector.wait_for_count(1, Duration::from_secs(1)).await,
        "peer should receive after restart"
    );

    a.stop_listening().await;
    b.stop_listening().await;
}

#[tokio::test]
async fn test_no_dispatch_after_stop() {
    let (a, b) = udp_pair().await;

    let collector = MessageCollector::new();
    b.dispatcher().add_handler("/late", collector.handler()).unwrap();

    b.stop_listening().await;

    a.send(&MessageBuilder::new("/late").build()).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(collector.count(), 0, "no handler runs after stop");

    a.stop_listening().await;
}

#[tokio::test]
async fn test_connection_events_on_tcp() {
    let (a, b) = tcp_pair(Framing::Osc11).await;

    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = events.clone();
    a.on_event(move |event| {
        seen.lock().push(format!("{:?}", event));
    });

    a.send(&MessageBuilder::new("/hi").build()).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(
        events
            .lock()
            .iter()
            .any(|e| e.starts_with("Connected")),
        "connect event expected, saw {:?}",
        events.lock()
    );
    assert!(a.is_connected());

    a.stop_listening().await;
    b.stop_listening().await;
}
