// Snapshot bus tests: replay, per-consumer overflow, independent cursors

use futures_util::StreamExt;
use hyperstats::bus::{BusConfig, SnapshotBus};
use hyperstats::models::HyperSnapshot;
use std::sync::Arc;

fn bus() -> SnapshotBus {
    SnapshotBus::new(BusConfig {
        replay: 10,
        extra_buffer: 200,
    })
}

fn snap(ts: u64) -> Arc<HyperSnapshot> {
    Arc::new(HyperSnapshot {
        timestamp: ts,
        ..Default::default()
    })
}

fn drain(sub: &mut hyperstats::bus::Subscription) -> Vec<u64> {
    std::iter::from_fn(|| sub.try_recv())
        .map(|s| s.timestamp)
        .collect()
}

#[test]
fn late_subscriber_replays_last_ten() {
    let b = bus();
    for ts in 0..15 {
        b.publish(snap(ts));
    }
    let mut sub = b.subscribe();
    assert_eq!(sub.pending(), 10);
    assert_eq!(drain(&mut sub), (5..15).collect::<Vec<_>>());
}

#[test]
fn subscriber_before_first_publish_gets_nothing() {
    let b = bus();
    let mut sub = b.subscribe();
    assert!(sub.try_recv().is_none());
    assert_eq!(b.current_snapshot().timestamp, 0);
}

#[test]
fn slow_consumer_drops_oldest() {
    let b = bus();
    let mut slow = b.subscribe();
    for ts in 0..300 {
        b.publish(snap(ts));
    }
    assert_eq!(slow.pending(), 210);
    assert_eq!(slow.dropped(), 90);
    let got = drain(&mut slow);
    assert_eq!(got.first(), Some(&90));
    assert_eq!(got.last(), Some(&299));
    assert!(got.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn consumers_have_independent_cursors() {
    let b = bus();
    let mut fast = b.subscribe();
    let mut slow = b.subscribe();
    for ts in 0..5 {
        b.publish(snap(ts));
        assert_eq!(fast.try_recv().map(|s| s.timestamp), Some(ts));
    }
    assert_eq!(slow.pending(), 5);
    assert_eq!(drain(&mut slow), vec![0, 1, 2, 3, 4]);
    assert_eq!(fast.dropped(), 0);
    assert_eq!(slow.dropped(), 0);
}

#[test]
fn publish_reports_reached_consumers() {
    let b = bus();
    assert_eq!(b.publish(snap(1)), 0);
    let _a = b.subscribe();
    let _c = b.subscribe();
    assert_eq!(b.publish(snap(2)), 2);
    assert_eq!(b.published_count(), 2);
    assert_eq!(b.consumer_count(), 2);
}

#[tokio::test]
async fn recv_wakes_on_publish() {
    let b = bus();
    let mut sub = b.subscribe();
    let publisher = b.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        publisher.publish(snap(42));
    });
    let got = tokio::time::timeout(tokio::time::Duration::from_secs(2), sub.recv())
        .await
        .expect("recv timed out");
    assert_eq!(got.map(|s| s.timestamp), Some(42));
}

#[tokio::test]
async fn stream_ends_after_close() {
    let b = bus();
    for ts in 0..3 {
        b.publish(snap(ts));
    }
    let stream = b.subscribe().into_stream();
    b.publish(snap(3));
    b.close();
    let got: Vec<u64> = stream.map(|s| s.timestamp).collect().await;
    assert_eq!(got, vec![0, 1, 2, 3]);
}
