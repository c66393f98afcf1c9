//! Full decode→annotate→aggregate→write pipeline wiring, exercised through
//! the public API only (this is an external `tests/` binary, so anything
//! gated `#[cfg(test)]` inside the library — the scripted RIS/SNMP test
//! doubles — isn't visible here; those get exercised by the in-module
//! tests instead). Matches `netflow_parser`'s `tests/` directory
//! convention for whole-pipeline coverage.

use flowhouse::aggregator::{Aggregator, Clock};
use flowhouse::annotator::Annotator;
use flowhouse::model::Flow;
use flowhouse::routemirror::RouteMirror;
use flowhouse::writer::memory::MemoryStore;
use flowhouse::writer::StoreClient;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

fn test_clock(start: i64) -> (Clock, Arc<AtomicI64>) {
    let now = Arc::new(AtomicI64::new(start));
    let moved = Arc::clone(&now);
    let clock: Clock = Arc::new(move || moved.load(Ordering::SeqCst));
    (clock, now)
}

fn sample_flow(agent: &str, packets: u64, size: u64) -> Flow {
    let mut flow = Flow::new(agent.parse().unwrap(), 4);
    flow.src_addr = "198.51.100.7".parse().unwrap();
    flow.dst_addr = "203.0.113.9".parse().unwrap();
    flow.src_port = 51000;
    flow.dst_port = 443;
    flow.protocol = 6;
    flow.packets = packets;
    flow.size = size;
    flow
}

/// Two flows that share an aggregation key, annotated then ingested in the
/// same 10s window, merge into one row; once the aggregator flushes it, the
/// batch writer persists exactly that merged row to the store.
#[tokio::test]
async fn annotated_flows_merge_and_persist_after_a_window_flush() {
    let mirror = RouteMirror::new(vec![]);
    let annotator = Annotator::new(mirror);

    let base = 1_700_000_000 - (1_700_000_000 % 10);
    let (clock, now) = test_clock(base);
    let aggregator = Aggregator::new(clock);

    let (ingress_tx, ingress_rx) = mpsc::channel(8);
    let (output_tx, output_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    aggregator.spawn(ingress_rx, output_tx, shutdown_rx);

    let store = Arc::new(MemoryStore::new());
    let writer_handle = flowhouse::writer::spawn(store.clone() as Arc<dyn StoreClient>, output_rx);

    let mut first = sample_flow("192.0.2.10", 10, 1000);
    annotator.annotate(&mut first);
    ingress_tx.send(first).await.unwrap();

    now.store(base + 3, Ordering::SeqCst);
    let mut second = sample_flow("192.0.2.10", 5, 500);
    annotator.annotate(&mut second);
    ingress_tx.send(second).await.unwrap();

    now.store(base + 11, Ordering::SeqCst);
    let mut third = sample_flow("192.0.2.10", 1, 40);
    annotator.annotate(&mut third);
    ingress_tx.send(third).await.unwrap();

    drop(ingress_tx);
    let _ = writer_handle.await;

    let committed = store.snapshot();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].packets, 15);
    assert_eq!(committed[0].size, 1500);
    assert_eq!(committed[0].timestamp, base);
}

/// Distinct agents never share an aggregation key, so two single-flow
/// batches flush and persist independently.
#[tokio::test]
async fn distinct_agents_persist_as_separate_rows() {
    let mirror = RouteMirror::new(vec![]);
    let annotator = Annotator::new(mirror);

    let base = 1_700_100_000 - (1_700_100_000 % 10);
    let (clock, now) = test_clock(base);
    let aggregator = Aggregator::new(clock);

    let (ingress_tx, ingress_rx) = mpsc::channel(8);
    let (output_tx, mut output_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    aggregator.spawn(ingress_rx, output_tx, shutdown_rx);

    let mut a = sample_flow("192.0.2.20", 1, 64);
    annotator.annotate(&mut a);
    ingress_tx.send(a).await.unwrap();
    let first_flush = timeout(Duration::from_secs(1), output_rx.recv()).await.unwrap().unwrap();
    assert!(first_flush.is_empty());

    now.store(base + 10, Ordering::SeqCst);
    let mut b = sample_flow("192.0.2.21", 2, 128);
    annotator.annotate(&mut b);
    ingress_tx.send(b).await.unwrap();
    let second_flush = timeout(Duration::from_secs(1), output_rx.recv()).await.unwrap().unwrap();
    assert_eq!(second_flush.len(), 1);
    assert_eq!(second_flush[0].agent, "192.0.2.20".parse::<std::net::IpAddr>().unwrap());
}
