//! Trait contract tests for ResourceProvider, VersionLedger, and WorkQueue.
//!
//! These tests verify the behavioral contracts of the resource traits
//! using the in-memory implementations. Any conforming implementation
//! must pass these.

use std::time::Duration;

use chrono::Utc;
use resource_layer::resource_traits::*;
use resource_layer::{MemoryFifoQueue, MemoryResourceProvider, MemoryVersionLedger, WorkQueue};
use serde_json::json;

fn id(s: &str) -> LogicalId {
    LogicalId::new(s).unwrap()
}

// ===========================================================================
// ResourceProvider contract tests
// ===========================================================================

#[tokio::test]
async fn provider_new_logical_id_creates() {
    let provider = MemoryResourceProvider::new();
    let spec = ResourceSpec::new(id("VersionA"), ResourceKind::FunctionVersion, json!({}));

    assert_eq!(provider.apply(&spec).await.unwrap(), ApplyOutcome::Created);
}

#[tokio::test]
async fn provider_renamed_resource_is_a_new_resource() {
    let provider = MemoryResourceProvider::new();
    let props = json!({"function": "SiteServer"});
    provider
        .apply(&ResourceSpec::new(id("VersionA"), ResourceKind::FunctionVersion, props.clone()))
        .await
        .unwrap();
    let outcome = provider
        .apply(&ResourceSpec::new(id("VersionB"), ResourceKind::FunctionVersion, props))
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Created);
    // The old one is left behind for the provisioner to collect.
    assert_eq!(provider.list(Some(ResourceKind::FunctionVersion)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn provider_list_filters_by_kind() {
    let provider = MemoryResourceProvider::new();
    provider
        .apply(&ResourceSpec::new(id("Q"), ResourceKind::Queue, json!({})))
        .await
        .unwrap();
    provider
        .apply(&ResourceSpec::new(id("F"), ResourceKind::Function, json!({})))
        .await
        .unwrap();

    let queues = provider.list(Some(ResourceKind::Queue)).await.unwrap();
    assert_eq!(queues.len(), 1);
    assert_eq!(queues[0].spec.logical_id.as_str(), "Q");
    assert_eq!(provider.list(None).await.unwrap().len(), 2);
}

// ===========================================================================
// VersionLedger contract tests
// ===========================================================================

#[tokio::test]
async fn ledger_positions_are_independent() {
    let ledger = MemoryVersionLedger::new();
    ledger
        .record(VersionRecord {
            position: id("ServerVersion"),
            identifier: id("ServerVersionabc"),
            function: id("Server"),
            content_hash: ContentHash::from_bytes(b"server"),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    assert!(ledger.current(&id("SignerVersion")).await.unwrap().is_none());
    assert!(ledger.history(&id("SignerVersion")).await.unwrap().is_empty());
}

// ===========================================================================
// WorkQueue contract tests
// ===========================================================================

fn fifo() -> MemoryFifoQueue {
    MemoryFifoQueue::new(Duration::from_secs(30), Duration::ZERO)
}

#[tokio::test]
async fn queue_preserves_order_within_group() {
    let q = fifo();
    for n in 0..3 {
        q.send("page-a", &format!("a{n}"), json!(n)).await.unwrap();
    }

    let batch = q.receive(10).await.unwrap();
    let bodies: Vec<_> = batch.iter().map(|m| m.message.body.clone()).collect();
    assert_eq!(bodies, vec![json!(0), json!(1), json!(2)]);
}

#[tokio::test]
async fn queue_locks_group_while_in_flight() {
    let q = fifo();
    q.send("page-a", "a0", json!("a0")).await.unwrap();
    q.send("page-a", "a1", json!("a1")).await.unwrap();
    q.send("page-b", "b0", json!("b0")).await.unwrap();

    let first = q.receive(1).await.unwrap();
    assert_eq!(first[0].message.body, json!("a0"));

    // page-a is locked behind a0; only page-b is deliverable.
    let second = q.receive(10).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].message.body, json!("b0"));

    q.ack(&first[0].receipt).await.unwrap();
    let third = q.receive(10).await.unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].message.body, json!("a1"));
}

#[tokio::test(start_paused = true)]
async fn queue_redelivers_after_visibility_timeout() {
    let q = fifo();
    q.send("page-a", "a0", json!("a0")).await.unwrap();

    let first = q.receive(1).await.unwrap();
    assert_eq!(first[0].message.receive_count, 1);
    assert!(q.receive(1).await.unwrap().is_empty());

    tokio::time::advance(Duration::from_secs(31)).await;

    let again = q.receive(1).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].message.message_id, first[0].message.message_id);
    assert_eq!(again[0].message.receive_count, 2);

    // The stale receipt no longer acknowledges anything.
    assert!(q.ack(&first[0].receipt).await.is_err());
    q.ack(&again[0].receipt).await.unwrap();
    assert!(q.is_empty());
}

#[tokio::test(start_paused = true)]
async fn queue_long_poll_returns_empty_after_wait() {
    let q = MemoryFifoQueue::new(Duration::from_secs(30), Duration::from_secs(20));
    let started = tokio::time::Instant::now();

    let batch = q.receive(5).await.unwrap();
    assert!(batch.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn queue_dedup_window_expires() {
    let q = fifo();
    assert!(q.send("g", "same", json!(1)).await.unwrap().is_some());
    assert!(q.send("g", "same", json!(2)).await.unwrap().is_none());

    tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
    assert!(q.send("g", "same", json!(3)).await.unwrap().is_some());
}
