//! Bridge Registry Tests
//!
//! Refcounting and single-flight start semantics of the shared
//! per-meeting consumer bridge.

mod common;

use common::*;
use sfu_core::bridge::{BridgeRegistry, BridgeState};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_single_flight_start() {
    let mcs = StubMcs::new();
    let registry = BridgeRegistry::new();
    *mcs.join_delay.lock().unwrap() = Some(Duration::from_millis(50));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let mcs = mcs.clone();
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry
                .acquire(mcs.as_ref(), "meeting-1", "72013", "freeswitch")
                .await
                .unwrap()
        }));
    }

    let mut media_ids = Vec::new();
    for task in tasks {
        let bridge = task.await.unwrap();
        media_ids.push(bridge.media().unwrap().media_id);
    }

    // One underlying start, shared by every acquirer
    assert_eq!(mcs.join_count(), 1);
    assert_eq!(mcs.publish_count(), 1);
    media_ids.dedup();
    assert_eq!(media_ids.len(), 1);
    assert_eq!(registry.refs("meeting-1"), 5);
    assert_eq!(registry.live("meeting-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_to_zero_stops_bridge() {
    let mcs = StubMcs::new();
    let registry = BridgeRegistry::new();

    let bridge = registry
        .acquire(mcs.as_ref(), "meeting-1", "72013", "freeswitch")
        .await
        .unwrap();
    registry
        .acquire(mcs.as_ref(), "meeting-1", "72013", "freeswitch")
        .await
        .unwrap();
    assert_eq!(registry.refs("meeting-1"), 2);
    assert_eq!(bridge.state(), BridgeState::Running);

    registry.release(mcs.as_ref(), "meeting-1").await;
    assert_eq!(registry.refs("meeting-1"), 1);
    assert_eq!(mcs.unpublish_count(), 0);

    registry.release(mcs.as_ref(), "meeting-1").await;
    assert_eq!(registry.live("meeting-1"), 0);
    assert_eq!(mcs.unpublish_count(), 1);
    assert_eq!(bridge.state(), BridgeState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_release_without_bridge_is_noop() {
    let mcs = StubMcs::new();
    let registry = BridgeRegistry::new();

    registry.release(mcs.as_ref(), "meeting-9").await;
    assert_eq!(registry.live("meeting-9"), 0);
    assert!(mcs.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_allows_retry() {
    let mcs = StubMcs::new();
    let registry = BridgeRegistry::new();
    mcs.fail_publish.store(true, Ordering::SeqCst);

    let result = registry
        .acquire(mcs.as_ref(), "meeting-1", "72013", "freeswitch")
        .await;
    assert!(result.is_err());
    assert_eq!(registry.refs("meeting-1"), 0);
    assert_eq!(registry.live("meeting-1"), 0);

    mcs.fail_publish.store(false, Ordering::SeqCst);
    let bridge = registry
        .acquire(mcs.as_ref(), "meeting-1", "72013", "freeswitch")
        .await
        .unwrap();
    assert_eq!(bridge.state(), BridgeState::Running);
    assert_eq!(registry.refs("meeting-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_meetings_get_distinct_bridges() {
    let mcs = StubMcs::new();
    let registry = BridgeRegistry::new();

    let a = registry
        .acquire(mcs.as_ref(), "meeting-a", "111", "freeswitch")
        .await
        .unwrap();
    let b = registry
        .acquire(mcs.as_ref(), "meeting-b", "222", "freeswitch")
        .await
        .unwrap();

    assert_ne!(
        a.media().unwrap().media_id,
        b.media().unwrap().media_id
    );
    assert_eq!(registry.live("meeting-a"), 1);
    assert_eq!(registry.live("meeting-b"), 1);
}
