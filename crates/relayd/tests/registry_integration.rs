//! Integration tests for the Registry Actor.
//!
//! These tests verify the registry works correctly as a complete system,
//! testing the spawn_registry() function and RegistryHandle interface
//! under concurrent callers.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::collections::HashSet;
use std::time::Duration;

use relay_core::{DisplayName, SessionId};
use relayd::outbound::{Outbound, OutboundReceiver};
use relayd::registry::{
    spawn_registry, RegisteredSession, RegistryError, RegistryHandle, RemovalReason,
    SessionEvent, DEFAULT_MAX_SESSIONS,
};
use tokio::time::timeout;

// ============================================================================
// Test Helpers
// ============================================================================

fn name(raw: &str) -> Option<DisplayName> {
    Some(DisplayName::parse(raw).unwrap())
}

async fn register(handle: &RegistryHandle, raw: &str) -> (RegisteredSession, OutboundReceiver) {
    let (outbound, rx) = Outbound::channel(8);
    let session = handle
        .register(name(raw), outbound)
        .await
        .expect("registration should succeed");
    (session, rx)
}

fn names(sessions: &[RegisteredSession]) -> Vec<String> {
    sessions.iter().map(|s| s.name().to_string()).collect()
}

// ============================================================================
// Basic Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let handle = spawn_registry(DEFAULT_MAX_SESSIONS);

    let (session, _rx) = register(&handle, "alice").await;

    let roster = handle.enumerate().await;
    assert_eq!(names(&roster), vec!["alice"]);

    let found = handle.lookup_by_name("alice").await;
    assert_eq!(found.map(|s| s.id()), Some(session.id()));

    let removed = handle
        .deregister(session.id(), RemovalReason::Requested)
        .await
        .expect("session should be removed");
    assert_eq!(removed.id, session.id());

    assert!(handle.lookup_by_name("alice").await.is_none());
    assert!(handle.enumerate().await.is_empty());
}

#[tokio::test]
async fn test_events_follow_lifecycle() {
    let handle = spawn_registry(DEFAULT_MAX_SESSIONS);
    let mut events = handle.subscribe();

    let (session, _rx) = register(&handle, "alice").await;
    handle
        .rename(session.id(), DisplayName::parse("zed").unwrap())
        .await
        .unwrap();
    handle.deregister(session.id(), RemovalReason::PeerClosed).await;

    let event = events.recv().await.unwrap();
    assert!(matches!(event, SessionEvent::Registered { session } if session.display_name == "alice"));

    let event = events.recv().await.unwrap();
    assert!(matches!(
        event,
        SessionEvent::Renamed { old_name, new_name, .. } if old_name == "alice" && new_name == "zed"
    ));

    let event = events.recv().await.unwrap();
    assert!(matches!(
        event,
        SessionEvent::Removed { session, reason: RemovalReason::PeerClosed } if session.display_name == "zed"
    ));
}

#[tokio::test]
async fn test_capacity_enforced() {
    let handle = spawn_registry(3);

    let mut kept = Vec::new();
    for n in ["a", "b", "c"] {
        kept.push(register(&handle, n).await);
    }

    let (outbound, _rx) = Outbound::channel(1);
    let result = handle.register(name("d"), outbound).await;
    assert!(matches!(result, Err(RegistryError::CapacityExceeded { max: 3 })));

    // Existing sessions are unaffected
    assert_eq!(names(&handle.enumerate().await), vec!["a", "b", "c"]);

    // A slot frees up after deregistration
    let first = kept[0].0.id();
    handle.deregister(first, RemovalReason::PeerClosed).await;
    let (outbound, _rx) = Outbound::channel(1);
    assert!(handle.register(name("d"), outbound).await.is_ok());
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_deregister_no_lost_or_phantom_entries() {
    let handle = spawn_registry(1_000);

    // Long-lived sessions registered up front must appear in every snapshot
    let mut stable = Vec::new();
    for i in 0..5 {
        stable.push(register(&handle, &format!("stable{i}")).await);
    }
    let stable_ids: HashSet<SessionId> = stable.iter().map(|(s, _)| s.id()).collect();

    let mut churners = Vec::new();
    for task in 0..8 {
        let handle = handle.clone();
        churners.push(tokio::spawn(async move {
            let mut removed = Vec::new();
            for i in 0..25 {
                let (outbound, _rx) = Outbound::channel(1);
                let session = handle
                    .register(name(&format!("t{task}-{i}")), outbound)
                    .await
                    .unwrap();
                handle
                    .deregister(session.id(), RemovalReason::PeerClosed)
                    .await
                    .unwrap();
                removed.push(session.id());
            }
            removed
        }));
    }

    let reader = {
        let handle = handle.clone();
        let stable_ids = stable_ids.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let snapshot = handle.enumerate().await;
                let ids: HashSet<SessionId> = snapshot.iter().map(|s| s.id()).collect();
                assert!(stable_ids.is_subset(&ids), "stable session missing");
                // Registration order is id order
                assert!(snapshot.windows(2).all(|w| w[0].id() < w[1].id()));
                tokio::task::yield_now().await;
            }
        })
    };

    let mut removed = HashSet::new();
    for churner in churners {
        removed.extend(churner.await.unwrap());
    }
    reader.await.unwrap();

    let final_ids: HashSet<SessionId> = handle.enumerate().await.iter().map(|s| s.id()).collect();
    assert_eq!(final_ids, stable_ids);
    assert!(final_ids.is_disjoint(&removed));
    assert_eq!(removed.len(), 8 * 25, "ids are never reused");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rename_visible_to_other_tasks() {
    let handle = spawn_registry(DEFAULT_MAX_SESSIONS);
    let (session, _rx) = register(&handle, "alice").await;

    handle
        .rename(session.id(), DisplayName::parse("zed").unwrap())
        .await
        .unwrap();

    let other = handle.clone();
    let found = tokio::spawn(async move { other.lookup_by_name("zed").await })
        .await
        .unwrap();
    assert_eq!(found.map(|s| s.id()), Some(session.id()));
    assert!(handle.lookup_by_name("alice").await.is_none());
}

#[tokio::test]
async fn test_deregister_is_idempotent() {
    let handle = spawn_registry(DEFAULT_MAX_SESSIONS);
    let (session, _rx) = register(&handle, "alice").await;
    let mut events = handle.subscribe();

    assert!(handle
        .deregister(session.id(), RemovalReason::Requested)
        .await
        .is_some());
    assert!(handle
        .deregister(session.id(), RemovalReason::PeerClosed)
        .await
        .is_none());

    // Only one Removed event is published
    let first = events.recv().await.unwrap();
    assert!(matches!(first, SessionEvent::Removed { .. }));
    let second = timeout(Duration::from_millis(50), events.recv()).await;
    assert!(second.is_err());

    // Commands against the departed id have no effect
    assert!(matches!(
        handle.mark_closing(session.id()).await,
        Err(RegistryError::SessionNotFound(_))
    ));
    assert!(handle
        .rename(session.id(), DisplayName::parse("ghost").unwrap())
        .await
        .is_err());
    assert!(handle.enumerate().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_names_resolve_to_earliest() {
    let handle = spawn_registry(DEFAULT_MAX_SESSIONS);
    let (first, _a) = register(&handle, "bob").await;
    let (second, _b) = register(&handle, "bob").await;

    assert_eq!(
        handle.lookup_by_name("bob").await.map(|s| s.id()),
        Some(first.id())
    );

    handle.deregister(first.id(), RemovalReason::PeerClosed).await;
    assert_eq!(
        handle.lookup_by_name("bob").await.map(|s| s.id()),
        Some(second.id())
    );
}

#[tokio::test]
async fn test_actor_stops_when_handles_dropped() {
    let handle = spawn_registry(DEFAULT_MAX_SESSIONS);
    let mut events = handle.subscribe();
    drop(handle);

    // The actor owns the last event sender once every handle is gone
    let result = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert!(result.is_err());
}
