//! Two nodes sharing a store and a cluster bus.

mod common;

use std::time::Duration;

use statushub_cluster::MemoryClusterHub;
use statushub_entity::status::UserStatus;

use common::{CountingStore, ManualClock, Node, START_MS, eventually};

async fn pair() -> (Node, Node) {
    let hub = MemoryClusterHub::new(64);
    let store = CountingStore::new();
    let clock = ManualClock::at(START_MS);
    let a = Node::join(&hub, store.clone(), clock.clone()).await;
    let b = Node::join(&hub, store, clock).await;
    (a, b)
}

/// Wait until `node` caches `expected` for `user_id`.
async fn settles(node: &Node, user_id: &str, expected: Option<UserStatus>) -> bool {
    eventually(|| async move { peer_status(node, user_id).await == expected }).await
}

async fn peer_status(node: &Node, user_id: &str) -> Option<UserStatus> {
    node.service
        .cache()
        .get(user_id)
        .await
        .ok()
        .flatten()
        .map(|record| record.status)
}

#[tokio::test]
async fn test_status_change_reaches_peer_cache() {
    let (a, b) = pair().await;

    a.service.set_status_dnd("u1").await.unwrap();
    assert!(settles(&b, "u1", Some(UserStatus::Dnd)).await);

    a.service.set_status_online("u1", true).await.unwrap();
    assert!(settles(&b, "u1", Some(UserStatus::Online)).await);
}

#[tokio::test]
async fn test_presence_is_relayed_to_peer_clients() {
    let (a, b) = pair().await;
    let mut local = a.service.presence().subscribe();
    let mut remote = b.service.presence().subscribe();

    a.service.set_status_out_of_office("u1").await.unwrap();

    let event = local.try_recv().unwrap();
    assert_eq!(event.status, UserStatus::OutOfOffice);

    let relayed = tokio::time::timeout(Duration::from_secs(1), remote.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relayed, event);

    // The origin node does not hear its own event back.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(local.try_recv().is_err());
}

#[tokio::test]
async fn test_remove_user_invalidates_peer() {
    let (a, b) = pair().await;
    a.service.set_status_online("u1", false).await.unwrap();
    assert!(settles(&b, "u1", Some(UserStatus::Online)).await);

    a.service.remove_user("u1").await.unwrap();
    assert!(settles(&b, "u1", None).await);
    assert!(b.service.get_status("u1").await.is_err());
}

#[tokio::test]
async fn test_clear_caches_purges_peer() {
    let (a, b) = pair().await;
    a.service.set_status_online("u1", false).await.unwrap();
    a.service.set_status_online("u2", false).await.unwrap();
    assert!(settles(&b, "u2", Some(UserStatus::Online)).await);

    a.service.clear_caches().await.unwrap();
    assert!(a.service.cache().get("u1").await.unwrap().is_none());
    assert!(settles(&b, "u1", None).await);
    assert!(settles(&b, "u2", None).await);

    // Reads fall back to the shared store.
    assert_eq!(
        b.service.get_status("u1").await.unwrap().status,
        UserStatus::Online
    );
}

#[tokio::test]
async fn test_peer_sees_sweep_result() {
    let hub = MemoryClusterHub::new(64);
    let store = CountingStore::new();
    let clock = ManualClock::at(START_MS);
    let a = Node::join(&hub, store.clone(), clock.clone()).await;
    let b = Node::join(&hub, store, clock.clone()).await;

    a.service.set_status_online("u1", false).await.unwrap();
    a.service
        .set_status_dnd_timed("u1", START_MS + 1_000)
        .await
        .unwrap();
    assert!(settles(&b, "u1", Some(UserStatus::Dnd)).await);

    clock.advance_ms(1_000);
    let restored = b.service.expire_dnd_statuses().await.unwrap();
    assert_eq!(restored.len(), 1);
    assert!(settles(&a, "u1", Some(UserStatus::Online)).await);
}
