//! Status engine behaviour on a single node.

mod common;

use std::time::Duration;

use statushub_core::config::status::StatusConfig;
use statushub_core::error::ErrorKind;
use statushub_database::StatusStore;
use statushub_entity::status::{StatusRecord, UserStatus};

use common::{CountingStore, ManualClock, Node, START_MS, eventually};

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;

    let err = node.service.get_status("ghost").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let fallback = node.service.get_status_or_default("ghost").await;
    assert_eq!(fallback, StatusRecord::offline_default("ghost"));
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_invalid_user_id_rejected() {
    let node = Node::solo(CountingStore::new(), ManualClock::at(START_MS)).await;
    let err = node.service.set_status_online("", false).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let long = "x".repeat(65);
    let err = node.service.set_status_dnd(&long).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_disabled_tracking_is_a_noop() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;
    node.config.set_enabled(false);

    let record = node.service.set_status_online("u1", true).await.unwrap();
    assert_eq!(record, StatusRecord::offline_default("u1"));
    node.service.set_status_dnd("u1").await.unwrap();
    node.service.remove_user("u1").await.unwrap();
    node.service.clear_caches().await.unwrap();
    assert!(node.service.expire_dnd_statuses().await.unwrap().is_empty());

    assert_eq!(
        node.service.get_status("u1").await.unwrap(),
        StatusRecord::offline_default("u1")
    );
    assert!(
        node.service
            .get_statuses_by_ids(&["u1".to_string()])
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(store.saves(), 0);
    assert!(node.cached("u1").await.is_none());
}

#[tokio::test]
async fn test_manual_dnd_is_sticky_until_reset() {
    let node = Node::solo(CountingStore::new(), ManualClock::at(START_MS)).await;

    node.service.set_status_online("u1", false).await.unwrap();
    let dnd = node.service.set_status_dnd("u1").await.unwrap();
    assert_eq!(dnd.status, UserStatus::Dnd);
    assert!(dnd.manual);

    for record in [
        node.service.set_status_online("u1", false).await.unwrap(),
        node.service.set_status_offline("u1", false).await.unwrap(),
        node.service.set_status_away_if_needed("u1", false).await.unwrap(),
        node.service.record_activity("u1").await.unwrap(),
    ] {
        assert_eq!(record.status, UserStatus::Dnd);
        assert!(record.manual);
    }

    let reset = node.service.reset_status("u1").await.unwrap();
    assert_eq!(reset.status, UserStatus::Offline);
    assert!(!reset.manual);
    assert_eq!(
        node.service.get_status("u1").await.unwrap().status,
        UserStatus::Offline
    );
}

#[tokio::test]
async fn test_manual_online_overrides_out_of_office() {
    let node = Node::solo(CountingStore::new(), ManualClock::at(START_MS)).await;
    node.service.set_status_out_of_office("u1").await.unwrap();

    let kept = node.service.set_status_online("u1", false).await.unwrap();
    assert_eq!(kept.status, UserStatus::OutOfOffice);

    let online = node.service.set_status_online("u1", true).await.unwrap();
    assert_eq!(online.status, UserStatus::Online);
    assert!(!online.manual);
}

#[tokio::test]
async fn test_timed_dnd_expires_back_to_previous_status() {
    let clock = ManualClock::at(START_MS);
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), clock.clone()).await;

    node.service.set_status_online("u1", false).await.unwrap();
    let dnd = node
        .service
        .set_status_dnd_timed("u1", START_MS + 5_000)
        .await
        .unwrap();
    assert_eq!(dnd.status, UserStatus::Dnd);
    assert_eq!(dnd.previous_status, Some(UserStatus::Online));
    assert_eq!(dnd.dnd_end_time, Some(START_MS + 5_000));

    clock.advance_ms(4_000);
    assert!(node.service.expire_dnd_statuses().await.unwrap().is_empty());

    clock.advance_ms(1_000);
    let restored = node.service.expire_dnd_statuses().await.unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].status, UserStatus::Online);
    assert!(!restored[0].manual);
    assert_eq!(restored[0].dnd_end_time, None);
    assert_eq!(restored[0].previous_status, None);

    let cached = node.cached("u1").await.unwrap();
    assert_eq!(cached.status, UserStatus::Online);
    assert_eq!(store.inner.get("u1").await.unwrap().status, UserStatus::Online);

    // A second sweep finds nothing.
    assert!(node.service.expire_dnd_statuses().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retimed_dnd_keeps_restore_target() {
    let clock = ManualClock::at(START_MS);
    let node = Node::solo(CountingStore::new(), clock.clone()).await;

    node.service.set_status_out_of_office("u1").await.unwrap();
    node.service
        .set_status_dnd_timed("u1", START_MS + 1_000)
        .await
        .unwrap();
    let retimed = node
        .service
        .set_status_dnd_timed("u1", START_MS + 9_000)
        .await
        .unwrap();
    assert_eq!(retimed.previous_status, Some(UserStatus::OutOfOffice));

    clock.advance_ms(9_000);
    let restored = node.service.expire_dnd_statuses().await.unwrap();
    assert_eq!(restored[0].status, UserStatus::OutOfOffice);
}

#[tokio::test]
async fn test_past_dnd_deadline_rejected() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;

    for end in [START_MS, START_MS - 1, 0, -5] {
        let err = node.service.set_status_dnd_timed("u1", end).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
    assert_eq!(store.saves(), 0);
    assert!(node.cached("u1").await.is_none());
}

#[tokio::test]
async fn test_sweep_restores_records_written_elsewhere() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;

    let expired = StatusRecord {
        previous_status: Some(UserStatus::Away),
        dnd_end_time: Some(START_MS - 1),
        ..StatusRecord::new("u1", UserStatus::Dnd, true, START_MS - 60_000)
    };
    store.inner.save_or_update(&expired).await.unwrap();

    let restored = node.service.expire_dnd_statuses().await.unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].status, UserStatus::Away);
    assert_eq!(
        node.service.get_status("u1").await.unwrap().status,
        UserStatus::Away
    );
}

#[tokio::test]
async fn test_activity_writes_are_coalesced() {
    let clock = ManualClock::at(START_MS);
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), clock.clone()).await;

    node.service.set_status_online("u1", false).await.unwrap();
    clock.advance_ms(1_000);
    let second = node.service.set_status_online("u1", false).await.unwrap();

    assert_eq!(store.saves(), 1);
    assert_eq!(store.activity_updates(), 0);
    assert_eq!(second.last_activity_at, START_MS + 1_000);
    assert_eq!(
        node.cached("u1").await.unwrap().last_activity_at,
        START_MS + 1_000
    );
    assert_eq!(store.inner.get("u1").await.unwrap().last_activity_at, START_MS);

    // Past the interval the refresh is written.
    clock.advance_ms(60_000);
    node.service.record_activity("u1").await.unwrap();
    assert_eq!(store.activity_updates(), 1);
    assert_eq!(
        store.inner.get("u1").await.unwrap().last_activity_at,
        START_MS + 61_000
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_online_calls_persist_once() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = node.service.clone();
        handles.push(tokio::spawn(async move {
            service.set_status_online("u1", false).await
        }));
    }
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        assert_eq!(record.status, UserStatus::Online);
    }

    assert_eq!(store.saves(), 1);
    assert_eq!(store.activity_updates(), 0);
}

#[tokio::test]
async fn test_offline_twice_announces_once() {
    let clock = ManualClock::at(START_MS);
    let node = Node::solo(CountingStore::new(), clock.clone()).await;
    node.service.set_status_online("u1", false).await.unwrap();

    let mut rx = node.service.presence().subscribe();
    node.service.set_status_offline("u1", false).await.unwrap();
    clock.advance_ms(10);
    let again = node.service.set_status_offline("u1", false).await.unwrap();
    assert_eq!(again.status, UserStatus::Offline);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.status, UserStatus::Offline);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_away_then_online_emits_one_event_each() {
    let clock = ManualClock::at(START_MS);
    let node = Node::solo(CountingStore::new(), clock.clone()).await;
    node.service.set_status_online("u1", false).await.unwrap();

    // Not idle yet.
    clock.advance_ms(299_999);
    let kept = node.service.set_status_away_if_needed("u1", false).await.unwrap();
    assert_eq!(kept.status, UserStatus::Online);

    let mut rx = node.service.presence().subscribe();
    clock.advance_ms(1);
    let away = node.service.set_status_away_if_needed("u1", false).await.unwrap();
    assert_eq!(away.status, UserStatus::Away);
    node.service.set_status_online("u1", false).await.unwrap();

    assert_eq!(rx.try_recv().unwrap().status, UserStatus::Away);
    assert_eq!(rx.try_recv().unwrap().status, UserStatus::Online);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_last_activity_rewind_marks_user_away() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;
    node.service.set_status_online("u1", false).await.unwrap();

    node.service
        .set_status_last_activity_at("u1", START_MS - 400_000)
        .await
        .unwrap();
    let record = node.service.get_status("u1").await.unwrap();
    assert_eq!(record.status, UserStatus::Away);
    assert_eq!(record.last_activity_at, START_MS - 400_000);

    // Unknown users are ignored.
    node.service
        .set_status_last_activity_at("ghost", START_MS)
        .await
        .unwrap();
    assert!(store.inner.get("ghost").await.is_err());
}

#[tokio::test]
async fn test_bulk_read_keeps_request_order_and_backfills() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;
    for (user_id, status) in [
        ("u1", UserStatus::Online),
        ("u2", UserStatus::Away),
        ("u3", UserStatus::Offline),
    ] {
        store
            .inner
            .save_or_update(&StatusRecord::new(user_id, status, false, START_MS))
            .await
            .unwrap();
    }

    let ids: Vec<String> = ["u3", "missing", "u1"].iter().map(|s| s.to_string()).collect();
    let found = node.service.get_statuses_by_ids(&ids).await.unwrap();
    let order: Vec<&str> = found.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(order, ["u3", "u1"]);

    assert!(node.cached("u3").await.is_some());
    assert!(node.cached("u1").await.is_some());
    assert!(node.cached("u2").await.is_none());
}

#[tokio::test]
async fn test_remove_user_deletes_everywhere() {
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;
    node.service.set_status_online("u1", false).await.unwrap();

    node.service.remove_user("u1").await.unwrap();
    node.service.remove_user("u1").await.unwrap();

    assert!(node.cached("u1").await.is_none());
    assert_eq!(
        node.service.get_status("u1").await.unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_config_update_applies_to_next_operation() {
    let clock = ManualClock::at(START_MS);
    let node = Node::solo(CountingStore::new(), clock.clone()).await;
    node.service.set_status_online("u1", false).await.unwrap();
    clock.advance_ms(11_000);

    let kept = node.service.set_status_away_if_needed("u1", false).await.unwrap();
    assert_eq!(kept.status, UserStatus::Online);

    node.config
        .update(StatusConfig {
            away_timeout_seconds: 10,
            ..StatusConfig::default()
        })
        .unwrap();
    let away = node.service.set_status_away_if_needed("u1", false).await.unwrap();
    assert_eq!(away.status, UserStatus::Away);
}

#[tokio::test]
async fn test_abandoned_caller_still_updates_cache() {
    let store = CountingStore::slow(Duration::from_millis(200));
    let node = Node::solo(store.clone(), ManualClock::at(START_MS)).await;

    let attempt = tokio::time::timeout(
        Duration::from_millis(20),
        node.service.set_status_online("u1", false),
    )
    .await;
    assert!(attempt.is_err());

    let service = node.service.clone();
    let settled = eventually(|| {
        let service = service.clone();
        async move {
            matches!(
                service.cache().get("u1").await,
                Ok(Some(record)) if record.status == UserStatus::Online
            )
        }
    })
    .await;
    assert!(settled);
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_retimed_dnd_announces_new_deadline() {
    let node = Node::solo(CountingStore::new(), ManualClock::at(START_MS)).await;
    node.service
        .set_status_dnd_timed("u1", START_MS + 1_000)
        .await
        .unwrap();
    let mut rx = node.service.presence().subscribe();

    node.service
        .set_status_dnd_timed("u1", START_MS + 9_000)
        .await
        .unwrap();
    let event = rx.try_recv().unwrap();
    assert_eq!(event.status, UserStatus::Dnd);
    assert_eq!(event.dnd_end_time, Some(START_MS + 9_000));

    // The same deadline again is not news.
    node.service
        .set_status_dnd_timed("u1", START_MS + 9_000)
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_active_channel_is_saved_and_cleared_on_state_change() {
    let clock = ManualClock::at(START_MS);
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), clock.clone()).await;

    node.service.set_status_online("u1", false).await.unwrap();
    clock.advance_ms(300_000);
    node.service.set_status_away_if_needed("u1", false).await.unwrap();

    let viewing = node
        .service
        .set_active_channel("u1", Some("town-square".into()))
        .await
        .unwrap();
    assert_eq!(viewing.status, UserStatus::Online);
    assert_eq!(viewing.last_activity_at, START_MS + 300_000);
    assert_eq!(store.saves(), 3);
    assert_eq!(
        store.inner.get("u1").await.unwrap().active_channel.as_deref(),
        Some("town-square")
    );

    node.service.set_status_offline("u1", false).await.unwrap();
    assert_eq!(store.inner.get("u1").await.unwrap().active_channel, None);
}

#[tokio::test]
async fn test_user_slots_are_released_once_idle() {
    let clock = ManualClock::at(START_MS);
    let store = CountingStore::new();
    let node = Node::solo(store.clone(), clock.clone()).await;

    store
        .inner
        .save_or_update(&StatusRecord::new("u2", UserStatus::Away, false, START_MS))
        .await
        .unwrap();
    node.service.get_status("u2").await.unwrap();
    assert_eq!(node.service.tracked_users(), 0);

    // A fresh write is remembered for the coalescing window.
    node.service.set_status_online("u1", false).await.unwrap();
    assert_eq!(node.service.tracked_users(), 1);

    clock.advance_ms(60_000);
    node.service.expire_dnd_statuses().await.unwrap();
    assert_eq!(node.service.tracked_users(), 0);

    // A released slot lets the next refresh through.
    node.service.record_activity("u1").await.unwrap();
    assert_eq!(store.activity_updates(), 1);
}

#[tokio::test]
async fn test_slot_is_released_after_transition_outside_window() {
    let clock = ManualClock::at(START_MS);
    let node = Node::solo(CountingStore::new(), clock.clone()).await;
    node.config
        .update(StatusConfig {
            min_update_interval_ms: 0,
            ..StatusConfig::default()
        })
        .unwrap();

    node.service.set_status_online("u1", false).await.unwrap();
    node.service.set_status_dnd("u1").await.unwrap();
    assert_eq!(node.service.tracked_users(), 0);
}
