//! Shared fixtures for status engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;

use statushub_cache::CacheManager;
use statushub_cache::keys::STATUS_CACHE;
use statushub_cluster::{ClusterBus, MemoryClusterHub, PresenceHub};
use statushub_core::config::cache::CacheConfig;
use statushub_core::config::status::StatusConfig;
use statushub_core::error::{AppError, ErrorKind};
use statushub_core::events::InvalidationTopic;
use statushub_core::result::AppResult;
use statushub_core::traits::cache::CacheProvider;
use statushub_database::{MemoryStatusStore, StatusStore};
use statushub_entity::status::StatusRecord;
use statushub_service::{StatusCache, StatusConfigHandle, StatusService};

/// 2023-11-14T22:13:20Z.
pub const START_MS: i64 = 1_700_000_000_000;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(ms: i64) -> Arc<Self> {
        let now = Utc.timestamp_millis_opt(ms).single().expect("valid timestamp");
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock().expect("clock lock");
        *now += chrono::Duration::milliseconds(ms);
    }

    pub fn now_ms(&self) -> i64 {
        self.now.lock().expect("clock lock").timestamp_millis()
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Store wrapper counting writes, optionally slowing full saves down.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryStatusStore,
    saves: AtomicUsize,
    activity_updates: AtomicUsize,
    save_delay: Option<Duration>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            save_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn activity_updates(&self) -> usize {
        self.activity_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusStore for CountingStore {
    async fn get(&self, user_id: &str) -> AppResult<StatusRecord> {
        self.inner.get(user_id).await
    }

    async fn get_by_ids(&self, user_ids: &[String]) -> AppResult<Vec<StatusRecord>> {
        self.inner.get_by_ids(user_ids).await
    }

    async fn save_or_update(&self, status: &StatusRecord) -> AppResult<()> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_or_update(status).await
    }

    async fn update_last_activity_at(&self, user_id: &str, last_activity_at: i64) -> AppResult<()> {
        self.activity_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_last_activity_at(user_id, last_activity_at).await
    }

    async fn update_expired_dnd_statuses(&self, now: i64) -> AppResult<Vec<StatusRecord>> {
        self.inner.update_expired_dnd_statuses(now).await
    }

    async fn delete(&self, user_id: &str) -> AppResult<()> {
        self.inner.delete(user_id).await
    }
}

/// Cache whose every call fails, like an unreachable Redis.
#[derive(Debug)]
pub struct BrokenCache;

fn unreachable_cache() -> AppError {
    AppError::new(ErrorKind::ServiceUnavailable, "cache unreachable")
}

#[async_trait]
impl CacheProvider for BrokenCache {
    fn name(&self) -> &str {
        STATUS_CACHE
    }

    fn invalidate_cluster_event(&self) -> InvalidationTopic {
        InvalidationTopic::None
    }

    async fn get(&self, _key: &str) -> AppResult<Option<Bytes>> {
        Err(unreachable_cache())
    }

    async fn set(&self, _key: &str, _value: Bytes) -> AppResult<()> {
        Err(unreachable_cache())
    }

    async fn set_with_expiry(&self, _key: &str, _value: Bytes, _ttl: Duration) -> AppResult<()> {
        Err(unreachable_cache())
    }

    async fn set_with_default_expiry(&self, _key: &str, _value: Bytes) -> AppResult<()> {
        Err(unreachable_cache())
    }

    async fn remove(&self, _key: &str) -> AppResult<()> {
        Err(unreachable_cache())
    }

    async fn purge(&self) -> AppResult<()> {
        Err(unreachable_cache())
    }

    async fn keys(&self) -> AppResult<Vec<String>> {
        Err(unreachable_cache())
    }

    async fn len(&self) -> AppResult<usize> {
        Err(unreachable_cache())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Err(unreachable_cache())
    }
}

/// One fully wired node.
pub struct Node {
    pub service: StatusService,
    pub config: StatusConfigHandle,
    pub caches: CacheManager,
    pub bus: Arc<dyn ClusterBus>,
}

impl Node {
    pub async fn join(
        hub: &MemoryClusterHub,
        store: Arc<dyn StatusStore>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let caches = CacheManager::new(&CacheConfig::default())
            .await
            .expect("cache manager");
        let provider = caches
            .build_cache(STATUS_CACHE, InvalidationTopic::Status)
            .expect("status cache");
        Self::wire(hub, store, clock, caches, provider)
    }

    /// A single node whose status cache is `provider`.
    pub async fn with_cache(
        store: Arc<dyn StatusStore>,
        clock: Arc<ManualClock>,
        provider: Arc<dyn CacheProvider>,
    ) -> Self {
        let caches = CacheManager::from_provider(Arc::clone(&provider));
        Self::wire(&MemoryClusterHub::new(64), store, clock, caches, provider)
    }

    fn wire(
        hub: &MemoryClusterHub,
        store: Arc<dyn StatusStore>,
        clock: Arc<ManualClock>,
        caches: CacheManager,
        provider: Arc<dyn CacheProvider>,
    ) -> Self {
        let config = StatusConfigHandle::new(StatusConfig::default()).expect("config");
        let bus: Arc<dyn ClusterBus> = Arc::new(hub.join());

        let service = StatusService::new(
            store,
            StatusCache::new(provider),
            Arc::clone(&bus),
            PresenceHub::new(64),
            config.subscribe(),
            clock,
        );
        service.register_cluster_handlers(&caches);

        Self {
            service,
            config,
            caches,
            bus,
        }
    }

    /// A single node with its own hub.
    pub async fn solo(store: Arc<dyn StatusStore>, clock: Arc<ManualClock>) -> Self {
        Self::join(&MemoryClusterHub::new(64), store, clock).await
    }

    pub async fn cached(&self, user_id: &str) -> Option<StatusRecord> {
        self.service.cache().get(user_id).await.expect("cache read")
    }
}

/// Poll until `check` holds or a second passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
