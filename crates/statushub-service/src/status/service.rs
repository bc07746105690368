//! Status engine.
//!
//! Every state-changing operation runs the same pipeline for one user:
//! load (cache, then store) -> decide ([`transition`](super::transition))
//! -> persist -> cache -> broadcast. Operations on the same user are
//! serialised by a per-user async mutex; different users never contend.
//!
//! The pipeline runs in its own task. Dropping the caller's future does not
//! stop it, so a persisted change always reaches the cache.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use dashmap::DashMap;
use mockable::Clock;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::{debug, error, info, warn};

use statushub_cache::CacheManager;
use statushub_cluster::{ClusterBus, PresenceHub};
use statushub_core::config::status::StatusConfig;
use statushub_core::error::AppError;
use statushub_core::result::AppResult;
use statushub_database::StatusStore;
use statushub_entity::cluster::{ClusterEvent, ClusterEventKind, PresenceEvent};
use statushub_entity::status::StatusRecord;

use crate::invalidation::CacheInvalidationHandler;

use super::cache::StatusCache;
use super::handler::StatusClusterHandler;
use super::transition::{self, Current, Decision};

/// Node-local bookkeeping for one user.
#[derive(Debug, Default)]
pub(super) struct UserSlot {
    /// When this node last wrote the user's record to the store.
    last_persisted_at: Option<i64>,
}

impl UserSlot {
    /// Whether an activity-only write at `now` falls inside the coalescing
    /// window. A node that never wrote the record always writes.
    fn coalesces(&self, now: i64, interval_ms: i64) -> bool {
        self.last_persisted_at
            .is_some_and(|at| now.saturating_sub(at) < interval_ms)
    }
}

/// Exclusive hold on one user's slot.
///
/// Dropping the guard also forgets the slot when no other operation holds
/// or awaits it and its coalescing window has closed. A missing slot
/// behaves the same as such a slot, so nothing is lost.
pub(super) struct SlotGuard<'a> {
    engine: &'a Engine,
    user_id: String,
    slot: OwnedMutexGuard<UserSlot>,
}

impl Deref for SlotGuard<'_> {
    type Target = UserSlot;

    fn deref(&self) -> &UserSlot {
        &self.slot
    }
}

impl DerefMut for SlotGuard<'_> {
    fn deref_mut(&mut self) -> &mut UserSlot {
        &mut self.slot
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let now = self.engine.now();
        let interval_ms = self.engine.config.borrow().min_update_interval();
        // Two owners: the map and this guard.
        self.engine.slots.remove_if(&self.user_id, |_, slot| {
            Arc::strong_count(slot) == 2 && !self.slot.coalesces(now, interval_ms)
        });
    }
}

/// Shared state behind [`StatusService`].
pub(super) struct Engine {
    store: Arc<dyn StatusStore>,
    cache: StatusCache,
    bus: Arc<dyn ClusterBus>,
    presence: PresenceHub,
    config: watch::Receiver<StatusConfig>,
    clock: Arc<dyn Clock + Send + Sync>,
    slots: DashMap<String, Arc<Mutex<UserSlot>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("cache", &self.cache)
            .field("bus", &self.bus)
            .field("tracked_users", &self.slots.len())
            .finish_non_exhaustive()
    }
}

/// Status engine handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusService {
    inner: Arc<Engine>,
}

impl StatusService {
    /// Creates the status engine.
    pub fn new(
        store: Arc<dyn StatusStore>,
        cache: StatusCache,
        bus: Arc<dyn ClusterBus>,
        presence: PresenceHub,
        config: watch::Receiver<StatusConfig>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            inner: Arc::new(Engine {
                store,
                cache,
                bus,
                presence,
                config,
                clock,
                slots: DashMap::new(),
            }),
        }
    }

    /// Subscribe this node to everything peers publish: status updates
    /// for the status cache, presence changes for local clients and
    /// invalidations for every cache in `caches`.
    pub fn register_cluster_handlers(&self, caches: &CacheManager) {
        let bus = &self.inner.bus;
        bus.subscribe(
            ClusterEventKind::UpdateStatus,
            Arc::new(StatusClusterHandler::new(Arc::downgrade(&self.inner))),
        );
        bus.subscribe(
            ClusterEventKind::PresenceChanged,
            Arc::new(self.inner.presence.clone()),
        );
        bus.subscribe(
            ClusterEventKind::InvalidateCache,
            Arc::new(CacheInvalidationHandler::new(caches.clone())),
        );
    }

    /// The status cache.
    pub fn cache(&self) -> &StatusCache {
        &self.inner.cache
    }

    /// Local presence fan-out.
    pub fn presence(&self) -> &PresenceHub {
        &self.inner.presence
    }

    /// Number of users this node currently keeps write-coalescing state for.
    pub fn tracked_users(&self) -> usize {
        self.inner.slots.len()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current status of a user.
    ///
    /// With status tracking disabled this returns the offline default. A
    /// user without a record is `ErrorKind::NotFound`; a store failure is
    /// reported the same way after being logged.
    pub async fn get_status(&self, user_id: &str) -> AppResult<StatusRecord> {
        if !self.inner.snapshot().enabled {
            return Ok(StatusRecord::offline_default(user_id));
        }
        check_user_id(user_id)?;

        if let Ok(Some(record)) = self.inner.cache.get(user_id).await {
            return Ok(record);
        }

        match self.inner.store.get(user_id).await {
            Ok(record) => {
                self.inner.backfill(&record).await;
                Ok(record)
            }
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => {
                warn!(user_id, error = %e, "Status store read failed");
                Err(AppError::not_found(format!("No status for user {user_id}")))
            }
        }
    }

    /// Current status of a user, or offline/non-manual if unknown.
    pub async fn get_status_or_default(&self, user_id: &str) -> StatusRecord {
        self.get_status(user_id)
            .await
            .unwrap_or_else(|_| StatusRecord::offline_default(user_id))
    }

    /// Statuses of several users, in request order. Unknown users are
    /// absent from the result.
    pub async fn get_statuses_by_ids(&self, user_ids: &[String]) -> AppResult<Vec<StatusRecord>> {
        if !self.inner.snapshot().enabled {
            return Ok(Vec::new());
        }

        let mut found: HashMap<String, StatusRecord> = HashMap::with_capacity(user_ids.len());
        let mut misses = Vec::new();
        for user_id in user_ids {
            if found.contains_key(user_id) {
                continue;
            }
            match self.inner.cache.get(user_id).await {
                Ok(Some(record)) => {
                    found.insert(user_id.clone(), record);
                }
                _ => misses.push(user_id.clone()),
            }
        }

        if !misses.is_empty() {
            match self.inner.store.get_by_ids(&misses).await {
                Ok(records) => {
                    for record in records {
                        self.inner.backfill(&record).await;
                        found.insert(record.user_id.clone(), record);
                    }
                }
                Err(e) => {
                    warn!(missing = misses.len(), error = %e, "Bulk status read failed; returning cached statuses only");
                }
            }
        }

        Ok(user_ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Mark a user online. A non-manual call never overrides a manual
    /// status; the result is always non-manual.
    pub async fn set_status_online(&self, user_id: &str, manual: bool) -> AppResult<StatusRecord> {
        self.run(user_id, "online", move |current, now, _| {
            Ok(transition::online(current, manual, now))
        })
        .await
    }

    /// Record client activity for a user.
    ///
    /// Refreshes the activity timestamp and brings a non-manual user back
    /// online. Activity-only writes are coalesced and their failures are
    /// logged, not returned.
    pub async fn record_activity(&self, user_id: &str) -> AppResult<StatusRecord> {
        self.run(user_id, "activity", |current, now, _| {
            Ok(transition::heartbeat(current, now))
        })
        .await
    }

    /// Record the channel a user is viewing, or `None` once they left every
    /// channel. Opening a channel counts as activity and brings a
    /// non-manual user online.
    pub async fn set_active_channel(
        &self,
        user_id: &str,
        channel: Option<String>,
    ) -> AppResult<StatusRecord> {
        self.run(user_id, "active_channel", move |current, now, _| {
            Ok(transition::active_channel(current, channel, now))
        })
        .await
    }

    /// Mark a user offline.
    pub async fn set_status_offline(&self, user_id: &str, manual: bool) -> AppResult<StatusRecord> {
        self.run(user_id, "offline", move |current, now, _| {
            Ok(transition::offline(current, manual, now))
        })
        .await
    }

    /// Mark a user away if they have been idle longer than the away
    /// timeout, or unconditionally when `manual`.
    pub async fn set_status_away_if_needed(
        &self,
        user_id: &str,
        manual: bool,
    ) -> AppResult<StatusRecord> {
        self.run(user_id, "away", move |current, now, config| {
            Ok(transition::away_if_needed(
                current,
                manual,
                now,
                config.away_timeout_ms(),
            ))
        })
        .await
    }

    /// Set do-not-disturb until `end_time` (epoch milliseconds), after which
    /// the expiry sweep restores the current status.
    pub async fn set_status_dnd_timed(&self, user_id: &str, end_time: i64) -> AppResult<StatusRecord> {
        self.run(user_id, "dnd_timed", move |current, now, _| {
            transition::dnd_timed(current, end_time, now)
        })
        .await
    }

    /// Set do-not-disturb with no deadline.
    pub async fn set_status_dnd(&self, user_id: &str) -> AppResult<StatusRecord> {
        self.run(user_id, "dnd", |current, _, _| Ok(transition::dnd(current)))
            .await
    }

    /// Set out-of-office.
    pub async fn set_status_out_of_office(&self, user_id: &str) -> AppResult<StatusRecord> {
        self.run(user_id, "out_of_office", |current, _, _| {
            Ok(transition::out_of_office(current))
        })
        .await
    }

    /// Force a user offline and non-manual, clearing any DND. Used for
    /// logout-all and administrative resets.
    pub async fn reset_status(&self, user_id: &str) -> AppResult<StatusRecord> {
        self.run(user_id, "reset", |current, _, _| Ok(transition::reset(current)))
            .await
    }

    /// Set the last activity time of a known user in this node's cache,
    /// without persisting or notifying peers, then mark them away if the
    /// new time makes them idle.
    ///
    /// Used when an online device disconnects while an idle one stays.
    pub async fn set_status_last_activity_at(&self, user_id: &str, at: i64) -> AppResult<()> {
        if !self.inner.snapshot().enabled {
            return Ok(());
        }
        check_user_id(user_id)?;

        {
            let _slot = self.inner.lock_user(user_id).await;
            let mut record = match self.inner.load(user_id).await {
                Ok(current) if current.persisted => current.record,
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(user_id, error = %e, "Cannot set last activity; status unavailable");
                    return Ok(());
                }
            };
            record.last_activity_at = at;
            if let Err(e) = self.inner.cache.put(&record).await {
                warn!(user_id, error = %e, "Failed to cache last activity");
            }
        }

        self.set_status_away_if_needed(user_id, false).await?;
        Ok(())
    }

    // ── Housekeeping ─────────────────────────────────────────────────

    /// Delete a user's status from the store and every cache.
    pub async fn remove_user(&self, user_id: &str) -> AppResult<()> {
        if !self.inner.snapshot().enabled {
            return Ok(());
        }
        check_user_id(user_id)?;

        let engine = Arc::clone(&self.inner);
        let user_id = user_id.to_string();
        tokio::spawn(async move { engine.remove(&user_id).await })
            .await
            .map_err(join_error)?
    }

    /// Purge the status cache on this node and on every peer.
    pub async fn clear_caches(&self) -> AppResult<()> {
        if !self.inner.snapshot().enabled {
            return Ok(());
        }
        self.inner.cache.purge().await?;
        let topic = self.inner.cache.topic();
        if topic.needs_peer_sync() {
            self.inner
                .bus
                .publish(ClusterEvent::InvalidateCache { topic, key: None })
                .await;
        }
        info!(cache = self.inner.cache.name(), "Status caches cleared");
        Ok(())
    }

    /// Restore every timed DND whose deadline has passed and propagate the
    /// restored records to the cache, peers and clients.
    pub async fn expire_dnd_statuses(&self) -> AppResult<Vec<StatusRecord>> {
        if !self.inner.snapshot().enabled {
            return Ok(Vec::new());
        }
        let engine = Arc::clone(&self.inner);
        tokio::spawn(async move { engine.expire_dnd().await })
            .await
            .map_err(join_error)?
    }

    /// Run one transition for `user_id` in its own task.
    async fn run<F>(&self, user_id: &str, op: &'static str, decide: F) -> AppResult<StatusRecord>
    where
        F: FnOnce(&Current, i64, &StatusConfig) -> AppResult<Decision> + Send + 'static,
    {
        let config = self.inner.snapshot();
        if !config.enabled {
            return Ok(StatusRecord::offline_default(user_id));
        }
        check_user_id(user_id)?;

        let engine = Arc::clone(&self.inner);
        let user_id = user_id.to_string();
        tokio::spawn(async move { engine.transition(&user_id, op, &config, decide).await })
            .await
            .map_err(join_error)?
    }
}

impl Engine {
    fn snapshot(&self) -> StatusConfig {
        self.config.borrow().clone()
    }

    fn now(&self) -> i64 {
        self.clock.utc().timestamp_millis()
    }

    async fn lock_user(&self, user_id: &str) -> SlotGuard<'_> {
        // The shard guard is released at the end of this statement.
        let slot = Arc::clone(self.slots.entry(user_id.to_string()).or_default().value());
        SlotGuard {
            engine: self,
            user_id: user_id.to_string(),
            slot: slot.lock_owned().await,
        }
    }

    /// Forget every slot nobody holds whose coalescing window has closed.
    fn prune_slots(&self, now: i64) {
        let interval_ms = self.config.borrow().min_update_interval();
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            Arc::strong_count(slot) > 1
                || slot
                    .try_lock()
                    .is_ok_and(|slot| slot.coalesces(now, interval_ms))
        });
        let pruned = before.saturating_sub(self.slots.len());
        if pruned > 0 {
            debug!(pruned, "Released idle user slots");
        }
    }

    /// Read-through load. A cache failure falls back to the store; a store
    /// failure fails the operation.
    async fn load(&self, user_id: &str) -> AppResult<Current> {
        if let Ok(Some(record)) = self.cache.get(user_id).await {
            return Ok(Current {
                record,
                persisted: true,
            });
        }
        match self.store.get(user_id).await {
            Ok(record) => Ok(Current {
                record,
                persisted: true,
            }),
            Err(e) if e.is_not_found() => Ok(Current::missing(user_id)),
            Err(e) => {
                error!(user_id, error = %e, "Failed to load status");
                Err(e)
            }
        }
    }

    async fn transition<F>(
        &self,
        user_id: &str,
        op: &'static str,
        config: &StatusConfig,
        decide: F,
    ) -> AppResult<StatusRecord>
    where
        F: FnOnce(&Current, i64, &StatusConfig) -> AppResult<Decision>,
    {
        let mut slot = self.lock_user(user_id).await;
        let current = self.load(user_id).await?;
        let now = self.now();

        match decide(&current, now, config)? {
            Decision::Keep => {
                debug!(user_id, op, status = %current.record.status, "Status kept");
                Ok(current.record)
            }
            Decision::Apply(next) => self.commit(&mut slot, &current, next, now, config, op).await,
        }
    }

    async fn commit(
        &self,
        slot: &mut UserSlot,
        current: &Current,
        next: StatusRecord,
        now: i64,
        config: &StatusConfig,
        op: &'static str,
    ) -> AppResult<StatusRecord> {
        if current.persisted && next == current.record {
            return Ok(next);
        }

        if transition::needs_full_save(current, &next) {
            next.validate()?;
            if let Err(e) = self.store.save_or_update(&next).await {
                error!(user_id = %next.user_id, op, error = %e, "Failed to save status");
                return Err(e);
            }
            slot.last_persisted_at = Some(now);
        } else if slot.coalesces(now, config.min_update_interval()) {
            debug!(user_id = %next.user_id, op, "Activity write coalesced");
        } else {
            match self
                .store
                .update_last_activity_at(&next.user_id, next.last_activity_at)
                .await
            {
                Ok(()) => slot.last_persisted_at = Some(now),
                Err(e) => {
                    warn!(user_id = %next.user_id, op, error = %e, "Failed to persist last activity");
                }
            }
        }

        self.cache_and_sync(&next).await;
        if current.record.is_visible_change(&next) {
            self.broadcast(&next).await;
        }

        debug!(
            user_id = %next.user_id,
            op,
            from = %current.record.status,
            to = %next.status,
            manual = next.manual,
            "Status applied"
        );
        Ok(next)
    }

    /// Write `record` to the cache and, for node-local caches, to peers.
    async fn cache_and_sync(&self, record: &StatusRecord) {
        if let Err(e) = self.cache.put(record).await {
            warn!(user_id = %record.user_id, error = %e, "Failed to cache status; evicting");
            if let Err(e) = self.cache.remove(&record.user_id).await {
                warn!(user_id = %record.user_id, error = %e, "Failed to evict status");
            }
        }
        if self.cache.topic().needs_peer_sync() {
            self.bus
                .publish(ClusterEvent::UpdateStatus(record.clone()))
                .await;
        }
    }

    /// Tell local clients and peers about a visible change.
    async fn broadcast(&self, record: &StatusRecord) {
        let event = PresenceEvent::from(record);
        self.presence.publish(event.clone());
        self.bus.publish(ClusterEvent::PresenceChanged(event)).await;
    }

    /// Cache a record read from the store unless a transition cached a
    /// newer one in the meantime.
    async fn backfill(&self, record: &StatusRecord) {
        let _slot = self.lock_user(&record.user_id).await;
        if let Ok(Some(_)) = self.cache.get(&record.user_id).await {
            return;
        }
        if let Err(e) = self.cache.put(record).await {
            warn!(user_id = %record.user_id, error = %e, "Failed to backfill status cache");
        }
    }

    /// Store a record published by another node. Never re-published.
    pub(super) async fn apply_remote_status(&self, record: StatusRecord) -> AppResult<()> {
        self.cache.put(&record).await
    }

    async fn remove(&self, user_id: &str) -> AppResult<()> {
        let _slot = self.lock_user(user_id).await;
        if let Err(e) = self.store.delete(user_id).await {
            error!(user_id, error = %e, "Failed to delete status");
            return Err(e);
        }
        if let Err(e) = self.cache.remove(user_id).await {
            warn!(user_id, error = %e, "Failed to evict deleted status");
        }
        let topic = self.cache.topic();
        if topic.needs_peer_sync() {
            self.bus
                .publish(ClusterEvent::InvalidateCache {
                    topic,
                    key: Some(user_id.to_string()),
                })
                .await;
        }
        self.slots.remove(user_id);
        info!(user_id, "Status removed");
        Ok(())
    }

    async fn expire_dnd(&self) -> AppResult<Vec<StatusRecord>> {
        let now = self.now();
        let restored = self
            .store
            .update_expired_dnd_statuses(now)
            .await
            .map_err(|e| {
                error!(error = %e, "DND expiry sweep failed");
                e
            })?;

        for record in &restored {
            let mut slot = self.lock_user(&record.user_id).await;
            slot.last_persisted_at = Some(now);
            // A newer transition may have replaced the expired DND after the
            // sweep; the cache already holds it.
            match self.cache.get(&record.user_id).await {
                Ok(Some(cached)) if !cached.is_dnd_expired(now) => {
                    debug!(user_id = %record.user_id, "Swept DND superseded by newer status");
                    continue;
                }
                _ => {}
            }
            self.cache_and_sync(record).await;
            self.broadcast(record).await;
        }

        if !restored.is_empty() {
            info!(count = restored.len(), "Expired DND statuses restored");
        }
        self.prune_slots(now);
        Ok(restored)
    }
}

fn check_user_id(user_id: &str) -> AppResult<()> {
    StatusRecord::offline_default(user_id).validate()
}

fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError::internal(format!("Status task failed: {e}"))
}
