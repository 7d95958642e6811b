// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The two-tier picture cache.

use super::artifact::{CachePriority, Picture, PictureError};
use super::disk::DiskTier;
use super::lifecycle::AppLifecycle;
use super::loader::{CancellationToken, PictureLoader};
use super::memory::MemoryTier;
use super::metrics::{MetricsState, PictureCacheMetrics};
use super::warming::{WarmReport, WarmingContext, WarmingPattern};
use crate::error::CacheError;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tessera_core::time::{system_clock, Clock, Stopwatch};
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Configuration for a [`PictureCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PictureCacheConfig {
    /// Byte budget of the memory tier.
    pub max_memory_bytes: u64,
    /// Entry budget of the memory tier.
    pub max_memory_entries: usize,
    /// Byte budget of the disk tier.
    pub max_disk_bytes: u64,
    /// Root of the disk tier; `None` keeps the cache memory-only.
    pub disk_dir: Option<PathBuf>,
    /// Whether memory evictions are written to the disk tier.
    pub spill_to_disk: bool,
    /// Period of the background warmer.
    pub warm_interval_ms: u64,
    /// Maximum loads issued by one warming pass.
    pub max_warm_count: usize,
}

impl Default for PictureCacheConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 50 * 1024 * 1024,
            max_memory_entries: 100,
            max_disk_bytes: 200 * 1024 * 1024,
            disk_dir: None,
            spill_to_disk: true,
            warm_interval_ms: 30_000,
            max_warm_count: 10,
        }
    }
}

impl PictureCacheConfig {
    /// The warming period as a [`Duration`].
    pub fn warm_interval(&self) -> Duration {
        Duration::from_millis(self.warm_interval_ms)
    }
}

/// Number of recent requests remembered for warming.
const RECENT_REQUESTS: usize = 32;
/// Distinct identifiers whose request counts are kept; past this the least
/// requested one is forgotten to make room.
const MAX_TRACKED_IDS: usize = 1024;
/// Under memory pressure the memory tier shrinks to `1 / PRESSURE_DIVISOR`
/// of both budgets.
const PRESSURE_DIVISOR: u64 = 4;

/// The newest disk-bound version of a picture, not yet on disk.
///
/// `None` deletes whatever copy the disk tier holds.
#[derive(Debug, Clone)]
struct PendingWrite {
    seq: u64,
    picture: Option<Picture>,
}

struct Shared {
    config: PictureCacheConfig,
    clock: Arc<dyn Clock>,
    created: Instant,
    memory: Mutex<MemoryTier>,
    disk: Option<AsyncMutex<DiskTier>>,
    loader: RwLock<Option<Arc<dyn PictureLoader>>>,
    metrics: Mutex<MetricsState>,
    usage: Mutex<HashMap<String, u64>>,
    recent: Mutex<VecDeque<String>>,
    pending: Mutex<JoinSet<()>>,
    writes: Mutex<HashMap<String, PendingWrite>>,
    next_write: AtomicU64,
    suspended: AtomicBool,
    disk_bytes: AtomicU64,
    disk_entries: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A memory tier backed by an optional disk tier, populated through a
/// pluggable loader.
///
/// Cloning yields another handle onto the same cache. Memory evictions are
/// spilled to disk on a background task; [`PictureCache::flush`] waits for
/// them.
#[derive(Clone)]
pub struct PictureCache {
    shared: Arc<Shared>,
}

impl fmt::Debug for PictureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PictureCache")
            .field("config", &self.shared.config)
            .field("memory_entries", &lock(&self.shared.memory).len())
            .finish_non_exhaustive()
    }
}

impl PictureCache {
    /// Opens a cache driven by the system clock.
    pub async fn open(config: PictureCacheConfig) -> Result<Self, CacheError> {
        Self::open_with_clock(config, system_clock()).await
    }

    /// Opens a cache, loading the disk manifest if a directory is configured.
    pub async fn open_with_clock(
        config: PictureCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let disk = match &config.disk_dir {
            Some(dir) => Some(DiskTier::open(dir, config.max_disk_bytes).await?),
            None => None,
        };
        let (disk_bytes, disk_entries) = disk
            .as_ref()
            .map_or((0, 0), |tier| (tier.total_bytes(), tier.len()));

        log::info!(
            "Picture cache ready: {} bytes / {} entries in memory, disk tier {}.",
            config.max_memory_bytes,
            config.max_memory_entries,
            if disk.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            shared: Arc::new(Shared {
                memory: Mutex::new(MemoryTier::new(
                    config.max_memory_bytes,
                    config.max_memory_entries,
                )),
                disk: disk.map(AsyncMutex::new),
                created: clock.now(),
                clock,
                config,
                loader: RwLock::new(None),
                metrics: Mutex::new(MetricsState::default()),
                usage: Mutex::new(HashMap::new()),
                recent: Mutex::new(VecDeque::with_capacity(RECENT_REQUESTS)),
                pending: Mutex::new(JoinSet::new()),
                writes: Mutex::new(HashMap::new()),
                next_write: AtomicU64::new(0),
                suspended: AtomicBool::new(false),
                disk_bytes: AtomicU64::new(disk_bytes),
                disk_entries: AtomicUsize::new(disk_entries),
            }),
        })
    }

    /// Installs the loader used by [`Self::get_or_load`] and warming.
    pub fn set_loader(&self, loader: Arc<dyn PictureLoader>) {
        *self
            .shared
            .loader
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(loader);
    }

    /// Builder-style [`Self::set_loader`].
    pub fn with_loader(self, loader: Arc<dyn PictureLoader>) -> Self {
        self.set_loader(loader);
        self
    }

    fn loader(&self) -> Option<Arc<dyn PictureLoader>> {
        self.shared
            .loader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The cache configuration.
    pub fn config(&self) -> &PictureCacheConfig {
        &self.shared.config
    }

    fn stopwatch(&self) -> Stopwatch {
        Stopwatch::with_clock(Arc::clone(&self.shared.clock))
    }

    fn note_request(&self, id: &str) {
        {
            let mut usage = lock(&self.shared.usage);
            if !usage.contains_key(id) && usage.len() >= MAX_TRACKED_IDS {
                let coldest = usage
                    .iter()
                    .min_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(id, _)| id.clone());
                if let Some(coldest) = coldest {
                    usage.remove(&coldest);
                }
            }
            *usage.entry(id.to_owned()).or_insert(0) += 1;
        }
        let mut recent = lock(&self.shared.recent);
        recent.retain(|r| r != id);
        if recent.len() == RECENT_REQUESTS {
            recent.pop_front();
        }
        recent.push_back(id.to_owned());
    }

    fn sync_disk_gauges(&self, tier: &DiskTier) {
        self.shared
            .disk_bytes
            .store(tier.total_bytes(), Ordering::Relaxed);
        self.shared.disk_entries.store(tier.len(), Ordering::Relaxed);
    }

    /// Looks a picture up, memory tier first, then disk.
    ///
    /// A picture evicted but not yet written to disk is served from the write
    /// queue, so a lookup never sees an older disk copy. A disk hit is
    /// promoted into the memory tier. A full miss returns `Ok(None)`;
    /// populating is up to the caller (see [`Self::get_or_load`]).
    pub async fn get(&self, id: &str) -> Result<Option<Picture>, PictureError> {
        let stopwatch = self.stopwatch();
        self.note_request(id);

        let in_memory = lock(&self.shared.memory).get(id);
        if let Some(picture) = in_memory {
            let mut metrics = lock(&self.shared.metrics);
            metrics.memory_hits += 1;
            metrics.memory_latency += stopwatch.elapsed();
            return Ok(Some(picture));
        }

        match self.queued_write(id) {
            Some(Some(picture)) => {
                self.promote(id, &picture);
                let mut metrics = lock(&self.shared.metrics);
                metrics.memory_hits += 1;
                metrics.memory_latency += stopwatch.elapsed();
                return Ok(Some(picture));
            }
            Some(None) => {
                let mut metrics = lock(&self.shared.metrics);
                metrics.misses += 1;
                metrics.miss_latency += stopwatch.elapsed();
                return Ok(None);
            }
            None => {}
        }

        if let Some(disk) = &self.shared.disk {
            let read = {
                let mut tier = disk.lock().await;
                let read = tier.read(id).await;
                self.sync_disk_gauges(&tier);
                read
            };
            match read {
                Ok(Some(picture)) => {
                    {
                        let mut metrics = lock(&self.shared.metrics);
                        metrics.disk_hits += 1;
                        metrics.disk_latency += stopwatch.elapsed();
                    }
                    self.promote(id, &picture);
                    return Ok(Some(picture));
                }
                Ok(None) => {}
                Err(err) => {
                    lock(&self.shared.metrics).errors += 1;
                    return Err(err.into());
                }
            }
        }

        let mut metrics = lock(&self.shared.metrics);
        metrics.misses += 1;
        metrics.miss_latency += stopwatch.elapsed();
        Ok(None)
    }

    /// Inserts a picture into the memory tier.
    ///
    /// Lower-priority, then least recently used, entries are evicted until the
    /// picture fits both budgets; evicted pictures are spilled to disk in the
    /// background when a disk tier is configured. A picture larger than the
    /// whole memory budget is refused, and any older copy of it is dropped
    /// from both tiers.
    pub fn put(&self, id: impl Into<String>, picture: Picture, priority: CachePriority) {
        let id = id.into();
        match self.admit(id.clone(), picture, priority) {
            Ok(()) => lock(&self.shared.metrics).puts += 1,
            Err(picture) => {
                log::warn!(
                    "Picture '{id}' ({} bytes) exceeds the memory budget, not cached.",
                    picture.size_bytes()
                );
                lock(&self.shared.metrics).rejected_puts += 1;
                self.queue_disk_writes(vec![(id, None)]);
            }
        }
    }

    fn admit(&self, id: String, picture: Picture, priority: CachePriority) -> Result<(), Picture> {
        let evicted = lock(&self.shared.memory).insert(id, picture, priority)?;
        if !evicted.is_empty() {
            lock(&self.shared.metrics).evictions += evicted.len() as u64;
            self.spill(evicted);
        }
        Ok(())
    }

    fn promote(&self, id: &str, picture: &Picture) {
        if self
            .admit(id.to_owned(), picture.clone(), CachePriority::Normal)
            .is_err()
        {
            log::debug!("Picture '{id}' is too large to promote into memory.");
        }
    }

    fn spill(&self, pictures: Vec<(String, Picture)>) {
        if !self.shared.config.spill_to_disk {
            return;
        }
        let writes = pictures
            .into_iter()
            .map(|(id, picture)| (id, Some(picture)))
            .collect();
        self.queue_disk_writes(writes);
    }

    /// The queued disk write for `id`: `Some(None)` when the disk copy is
    /// about to be deleted.
    fn queued_write(&self, id: &str) -> Option<Option<Picture>> {
        lock(&self.shared.writes)
            .get(id)
            .map(|write| write.picture.clone())
    }

    /// Records the writes as the newest version of each picture and hands
    /// them to a background task. Without a runtime they wait for
    /// [`Self::flush`].
    fn queue_disk_writes(&self, writes: Vec<(String, Option<Picture>)>) {
        if writes.is_empty() || self.shared.disk.is_none() {
            return;
        }
        let batch: Vec<(String, u64)> = {
            let mut queued = lock(&self.shared.writes);
            writes
                .into_iter()
                .map(|(id, picture)| {
                    let seq = self.shared.next_write.fetch_add(1, Ordering::Relaxed);
                    queued.insert(id.clone(), PendingWrite { seq, picture });
                    (id, seq)
                })
                .collect()
        };

        let Ok(handle) = Handle::try_current() else {
            log::debug!(
                "No async runtime available, {} disk writes wait for the next flush.",
                batch.len()
            );
            return;
        };
        let cache = self.clone();
        let mut pending = lock(&self.shared.pending);
        while let Some(joined) = pending.try_join_next() {
            if let Err(err) = joined {
                log::error!("Picture spill task failed: {err}");
            }
        }
        pending.spawn_on(async move { cache.write_to_disk(batch).await }, &handle);
    }

    /// Applies queued writes that are still the newest for their picture,
    /// then saves the manifest once.
    async fn write_to_disk(&self, batch: Vec<(String, u64)>) {
        let Some(disk) = &self.shared.disk else {
            return;
        };
        let mut tier = disk.lock().await;
        let mut applied = 0;
        for (id, seq) in batch {
            let current = lock(&self.shared.writes)
                .get(&id)
                .filter(|write| write.seq == seq)
                .map(|write| write.picture.clone());
            let Some(picture) = current else {
                log::trace!("Disk write of '{id}' superseded.");
                continue;
            };

            let result = match &picture {
                Some(picture) => tier.write(&id, picture).await.map(|_| ()),
                None => tier.remove(&id).await.map(|_| ()),
            };
            if let Err(err) = result {
                log::warn!("Failed to spill picture '{id}' to disk: {err}");
                lock(&self.shared.metrics).errors += 1;
            }
            applied += 1;

            // Settled while the tier is locked, so readers see either the
            // queued copy or the written one.
            let mut queued = lock(&self.shared.writes);
            if queued.get(&id).is_some_and(|write| write.seq == seq) {
                queued.remove(&id);
            }
        }

        if applied > 0 {
            if let Err(err) = tier.save_manifest().await {
                log::warn!("Failed to save the disk cache manifest: {err}");
                lock(&self.shared.metrics).errors += 1;
            }
        }
        self.sync_disk_gauges(&tier);
    }

    /// Returns the cached picture or populates it through the loader.
    ///
    /// A cancelled load stores nothing and returns [`PictureError::Cancelled`].
    pub async fn get_or_load(
        &self,
        id: &str,
        priority: CachePriority,
        token: &CancellationToken,
    ) -> Result<Option<Picture>, PictureError> {
        if let Some(picture) = self.get(id).await? {
            return Ok(Some(picture));
        }
        self.load_into_cache(id, priority, token).await
    }

    async fn load_into_cache(
        &self,
        id: &str,
        priority: CachePriority,
        token: &CancellationToken,
    ) -> Result<Option<Picture>, PictureError> {
        let loader = self.loader().ok_or(PictureError::NoLoader)?;
        token.check()?;

        match loader.load(id, token).await {
            Ok(Some(picture)) => {
                if token.is_cancelled() {
                    log::debug!("Load of '{id}' finished after cancellation, discarding.");
                    return Err(PictureError::Cancelled);
                }
                self.put(id, picture.clone(), priority);
                Ok(Some(picture))
            }
            Ok(None) => Ok(None),
            Err(PictureError::Cancelled) => {
                log::debug!("Load of '{id}' cancelled.");
                Err(PictureError::Cancelled)
            }
            Err(err) => {
                lock(&self.shared.metrics).errors += 1;
                Err(err)
            }
        }
    }

    /// Whether either tier holds `id`. Does not count as a lookup.
    pub async fn contains(&self, id: &str) -> bool {
        if lock(&self.shared.memory).contains(id) {
            return true;
        }
        if let Some(queued) = self.queued_write(id) {
            return queued.is_some();
        }
        match &self.shared.disk {
            Some(disk) => disk.lock().await.contains(id),
            None => false,
        }
    }

    /// Removes `id` from both tiers. Returns whether anything was removed.
    pub async fn remove(&self, id: &str) -> Result<bool, PictureError> {
        let mut removed = lock(&self.shared.writes)
            .remove(id)
            .is_some_and(|write| write.picture.is_some());
        removed |= lock(&self.shared.memory).remove(id).is_some();
        if let Some(disk) = &self.shared.disk {
            let mut tier = disk.lock().await;
            removed |= tier.remove(id).await?;
            tier.save_manifest().await?;
            self.sync_disk_gauges(&tier);
        }
        Ok(removed)
    }

    /// Empties both tiers and forgets usage history. Pending spills are
    /// aborted.
    pub async fn clear(&self) -> Result<(), PictureError> {
        lock(&self.shared.memory).clear();
        let mut pending = std::mem::take(&mut *lock(&self.shared.pending));
        pending.abort_all();
        while pending.join_next().await.is_some() {}
        lock(&self.shared.writes).clear();

        if let Some(disk) = &self.shared.disk {
            let mut tier = disk.lock().await;
            tier.clear().await?;
            self.sync_disk_gauges(&tier);
        }
        lock(&self.shared.usage).clear();
        lock(&self.shared.recent).clear();
        Ok(())
    }

    /// Waits for pending spills, applies writes queued without a runtime and
    /// persists the disk manifest.
    pub async fn flush(&self) -> Result<(), PictureError> {
        let mut pending = std::mem::take(&mut *lock(&self.shared.pending));
        while let Some(joined) = pending.join_next().await {
            if let Err(err) = joined {
                log::error!("Picture spill task failed: {err}");
            }
        }
        let leftover: Vec<(String, u64)> = lock(&self.shared.writes)
            .iter()
            .map(|(id, write)| (id.clone(), write.seq))
            .collect();
        if !leftover.is_empty() {
            self.write_to_disk(leftover).await;
        }
        if let Some(disk) = &self.shared.disk {
            disk.lock().await.save_manifest().await?;
        }
        Ok(())
    }

    /// Reacts to an application lifecycle signal.
    pub async fn handle_lifecycle(&self, event: AppLifecycle) -> Result<(), PictureError> {
        log::debug!("Picture cache lifecycle: {event:?}");
        self.shared
            .suspended
            .store(event.suspends_background_work(), Ordering::SeqCst);

        match event {
            AppLifecycle::Resumed | AppLifecycle::Inactive | AppLifecycle::Paused => Ok(()),
            AppLifecycle::Detached => self.clear().await,
            AppLifecycle::Hidden => {
                self.shed_memory();
                Ok(())
            }
        }
    }

    /// Shrinks the memory tier to a quarter of both budgets.
    pub fn shed_memory(&self) -> usize {
        let evicted = {
            let mut memory = lock(&self.shared.memory);
            let max_bytes = memory.max_bytes() / PRESSURE_DIVISOR;
            let max_entries = memory.max_entries() / PRESSURE_DIVISOR as usize;
            memory.shrink_to(max_bytes, max_entries)
        };
        let count = evicted.len();
        if count > 0 {
            log::info!("Picture cache shed {count} pictures under memory pressure.");
            lock(&self.shared.metrics).evictions += count as u64;
            self.spill(evicted);
        }
        count
    }

    /// Whether background warming is currently suspended.
    pub fn is_warming_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::SeqCst)
    }

    /// Request counts per identifier, most requested first.
    pub fn usage_stats(&self) -> Vec<(String, u64)> {
        let mut stats: Vec<(String, u64)> = lock(&self.shared.usage)
            .iter()
            .map(|(id, count)| (id.clone(), *count))
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        stats
    }

    /// The inputs handed to warming patterns.
    pub fn warming_context(&self) -> WarmingContext {
        WarmingContext {
            recent: lock(&self.shared.recent).iter().cloned().collect(),
            usage: self.usage_stats(),
            hour: chrono::Local::now().hour(),
        }
    }

    /// Runs one warming pass: loads up to `max_warm_count` uncached
    /// candidates at low priority.
    ///
    /// Failures are logged and counted, never returned.
    pub async fn warm(
        &self,
        pattern: &dyn WarmingPattern,
        token: &CancellationToken,
    ) -> WarmReport {
        let candidates = pattern.candidates(&self.warming_context());
        let mut report = WarmReport {
            candidates: candidates.len(),
            ..WarmReport::default()
        };
        let mut attempts = 0;

        for id in candidates {
            if attempts >= self.shared.config.max_warm_count {
                break;
            }
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if self.contains(&id).await {
                report.skipped += 1;
                continue;
            }
            attempts += 1;
            match self.load_into_cache(&id, CachePriority::Low, token).await {
                Ok(Some(_)) => report.loaded += 1,
                Ok(None) => report.not_found += 1,
                Err(PictureError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(err) => {
                    log::warn!("Warming '{id}' ({}) failed: {err}", pattern.name());
                    report.failed += 1;
                }
            }
        }

        log::debug!("Warming pass ({}): {report:?}", pattern.name());
        report
    }

    /// Spawns a task that runs [`Self::warm`] every `warm_interval_ms`,
    /// skipping passes while warming is suspended.
    pub fn spawn_warmer(
        &self,
        pattern: Arc<dyn WarmingPattern>,
    ) -> Result<WarmerHandle, CacheError> {
        let handle = Handle::try_current().map_err(|err| CacheError::Task(err.to_string()))?;
        let token = CancellationToken::new();
        let cache = self.clone();
        let period = self.shared.config.warm_interval();
        let task_token = token.clone();

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if cache.is_warming_suspended() {
                    log::trace!("Warming suspended, skipping pass.");
                    continue;
                }
                cache.warm(pattern.as_ref(), &task_token).await;
            }
            log::debug!("Picture warmer stopped.");
        });

        Ok(WarmerHandle {
            token,
            task: Some(task),
        })
    }

    /// Takes a snapshot of the cache counters.
    pub fn metrics(&self) -> PictureCacheMetrics {
        let (resident_bytes, memory_entries) = {
            let memory = lock(&self.shared.memory);
            (memory.bytes(), memory.len())
        };
        let state = lock(&self.shared.metrics);
        PictureCacheMetrics {
            hits: state.hits(),
            misses: state.misses,
            puts: state.puts,
            rejected_puts: state.rejected_puts,
            evictions: state.evictions,
            errors: state.errors,
            hit_rate: state.hit_rate(),
            average_lookup: state.average_lookup(),
            resident_bytes,
            memory_entries,
            disk_bytes: self.shared.disk_bytes.load(Ordering::Relaxed),
            disk_entries: self.shared.disk_entries.load(Ordering::Relaxed),
            memory: state.memory_stats(),
            disk: state.disk_stats(),
            uptime: self
                .shared
                .clock
                .now()
                .saturating_duration_since(self.shared.created),
        }
    }
}

/// Owns a background warmer; cancels it when stopped or dropped.
#[derive(Debug)]
pub struct WarmerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WarmerHandle {
    /// Cancels the warmer and waits for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::error!("Picture warmer task failed: {err}");
            }
        }
    }
}

impl Drop for WarmerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_only(max_entries: usize) -> PictureCacheConfig {
        PictureCacheConfig {
            max_memory_entries: max_entries,
            ..PictureCacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_usage_stats_rank_requests() {
        let cache = PictureCache::open(memory_only(4)).await.expect("open");
        for id in ["a", "b", "b", "c", "b", "c"] {
            cache.get(id).await.expect("get");
        }
        assert_eq!(
            cache.usage_stats(),
            vec![("b".to_string(), 3), ("c".to_string(), 2), ("a".to_string(), 1)]
        );
        assert_eq!(cache.warming_context().recent, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_usage_tracking_is_bounded() {
        let cache = PictureCache::open(memory_only(4)).await.expect("open");
        for _ in 0..3 {
            cache.get("hot").await.expect("get");
        }
        for i in 0..MAX_TRACKED_IDS * 2 {
            cache.get(&format!("miss{i}")).await.expect("get");
        }
        let stats = cache.usage_stats();
        assert_eq!(stats.len(), MAX_TRACKED_IDS);
        assert_eq!(stats[0], ("hot".to_string(), 3));
    }

    #[tokio::test]
    async fn test_finished_spills_are_reaped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = PictureCache::open(PictureCacheConfig {
            max_memory_entries: 1,
            disk_dir: Some(dir.path().to_path_buf()),
            ..PictureCacheConfig::default()
        })
        .await
        .expect("open");

        for i in 0..40 {
            cache.put(format!("p{i}"), Picture::new(vec![1u8; 8], 1, 1), CachePriority::Normal);
            // Wait for this put's eviction, if any, to reach the disk tier.
            for _ in 0..1_000 {
                if cache.metrics().disk_entries >= i {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        assert_eq!(cache.metrics().disk_entries, 39);
        assert!(lock(&cache.shared.pending).len() <= 1);
        assert!(lock(&cache.shared.writes).is_empty());
    }

    #[tokio::test]
    async fn test_get_or_load_without_loader() {
        let cache = PictureCache::open(memory_only(4)).await.expect("open");
        let result = cache
            .get_or_load("x", CachePriority::Normal, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PictureError::NoLoader)));
    }

    #[tokio::test]
    async fn test_hidden_sheds_to_a_quarter() {
        let cache = PictureCache::open(memory_only(8)).await.expect("open");
        for i in 0..8 {
            cache.put(format!("p{i}"), Picture::new(vec![0u8; 10], 1, 1), CachePriority::Normal);
        }
        cache
            .handle_lifecycle(AppLifecycle::Hidden)
            .await
            .expect("lifecycle");
        let metrics = cache.metrics();
        assert_eq!(metrics.memory_entries, 2);
        assert_eq!(metrics.evictions, 6);
        assert!(!cache.is_warming_suspended());
    }
}
