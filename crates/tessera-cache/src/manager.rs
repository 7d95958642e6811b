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

//! The entry point application code uses to run memoized coordinate transforms.

use crate::error::CacheError;
use crate::ops::{TransformInput, TransformOp, TransformOutput};
use crate::recorder::{LatencyPercentiles, LatencyRecorder};
use crate::single_flight::KeyedLocks;
use crate::sweeper::CacheSweeper;
use crate::transform_cache::{TransformCache, TransformCacheConfig, TransformCacheMetrics};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tessera_core::coords::{CoordinateSystem, CoordinateSystemConfig};
use tessera_core::stats::ratio;
use tessera_core::time::{system_clock, Clock, Stopwatch};
use tokio::task::JoinSet;

/// Configuration for a [`TransformationManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationManagerConfig {
    /// Number of inputs issued concurrently by `batch_transform`.
    pub batch_chunk_size: usize,
    /// Whether every transform is appended to the latency recorder.
    pub record_latencies: bool,
    /// Capacity of the latency recorder.
    pub max_records: usize,
}

impl Default for TransformationManagerConfig {
    fn default() -> Self {
        Self {
            batch_chunk_size: 100,
            record_latencies: true,
            max_records: 1000,
        }
    }
}

/// The outcome of a single transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult<O> {
    /// The transformed value.
    pub value: O,
    /// Whether the value was served from the cache.
    pub cache_hit: bool,
    /// Time spent in the call, including waiting for an in-flight duplicate.
    pub latency: Duration,
}

/// The aggregated outcome of a batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTransformResult<O> {
    /// One value per input, in the same order.
    pub results: Vec<O>,
    /// Inputs served from the cache.
    pub hits: u64,
    /// Inputs that had to be computed.
    pub misses: u64,
    /// Wall time of the whole batch.
    pub total_latency: Duration,
}

impl<O> BatchTransformResult<O> {
    /// `hits / (hits + misses)`; `0` for an empty batch.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Number of transformed inputs.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug)]
struct Shared<O> {
    config: TransformationManagerConfig,
    clock: Arc<dyn Clock>,
    cache: Arc<TransformCache<O>>,
    locks: KeyedLocks,
    system: RwLock<Arc<CoordinateSystem>>,
    recorder: Mutex<LatencyRecorder>,
}

/// Memoized, single-flight coordinate transformation.
///
/// Cloning is cheap and yields a handle onto the same cache and coordinate
/// system. The coordinate system is held as an immutable snapshot that is
/// replaced wholesale on every change; each replacement invalidates the whole
/// cache.
#[derive(Debug)]
pub struct TransformationManager<O = TransformOutput> {
    shared: Arc<Shared<O>>,
}

impl<O> Clone for TransformationManager<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<O> TransformationManager<O>
where
    O: Clone + Send + Sync + 'static,
{
    /// Creates a manager over `system`, driven by the system clock.
    pub fn new(
        system: CoordinateSystem,
        cache_config: TransformCacheConfig,
        config: TransformationManagerConfig,
    ) -> Self {
        Self::with_clock(system, cache_config, config, system_clock())
    }

    /// Creates a manager driven by the given clock.
    pub fn with_clock(
        system: CoordinateSystem,
        cache_config: TransformCacheConfig,
        config: TransformationManagerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(TransformCache::with_clock(cache_config, Arc::clone(&clock)));
        let recorder = LatencyRecorder::new(config.max_records);
        Self {
            shared: Arc::new(Shared {
                config,
                clock,
                cache,
                locks: KeyedLocks::new(),
                system: RwLock::new(Arc::new(system)),
                recorder: Mutex::new(recorder),
            }),
        }
    }

    fn recorder(&self) -> MutexGuard<'_, LatencyRecorder> {
        self.shared
            .recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The current coordinate system snapshot.
    pub fn coordinate_system(&self) -> Arc<CoordinateSystem> {
        let guard = self.shared.system.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<TransformCache<O>> {
        &self.shared.cache
    }

    /// Snapshot of the cache counters.
    pub fn cache_metrics(&self) -> TransformCacheMetrics {
        self.shared.cache.metrics()
    }

    /// Latency percentiles recorded for `op_type`.
    pub fn latency_percentiles(&self, op_type: &str) -> Option<LatencyPercentiles> {
        self.recorder().percentiles(op_type)
    }

    /// Number of keys with a transform in flight or awaited.
    pub fn in_flight(&self) -> usize {
        self.shared.locks.active_keys()
    }

    /// Starts a background thread purging expired cache entries.
    pub fn spawn_sweeper(&self) -> std::io::Result<CacheSweeper> {
        let interval = self.shared.cache.config().sweep_interval();
        let mut sweeper = CacheSweeper::new(self.shared.cache.clone(), interval);
        sweeper.start()?;
        Ok(sweeper)
    }

    /// Transforms `input`, serving from the cache when possible.
    ///
    /// A concurrent call for the same key waits until this one completes and
    /// then reads the stored value, so `transform_fn` runs at most once per
    /// key at a time. Errors from `transform_fn` are returned unchanged inside
    /// [`CacheError::Compute`] and nothing is stored.
    pub async fn transform<I, F>(
        &self,
        input: &I,
        op_type: &str,
        transform_fn: F,
    ) -> Result<TransformResult<O>, CacheError>
    where
        I: Display + ?Sized,
        F: FnOnce(&CoordinateSystem, &I) -> anyhow::Result<O>,
    {
        let stopwatch = Stopwatch::with_clock(Arc::clone(&self.shared.clock));
        let key = TransformCache::<O>::generate_key(op_type, &input, &[]);
        let _guard = self.shared.locks.acquire(&key).await;

        if let Some(value) = self.shared.cache.get(&key) {
            let latency = stopwatch.elapsed();
            self.record(op_type, latency, true);
            return Ok(TransformResult {
                value,
                cache_hit: true,
                latency,
            });
        }

        let system = self.coordinate_system();
        let value = transform_fn(&system, input).map_err(CacheError::Compute)?;
        {
            // Holding the read lock keeps a config swap from slipping in
            // between the generation check and the insert.
            let current = self.shared.system.read().unwrap_or_else(PoisonError::into_inner);
            if current.generation() == system.generation() {
                self.shared.cache.put(key, value.clone());
            } else {
                log::debug!("Discarding '{op_type}' result computed against a replaced view.");
            }
        }

        let latency = stopwatch.elapsed();
        self.record(op_type, latency, false);
        Ok(TransformResult {
            value,
            cache_hit: false,
            latency,
        })
    }

    /// Transforms every input, preserving order.
    ///
    /// Inputs are issued concurrently in chunks of `batch_chunk_size`; each
    /// chunk completes before the next one starts. The first failing element
    /// aborts the batch.
    pub async fn batch_transform<I, F>(
        &self,
        inputs: &[I],
        op_type: &str,
        transform_fn: F,
    ) -> Result<BatchTransformResult<O>, CacheError>
    where
        I: Display + Clone + Send + Sync + 'static,
        F: Fn(&CoordinateSystem, &I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        let stopwatch = Stopwatch::with_clock(Arc::clone(&self.shared.clock));
        let transform_fn = Arc::new(transform_fn);
        let chunk_size = self.shared.config.batch_chunk_size.max(1);

        let mut slots: Vec<Option<O>> = vec![None; inputs.len()];
        let mut hits = 0;
        let mut misses = 0;

        for (chunk_index, chunk) in inputs.chunks(chunk_size).enumerate() {
            let mut set = JoinSet::new();
            for (offset, input) in chunk.iter().enumerate() {
                let index = chunk_index * chunk_size + offset;
                let manager = self.clone();
                let transform_fn = Arc::clone(&transform_fn);
                let op_type = op_type.to_owned();
                let input = input.clone();
                set.spawn(async move {
                    let result = manager
                        .transform(&input, &op_type, |system, i| transform_fn(system, i))
                        .await;
                    (index, result)
                });
            }

            while let Some(joined) = set.join_next().await {
                let (index, result) = joined?;
                let result = result?;
                if result.cache_hit {
                    hits += 1;
                } else {
                    misses += 1;
                }
                slots[index] = Some(result.value);
            }
        }

        let results = slots
            .into_iter()
            .collect::<Option<Vec<O>>>()
            .ok_or_else(|| CacheError::Task("batch element produced no result".into()))?;

        Ok(BatchTransformResult {
            results,
            hits,
            misses,
            total_latency: stopwatch.elapsed(),
        })
    }

    /// Replaces the coordinate configuration and invalidates every cached
    /// transform.
    pub fn update_coordinate_system(
        &self,
        config: CoordinateSystemConfig,
    ) -> Result<(), CacheError> {
        self.replace_system(|system| system.set_config(config))??;
        Ok(())
    }

    /// Applies a view mutation (zoom, pan, fit) to a copy of the current
    /// system, installs the copy and invalidates every cached transform.
    pub fn update_view<R>(
        &self,
        mutate: impl FnOnce(&mut CoordinateSystem) -> R,
    ) -> Result<R, CacheError> {
        self.replace_system(mutate)
    }

    fn replace_system<R>(
        &self,
        mutate: impl FnOnce(&mut CoordinateSystem) -> R,
    ) -> Result<R, CacheError> {
        let mut guard = self.shared.system.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = CoordinateSystem::clone(&guard);
        let outcome = mutate(&mut next);
        if next.generation() != guard.generation() {
            *guard = Arc::new(next);
            let removed = self.shared.cache.invalidate_pattern(".*")?;
            log::debug!(
                "Coordinate system replaced (generation {}), {removed} transforms invalidated.",
                guard.generation()
            );
        }
        Ok(outcome)
    }

    fn record(&self, op_type: &str, latency: Duration, cache_hit: bool) {
        if self.shared.config.record_latencies {
            self.recorder().record(op_type, latency, cache_hit);
        }
    }
}

impl TransformationManager<TransformOutput> {
    /// Runs a typed conversion through the cache.
    pub async fn convert(
        &self,
        op: TransformOp,
        input: TransformInput,
    ) -> Result<TransformResult<TransformOutput>, CacheError> {
        self.transform(&input, op.name(), |system, input| op.apply(system, input))
            .await
    }

    /// Runs a typed conversion over many inputs.
    pub async fn convert_batch(
        &self,
        op: TransformOp,
        inputs: &[TransformInput],
    ) -> Result<BatchTransformResult<TransformOutput>, CacheError> {
        self.batch_transform(inputs, op.name(), move |system, input| op.apply(system, input))
            .await
    }
}
