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

//! A bounded LRU + TTL memoization cache keyed by canonical strings.

use crate::error::CacheError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Write as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tessera_core::stats::ratio;
use tessera_core::time::{system_clock, Clock};

/// Configuration for a [`TransformCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformCacheConfig {
    /// Maximum number of live entries.
    pub max_entries: usize,
    /// Time-to-live applied by [`TransformCache::put`].
    pub default_ttl_ms: u64,
    /// Interval between background sweeps.
    pub sweep_interval_ms: u64,
    /// Hit rate the cache is expected to sustain.
    pub target_hit_rate: f64,
}

impl Default for TransformCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_ms: 300_000,
            sweep_interval_ms: 60_000,
            target_hit_rate: 0.8,
        }
    }
}

impl TransformCacheConfig {
    /// The default TTL as a [`Duration`].
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// The sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// A read-only snapshot of cache counters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformCacheMetrics {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Entries removed to make room.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Current number of entries.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// `hits / (hits + misses)`, `0` before any lookup.
    pub hit_rate: f64,
    /// Time since the cache was created.
    pub uptime: Duration,
    /// The configured target.
    pub target_hit_rate: f64,
}

impl TransformCacheMetrics {
    /// Whether the observed hit rate reaches the configured target.
    pub fn meets_target(&self) -> bool {
        self.hit_rate >= self.target_hit_rate
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created: Instant,
    ttl: Duration,
    last_access: Instant,
    access_count: u64,
    tick: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= self.ttl
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Recency order: smallest tick is least recently used.
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn bump_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

/// A generic memoization cache with bounded size and per-entry freshness.
///
/// All mutation (insert, evict, promote) happens under a single lock per
/// instance. Lookups of expired entries purge them on the spot.
#[derive(Debug)]
pub struct TransformCache<V> {
    config: TransformCacheConfig,
    clock: Arc<dyn Clock>,
    created: Instant,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> TransformCache<V> {
    /// Creates a cache driven by the system clock.
    pub fn new(config: TransformCacheConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a cache driven by the given clock.
    pub fn with_clock(config: TransformCacheConfig, clock: Arc<dyn Clock>) -> Self {
        let created = clock.now();
        Self {
            config,
            clock,
            created,
            state: Mutex::new(CacheState::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cache configuration.
    pub fn config(&self) -> &TransformCacheConfig {
        &self.config
    }

    /// Builds the canonical key for an operation.
    ///
    /// Parameters are sorted by name so insertion order never changes the key.
    pub fn generate_key(op_type: &str, input: &dyn Display, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));

        let mut key = format!("{op_type}:{input}");
        for (name, value) in sorted {
            // Writing into a String cannot fail.
            let _ = write!(key, "|{name}={value}");
        }
        key
    }

    /// Looks up a live entry, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut state = self.state();

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.remove_entry(key);
            state.expirations += 1;
            state.misses += 1;
            log::trace!("TransformCache: '{key}' expired on access");
            return None;
        }

        let tick = state.bump_tick();
        let state = &mut *state;
        let entry = state.entries.get_mut(key)?;
        state.recency.remove(&entry.tick);
        entry.tick = tick;
        entry.last_access = now;
        entry.access_count += 1;
        state.recency.insert(tick, key.to_owned());
        state.hits += 1;
        Some(entry.value.clone())
    }

    /// Inserts a value with the default TTL.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.put_with_ttl(key, value, self.config.default_ttl());
    }

    /// Inserts a value with an explicit TTL.
    ///
    /// When the cache is full, least recently used entries are evicted one at
    /// a time until there is room.
    pub fn put_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now();
        let mut state = self.state();
        self.insert_locked(&mut state, key, value, ttl, now);
    }

    fn insert_locked(
        &self,
        state: &mut CacheState<V>,
        key: String,
        value: V,
        ttl: Duration,
        now: Instant,
    ) {
        if self.config.max_entries == 0 {
            return;
        }
        state.remove_entry(&key);
        while state.entries.len() >= self.config.max_entries {
            match state.evict_lru() {
                Some(evicted) => log::trace!("TransformCache: evicted '{evicted}'"),
                None => break,
            }
        }
        let tick = state.bump_tick();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                value,
                created: now,
                ttl,
                last_access: now,
                access_count: 0,
                tick,
            },
        );
    }

    /// Returns the cached value, computing and storing it on a miss.
    ///
    /// Callers racing before storage may each compute, but only the first
    /// stored value survives and every caller receives it.
    pub fn get_or_compute<E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let computed = compute()?;

        let now = self.clock.now();
        let mut state = self.state();
        if let Some(existing) = state.entries.get(key).filter(|e| !e.is_expired(now)) {
            return Ok(existing.value.clone());
        }
        let ttl = self.config.default_ttl();
        self.insert_locked(&mut state, key.to_owned(), computed.clone(), ttl, now);
        Ok(computed)
    }

    /// Removes every key matching the regular expression `pattern`.
    ///
    /// Returns the number of removed entries.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let regex = Regex::new(pattern)?;
        Ok(self.invalidate_matching(&regex))
    }

    /// Removes every key matched by a precompiled expression.
    pub fn invalidate_matching(&self, regex: &Regex) -> usize {
        let mut state = self.state();
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect();
        for key in &doomed {
            state.remove_entry(key);
        }
        if !doomed.is_empty() {
            log::debug!(
                "TransformCache: invalidated {} entries matching '{}'",
                doomed.len(),
                regex.as_str()
            );
        }
        doomed.len()
    }

    /// Removes one entry, returning its value if it was present.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.state().remove_entry(key).map(|entry| entry.value)
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.recency.clear();
    }

    /// Whether a live entry exists, without touching recency or counters.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.state()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of stored entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purges all TTL-expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove_entry(key);
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    /// Takes a snapshot of the cache counters.
    pub fn metrics(&self) -> TransformCacheMetrics {
        let state = self.state();
        TransformCacheMetrics {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            size: state.entries.len(),
            max_size: self.config.max_entries,
            hit_rate: ratio(state.hits, state.hits + state.misses),
            uptime: self.clock.now().saturating_duration_since(self.created),
            target_hit_rate: self.config.target_hit_rate,
        }
    }
}
