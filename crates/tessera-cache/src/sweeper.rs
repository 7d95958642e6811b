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

//! Background purging of TTL-expired entries.

use crate::transform_cache::TransformCache;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Anything that can proactively drop expired entries.
pub trait Sweep: Send + Sync {
    /// Purges expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

impl<V: Clone + Send> Sweep for TransformCache<V> {
    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

/// A background thread that sweeps a cache at a fixed interval.
///
/// The sweeper stops when [`CacheSweeper::stop`] is called or when it is
/// dropped; stopping wakes the thread immediately instead of waiting out the
/// current interval.
pub struct CacheSweeper {
    interval: Duration,
    target: Arc<dyn Sweep>,
    running: Arc<AtomicBool>,
    swept: Arc<AtomicU64>,
    shutdown: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CacheSweeper {
    /// Creates a stopped sweeper for `target`.
    pub fn new(target: Arc<dyn Sweep>, interval: Duration) -> Self {
        Self {
            interval,
            target,
            running: Arc::new(AtomicBool::new(false)),
            swept: Arc::new(AtomicU64::new(0)),
            shutdown: None,
            handle: None,
        }
    }

    /// Starts the sweep thread. Does nothing if already running.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        let running = Arc::clone(&self.running);
        let swept = Arc::clone(&self.swept);
        let target = Arc::clone(&self.target);
        let interval = self.interval;

        running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("tessera-cache-sweeper".into())
            .spawn(move || {
                log::debug!("Cache sweeper started ({interval:?} interval).");
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let purged = target.sweep();
                            if purged > 0 {
                                log::debug!("Cache sweeper purged {purged} expired entries.");
                            }
                            swept.fetch_add(purged as u64, Ordering::Relaxed);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                running.store(false, Ordering::SeqCst);
                log::debug!("Cache sweeper stopped.");
            });

        match spawned {
            Ok(handle) => {
                self.shutdown = Some(tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Stops the sweep thread and waits for it to exit.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Cache sweeper thread panicked.");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the sweep thread is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total entries purged by this sweeper so far.
    pub fn total_swept(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform_cache::TransformCacheConfig;
    use std::time::Instant;
    use tessera_core::time::ManualClock;

    #[test]
    fn test_sweeper_purges_in_background() {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(TransformCache::with_clock(
            TransformCacheConfig::default(),
            clock.clone(),
        ));
        cache.put_with_ttl("stale", 1, Duration::from_millis(5));
        cache.put_with_ttl("fresh", 2, Duration::from_secs(60));
        clock.advance_ms(10);

        let mut sweeper = CacheSweeper::new(cache.clone(), Duration::from_millis(5));
        sweeper.start().expect("sweeper should spawn");
        assert!(sweeper.is_running());

        let deadline = Instant::now() + Duration::from_secs(2);
        while cache.len() > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        sweeper.stop();

        assert_eq!(cache.len(), 1);
        assert!(cache.contains("fresh"));
        assert_eq!(sweeper.total_swept(), 1);
        assert!(!sweeper.is_running());
    }

    #[test]
    fn test_stop_is_prompt_with_long_interval() {
        let cache = Arc::new(TransformCache::<u8>::new(TransformCacheConfig::default()));
        let mut sweeper = CacheSweeper::new(cache, Duration::from_secs(3600));
        sweeper.start().expect("sweeper should spawn");

        let started = Instant::now();
        drop(sweeper);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
