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

//! Per-key asynchronous locking for single-flight computation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async locks.
///
/// Holding a [`KeyGuard`] for a key makes every other `acquire` of that key
/// wait until the guard is dropped. Lock slots are created on demand and
/// removed once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for exclusive ownership of `key`.
    ///
    /// Cancelling the returned future while it waits still releases the slot.
    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let slot = Arc::clone(
            self.slots()
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        );
        // Built before waiting so that its drop cleans up a cancelled wait too.
        let mut waiter = KeyGuard {
            owner: self,
            key: key.to_owned(),
            slot: Some(Arc::clone(&slot)),
            guard: None,
        };
        waiter.guard = Some(slot.lock_owned().await);
        waiter
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.slots().len()
    }
}

/// Exclusive ownership of one key; released on drop, including on error paths.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    slot: Option<Arc<AsyncMutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // The owned guard keeps its own clone of the slot; release it first.
        self.guard.take();
        let mut slots = self.owner.slots();
        self.slot.take();
        // Only the table still references the slot: nobody holds or waits.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}
