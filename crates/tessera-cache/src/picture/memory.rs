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

use super::artifact::{CachePriority, Picture};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct Slot {
    picture: Picture,
    priority: CachePriority,
    tick: u64,
}

/// The bounded in-memory tier.
///
/// Entries are ordered by `(priority, last use)`; the first entry in that
/// order is the next eviction victim.
#[derive(Debug)]
pub(crate) struct MemoryTier {
    max_bytes: u64,
    max_entries: usize,
    slots: HashMap<String, Slot>,
    order: BTreeMap<(CachePriority, u64), String>,
    bytes: u64,
    next_tick: u64,
}

impl MemoryTier {
    pub(crate) fn new(max_bytes: u64, max_entries: usize) -> Self {
        Self {
            max_bytes,
            max_entries,
            slots: HashMap::new(),
            order: BTreeMap::new(),
            bytes: 0,
            next_tick: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Returns the picture and marks it most recently used.
    pub(crate) fn get(&mut self, id: &str) -> Option<Picture> {
        let tick = self.tick();
        let slot = self.slots.get_mut(id)?;
        self.order.remove(&(slot.priority, slot.tick));
        slot.tick = tick;
        self.order.insert((slot.priority, tick), id.to_owned());
        Some(slot.picture.clone())
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Inserts a picture, returning whatever had to leave to make room.
    ///
    /// A picture larger than the whole byte budget is refused and handed back
    /// as the error; any older copy under the same id is dropped either way.
    pub(crate) fn insert(
        &mut self,
        id: String,
        picture: Picture,
        priority: CachePriority,
    ) -> Result<Vec<(String, Picture)>, Picture> {
        self.remove(&id);
        let size = picture.size_bytes();
        if size > self.max_bytes || self.max_entries == 0 {
            return Err(picture);
        }

        let mut evicted = Vec::new();
        while self.slots.len() + 1 > self.max_entries || self.bytes + size > self.max_bytes {
            match self.evict_one() {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }

        let tick = self.tick();
        self.order.insert((priority, tick), id.clone());
        self.bytes += size;
        self.slots.insert(
            id,
            Slot {
                picture,
                priority,
                tick,
            },
        );
        Ok(evicted)
    }

    fn evict_one(&mut self) -> Option<(String, Picture)> {
        let (_, id) = self.order.pop_first()?;
        let slot = self.slots.remove(&id)?;
        self.bytes -= slot.picture.size_bytes();
        Some((id, slot.picture))
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Picture> {
        let slot = self.slots.remove(id)?;
        self.order.remove(&(slot.priority, slot.tick));
        self.bytes -= slot.picture.size_bytes();
        Some(slot.picture)
    }

    /// Evicts until both `max_bytes` and `max_entries` are satisfied.
    pub(crate) fn shrink_to(
        &mut self,
        max_bytes: u64,
        max_entries: usize,
    ) -> Vec<(String, Picture)> {
        let mut evicted = Vec::new();
        while self.slots.len() > max_entries || self.bytes > max_bytes {
            match self.evict_one() {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }
        evicted
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
        self.bytes = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub(crate) fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pic(len: usize) -> Picture {
        Picture::new(vec![0u8; len], 1, 1)
    }

    fn put(tier: &mut MemoryTier, id: &str, len: usize, priority: CachePriority) -> Vec<String> {
        tier.insert(id.into(), pic(len), priority)
            .expect("fits the budget")
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    #[test]
    fn test_entry_budget_evicts_lru() {
        let mut tier = MemoryTier::new(1024, 2);
        assert!(put(&mut tier, "a", 1, CachePriority::Normal).is_empty());
        assert!(put(&mut tier, "b", 1, CachePriority::Normal).is_empty());
        let evicted = put(&mut tier, "c", 1, CachePriority::Normal);

        assert_eq!(evicted, vec!["a"]);
        assert!(!tier.contains("a"));
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn test_low_priority_leaves_before_recent_use_matters() {
        let mut tier = MemoryTier::new(1024, 2);
        put(&mut tier, "keep", 1, CachePriority::High);
        put(&mut tier, "sprite", 1, CachePriority::Low);
        tier.get("sprite");

        let evicted = put(&mut tier, "new", 1, CachePriority::Normal);
        assert_eq!(evicted, vec!["sprite"]);
    }

    #[test]
    fn test_byte_budget_evicts_until_fit() {
        let mut tier = MemoryTier::new(100, 10);
        put(&mut tier, "a", 40, CachePriority::Normal);
        put(&mut tier, "b", 40, CachePriority::Normal);
        let evicted = put(&mut tier, "c", 70, CachePriority::Normal);

        assert_eq!(evicted, vec!["a", "b"]);
        assert_eq!(tier.bytes(), 70);
    }

    #[test]
    fn test_oversized_picture_is_not_kept() {
        let mut tier = MemoryTier::new(10, 10);
        put(&mut tier, "big", 4, CachePriority::Normal);
        let rejected = tier.insert("big".into(), pic(11), CachePriority::High);
        assert_eq!(rejected.map_err(|p| p.size_bytes()), Err(11));
        // The older, smaller copy does not survive the refused update.
        assert_eq!(tier.len(), 0);
        assert_eq!(tier.bytes(), 0);
    }

    #[test]
    fn test_shrink_to_quarter() {
        let mut tier = MemoryTier::new(1000, 8);
        for i in 0..8 {
            put(&mut tier, &format!("p{i}"), 100, CachePriority::Normal);
        }
        let evicted = tier.shrink_to(250, 2);
        assert_eq!(evicted.len(), 6);
        assert_eq!(tier.len(), 2);
        assert!(tier.contains("p7"));
    }
}
