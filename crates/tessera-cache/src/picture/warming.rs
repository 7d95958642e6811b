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

//! Predictive prefetching strategies.

use std::collections::BTreeMap;

/// What a warming pattern may base its prediction on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarmingContext {
    /// Recently requested identifiers, oldest first.
    pub recent: Vec<String>,
    /// Request counts per identifier, most requested first.
    pub usage: Vec<(String, u64)>,
    /// Local hour of day, `0..24`.
    pub hour: u32,
}

/// Produces identifiers worth prefetching.
pub trait WarmingPattern: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Candidate identifiers, best first. May include already-cached ones.
    fn candidates(&self, context: &WarmingContext) -> Vec<String>;
}

/// Prefetches the next `lookahead` identifiers of an ordered catalog after
/// the most recently requested one.
#[derive(Debug, Clone)]
pub struct SequentialPattern {
    catalog: Vec<String>,
    lookahead: usize,
}

impl SequentialPattern {
    /// Creates a pattern over an ordered catalog.
    pub fn new(catalog: Vec<String>, lookahead: usize) -> Self {
        Self { catalog, lookahead }
    }
}

impl WarmingPattern for SequentialPattern {
    fn name(&self) -> &str {
        "sequential"
    }

    fn candidates(&self, context: &WarmingContext) -> Vec<String> {
        let anchor = context
            .recent
            .iter()
            .rev()
            .find_map(|id| self.catalog.iter().position(|c| c == id));
        match anchor {
            Some(index) => self
                .catalog
                .iter()
                .skip(index + 1)
                .take(self.lookahead)
                .cloned()
                .collect(),
            None => self.catalog.iter().take(self.lookahead).cloned().collect(),
        }
    }
}

/// Prefetches identifiers registered for the current hour of day.
#[derive(Debug, Clone, Default)]
pub struct ScheduledPattern {
    slots: BTreeMap<u32, Vec<String>>,
}

impl ScheduledPattern {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ids` for every hour in `hours` (wrapping past midnight).
    pub fn schedule(mut self, hours: std::ops::Range<u32>, ids: &[&str]) -> Self {
        for hour in hours {
            self.slots
                .entry(hour % 24)
                .or_default()
                .extend(ids.iter().map(|id| (*id).to_owned()));
        }
        self
    }
}

impl WarmingPattern for ScheduledPattern {
    fn name(&self) -> &str {
        "scheduled"
    }

    fn candidates(&self, context: &WarmingContext) -> Vec<String> {
        self.slots.get(&context.hour).cloned().unwrap_or_default()
    }
}

/// Prefetches the most frequently requested identifiers.
#[derive(Debug, Clone)]
pub struct FrequencyPattern {
    top: usize,
    min_requests: u64,
}

impl FrequencyPattern {
    /// Keeps the `top` identifiers requested at least `min_requests` times.
    pub fn new(top: usize, min_requests: u64) -> Self {
        Self { top, min_requests }
    }
}

impl WarmingPattern for FrequencyPattern {
    fn name(&self) -> &str {
        "frequency"
    }

    fn candidates(&self, context: &WarmingContext) -> Vec<String> {
        context
            .usage
            .iter()
            .filter(|(_, count)| *count >= self.min_requests)
            .take(self.top)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Outcome of one warming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Candidates proposed by the pattern.
    pub candidates: usize,
    /// Pictures newly loaded into the cache.
    pub loaded: usize,
    /// Candidates already cached.
    pub skipped: usize,
    /// Candidates the loader had no picture for.
    pub not_found: usize,
    /// Loads that failed.
    pub failed: usize,
    /// Whether the pass stopped early because it was cancelled.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_sequential_follows_last_request() {
        let pattern = SequentialPattern::new(ids(&["p1", "p2", "p3", "p4", "p5"]), 2);
        let context = WarmingContext {
            recent: ids(&["p4", "p2"]),
            ..Default::default()
        };
        assert_eq!(pattern.candidates(&context), ids(&["p3", "p4"]));
    }

    #[test]
    fn test_sequential_without_history_starts_at_front() {
        let pattern = SequentialPattern::new(ids(&["p1", "p2", "p3"]), 2);
        assert_eq!(pattern.candidates(&WarmingContext::default()), ids(&["p1", "p2"]));
    }

    #[test]
    fn test_scheduled_wraps_midnight() {
        let pattern = ScheduledPattern::new().schedule(22..26, &["night"]);
        let at = |hour| WarmingContext {
            hour,
            ..Default::default()
        };
        assert_eq!(pattern.candidates(&at(1)), ids(&["night"]));
        assert!(pattern.candidates(&at(12)).is_empty());
    }

    #[test]
    fn test_frequency_ranks_and_filters() {
        let pattern = FrequencyPattern::new(2, 2);
        let context = WarmingContext {
            usage: vec![("a".into(), 9), ("b".into(), 4), ("c".into(), 3), ("d".into(), 1)],
            ..Default::default()
        };
        assert_eq!(pattern.candidates(&context), ids(&["a", "b"]));
    }
}
