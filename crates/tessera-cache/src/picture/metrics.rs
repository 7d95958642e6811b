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

use std::time::Duration;
use tessera_core::stats::ratio;

/// Minimum hit rate for [`PictureCacheMetrics::meets_performance_target`].
pub const TARGET_HIT_RATE: f64 = 0.95;
/// Maximum average lookup time for the performance target.
pub const TARGET_LOOKUP_LATENCY: Duration = Duration::from_millis(10);
/// Maximum resident memory for the performance target.
pub const TARGET_RESIDENT_BYTES: u64 = 100 * 1024 * 1024;

/// Hit statistics for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TierStats {
    /// Lookups answered by this tier.
    pub hits: u64,
    /// Average latency of those lookups.
    pub average_latency: Duration,
}

/// Read-only snapshot of picture cache activity.
#[derive(Debug, Clone, PartialEq)]
pub struct PictureCacheMetrics {
    /// Lookups answered by any tier.
    pub hits: u64,
    /// Lookups answered by no tier.
    pub misses: u64,
    /// Successful inserts.
    pub puts: u64,
    /// Inserts refused because the picture exceeds the memory budget.
    pub rejected_puts: u64,
    /// Pictures evicted from the memory tier.
    pub evictions: u64,
    /// Load and tier failures.
    pub errors: u64,
    /// `hits / (hits + misses)`.
    pub hit_rate: f64,
    /// Mean time of a `get`, hit or miss.
    pub average_lookup: Duration,
    /// Bytes held by the memory tier.
    pub resident_bytes: u64,
    /// Pictures held by the memory tier.
    pub memory_entries: usize,
    /// Bytes held by the disk tier.
    pub disk_bytes: u64,
    /// Pictures held by the disk tier.
    pub disk_entries: usize,
    /// Memory tier statistics.
    pub memory: TierStats,
    /// Disk tier statistics.
    pub disk: TierStats,
    /// Time since the cache was created.
    pub uptime: Duration,
}

impl PictureCacheMetrics {
    /// Hit rate ≥ 0.95, average lookup < 10ms and resident memory < 100MB.
    pub fn meets_performance_target(&self) -> bool {
        self.hit_rate >= TARGET_HIT_RATE
            && self.average_lookup < TARGET_LOOKUP_LATENCY
            && self.resident_bytes < TARGET_RESIDENT_BYTES
    }
}

#[derive(Debug, Default)]
pub(crate) struct MetricsState {
    pub(crate) memory_hits: u64,
    pub(crate) memory_latency: Duration,
    pub(crate) disk_hits: u64,
    pub(crate) disk_latency: Duration,
    pub(crate) misses: u64,
    pub(crate) miss_latency: Duration,
    pub(crate) puts: u64,
    pub(crate) rejected_puts: u64,
    pub(crate) evictions: u64,
    pub(crate) errors: u64,
}

fn mean(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}

impl MetricsState {
    pub(crate) fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    pub(crate) fn hit_rate(&self) -> f64 {
        ratio(self.hits(), self.hits() + self.misses)
    }

    pub(crate) fn average_lookup(&self) -> Duration {
        let total = self.memory_latency + self.disk_latency + self.miss_latency;
        mean(total, self.hits() + self.misses)
    }

    pub(crate) fn memory_stats(&self) -> TierStats {
        TierStats {
            hits: self.memory_hits,
            average_latency: mean(self.memory_latency, self.memory_hits),
        }
    }

    pub(crate) fn disk_stats(&self) -> TierStats {
        TierStats {
            hits: self.disk_hits,
            average_latency: mean(self.disk_latency, self.disk_hits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(hit_rate: f64, lookup_ms: u64, resident: u64) -> PictureCacheMetrics {
        PictureCacheMetrics {
            hits: 0,
            misses: 0,
            puts: 0,
            rejected_puts: 0,
            evictions: 0,
            errors: 0,
            hit_rate,
            average_lookup: Duration::from_millis(lookup_ms),
            resident_bytes: resident,
            memory_entries: 0,
            disk_bytes: 0,
            disk_entries: 0,
            memory: TierStats::default(),
            disk: TierStats::default(),
            uptime: Duration::ZERO,
        }
    }

    #[test]
    fn test_performance_target_needs_all_three() {
        assert!(snapshot(0.95, 9, 1024).meets_performance_target());
        assert!(!snapshot(0.94, 9, 1024).meets_performance_target());
        assert!(!snapshot(0.99, 10, 1024).meets_performance_target());
        assert!(!snapshot(0.99, 1, TARGET_RESIDENT_BYTES).meets_performance_target());
    }

    #[test]
    fn test_averages_without_samples_are_zero() {
        let state = MetricsState::default();
        assert_eq!(state.hit_rate(), 0.0);
        assert_eq!(state.average_lookup(), Duration::ZERO);
        assert_eq!(state.disk_stats().average_latency, Duration::ZERO);
    }
}
