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

//! Bounded latency history for transform operations.

use std::collections::BTreeSet;
use std::time::Duration;
use tessera_core::stats::{percentile, RingBuffer};
use tessera_core::time::duration_ms;

/// One recorded transform.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyRecord {
    /// Operation type the transform was issued under.
    pub op_type: String,
    /// Wall time spent in `transform`, including lock waits.
    pub latency: Duration,
    /// Whether the result came from the cache.
    pub cache_hit: bool,
}

/// Latency percentiles for one operation type, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyPercentiles {
    /// Number of samples considered.
    pub count: usize,
    /// Median latency.
    pub p50_ms: f64,
    /// 95th percentile latency.
    pub p95_ms: f64,
    /// 99th percentile latency.
    pub p99_ms: f64,
}

/// Keeps the most recent `N` transform records; the oldest is evicted first.
#[derive(Debug)]
pub struct LatencyRecorder {
    records: RingBuffer<LatencyRecord>,
}

impl LatencyRecorder {
    /// Creates a recorder holding at most `max_records` entries.
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RingBuffer::new(max_records),
        }
    }

    /// Appends a record.
    pub fn record(&mut self, op_type: &str, latency: Duration, cache_hit: bool) {
        self.records.push(LatencyRecord {
            op_type: op_type.to_owned(),
            latency,
            cache_hit,
        });
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.count()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &LatencyRecord> {
        self.records.iter()
    }

    /// Distinct operation types among retained records.
    pub fn operation_types(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.op_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Percentiles for one operation type, or `None` if it has no samples.
    pub fn percentiles(&self, op_type: &str) -> Option<LatencyPercentiles> {
        let mut samples: Vec<f64> = self
            .records
            .iter()
            .filter(|r| r.op_type == op_type)
            .map(|r| duration_ms(r.latency))
            .collect();
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(f64::total_cmp);
        Some(LatencyPercentiles {
            count: samples.len(),
            p50_ms: percentile(&samples, 50.0),
            p95_ms: percentile(&samples, 95.0),
            p99_ms: percentile(&samples, 99.0),
        })
    }

    /// Fraction of retained records for `op_type` that were cache hits.
    pub fn hit_ratio(&self, op_type: &str) -> f64 {
        let (hits, total) = self
            .records
            .iter()
            .filter(|r| r.op_type == op_type)
            .fold((0u64, 0u64), |(h, t), r| (h + u64::from(r.cache_hit), t + 1));
        tessera_core::stats::ratio(hits, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_oldest_record_is_evicted() {
        let mut recorder = LatencyRecorder::new(3);
        for ms in 1..=4 {
            recorder.record("op", Duration::from_millis(ms), false);
        }
        assert_eq!(recorder.len(), 3);
        let first = recorder.records().next().map(|r| r.latency);
        assert_eq!(first, Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_percentiles_per_operation() {
        let mut recorder = LatencyRecorder::new(1000);
        for ms in 1..=100 {
            recorder.record("screen_to_canvas", Duration::from_millis(ms), ms % 2 == 0);
        }
        recorder.record("grid_to_canvas", Duration::from_millis(500), true);

        let p = recorder.percentiles("screen_to_canvas").expect("samples exist");
        assert_eq!(p.count, 100);
        assert_relative_eq!(p.p50_ms, 50.0, epsilon = 1e-9);
        assert_relative_eq!(p.p95_ms, 95.0, epsilon = 1e-9);
        assert_relative_eq!(p.p99_ms, 99.0, epsilon = 1e-9);
        assert_relative_eq!(recorder.hit_ratio("screen_to_canvas"), 0.5);

        assert!(recorder.percentiles("unknown").is_none());
        assert_eq!(
            recorder.operation_types(),
            vec!["grid_to_canvas".to_string(), "screen_to_canvas".to_string()]
        );
    }
}
