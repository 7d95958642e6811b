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

//! Rolling statistics over bounded sample windows.

use std::collections::VecDeque;

/// A bounded circular buffer, overwriting the oldest sample when full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a new value, evicting and returning the oldest one if full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.data.len() == self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(value);
        evicted
    }

    /// Number of samples currently held.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no sample was pushed yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterates samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// The most recent sample.
    pub fn last(&self) -> Option<&T> {
        self.data.back()
    }

    /// Drops every sample.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl RingBuffer<f64> {
    /// Arithmetic mean of the samples, or `0.0` if empty.
    pub fn average(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Population variance of the samples, or `0.0` with fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.data.len() < 2 {
            return 0.0;
        }
        let avg = self.average();
        self.data.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>() / self.data.len() as f64
    }

    /// Largest sample, or `0.0` if empty.
    pub fn max(&self) -> f64 {
        self.data.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }
}

/// An exponential moving average: `value = value × (1 − α) + sample × α`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    /// Creates an unseeded average with smoothing factor `alpha` (clamped to `[0, 1]`).
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: None,
        }
    }

    /// Creates an average already seeded with `initial`.
    pub fn seeded(alpha: f64, initial: f64) -> Self {
        Self {
            value: Some(initial),
            ..Self::new(alpha)
        }
    }

    /// Folds a sample into the average. The first sample seeds it.
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            Some(v) => v * (1.0 - self.alpha) + sample * self.alpha,
            None => sample,
        };
        self.value = Some(next);
        next
    }

    /// Current value, if seeded.
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Nearest-rank percentile of an ascending slice.
///
/// `p` is clamped to `[0, 100]` and the derived index to the slice bounds, so
/// this never panics; an empty slice yields `0.0`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = if p.is_finite() { p.clamp(0.0, 100.0) } else { 0.0 };
    let rank = (p * sorted.len() as f64 / 100.0).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

/// `part / total`, defined as `0.0` when `total` is zero.
#[inline]
pub fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_push_and_iter() {
        let mut rb = RingBuffer::new(3);
        rb.push(1.0);
        rb.push(2.0);
        rb.push(3.0);
        assert_eq!(rb.push(4.0), Some(1.0)); // Overwrites 1.0

        let values: Vec<f64> = rb.iter().copied().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(rb.count(), 3);
        assert_eq!(rb.last(), Some(&4.0));
    }

    #[test]
    fn test_ring_buffer_average_and_variance() {
        let mut rb = RingBuffer::new(4);
        for v in [5.0, 15.0, 5.0, 15.0] {
            rb.push(v);
        }
        assert_eq!(rb.average(), 10.0);
        // avg = 10.0, variance = 4 * 25 / 4
        assert!((rb.variance() - 25.0).abs() < 1e-9);
        assert_eq!(rb.max(), 15.0);
    }

    #[test]
    fn test_ring_buffer_empty() {
        let rb = RingBuffer::<f64>::new(4);
        assert_eq!(rb.average(), 0.0);
        assert_eq!(rb.variance(), 0.0);
        assert_eq!(rb.max(), 0.0);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_promoted() {
        let mut rb = RingBuffer::new(0);
        rb.push(1);
        rb.push(2);
        assert_eq!(rb.capacity(), 1);
        assert_eq!(rb.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_ema_seeding_and_smoothing() {
        let mut ema = Ema::new(0.3);
        assert_eq!(ema.value(), None);
        assert_eq!(ema.update(10.0), 10.0);
        // 10 * 0.7 + 20 * 0.3
        assert!((ema.update(20.0) - 13.0).abs() < 1e-9);

        let mut seeded = Ema::seeded(0.1, 60.0);
        assert!((seeded.update(30.0) - 57.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_clamps() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&data, 50.0), 5.0);
        assert_eq!(percentile(&data, 95.0), 10.0);
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 250.0), 10.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_ratio_guards_division_by_zero() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(3, 4), 0.75);
    }
}
