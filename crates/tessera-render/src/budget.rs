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

//! Per-frame wall-clock budgeting.
//!
//! The [`FrameBudgetManager`] brackets each frame, tracks how much of the
//! budget is already spent and keeps smoothed cost estimates for recurring
//! tasks. The budget is advisory: it tells callers what to skip, it never
//! interrupts work already started.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::stats::{Ema, RingBuffer};
use tessera_core::time::{duration_ms, ms_to_duration, system_clock, Clock};
use tessera_core::LayerType;

/// Number of completed frames kept for the rolling frame-time average.
const FRAME_HISTORY_LEN: usize = 120;

/// Budget configuration. Layer shares are fractions of the total budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameBudgetConfig {
    /// Wall-clock ceiling for one frame.
    pub total_budget_ms: f64,
    /// Share reserved for the static layer.
    pub static_share: f64,
    /// Share reserved for the dynamic layer.
    pub dynamic_share: f64,
    /// Share reserved for the effects layer.
    pub effects_share: f64,
    /// Estimate used for a task that has neither history nor a declared cost.
    pub default_task_estimate_ms: f64,
    /// Weight of a new sample in the task estimate average.
    pub smoothing: f64,
}

impl Default for FrameBudgetConfig {
    fn default() -> Self {
        Self {
            total_budget_ms: 16.0,
            static_share: 0.25,
            dynamic_share: 0.5,
            effects_share: 0.25,
            default_task_estimate_ms: 2.0,
            smoothing: 0.3,
        }
    }
}

impl FrameBudgetConfig {
    /// The total frame budget.
    pub fn total_budget(&self) -> Duration {
        ms_to_duration(self.total_budget_ms)
    }

    /// The estimate for tasks without any history.
    pub fn default_task_estimate(&self) -> Duration {
        ms_to_duration(self.default_task_estimate_ms)
    }

    /// The configured share for `layer`, clamped to `[0, 1]`.
    pub fn share(&self, layer: LayerType) -> f64 {
        let share = match layer {
            LayerType::Static => self.static_share,
            LayerType::Dynamic => self.dynamic_share,
            LayerType::Effects => self.effects_share,
        };
        share.clamp(0.0, 1.0)
    }
}

/// Timing of a frame closed by [`FrameBudgetManager::end_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Time between `start_frame` and `end_frame`.
    pub elapsed: Duration,
    /// How far the frame ran past the budget, zero if it fit.
    pub overrun: Duration,
    /// Rolling average frame time including this frame.
    pub average: Duration,
}

impl FrameTiming {
    /// Whether the frame exceeded its budget.
    pub fn is_over_budget(&self) -> bool {
        !self.overrun.is_zero()
    }
}

/// Enforces a per-frame time budget and apportions it across layers.
#[derive(Debug)]
pub struct FrameBudgetManager {
    config: FrameBudgetConfig,
    clock: Arc<dyn Clock>,
    total: Duration,
    allocations: HashMap<LayerType, Duration>,
    frame_start: Option<Instant>,
    frame_times: RingBuffer<f64>,
    task_estimates: HashMap<String, Ema>,
    frames: u64,
    overruns: u64,
}

impl FrameBudgetManager {
    /// Creates a manager on the system clock.
    pub fn new(config: FrameBudgetConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a manager on the given clock.
    pub fn with_clock(config: FrameBudgetConfig, clock: Arc<dyn Clock>) -> Self {
        let total = config.total_budget();
        let allocations = LayerType::ALL
            .iter()
            .map(|&layer| (layer, ms_to_duration(config.total_budget_ms * config.share(layer))))
            .collect();
        log::debug!(
            "FrameBudgetManager: {:.2}ms budget ({:?}).",
            config.total_budget_ms,
            allocations
        );
        Self {
            config,
            clock,
            total,
            allocations,
            frame_start: None,
            frame_times: RingBuffer::new(FRAME_HISTORY_LEN),
            task_estimates: HashMap::new(),
            frames: 0,
            overruns: 0,
        }
    }

    /// The configuration in force.
    pub fn config(&self) -> &FrameBudgetConfig {
        &self.config
    }

    /// The total per-frame budget.
    pub fn total_budget(&self) -> Duration {
        self.total
    }

    /// The static share of the budget reserved for `layer`.
    pub fn layer_allocation(&self, layer: LayerType) -> Duration {
        self.allocations.get(&layer).copied().unwrap_or_default()
    }

    /// Opens a frame. Restarts the measurement if a frame was already open.
    pub fn start_frame(&mut self) {
        if self.frame_start.is_some() {
            log::trace!("start_frame called with a frame still open; restarting.");
        }
        self.frame_start = Some(self.clock.now());
    }

    /// Closes the current frame and records its duration.
    ///
    /// Returns `None` if no frame was open.
    pub fn end_frame(&mut self) -> Option<FrameTiming> {
        let started = self.frame_start.take()?;
        let elapsed = self.clock.now().saturating_duration_since(started);
        self.frame_times.push(duration_ms(elapsed));
        self.frames += 1;

        let overrun = elapsed.saturating_sub(self.total);
        if !overrun.is_zero() {
            self.overruns += 1;
            log::warn!(
                "Frame {} exceeded its budget by {:.2}ms ({:.2}ms of {:.2}ms).",
                self.frames,
                duration_ms(overrun),
                duration_ms(elapsed),
                duration_ms(self.total)
            );
        }

        Some(FrameTiming {
            elapsed,
            overrun,
            average: self.average_frame_time(),
        })
    }

    /// Whether a frame is currently open.
    pub fn frame_in_progress(&self) -> bool {
        self.frame_start.is_some()
    }

    /// Time spent in the current frame so far; zero when no frame is open.
    pub fn elapsed(&self) -> Duration {
        self.frame_start
            .map(|started| self.clock.now().saturating_duration_since(started))
            .unwrap_or_default()
    }

    /// Whether work of the given estimated cost still fits in this frame.
    pub fn has_budget(&self, estimate: Duration) -> bool {
        self.elapsed() + estimate <= self.total
    }

    /// Budget left in this frame, floored at zero.
    pub fn remaining_budget(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// Whether `layer` should render given its estimated cost.
    ///
    /// The estimate must fit both the layer's static allocation and what is
    /// left of the frame. The scheduler only gates on what is left; this
    /// stricter check is for hosts drawing outside the scheduler.
    pub fn should_render_layer(&self, layer: LayerType, estimate: Duration) -> bool {
        estimate <= self.layer_allocation(layer) && self.has_budget(estimate)
    }

    /// Seeds the estimate for `task` unless it already has history.
    pub fn declare_task(&mut self, task: &str, estimate: Duration) {
        let smoothing = self.config.smoothing;
        self.task_estimates
            .entry(task.to_owned())
            .or_insert_with(|| Ema::seeded(smoothing, duration_ms(estimate)));
    }

    /// The smoothed cost of `task`, or the default estimate if unknown.
    pub fn estimate_task(&self, task: &str) -> Duration {
        self.task_estimates
            .get(task)
            .and_then(Ema::value)
            .map(ms_to_duration)
            .unwrap_or_else(|| self.config.default_task_estimate())
    }

    /// Folds a measured duration into the estimate for `task` and returns
    /// the new estimate.
    pub fn record_task(&mut self, task: &str, actual: Duration) -> Duration {
        let smoothing = self.config.smoothing;
        let seed = self.config.default_task_estimate_ms;
        let estimate = self
            .task_estimates
            .entry(task.to_owned())
            .or_insert_with(|| Ema::seeded(smoothing, seed))
            .update(duration_ms(actual));
        ms_to_duration(estimate)
    }

    /// Rolling average of completed frame times.
    pub fn average_frame_time(&self) -> Duration {
        ms_to_duration(self.frame_times.average())
    }

    /// Frames closed so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Frames that exceeded the budget.
    pub fn overrun_count(&self) -> u64 {
        self.overruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tessera_core::time::ManualClock;

    fn manager() -> (FrameBudgetManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let manager = FrameBudgetManager::with_clock(FrameBudgetConfig::default(), clock.clone());
        (manager, clock)
    }

    #[test]
    fn test_budget_after_fifteen_ms() {
        let (mut budget, clock) = manager();
        budget.start_frame();
        clock.advance_ms(15);

        assert!(!budget.has_budget(Duration::from_millis(2)));
        assert!(budget.has_budget(Duration::from_millis(1)));
        assert_eq!(budget.remaining_budget(), Duration::from_millis(1));
    }

    #[test]
    fn test_remaining_budget_floors_at_zero() {
        let (mut budget, clock) = manager();
        budget.start_frame();
        clock.advance_ms(40);
        assert_eq!(budget.remaining_budget(), Duration::ZERO);
    }

    #[test]
    fn test_layer_allocations() {
        let (budget, _clock) = manager();
        assert_eq!(budget.layer_allocation(LayerType::Static), Duration::from_millis(4));
        assert_eq!(budget.layer_allocation(LayerType::Dynamic), Duration::from_millis(8));
        assert_eq!(budget.layer_allocation(LayerType::Effects), Duration::from_millis(4));
    }

    #[test]
    fn test_should_render_needs_allocation_and_remaining() {
        let (mut budget, clock) = manager();
        budget.start_frame();

        // Fits the frame but not the static share.
        assert!(!budget.should_render_layer(LayerType::Static, Duration::from_millis(5)));
        assert!(budget.should_render_layer(LayerType::Dynamic, Duration::from_millis(5)));

        // Fits the dynamic share but not what is left of the frame.
        clock.advance_ms(12);
        assert!(!budget.should_render_layer(LayerType::Dynamic, Duration::from_millis(5)));
        assert!(budget.should_render_layer(LayerType::Static, Duration::from_millis(3)));
    }

    #[test]
    fn test_end_frame_tracks_overruns() {
        let (mut budget, clock) = manager();
        assert!(budget.end_frame().is_none());

        budget.start_frame();
        clock.advance_ms(10);
        let fit = budget.end_frame().expect("frame was open");
        assert!(!fit.is_over_budget());

        budget.start_frame();
        clock.advance_ms(20);
        let late = budget.end_frame().expect("frame was open");
        assert_eq!(late.overrun, Duration::from_millis(4));
        assert_relative_eq!(duration_ms(late.average), 15.0, epsilon = 1e-6);
        assert_eq!(budget.frame_count(), 2);
        assert_eq!(budget.overrun_count(), 1);
        assert!(!budget.frame_in_progress());
    }

    #[test]
    fn test_task_estimate_smoothing() {
        let (mut budget, _clock) = manager();
        assert_eq!(budget.estimate_task("unknown"), Duration::from_millis(2));

        // Seeded by the 2ms default: 2 × 0.7 + 10 × 0.3.
        let first = budget.record_task("pieces", Duration::from_millis(10));
        assert_relative_eq!(duration_ms(first), 4.4, epsilon = 1e-6);

        // Seeded by the declared cost: 5 × 0.7 + 10 × 0.3.
        budget.declare_task("glow", Duration::from_millis(5));
        let glow = budget.record_task("glow", Duration::from_millis(10));
        assert_relative_eq!(duration_ms(glow), 6.5, epsilon = 1e-6);
        assert_relative_eq!(duration_ms(budget.estimate_task("glow")), 6.5, epsilon = 1e-6);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: FrameBudgetConfig =
            serde_json::from_str(r#"{ "total_budget_ms": 8.0 }"#).expect("valid json");
        assert_relative_eq!(config.total_budget_ms, 8.0);
        assert_relative_eq!(config.dynamic_share, 0.5);
    }
}
