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

//! Priority-ordered render request scheduling.
//!
//! A request names one or more layers. Each layer becomes its own queue
//! entry, and an entry ends in exactly one of three ways: coalesced into a
//! render of the same layer earlier in the tick, dropped as stale, or
//! executed. Entries never re-enter the queue once they leave it.

use crate::budget::FrameBudgetManager;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::stats::RingBuffer;
use tessera_core::time::{duration_ms, ms_to_duration, system_clock, Clock};
use tessera_core::LayerType;

/// Urgency of a render request. `Immediate` bypasses the queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum RenderPriority {
    /// Cosmetic work; dropped when stale.
    Low,
    /// Ordinary redraws; dropped when stale.
    #[default]
    Normal,
    /// Never dropped for staleness.
    High,
    /// Executed synchronously when scheduled.
    Immediate,
}

/// A request to redraw a set of layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameRequest {
    /// Layers to redraw. Duplicates are ignored.
    pub layers: Vec<LayerType>,
    /// Request urgency.
    pub priority: RenderPriority,
    /// Minimum time before the request may execute.
    pub delay: Duration,
    /// Free-form annotations carried for diagnostics.
    pub metadata: BTreeMap<String, String>,
}

impl FrameRequest {
    /// A normal-priority request for `layers`.
    pub fn new(layers: impl IntoIterator<Item = LayerType>) -> Self {
        Self {
            layers: layers.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: RenderPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the delay before the request becomes eligible.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn distinct_layers(&self) -> Vec<LayerType> {
        let mut seen = HashSet::new();
        self.layers
            .iter()
            .copied()
            .filter(|layer| seen.insert(*layer))
            .collect()
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between scheduling ticks when driven by the frame loop.
    pub tick_interval_ms: u64,
    /// Age after which `Low` and `Normal` entries are dropped.
    pub max_delay_ms: u64,
    /// Number of render durations kept per layer for cost estimation.
    pub history_len: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            max_delay_ms: 100,
            history_len: 10,
        }
    }
}

impl SchedulerConfig {
    /// The tick interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The staleness threshold.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Performs the actual drawing of a layer on the scheduler's behalf.
pub trait LayerExecutor {
    /// Renders `layer` once.
    fn execute(&mut self, layer: LayerType) -> anyhow::Result<()>;
}

impl<F> LayerExecutor for F
where
    F: FnMut(LayerType) -> anyhow::Result<()>,
{
    fn execute(&mut self, layer: LayerType) -> anyhow::Result<()> {
        self(layer)
    }
}

/// What happened during one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Layers rendered, in execution order. Includes failed renders.
    pub executed: Vec<LayerType>,
    /// Layers whose render returned an error.
    pub failed: Vec<LayerType>,
    /// Measured duration of each render, in execution order.
    pub timings: Vec<(LayerType, Duration)>,
    /// Entries merged into a render of the same layer.
    pub coalesced: usize,
    /// Entries still waiting out their delay.
    pub deferred: usize,
    /// Entries dropped for staleness.
    pub stale_dropped: usize,
    /// Whether the pass stopped early because the next entry did not fit.
    pub budget_cutoff: bool,
}

/// Result of [`RenderScheduler::schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The request was queued as this many layer entries.
    Queued(usize),
    /// The request was `Immediate` and ran synchronously.
    Executed(TickReport),
}

/// Render statistics for one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerStats {
    /// The layer.
    pub layer: LayerType,
    /// Mean of the recent render durations.
    pub average_render_time: Duration,
    /// Successful and failed renders so far.
    pub renders: u64,
    /// Renders that returned an error.
    pub failures: u64,
}

#[derive(Debug)]
struct QueuedRender {
    layer: LayerType,
    priority: RenderPriority,
    enqueued_at: Instant,
    ready_at: Instant,
    sequence: u64,
}

impl QueuedRender {
    // Higher priority, then higher layer rank, then older first.
    fn cmp_schedule(&self, other: &Self) -> Ordering {
        (
            Reverse(self.priority),
            Reverse(self.layer.scheduling_rank()),
            self.enqueued_at,
            self.sequence,
        )
            .cmp(&(
                Reverse(other.priority),
                Reverse(other.layer.scheduling_rank()),
                other.enqueued_at,
                other.sequence,
            ))
    }
}

#[derive(Debug)]
struct LayerHistory {
    durations: RingBuffer<f64>,
    renders: u64,
    failures: u64,
}

/// Decides which queued layer renders run in each tick.
#[derive(Debug)]
pub struct RenderScheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    queue: Vec<QueuedRender>,
    history: HashMap<LayerType, LayerHistory>,
    next_sequence: u64,
}

impl RenderScheduler {
    /// Creates a scheduler on the system clock.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a scheduler on the given clock.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            queue: Vec::new(),
            history: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// The configuration in force.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queues `request`, or runs it right away if it is `Immediate`.
    pub fn schedule(
        &mut self,
        request: FrameRequest,
        executor: &mut dyn LayerExecutor,
    ) -> ScheduleOutcome {
        let layers = request.distinct_layers();
        if request.priority == RenderPriority::Immediate {
            let mut report = TickReport::default();
            for layer in layers {
                self.run(layer, executor, &mut report);
            }
            return ScheduleOutcome::Executed(report);
        }

        let now = self.clock.now();
        let queued = layers.len();
        for layer in layers {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            self.queue.push(QueuedRender {
                layer,
                priority: request.priority,
                enqueued_at: now,
                ready_at: now + request.delay,
                sequence,
            });
        }
        if !request.metadata.is_empty() {
            log::trace!("Queued {queued} layer renders ({:?}).", request.metadata);
        }
        ScheduleOutcome::Queued(queued)
    }

    /// Runs one scheduling pass over the queue.
    ///
    /// Entries are visited in priority order. A layer renders at most once
    /// per pass; entries still inside their delay stay queued; `Low` and
    /// `Normal` entries that became eligible more than `max_delay` ago are
    /// dropped; the pass stops at the first entry whose estimated cost does
    /// not fit the remaining frame budget.
    pub fn tick(
        &mut self,
        budget: &FrameBudgetManager,
        executor: &mut dyn LayerExecutor,
    ) -> TickReport {
        let now = self.clock.now();
        let max_delay = self.config.max_delay();
        let mut report = TickReport::default();
        let mut processed = HashSet::new();
        let mut retained = Vec::new();

        self.queue.sort_by(QueuedRender::cmp_schedule);
        let mut pending = std::mem::take(&mut self.queue).into_iter();

        while let Some(entry) = pending.next() {
            if processed.contains(&entry.layer) {
                report.coalesced += 1;
                continue;
            }
            if now < entry.ready_at {
                report.deferred += 1;
                retained.push(entry);
                continue;
            }
            let age = now.saturating_duration_since(entry.ready_at);
            if age > max_delay && entry.priority < RenderPriority::High {
                log::debug!(
                    "Dropping stale {:?} render of the {} layer ({:.1}ms old).",
                    entry.priority,
                    entry.layer,
                    duration_ms(age)
                );
                report.stale_dropped += 1;
                continue;
            }

            let estimate = self.estimate_for(entry.layer, budget);
            if !budget.has_budget(estimate) {
                log::debug!(
                    "Budget cutoff before the {} layer (needs {:.2}ms, {:.2}ms left).",
                    entry.layer,
                    duration_ms(estimate),
                    duration_ms(budget.remaining_budget())
                );
                report.budget_cutoff = true;
                retained.push(entry);
                retained.extend(pending.by_ref());
                break;
            }

            processed.insert(entry.layer);
            self.run(entry.layer, executor, &mut report);
        }

        // Whatever a render in this pass already covered is satisfied.
        let before = retained.len();
        retained.retain(|entry| !processed.contains(&entry.layer));
        report.coalesced += before - retained.len();

        self.queue = retained;
        if report.coalesced > 0 {
            log::trace!("Coalesced {} render entries.", report.coalesced);
        }
        report
    }

    fn run(&mut self, layer: LayerType, executor: &mut dyn LayerExecutor, report: &mut TickReport) {
        let started = self.clock.now();
        let result = executor.execute(layer);
        let took = self.clock.now().saturating_duration_since(started);

        let history_len = self.config.history_len.max(1);
        let history = self.history.entry(layer).or_insert_with(|| LayerHistory {
            durations: RingBuffer::new(history_len),
            renders: 0,
            failures: 0,
        });
        history.durations.push(duration_ms(took));
        history.renders += 1;
        report.executed.push(layer);
        report.timings.push((layer, took));

        if let Err(err) = result {
            history.failures += 1;
            report.failed.push(layer);
            log::error!("Render of the {layer} layer failed: {err:?}");
        }
    }

    /// Estimated cost of rendering `layer`: the mean of its recent render
    /// durations, or before any render the budget's estimate for the layer's
    /// task (a declared cost, else the default).
    pub fn estimate_for(&self, layer: LayerType, budget: &FrameBudgetManager) -> Duration {
        self.average_render_time(layer)
            .unwrap_or_else(|| budget.estimate_task(layer.name()))
    }

    /// Mean recent render time of `layer`, if it has rendered.
    pub fn average_render_time(&self, layer: LayerType) -> Option<Duration> {
        self.history
            .get(&layer)
            .filter(|history| !history.durations.is_empty())
            .map(|history| ms_to_duration(history.durations.average()))
    }

    /// Removes every queued entry for `layer`, returning how many were removed.
    ///
    /// A render already in progress is unaffected.
    pub fn cancel_update(&mut self, layer: LayerType) -> usize {
        let before = self.queue.len();
        self.queue.retain(|entry| entry.layer != layer);
        before - self.queue.len()
    }

    /// Renders every layer in `layers` right away, ignoring the queue and
    /// the budget.
    pub fn force_render_all(
        &mut self,
        layers: &[LayerType],
        executor: &mut dyn LayerExecutor,
    ) -> TickReport {
        let mut report = TickReport::default();
        for &layer in layers {
            self.run(layer, executor, &mut report);
        }
        report
    }

    /// Number of queued layer entries.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Whether any entry for `layer` is queued.
    pub fn is_queued(&self, layer: LayerType) -> bool {
        self.queue.iter().any(|entry| entry.layer == layer)
    }

    /// Statistics for every layer that has rendered at least once.
    pub fn layer_stats(&self) -> Vec<LayerStats> {
        let mut stats: Vec<LayerStats> = self
            .history
            .iter()
            .map(|(&layer, history)| LayerStats {
                layer,
                average_render_time: ms_to_duration(history.durations.average()),
                renders: history.renders,
                failures: history.failures,
            })
            .collect();
        stats.sort_by_key(|s| s.layer);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::FrameBudgetConfig;
    use tessera_core::time::ManualClock;

    struct Fixture {
        clock: Arc<ManualClock>,
        scheduler: RenderScheduler,
        budget: FrameBudgetManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new());
        Fixture {
            scheduler: RenderScheduler::with_clock(SchedulerConfig::default(), clock.clone()),
            budget: FrameBudgetManager::with_clock(FrameBudgetConfig::default(), clock.clone()),
            clock,
        }
    }

    /// An executor that records calls and advances the clock by a fixed cost.
    fn timed<'a>(
        clock: &Arc<ManualClock>,
        cost_ms: u64,
        log: &'a mut Vec<LayerType>,
    ) -> impl LayerExecutor + 'a {
        let clock = Arc::clone(clock);
        move |layer: LayerType| -> anyhow::Result<()> {
            clock.advance_ms(cost_ms);
            log.push(layer);
            Ok(())
        }
    }

    #[test]
    fn test_requests_for_different_layers_share_a_tick() {
        let mut f = fixture();
        let mut ran = Vec::new();
        let mut exec = timed(&f.clock, 1, &mut ran);
        f.scheduler.schedule(FrameRequest::new([LayerType::Static]), &mut exec);
        f.scheduler.schedule(FrameRequest::new([LayerType::Effects]), &mut exec);

        f.budget.start_frame();
        let report = f.scheduler.tick(&f.budget, &mut exec);
        drop(exec);

        assert_eq!(report.executed, vec![LayerType::Effects, LayerType::Static]);
        assert_eq!(ran.len(), 2);
        assert_eq!(f.scheduler.queue_depth(), 0);
    }

    #[test]
    fn test_duplicate_layer_entries_coalesce() {
        let mut f = fixture();
        let mut ran = Vec::new();
        let mut exec = timed(&f.clock, 1, &mut ran);
        for _ in 0..3 {
            f.scheduler.schedule(FrameRequest::new([LayerType::Dynamic]), &mut exec);
        }
        f.scheduler.schedule(
            FrameRequest::new([LayerType::Dynamic, LayerType::Dynamic]),
            &mut exec,
        );
        assert_eq!(f.scheduler.queue_depth(), 4);

        f.budget.start_frame();
        let report = f.scheduler.tick(&f.budget, &mut exec);
        drop(exec);
        assert_eq!(ran, vec![LayerType::Dynamic]);
        assert_eq!(report.coalesced, 3);
        assert_eq!(f.scheduler.queue_depth(), 0);
    }

    #[test]
    fn test_priority_then_layer_rank_order() {
        let mut f = fixture();
        let mut ran = Vec::new();
        let mut exec = timed(&f.clock, 0, &mut ran);
        f.scheduler.schedule(FrameRequest::new([LayerType::Dynamic]), &mut exec);
        f.scheduler.schedule(
            FrameRequest::new([LayerType::Static]).with_priority(RenderPriority::High),
            &mut exec,
        );
        f.scheduler.schedule(FrameRequest::new([LayerType::Effects]), &mut exec);

        f.budget.start_frame();
        f.scheduler.tick(&f.budget, &mut exec);
        drop(exec);
        assert_eq!(
            ran,
            vec![LayerType::Static, LayerType::Dynamic, LayerType::Effects]
        );
    }

    #[test]
    fn test_stale_low_dropped_high_kept() {
        let mut f = fixture();
        let mut ran = Vec::new();
        let mut exec = timed(&f.clock, 0, &mut ran);
        f.scheduler.schedule(
            FrameRequest::new([LayerType::Effects]).with_priority(RenderPriority::Low),
            &mut exec,
        );
        f.scheduler.schedule(
            FrameRequest::new([LayerType::Static]).with_priority(RenderPriority::High),
            &mut exec,
        );
        f.clock.advance_ms(150);

        f.budget.start_frame();
        let report = f.scheduler.tick(&f.budget, &mut exec);
        drop(exec);
        assert_eq!(report.stale_dropped, 1);
        assert_eq!(ran, vec![LayerType::Static]);
        assert_eq!(f.scheduler.queue_depth(), 0);
    }

    #[test]
    fn test_delayed_request_is_deferred() {
        let mut f = fixture();
        let mut ran = Vec::new();
        let mut exec = timed(&f.clock, 0, &mut ran);
        f.scheduler.schedule(
            FrameRequest::new([LayerType::Dynamic]).with_delay(Duration::from_millis(30)),
            &mut exec,
        );

        f.budget.start_frame();
        let first = f.scheduler.tick(&f.budget, &mut exec);
        assert_eq!(first.deferred, 1);
        assert!(first.executed.is_empty());

        f.clock.advance_ms(30);
        f.budget.start_frame();
        let second = f.scheduler.tick(&f.budget, &mut exec);
        drop(exec);
        assert_eq!(second.executed, vec![LayerType::Dynamic]);
        assert_eq!(ran.len(), 1);
    }

    #[test]
    fn test_budget_cutoff_keeps_the_rest_queued() {
        let mut f = fixture();
        let mut ran = Vec::new();
        let mut exec = timed(&f.clock, 7, &mut ran);
        // Seed every layer's history at 7ms.
        f.scheduler.force_render_all(&LayerType::ALL, &mut exec);

        for layer in LayerType::ALL {
            f.scheduler.schedule(FrameRequest::new([layer]), &mut exec);
        }
        f.budget.start_frame();
        let report = f.scheduler.tick(&f.budget, &mut exec);
        drop(exec);

        // 7 + 7 fits in 16ms, a third 7ms render does not.
        assert_eq!(report.executed, vec![LayerType::Dynamic, LayerType::Effects]);
        assert!(report.budget_cutoff);
        assert_eq!(f.scheduler.queue_depth(), 1);
        assert!(f.scheduler.is_queued(LayerType::Static));
    }

    #[test]
    fn test_immediate_runs_synchronously() {
        let mut f = fixture();
        let mut ran = Vec::new();
        let mut exec = timed(&f.clock, 0, &mut ran);
        let outcome = f.scheduler.schedule(
            FrameRequest::new([LayerType::Effects]).with_priority(RenderPriority::Immediate),
            &mut exec,
        );
        drop(exec);
        assert!(matches!(
            outcome,
            ScheduleOutcome::Executed(ref r) if r.executed == vec![LayerType::Effects]
        ));
        assert_eq!(ran, vec![LayerType::Effects]);
        assert_eq!(f.scheduler.queue_depth(), 0);
    }

    #[test]
    fn test_cancel_update_removes_layer_entries() {
        let mut f = fixture();
        let mut exec = |_layer: LayerType| -> anyhow::Result<()> { Ok(()) };
        f.scheduler.schedule(FrameRequest::new(LayerType::ALL), &mut exec);
        f.scheduler.schedule(FrameRequest::new([LayerType::Effects]), &mut exec);

        assert_eq!(f.scheduler.cancel_update(LayerType::Effects), 2);
        assert_eq!(f.scheduler.queue_depth(), 2);
        assert!(!f.scheduler.is_queued(LayerType::Effects));
    }

    #[test]
    fn test_failed_render_is_contained_and_counted() {
        let mut f = fixture();
        let mut exec = |layer: LayerType| -> anyhow::Result<()> {
            if layer == LayerType::Effects {
                anyhow::bail!("shader exploded");
            }
            Ok(())
        };
        f.scheduler.schedule(FrameRequest::new(LayerType::ALL), &mut exec);
        f.budget.start_frame();
        let report = f.scheduler.tick(&f.budget, &mut exec);

        assert_eq!(report.executed.len(), 3);
        assert_eq!(report.failed, vec![LayerType::Effects]);
        let effects = f
            .scheduler
            .layer_stats()
            .into_iter()
            .find(|s| s.layer == LayerType::Effects)
            .expect("stats for effects");
        assert_eq!(effects.failures, 1);
    }

    #[test]
    fn test_report_carries_render_timings() {
        let mut f = fixture();
        let clock = f.clock.clone();
        let mut exec = move |layer: LayerType| -> anyhow::Result<()> {
            clock.advance_ms(if layer == LayerType::Dynamic { 3 } else { 1 });
            Ok(())
        };
        let report = f
            .scheduler
            .force_render_all(&[LayerType::Static, LayerType::Dynamic], &mut exec);
        assert_eq!(
            report.timings,
            vec![
                (LayerType::Static, Duration::from_millis(1)),
                (LayerType::Dynamic, Duration::from_millis(3)),
            ]
        );
    }

    #[test]
    fn test_declared_cost_applies_before_history() {
        let mut f = fixture();
        f.budget
            .declare_task(LayerType::Dynamic.name(), Duration::from_millis(20));
        let mut exec = |_layer: LayerType| -> anyhow::Result<()> { Ok(()) };
        f.scheduler.schedule(
            FrameRequest::new([LayerType::Dynamic, LayerType::Static]),
            &mut exec,
        );

        f.budget.start_frame();
        let report = f.scheduler.tick(&f.budget, &mut exec);
        assert!(report.budget_cutoff);
        assert!(report.executed.is_empty());
        assert_eq!(f.scheduler.queue_depth(), 2);
    }

    #[test]
    fn test_history_is_mean_of_last_ten() {
        let mut f = fixture();
        let mut cost = 0;
        let clock = f.clock.clone();
        let mut exec = move |_layer: LayerType| -> anyhow::Result<()> {
            cost += 1;
            clock.advance_ms(cost);
            Ok(())
        };
        for _ in 0..12 {
            f.scheduler.force_render_all(&[LayerType::Static], &mut exec);
        }
        // Durations 3..=12 remain.
        assert_eq!(
            f.scheduler.average_render_time(LayerType::Static),
            Some(Duration::from_micros(7_500))
        );
        assert_eq!(f.scheduler.average_render_time(LayerType::Dynamic), None);
    }
}
