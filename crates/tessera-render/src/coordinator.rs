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

//! The composition root binding layers, scheduling, budgeting and quality.

use crate::budget::{FrameBudgetConfig, FrameBudgetManager};
use crate::error::CoordinatorError;
use crate::quality::{QualityAdapter, QualityChange, QualityConfig};
use crate::scheduler::{
    FrameRequest, LayerExecutor, LayerStats, RenderScheduler, ScheduleOutcome,
    SchedulerConfig, TickReport,
};
use anyhow::Context;
use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::event::MessageBus;
use tessera_core::layer::FrameContext;
use tessera_core::time::{ms_to_duration, system_clock, Clock};
use tessera_core::{LayerMessage, LayerType, QualityLevel, RenderLayer};

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Frame duration above which a frame counts as dropped.
    ///
    /// The frame loop wakes every `scheduler.tick_interval_ms`. Keep that
    /// interval clearly below this target: with 16ms against 16.67ms, a
    /// millisecond of wake-up jitter already reads as a dropped frame. The
    /// quality adapter's drop window keeps such isolated misses from piling
    /// up into a downgrade.
    pub target_frame_ms: f64,
    /// Frame budget settings.
    pub budget: FrameBudgetConfig,
    /// Scheduler settings. `tick_interval_ms` also paces the frame loop.
    pub scheduler: SchedulerConfig,
    /// Quality adapter settings.
    pub quality: QualityConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            target_frame_ms: 16.67,
            budget: FrameBudgetConfig::default(),
            scheduler: SchedulerConfig::default(),
            quality: QualityConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// The target frame duration.
    pub fn target_frame(&self) -> Duration {
        ms_to_duration(self.target_frame_ms)
    }
}

/// A callback notified after every quality change.
pub type QualityListener = Box<dyn FnMut(&QualityChange) + Send>;

/// Read-only snapshot of the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorMetrics {
    /// Frames completed.
    pub frame_count: u64,
    /// Frames whose gap exceeded the target frame duration.
    pub dropped_frames: u64,
    /// Smoothed frames per second.
    pub fps: f64,
    /// Current quality level.
    pub quality: QualityLevel,
    /// Queued layer render entries.
    pub queue_depth: usize,
    /// Per-layer render statistics.
    pub layer_stats: Vec<LayerStats>,
    /// Rolling average of measured frame work.
    pub average_frame_time: Duration,
    /// Smoothed render cost the frame budget holds for each registered layer.
    pub layer_estimates: Vec<(LayerType, Duration)>,
    /// Registered layers, bottom to top.
    pub layers: Vec<LayerType>,
}

struct LayerSlot {
    layer: Box<dyn RenderLayer>,
    inbox: flume::Receiver<LayerMessage>,
}

impl LayerSlot {
    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            self.layer.handle_message(&message);
        }
    }
}

struct State {
    layers: BTreeMap<LayerType, LayerSlot>,
    budget: FrameBudgetManager,
    scheduler: RenderScheduler,
    quality: QualityAdapter,
    frame_count: u64,
    dropped_frames: u64,
    last_frame: Option<Instant>,
}

impl State {
    /// Folds measured render times into the budget's per-layer estimates.
    fn record_costs(&mut self, report: &TickReport) {
        for (layer, took) in &report.timings {
            self.budget.record_task(layer.name(), *took);
        }
    }

    fn deliver_messages(&mut self) {
        for slot in self.layers.values_mut() {
            slot.drain_inbox();
        }
    }

    fn with_executor<R>(
        &mut self,
        run: impl FnOnce(&mut RenderScheduler, &FrameBudgetManager, &mut dyn LayerExecutor) -> R,
    ) -> R {
        let State {
            layers,
            budget,
            scheduler,
            quality,
            frame_count,
            ..
        } = self;
        let budget: &FrameBudgetManager = budget;
        let mut runner = LayerRunner {
            layers,
            budget,
            frame_number: *frame_count,
            quality: quality.level(),
        };
        run(scheduler, budget, &mut runner)
    }
}

/// Renders registered layers on the scheduler's behalf.
struct LayerRunner<'a> {
    layers: &'a mut BTreeMap<LayerType, LayerSlot>,
    budget: &'a FrameBudgetManager,
    frame_number: u64,
    quality: QualityLevel,
}

impl LayerExecutor for LayerRunner<'_> {
    fn execute(&mut self, layer: LayerType) -> anyhow::Result<()> {
        let Some(slot) = self.layers.get_mut(&layer) else {
            log::trace!("Skipping render of unregistered {layer} layer.");
            return Ok(());
        };
        let frame = FrameContext {
            frame_number: self.frame_number,
            quality: self.quality,
            budget: self.budget.layer_allocation(layer),
        };
        slot.layer
            .render(&frame)
            .with_context(|| format!("{layer} layer, frame {}", self.frame_number))
    }
}

struct Inner {
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    listeners: Mutex<Vec<QualityListener>>,
    bus: MessageBus<LayerType, LayerMessage>,
    disposed: AtomicBool,
}

impl Inner {
    fn state(&self) -> Result<MutexGuard<'_, State>, CoordinatorError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Disposed);
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn tick(&self) -> Result<TickReport, CoordinatorError> {
        let mut state = self.state()?;
        state.deliver_messages();
        Self::schedule_pending_updates(&mut state);

        state.budget.start_frame();
        let report =
            state.with_executor(|scheduler, budget, runner| scheduler.tick(budget, runner));
        state.record_costs(&report);
        state.budget.end_frame();
        Ok(report)
    }

    fn schedule_pending_updates(state: &mut State) -> Vec<LayerType> {
        let wanted: Vec<LayerType> = state
            .layers
            .iter()
            .filter(|(layer, slot)| {
                slot.layer.needs_update() && !state.scheduler.is_queued(**layer)
            })
            .map(|(layer, _)| *layer)
            .collect();
        if !wanted.is_empty() {
            state.with_executor(|scheduler, _, runner| {
                scheduler.schedule(FrameRequest::new(wanted.iter().copied()), runner)
            });
        }
        wanted
    }

    fn on_frame_complete(&self) -> Result<Option<QualityChange>, CoordinatorError> {
        let target = self.config.target_frame();
        let mut state = self.state()?;
        let now = self.clock.now();
        state.frame_count += 1;
        let gap = state
            .last_frame
            .replace(now)
            .map(|previous| now.saturating_duration_since(previous));

        let Some(gap) = gap else {
            return Ok(None);
        };
        let mut change = None;
        if gap > target {
            state.dropped_frames += 1;
            log::trace!("Frame {} dropped ({gap:?} since the previous one).", state.frame_count);
            change = state.quality.record_dropped_frame();
        }
        let sampled = state.quality.record_frame_time(gap);
        let change = change.or(sampled);

        if let Some(change) = change {
            self.announce(state, change);
        }
        Ok(change)
    }

    /// Broadcasts a quality change to the layers, then to local listeners.
    fn announce(&self, mut state: MutexGuard<'_, State>, change: QualityChange) {
        let delivered = self.bus.broadcast(LayerMessage::quality_changed(change.to));
        for slot in state.layers.values_mut() {
            slot.drain_inbox();
            slot.layer.update_quality(change.to);
        }
        drop(state);
        log::debug!("Quality change delivered to {delivered} layers.");

        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter_mut() {
            listener(&change);
        }
    }
}

struct FrameLoop {
    running: Arc<AtomicBool>,
    shutdown: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameLoop {
    fn spawn(inner: Arc<Inner>, interval: Duration) -> Result<Self, CoordinatorError> {
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let spawned = thread::Builder::new()
            .name("tessera-frame-loop".into())
            .spawn(move || {
                log::info!("Frame loop started ({interval:?} interval).");
                let mut next = Instant::now() + interval;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if inner.tick().is_err() || inner.on_frame_complete().is_err() {
                        break;
                    }
                    // Re-arm for the next frame; skip missed slots rather than bursting.
                    next += interval;
                    let now = Instant::now();
                    if next < now {
                        next = now + interval;
                    }
                }
                flag.store(false, Ordering::SeqCst);
                log::info!("Frame loop stopped.");
            });

        match spawned {
            Ok(handle) => Ok(Self {
                running,
                shutdown: Some(tx),
                handle: Some(handle),
            }),
            Err(err) => Err(CoordinatorError::Spawn(err)),
        }
    }

    fn stop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Frame loop thread panicked.");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Drives a set of render layers frame by frame.
///
/// Each frame the coordinator delivers pending bus messages to its layers,
/// schedules layers that report `needs_update`, lets the scheduler run what
/// fits in the frame budget, and feeds the frame timing to the quality
/// adapter. Frames are driven either manually with [`tick`](Self::tick) and
/// [`on_frame_complete`](Self::on_frame_complete) or by the background loop
/// started with [`start`](Self::start).
///
/// A failing layer is logged and skipped; the other layers still render.
pub struct RenderCoordinator {
    inner: Arc<Inner>,
    frame_loop: Mutex<Option<FrameLoop>>,
}

impl RenderCoordinator {
    /// Creates a coordinator on the system clock.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a coordinator on the given clock, shared with all of its
    /// components.
    pub fn with_clock(config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        let state = State {
            layers: BTreeMap::new(),
            budget: FrameBudgetManager::with_clock(config.budget.clone(), Arc::clone(&clock)),
            scheduler: RenderScheduler::with_clock(config.scheduler.clone(), Arc::clone(&clock)),
            quality: QualityAdapter::with_clock(config.quality.clone(), Arc::clone(&clock)),
            frame_count: 0,
            dropped_frames: 0,
            last_frame: None,
        };
        log::info!(
            "RenderCoordinator initialized (target frame {:.2}ms, quality {}).",
            config.target_frame_ms,
            config.quality.initial_level
        );
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: Mutex::new(state),
                listeners: Mutex::new(Vec::new()),
                bus: MessageBus::new(),
                disposed: AtomicBool::new(false),
            }),
            frame_loop: Mutex::new(None),
        }
    }

    /// The configuration in force.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Registers a layer under its own [`LayerType`].
    ///
    /// Fails if a layer of that type is already registered.
    pub fn register_layer(&self, mut layer: Box<dyn RenderLayer>) -> Result<(), CoordinatorError> {
        let layer_type = layer.layer_type();
        let mut state = self.inner.state()?;
        if state.layers.contains_key(&layer_type) {
            return Err(CoordinatorError::LayerAlreadyRegistered(layer_type));
        }
        layer.update_quality(state.quality.level());
        let inbox = self.inner.bus.subscribe(layer_type);
        state.layers.insert(layer_type, LayerSlot { layer, inbox });
        log::debug!("Registered the {layer_type} layer.");
        Ok(())
    }

    /// Removes a layer and its queued renders, handing the layer back.
    pub fn unregister_layer(
        &self,
        layer_type: LayerType,
    ) -> Result<Box<dyn RenderLayer>, CoordinatorError> {
        let mut state = self.inner.state()?;
        let slot = state
            .layers
            .remove(&layer_type)
            .ok_or(CoordinatorError::LayerNotRegistered(layer_type))?;
        state.scheduler.cancel_update(layer_type);
        self.inner.bus.unsubscribe(&layer_type);
        log::debug!("Unregistered the {layer_type} layer.");
        Ok(slot.layer)
    }

    /// Registered layer types, bottom to top.
    pub fn layer_types(&self) -> Vec<LayerType> {
        self.inner
            .state()
            .map(|state| state.layers.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Forwards a render request to the scheduler.
    ///
    /// Layers that are not registered are ignored. An `Immediate` request
    /// renders before this call returns.
    pub fn schedule_frame(
        &self,
        mut request: FrameRequest,
    ) -> Result<ScheduleOutcome, CoordinatorError> {
        let mut state = self.inner.state()?;
        request.layers.retain(|layer| state.layers.contains_key(layer));
        let outcome =
            state.with_executor(|scheduler, _, runner| scheduler.schedule(request, runner));
        if let ScheduleOutcome::Executed(report) = &outcome {
            state.record_costs(report);
        }
        Ok(outcome)
    }

    /// Runs one frame's worth of scheduled rendering.
    pub fn tick(&self) -> Result<TickReport, CoordinatorError> {
        self.inner.tick()
    }

    /// Marks the end of a displayed frame.
    ///
    /// Counts the frame, detects a drop when the gap since the previous call
    /// exceeds the target frame duration, and feeds the quality adapter.
    /// Returns the quality change this frame caused, if any.
    pub fn on_frame_complete(&self) -> Result<Option<QualityChange>, CoordinatorError> {
        self.inner.on_frame_complete()
    }

    /// Schedules a normal-priority render for every layer reporting
    /// `needs_update` that is not already queued, returning those layers.
    pub fn layers_needing_update(&self) -> Result<Vec<LayerType>, CoordinatorError> {
        let mut state = self.inner.state()?;
        Ok(Inner::schedule_pending_updates(&mut state))
    }

    /// Renders every registered layer now, bypassing the queue and budget.
    pub fn force_render_all(&self) -> Result<TickReport, CoordinatorError> {
        let mut state = self.inner.state()?;
        let layers: Vec<LayerType> = state.layers.keys().copied().collect();
        let report =
            state.with_executor(|scheduler, _, runner| scheduler.force_render_all(&layers, runner));
        state.record_costs(&report);
        Ok(report)
    }

    /// Seeds the expected render cost of `layer` until it has rendered.
    ///
    /// Without a declared cost the scheduler assumes the budget's default
    /// task estimate for a layer with no render history.
    pub fn declare_layer_cost(
        &self,
        layer: LayerType,
        estimate: Duration,
    ) -> Result<(), CoordinatorError> {
        self.inner.state()?.budget.declare_task(layer.name(), estimate);
        Ok(())
    }

    /// Drops queued renders of `layer`, returning how many were removed.
    pub fn cancel_update(&self, layer: LayerType) -> Result<usize, CoordinatorError> {
        Ok(self.inner.state()?.scheduler.cancel_update(layer))
    }

    /// Sends a message to one layer. It is handled at the start of the next
    /// tick.
    pub fn send_message(
        &self,
        to: LayerType,
        message: LayerMessage,
    ) -> Result<(), CoordinatorError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Disposed);
        }
        Ok(self.inner.bus.send_to(&to, message)?)
    }

    /// Sends a message to every layer, returning how many were reached.
    pub fn broadcast(&self, message: LayerMessage) -> usize {
        self.inner.bus.broadcast(message)
    }

    /// Registers a callback run after each quality change, once the layers
    /// have been told. Listeners must not register further listeners.
    pub fn add_quality_listener(&self, listener: impl FnMut(&QualityChange) + Send + 'static) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// The current quality level.
    pub fn quality_level(&self) -> QualityLevel {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .quality
            .level()
    }

    /// Pins the quality level, or returns to automatic control with `None`.
    pub fn set_manual_quality(
        &self,
        level: Option<QualityLevel>,
    ) -> Result<Option<QualityChange>, CoordinatorError> {
        let mut state = self.inner.state()?;
        let change = state.quality.set_manual_level(level);
        if let Some(change) = change {
            self.inner.announce(state, change);
        }
        Ok(change)
    }

    /// A snapshot of frame, quality and scheduling statistics.
    pub fn metrics(&self) -> CoordinatorMetrics {
        let state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        CoordinatorMetrics {
            frame_count: state.frame_count,
            dropped_frames: state.dropped_frames,
            fps: state.quality.average_fps(),
            quality: state.quality.level(),
            queue_depth: state.scheduler.queue_depth(),
            layer_stats: state.scheduler.layer_stats(),
            average_frame_time: state.budget.average_frame_time(),
            layer_estimates: state
                .layers
                .keys()
                .map(|layer| (*layer, state.budget.estimate_task(layer.name())))
                .collect(),
            layers: state.layers.keys().copied().collect(),
        }
    }

    /// Starts the background frame loop. Does nothing if already running.
    ///
    /// The loop wakes every scheduler tick interval, runs [`tick`](Self::tick)
    /// and [`on_frame_complete`](Self::on_frame_complete), then re-arms for the
    /// next frame until stopped or disposed.
    pub fn start(&self) -> Result<(), CoordinatorError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Disposed);
        }
        let mut frame_loop = self.frame_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if frame_loop
            .as_ref()
            .is_some_and(|running| running.running.load(Ordering::SeqCst))
        {
            return Ok(());
        }
        if let Some(mut finished) = frame_loop.take() {
            finished.stop();
        }
        let interval = self.inner.config.scheduler.tick_interval();
        *frame_loop = Some(FrameLoop::spawn(Arc::clone(&self.inner), interval)?);
        Ok(())
    }

    /// Stops the background frame loop and waits for the current frame.
    pub fn stop(&self) {
        if let Some(mut frame_loop) = self
            .frame_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            frame_loop.stop();
        }
    }

    /// Whether the background frame loop is running.
    pub fn is_running(&self) -> bool {
        self.frame_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|frame_loop| frame_loop.running.load(Ordering::SeqCst))
    }

    /// Stops the frame loop, then tears down layers, queue and listeners.
    ///
    /// Every later call that needs the coordinator's state fails with
    /// [`CoordinatorError::Disposed`]. Disposing twice is a no-op.
    pub fn dispose(&self) {
        // The loop must be gone before any component is torn down.
        self.stop();
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        for (layer_type, _) in std::mem::take(&mut state.layers) {
            self.inner.bus.unsubscribe(&layer_type);
            state.scheduler.cancel_update(layer_type);
        }
        drop(state);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        log::info!("RenderCoordinator disposed.");
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for RenderCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCoordinator")
            .field("layers", &self.layer_types())
            .field("running", &self.is_running())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
