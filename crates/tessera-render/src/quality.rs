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

//! Automatic quality adjustment from measured frame rate.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::stats::Ema;
use tessera_core::time::{duration_ms, system_clock, Clock};
use tessera_core::{QualityLevel, QualitySettings};

/// Bad samples charged for one dropped frame.
const DROPPED_FRAME_WEIGHT: u32 = 2;

/// Tuning for the [`QualityAdapter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Smoothed FPS below which samples count as bad.
    pub downgrade_fps: f64,
    /// Smoothed FPS above which samples count as good.
    pub upgrade_fps: f64,
    /// Consecutive bad samples required to step down.
    pub min_bad_samples: u32,
    /// Consecutive good samples required to step up.
    pub min_good_samples: u32,
    /// Minimum time since the last change before stepping down.
    pub downgrade_cooldown_ms: u64,
    /// Minimum time since the last change before stepping up.
    pub upgrade_cooldown_ms: u64,
    /// Dropped frames since the last change above which quality steps down
    /// regardless of the smoothed FPS.
    pub dropped_frame_threshold: u32,
    /// Only drops this recent count toward `dropped_frame_threshold`.
    pub dropped_frame_window_ms: u64,
    /// Maximum gap between instantaneous and smoothed FPS for an FPS-driven
    /// change to be allowed.
    pub stability_tolerance_fps: f64,
    /// Weight of a new sample in the smoothed FPS.
    pub smoothing: f64,
    /// Level at construction.
    pub initial_level: QualityLevel,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            downgrade_fps: 50.0,
            upgrade_fps: 58.0,
            min_bad_samples: 5,
            min_good_samples: 30,
            downgrade_cooldown_ms: 2_000,
            upgrade_cooldown_ms: 5_000,
            dropped_frame_threshold: 5,
            dropped_frame_window_ms: 10_000,
            stability_tolerance_fps: 5.0,
            smoothing: 0.1,
            initial_level: QualityLevel::High,
        }
    }
}

/// Why the quality level moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    /// The smoothed frame rate stayed below the downgrade threshold.
    LowFrameRate,
    /// Too many frames were dropped.
    DroppedFrames,
    /// The smoothed frame rate stayed above the upgrade threshold.
    HighFrameRate,
    /// A manual override was set.
    Manual,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ChangeReason::LowFrameRate => "low frame rate",
            ChangeReason::DroppedFrames => "dropped frames",
            ChangeReason::HighFrameRate => "high frame rate",
            ChangeReason::Manual => "manual override",
        };
        f.write_str(reason)
    }
}

/// A quality transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityChange {
    /// Level before the change.
    pub from: QualityLevel,
    /// Level after the change.
    pub to: QualityLevel,
    /// What triggered it.
    pub reason: ChangeReason,
}

/// Read-only view of the adapter state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityStats {
    /// Current level.
    pub level: QualityLevel,
    /// Smoothed FPS, zero before the first sample.
    pub average_fps: f64,
    /// Consecutive bad samples.
    pub consecutive_bad: u32,
    /// Consecutive good samples.
    pub consecutive_good: u32,
    /// Dropped frames since the last change, inside the drop window.
    pub dropped_frames: u32,
    /// Level changes so far.
    pub changes: u64,
    /// Whether a manual override is active.
    pub manual: bool,
}

/// Moves the quality level one step at a time in response to frame rate.
///
/// FPS-driven changes need the sustained sample count, the cooldown and the
/// stability gate all at once. The dropped-frame trigger only needs the
/// downgrade cooldown, and only counts drops inside the configured window so
/// that occasional hiccups spread over minutes never add up to a downgrade.
/// While a manual level is set no automatic change happens.
#[derive(Debug)]
pub struct QualityAdapter {
    config: QualityConfig,
    clock: Arc<dyn Clock>,
    level: QualityLevel,
    manual: bool,
    fps: Ema,
    last_fps: f64,
    consecutive_bad: u32,
    consecutive_good: u32,
    dropped: VecDeque<Instant>,
    last_change: Option<Instant>,
    changes: u64,
}

impl QualityAdapter {
    /// Creates an adapter on the system clock.
    pub fn new(config: QualityConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates an adapter on the given clock.
    pub fn with_clock(config: QualityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            level: config.initial_level,
            fps: Ema::new(config.smoothing),
            config,
            clock,
            manual: false,
            last_fps: 0.0,
            consecutive_bad: 0,
            consecutive_good: 0,
            dropped: VecDeque::new(),
            last_change: None,
            changes: 0,
        }
    }

    /// The current level.
    pub fn level(&self) -> QualityLevel {
        self.level
    }

    /// Parameters derived from the current level.
    pub fn settings(&self) -> QualitySettings {
        self.level.settings()
    }

    /// Smoothed FPS, zero before the first sample.
    pub fn average_fps(&self) -> f64 {
        self.fps.value().unwrap_or(0.0)
    }

    /// Whether a manual level is in force.
    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// A snapshot of the adapter state.
    pub fn stats(&self) -> QualityStats {
        QualityStats {
            level: self.level,
            average_fps: self.average_fps(),
            consecutive_bad: self.consecutive_bad,
            consecutive_good: self.consecutive_good,
            dropped_frames: self.recent_drops(),
            changes: self.changes,
            manual: self.manual,
        }
    }

    /// Feeds an instantaneous FPS sample.
    pub fn record_fps(&mut self, fps: f64) -> Option<QualityChange> {
        if !fps.is_finite() || fps < 0.0 {
            return None;
        }
        self.last_fps = fps;
        let average = self.fps.update(fps);

        if average < self.config.downgrade_fps {
            self.consecutive_bad = self.consecutive_bad.saturating_add(1);
            self.consecutive_good = 0;
        } else if average > self.config.upgrade_fps {
            self.consecutive_good = self.consecutive_good.saturating_add(1);
            self.consecutive_bad = 0;
        } else {
            self.consecutive_bad = 0;
            self.consecutive_good = 0;
        }
        self.evaluate()
    }

    /// Feeds a frame duration as an FPS sample. Zero durations are ignored.
    pub fn record_frame_time(&mut self, frame_time: Duration) -> Option<QualityChange> {
        let ms = duration_ms(frame_time);
        if ms <= 0.0 {
            return None;
        }
        self.record_fps(1000.0 / ms)
    }

    fn drop_window(&self) -> Duration {
        Duration::from_millis(self.config.dropped_frame_window_ms)
    }

    fn recent_drops(&self) -> u32 {
        let now = self.clock.now();
        let window = self.drop_window();
        let recent = self
            .dropped
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < window)
            .count();
        u32::try_from(recent).unwrap_or(u32::MAX)
    }

    /// Records a dropped frame, which weighs as two bad samples.
    pub fn record_dropped_frame(&mut self) -> Option<QualityChange> {
        let now = self.clock.now();
        let window = self.drop_window();
        while self
            .dropped
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= window)
        {
            self.dropped.pop_front();
        }
        self.dropped.push_back(now);
        self.consecutive_bad = self.consecutive_bad.saturating_add(DROPPED_FRAME_WEIGHT);
        self.consecutive_good = 0;
        self.evaluate()
    }

    /// Pins the level (`Some`) or returns to automatic control (`None`).
    ///
    /// A pinned level may be any level, not only an adjacent one.
    pub fn set_manual_level(&mut self, level: Option<QualityLevel>) -> Option<QualityChange> {
        match level {
            Some(level) => {
                self.manual = true;
                if level == self.level {
                    return None;
                }
                Some(self.apply(level, ChangeReason::Manual))
            }
            None => {
                self.manual = false;
                self.reset_counters();
                None
            }
        }
    }

    fn evaluate(&mut self) -> Option<QualityChange> {
        if self.manual {
            return None;
        }
        let since_change = self
            .last_change
            .map(|at| self.clock.now().saturating_duration_since(at));
        let cooled = |ms: u64| since_change.is_none_or(|d| d >= Duration::from_millis(ms));

        // ── 1. Dropped frames ──
        if self.recent_drops() > self.config.dropped_frame_threshold
            && cooled(self.config.downgrade_cooldown_ms)
        {
            if let Some(lower) = self.level.step_down() {
                return Some(self.apply(lower, ChangeReason::DroppedFrames));
            }
        }

        // ── 2. Stability gate ──
        let stable =
            (self.last_fps - self.average_fps()).abs() <= self.config.stability_tolerance_fps;
        if !stable {
            return None;
        }

        // ── 3. Sustained low frame rate ──
        if self.consecutive_bad >= self.config.min_bad_samples
            && self.average_fps() < self.config.downgrade_fps
            && cooled(self.config.downgrade_cooldown_ms)
        {
            if let Some(lower) = self.level.step_down() {
                return Some(self.apply(lower, ChangeReason::LowFrameRate));
            }
        }

        // ── 4. Sustained headroom ──
        if self.consecutive_good >= self.config.min_good_samples
            && cooled(self.config.upgrade_cooldown_ms)
        {
            if let Some(higher) = self.level.step_up() {
                return Some(self.apply(higher, ChangeReason::HighFrameRate));
            }
        }
        None
    }

    fn apply(&mut self, to: QualityLevel, reason: ChangeReason) -> QualityChange {
        let change = QualityChange {
            from: self.level,
            to,
            reason,
        };
        self.level = to;
        self.reset_counters();
        self.last_change = Some(self.clock.now());
        self.changes += 1;
        log::info!(
            "Quality {} -> {} ({reason}, {:.1} fps avg).",
            change.from,
            change.to,
            self.average_fps()
        );
        change
    }

    fn reset_counters(&mut self) {
        self.consecutive_bad = 0;
        self.consecutive_good = 0;
        self.dropped.clear();
    }
}
