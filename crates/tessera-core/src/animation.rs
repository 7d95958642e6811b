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

//! Tick-driven interpolation.
//!
//! Animations are not streams: the owner of a value calls
//! [`interpolate`] (or advances a [`Tween`]) once per scheduler tick with the
//! fraction of the animation that has elapsed.

use crate::math::Vec2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;

/// An easing curve mapping linear progress `t ∈ [0, 1]` to eased progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Easing {
    /// `t`
    #[default]
    Linear,
    /// `t²`
    EaseInQuad,
    /// `t(2 − t)`
    EaseOutQuad,
    /// Quadratic in on the first half, quadratic out on the second.
    EaseInOutQuad,
    /// Cubic Hermite smoothstep, `t²(3 − 2t)`.
    SmoothStep,
    /// Ease-out bounce.
    Bounce,
    /// Ease-out elastic.
    Elastic,
}

impl Easing {
    /// Applies the curve. `t` is clamped to `[0, 1]`; NaN is treated as `0`.
    pub fn apply(self, t: f64) -> f64 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Easing::Linear => t,
            Easing::EaseInQuad => t * t,
            Easing::EaseOutQuad => t * (2.0 - t),
            Easing::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::SmoothStep => t * t * (3.0 - 2.0 * t),
            Easing::Bounce => bounce_out(t),
            Easing::Elastic => elastic_out(t),
        }
    }
}

fn bounce_out(t: f64) -> f64 {
    const N1: f64 = 7.5625;
    const D1: f64 = 2.75;
    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984375
    }
}

fn elastic_out(t: f64) -> f64 {
    const C4: f64 = (2.0 * PI) / 3.0;
    if t == 0.0 || t == 1.0 {
        return t;
    }
    2f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * C4).sin() + 1.0
}

/// A value that can be blended linearly.
pub trait Interpolate: Copy {
    /// Blends `from` towards `to` by an (already eased) factor.
    fn blend(from: Self, to: Self, factor: f64) -> Self;
}

impl Interpolate for f64 {
    #[inline]
    fn blend(from: Self, to: Self, factor: f64) -> Self {
        from + (to - from) * factor
    }
}

impl Interpolate for Vec2 {
    #[inline]
    fn blend(from: Self, to: Self, factor: f64) -> Self {
        from + (to - from) * factor
    }
}

/// Interpolates between two values for an elapsed fraction of an animation.
///
/// Overshooting curves (bounce, elastic) may leave the `[from, to]` segment
/// transiently; the elapsed fraction itself is clamped.
pub fn interpolate<T: Interpolate>(from: T, to: T, elapsed_fraction: f64, easing: Easing) -> T {
    T::blend(from, to, easing.apply(elapsed_fraction))
}

/// A single animated value advanced by explicit ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween<T: Interpolate> {
    from: T,
    to: T,
    duration: Duration,
    elapsed: Duration,
    easing: Easing,
}

impl<T: Interpolate> Tween<T> {
    /// Creates a tween that has not advanced yet.
    pub fn new(from: T, to: T, duration: Duration, easing: Easing) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
            easing,
        }
    }

    /// Advances by `dt` and returns the value for the new position.
    pub fn advance(&mut self, dt: Duration) -> T {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.value()
    }

    /// The value at the current position.
    pub fn value(&self) -> T {
        interpolate(self.from, self.to, self.fraction(), self.easing)
    }

    /// Elapsed fraction in `[0, 1]`; a zero-length tween is always complete.
    pub fn fraction(&self) -> f64 {
        if self.duration.is_zero() {
            1.0
        } else {
            self.elapsed.as_secs_f64() / self.duration.as_secs_f64()
        }
    }

    /// Returns `true` once the full duration has elapsed.
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}
