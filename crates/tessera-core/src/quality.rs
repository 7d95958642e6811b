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

//! Discrete visual-fidelity tiers and the parameters each tier implies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rendering quality tier. Ordered `Low < Medium < High < Ultra`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum QualityLevel {
    /// Minimum effects, half resolution.
    Low,
    /// Reduced effects.
    Medium,
    /// Full effects at native resolution.
    #[default]
    High,
    /// Every effect at its densest setting.
    Ultra,
}

impl QualityLevel {
    /// All levels in ascending order.
    pub const ALL: [QualityLevel; 4] = [
        QualityLevel::Low,
        QualityLevel::Medium,
        QualityLevel::High,
        QualityLevel::Ultra,
    ];

    /// The next level up, or `None` at `Ultra`.
    pub fn step_up(self) -> Option<Self> {
        match self {
            QualityLevel::Low => Some(QualityLevel::Medium),
            QualityLevel::Medium => Some(QualityLevel::High),
            QualityLevel::High => Some(QualityLevel::Ultra),
            QualityLevel::Ultra => None,
        }
    }

    /// The next level down, or `None` at `Low`.
    pub fn step_down(self) -> Option<Self> {
        match self {
            QualityLevel::Low => None,
            QualityLevel::Medium => Some(QualityLevel::Low),
            QualityLevel::High => Some(QualityLevel::Medium),
            QualityLevel::Ultra => Some(QualityLevel::High),
        }
    }

    /// The parameters derived from this level.
    pub fn settings(self) -> QualitySettings {
        QualitySettings::for_level(self)
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
            QualityLevel::Ultra => "ultra",
        };
        f.write_str(name)
    }
}

/// How edges are smoothed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AntialiasingMode {
    /// No antialiasing.
    None,
    /// Cheap edge blending.
    Fast,
    /// Standard multisampling.
    Standard,
    /// Highest-quality filtering.
    High,
}

/// Rendering parameters derived from a [`QualityLevel`].
///
/// | level  | particles | scale | shadows | particles | glow | ripples | AA       | field lines |
/// |--------|-----------|-------|---------|-----------|------|---------|----------|-------------|
/// | low    | 50        | 0.5   | no      | yes       | no   | no      | none     | 0.25        |
/// | medium | 150       | 0.75  | no      | yes       | yes  | no      | fast     | 0.5         |
/// | high   | 300       | 1.0   | yes     | yes       | yes  | yes     | standard | 0.75        |
/// | ultra  | 500       | 1.0   | yes     | yes       | yes  | yes     | high     | 1.0         |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Upper bound on live particles.
    pub max_particles: u32,
    /// Offscreen resolution multiplier.
    pub resolution_scale: f64,
    /// Whether drop shadows are drawn.
    pub shadows_enabled: bool,
    /// Whether particle effects are drawn at all.
    pub particles_enabled: bool,
    /// Whether glow passes are drawn.
    pub glow_enabled: bool,
    /// Whether ripple distortions are drawn.
    pub ripples_enabled: bool,
    /// Edge smoothing mode.
    pub antialiasing: AntialiasingMode,
    /// Fraction of field lines drawn, in `(0, 1]`.
    pub field_line_density: f64,
}

impl QualitySettings {
    /// The tabulated settings for a level.
    pub const fn for_level(level: QualityLevel) -> Self {
        match level {
            QualityLevel::Low => Self {
                max_particles: 50,
                resolution_scale: 0.5,
                shadows_enabled: false,
                particles_enabled: true,
                glow_enabled: false,
                ripples_enabled: false,
                antialiasing: AntialiasingMode::None,
                field_line_density: 0.25,
            },
            QualityLevel::Medium => Self {
                max_particles: 150,
                resolution_scale: 0.75,
                shadows_enabled: false,
                particles_enabled: true,
                glow_enabled: true,
                ripples_enabled: false,
                antialiasing: AntialiasingMode::Fast,
                field_line_density: 0.5,
            },
            QualityLevel::High => Self {
                max_particles: 300,
                resolution_scale: 1.0,
                shadows_enabled: true,
                particles_enabled: true,
                glow_enabled: true,
                ripples_enabled: true,
                antialiasing: AntialiasingMode::Standard,
                field_line_density: 0.75,
            },
            QualityLevel::Ultra => Self {
                max_particles: 500,
                resolution_scale: 1.0,
                shadows_enabled: true,
                particles_enabled: true,
                glow_enabled: true,
                ripples_enabled: true,
                antialiasing: AntialiasingMode::High,
                field_line_density: 1.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        assert!(QualityLevel::Low < QualityLevel::Medium);
        assert!(QualityLevel::Medium < QualityLevel::High);
        assert!(QualityLevel::High < QualityLevel::Ultra);
    }

    #[test]
    fn test_steps_are_adjacent() {
        assert_eq!(QualityLevel::Medium.step_down(), Some(QualityLevel::Low));
        assert_eq!(QualityLevel::Medium.step_up(), Some(QualityLevel::High));
        assert_eq!(QualityLevel::Low.step_down(), None);
        assert_eq!(QualityLevel::Ultra.step_up(), None);
    }

    #[test]
    fn test_settings_scale_with_level() {
        let mut previous: Option<QualitySettings> = None;
        for level in QualityLevel::ALL {
            let s = level.settings();
            if let Some(p) = previous {
                assert!(s.max_particles > p.max_particles);
                assert!(s.resolution_scale >= p.resolution_scale);
                assert!(s.field_line_density > p.field_line_density);
            }
            previous = Some(s);
        }
        assert!(!QualityLevel::Low.settings().shadows_enabled);
        assert!(QualityLevel::Ultra.settings().ripples_enabled);
    }

    #[test]
    fn test_display() {
        assert_eq!(QualityLevel::Ultra.to_string(), "ultra");
    }
}
