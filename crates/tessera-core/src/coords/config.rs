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

//! The immutable configuration snapshot a
//! [`CoordinateSystem`](super::CoordinateSystem) is built from.

use crate::math::{Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The smallest zoom level a view can reach.
pub const MIN_ZOOM: f64 = 0.1;
/// The largest zoom level a view can reach.
pub const MAX_ZOOM: f64 = 10.0;

/// Clamps a zoom level into `[MIN_ZOOM, MAX_ZOOM]`.
#[inline]
pub fn clamp_zoom(zoom: f64) -> f64 {
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// An invalid coordinate system configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinateError {
    /// The device pixel ratio must be finite and strictly positive.
    #[error("device pixel ratio must be positive, got {0}")]
    InvalidPixelRatio(f64),
    /// The grid cell size must be finite and strictly positive.
    #[error("grid cell size must be positive, got {0}")]
    InvalidCellSize(f64),
    /// The grid must have at least one column and one row.
    #[error("grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid {
        /// Grid width in cells.
        width: u32,
        /// Grid height in cells.
        height: u32,
    },
    /// The canvas must have a non-empty area.
    #[error("canvas size must be non-empty, got {0:?}")]
    EmptyCanvas(Size),
    /// The workspace must have a non-empty area.
    #[error("workspace bounds must be non-empty, got {0:?}")]
    EmptyWorkspace(Rect),
}

/// Immutable snapshot of every parameter the coordinate conversions depend on.
///
/// A configuration is never mutated in place: zooming, panning or resizing
/// produces a new snapshot which replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystemConfig {
    /// Physical pixels per logical pixel.
    pub device_pixel_ratio: f64,
    /// Logical size of the drawing surface.
    pub canvas_size: Size,
    /// Edge length of one grid cell at zoom `1.0`, in canvas pixels.
    pub grid_cell_size: f64,
    /// Number of columns in the grid.
    pub grid_width: u32,
    /// Number of rows in the grid.
    pub grid_height: u32,
    /// The rectangle the canvas maps onto in workspace space.
    pub workspace_bounds: Rect,
    /// Current zoom level, always within `[MIN_ZOOM, MAX_ZOOM]`.
    pub zoom: f64,
    /// Canvas-space offset of the grid origin.
    pub pan_offset: Vec2,
}

impl Default for CoordinateSystemConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            canvas_size: Size::new(800.0, 600.0),
            grid_cell_size: 50.0,
            grid_width: 8,
            grid_height: 8,
            workspace_bounds: Rect::new(0.0, 0.0, 800.0, 600.0),
            zoom: 1.0,
            pan_offset: Vec2::ZERO,
        }
    }
}

impl CoordinateSystemConfig {
    /// Checks the structural invariants of the configuration.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !(self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0) {
            return Err(CoordinateError::InvalidPixelRatio(self.device_pixel_ratio));
        }
        if !(self.grid_cell_size.is_finite() && self.grid_cell_size > 0.0) {
            return Err(CoordinateError::InvalidCellSize(self.grid_cell_size));
        }
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(CoordinateError::EmptyGrid {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        if self.canvas_size.is_empty() {
            return Err(CoordinateError::EmptyCanvas(self.canvas_size));
        }
        if self.workspace_bounds.is_empty() {
            return Err(CoordinateError::EmptyWorkspace(self.workspace_bounds));
        }
        Ok(())
    }

    /// Returns a copy with a different zoom level, clamped to the valid range.
    pub fn with_zoom(&self, zoom: f64) -> Self {
        Self {
            zoom: clamp_zoom(zoom),
            ..self.clone()
        }
    }

    /// Returns a copy with a different pan offset.
    pub fn with_pan(&self, pan_offset: Vec2) -> Self {
        Self {
            pan_offset,
            ..self.clone()
        }
    }

    /// Returns a copy with a different canvas size.
    pub fn with_canvas_size(&self, canvas_size: Size) -> Self {
        Self {
            canvas_size,
            ..self.clone()
        }
    }

    /// Total grid extent in canvas pixels at zoom `1.0`.
    pub fn grid_extent(&self) -> Size {
        Size::new(
            self.grid_width as f64 * self.grid_cell_size,
            self.grid_height as f64 * self.grid_cell_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CoordinateSystemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = CoordinateSystemConfig::default();

        let cfg = CoordinateSystemConfig {
            grid_cell_size: 0.0,
            ..base.clone()
        };
        assert_eq!(cfg.validate(), Err(CoordinateError::InvalidCellSize(0.0)));

        let cfg = CoordinateSystemConfig {
            grid_width: 0,
            ..base.clone()
        };
        assert!(matches!(cfg.validate(), Err(CoordinateError::EmptyGrid { .. })));

        let cfg = CoordinateSystemConfig {
            device_pixel_ratio: -1.0,
            ..base
        };
        assert!(matches!(
            cfg.validate(),
            Err(CoordinateError::InvalidPixelRatio(_))
        ));
    }

    #[test]
    fn test_with_zoom_clamps() {
        let cfg = CoordinateSystemConfig::default();
        assert_eq!(cfg.with_zoom(100.0).zoom, MAX_ZOOM);
        assert_eq!(cfg.with_zoom(0.0).zoom, MIN_ZOOM);
        assert_eq!(cfg.with_zoom(2.5).zoom, 2.5);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let cfg = CoordinateSystemConfig::default().with_pan(Vec2::new(3.0, -4.0));
        let json = serde_json::to_string(&cfg).unwrap();
        let back: CoordinateSystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
