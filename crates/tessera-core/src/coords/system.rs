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

//! Bidirectional conversion between screen, canvas, grid and workspace spaces.

use super::config::{clamp_zoom, CoordinateError, CoordinateSystemConfig};
use super::points::{CanvasPoint, GridPoint, GridRange, ScreenPoint, WorkspacePoint};
use crate::math::{Rect, Vec2, EPSILON};

/// Margin kept around the grid by [`CoordinateSystem::fit_grid_to_view`].
const FIT_MARGIN: f64 = 0.9;

/// Values derived from a configuration snapshot.
///
/// Always recomputed as a whole when the configuration is replaced; individual
/// fields are never patched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedTransforms {
    /// Edge length of one cell in canvas pixels (`cell_size × zoom`).
    pub effective_cell_size: f64,
    /// Per-axis scale from canvas pixels to workspace units.
    pub canvas_to_workspace_scale: Vec2,
    /// Workspace position of the canvas origin.
    pub workspace_origin: Vec2,
}

impl DerivedTransforms {
    fn compute(config: &CoordinateSystemConfig) -> Self {
        let ws = config.workspace_bounds;
        Self {
            effective_cell_size: config.grid_cell_size * config.zoom,
            canvas_to_workspace_scale: Vec2::new(
                ws.width / config.canvas_size.width,
                ws.height / config.canvas_size.height,
            ),
            workspace_origin: ws.origin(),
        }
    }
}

/// Pure, deterministic conversions for one configuration snapshot.
///
/// Mutating operations (`apply_zoom`, `apply_pan`, ...) build a new
/// configuration, replace the old one and recompute the derived state. Each
/// replacement bumps [`generation`](Self::generation), which callers use as the
/// identity of the configuration when memoizing results.
///
/// The type is not internally synchronized: share it behind a lock or an
/// `Arc` snapshot so that readers never see a half-applied update.
#[derive(Debug, Clone)]
pub struct CoordinateSystem {
    config: CoordinateSystemConfig,
    derived: DerivedTransforms,
    generation: u64,
}

impl CoordinateSystem {
    /// Builds a coordinate system, validating the configuration first.
    ///
    /// An out-of-range zoom level is clamped rather than rejected.
    pub fn new(config: CoordinateSystemConfig) -> Result<Self, CoordinateError> {
        let config = Self::normalized(config)?;
        let derived = DerivedTransforms::compute(&config);
        Ok(Self {
            config,
            derived,
            generation: 0,
        })
    }

    fn normalized(
        mut config: CoordinateSystemConfig,
    ) -> Result<CoordinateSystemConfig, CoordinateError> {
        config.validate()?;
        config.zoom = if config.zoom.is_finite() {
            clamp_zoom(config.zoom)
        } else {
            1.0
        };
        Ok(config)
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> &CoordinateSystemConfig {
        &self.config
    }

    /// The values derived from the current snapshot.
    pub fn derived(&self) -> &DerivedTransforms {
        &self.derived
    }

    /// Number of configuration replacements since construction.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the configuration wholesale.
    pub fn set_config(&mut self, config: CoordinateSystemConfig) -> Result<(), CoordinateError> {
        let config = Self::normalized(config)?;
        self.install(config);
        Ok(())
    }

    fn install(&mut self, config: CoordinateSystemConfig) {
        self.derived = DerivedTransforms::compute(&config);
        self.config = config;
        self.generation += 1;
    }

    // --- Screen <-> Canvas ---

    /// Converts device pixels into logical canvas pixels.
    #[inline]
    pub fn screen_to_canvas(&self, p: ScreenPoint) -> CanvasPoint {
        let dpr = self.config.device_pixel_ratio;
        CanvasPoint::new(p.x / dpr, p.y / dpr)
    }

    /// Converts logical canvas pixels into device pixels.
    #[inline]
    pub fn canvas_to_screen(&self, p: CanvasPoint) -> ScreenPoint {
        let dpr = self.config.device_pixel_ratio;
        ScreenPoint::new(p.x * dpr, p.y * dpr)
    }

    // --- Canvas <-> Grid ---

    /// Returns the cell containing a canvas point, or `None` when the point
    /// falls outside the grid.
    pub fn canvas_to_grid(&self, p: CanvasPoint) -> Option<GridPoint> {
        let cell = self.derived.effective_cell_size;
        let pan = self.config.pan_offset;
        let gx = ((p.x - pan.x) / cell).floor();
        let gy = ((p.y - pan.y) / cell).floor();
        if !(gx.is_finite() && gy.is_finite()) {
            return None;
        }
        if gx < 0.0
            || gy < 0.0
            || gx >= self.config.grid_width as f64
            || gy >= self.config.grid_height as f64
        {
            return None;
        }
        Some(GridPoint::new(gx as i32, gy as i32))
    }

    /// Returns the canvas position of the *center* of a cell.
    ///
    /// Cell centers are used directly as piece anchor points.
    pub fn grid_to_canvas(&self, g: GridPoint) -> CanvasPoint {
        let cell = self.derived.effective_cell_size;
        let pan = self.config.pan_offset;
        CanvasPoint::new(
            (g.x as f64 + 0.5) * cell + pan.x,
            (g.y as f64 + 0.5) * cell + pan.y,
        )
    }

    /// Returns the top-left-origin canvas rectangle covered by a cell.
    pub fn grid_cell_to_canvas_bounds(&self, g: GridPoint) -> Rect {
        let cell = self.derived.effective_cell_size;
        let pan = self.config.pan_offset;
        Rect::new(g.x as f64 * cell + pan.x, g.y as f64 * cell + pan.y, cell, cell)
    }

    // --- Canvas <-> Workspace ---

    /// Maps a canvas point onto the workspace rectangle.
    pub fn canvas_to_workspace(&self, p: CanvasPoint) -> WorkspacePoint {
        let scale = self.derived.canvas_to_workspace_scale;
        let origin = self.derived.workspace_origin;
        WorkspacePoint::new(origin.x + p.x * scale.x, origin.y + p.y * scale.y)
    }

    /// Maps a workspace point back onto the canvas.
    pub fn workspace_to_canvas(&self, p: WorkspacePoint) -> CanvasPoint {
        let scale = self.derived.canvas_to_workspace_scale;
        let origin = self.derived.workspace_origin;
        CanvasPoint::new((p.x - origin.x) / scale.x, (p.y - origin.y) / scale.y)
    }

    // --- Composites ---

    /// `screen → canvas → grid`.
    pub fn screen_to_grid(&self, p: ScreenPoint) -> Option<GridPoint> {
        self.canvas_to_grid(self.screen_to_canvas(p))
    }

    /// `grid → canvas → screen` (cell center).
    pub fn grid_to_screen(&self, g: GridPoint) -> ScreenPoint {
        self.canvas_to_screen(self.grid_to_canvas(g))
    }

    /// `screen → canvas → workspace`.
    pub fn screen_to_workspace(&self, p: ScreenPoint) -> WorkspacePoint {
        self.canvas_to_workspace(self.screen_to_canvas(p))
    }

    /// `workspace → canvas → screen`.
    pub fn workspace_to_screen(&self, p: WorkspacePoint) -> ScreenPoint {
        self.canvas_to_screen(self.workspace_to_canvas(p))
    }

    /// `grid → canvas → workspace` (cell center).
    pub fn grid_to_workspace(&self, g: GridPoint) -> WorkspacePoint {
        self.canvas_to_workspace(self.grid_to_canvas(g))
    }

    /// `workspace → canvas → grid`.
    pub fn workspace_to_grid(&self, p: WorkspacePoint) -> Option<GridPoint> {
        self.canvas_to_grid(self.workspace_to_canvas(p))
    }

    /// The range of cells at least partially visible on the canvas, or `None`
    /// if the grid is entirely off-screen.
    pub fn visible_grid_bounds(&self) -> Option<GridRange> {
        let cell = self.derived.effective_cell_size;
        let pan = self.config.pan_offset;
        let size = self.config.canvas_size;
        let gw = self.config.grid_width as f64;
        let gh = self.config.grid_height as f64;

        let min_x = ((0.0 - pan.x) / cell).floor().clamp(0.0, gw);
        let min_y = ((0.0 - pan.y) / cell).floor().clamp(0.0, gh);
        let max_x = ((size.width - pan.x) / cell).ceil().clamp(0.0, gw);
        let max_y = ((size.height - pan.y) / cell).ceil().clamp(0.0, gh);

        if max_x <= min_x || max_y <= min_y {
            return None;
        }
        Some(GridRange {
            min: GridPoint::new(min_x as i32, min_y as i32),
            max: GridPoint::new(max_x as i32, max_y as i32),
        })
    }

    // --- View mutations ---

    /// Multiplies the zoom by `factor` while keeping the content under
    /// `anchor` fixed on the canvas.
    ///
    /// Returns `false` (and leaves the configuration untouched) when the
    /// clamped zoom does not change.
    pub fn apply_zoom(&mut self, factor: f64, anchor: CanvasPoint) -> bool {
        if !factor.is_finite() {
            return false;
        }
        let old_zoom = self.config.zoom;
        let new_zoom = clamp_zoom(old_zoom * factor);
        if (new_zoom - old_zoom).abs() < EPSILON {
            return false;
        }

        let cell = self.config.grid_cell_size;
        let pan = self.config.pan_offset;
        // Continuous grid coordinate under the anchor, kept invariant.
        let gx = (anchor.x - pan.x) / (cell * old_zoom);
        let gy = (anchor.y - pan.y) / (cell * old_zoom);
        let new_pan = Vec2::new(anchor.x - gx * cell * new_zoom, anchor.y - gy * cell * new_zoom);

        let mut next = self.config.with_zoom(new_zoom);
        next.pan_offset = new_pan;
        self.install(next);
        true
    }

    /// Shifts the view by a canvas-space delta.
    pub fn apply_pan(&mut self, delta: Vec2) {
        let next = self.config.with_pan(self.config.pan_offset + delta);
        self.install(next);
    }

    /// Restores zoom `1.0` and a zero pan offset.
    pub fn reset_view(&mut self) {
        let mut next = self.config.with_zoom(1.0);
        next.pan_offset = Vec2::ZERO;
        self.install(next);
    }

    /// Pans so that the center of `cell` lands on the canvas center.
    pub fn center_on_grid_point(&mut self, cell: GridPoint) {
        let canvas_center = self.config.canvas_size.to_vec2() * 0.5;
        let eff = self.derived.effective_cell_size;
        let cell_center = Vec2::new((cell.x as f64 + 0.5) * eff, (cell.y as f64 + 0.5) * eff);
        let next = self.config.with_pan(canvas_center - cell_center);
        self.install(next);
    }

    /// Zooms so the whole grid fits the canvas with a 10% margin, then centers it.
    pub fn fit_grid_to_view(&mut self) {
        let extent = self.config.grid_extent();
        let canvas = self.config.canvas_size;
        let scale = (canvas.width / extent.width).min(canvas.height / extent.height);
        let zoom = clamp_zoom(scale * FIT_MARGIN);
        let scaled = extent.to_vec2() * zoom;
        let pan = (canvas.to_vec2() - scaled) * 0.5;

        let mut next = self.config.with_zoom(zoom);
        next.pan_offset = pan;
        self.install(next);
    }
}
