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

//! Typed coordinate conversions routed through the transformation manager.

use anyhow::bail;
use std::fmt;
use tessera_core::coords::{CanvasPoint, CoordinateSystem, GridPoint, ScreenPoint, WorkspacePoint};
use tessera_core::math::Rect;

/// A point in any coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformInput {
    /// Physical pixels.
    Screen(ScreenPoint),
    /// Logical pixels.
    Canvas(CanvasPoint),
    /// Cell indices.
    Grid(GridPoint),
    /// Workspace units.
    Workspace(WorkspacePoint),
}

impl fmt::Display for TransformInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformInput::Screen(p) => fmt::Display::fmt(p, f),
            TransformInput::Canvas(p) => fmt::Display::fmt(p, f),
            TransformInput::Grid(p) => fmt::Display::fmt(p, f),
            TransformInput::Workspace(p) => fmt::Display::fmt(p, f),
        }
    }
}

/// The result of a typed conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOutput {
    /// Physical pixels.
    Screen(ScreenPoint),
    /// Logical pixels.
    Canvas(CanvasPoint),
    /// Cell indices; `None` when the point lies outside the grid.
    Grid(Option<GridPoint>),
    /// Workspace units.
    Workspace(WorkspacePoint),
    /// A cell rectangle in canvas space.
    Bounds(Rect),
}

/// Every conversion [`CoordinateSystem`] offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformOp {
    /// Screen to canvas.
    ScreenToCanvas,
    /// Canvas to screen.
    CanvasToScreen,
    /// Canvas to grid (partial).
    CanvasToGrid,
    /// Grid cell center in canvas space.
    GridToCanvas,
    /// Grid cell rectangle in canvas space.
    GridCellBounds,
    /// Canvas to workspace.
    CanvasToWorkspace,
    /// Workspace to canvas.
    WorkspaceToCanvas,
    /// Screen to grid (partial).
    ScreenToGrid,
    /// Grid to screen.
    GridToScreen,
    /// Screen to workspace.
    ScreenToWorkspace,
    /// Workspace to screen.
    WorkspaceToScreen,
    /// Grid to workspace.
    GridToWorkspace,
    /// Workspace to grid (partial).
    WorkspaceToGrid,
}

impl TransformOp {
    /// The operation name used as the cache key prefix.
    pub const fn name(self) -> &'static str {
        match self {
            TransformOp::ScreenToCanvas => "screen_to_canvas",
            TransformOp::CanvasToScreen => "canvas_to_screen",
            TransformOp::CanvasToGrid => "canvas_to_grid",
            TransformOp::GridToCanvas => "grid_to_canvas",
            TransformOp::GridCellBounds => "grid_cell_bounds",
            TransformOp::CanvasToWorkspace => "canvas_to_workspace",
            TransformOp::WorkspaceToCanvas => "workspace_to_canvas",
            TransformOp::ScreenToGrid => "screen_to_grid",
            TransformOp::GridToScreen => "grid_to_screen",
            TransformOp::ScreenToWorkspace => "screen_to_workspace",
            TransformOp::WorkspaceToScreen => "workspace_to_screen",
            TransformOp::GridToWorkspace => "grid_to_workspace",
            TransformOp::WorkspaceToGrid => "workspace_to_grid",
        }
    }

    /// Runs the conversion. Fails if `input` is in the wrong space.
    pub fn apply(
        self,
        system: &CoordinateSystem,
        input: &TransformInput,
    ) -> anyhow::Result<TransformOutput> {
        use TransformInput as In;
        use TransformOutput as Out;

        let output = match (self, *input) {
            (TransformOp::ScreenToCanvas, In::Screen(p)) => Out::Canvas(system.screen_to_canvas(p)),
            (TransformOp::CanvasToScreen, In::Canvas(p)) => Out::Screen(system.canvas_to_screen(p)),
            (TransformOp::CanvasToGrid, In::Canvas(p)) => Out::Grid(system.canvas_to_grid(p)),
            (TransformOp::GridToCanvas, In::Grid(g)) => Out::Canvas(system.grid_to_canvas(g)),
            (TransformOp::GridCellBounds, In::Grid(g)) => {
                Out::Bounds(system.grid_cell_to_canvas_bounds(g))
            }
            (TransformOp::CanvasToWorkspace, In::Canvas(p)) => {
                Out::Workspace(system.canvas_to_workspace(p))
            }
            (TransformOp::WorkspaceToCanvas, In::Workspace(p)) => {
                Out::Canvas(system.workspace_to_canvas(p))
            }
            (TransformOp::ScreenToGrid, In::Screen(p)) => Out::Grid(system.screen_to_grid(p)),
            (TransformOp::GridToScreen, In::Grid(g)) => Out::Screen(system.grid_to_screen(g)),
            (TransformOp::ScreenToWorkspace, In::Screen(p)) => {
                Out::Workspace(system.screen_to_workspace(p))
            }
            (TransformOp::WorkspaceToScreen, In::Workspace(p)) => {
                Out::Screen(system.workspace_to_screen(p))
            }
            (TransformOp::GridToWorkspace, In::Grid(g)) => {
                Out::Workspace(system.grid_to_workspace(g))
            }
            (TransformOp::WorkspaceToGrid, In::Workspace(p)) => {
                Out::Grid(system.workspace_to_grid(p))
            }
            (op, input) => bail!("{} cannot convert {input}", op.name()),
        };
        Ok(output)
    }
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
