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

//! The contract every visual layer implements.
//!
//! The render coordinator only ever sees `dyn RenderLayer`; concrete layer
//! types (background, pieces, particles) live with the host application.

use crate::quality::{QualityLevel, QualitySettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The closed set of layer kinds a scene is composed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LayerType {
    /// The static background (board, grid lines, cached pictures).
    Static,
    /// Draggable pieces.
    Dynamic,
    /// Particles and other transient effects.
    Effects,
}

impl LayerType {
    /// All layer kinds, in compositing order (bottom to top).
    pub const ALL: [LayerType; 3] = [LayerType::Static, LayerType::Dynamic, LayerType::Effects];

    /// Fixed scheduling rank; higher ranks render first when request
    /// priorities are equal (`Dynamic > Effects > Static`).
    pub const fn scheduling_rank(self) -> u8 {
        match self {
            LayerType::Dynamic => 2,
            LayerType::Effects => 1,
            LayerType::Static => 0,
        }
    }

    /// Lower-case name, also used as the layer's task name in the frame budget.
    pub const fn name(self) -> &'static str {
        match self {
            LayerType::Static => "static",
            LayerType::Dynamic => "dynamic",
            LayerType::Effects => "effects",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A structured message delivered to layers through the message bus.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerMessage {
    /// The global quality level changed.
    QualityChanged {
        /// The new level.
        level: QualityLevel,
        /// Parameters derived from the new level.
        settings: QualitySettings,
    },
    /// The coordinate configuration was replaced; cached placements are stale.
    ViewChanged {
        /// Generation of the new configuration.
        generation: u64,
    },
    /// The receiver should drop any cached drawing and redraw next frame.
    Invalidate,
    /// An application-defined message.
    Custom {
        /// Routing topic.
        topic: String,
        /// Free-form payload.
        payload: String,
    },
}

impl LayerMessage {
    /// Builds a quality change message with derived settings.
    pub fn quality_changed(level: QualityLevel) -> Self {
        LayerMessage::QualityChanged {
            level,
            settings: level.settings(),
        }
    }
}

/// Per-frame information handed to [`RenderLayer::render`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Monotonic frame counter.
    pub frame_number: u64,
    /// The quality level in force for this frame.
    pub quality: QualityLevel,
    /// The layer's share of the frame budget. Advisory only.
    pub budget: Duration,
}

/// A visual layer driven by the render coordinator.
///
/// `render` draws onto an external surface owned by the implementor; it may
/// fail, in which case the coordinator logs the error and keeps rendering the
/// other layers.
pub trait RenderLayer: Send {
    /// Which slot of the scene this layer occupies.
    fn layer_type(&self) -> LayerType;

    /// Draws the layer.
    fn render(&mut self, frame: &FrameContext) -> anyhow::Result<()>;

    /// Adjusts the level of detail for subsequent frames.
    fn update_quality(&mut self, level: QualityLevel);

    /// Handles a message from the bus.
    fn handle_message(&mut self, message: &LayerMessage);

    /// Whether the layer wants to be redrawn. Polled by the coordinator.
    fn needs_update(&self) -> bool {
        false
    }
}
