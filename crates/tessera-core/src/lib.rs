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

//! # Tessera Core
//!
//! Foundational crate containing the value types and interface contracts shared by
//! the caching and rendering crates: coordinate spaces, quality tiers, the layer
//! contract, the message bus, clocks and rolling statistics.

#![warn(missing_docs)]

pub mod animation;
pub mod coords;
pub mod event;
pub mod layer;
pub mod math;
pub mod quality;
pub mod stats;
pub mod time;

pub use coords::{
    CanvasPoint, CoordinateSystem, CoordinateSystemConfig, GridPoint, ScreenPoint, WorkspacePoint,
};
pub use layer::{LayerMessage, LayerType, RenderLayer};
pub use quality::{QualityLevel, QualitySettings};
pub use time::{Clock, ManualClock, Stopwatch, SystemClock};
