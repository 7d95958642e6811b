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

//! Coordinate spaces and the conversions between them.
//!
//! Four spaces are distinguished:
//!
//! * **screen**: physical device pixels, as delivered by input events;
//! * **canvas**: logical pixels of the drawing surface (`screen / dpr`);
//! * **grid**: integer cell indices of the puzzle board, affected by zoom and pan;
//! * **workspace**: an independently scaled continuum used for free dragging.

mod config;
mod points;
mod system;

pub use self::config::{clamp_zoom, CoordinateError, CoordinateSystemConfig, MAX_ZOOM, MIN_ZOOM};
pub use self::points::{CanvasPoint, GridPoint, GridRange, ScreenPoint, WorkspacePoint};
pub use self::system::{CoordinateSystem, DerivedTransforms};
