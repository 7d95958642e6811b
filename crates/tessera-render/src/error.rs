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

//! Errors raised by the render coordinator.

use std::io;
use tessera_core::LayerType;
use thiserror::Error;

/// Errors raised by [`crate::RenderCoordinator`].
///
/// Scheduling outcomes (a stale request dropped, a layer skipped for lack of
/// budget) are not errors and never surface here.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A layer of this type is already registered.
    #[error("a {0} layer is already registered")]
    LayerAlreadyRegistered(LayerType),
    /// No layer of this type is registered.
    #[error("no {0} layer is registered")]
    LayerNotRegistered(LayerType),
    /// The coordinator has been disposed.
    #[error("the render coordinator has been disposed")]
    Disposed,
    /// The frame loop thread could not be spawned.
    #[error("failed to spawn the frame loop: {0}")]
    Spawn(#[from] io::Error),
    /// Directed delivery on the layer bus failed.
    #[error(transparent)]
    Bus(#[from] tessera_core::event::BusError),
}
