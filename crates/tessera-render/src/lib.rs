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

//! # Tessera Render
//!
//! Frame-level control for the Tessera rendering core: the per-frame time
//! budget, the priority scheduler that decides which layer renders run, the
//! quality adapter that trades fidelity for frame rate, and the
//! [`RenderCoordinator`] that binds them to a set of layers.

#![warn(missing_docs)]

pub mod budget;
pub mod coordinator;
pub mod error;
pub mod quality;
pub mod scheduler;

pub use budget::{FrameBudgetConfig, FrameBudgetManager, FrameTiming};
pub use coordinator::{CoordinatorConfig, CoordinatorMetrics, QualityListener, RenderCoordinator};
pub use error::CoordinatorError;
pub use quality::{ChangeReason, QualityAdapter, QualityChange, QualityConfig, QualityStats};
pub use scheduler::{
    FrameRequest, LayerExecutor, LayerStats, RenderPriority, RenderScheduler, ScheduleOutcome,
    SchedulerConfig, TickReport,
};
