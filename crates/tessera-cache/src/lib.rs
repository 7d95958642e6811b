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

//! # Tessera Cache
//!
//! Memoization for the rendering core: a generic LRU + TTL [`TransformCache`],
//! the single-flight [`TransformationManager`] that fronts coordinate
//! conversions, and the two-tier [`picture::PictureCache`].

#![warn(missing_docs)]

pub mod error;
pub mod manager;
pub mod ops;
pub mod picture;
pub mod recorder;
pub mod single_flight;
pub mod sweeper;
pub mod transform_cache;

pub use error::{CacheError, CacheResult};
pub use manager::{
    BatchTransformResult, TransformResult, TransformationManager, TransformationManagerConfig,
};
pub use ops::{TransformInput, TransformOp, TransformOutput};
pub use recorder::{LatencyPercentiles, LatencyRecorder};
pub use single_flight::KeyedLocks;
pub use sweeper::{CacheSweeper, Sweep};
pub use transform_cache::{TransformCache, TransformCacheConfig, TransformCacheMetrics};
