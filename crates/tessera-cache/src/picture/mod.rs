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

//! Caching of pre-rendered pictures across a memory and a disk tier.
//!
//! Population goes through a [`PictureLoader`] with cooperative cancellation;
//! a [`WarmingPattern`] drives predictive prefetching.

mod artifact;
mod cache;
pub mod disk;
mod lifecycle;
mod loader;
mod memory;
mod metrics;
pub mod warming;

pub use self::artifact::{CachePriority, Picture, PictureError};
pub use self::cache::{PictureCache, PictureCacheConfig, WarmerHandle};
pub use self::disk::{DiskManifest, DiskTier, ManifestEntry};
pub use self::lifecycle::AppLifecycle;
pub use self::loader::{CancellationToken, PictureLoader};
pub use self::metrics::{
    PictureCacheMetrics, TierStats, TARGET_HIT_RATE, TARGET_LOOKUP_LATENCY, TARGET_RESIDENT_BYTES,
};
pub use self::warming::{
    FrequencyPattern, ScheduledPattern, SequentialPattern, WarmReport, WarmingContext,
    WarmingPattern,
};
