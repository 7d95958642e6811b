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

//! Error types surfaced by the caching layers.

use tessera_core::coords::CoordinateError;
use thiserror::Error;

/// A failure in a cache operation or in the computation it memoizes.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The invalidation pattern is not a valid regular expression.
    #[error("invalid invalidation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    /// Reading or writing the persistent tier failed.
    #[error("cache I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// The disk manifest could not be (de)serialized.
    #[error("manifest serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The replacement coordinate configuration was rejected.
    #[error("invalid coordinate configuration: {0}")]
    InvalidConfig(#[from] CoordinateError),
    /// The memoized computation itself failed.
    #[error("transform computation failed: {0}")]
    Compute(anyhow::Error),
    /// A spawned task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(err.to_string())
    }
}

/// Convenience alias for cache results.
pub type CacheResult<T> = Result<T, CacheError>;
