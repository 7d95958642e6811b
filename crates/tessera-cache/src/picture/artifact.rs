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

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A pre-rendered drawing artifact.
///
/// The pixel payload is shared, so clones are cheap and every tier hands out
/// the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
}

/// Bytes of the on-disk header preceding the payload.
pub(crate) const HEADER_LEN: usize = 8;

impl Picture {
    /// Wraps an encoded payload with its pixel dimensions.
    pub fn new(bytes: impl Into<Arc<[u8]>>, width: u32, height: u32) -> Self {
        Self {
            bytes: bytes.into(),
            width,
            height,
        }
    }

    /// The encoded payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes accounted against the memory budget.
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Serializes into the disk tier file format: little-endian width and
    /// height followed by the payload.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bytes.len());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    /// Parses the disk tier file format.
    pub(crate) fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        let (header, payload) = data.split_at(HEADER_LEN);
        let width = u32::from_le_bytes(header[0..4].try_into().ok()?);
        let height = u32::from_le_bytes(header[4..8].try_into().ok()?);
        Some(Self::new(payload.to_vec(), width, height))
    }
}

/// Eviction priority within the memory tier. Lower priorities go first.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum CachePriority {
    /// Speculative content such as warmed pictures.
    Low,
    /// Regular content.
    #[default]
    Normal,
    /// Content that should survive memory pressure as long as possible.
    High,
}

/// A failure while fetching or populating a picture.
#[derive(Debug, Error)]
pub enum PictureError {
    /// The load was cancelled cooperatively. Not a failure.
    #[error("picture load cancelled")]
    Cancelled,
    /// The loader failed.
    #[error("picture load failed: {0}")]
    Load(anyhow::Error),
    /// `get_or_load` was called on a cache without a loader.
    #[error("no picture loader configured")]
    NoLoader,
    /// A cache tier failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl PictureError {
    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PictureError::Cancelled)
    }
}

impl From<std::io::Error> for PictureError {
    fn from(err: std::io::Error) -> Self {
        PictureError::Cache(CacheError::Io(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_format_keeps_dimensions() {
        let picture = Picture::new(vec![1, 2, 3, 4], 64, 32);
        let decoded = Picture::decode(&picture.encode()).expect("well-formed");
        assert_eq!(decoded, picture);
        assert_eq!(decoded.size_bytes(), 4);
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        assert!(Picture::decode(&[0, 1, 2]).is_none());
    }

    #[test]
    fn test_priority_order() {
        assert!(CachePriority::Low < CachePriority::Normal);
        assert!(CachePriority::Normal < CachePriority::High);
    }
}
