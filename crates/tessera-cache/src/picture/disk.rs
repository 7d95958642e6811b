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

//! The persistent picture tier and its manifest.

use super::artifact::Picture;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File name of the manifest inside the cache directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Index record for one persisted picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// File name relative to the cache directory.
    pub filename: String,
    /// Size of the file on disk.
    pub size_bytes: u64,
    /// When the picture was first written.
    pub created: DateTime<Utc>,
    /// When the picture was last read or rewritten.
    pub last_accessed: DateTime<Utc>,
    /// Number of reads served.
    pub access_count: u64,
}

/// The disk tier index, keyed by picture identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskManifest {
    /// Persisted entries.
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl DiskManifest {
    /// Parses a manifest from JSON.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the manifest to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a manifest, yielding an empty one if the file does not exist.
    pub async fn load(path: &Path) -> Result<Self, CacheError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Self::from_json(&json),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the manifest atomically (temporary file, then rename).
    pub async fn save(&self, path: &Path) -> Result<(), CacheError> {
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, self.to_json()?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Sum of all entry sizes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }

    /// Identifier of the least recently accessed entry.
    fn least_recent(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(id, _)| id.clone())
    }
}

/// Maps an identifier to a file name that is safe on every platform.
fn file_name_for(id: &str) -> String {
    let mut name = String::with_capacity(id.len() * 2 + 4);
    for byte in id.bytes() {
        name.push_str(&format!("{byte:02x}"));
    }
    name.push_str(".pic");
    name
}

/// The persistent tier: one file per picture plus a JSON manifest.
#[derive(Debug)]
pub struct DiskTier {
    dir: PathBuf,
    max_bytes: u64,
    manifest: DiskManifest,
}

impl DiskTier {
    /// Opens (creating if needed) a tier rooted at `dir`.
    ///
    /// Manifest entries whose file has disappeared are dropped.
    pub async fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let manifest = DiskManifest::load(&dir.join(MANIFEST_FILE)).await?;
        let mut tier = Self {
            dir,
            max_bytes,
            manifest,
        };
        let orphans = tier.remove_orphans().await?;
        if orphans > 0 {
            log::warn!("Disk cache: dropped {orphans} manifest entries with missing files.");
            tier.save_manifest().await?;
        }
        log::debug!(
            "Disk cache opened at {} ({} entries, {} bytes).",
            tier.dir.display(),
            tier.len(),
            tier.total_bytes()
        );
        Ok(tier)
    }

    async fn remove_orphans(&mut self) -> Result<usize, CacheError> {
        let mut missing = Vec::new();
        for (id, entry) in &self.manifest.entries {
            if !tokio::fs::try_exists(self.dir.join(&entry.filename)).await? {
                missing.push(id.clone());
            }
        }
        for id in &missing {
            self.manifest.entries.remove(id);
        }
        Ok(missing.len())
    }

    /// Persists the manifest.
    pub async fn save_manifest(&self) -> Result<(), CacheError> {
        self.manifest.save(&self.dir.join(MANIFEST_FILE)).await
    }

    /// Reads a picture, updating its access metadata.
    ///
    /// A file that vanished underneath the manifest counts as a miss.
    pub async fn read(&mut self, id: &str) -> Result<Option<Picture>, CacheError> {
        let Some(entry) = self.manifest.entries.get(id) else {
            return Ok(None);
        };
        let path = self.dir.join(&entry.filename);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!("Disk cache: file for '{id}' is missing, dropping entry.");
                self.manifest.entries.remove(id);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let Some(picture) = Picture::decode(&data) else {
            log::warn!("Disk cache: file for '{id}' is corrupt, dropping entry.");
            self.remove(id).await?;
            return Ok(None);
        };

        if let Some(entry) = self.manifest.entries.get_mut(id) {
            entry.last_accessed = Utc::now();
            entry.access_count += 1;
        }
        Ok(Some(picture))
    }

    /// Writes a picture, evicting least recently accessed files until it fits.
    ///
    /// Only the in-memory manifest is updated; call [`Self::save_manifest`]
    /// once a batch of writes is done. Returns `false` if the picture is
    /// larger than the whole tier; an older copy is dropped in that case.
    pub async fn write(&mut self, id: &str, picture: &Picture) -> Result<bool, CacheError> {
        let data = picture.encode();
        let size = data.len() as u64;
        if size > self.max_bytes {
            log::debug!("Disk cache: '{id}' ({size} bytes) exceeds the tier budget.");
            self.remove(id).await?;
            return Ok(false);
        }

        let previous = self.manifest.entries.remove(id);
        while self.manifest.total_bytes() + size > self.max_bytes {
            let Some(victim) = self.manifest.least_recent() else {
                break;
            };
            log::trace!("Disk cache: evicting '{victim}'.");
            self.remove(&victim).await?;
        }

        let filename = file_name_for(id);
        tokio::fs::write(self.dir.join(&filename), &data).await?;

        let now = Utc::now();
        let entry = match previous {
            Some(prev) => ManifestEntry {
                filename,
                size_bytes: size,
                last_accessed: now,
                ..prev
            },
            None => ManifestEntry {
                filename,
                size_bytes: size,
                created: now,
                last_accessed: now,
                access_count: 0,
            },
        };
        self.manifest.entries.insert(id.to_owned(), entry);
        Ok(true)
    }

    /// Removes a picture's file and manifest entry.
    pub async fn remove(&mut self, id: &str) -> Result<bool, CacheError> {
        let Some(entry) = self.manifest.entries.remove(id) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(self.dir.join(&entry.filename)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes every file and empties the manifest.
    pub async fn clear(&mut self) -> Result<(), CacheError> {
        let ids: Vec<String> = self.manifest.entries.keys().cloned().collect();
        for id in ids {
            self.remove(&id).await?;
        }
        self.save_manifest().await
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: &str) -> bool {
        self.manifest.entries.contains_key(id)
    }

    /// Number of indexed pictures.
    pub fn len(&self) -> usize {
        self.manifest.entries.len()
    }

    /// Whether the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.manifest.entries.is_empty()
    }

    /// Bytes used on disk.
    pub fn total_bytes(&self) -> u64 {
        self.manifest.total_bytes()
    }

    /// The in-memory view of the manifest.
    pub fn manifest(&self) -> &DiskManifest {
        &self.manifest
    }

    /// Root directory of the tier.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
