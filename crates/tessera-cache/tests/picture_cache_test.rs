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

//! Integration tests for the two-tier picture cache.
//!
//! These exercise eviction, disk spill and promotion, loader cancellation,
//! warming and lifecycle handling through the public API only.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_cache::picture::{
    AppLifecycle, CachePriority, CancellationToken, FrequencyPattern, Picture, PictureCache,
    PictureCacheConfig, PictureError, PictureLoader, SequentialPattern,
};

fn picture(tag: u8) -> Picture {
    Picture::new(vec![tag; 32], 8, 4)
}

/// Serves `picture(n)` for ids of the form `p<n>`, nothing for anything else.
#[derive(Default)]
struct CatalogLoader {
    calls: AtomicUsize,
    missing: HashSet<String>,
}

#[async_trait]
impl PictureLoader for CatalogLoader {
    async fn load(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Option<Picture>, PictureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        token.check()?;
        if self.missing.contains(id) {
            return Ok(None);
        }
        let tag = id
            .trim_start_matches('p')
            .parse::<u8>()
            .map_err(|e| PictureError::Load(e.into()))?;
        tokio::task::yield_now().await;
        token.check()?;
        Ok(Some(picture(tag)))
    }
}

/// Waits until cancelled, then reports cancellation.
struct StallingLoader;

#[async_trait]
impl PictureLoader for StallingLoader {
    async fn load(
        &self,
        _id: &str,
        token: &CancellationToken,
    ) -> Result<Option<Picture>, PictureError> {
        token.cancelled().await;
        Err(PictureError::Cancelled)
    }
}

/// Finishes the load but the caller cancels right before it returns.
struct LateLoader {
    token: CancellationToken,
}

#[async_trait]
impl PictureLoader for LateLoader {
    async fn load(
        &self,
        _id: &str,
        _token: &CancellationToken,
    ) -> Result<Option<Picture>, PictureError> {
        self.token.cancel();
        Ok(Some(picture(1)))
    }
}

async fn memory_cache(max_entries: usize) -> PictureCache {
    PictureCache::open(PictureCacheConfig {
        max_memory_entries: max_entries,
        ..PictureCacheConfig::default()
    })
    .await
    .expect("memory-only cache opens")
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory tier
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_entry_budget_evicts_oldest() {
    let cache = memory_cache(2).await;
    cache.put("a", picture(1), CachePriority::Normal);
    cache.put("b", picture(2), CachePriority::Normal);
    cache.put("c", picture(3), CachePriority::Normal);

    assert_eq!(cache.get("a").await.expect("get a"), None);
    assert_eq!(cache.get("b").await.expect("get b"), Some(picture(2)));
    assert_eq!(cache.get("c").await.expect("get c"), Some(picture(3)));

    let metrics = cache.metrics();
    assert_eq!(metrics.hits, 2);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.puts, 3);
    assert_eq!(metrics.evictions, 1);
    assert_eq!(metrics.memory.hits, 2);
}

#[tokio::test]
async fn test_byte_budget_is_respected() {
    let cache = PictureCache::open(PictureCacheConfig {
        max_memory_bytes: 100,
        ..PictureCacheConfig::default()
    })
    .await
    .expect("open");

    for tag in 0..5 {
        cache.put(format!("p{tag}"), picture(tag), CachePriority::Normal);
    }
    let metrics = cache.metrics();
    assert!(metrics.resident_bytes <= 100);
    assert_eq!(metrics.memory_entries, 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Disk tier
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_evicted_pictures_spill_and_promote() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = PictureCache::open(PictureCacheConfig {
        max_memory_entries: 1,
        disk_dir: Some(dir.path().to_path_buf()),
        ..PictureCacheConfig::default()
    })
    .await
    .expect("open");

    cache.put("a", picture(1), CachePriority::Normal);
    cache.put("b", picture(2), CachePriority::Normal);
    cache.flush().await.expect("flush");
    assert_eq!(cache.metrics().disk_entries, 1);

    // Promoting "a" pushes "b" out of memory and onto disk.
    assert_eq!(cache.get("a").await.expect("get a"), Some(picture(1)));
    cache.flush().await.expect("flush");
    let metrics = cache.metrics();
    assert_eq!(metrics.disk.hits, 1);
    assert_eq!(metrics.memory_entries, 1);
    assert_eq!(metrics.disk_entries, 2);
    assert!(cache.contains("b").await);
}

#[tokio::test]
async fn test_lookup_never_serves_an_older_disk_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PictureCacheConfig {
        max_memory_entries: 1,
        disk_dir: Some(dir.path().to_path_buf()),
        ..PictureCacheConfig::default()
    };
    let cache = PictureCache::open(config.clone()).await.expect("open");

    cache.put("a", picture(1), CachePriority::Normal);
    cache.put("b", picture(2), CachePriority::Normal);
    cache.flush().await.expect("flush");

    // The newer "a" is evicted again before its disk write has run.
    cache.put("a", picture(11), CachePriority::Normal);
    cache.put("c", picture(3), CachePriority::Normal);
    assert_eq!(cache.get("a").await.expect("get a"), Some(picture(11)));

    cache.flush().await.expect("flush");
    assert_eq!(cache.get("a").await.expect("get a"), Some(picture(11)));
    drop(cache);

    let reopened = PictureCache::open(config).await.expect("reopen");
    assert_eq!(reopened.get("a").await.expect("get a"), Some(picture(11)));
}

#[tokio::test]
async fn test_oversized_put_is_rejected_and_drops_older_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = PictureCache::open(PictureCacheConfig {
        max_memory_bytes: 40,
        disk_dir: Some(dir.path().to_path_buf()),
        ..PictureCacheConfig::default()
    })
    .await
    .expect("open");

    cache.put("a", picture(1), CachePriority::Normal);
    cache.put("b", picture(2), CachePriority::Normal);
    cache.flush().await.expect("flush");
    assert!(cache.contains("a").await);

    cache.put("a", Picture::new(vec![5u8; 64], 8, 8), CachePriority::High);
    let metrics = cache.metrics();
    assert_eq!(metrics.puts, 2);
    assert_eq!(metrics.rejected_puts, 1);
    assert_eq!(metrics.evictions, 1);

    assert_eq!(cache.get("a").await.expect("get a"), None);
    cache.flush().await.expect("flush");
    assert!(!cache.contains("a").await);
    assert_eq!(cache.metrics().disk_entries, 0);
}

#[tokio::test]
async fn test_disk_tier_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PictureCacheConfig {
        max_memory_entries: 1,
        disk_dir: Some(dir.path().to_path_buf()),
        ..PictureCacheConfig::default()
    };
    {
        let cache = PictureCache::open(config.clone()).await.expect("open");
        cache.put("a", picture(7), CachePriority::Normal);
        cache.put("b", picture(8), CachePriority::Normal);
        cache.flush().await.expect("flush");
    }

    let reopened = PictureCache::open(config).await.expect("reopen");
    assert_eq!(reopened.get("a").await.expect("get"), Some(picture(7)));
}

#[tokio::test]
async fn test_detached_clears_every_tier() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = PictureCache::open(PictureCacheConfig {
        max_memory_entries: 1,
        disk_dir: Some(dir.path().to_path_buf()),
        ..PictureCacheConfig::default()
    })
    .await
    .expect("open");
    cache.put("a", picture(1), CachePriority::Normal);
    cache.put("b", picture(2), CachePriority::Normal);
    cache.flush().await.expect("flush");

    cache
        .handle_lifecycle(AppLifecycle::Detached)
        .await
        .expect("detach");

    assert!(!cache.contains("a").await);
    assert!(!cache.contains("b").await);
    assert_eq!(cache.metrics().disk_entries, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Loader and cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_or_load_populates_once() {
    let loader = Arc::new(CatalogLoader::default());
    let cache = memory_cache(10).await.with_loader(loader.clone());
    let token = CancellationToken::new();

    let first = cache
        .get_or_load("p5", CachePriority::Normal, &token)
        .await
        .expect("load");
    let second = cache
        .get_or_load("p5", CachePriority::Normal, &token)
        .await
        .expect("hit");

    assert_eq!(first, Some(picture(5)));
    assert_eq!(second, first);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_artifact_is_not_an_error() {
    let loader = CatalogLoader {
        missing: HashSet::from(["p9".to_string()]),
        ..CatalogLoader::default()
    };
    let cache = memory_cache(10).await.with_loader(Arc::new(loader));
    let result = cache
        .get_or_load("p9", CachePriority::Normal, &CancellationToken::new())
        .await
        .expect("none is not an error");
    assert_eq!(result, None);
    assert_eq!(cache.metrics().errors, 0);
}

#[tokio::test]
async fn test_load_failure_is_counted() {
    let cache = memory_cache(10)
        .await
        .with_loader(Arc::new(CatalogLoader::default()));
    let result = cache
        .get_or_load("not-a-number", CachePriority::Normal, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(PictureError::Load(_))));
    assert_eq!(cache.metrics().errors, 1);
}

#[tokio::test]
async fn test_cancelled_load_stores_nothing() {
    let cache = memory_cache(10).await.with_loader(Arc::new(StallingLoader));
    let token = CancellationToken::new();

    let pending = {
        let cache = cache.clone();
        let token = token.clone();
        tokio::spawn(async move {
            cache
                .get_or_load("slow", CachePriority::Normal, &token)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let result = pending.await.expect("task joins");
    assert!(matches!(result, Err(PictureError::Cancelled)));
    assert!(!cache.contains("slow").await);
    assert_eq!(cache.metrics().errors, 0);
}

#[tokio::test]
async fn test_result_after_cancellation_is_discarded() {
    let token = CancellationToken::new();
    let cache = memory_cache(10).await.with_loader(Arc::new(LateLoader {
        token: token.clone(),
    }));

    let result = cache.get_or_load("late", CachePriority::Normal, &token).await;
    assert!(result.as_ref().is_err_and(PictureError::is_cancelled));
    assert!(!cache.contains("late").await);
}

// ─────────────────────────────────────────────────────────────────────────────
// Warming and lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sequential_warming_skips_cached() {
    let loader = Arc::new(CatalogLoader::default());
    let cache = memory_cache(10).await.with_loader(loader.clone());
    let token = CancellationToken::new();
    cache.put("p2", picture(2), CachePriority::Normal);
    cache.get("p1").await.expect("record a request");

    let catalog = (1..=6).map(|n| format!("p{n}")).collect();
    let report = cache
        .warm(&SequentialPattern::new(catalog, 3), &token)
        .await;

    assert_eq!(report.candidates, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.loaded, 2);
    assert!(cache.contains("p3").await && cache.contains("p4").await);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_warming_respects_max_count() {
    let cache = PictureCache::open(PictureCacheConfig {
        max_warm_count: 2,
        ..PictureCacheConfig::default()
    })
    .await
    .expect("open")
    .with_loader(Arc::new(CatalogLoader::default()));

    let catalog = (1..=6).map(|n| format!("p{n}")).collect();
    let report = cache
        .warm(&SequentialPattern::new(catalog, 6), &CancellationToken::new())
        .await;
    assert_eq!(report.loaded, 2);
}

#[tokio::test]
async fn test_frequency_warming_uses_usage_stats() {
    let cache = memory_cache(10)
        .await
        .with_loader(Arc::new(CatalogLoader::default()));
    for _ in 0..3 {
        cache.get("p7").await.expect("miss");
    }
    cache.get("p8").await.expect("miss");

    let report = cache
        .warm(&FrequencyPattern::new(5, 2), &CancellationToken::new())
        .await;
    assert_eq!(report.loaded, 1);
    assert!(cache.contains("p7").await);
    assert!(!cache.contains("p8").await);
}

#[tokio::test]
async fn test_pause_and_resume_toggle_warming() {
    let cache = memory_cache(10).await;
    cache
        .handle_lifecycle(AppLifecycle::Paused)
        .await
        .expect("pause");
    assert!(cache.is_warming_suspended());
    cache
        .handle_lifecycle(AppLifecycle::Resumed)
        .await
        .expect("resume");
    assert!(!cache.is_warming_suspended());
}

#[tokio::test]
async fn test_background_warmer_prefetches() {
    let cache = PictureCache::open(PictureCacheConfig {
        warm_interval_ms: 10,
        ..PictureCacheConfig::default()
    })
    .await
    .expect("open")
    .with_loader(Arc::new(CatalogLoader::default()));

    let pattern = Arc::new(SequentialPattern::new(vec!["p1".into(), "p2".into()], 2));
    let warmer = cache.spawn_warmer(pattern).expect("runtime available");

    let mut warmed = false;
    for _ in 0..100 {
        if cache.contains("p1").await && cache.contains("p2").await {
            warmed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    warmer.stop().await;
    assert!(warmed, "warmer should prefetch the catalog");
}
