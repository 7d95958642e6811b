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

// Tessera Sandbox
// Headless demo: a puzzle board, its pieces and a spark effect driven by
// the render coordinator, with cached conversions and pictures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tessera_cache::picture::{
    CachePriority, CancellationToken, Picture, PictureCache, PictureCacheConfig, PictureError,
    PictureLoader, SequentialPattern,
};
use tessera_cache::{
    TransformCacheConfig, TransformInput, TransformOp, TransformationManager,
    TransformationManagerConfig,
};
use tessera_core::animation::{Easing, Tween};
use tessera_core::coords::{
    CanvasPoint, CoordinateSystem, CoordinateSystemConfig, GridPoint, ScreenPoint,
};
use tessera_core::layer::FrameContext;
use tessera_core::{LayerMessage, LayerType, QualityLevel, RenderLayer};
use tessera_render::{CoordinatorConfig, FrameRequest, RenderCoordinator, RenderPriority};

const GRID_SIZE: u32 = 8;
const DEMO_FRAMES: u64 = 90;

/// Draws the board once, and again whenever the view changes.
struct BoardLayer {
    system: Arc<CoordinateSystem>,
    dirty: Arc<AtomicBool>,
}

impl RenderLayer for BoardLayer {
    fn layer_type(&self) -> LayerType {
        LayerType::Static
    }

    fn render(&mut self, frame: &FrameContext) -> Result<()> {
        let cells = self
            .system
            .visible_grid_bounds()
            .map(|range| range.cell_count())
            .unwrap_or(0);
        log::debug!("[board] frame {}: {cells} visible cells.", frame.frame_number);
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn update_quality(&mut self, level: QualityLevel) {
        log::debug!("[board] shadows {}", level.settings().shadows_enabled);
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn handle_message(&mut self, message: &LayerMessage) {
        if matches!(message, LayerMessage::ViewChanged { .. } | LayerMessage::Invalidate) {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    fn needs_update(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}

/// Slides a piece into place.
struct PiecesLayer {
    slide: Tween<f64>,
}

impl RenderLayer for PiecesLayer {
    fn layer_type(&self) -> LayerType {
        LayerType::Dynamic
    }

    fn render(&mut self, _frame: &FrameContext) -> Result<()> {
        let x = self.slide.advance(Duration::from_millis(16));
        log::trace!("[pieces] piece at x = {x:.1}");
        Ok(())
    }

    fn update_quality(&mut self, _level: QualityLevel) {}

    fn handle_message(&mut self, message: &LayerMessage) {
        if let LayerMessage::Custom { topic, payload } = message {
            log::info!("[pieces] {topic}: {payload}");
        }
    }

    fn needs_update(&self) -> bool {
        !self.slide.is_finished()
    }
}

/// Sparks whose cost grows with the particle budget.
struct SparkLayer {
    particles: u32,
}

impl RenderLayer for SparkLayer {
    fn layer_type(&self) -> LayerType {
        LayerType::Effects
    }

    fn render(&mut self, _frame: &FrameContext) -> Result<()> {
        thread::sleep(Duration::from_micros(u64::from(self.particles) * 20));
        Ok(())
    }

    fn update_quality(&mut self, level: QualityLevel) {
        self.particles = level.settings().max_particles;
    }

    fn handle_message(&mut self, _message: &LayerMessage) {}

    fn needs_update(&self) -> bool {
        true
    }
}

/// Renders flat-colour tiles for ids of the form `tile-<n>`.
struct TileLoader;

#[async_trait]
impl PictureLoader for TileLoader {
    async fn load(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Option<Picture>, PictureError> {
        token.check()?;
        let Some(shade) = id.strip_prefix("tile-").and_then(|n| n.parse::<u8>().ok()) else {
            return Ok(None);
        };
        tokio::task::yield_now().await;
        token.check()?;
        Ok(Some(Picture::new(vec![shade; 64 * 64 * 4], 64, 64)))
    }
}

async fn run_conversions(system: CoordinateSystem) -> Result<()> {
    let manager = TransformationManager::new(
        system,
        TransformCacheConfig::default(),
        TransformationManagerConfig::default(),
    );
    let _sweeper = manager.spawn_sweeper()?;

    let tap = TransformInput::Screen(ScreenPoint::new(100.0, 100.0));
    let first = manager.convert(TransformOp::ScreenToGrid, tap).await?;
    let again = manager.convert(TransformOp::ScreenToGrid, tap).await?;
    log::info!(
        "Tap at screen (100, 100) -> {:?} (cached on repeat: {})",
        first.value,
        again.cache_hit
    );

    let cells: Vec<TransformInput> = (0..GRID_SIZE as i32)
        .flat_map(|y| {
            (0..GRID_SIZE as i32).map(move |x| TransformInput::Grid(GridPoint::new(x, y)))
        })
        .collect();
    let batch = manager.convert_batch(TransformOp::GridToCanvas, &cells).await?;
    log::info!(
        "Placed {} cells ({} cached, {:?}).",
        batch.len(),
        batch.hits,
        batch.total_latency
    );

    manager.update_view(|system| system.apply_zoom(1.5, CanvasPoint::new(200.0, 200.0)))?;
    let after_zoom = manager.convert(TransformOp::ScreenToGrid, tap).await?;
    log::info!("After zooming, the same tap -> {:?}", after_zoom.value);

    let metrics = manager.cache_metrics();
    log::info!(
        "Transform cache: {} entries, hit rate {:.2}, target met: {}",
        metrics.size,
        metrics.hit_rate,
        metrics.meets_target()
    );
    if let Some(latency) = manager.latency_percentiles(TransformOp::ScreenToGrid.name()) {
        log::info!(
            "screen_to_grid latency p50 {:.3}ms p95 {:.3}ms p99 {:.3}ms",
            latency.p50_ms,
            latency.p95_ms,
            latency.p99_ms
        );
    }
    Ok(())
}

async fn run_pictures() -> Result<()> {
    let config = PictureCacheConfig {
        disk_dir: Some(std::env::temp_dir().join("tessera-sandbox-pictures")),
        max_memory_entries: 4,
        ..PictureCacheConfig::default()
    };
    let cache = PictureCache::open(config)
        .await?
        .with_loader(Arc::new(TileLoader));
    let token = CancellationToken::new();

    for n in 0..6 {
        cache
            .get_or_load(&format!("tile-{n}"), CachePriority::Normal, &token)
            .await?;
    }
    let catalog = (0..12).map(|n| format!("tile-{n}")).collect();
    let report = cache.warm(&SequentialPattern::new(catalog, 3), &token).await;
    log::info!("Warmed {} tiles ({} already cached).", report.loaded, report.skipped);

    // Tiles evicted from memory are served back from disk.
    let _ = cache.get("tile-0").await?;
    cache.flush().await?;

    let metrics = cache.metrics();
    log::info!(
        "Picture cache: hit rate {:.2}, {} in memory, {} on disk, target met: {}",
        metrics.hit_rate,
        metrics.memory_entries,
        metrics.disk_entries,
        metrics.meets_performance_target()
    );
    Ok(())
}

fn run_frames(system: Arc<CoordinateSystem>) -> Result<()> {
    let coordinator = RenderCoordinator::new(CoordinatorConfig::default());
    coordinator.register_layer(Box::new(BoardLayer {
        system,
        dirty: Arc::new(AtomicBool::new(true)),
    }))?;
    coordinator.register_layer(Box::new(PiecesLayer {
        slide: Tween::new(0.0, 350.0, Duration::from_millis(600), Easing::EaseInOutQuad),
    }))?;
    coordinator.register_layer(Box::new(SparkLayer { particles: 0 }))?;
    // Sparks are the heavy layer until measured otherwise.
    coordinator.declare_layer_cost(LayerType::Effects, Duration::from_millis(4))?;
    coordinator.add_quality_listener(|change| {
        log::info!("Quality listener: {} -> {} ({})", change.from, change.to, change.reason);
    });

    coordinator.schedule_frame(
        FrameRequest::new([LayerType::Static]).with_priority(RenderPriority::Immediate),
    )?;
    coordinator.start()?;
    coordinator.send_message(
        LayerType::Dynamic,
        LayerMessage::Custom {
            topic: "piece-picked".into(),
            payload: "corner".into(),
        },
    )?;

    while coordinator.metrics().frame_count < DEMO_FRAMES {
        thread::sleep(Duration::from_millis(50));
    }
    coordinator.dispose();

    let metrics = coordinator.metrics();
    log::info!(
        "Rendered {} frames ({} dropped) at {:.1} fps, quality {}.",
        metrics.frame_count,
        metrics.dropped_frames,
        metrics.fps,
        metrics.quality
    );
    for stats in metrics.layer_stats {
        log::info!(
            "  {} layer: {} renders, {:?} average",
            stats.layer,
            stats.renders,
            stats.average_render_time
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = CoordinateSystemConfig {
        device_pixel_ratio: 2.0,
        grid_width: GRID_SIZE,
        grid_height: GRID_SIZE,
        ..CoordinateSystemConfig::default()
    };
    let system = CoordinateSystem::new(config)?;

    run_conversions(system.clone()).await?;
    run_pictures().await?;
    tokio::task::spawn_blocking(move || run_frames(Arc::new(system))).await??;
    Ok(())
}
