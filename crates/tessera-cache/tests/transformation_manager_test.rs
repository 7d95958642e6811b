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

//! Integration tests for typed conversions through the transformation manager.

use approx::assert_relative_eq;
use std::sync::Arc;
use std::time::Duration;
use tessera_cache::{
    TransformCacheConfig, TransformInput, TransformOp, TransformOutput, TransformationManager,
    TransformationManagerConfig,
};
use tessera_core::coords::{
    CanvasPoint, CoordinateSystem, CoordinateSystemConfig, GridPoint, ScreenPoint,
};
use tessera_core::time::ManualClock;

fn retina_manager() -> TransformationManager {
    let config = CoordinateSystemConfig {
        device_pixel_ratio: 2.0,
        ..CoordinateSystemConfig::default()
    };
    TransformationManager::new(
        CoordinateSystem::new(config).expect("valid config"),
        TransformCacheConfig::default(),
        TransformationManagerConfig::default(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_screen_to_grid_through_cache() {
    let manager = retina_manager();
    let input = TransformInput::Screen(ScreenPoint::new(100.0, 100.0));

    let miss = manager
        .convert(TransformOp::ScreenToGrid, input)
        .await
        .expect("convert");
    assert_eq!(miss.value, TransformOutput::Grid(Some(GridPoint::new(1, 1))));
    assert!(!miss.cache_hit);

    let hit = manager
        .convert(TransformOp::ScreenToGrid, input)
        .await
        .expect("convert");
    assert!(hit.cache_hit);
    assert_eq!(hit.value, miss.value);
}

#[tokio::test]
async fn test_out_of_grid_is_a_cached_none() {
    let manager = retina_manager();
    let input = TransformInput::Canvas(CanvasPoint::new(-1.0, 10.0));
    let result = manager
        .convert(TransformOp::CanvasToGrid, input)
        .await
        .expect("partial conversion is not an error");
    assert_eq!(result.value, TransformOutput::Grid(None));
    assert_eq!(manager.cache_metrics().size, 1);
}

#[tokio::test]
async fn test_wrong_input_space_is_compute_error() {
    let manager = retina_manager();
    let result = manager
        .convert(
            TransformOp::GridToCanvas,
            TransformInput::Canvas(CanvasPoint::new(1.0, 1.0)),
        )
        .await;
    assert!(matches!(result, Err(tessera_cache::CacheError::Compute(_))));
    assert_eq!(manager.in_flight(), 0);
}

#[tokio::test]
async fn test_convert_batch_keeps_order() {
    let manager = retina_manager();
    let inputs: Vec<TransformInput> = (0..8)
        .map(|i| TransformInput::Grid(GridPoint::new(i, 7 - i)))
        .collect();

    let batch = manager
        .convert_batch(TransformOp::GridToCanvas, &inputs)
        .await
        .expect("batch");
    for (i, value) in batch.results.iter().enumerate() {
        let expected = CanvasPoint::new(i as f64 * 50.0 + 25.0, (7 - i) as f64 * 50.0 + 25.0);
        assert_eq!(*value, TransformOutput::Canvas(expected));
    }
    assert_eq!(batch.misses, 8);
}

// ─────────────────────────────────────────────────────────────────────────────
// View changes and freshness
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_zoom_invalidates_cached_conversions() {
    let manager = retina_manager();
    let cell = TransformInput::Grid(GridPoint::new(0, 0));
    manager
        .convert(TransformOp::GridToCanvas, cell)
        .await
        .expect("convert");

    let changed = manager
        .update_view(|system| system.apply_zoom(2.0, CanvasPoint::ORIGIN))
        .expect("view update");
    assert!(changed);
    assert_eq!(manager.cache_metrics().size, 0);
    assert_relative_eq!(manager.coordinate_system().config().zoom, 2.0);

    let after = manager
        .convert(TransformOp::GridToCanvas, cell)
        .await
        .expect("convert");
    assert_eq!(after.value, TransformOutput::Canvas(CanvasPoint::new(50.0, 50.0)));
}

#[tokio::test]
async fn test_noop_view_update_keeps_cache() {
    let manager = retina_manager();
    manager
        .convert(
            TransformOp::GridToCanvas,
            TransformInput::Grid(GridPoint::new(1, 1)),
        )
        .await
        .expect("convert");

    let changed = manager
        .update_view(|system| system.apply_zoom(1.0, CanvasPoint::ORIGIN))
        .expect("view update");
    assert!(!changed);
    assert_eq!(manager.cache_metrics().size, 1);
}

#[tokio::test]
async fn test_ttl_expiry_recomputes() {
    let clock = Arc::new(ManualClock::new());
    let manager: TransformationManager = TransformationManager::with_clock(
        CoordinateSystem::new(CoordinateSystemConfig::default()).expect("valid"),
        TransformCacheConfig {
            default_ttl_ms: 1_000,
            ..TransformCacheConfig::default()
        },
        TransformationManagerConfig::default(),
        clock.clone(),
    );
    let input = TransformInput::Grid(GridPoint::new(1, 1));

    manager.convert(TransformOp::GridToCanvas, input).await.expect("convert");
    clock.advance(Duration::from_millis(999));
    assert!(manager.convert(TransformOp::GridToCanvas, input).await.expect("convert").cache_hit);
    clock.advance(Duration::from_millis(1));
    assert!(!manager.convert(TransformOp::GridToCanvas, input).await.expect("convert").cache_hit);
    assert_eq!(manager.cache_metrics().expirations, 1);
}
