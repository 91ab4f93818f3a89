//! Integration test: synthetic forcing sidecars served from memory, run
//! through the whole pipeline.
//!
//! 1. Install synthetic sidecars + chunk blobs into a `MemoryFetcher`
//! 2. Load, clip, downsample and materialize through `ForcingPipeline`
//! 3. Check shapes, skip rules, union retention and memoization

use std::sync::Arc;

use chrono::NaiveDate;
use grid_processor::testdata::SyntheticForcing;
use grid_processor::{
    clip, clip_then_downsample, downsample, is_skippable, BoundingBox, ForcingPipeline,
    ForcingQuery, GeometryMaterializer, MemoryFetcher, PipelineConfig, ScaleFactor,
};
use projection::Transformer;

const HEIGHT: usize = 48;
const WIDTH: usize = 64;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn synthetic(lead: u32) -> SyntheticForcing {
    SyntheticForcing::new(HEIGHT, WIDTH)
        .with_chunks(16, 20)
        .with_seed(lead)
        .with_missing(3, 5)
}

/// Pipeline with synthetic files for cycle 0 and the given lead times.
fn setup(leads: &[u32]) -> (ForcingPipeline, Arc<MemoryFetcher>) {
    let fetcher = Arc::new(MemoryFetcher::new());
    let pipeline = ForcingPipeline::new(PipelineConfig::default(), fetcher.clone()).unwrap();
    for &lead in leads {
        let id = pipeline
            .file_request(vec![date()], vec![0], vec![lead])
            .unwrap()
            .identifier(date(), 0, lead);
        synthetic(lead).install(&fetcher, id.as_str());
    }
    (pipeline, fetcher)
}

// =============================================================================
// Loading
// =============================================================================

#[tokio::test]
async fn test_full_grid_matches_source_values() {
    let (pipeline, _) = setup(&[1]);
    let dataset = pipeline.load_forcing(date(), 0, 1).await.unwrap();
    let grid = dataset.read_grid("RAINRATE", None).await.unwrap();

    assert_eq!(grid.shape(), (1, HEIGHT, WIDTH));
    let expected = synthetic(1).values();
    for (i, (got, want)) in grid.data().iter().zip(&expected).enumerate() {
        if want.is_nan() {
            assert!(got.is_nan(), "cell {} should be missing", i);
        } else {
            assert_eq!(got, want, "cell {}", i);
        }
    }
    assert_eq!(grid.x(), synthetic(1).x().as_slice());
    assert!(grid.crs().unwrap().starts_with("PROJCS"));
}

#[tokio::test]
async fn test_windowed_read_equals_clip() {
    let (pipeline, fetcher) = setup(&[1]);
    let dataset = pipeline.load_forcing(date(), 0, 1).await.unwrap();
    let full = dataset.read_grid("RAINRATE", None).await.unwrap();

    let before = fetcher.fetch_count();
    // Rows start below the missing cell so NaN does not break equality.
    let bbox = BoundingBox::new(4, 14, 3, 18).unwrap();
    let window = dataset.read_grid("RAINRATE", Some(&bbox)).await.unwrap();
    // The window sits inside a single 16x20 chunk.
    assert_eq!(fetcher.fetch_count() - before, 1);

    assert_eq!(window, clip(&full, &bbox).unwrap());
}

#[tokio::test]
async fn test_missing_variable() {
    let (pipeline, _) = setup(&[1]);
    let dataset = pipeline.load_forcing(date(), 0, 1).await.unwrap();
    let err = dataset.read_grid("T2D", None).await.unwrap_err();
    assert!(matches!(err, grid_processor::ForecastError::MissingVariable(_)));
}

// =============================================================================
// Transforms
// =============================================================================

#[tokio::test]
async fn test_clip_then_scale_shape() {
    let (pipeline, _) = setup(&[1]);
    let bbox = BoundingBox::new(5, 45, 7, 61).unwrap();
    let scale = ScaleFactor::new(4, 8).unwrap();
    let query = ForcingQuery::new(date(), 0, 1)
        .with_scale(scale)
        .with_bbox(Some(bbox));

    let field = pipeline.precip_field(&query).await.unwrap();
    assert_eq!(field.grid.shape(), (1, 40 / 8, 54 / 4));
}

#[tokio::test]
async fn test_clip_then_scale_differs_from_scale_then_clip() {
    let (pipeline, _) = setup(&[1]);
    let dataset = pipeline.load_forcing(date(), 0, 1).await.unwrap();
    let full = dataset.read_grid("RAINRATE", None).await.unwrap();

    let bbox = BoundingBox::new(5, 45, 7, 61).unwrap();
    let scale = ScaleFactor::new(4, 4).unwrap();
    let canonical = clip_then_downsample(&full, Some(&bbox), Some(scale)).unwrap();
    let other = clip(&downsample(&full, scale).unwrap(), &bbox.scaled_down(scale)).unwrap();
    assert_ne!(canonical.x(), other.x());
}

#[tokio::test]
async fn test_bbox_outside_grid() {
    let (pipeline, _) = setup(&[1]);
    let query = ForcingQuery::new(date(), 0, 1)
        .with_bbox(Some(BoundingBox::new(500, 600, 0, 10).unwrap()));
    let err = pipeline.timestep_payload(&query).await.unwrap_err();
    assert_eq!(err.http_status_code(), 400);
}

// =============================================================================
// Payloads
// =============================================================================

#[tokio::test]
async fn test_single_lead_payload() {
    let (pipeline, _) = setup(&[1]);
    let query = ForcingQuery::new(date(), 0, 1).with_scale(ScaleFactor::ONE);
    let payload = pipeline.timestep_payload(&query).await.unwrap();

    let expected: Vec<f32> = synthetic(1)
        .values()
        .into_iter()
        .filter(|v| !is_skippable(*v))
        .collect();
    assert_eq!(payload.values, expected);
    assert_eq!(payload.geometries.len(), payload.values.len());

    for polygon in &payload.geometries {
        assert_eq!(polygon.len(), 4);
        for [lon, lat] in polygon {
            assert!((-98.0..-96.0).contains(lon), "lon {}", lon);
            assert!((39.0..41.0).contains(lat), "lat {}", lat);
        }
        // Bottom-left is south-west of top-right.
        assert!(polygon[0][1] < polygon[2][1]);
        assert!(polygon[0][0] < polygon[2][0]);
    }
}

#[tokio::test]
async fn test_payload_is_idempotent_and_memoized() {
    let (pipeline, fetcher) = setup(&[1]);
    let query = ForcingQuery::new(date(), 0, 1).with_scale(ScaleFactor::new(4, 4).unwrap());

    let first = pipeline.timestep_payload(&query).await.unwrap();
    let fetches = fetcher.fetch_count();
    let second = pipeline.timestep_payload(&query).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fetcher.fetch_count(), fetches);

    pipeline.clear_caches();
    let third = pipeline.timestep_payload(&query).await.unwrap();
    assert_eq!(*first, *third);
    assert!(pipeline.cache_stats().polygons.hits > 0);
}

#[tokio::test]
async fn test_range_payload_union_retention() {
    let (pipeline, _) = setup(&[1, 2, 3]);
    let query = ForcingQuery::new(date(), 0, 0).with_scale(ScaleFactor::ONE);
    let payload = pipeline
        .timesteps_payload(&query, &[3, 1, 2, 1])
        .await
        .unwrap();

    assert_eq!(
        payload.timestep_values.keys().copied().collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let sources: Vec<Vec<f32>> = (1..=3).map(|l| synthetic(l).values()).collect();
    let kept = (0..HEIGHT * WIDTH)
        .filter(|&i| sources.iter().any(|s| !is_skippable(s[i])))
        .count();
    assert_eq!(payload.geometries.len(), kept);

    for (lead, values) in &payload.timestep_values {
        assert_eq!(values.len(), kept, "lead {}", lead);
    }

    // The missing cell is NaN in every lead, so it is never kept.
    let json = serde_json::to_value(&*payload).unwrap();
    assert!(json["timestep_values"]["2"].as_array().unwrap().len() == kept);
}

#[tokio::test]
async fn test_range_payload_failing_lead_fails_batch() {
    let (pipeline, _) = setup(&[1, 2]);
    let query = ForcingQuery::new(date(), 0, 0);
    assert!(pipeline.timesteps_payload(&query, &[1, 2, 3]).await.is_err());
}

#[tokio::test]
async fn test_polygon_memo_does_not_alias_clipped_windows() {
    // Index (0, 0) of two different windows is a different cell, so the
    // polygons must differ even though indices match.
    let (pipeline, _) = setup(&[1]);
    let materializer = GeometryMaterializer::default();
    let dataset = pipeline.load_forcing(date(), 0, 1).await.unwrap();
    let transformer = Transformer::from_crs(projection::NWM_CONUS_PE_STRING).unwrap();

    let mut first_polygons = Vec::new();
    for bbox in [
        BoundingBox::new(0, 8, 0, 8).unwrap(),
        BoundingBox::new(8, 16, 8, 16).unwrap(),
    ] {
        let grid = dataset.read_grid("RAINRATE", Some(&bbox)).await.unwrap();
        let (x, y) = (grid.x()[0], grid.y()[0]);
        first_polygons.push(materializer.point_geometry(x, y, ScaleFactor::ONE, &transformer, 0));
    }
    assert_ne!(first_polygons[0], first_polygons[1]);
}
