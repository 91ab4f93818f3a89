//! Integration tests for batch loading through `DatasetLoader`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use grid_processor::testdata::SyntheticForcing;
use grid_processor::{
    merge_time, DatasetLoader, FileFetcher, ForcingPipeline, ForecastError, LoadMode,
    MemoryFetcher, PipelineConfig, ResourceFetcher,
};
use nwm_urlgen::ResourceIdentifier;

fn ids(n: usize) -> Vec<ResourceIdentifier> {
    (0..n)
        .map(|i| ResourceIdentifier::new(format!("mem://forcing/{}.json", i)))
        .collect()
}

fn install_all(fetcher: &MemoryFetcher, ids: &[ResourceIdentifier]) {
    for (i, id) in ids.iter().enumerate() {
        SyntheticForcing::new(8, 8)
            .with_seed(i as u32)
            .install(fetcher, id.as_str());
    }
}

/// Delays each fetch so later ids finish first.
struct ReversedLatency {
    inner: MemoryFetcher,
}

#[async_trait]
impl ResourceFetcher for ReversedLatency {
    async fn fetch(&self, url: &str) -> grid_processor::Result<Bytes> {
        let delay = url
            .trim_end_matches(".json")
            .rsplit('/')
            .next()
            .and_then(|n| n.parse::<u64>().ok())
            .map(|n| 40 - n * 10)
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.fetch(url).await
    }

    async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> grid_processor::Result<Bytes> {
        self.inner.fetch_range(url, offset, length).await
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_sequential_and_parallel_preserve_order() {
    let ids = ids(4);
    let inner = MemoryFetcher::new();
    install_all(&inner, &ids);
    let loader = DatasetLoader::new(Arc::new(ReversedLatency { inner })).with_workers(4);

    for mode in [LoadMode::Sequential, LoadMode::Parallel] {
        let datasets = loader.load_all(&ids, mode).await.unwrap();
        let loaded: Vec<&str> = datasets.iter().map(|d| d.id()).collect();
        let expected: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(loaded, expected, "{:?}", mode);
    }
}

#[tokio::test]
async fn test_parallel_values_match_sequential() {
    let ids = ids(3);
    let fetcher = Arc::new(MemoryFetcher::new());
    install_all(&fetcher, &ids);
    let loader = DatasetLoader::new(fetcher).with_workers(2);

    let mut grids = Vec::new();
    for mode in [LoadMode::Sequential, LoadMode::Parallel] {
        let mut out = Vec::new();
        for dataset in loader.load_all(&ids, mode).await.unwrap() {
            out.push(dataset.read_grid("RAINRATE", None).await.unwrap());
        }
        grids.push(out);
    }
    assert_eq!(grids[0], grids[1]);

    let merged = merge_time(&grids[0]).unwrap();
    assert_eq!(merged.shape(), (3, 8, 8));
    assert_eq!(merged.time_slice(2), grids[0][2].data());
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_one_missing_id_fails_batch() {
    let ids = ids(3);
    let fetcher = Arc::new(MemoryFetcher::new());
    install_all(&fetcher, &ids);
    fetcher.remove(ids[1].as_str());
    let loader = DatasetLoader::new(fetcher);

    for mode in [LoadMode::Sequential, LoadMode::Parallel] {
        let err = loader.load_all(&ids, mode).await.unwrap_err();
        match err {
            ForecastError::LoadFailure { url, .. } => assert_eq!(url, ids[1].as_str()),
            other => panic!("unexpected error: {}", other),
        }
    }
}

#[tokio::test]
async fn test_chunk_blob_missing_fails_read_not_load() {
    let ids = ids(1);
    let fetcher = Arc::new(MemoryFetcher::new());
    install_all(&fetcher, &ids);
    fetcher.remove(&format!("{}.chunks", ids[0]));
    let loader = DatasetLoader::new(fetcher);

    let dataset = loader.load(&ids[0]).await.unwrap();
    let err = dataset.read_grid("RAINRATE", None).await.unwrap_err();
    assert!(matches!(err, ForecastError::LoadFailure { .. }));
}

#[tokio::test]
async fn test_missing_projection() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let pipeline = ForcingPipeline::new(PipelineConfig::default(), fetcher.clone()).unwrap();
    let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let id = pipeline
        .file_request(vec![date], vec![0], vec![1])
        .unwrap()
        .identifier(date, 0, 1);
    SyntheticForcing::new(8, 8)
        .without_projection()
        .install(&fetcher, id.as_str());

    let query = grid_processor::ForcingQuery::new(date, 0, 1)
        .with_scale(grid_processor::ScaleFactor::ONE);
    let err = pipeline.timestep_payload(&query).await.unwrap_err();
    assert!(matches!(err, ForecastError::MissingProjection(_)));
}

// =============================================================================
// Filesystem
// =============================================================================

#[tokio::test]
async fn test_file_fetcher_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = dir.path().join("forcing.json");
    let blob = format!("{}.chunks", sidecar.display());
    let (doc, chunks) = SyntheticForcing::new(10, 12).with_chunks(4, 5).build(&blob);
    std::fs::write(&sidecar, doc.to_string()).unwrap();
    std::fs::write(&blob, &chunks).unwrap();

    let loader = DatasetLoader::new(Arc::new(FileFetcher::new()));
    let dataset = loader
        .load(&ResourceIdentifier::new(sidecar.display().to_string()))
        .await
        .unwrap();
    let grid = dataset.read_grid("RAINRATE", None).await.unwrap();
    assert_eq!(grid.data(), SyntheticForcing::new(10, 12).values().as_slice());
}
