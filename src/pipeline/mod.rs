//! Extraction pipelines: filter → per-region reduce → flatten → batch → export.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::assembler::RecordSet;
use crate::backend::{BackendError, ImageBackend};
use crate::catalog::{Region, RegionSet};
use crate::collection::{CollectionRequest, Comparison, ImageAsset, ImageCollection};
use crate::config::{Config, ConfigError, PipelineKind};
use crate::reducer::{ReductionError, ResourceLimits};

pub mod batch_runner;
pub mod spectral;
pub mod temperature;

pub use batch_runner::{Batch, BatchError, BatchRunner, RunSummary, plan_batches};
pub use spectral::SpectralPipeline;
pub use temperature::TemperaturePipeline;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Reduction(#[from] ReductionError),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to filter dataset {dataset}: {source}")]
    Filter {
        dataset: String,
        source: BackendError,
    },
    #[error("region catalog is empty")]
    EmptyCatalog,
}

/// Per-image extraction shared by both pipelines.
pub trait Extraction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every column this pipeline can emit.
    fn columns(&self) -> &'static [&'static str];

    fn default_selectors(&self) -> &'static [&'static str];

    /// Filtered, merged and time-sorted images.
    fn images(&self) -> &ImageCollection;

    /// Records of one region in one image.
    fn extract(&self, region: &Region, image: &ImageAsset) -> Result<RecordSet, PipelineError>;
}

/// Run `pipeline` over every image whose footprint meets the region polygon
/// and flatten the per-image records.
pub fn process_region(pipeline: &dyn Extraction, region: &Region) -> Result<RecordSet, PipelineError> {
    let mut records = RecordSet::new();
    let images = pipeline
        .images()
        .overlapping(region.envelope())
        .filter(|image| region.geometry().intersects_bbox(image.footprint()));

    for image in images {
        records.extend(pipeline.extract(region, image)?);
    }
    Ok(records)
}

/// Resource limits keyed by dataset id.
pub fn dataset_limits(config: &Config) -> HashMap<String, ResourceLimits> {
    config
        .datasets()
        .iter()
        .map(|d| {
            (
                d.id.clone(),
                ResourceLimits {
                    scale: d.scale,
                    max_pixels: d.max_pixels,
                    best_effort: d.best_effort,
                },
            )
        })
        .collect()
}

pub(crate) fn limits_for(
    limits: &HashMap<String, ResourceLimits>,
    image: &ImageAsset,
) -> Result<ResourceLimits, BackendError> {
    limits
        .get(image.dataset())
        .copied()
        .ok_or_else(|| BackendError::UnknownDataset(image.dataset().to_string()))
}

/// Filter every configured dataset independently, then merge and sort by
/// acquisition time. Images are clipped to the union of all regions.
pub fn filter_collections(
    config: &Config,
    backend: &dyn ImageBackend,
    catalog: &RegionSet,
) -> Result<ImageCollection, SetupError> {
    let envelope = match config.bounds() {
        Some(bounds) => *bounds,
        None => catalog.envelope().ok_or(SetupError::EmptyCatalog)?,
    };
    let clip = Arc::new(catalog.union_geometry().ok_or(SetupError::EmptyCatalog)?);

    let mut merged = ImageCollection::default();
    for dataset in config.datasets() {
        if !backend.has_dataset(&dataset.id) {
            return Err(ConfigError::UnknownDataset(dataset.id.clone()).into());
        }

        let mut request = CollectionRequest::new(dataset.id.as_str())
            .filter_bounds(envelope)
            .filter_date(*config.window());
        if let Some(months) = config.months() {
            request = request.filter_calendar_range(*months);
        }
        if let Some(ceiling) = config.cloud_coverage_max() {
            request = request.filter_property(config.cloud_property(), Comparison::Lt, ceiling);
        }
        let request = request.clip(Arc::clone(&clip));

        let images = request
            .execute(backend)
            .map_err(|source| SetupError::Filter {
                dataset: dataset.id.clone(),
                source,
            })?;
        info!(dataset = %dataset.id, images = images.len(), "images after filtering");

        merged = merged.merge(images);
    }

    Ok(merged.sort_by_time())
}

/// Output columns: the configured selectors, or the pipeline defaults.
pub fn resolve_selectors(
    pipeline: &dyn Extraction,
    selectors: Option<&[String]>,
) -> Result<Vec<String>, ConfigError> {
    let Some(selectors) = selectors else {
        return Ok(pipeline
            .default_selectors()
            .iter()
            .map(|s| s.to_string())
            .collect());
    };

    for column in selectors {
        if !pipeline.columns().contains(&column.as_str()) {
            return Err(ConfigError::UnknownColumn {
                column: column.clone(),
                pipeline: pipeline.name().to_string(),
            });
        }
    }
    Ok(selectors.to_vec())
}

/// Filter the configured datasets and build the pipeline selected by `config`.
pub fn build_pipeline(
    config: &Config,
    backend: Arc<dyn ImageBackend>,
    catalog: &RegionSet,
) -> Result<Arc<dyn Extraction>, SetupError> {
    let images = filter_collections(config, backend.as_ref(), catalog)?;
    let limits = dataset_limits(config);

    let pipeline: Arc<dyn Extraction> = match config.pipeline() {
        PipelineKind::Spectral => Arc::new(SpectralPipeline::new(backend, images, limits)),
        PipelineKind::Temperature => Arc::new(TemperaturePipeline::new(backend, images, limits)),
    };

    Ok(pipeline)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    fn hls_datasets() -> serde_json::Value {
        json!([
            { "id": HLSS30, "scale": 30.0 },
            { "id": HLSL30, "scale": 30.0 }
        ])
    }

    #[test]
    fn test_filter_merges_and_sorts_datasets() {
        let backend = backend(vec![
            sentinel_image("s-late", 6, 20, 10.0),
            landsat_image("l-mid", 5, 12, 10.0),
            sentinel_image("s-early", 5, 2, 10.0),
            // Same timestamp as s-early, from the other sensor
            landsat_image("l-early", 5, 2, 10.0),
        ]);
        let config = config("spectral", hls_datasets());

        let images = filter_collections(&config, &backend, &catalog()).unwrap();
        let ids: Vec<&str> = images.iter().map(|i| i.id()).collect();

        assert_eq!(ids, vec!["s-early", "l-early", "l-mid", "s-late"]);
        assert!(images.iter().all(|i| i.clip().is_some()));
    }

    #[test]
    fn test_filter_applies_cloud_and_month_predicates() {
        let backend = backend(vec![
            sentinel_image("cloudy", 5, 2, 75.0),
            sentinel_image("clear", 5, 3, 5.0),
            sentinel_image("july", 7, 3, 5.0),
        ]);
        let mut json = json!({
            "pipeline": "spectral",
            "start_date": "2024-01-01",
            "end_date": "2024-12-31",
            "regions": { "path": "unused.geojson", "id_property": "ObjectID_1" },
            "datasets": [{ "id": HLSS30, "scale": 30.0 }],
            "cloud_coverage_max": 50.0,
            "months": { "start": 5, "end": 6 },
            "batch_size": 2,
            "backend": { "root": "unused" },
            "output": { "destination": "unused", "folder": "out", "description": "t", "file_format": "csv" }
        });
        let config = Config::from_reader(json.to_string().as_bytes()).unwrap();

        let images = filter_collections(&config, &backend, &catalog()).unwrap();
        let ids: Vec<&str> = images.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["clear"]);

        // Exclusive end date drops images acquired on it
        json["end_date"] = json!("2024-05-03");
        let config = Config::from_reader(json.to_string().as_bytes()).unwrap();
        assert!(filter_collections(&config, &backend, &catalog()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_dataset_fails_before_any_work() {
        let backend = backend(vec![sentinel_image("s", 5, 2, 10.0)]);
        let config = config("spectral", hls_datasets());

        let err = filter_collections(&config, &backend, &catalog()).unwrap_err();
        assert!(matches!(
            err,
            SetupError::Config(ConfigError::UnknownDataset(ref d)) if d == HLSL30
        ));
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        let backend = backend(vec![sentinel_image("s", 5, 2, 10.0)]);
        let config = config("spectral", json!([{ "id": HLSS30, "scale": 30.0 }]));

        let err = filter_collections(&config, &backend, &RegionSet::default()).unwrap_err();
        assert!(matches!(err, SetupError::EmptyCatalog));
    }

    #[test]
    fn test_selectors_are_validated() {
        let backend: Arc<dyn ImageBackend> = Arc::new(backend(vec![daymet_image("d", 5, 1)]));
        let config = config("temperature", json!([{ "id": DAYMET, "scale": 1000.0 }]));
        let pipeline = build_pipeline(&config, backend, &catalog()).unwrap();

        assert_eq!(
            resolve_selectors(pipeline.as_ref(), None).unwrap(),
            vec!["lake_id", "date", "tmax", "tmin"]
        );

        let custom = vec!["date".to_string(), "tmin".to_string(), "approximate".to_string()];
        assert_eq!(
            resolve_selectors(pipeline.as_ref(), Some(&custom)).unwrap(),
            custom
        );

        let bad = vec!["NDSI".to_string()];
        assert!(matches!(
            resolve_selectors(pipeline.as_ref(), Some(&bad)),
            Err(ConfigError::UnknownColumn { .. })
        ));
    }
}
