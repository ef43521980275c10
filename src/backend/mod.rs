use std::path::PathBuf;
use thiserror::Error;

use crate::collection::{CollectionRequest, ImageAsset};
use crate::geometry::Geometry;
use crate::reducer::{PixelTable, ReductionError, ResourceLimits};

pub mod local;
pub mod raster;

pub use local::LocalBackend;
pub use raster::{GridSpec, Raster};

/// Backend session could not be established. Always fatal.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("backend root {0} does not exist")]
    RootMissing(PathBuf),
    #[error("I/O error under {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse image metadata {path}: {source}")]
    Sidecar {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to read raster {path}: {reason}")]
    Raster { path: PathBuf, reason: String },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("dataset {0} is not available")]
    UnknownDataset(String),
    #[error("image {0} is not held by this backend")]
    ImageNotFound(String),
    #[error("image {image} has no band {band}")]
    MissingBand { image: String, band: String },
    #[error("image {image}: {count} pixels exceed max_pixels={max} and best effort is disabled")]
    TooManyPixels { image: String, count: u64, max: u64 },
    #[error(transparent)]
    Reduction(#[from] ReductionError),
}

/// Aligned per-pixel samples of one image inside one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelSamples {
    pub table: PixelTable,
    pub approximate: bool,
    /// Scale the samples were actually taken at.
    pub effective_scale: f64,
}

/// Image store and compute primitives the extraction pipelines run against.
pub trait ImageBackend: Send + Sync {
    fn has_dataset(&self, dataset: &str) -> bool;

    /// Evaluate a deferred collection request.
    fn query(&self, request: &CollectionRequest) -> Result<Vec<ImageAsset>, BackendError>;

    /// Sample `bands` of `image` at every pixel whose centre falls inside
    /// `geometry` (and inside the image clip, if any), honouring `limits`.
    fn sample_region(
        &self,
        image: &ImageAsset,
        geometry: &Geometry,
        bands: &[String],
        limits: &ResourceLimits,
    ) -> Result<PixelSamples, BackendError>;
}
