use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{Extraction, PipelineError, limits_for};
use crate::assembler::{APPROXIMATE_COLUMN, DATE_COLUMN, REGION_COLUMN, RecordSet, expand_list};
use crate::backend::ImageBackend;
use crate::catalog::Region;
use crate::collection::{ImageAsset, ImageCollection};
use crate::index::{IndexComputer, NDSI, NIR_L, NIR_S, SNOW, SpectralBands};
use crate::reducer::{ReductionMode, RegionReducer, ResourceLimits};
use crate::sat_bands::BandSelector;

const COLUMNS: [&str; 7] = [
    REGION_COLUMN,
    DATE_COLUMN,
    NDSI,
    NIR_S,
    NIR_L,
    SNOW,
    APPROXIMATE_COLUMN,
];

const DEFAULT_SELECTORS: [&str; 5] = [REGION_COLUMN, DATE_COLUMN, NDSI, NIR_S, NIR_L];

/// Per-pixel NDSI and NIR over a merged Sentinel-2 / Landsat collection.
pub struct SpectralPipeline {
    backend: Arc<dyn ImageBackend>,
    images: ImageCollection,
    limits: HashMap<String, ResourceLimits>,
    selector: BandSelector,
    computer: IndexComputer,
}

impl SpectralPipeline {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        images: ImageCollection,
        limits: HashMap<String, ResourceLimits>,
    ) -> Self {
        Self {
            backend,
            images,
            limits,
            selector: BandSelector::default(),
            computer: IndexComputer,
        }
    }
}

impl Extraction for SpectralPipeline {
    fn name(&self) -> &'static str {
        "spectral"
    }

    fn columns(&self) -> &'static [&'static str] {
        &COLUMNS
    }

    fn default_selectors(&self) -> &'static [&'static str] {
        &DEFAULT_SELECTORS
    }

    fn images(&self) -> &ImageCollection {
        &self.images
    }

    fn extract(&self, region: &Region, image: &ImageAsset) -> Result<RecordSet, PipelineError> {
        let limits = limits_for(&self.limits, image)?;
        let bands = SpectralBands::resolve(&self.selector, image);
        if self.selector.sensor_of(image).is_none() {
            debug!(image = image.id(), "no sensor marker, using neutral band defaults");
        }

        let reducer = RegionReducer::new(self.backend.as_ref(), ReductionMode::List, limits);
        let samples = reducer.sample(image, region, &bands.source_bands())?;
        let derived = self.computer.compute(&bands, &samples.table)?;
        let result = reducer.reduce(region, &derived, samples.approximate);

        Ok(expand_list(region, image, &result)?)
    }
}
