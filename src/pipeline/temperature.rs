use std::collections::HashMap;
use std::sync::Arc;

use super::{Extraction, PipelineError, limits_for};
use crate::assembler::{APPROXIMATE_COLUMN, DATE_COLUMN, REGION_COLUMN, RecordSet, expand_mean};
use crate::backend::ImageBackend;
use crate::catalog::Region;
use crate::collection::{ImageAsset, ImageCollection};
use crate::reducer::{ReductionMode, RegionReducer, ResourceLimits};

pub const TMAX: &str = "tmax";
pub const TMIN: &str = "tmin";

const COLUMNS: [&str; 5] = [REGION_COLUMN, DATE_COLUMN, TMAX, TMIN, APPROXIMATE_COLUMN];
const DEFAULT_SELECTORS: [&str; 4] = [REGION_COLUMN, DATE_COLUMN, TMAX, TMIN];

/// Regional mean of daily minimum and maximum temperature.
pub struct TemperaturePipeline {
    backend: Arc<dyn ImageBackend>,
    images: ImageCollection,
    limits: HashMap<String, ResourceLimits>,
    bands: Vec<String>,
}

impl TemperaturePipeline {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        images: ImageCollection,
        limits: HashMap<String, ResourceLimits>,
    ) -> Self {
        Self {
            backend,
            images,
            limits,
            bands: vec![TMAX.to_string(), TMIN.to_string()],
        }
    }
}

impl Extraction for TemperaturePipeline {
    fn name(&self) -> &'static str {
        "temperature"
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

    // A region without valid pixels still yields a record, with both
    // temperatures missing.
    fn extract(&self, region: &Region, image: &ImageAsset) -> Result<RecordSet, PipelineError> {
        let limits = limits_for(&self.limits, image)?;
        let reducer = RegionReducer::new(self.backend.as_ref(), ReductionMode::Mean, limits);

        let samples = reducer.sample(image, region, &self.bands)?;
        let table = samples.table.select(&[TMAX, TMIN])?;
        let result = reducer.reduce(region, &table, samples.approximate);

        Ok(vec![expand_mean(region, image, &result)])
    }
}
