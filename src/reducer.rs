//! Per-region reduction of image bands.
//!
//! Sampling goes through the backend, which enforces the resource ceilings on
//! every call. The reducer then either keeps every pixel (`List`) or averages
//! them (`Mean`).

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::backend::{BackendError, ImageBackend, PixelSamples};
use crate::catalog::Region;
use crate::collection::ImageAsset;

#[derive(Debug, Error, PartialEq)]
pub enum ReductionError {
    #[error("band {band} has {actual} pixels but the table holds {expected}")]
    Misaligned {
        band: String,
        expected: usize,
        actual: usize,
    },
    #[error("band {0} is not present in the pixel table")]
    MissingBand(String),
}

/// Per-pixel samples for several bands. Row `i` of every column is the same
/// pixel; the table refuses columns that would break that alignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelTable {
    len: usize,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl PixelTable {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), ReductionError> {
        let name = name.into();
        if values.len() != self.len {
            return Err(ReductionError::Misaligned {
                band: name,
                expected: self.len,
                actual: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Column holding the same value for every pixel.
    pub fn fill(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.columns.insert(name.into(), vec![value; self.len]);
    }

    pub fn column(&self, name: &str) -> Result<&[Option<f64>], ReductionError> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ReductionError::MissingBand(name.to_string()))
    }

    /// New table restricted to `names`, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<PixelTable, ReductionError> {
        let mut selected = PixelTable::new(self.len);
        for name in names {
            selected.insert(*name, self.column(name)?.to_vec())?;
        }
        Ok(selected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionMode {
    /// Keep every contributing pixel.
    List,
    /// Spatial average.
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    /// Ground sample distance, in the linear unit of the imagery.
    pub scale: f64,
    pub max_pixels: u64,
    /// Coarsen sampling instead of failing when `max_pixels` is exceeded.
    pub best_effort: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BandValues {
    Scalar(Option<f64>),
    List(Vec<Option<f64>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReductionResult {
    pub region_id: String,
    pub values: BTreeMap<String, BandValues>,
    /// Set when the pixel ceiling forced coarser sampling.
    pub approximate: bool,
}

impl ReductionResult {
    /// Common list length in list mode, `None` for scalar results.
    pub fn pixel_count(&self) -> Result<Option<usize>, ReductionError> {
        let mut count: Option<usize> = None;
        for (band, values) in &self.values {
            if let BandValues::List(list) = values {
                match count {
                    None => count = Some(list.len()),
                    Some(expected) if expected != list.len() => {
                        return Err(ReductionError::Misaligned {
                            band: band.clone(),
                            expected,
                            actual: list.len(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(count)
    }
}

pub struct RegionReducer<'a> {
    backend: &'a dyn ImageBackend,
    mode: ReductionMode,
    limits: ResourceLimits,
}

impl<'a> RegionReducer<'a> {
    pub fn new(backend: &'a dyn ImageBackend, mode: ReductionMode, limits: ResourceLimits) -> Self {
        Self {
            backend,
            mode,
            limits,
        }
    }

    /// Fetch aligned pixel samples of `bands` inside the region.
    pub fn sample(
        &self,
        image: &ImageAsset,
        region: &Region,
        bands: &[String],
    ) -> Result<PixelSamples, BackendError> {
        let samples = self
            .backend
            .sample_region(image, region.geometry(), bands, &self.limits)?;

        if samples.approximate {
            debug!(
                region = region.id(),
                image = image.id(),
                effective_scale = samples.effective_scale,
                "pixel ceiling reached, sampling coarsened"
            );
        }

        Ok(samples)
    }

    /// Collapse a pixel table according to the reduction mode.
    pub fn reduce(&self, region: &Region, table: &PixelTable, approximate: bool) -> ReductionResult {
        let values = table
            .columns
            .iter()
            .map(|(name, column)| {
                let value = match self.mode {
                    ReductionMode::List => BandValues::List(column.clone()),
                    ReductionMode::Mean => BandValues::Scalar(mean(column)),
                };
                (name.clone(), value)
            })
            .collect();

        ReductionResult {
            region_id: region.id().to_string(),
            values,
            approximate,
        }
    }
}

/// Mean of the defined, finite entries; `None` when there are none.
pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));

    if n == 0 { None } else { Some(sum / n as f64) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::geometry::Geometry;

    fn region() -> Region {
        Region::new("lake-1", Geometry::rectangle(0.0, 0.0, 1.0, 1.0).unwrap())
    }

    fn table() -> PixelTable {
        let mut table = PixelTable::new(3);
        table
            .insert("tmax", vec![Some(10.0), None, Some(20.0)])
            .unwrap();
        table
            .insert("tmin", vec![Some(-2.0), Some(0.0), Some(2.0)])
            .unwrap();
        table
    }

    fn limits() -> ResourceLimits {
        ResourceLimits {
            scale: 1000.0,
            max_pixels: 100_000_000,
            best_effort: true,
        }
    }

    #[test]
    fn test_table_rejects_misaligned_columns() {
        let mut table = PixelTable::new(2);
        let err = table.insert("NDSI", vec![Some(0.1)]).unwrap_err();
        assert_eq!(
            err,
            ReductionError::Misaligned {
                band: "NDSI".to_string(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_fill_and_select() {
        let mut table = table();
        table.fill("NIR_L", Some(0.0));

        let selected = table.select(&["NIR_L", "tmin"]).unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(selected.column("NIR_L").unwrap(), &[Some(0.0); 3]);
        assert!(selected.column("tmax").is_err());
        assert!(table.select(&["B11"]).is_err());
    }

    #[test]
    fn test_mean_ignores_missing_values() {
        assert_eq!(mean(&[Some(1.0), None, Some(3.0)]), Some(2.0));
        assert_eq!(mean(&[Some(f64::NAN), Some(4.0)]), Some(4.0));
        assert_eq!(mean(&[None, None]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_mean_mode_produces_scalars() {
        let backend = LocalBackend::default();
        let reducer = RegionReducer::new(&backend, ReductionMode::Mean, limits());

        let result = reducer.reduce(&region(), &table(), true);
        assert_eq!(result.region_id, "lake-1");
        assert!(result.approximate);
        assert_eq!(result.values["tmax"], BandValues::Scalar(Some(15.0)));
        assert_eq!(result.values["tmin"], BandValues::Scalar(Some(0.0)));
        assert_eq!(result.pixel_count().unwrap(), None);
    }

    #[test]
    fn test_list_mode_preserves_pixels() {
        let backend = LocalBackend::default();
        let reducer = RegionReducer::new(&backend, ReductionMode::List, limits());

        let result = reducer.reduce(&region(), &table(), false);
        assert_eq!(
            result.values["tmax"],
            BandValues::List(vec![Some(10.0), None, Some(20.0)])
        );
        assert_eq!(result.pixel_count().unwrap(), Some(3));
    }

    #[test]
    fn test_pixel_count_detects_misalignment() {
        let mut values = BTreeMap::new();
        values.insert("NDSI".to_string(), BandValues::List(vec![Some(0.1); 4]));
        values.insert("NIR_S".to_string(), BandValues::List(vec![Some(0.2); 3]));
        let result = ReductionResult {
            region_id: "lake".to_string(),
            values,
            approximate: false,
        };

        assert!(matches!(
            result.pixel_count(),
            Err(ReductionError::Misaligned { .. })
        ));
    }
}
