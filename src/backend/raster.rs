use serde::Deserialize;
use std::collections::HashMap;

use super::{BackendError, PixelSamples};
use crate::bbox::Bbox;
use crate::geometry::Geometry;
use crate::reducer::{PixelTable, ResourceLimits};

/// North-up grid georeferencing: `origin` is the top-left corner, rows run
/// south by `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GridSpec {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub width: usize,
    pub height: usize,
    /// Ground sample distance of one pixel, in the unit `scale` is given in.
    pub native_scale: f64,
}

impl GridSpec {
    /// Reject grids that cannot georeference a single pixel.
    pub fn validate(&self) -> Result<(), String> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.pixel_width) || !positive(self.pixel_height) {
            return Err(format!(
                "pixel size must be positive, got {}x{}",
                self.pixel_width, self.pixel_height
            ));
        }
        if !positive(self.native_scale) {
            return Err(format!(
                "native_scale must be positive, got {}",
                self.native_scale
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err("grid has no pixels".to_string());
        }
        if !self.origin_x.is_finite() || !self.origin_y.is_finite() {
            return Err("grid origin must be finite".to_string());
        }
        Ok(())
    }

    pub fn footprint(&self) -> Bbox {
        Bbox {
            xmin: self.origin_x,
            xmax: self.origin_x + self.width as f64 * self.pixel_width,
            ymin: self.origin_y - self.height as f64 * self.pixel_height,
            ymax: self.origin_y,
        }
    }

    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Column and row ranges covering `bbox`, clamped to the grid.
    fn window(&self, bbox: &Bbox) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let col_min = ((bbox.xmin - self.origin_x) / self.pixel_width).floor() as i64;
        let col_max = ((bbox.xmax - self.origin_x) / self.pixel_width).ceil() as i64;
        let row_min = ((self.origin_y - bbox.ymax) / self.pixel_height).floor() as i64;
        let row_max = ((self.origin_y - bbox.ymin) / self.pixel_height).ceil() as i64;

        let start_col = col_min.max(0) as usize;
        let end_col = col_max.max(0).min(self.width as i64) as usize;
        let start_row = row_min.max(0) as usize;
        let end_row = row_max.max(0).min(self.height as i64) as usize;

        if start_col >= end_col || start_row >= end_row {
            return None;
        }

        Some((start_col..end_col, start_row..end_row))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    grid: GridSpec,
    nodata: Option<f64>,
    bands: HashMap<String, Vec<f32>>,
}

impl Raster {
    pub fn new(grid: GridSpec, nodata: Option<f64>) -> Self {
        Self {
            grid,
            nodata,
            bands: HashMap::new(),
        }
    }

    /// Add a band stored row-major. Its length must match the grid.
    pub fn with_band(mut self, name: impl Into<String>, data: Vec<f32>) -> Result<Self, String> {
        let name = name.into();
        let expected = self.grid.width * self.grid.height;
        if data.len() != expected {
            return Err(format!(
                "band {} holds {} values, grid needs {}",
                name,
                data.len(),
                expected
            ));
        }
        self.bands.insert(name, data);
        Ok(self)
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn value(&self, data: &[f32], col: usize, row: usize) -> Option<f64> {
        let raw = data[row * self.grid.width + col] as f64;
        if raw.is_nan() || self.nodata.is_some_and(|nd| raw == nd) {
            None
        } else {
            Some(raw)
        }
    }

    fn contributing_pixels(
        &self,
        geometry: &Geometry,
        clip: Option<&Geometry>,
        stride: usize,
    ) -> Vec<(usize, usize)> {
        let Some((cols, rows)) = self.grid.window(geometry.envelope()) else {
            return Vec::new();
        };

        let mut pixels = Vec::new();
        for row in rows.step_by(stride) {
            for col in cols.clone().step_by(stride) {
                let (x, y) = self.grid.pixel_center(col, row);
                if geometry.contains(x, y) && clip.is_none_or(|c| c.contains(x, y)) {
                    pixels.push((col, row));
                }
            }
        }
        pixels
    }

    /// Sample `bands` at every contributing pixel. Nodata stays in place as a
    /// missing entry so that all columns remain aligned.
    pub fn sample(
        &self,
        image_id: &str,
        geometry: &Geometry,
        clip: Option<&Geometry>,
        bands: &[String],
        limits: &ResourceLimits,
    ) -> Result<PixelSamples, BackendError> {
        let mut stride = ((limits.scale / self.grid.native_scale).round() as usize).max(1);
        let mut pixels = self.contributing_pixels(geometry, clip, stride);
        let mut approximate = false;

        if pixels.len() as u64 > limits.max_pixels {
            if !limits.best_effort {
                return Err(BackendError::TooManyPixels {
                    image: image_id.to_string(),
                    count: pixels.len() as u64,
                    max: limits.max_pixels,
                });
            }
            let exact = pixels;
            pixels = loop {
                stride *= 2;
                let thinned = self.contributing_pixels(geometry, clip, stride);
                if thinned.is_empty() {
                    // The coarser grid missed a thin region entirely
                    break subsample(exact, limits.max_pixels);
                }
                if thinned.len() as u64 <= limits.max_pixels {
                    break thinned;
                }
            };
            approximate = true;
        }

        let mut table = PixelTable::new(pixels.len());
        for band in bands {
            let data = self
                .bands
                .get(band)
                .ok_or_else(|| BackendError::MissingBand {
                    image: image_id.to_string(),
                    band: band.clone(),
                })?;
            let values = pixels
                .iter()
                .map(|&(col, row)| self.value(data, col, row))
                .collect();
            table.insert(band.as_str(), values)?;
        }

        Ok(PixelSamples {
            table,
            approximate,
            effective_scale: stride as f64 * self.grid.native_scale,
        })
    }
}

/// Every k-th pixel, with k chosen so that at most `max` (and at least one)
/// remain.
fn subsample(pixels: Vec<(usize, usize)>, max: u64) -> Vec<(usize, usize)> {
    let max = max.max(1) as usize;
    let step = pixels.len().div_ceil(max).max(1);
    pixels.into_iter().step_by(step).collect()
}
