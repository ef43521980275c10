use crate::collection::ImageAsset;
use crate::reducer::{PixelTable, ReductionError};
use crate::sat_bands::{BandSelector, CanonicalBand, ResolvedBand, Sensor, SourceBand};

pub const NDSI: &str = "NDSI";
pub const NIR_S: &str = "NIR_S";
pub const NIR_L: &str = "NIR_L";
pub const SNOW: &str = "SNOW";

// Snow-over-water thresholds used by the Sentinel-2 browser visualisation.
const SNOW_NDSI_MIN: f64 = 0.42;
const SNOW_NIR_MIN: f64 = 0.11;

/// (a - b) / (a + b). Undefined when either input is missing or when the
/// denominator is zero.
pub fn normalized_difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let (a, b) = (a?, b?);
    let sum = a + b;
    if sum == 0.0 {
        return None;
    }

    let value = (a - b) / sum;
    value.is_finite().then_some(value)
}

// Spectral values for a single pixel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralPixel {
    pub green: Option<f64>,
    pub swir1: Option<f64>,
    pub nir: Option<f64>,   // NIR of whichever sensor produced the image
    pub nir_s: Option<f64>, // Sentinel-2 NIR, default otherwise
    pub nir_l: Option<f64>, // Landsat NIR, default otherwise
}

impl SpectralPixel {
    // Normalized Difference Snow Index
    pub fn ndsi(&self) -> Option<f64> {
        normalized_difference(self.green, self.swir1)
    }

    pub fn snow(&self) -> Option<f64> {
        let ndsi = self.ndsi()?;
        let is_snow = ndsi > SNOW_NDSI_MIN && self.nir.is_some_and(|nir| nir > SNOW_NIR_MIN);
        Some(if is_snow { 1.0 } else { 0.0 })
    }
}

/// Canonical bands of one image, resolved once per image.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralBands {
    pub green: ResolvedBand,
    pub swir1: ResolvedBand,
    pub nir: ResolvedBand,
    pub nir_s: ResolvedBand,
    pub nir_l: ResolvedBand,
}

impl SpectralBands {
    pub fn resolve(selector: &BandSelector, image: &ImageAsset) -> Self {
        Self {
            green: selector.resolve(image, CanonicalBand::Green),
            swir1: selector.resolve(image, CanonicalBand::Swir1),
            nir: selector.resolve(image, CanonicalBand::Nir),
            nir_s: selector.resolve_for(image, CanonicalBand::Nir, Sensor::Sentinel2),
            nir_l: selector.resolve_for(image, CanonicalBand::Nir, Sensor::Landsat),
        }
    }

    fn all(&self) -> [&ResolvedBand; 5] {
        [&self.green, &self.swir1, &self.nir, &self.nir_s, &self.nir_l]
    }

    /// Distinct image bands that must be sampled; defaults need no sampling.
    pub fn source_bands(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for band in self.all() {
            if let SourceBand::Band(name) = band.source
                && !names.iter().any(|n| n == name)
            {
                names.push(name.to_string());
            }
        }
        names
    }

    pub fn uses_default(&self) -> bool {
        self.all().iter().any(|b| b.is_default())
    }
}

/// Derives NDSI, the per-sensor NIR passthroughs and the snow flag from
/// sampled source bands.
#[derive(Debug, Default)]
pub struct IndexComputer;

impl IndexComputer {
    pub fn compute(
        &self,
        bands: &SpectralBands,
        samples: &PixelTable,
    ) -> Result<PixelTable, ReductionError> {
        let green = materialize(&bands.green, samples)?;
        let swir1 = materialize(&bands.swir1, samples)?;
        let nir = materialize(&bands.nir, samples)?;
        let nir_s = materialize(&bands.nir_s, samples)?;
        let nir_l = materialize(&bands.nir_l, samples)?;

        let pixels: Vec<SpectralPixel> = (0..samples.len())
            .map(|i| SpectralPixel {
                green: green[i],
                swir1: swir1[i],
                nir: nir[i],
                nir_s: nir_s[i],
                nir_l: nir_l[i],
            })
            .collect();

        let mut derived = PixelTable::new(samples.len());
        derived.insert(NDSI, pixels.iter().map(SpectralPixel::ndsi).collect())?;
        derived.insert(NIR_S, nir_s)?;
        derived.insert(NIR_L, nir_l)?;
        derived.insert(SNOW, pixels.iter().map(SpectralPixel::snow).collect())?;

        Ok(derived)
    }
}

fn materialize(band: &ResolvedBand, samples: &PixelTable) -> Result<Vec<Option<f64>>, ReductionError> {
    match band.source {
        SourceBand::Band(name) => Ok(samples.column(name)?.to_vec()),
        SourceBand::Constant(value) => Ok(vec![Some(value); samples.len()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Bbox;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn image(marker: Option<&str>) -> ImageAsset {
        let img = ImageAsset::new(
            "img",
            "NASA/HLS/HLSS30/v002",
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            Bbox::new(0.0, 1.0, 0.0, 1.0).unwrap(),
        );
        match marker {
            Some(m) => img.with_property(m, json!("id")),
            None => img,
        }
    }

    #[test]
    fn test_normalized_difference_is_antisymmetric() {
        let pairs = [(0.3, 0.1), (0.05, 0.4), (-0.2, 0.7)];
        for (a, b) in pairs {
            let ab = normalized_difference(Some(a), Some(b)).unwrap();
            let ba = normalized_difference(Some(b), Some(a)).unwrap();
            assert!((ab + ba).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normalized_difference_undefined_at_zero() {
        assert_eq!(normalized_difference(Some(0.0), Some(0.0)), None);
        assert_eq!(normalized_difference(Some(0.2), Some(-0.2)), None);
        assert_eq!(normalized_difference(None, Some(0.2)), None);
        assert_eq!(normalized_difference(Some(0.3), Some(0.0)), Some(1.0));
    }

    #[test]
    fn test_snow_flag() {
        let snow = SpectralPixel {
            green: Some(0.5),
            swir1: Some(0.1),
            nir: Some(0.3),
            ..Default::default()
        };
        assert_eq!(snow.snow(), Some(1.0));

        let dark_water = SpectralPixel {
            nir: Some(0.05),
            ..snow
        };
        assert_eq!(dark_water.snow(), Some(0.0));

        assert_eq!(SpectralPixel::default().snow(), None);
    }

    #[test]
    fn test_source_bands_for_sentinel() {
        let bands = SpectralBands::resolve(&BandSelector::default(), &image(Some("PRODUCT_URI")));

        assert_eq!(bands.source_bands(), vec!["B3", "B11", "B8"]);
        // NIR_L has no Sentinel-2 source
        assert!(bands.uses_default());
    }

    #[test]
    fn test_source_bands_with_both_markers() {
        let img = image(Some("PRODUCT_URI")).with_property("LANDSAT_PRODUCT_ID", json!("id"));
        let bands = SpectralBands::resolve(&BandSelector::default(), &img);

        assert_eq!(bands.source_bands(), vec!["B3", "B11", "B8", "B5"]);
        assert!(!bands.uses_default());
    }

    #[test]
    fn test_compute_for_sentinel() {
        let bands = SpectralBands::resolve(&BandSelector::default(), &image(Some("PRODUCT_URI")));
        let mut samples = PixelTable::new(2);
        samples.insert("B3", vec![Some(0.3), Some(0.2)]).unwrap();
        samples.insert("B11", vec![Some(0.1), None]).unwrap();
        samples.insert("B8", vec![Some(0.25), Some(0.2)]).unwrap();

        let derived = IndexComputer.compute(&bands, &samples).unwrap();

        let ndsi = derived.column(NDSI).unwrap();
        assert!((ndsi[0].unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(ndsi[1], None);
        assert_eq!(derived.column(NIR_S).unwrap(), &[Some(0.25), Some(0.2)]);
        assert_eq!(derived.column(NIR_L).unwrap(), &[Some(0.0), Some(0.0)]);
        assert_eq!(derived.column(SNOW).unwrap(), &[Some(1.0), None]);
    }

    #[test]
    fn test_compute_for_unknown_provenance() {
        let bands = SpectralBands::resolve(&BandSelector::default(), &image(None));
        assert!(bands.source_bands().is_empty());

        let samples = PixelTable::new(3);
        let derived = IndexComputer.compute(&bands, &samples).unwrap();

        assert_eq!(derived.column(NDSI).unwrap(), &[None, None, None]);
        assert_eq!(derived.column(NIR_S).unwrap(), &[Some(0.0); 3]);
        assert_eq!(derived.column(NIR_L).unwrap(), &[Some(0.0); 3]);
    }

    #[test]
    fn test_compute_requires_sampled_bands() {
        let bands = SpectralBands::resolve(&BandSelector::default(), &image(Some("LANDSAT_PRODUCT_ID")));
        let samples = PixelTable::new(1);
        assert!(matches!(
            IndexComputer.compute(&bands, &samples),
            Err(ReductionError::MissingBand(_))
        ));
    }
}
