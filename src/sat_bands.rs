use std::fmt::Display;

use crate::collection::ImageAsset;

/// Sensor families that can appear in a merged HLS collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Sentinel2,
    Landsat,
}

/// Sensor-independent channel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalBand {
    Green,
    Swir1,
    Nir,
}

/// Where the values of a canonical band come from for one image.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBand {
    Band(&'static str),
    /// Neutral default used when no sensor mapping applies.
    Constant(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBand {
    pub canonical: CanonicalBand,
    pub source: SourceBand,
    /// Sensor the band was resolved for; `None` when the default was used.
    pub sensor: Option<Sensor>,
}

impl ResolvedBand {
    pub fn is_default(&self) -> bool {
        self.sensor.is_none()
    }
}

pub const NEUTRAL_DEFAULT: f64 = 0.0;

/// How a sensor is recognised and how it names each canonical band.
#[derive(Debug)]
pub struct SensorProfile {
    pub sensor: Sensor,
    /// Image property whose presence identifies the sensor.
    pub marker: &'static str,
    pub bands: &'static [(CanonicalBand, &'static str)],
}

impl SensorProfile {
    pub fn matches(&self, image: &ImageAsset) -> bool {
        image.has_property(self.marker)
    }

    pub fn band(&self, canonical: CanonicalBand) -> Option<&'static str> {
        self.bands
            .iter()
            .find(|(c, _)| *c == canonical)
            .map(|(_, name)| *name)
    }
}

// Bands 3, 11 and 8 of the Sentinel-2 MSI
const SENTINEL2_BANDS: &[(CanonicalBand, &str)] = &[
    (CanonicalBand::Green, "B3"),
    (CanonicalBand::Swir1, "B11"),
    (CanonicalBand::Nir, "B8"),
];

// Bands 3, 6 and 5 of the Landsat 8/9 OLI
const LANDSAT_BANDS: &[(CanonicalBand, &str)] = &[
    (CanonicalBand::Green, "B3"),
    (CanonicalBand::Swir1, "B6"),
    (CanonicalBand::Nir, "B5"),
];

/// HLS profiles in priority order: Sentinel-2 is tried before Landsat.
pub const HLS_PROFILES: &[SensorProfile] = &[
    SensorProfile {
        sensor: Sensor::Sentinel2,
        marker: "PRODUCT_URI",
        bands: SENTINEL2_BANDS,
    },
    SensorProfile {
        sensor: Sensor::Landsat,
        marker: "LANDSAT_PRODUCT_ID",
        bands: LANDSAT_BANDS,
    },
];

/// Resolves canonical bands to sensor-specific source bands. Profiles are
/// evaluated in order and the first one whose marker is present wins; when
/// none matches, the band resolves to a constant neutral default.
#[derive(Debug)]
pub struct BandSelector {
    profiles: &'static [SensorProfile],
    default: f64,
}

impl Default for BandSelector {
    fn default() -> Self {
        Self::new(HLS_PROFILES, NEUTRAL_DEFAULT)
    }
}

impl BandSelector {
    pub fn new(profiles: &'static [SensorProfile], default: f64) -> Self {
        Self { profiles, default }
    }

    pub fn sensor_of(&self, image: &ImageAsset) -> Option<Sensor> {
        self.profiles
            .iter()
            .find(|p| p.matches(image))
            .map(|p| p.sensor)
    }

    pub fn resolve(&self, image: &ImageAsset, canonical: CanonicalBand) -> ResolvedBand {
        self.profiles
            .iter()
            .find(|p| p.matches(image))
            .and_then(|p| {
                p.band(canonical).map(|name| ResolvedBand {
                    canonical,
                    source: SourceBand::Band(name),
                    sensor: Some(p.sensor),
                })
            })
            .unwrap_or_else(|| self.neutral(canonical))
    }

    /// Resolve from the profile of `sensor` alone, e.g. for a per-sensor
    /// passthrough band. Only that sensor's marker is consulted, so priority
    /// between sensors does not apply.
    pub fn resolve_for(
        &self,
        image: &ImageAsset,
        canonical: CanonicalBand,
        sensor: Sensor,
    ) -> ResolvedBand {
        self.profiles
            .iter()
            .find(|p| p.sensor == sensor && p.matches(image))
            .and_then(|p| {
                p.band(canonical).map(|name| ResolvedBand {
                    canonical,
                    source: SourceBand::Band(name),
                    sensor: Some(sensor),
                })
            })
            .unwrap_or_else(|| self.neutral(canonical))
    }

    fn neutral(&self, canonical: CanonicalBand) -> ResolvedBand {
        ResolvedBand {
            canonical,
            source: SourceBand::Constant(self.default),
            sensor: None,
        }
    }
}

impl Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensor::Sentinel2 => write!(f, "Sentinel-2"),
            Sensor::Landsat => write!(f, "Landsat"),
        }
    }
}

impl Display for SourceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceBand::Band(name) => write!(f, "{}", name),
            SourceBand::Constant(value) => write!(f, "constant({})", value),
        }
    }
}
