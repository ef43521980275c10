use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bbox::Bbox;
use crate::geometry::Geometry;

pub mod request;
pub use request::{CollectionRequest, Comparison, Predicate};

/// One image as served by the backend: provenance, acquisition time, band
/// names and footprint. Read-only once produced by a collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    id: String,
    dataset: String,
    time_start: DateTime<Utc>,
    properties: BTreeMap<String, Value>,
    bands: Vec<String>,
    footprint: Bbox,
    clip: Option<Arc<Geometry>>,
}

impl ImageAsset {
    pub fn new(
        id: impl Into<String>,
        dataset: impl Into<String>,
        time_start: DateTime<Utc>,
        footprint: Bbox,
    ) -> Self {
        Self {
            id: id.into(),
            dataset: dataset.into(),
            time_start,
            properties: BTreeMap::new(),
            bands: Vec::new(),
            footprint,
            clip: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bands = bands.into_iter().map(Into::into).collect();
        self
    }

    /// Copy of this asset restricted to `geometry`.
    pub fn clipped(&self, geometry: Arc<Geometry>) -> Self {
        Self {
            clip: Some(geometry),
            ..self.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn time_start(&self) -> &DateTime<Utc> {
        &self.time_start
    }

    /// Acquisition day as `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        self.time_start.format("%Y-%m-%d").to_string()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn footprint(&self) -> &Bbox {
        &self.footprint
    }

    pub fn clip(&self) -> Option<&Geometry> {
        self.clip.as_deref()
    }
}

/// Materialized result of a collection query.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    images: Vec<ImageAsset>,
}

impl ImageCollection {
    pub fn new(images: Vec<ImageAsset>) -> Self {
        Self { images }
    }

    /// Concatenate two collections. Nothing is deduplicated: assets from
    /// different datasets sharing a timestamp are all kept.
    pub fn merge(mut self, other: ImageCollection) -> Self {
        self.images.extend(other.images);
        self
    }

    /// Stable sort on acquisition time.
    pub fn sort_by_time(mut self) -> Self {
        self.images.sort_by_key(|image| image.time_start);
        self
    }

    /// Images whose footprint intersects `envelope`.
    pub fn overlapping<'a>(&'a self, envelope: &'a Bbox) -> impl Iterator<Item = &'a ImageAsset> {
        self.images
            .iter()
            .filter(move |image| image.footprint.intersects(envelope))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageAsset> {
        self.images.iter()
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }
}
