use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::bbox::Bbox;
use crate::geometry::Geometry;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse GeoJSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid region pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("cannot read a path matching the region pattern: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("no region files match {0}")]
    NoFiles(String),
    #[error("{path} is not a GeoJSON FeatureCollection")]
    NotFeatureCollection { path: PathBuf },
    #[error("feature {index} in {path} has no usable geometry: {reason}")]
    Geometry {
        path: PathBuf,
        index: usize,
        reason: String,
    },
    #[error("feature {index} in {path} has no '{property}' attribute")]
    MissingId {
        path: PathBuf,
        index: usize,
        property: String,
    },
}

/// A polygon of interest with a stable identifier. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    id: String,
    geometry: Arc<Geometry>,
    attributes: Map<String, Value>,
}

impl Region {
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry: Arc::new(geometry),
            attributes: Map::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn envelope(&self) -> &Bbox {
        self.geometry.envelope()
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Ordered, sliceable source of regions.
pub trait RegionCatalog {
    fn count(&self) -> usize;

    /// Regions `offset..offset + length`, clamped to the catalog size.
    fn slice(&self, offset: usize, length: usize) -> Vec<Region>;

    fn geometry_of<'a>(&self, region: &'a Region) -> &'a Geometry {
        region.geometry()
    }

    fn attribute_of<'a>(&self, region: &'a Region, key: &str) -> Option<&'a Value> {
        region.attribute(key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    /// Load every GeoJSON file matching `pattern`, in sorted path order.
    pub fn from_pattern(pattern: &str, id_property: &str) -> Result<Self, CatalogError> {
        let mut paths = glob::glob(pattern)?.collect::<Result<Vec<PathBuf>, _>>()?;
        if paths.is_empty() {
            return Err(CatalogError::NoFiles(pattern.to_string()));
        }
        paths.sort();

        let mut regions = Vec::new();
        for path in paths {
            regions.extend(Self::from_geojson_file(&path, id_property)?.regions);
        }

        Ok(Self { regions })
    }

    pub fn from_geojson_file(path: &Path, id_property: &str) -> Result<Self, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| CatalogError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_geojson(&value, id_property, path)
    }

    pub fn from_geojson(
        value: &Value,
        id_property: &str,
        origin: &Path,
    ) -> Result<Self, CatalogError> {
        let features = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| CatalogError::NotFeatureCollection {
                path: origin.to_path_buf(),
            })?;

        let mut regions = Vec::with_capacity(features.len());
        for (index, feature) in features.iter().enumerate() {
            let geometry = feature
                .get("geometry")
                .filter(|g| !g.is_null())
                .ok_or_else(|| "missing geometry".to_string())
                .and_then(Geometry::from_geojson)
                .map_err(|reason| CatalogError::Geometry {
                    path: origin.to_path_buf(),
                    index,
                    reason,
                })?;

            let attributes = feature
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            let id = attributes
                .get(id_property)
                .and_then(id_from_value)
                .ok_or_else(|| CatalogError::MissingId {
                    path: origin.to_path_buf(),
                    index,
                    property: id_property.to_string(),
                })?;

            regions.push(Region::new(id, geometry).with_attributes(attributes));
        }

        Ok(Self { regions })
    }

    /// Keep only the first `count` regions.
    pub fn truncate(&mut self, count: usize) {
        self.regions.truncate(count);
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Envelope of every region, `None` for an empty catalog.
    pub fn envelope(&self) -> Option<Bbox> {
        self.regions
            .iter()
            .map(|r| *r.envelope())
            .reduce(|acc, b| acc.union(&b))
    }

    /// Union of every region geometry, used to clip imagery.
    pub fn union_geometry(&self) -> Option<Geometry> {
        Geometry::union_of(self.regions.iter().map(|r| r.geometry())).ok()
    }
}

impl RegionCatalog for RegionSet {
    fn count(&self) -> usize {
        self.regions.len()
    }

    fn slice(&self, offset: usize, length: usize) -> Vec<Region> {
        let start = offset.min(self.regions.len());
        let end = offset.saturating_add(length).min(self.regions.len());
        self.regions[start..end].to_vec()
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
