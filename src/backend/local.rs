//! File-backed image store.
//!
//! Every image is described by a JSON sidecar next to its band rasters:
//!
//! ```json
//! {
//!   "id": "HLS.S30.T10UEU.2024140T185919",
//!   "collection": "NASA/HLS/HLSS30/v002",
//!   "time_start": "2024-05-19T18:59:19Z",
//!   "properties": { "PRODUCT_URI": "...", "CLOUD_COVERAGE": 12 },
//!   "grid": { "origin_x": -121.5, "origin_y": 48.0, "pixel_width": 0.0003,
//!             "pixel_height": 0.0003, "width": 512, "height": 512, "native_scale": 30 },
//!   "nodata": -9999,
//!   "bands": { "B3": "B3.tif", "B11": "B11.tif", "B8": "B8.tif" }
//! }
//! ```
//!
//! Band rasters are single-band TIFFs, paths relative to the sidecar.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{BackendError, GridSpec, ImageBackend, InitError, PixelSamples, Raster};
use crate::collection::{CollectionRequest, ImageAsset};
use crate::config::BackendConfig;
use crate::geometry::Geometry;
use crate::reducer::ResourceLimits;

#[derive(Debug, Deserialize)]
struct Sidecar {
    id: String,
    collection: String,
    time_start: DateTime<Utc>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    grid: GridSpec,
    nodata: Option<f64>,
    bands: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default)]
pub struct LocalBackend {
    images: Vec<(ImageAsset, Raster)>,
    index: HashMap<(String, String), usize>,
    datasets: HashSet<String>,
    workload_tag: Option<String>,
}

impl LocalBackend {
    pub fn from_images(images: Vec<(ImageAsset, Raster)>) -> Self {
        let index = images
            .iter()
            .enumerate()
            .map(|(i, (asset, _))| ((asset.dataset().to_string(), asset.id().to_string()), i))
            .collect();
        let datasets = images
            .iter()
            .map(|(asset, _)| asset.dataset().to_string())
            .collect();

        Self {
            images,
            index,
            datasets,
            workload_tag: None,
        }
    }

    pub fn with_workload_tag(mut self, tag: Option<String>) -> Self {
        self.workload_tag = tag;
        self
    }

    /// Open the image store under `config.root`. Any failure here leaves the
    /// backend unusable and is returned to the caller.
    pub fn initialize(config: &BackendConfig) -> Result<Self, InitError> {
        let root = &config.root;
        if !root.is_dir() {
            return Err(InitError::RootMissing(root.clone()));
        }

        let mut images = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
                images.push(Self::load_image(path)?);
            }
        }

        let backend = Self::from_images(images).with_workload_tag(config.workload_tag.clone());
        info!(
            root = %root.display(),
            images = backend.images.len(),
            datasets = backend.datasets.len(),
            workload_tag = backend.workload_tag.as_deref().unwrap_or("-"),
            "backend initialized"
        );

        Ok(backend)
    }

    pub fn workload_tag(&self) -> Option<&str> {
        self.workload_tag.as_deref()
    }

    fn load_image(path: &Path) -> Result<(ImageAsset, Raster), InitError> {
        let file = File::open(path).map_err(|source| InitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let sidecar: Sidecar =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| InitError::Sidecar {
                path: path.to_path_buf(),
                source,
            })?;

        sidecar.grid.validate().map_err(|reason| InitError::Raster {
            path: path.to_path_buf(),
            reason,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut raster = Raster::new(sidecar.grid, sidecar.nodata);
        for (band, relative) in &sidecar.bands {
            let band_path = base.join(relative);
            let (width, height, data) = read_tiff(&band_path)?;
            if width as usize != sidecar.grid.width || height as usize != sidecar.grid.height {
                return Err(InitError::Raster {
                    path: band_path,
                    reason: format!(
                        "raster is {}x{}, grid declares {}x{}",
                        width, height, sidecar.grid.width, sidecar.grid.height
                    ),
                });
            }
            raster = raster
                .with_band(band.as_str(), data)
                .map_err(|reason| InitError::Raster {
                    path: band_path.clone(),
                    reason,
                })?;
        }

        let mut asset = ImageAsset::new(
            sidecar.id,
            sidecar.collection,
            sidecar.time_start,
            sidecar.grid.footprint(),
        )
        .with_bands(sidecar.bands.keys().cloned());
        for (key, value) in sidecar.properties {
            asset = asset.with_property(key, value);
        }

        debug!(image = asset.id(), dataset = asset.dataset(), "loaded image");
        Ok((asset, raster))
    }

    fn raster_of(&self, image: &ImageAsset) -> Result<&Raster, BackendError> {
        self.index
            .get(&(image.dataset().to_string(), image.id().to_string()))
            .map(|&i| &self.images[i].1)
            .ok_or_else(|| BackendError::ImageNotFound(image.id().to_string()))
    }
}

impl ImageBackend for LocalBackend {
    fn has_dataset(&self, dataset: &str) -> bool {
        self.datasets.contains(dataset)
    }

    fn query(&self, request: &CollectionRequest) -> Result<Vec<ImageAsset>, BackendError> {
        if !self.has_dataset(request.dataset()) {
            return Err(BackendError::UnknownDataset(request.dataset().to_string()));
        }

        Ok(self
            .images
            .iter()
            .map(|(asset, _)| asset)
            .filter(|asset| request.matches(asset))
            .map(|asset| request.finish(asset))
            .collect())
    }

    fn sample_region(
        &self,
        image: &ImageAsset,
        geometry: &Geometry,
        bands: &[String],
        limits: &ResourceLimits,
    ) -> Result<PixelSamples, BackendError> {
        self.raster_of(image)?
            .sample(image.id(), geometry, image.clip(), bands, limits)
    }
}

fn read_tiff(path: &Path) -> Result<(u32, u32, Vec<f32>), InitError> {
    let raster_error = |reason: String| InitError::Raster {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|source| InitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| raster_error(format!("Failed to decode TIFF: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| raster_error(format!("Failed to get dimensions: {}", e)))?;

    let data: Vec<f32> = match decoder
        .read_image()
        .map_err(|e| raster_error(format!("Failed to read image: {}", e)))?
    {
        DecodingResult::U8(data) => data.iter().map(|&x| x as f32).collect(),
        DecodingResult::U16(data) => data.iter().map(|&x| x as f32).collect(),
        DecodingResult::U32(data) => data.iter().map(|&x| x as f32).collect(),
        DecodingResult::I16(data) => data.iter().map(|&x| x as f32).collect(),
        DecodingResult::I32(data) => data.iter().map(|&x| x as f32).collect(),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.iter().map(|&x| x as f32).collect(),
        _ => return Err(raster_error("Unsupported pixel format".to_string())),
    };

    Ok((width, height, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Bbox;
    use crate::collection::Comparison;
    use chrono::TimeZone;
    use serde_json::json;
    use std::io::Write;
    use tempfile::tempdir;
    use tiff::encoder::{TiffEncoder, colortype};

    fn write_band(path: &Path, width: u32, height: u32, data: &[f32]) {
        let mut file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(&mut file).unwrap();
        encoder
            .write_image::<colortype::Gray32Float>(width, height, data)
            .unwrap();
    }

    fn write_sidecar(dir: &Path, name: &str, sidecar: Value) {
        let mut file = File::create(dir.join(name)).unwrap();
        file.write_all(sidecar.to_string().as_bytes()).unwrap();
    }

    fn sidecar(id: &str, collection: &str, cloud: f64) -> Value {
        json!({
            "id": id,
            "collection": collection,
            "time_start": "2024-05-19T18:59:19Z",
            "properties": { "PRODUCT_URI": "S2B_MSIL1C", "CLOUD_COVERAGE": cloud },
            "grid": {
                "origin_x": 0.0, "origin_y": 2.0, "pixel_width": 1.0, "pixel_height": 1.0,
                "width": 2, "height": 2, "native_scale": 30.0
            },
            "nodata": -9999.0,
            "bands": { "B3": "B3.tif" }
        })
    }

    #[test]
    fn test_initialize_from_directory() {
        let dir = tempdir().unwrap();
        let image_dir = dir.path().join("hlss30").join("tile");
        std::fs::create_dir_all(&image_dir).unwrap();
        write_band(&image_dir.join("B3.tif"), 2, 2, &[0.1, 0.2, -9999.0, 0.4]);
        write_sidecar(
            &image_dir,
            "a.json",
            sidecar("a", "NASA/HLS/HLSS30/v002", 10.0),
        );
        write_sidecar(
            &image_dir,
            "b.json",
            sidecar("b", "NASA/HLS/HLSS30/v002", 80.0),
        );

        let backend = LocalBackend::initialize(&BackendConfig {
            root: dir.path().to_path_buf(),
            workload_tag: Some("hls_extraction".to_string()),
        })
        .unwrap();

        assert!(backend.has_dataset("NASA/HLS/HLSS30/v002"));
        assert!(!backend.has_dataset("NASA/HLS/HLSL30/v002"));
        assert_eq!(backend.workload_tag(), Some("hls_extraction"));

        let request = CollectionRequest::new("NASA/HLS/HLSS30/v002").filter_property(
            "CLOUD_COVERAGE",
            Comparison::Lt,
            50.0,
        );
        let images = backend.query(&request).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id(), "a");
        assert!(images[0].has_property("PRODUCT_URI"));
        assert_eq!(images[0].bands(), &["B3".to_string()]);

        let lake = Geometry::rectangle(0.0, 0.0, 2.0, 2.0).unwrap();
        let limits = ResourceLimits {
            scale: 30.0,
            max_pixels: 100,
            best_effort: false,
        };
        let samples = backend
            .sample_region(&images[0], &lake, &["B3".to_string()], &limits)
            .unwrap();
        let values: Vec<Option<f64>> = samples
            .table
            .column("B3")
            .unwrap()
            .iter()
            .map(|v| v.map(|x| (x * 10.0).round() / 10.0))
            .collect();
        assert_eq!(values, vec![Some(0.1), Some(0.2), None, Some(0.4)]);
    }

    #[test]
    fn test_initialize_missing_root_is_fatal() {
        let result = LocalBackend::initialize(&BackendConfig {
            root: PathBuf::from("/nonexistent/lakeshed/images"),
            workload_tag: None,
        });
        assert!(matches!(result, Err(InitError::RootMissing(_))));
    }

    #[test]
    fn test_initialize_rejects_bad_sidecar() {
        let dir = tempdir().unwrap();
        write_sidecar(dir.path(), "broken.json", json!({ "id": "x" }));

        let result = LocalBackend::initialize(&BackendConfig {
            root: dir.path().to_path_buf(),
            workload_tag: None,
        });
        assert!(matches!(result, Err(InitError::Sidecar { .. })));
    }

    #[test]
    fn test_initialize_rejects_degenerate_grid() {
        for (field, value) in [
            ("pixel_width", json!(0.0)),
            ("pixel_height", json!(-1.0)),
            ("native_scale", json!(0.0)),
        ] {
            let dir = tempdir().unwrap();
            write_band(&dir.path().join("B3.tif"), 2, 2, &[0.1, 0.2, 0.3, 0.4]);
            let mut bad = sidecar("a", "NASA/HLS/HLSS30/v002", 10.0);
            bad["grid"][field] = value;
            write_sidecar(dir.path(), "a.json", bad);

            let result = LocalBackend::initialize(&BackendConfig {
                root: dir.path().to_path_buf(),
                workload_tag: None,
            });
            assert!(
                matches!(result, Err(InitError::Raster { .. })),
                "{} was accepted",
                field
            );
        }
    }

    #[test]
    fn test_query_unknown_dataset() {
        let backend = LocalBackend::default();
        let err = backend
            .query(&CollectionRequest::new("NASA/ORNL/DAYMET_V4"))
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownDataset(_)));
    }

    #[test]
    fn test_sample_unknown_image() {
        let backend = LocalBackend::default();
        let image = ImageAsset::new(
            "ghost",
            "NASA/ORNL/DAYMET_V4",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Bbox::new(0.0, 1.0, 0.0, 1.0).unwrap(),
        );
        let lake = Geometry::rectangle(0.0, 0.0, 1.0, 1.0).unwrap();
        let limits = ResourceLimits {
            scale: 1000.0,
            max_pixels: 100,
            best_effort: true,
        };
        assert!(matches!(
            backend.sample_region(&image, &lake, &[], &limits),
            Err(BackendError::ImageNotFound(_))
        ));
    }
}
