use chrono::NaiveDate;

use serde::Deserialize;
use serde::Deserializer;
use serde::de::Error;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::bbox::Bbox;
use crate::export::FileFormat;

pub mod error;
pub use error::ConfigError;

pub mod date_window;
pub use date_window::{DateWindow, MonthRange};

pub const DEFAULT_CLOUD_PROPERTY: &str = "CLOUD_COVERAGE";
pub const DEFAULT_MAX_PIXELS: u64 = 10_000_000;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Spectral,
    Temperature,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegionSource {
    /// Path or glob pattern of GeoJSON files.
    pub path: String,
    /// Feature property carrying the region identifier.
    pub id_property: String,
    /// Only the first `count` regions are processed.
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatasetConfig {
    pub id: String,
    /// Ground sample distance, in the linear unit of the source imagery.
    pub scale: f64,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    #[serde(default)]
    pub best_effort: bool,
}

fn default_max_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BackendConfig {
    pub root: PathBuf,
    pub workload_tag: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    pub destination: PathBuf,
    pub folder: String,
    pub description: String,
    pub file_format: FileFormat,
    pub selectors: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pipeline: PipelineKind,
    window: DateWindow,
    regions: RegionSource,
    bounds: Option<Bbox>,
    datasets: Vec<DatasetConfig>,
    cloud_coverage_max: Option<f64>,
    cloud_property: String,
    months: Option<MonthRange>,
    batch_size: usize,
    backend: BackendConfig,
    output: OutputConfig,
}

// Deserializes through a helper so that every constraint is checked before a
// Config value exists: date order, month range, batch size, dataset limits.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ConfigHelper {
            pipeline: PipelineKind,
            start_date: String,
            end_date: String,
            #[serde(default)]
            end_inclusive: bool,
            regions: RegionSource,
            bounds: Option<BboxHelper>,
            datasets: Vec<DatasetConfig>,
            cloud_coverage_max: Option<f64>,
            cloud_property: Option<String>,
            months: Option<MonthsHelper>,
            batch_size: i64,
            backend: BackendConfig,
            output: OutputConfig,
        }

        #[derive(Deserialize)]
        struct BboxHelper {
            xmin: f64,
            xmax: f64,
            ymin: f64,
            ymax: f64,
        }

        #[derive(Deserialize)]
        struct MonthsHelper {
            start: u32,
            end: u32,
        }

        let helper = ConfigHelper::deserialize(deserializer)?;

        let start_date = NaiveDate::parse_from_str(&helper.start_date, "%Y-%m-%d")
            .map_err(|e| D::Error::custom(format!("Invalid start_date format: {}", e)))?;

        let end_date = NaiveDate::parse_from_str(&helper.end_date, "%Y-%m-%d")
            .map_err(|e| D::Error::custom(format!("Invalid end_date format: {}", e)))?;

        let window =
            DateWindow::new(start_date, end_date, helper.end_inclusive).map_err(D::Error::custom)?;

        let months = helper
            .months
            .map(|m| MonthRange::new(m.start, m.end))
            .transpose()
            .map_err(D::Error::custom)?;

        if helper.batch_size <= 0 {
            return Err(D::Error::custom(ConfigError::BatchSize));
        }

        if helper.datasets.is_empty() {
            return Err(D::Error::custom(ConfigError::NoDatasets));
        }
        for dataset in &helper.datasets {
            if !(dataset.scale.is_finite() && dataset.scale > 0.0) {
                return Err(D::Error::custom(ConfigError::Scale(dataset.id.clone())));
            }
            if dataset.max_pixels == 0 {
                return Err(D::Error::custom(ConfigError::MaxPixels(dataset.id.clone())));
            }
        }

        if helper
            .output
            .selectors
            .as_ref()
            .is_some_and(|s| s.is_empty())
        {
            return Err(D::Error::custom(ConfigError::NoSelectors));
        }

        let bounds = if let Some(b) = helper.bounds {
            Some(
                Bbox::new(b.xmin, b.xmax, b.ymin, b.ymax)
                    .map_err(|e| D::Error::custom(ConfigError::Bbox(e)))?,
            )
        } else {
            None
        };

        Ok(Config {
            pipeline: helper.pipeline,
            window,
            regions: helper.regions,
            bounds,
            datasets: helper.datasets,
            cloud_coverage_max: helper.cloud_coverage_max,
            cloud_property: helper
                .cloud_property
                .unwrap_or_else(|| DEFAULT_CLOUD_PROPERTY.to_string()),
            months,
            batch_size: helper.batch_size as usize,
            backend: helper.backend,
            output: helper.output,
        })
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    pub fn window(&self) -> &DateWindow {
        &self.window
    }

    pub fn regions(&self) -> &RegionSource {
        &self.regions
    }

    pub fn bounds(&self) -> Option<&Bbox> {
        self.bounds.as_ref()
    }

    pub fn datasets(&self) -> &[DatasetConfig] {
        &self.datasets
    }

    pub fn cloud_coverage_max(&self) -> Option<f64> {
        self.cloud_coverage_max
    }

    pub fn cloud_property(&self) -> &str {
        &self.cloud_property
    }

    pub fn months(&self) -> Option<&MonthRange> {
        self.months.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn output(&self) -> &OutputConfig {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const SPECTRAL_CONFIG: &str = r#"
    {
        "pipeline": "spectral",
        "start_date": "2024-01-01",
        "end_date": "2024-12-31",
        "end_inclusive": true,
        "regions": { "path": "data/lakes.geojson", "id_property": "ObjectID_1", "count": 1000 },
        "datasets": [
            { "id": "NASA/HLS/HLSS30/v002", "scale": 30.0 },
            { "id": "NASA/HLS/HLSL30/v002", "scale": 30.0 }
        ],
        "cloud_coverage_max": 50.0,
        "months": { "start": 5, "end": 6 },
        "batch_size": 100,
        "backend": { "root": "data/images" },
        "output": {
            "destination": "exports",
            "folder": "hls",
            "description": "ndsi",
            "file_format": "csv"
        }
    }
    "#;

    fn with_field(field: &str, value: serde_json::Value) -> String {
        let mut json: serde_json::Value = serde_json::from_str(SPECTRAL_CONFIG).unwrap();
        json[field] = value;
        json.to_string()
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(SPECTRAL_CONFIG.as_bytes()).unwrap();

        let config = Config::from_file(file_path).unwrap();

        assert_eq!(config.pipeline(), PipelineKind::Spectral);
        assert_eq!(
            config.window().start(),
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("Invalid date")
        );
        assert!(config.window().end_inclusive());
        assert_eq!(config.datasets().len(), 2);
        assert_eq!(config.datasets()[0].max_pixels, DEFAULT_MAX_PIXELS);
        assert!(!config.datasets()[0].best_effort);
        assert_eq!(config.cloud_property(), DEFAULT_CLOUD_PROPERTY);
        assert_eq!(config.months().map(|m| (m.start(), m.end())), Some((5, 6)));
        assert_eq!(config.batch_size(), 100);
        assert_eq!(config.regions().count, Some(1000));
        assert_eq!(config.output().file_format, FileFormat::Csv);
        assert!(config.bounds().is_none());
    }

    #[test]
    fn test_bundled_configs_are_valid() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/config");

        let hls = Config::from_file(dir.join("hls_config.json")).unwrap();
        assert_eq!(hls.pipeline(), PipelineKind::Spectral);
        assert_eq!(hls.backend().workload_tag.as_deref(), Some("hls_extraction"));

        let daymet = Config::from_file(dir.join("daymet_config.json")).unwrap();
        assert_eq!(daymet.pipeline(), PipelineKind::Temperature);
        assert!(daymet.output().selectors.is_none());
    }

    #[test]
    fn test_date_order_is_rejected() {
        let json = with_field("start_date", serde_json::json!("2025-01-01"));
        assert!(Config::from_reader(json.as_bytes()).is_err());
    }

    #[test]
    fn test_bad_date_format_is_rejected() {
        let json = with_field("end_date", serde_json::json!("31/12/2024"));
        let err = Config::from_reader(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("end_date"));
    }

    #[test]
    fn test_non_positive_batch_size_is_rejected() {
        for size in [0, -5] {
            let json = with_field("batch_size", serde_json::json!(size));
            let err = Config::from_reader(json.as_bytes()).unwrap_err();
            assert!(err.to_string().contains("batch_size"));
        }
    }

    #[test]
    fn test_wrapping_month_range_is_rejected() {
        let json = with_field("months", serde_json::json!({ "start": 11, "end": 2 }));
        let err = Config::from_reader(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("wraps"));
    }

    #[test]
    fn test_dataset_scale_must_be_positive() {
        let json = with_field(
            "datasets",
            serde_json::json!([{ "id": "NASA/ORNL/DAYMET_V4", "scale": 0.0 }]),
        );
        assert!(Config::from_reader(json.as_bytes()).is_err());

        let json = with_field("datasets", serde_json::json!([]));
        assert!(Config::from_reader(json.as_bytes()).is_err());
    }

    #[test]
    fn test_explicit_bounds_are_validated() {
        let json = with_field(
            "bounds",
            serde_json::json!({ "xmin": -122.0, "xmax": -120.0, "ymin": 46.0, "ymax": 49.0 }),
        );
        let config = Config::from_reader(json.as_bytes()).unwrap();
        assert!(config.bounds().is_some());

        let json = with_field(
            "bounds",
            serde_json::json!({ "xmin": -122.0, "xmax": -120.0, "ymin": 49.0, "ymax": 46.0 }),
        );
        assert!(Config::from_reader(json.as_bytes()).is_err());
    }
}
