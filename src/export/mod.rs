use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::assembler::{Record, RecordSet};
use crate::config::OutputConfig;

pub mod file_sink;
pub use file_sink::FileSink;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    GeoJson,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::GeoJson => "geojson",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("export task did not complete: {0}")]
    Task(String),
}

/// Where and how a record set is written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescriptor {
    pub destination: PathBuf,
    pub folder: String,
    pub description: String,
    pub file_format: FileFormat,
    /// Output columns, in order.
    pub selectors: Vec<String>,
}

impl OutputDescriptor {
    pub fn from_config(output: &OutputConfig, selectors: Vec<String>) -> Self {
        Self {
            destination: output.destination.clone(),
            folder: output.folder.clone(),
            description: output.description.clone(),
            file_format: output.file_format,
            selectors,
        }
    }

    /// Descriptor of the batch covering catalog positions `start..end`.
    pub fn for_batch(&self, start: usize, end: usize) -> Self {
        Self {
            description: format!("{}_{}-{}", self.description, start, end),
            ..self.clone()
        }
    }

    pub fn path(&self) -> PathBuf {
        self.destination
            .join(&self.folder)
            .join(format!("{}.{}", self.description, self.file_format.extension()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub records: usize,
    pub workload_tag: Option<String>,
}

pub trait ExportSink: Send + Sync {
    fn write(
        &self,
        records: &[Record],
        descriptor: &OutputDescriptor,
    ) -> Result<ExportReceipt, ExportError>;
}

/// In-flight export. Completion is observed through [`ExportHandle::wait`].
#[derive(Debug)]
pub struct ExportHandle {
    pub description: String,
    inner: JoinHandle<Result<ExportReceipt, ExportError>>,
}

impl ExportHandle {
    pub async fn wait(self) -> Result<ExportReceipt, ExportError> {
        self.inner
            .await
            .map_err(|e| ExportError::Task(e.to_string()))?
    }
}

/// Hand `records` to `sink` without waiting for the write to finish. Must be
/// called from within a tokio runtime.
pub fn submit(
    sink: Arc<dyn ExportSink>,
    records: RecordSet,
    descriptor: OutputDescriptor,
) -> ExportHandle {
    let description = descriptor.description.clone();
    let inner = tokio::task::spawn_blocking(move || sink.write(&records, &descriptor));
    ExportHandle { description, inner }
}
