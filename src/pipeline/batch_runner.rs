use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{Extraction, PipelineError, process_region};
use crate::assembler::RecordSet;
use crate::catalog::{Region, RegionCatalog};
use crate::config::ConfigError;
use crate::export::{self, ExportError, ExportReceipt, ExportSink, OutputDescriptor};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch {batch}: region {region}: {source}")]
    Extraction {
        batch: usize,
        region: String,
        source: PipelineError,
    },
    #[error("batch {batch}: {source}")]
    Export { batch: usize, source: ExportError },
    #[error("batch {batch} did not complete: {reason}")]
    Task { batch: usize, reason: String },
}

/// Contiguous slice of the region catalog, positions `start..end`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub start: usize,
    pub regions: Vec<Region>,
}

impl Batch {
    pub fn end(&self) -> usize {
        self.start + self.regions.len()
    }

    /// Records of every region in the batch, region by region.
    pub fn collect(&self, pipeline: &dyn Extraction) -> Result<RecordSet, BatchError> {
        let mut records = RecordSet::new();
        for region in &self.regions {
            let region_records =
                process_region(pipeline, region).map_err(|source| BatchError::Extraction {
                    batch: self.index,
                    region: region.id().to_string(),
                    source,
                })?;
            records.extend(region_records);
        }
        Ok(records)
    }
}

/// Partition the catalog into `ceil(count / batch_size)` batches; only the
/// last one may be shorter.
pub fn plan_batches(
    catalog: &dyn RegionCatalog,
    batch_size: usize,
) -> Result<Vec<Batch>, ConfigError> {
    if batch_size == 0 {
        return Err(ConfigError::BatchSize);
    }

    let count = catalog.count();
    let batches = (0..count)
        .step_by(batch_size)
        .enumerate()
        .map(|(index, start)| Batch {
            index,
            start,
            regions: catalog.slice(start, batch_size),
        })
        .collect();

    Ok(batches)
}

/// A submitted batch. Dropping it does not cancel the work.
#[derive(Debug)]
pub struct BatchHandle {
    pub index: usize,
    pub description: String,
    inner: JoinHandle<Result<ExportReceipt, BatchError>>,
}

impl BatchHandle {
    pub async fn wait(self) -> Result<ExportReceipt, BatchError> {
        let batch = self.index;
        self.inner.await.map_err(|e| BatchError::Task {
            batch,
            reason: e.to_string(),
        })?
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub submitted: usize,
    pub receipts: Vec<ExportReceipt>,
    pub failures: Vec<BatchError>,
}

impl RunSummary {
    pub fn records(&self) -> usize {
        self.receipts.iter().map(|r| r.records).sum()
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct BatchRunner {
    pipeline: Arc<dyn Extraction>,
    sink: Arc<dyn ExportSink>,
    descriptor: OutputDescriptor,
    batch_size: usize,
}

impl BatchRunner {
    pub fn new(
        pipeline: Arc<dyn Extraction>,
        sink: Arc<dyn ExportSink>,
        descriptor: OutputDescriptor,
        batch_size: usize,
    ) -> Self {
        Self {
            pipeline,
            sink,
            descriptor,
            batch_size,
        }
    }

    /// Start one export per batch and return immediately. Batches are
    /// independent: a failing batch never affects its siblings. Must be
    /// called from within a tokio runtime.
    pub fn submit(&self, catalog: &dyn RegionCatalog) -> Result<Vec<BatchHandle>, ConfigError> {
        let batches = plan_batches(catalog, self.batch_size)?;
        info!(
            pipeline = self.pipeline.name(),
            regions = catalog.count(),
            batches = batches.len(),
            "submitting batches"
        );

        let handles = batches
            .into_iter()
            .map(|batch| {
                let descriptor = self.descriptor.for_batch(batch.start, batch.end());
                let description = descriptor.description.clone();
                let (index, start, end) = (batch.index, batch.start, batch.end());
                let pipeline = Arc::clone(&self.pipeline);
                let sink = Arc::clone(&self.sink);

                let inner = tokio::spawn(async move {
                    let records = tokio::task::spawn_blocking(move || batch.collect(pipeline.as_ref()))
                        .await
                        .map_err(|e| BatchError::Task {
                            batch: index,
                            reason: e.to_string(),
                        })??;
                    info!(batch = index, start, end, records = records.len(), "exporting batch");

                    export::submit(sink, records, descriptor)
                        .wait()
                        .await
                        .map_err(|source| BatchError::Export {
                            batch: index,
                            source,
                        })
                });

                BatchHandle {
                    index,
                    description,
                    inner,
                }
            })
            .collect();

        Ok(handles)
    }

    /// Submit every batch and wait for all of them, collecting per-batch
    /// outcomes.
    pub async fn run(&self, catalog: &dyn RegionCatalog) -> Result<RunSummary, ConfigError> {
        let handles = self.submit(catalog)?;
        let mut summary = RunSummary {
            submitted: handles.len(),
            ..Default::default()
        };

        for handle in handles {
            let description = handle.description.clone();
            match handle.wait().await {
                Ok(receipt) => {
                    info!(
                        batch = %description,
                        records = receipt.records,
                        path = %receipt.path.display(),
                        "batch exported"
                    );
                    summary.receipts.push(receipt);
                }
                Err(e) => {
                    error!(batch = %description, "batch failed: {}", e);
                    summary.failures.push(e);
                }
            }
        }

        Ok(summary)
    }
}
