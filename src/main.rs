use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use lakeshed::backend::LocalBackend;
use lakeshed::catalog::{RegionCatalog, RegionSet};
use lakeshed::config::Config;
use lakeshed::export::{FileSink, OutputDescriptor};
use lakeshed::logging::init_logging;
use lakeshed::pipeline::{BatchRunner, build_pipeline, plan_batches, resolve_selectors};

#[derive(Parser, Debug)]
#[command(version, about = "Per-lake time series from satellite and climate imagery")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Plan the batches and log them without exporting anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let backend =
        LocalBackend::initialize(config.backend()).context("Backend initialization failed")?;
    let workload_tag = backend.workload_tag().map(str::to_string);

    let regions = config.regions();
    let mut catalog = RegionSet::from_pattern(&regions.path, &regions.id_property)
        .with_context(|| format!("Failed to load regions from {}", regions.path))?;
    if let Some(count) = regions.count {
        catalog.truncate(count);
    }
    info!(regions = catalog.count(), "region catalog loaded");

    let pipeline = build_pipeline(&config, Arc::new(backend), &catalog)?;
    let selectors = resolve_selectors(pipeline.as_ref(), config.output().selectors.as_deref())?;
    let descriptor = OutputDescriptor::from_config(config.output(), selectors);

    if args.dry_run {
        for batch in plan_batches(&catalog, config.batch_size())? {
            info!(
                batch = batch.index,
                regions = batch.regions.len(),
                path = %descriptor.for_batch(batch.start, batch.end()).path().display(),
                "planned"
            );
        }
        return Ok(());
    }

    let runner = BatchRunner::new(
        pipeline,
        Arc::new(FileSink::new(workload_tag)),
        descriptor,
        config.batch_size(),
    );
    let summary = runner.run(&catalog).await?;

    info!(
        batches = summary.submitted,
        exported = summary.receipts.len(),
        records = summary.records(),
        "run finished"
    );
    if !summary.succeeded() {
        bail!(
            "{} of {} batches failed",
            summary.failures.len(),
            summary.submitted
        );
    }

    Ok(())
}
