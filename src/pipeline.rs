//! Run-to-completion pipeline: parse → aggregate → join → materialize
//!
//! Stages run strictly in order; nothing is materialized until the aggregate
//! and both cross-reference passes are complete, and nothing is published
//! until every selected output form has been built.

use crate::aggregate::{AggregationContext, AggregationStats};
use crate::config::{OutputBackend, PipelineConfig};
use crate::crossref::{CrossReferenceJoiner, JoinStats, RegionIndex};
use crate::error::{PipelineError, Result};
use crate::ingest::{AdditionalDataReader, SampleReader, ZipCodeReader};
use crate::materialize::{materialize_all, MaterializedOutput, Materializer, Snapshot};
use std::path::Path;
use std::time::Instant;

/// Counters and outputs of one completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub aggregation: AggregationStats,
    pub join: JoinStats,
    pub states: usize,
    pub outputs: Vec<MaterializedOutput>,
    pub elapsed_secs: f64,
}

async fn ensure_readable(path: &Path) -> Result<()> {
    tokio::fs::metadata(path)
        .await
        .map(|_| ())
        .map_err(|e| PipelineError::source_unavailable(path, e))
}

pub async fn run(config: &PipelineConfig, backend: OutputBackend) -> Result<RunReport> {
    let started = Instant::now();
    config.validate()?;

    // required sources are checked before any output path is touched
    ensure_readable(&config.samples_path).await?;
    ensure_readable(&config.zip_codes_path).await?;
    let has_additional = tokio::fs::metadata(&config.additional_data_path).await.is_ok();
    if !has_additional {
        log::warn!(
            "⚠️  Supplementary response file not found, skipping: {}",
            config.additional_data_path.display()
        );
    }

    // Stage 1+2: samples → aggregate
    let mut samples = SampleReader::open(&config.samples_path).await?;
    let mut context = AggregationContext::new(config.progress_interval);
    context.ingest(&mut samples).await?;
    let (mut aggregate, aggregation) = context.finish();

    // Stage 3: cross references
    let mut joiner = CrossReferenceJoiner::new();
    let mut zip_codes = ZipCodeReader::open(&config.zip_codes_path).await?;
    joiner.ingest_zip_codes(&mut aggregate, &mut zip_codes).await?;

    if has_additional {
        let mut additional = AdditionalDataReader::open(&config.additional_data_path).await?;
        joiner.ingest_additional_data(&aggregate, &mut additional).await?;
    }
    let refs = joiner.finish();
    let regions = RegionIndex::build(&aggregate);

    log::info!(
        "📊 Aggregate ready: {} systems across {} states ({} malformed fields recovered)",
        aggregate.len(),
        regions.0.len(),
        aggregation.parse.malformed_fields
            + refs.stats.zip_parse.malformed_fields
            + refs.stats.additional_parse.malformed_fields
    );

    // Stage 4: materialize
    let snapshot = Snapshot {
        aggregate: &aggregate,
        refs: &refs,
        regions: &regions,
        sample_rows: aggregation.rows,
    };

    let mut materializers = Materializer::for_backend(backend, config);
    let outputs = materialize_all(&mut materializers, &snapshot).await?;

    let elapsed_secs = started.elapsed().as_secs_f64();
    log::info!("✅ Pipeline complete in {:.1}s", elapsed_secs);

    Ok(RunReport {
        aggregation,
        join: refs.stats,
        states: regions.0.len(),
        outputs,
        elapsed_secs,
    })
}
