//! Materializer - parallel projections of one finished aggregate
//!
//! ```text
//! Aggregate + CrossReferences + RegionIndex
//!     ├─→ DocumentMaterializer → {state}.json, index.json, zip-index.json, ...
//!     └─→ SqliteMaterializer   → water_quality, pws_zipcodes, additional_data,
//!                                pws_summary, contaminant_results
//! ```
//!
//! Neither form is derived from the other. A run stages every selected form
//! first and publishes only once all of them staged; a failed publish rolls
//! the already-published forms back to the previous run.

pub mod documents;
pub mod sqlite;
pub mod sqlite_pragma;

pub use documents::{ContaminantDocument, DocumentMaterializer, SummaryDocument};
pub use sqlite::SqliteMaterializer;

use crate::aggregate::Aggregate;
use crate::config::{OutputBackend, PipelineConfig};
use crate::crossref::{CrossReferences, RegionIndex};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Read-only view of a finished run handed to every backend
pub struct Snapshot<'a> {
    pub aggregate: &'a Aggregate,
    pub refs: &'a CrossReferences,
    pub regions: &'a RegionIndex,
    /// Data rows seen in the samples pass
    pub sample_rows: u64,
}

/// What one backend published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedOutput {
    pub backend: &'static str,
    pub path: PathBuf,
    /// Files written (documents) or tables populated (sqlite)
    pub artifacts: usize,
    /// Summaries (documents) or fact rows (sqlite)
    pub rows: u64,
}

#[async_trait]
pub trait MaterializerBackend: Send {
    /// Build the full artifact set beside the live output without touching it
    async fn stage(&mut self, snapshot: &Snapshot<'_>) -> Result<MaterializedOutput>;

    /// Swap the staged artifacts in, keeping the previous run until `commit`
    fn publish(&mut self) -> Result<()>;

    /// Drop staged artifacts and, when already published, restore the previous run
    fn rollback(&mut self);

    /// Forget the previous run once every backend has published
    fn commit(&mut self);

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;

    /// Stage and publish this backend on its own
    async fn materialize(&mut self, snapshot: &Snapshot<'_>) -> Result<MaterializedOutput> {
        let output = self.stage(snapshot).await?;
        if let Err(e) = self.publish() {
            self.rollback();
            return Err(e);
        }
        self.commit();
        Ok(output)
    }
}

/// Routes a run to the backends selected on the command line
pub enum Materializer {
    Documents(DocumentMaterializer),
    Sqlite(SqliteMaterializer),
}

impl Materializer {
    pub fn for_backend(backend: OutputBackend, config: &PipelineConfig) -> Vec<Materializer> {
        let mut materializers = Vec::new();
        if backend.includes_documents() {
            materializers.push(Materializer::Documents(DocumentMaterializer::new(
                config.document_dir.clone(),
            )));
        }
        if backend.includes_sqlite() {
            materializers.push(Materializer::Sqlite(SqliteMaterializer::new(
                config.sqlite_path.clone(),
                config.samples_path.clone(),
                config.insert_batch_size,
                config.progress_interval,
            )));
        }
        materializers
    }

    pub async fn stage(&mut self, snapshot: &Snapshot<'_>) -> Result<MaterializedOutput> {
        match self {
            Materializer::Documents(m) => m.stage(snapshot).await,
            Materializer::Sqlite(m) => m.stage(snapshot).await,
        }
    }

    pub fn publish(&mut self) -> Result<()> {
        match self {
            Materializer::Documents(m) => m.publish(),
            Materializer::Sqlite(m) => m.publish(),
        }
    }

    pub fn rollback(&mut self) {
        match self {
            Materializer::Documents(m) => m.rollback(),
            Materializer::Sqlite(m) => m.rollback(),
        }
    }

    pub fn commit(&mut self) {
        match self {
            Materializer::Documents(m) => m.commit(),
            Materializer::Sqlite(m) => m.commit(),
        }
    }

    pub fn backend_type(&self) -> &'static str {
        match self {
            Materializer::Documents(m) => m.backend_type(),
            Materializer::Sqlite(m) => m.backend_type(),
        }
    }
}

/// Stage every backend, then publish them together
///
/// Nothing is published unless every backend staged. If a publish fails, the
/// backends already published are rolled back to the previous run.
pub async fn materialize_all(
    materializers: &mut [Materializer],
    snapshot: &Snapshot<'_>,
) -> Result<Vec<MaterializedOutput>> {
    let mut outputs = Vec::with_capacity(materializers.len());
    for idx in 0..materializers.len() {
        let backend = materializers[idx].backend_type();
        log::info!("📊 Staging backend: {}", backend);
        let staged = materializers[idx].stage(snapshot).await;
        match staged {
            Ok(output) => outputs.push(output),
            Err(e) => {
                log::error!("❌ {} staging failed, discarding staged outputs", backend);
                materializers.iter_mut().for_each(Materializer::rollback);
                return Err(e);
            }
        }
    }

    for idx in 0..materializers.len() {
        let backend = materializers[idx].backend_type();
        let published = materializers[idx].publish();
        if let Err(e) = published {
            log::error!("❌ {} publish failed, restoring previous outputs", backend);
            materializers.iter_mut().for_each(Materializer::rollback);
            return Err(e);
        }
    }

    materializers.iter_mut().for_each(Materializer::commit);
    Ok(outputs)
}
