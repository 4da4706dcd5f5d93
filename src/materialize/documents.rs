//! Sharded document form: one JSON array per state plus lookup indices
//!
//! All maps are ordered, so identical inputs produce byte-identical shards and
//! indices. The only timestamp lives in `manifest.json`.

use super::{MaterializedOutput, MaterializerBackend, Snapshot};
use crate::aggregate::{ObservedValue, WaterSystemSummary};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index.json";
pub const ZIP_INDEX_FILE: &str = "zip-index.json";
pub const ADDITIONAL_DATA_FILE: &str = "additional-data.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of a state's shard; characters outside `[A-Za-z0-9_-]` are dropped
pub fn shard_file_name(state: &str) -> String {
    let cleaned: String = state
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "unknown.json".to_string()
    } else {
        format!("{}.json", cleaned)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContaminantDocument {
    pub value: Option<ObservedValue>,
    pub unit: String,
    pub detected: bool,
    pub mrl: Option<f64>,
    pub tests: u64,
    pub last_collection_date: Option<String>,
}

/// Serialized shape of one water system inside a state shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub pwsid: String,
    pub pws_name: String,
    pub state: String,
    pub region: Option<i64>,
    pub size: String,
    pub zip_codes: Vec<String>,
    pub contaminants: BTreeMap<String, ContaminantDocument>,
    pub contaminants_detected: usize,
    pub last_test_date: Option<String>,
    pub total_samples: usize,
}

impl From<&WaterSystemSummary> for SummaryDocument {
    fn from(summary: &WaterSystemSummary) -> Self {
        let contaminants = summary
            .contaminants_by_name()
            .into_iter()
            .map(|(name, obs)| {
                (
                    name.to_string(),
                    ContaminantDocument {
                        value: obs.display_value(),
                        unit: obs.units.clone(),
                        detected: obs.detected(),
                        mrl: obs.mrl,
                        tests: obs.test_count,
                        last_collection_date: obs.last_collection_date.clone(),
                    },
                )
            })
            .collect();

        Self {
            pwsid: summary.pwsid.clone(),
            pws_name: summary.pws_name.clone(),
            state: summary.state.clone(),
            region: summary.epa_region,
            size: summary.size.clone(),
            zip_codes: summary.zip_codes.iter().cloned().collect(),
            contaminants,
            contaminants_detected: summary.contaminants_detected(),
            last_test_date: summary.last_test_date.clone(),
            total_samples: summary.total_samples(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: String,
    pub water_systems: usize,
    pub states: usize,
    pub zip_codes: usize,
    pub additional_responses: usize,
    pub sample_rows: u64,
}

/// Writes the document form into a staging directory and swaps it in
///
/// `stage` never touches `output_dir`. `publish` moves the live directory to
/// `.<name>.previous` so `rollback` can restore it until `commit` drops it.
pub struct DocumentMaterializer {
    output_dir: PathBuf,
    published: bool,
    had_previous: bool,
}

impl DocumentMaterializer {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            published: false,
            had_previous: false,
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        self.output_dir.with_file_name(format!(".{}.{}", name, suffix))
    }

    fn staging_dir(&self) -> PathBuf {
        self.sibling("staging")
    }

    fn previous_dir(&self) -> PathBuf {
        self.sibling("previous")
    }

    fn write_all(&self, staging: &Path, snapshot: &Snapshot<'_>) -> Result<usize> {
        // states whose codes sanitize to the same file name share one shard
        let mut shards: BTreeMap<String, Vec<SummaryDocument>> = BTreeMap::new();
        let mut owners: BTreeMap<String, &str> = BTreeMap::new();
        for (state, systems) in snapshot.aggregate.by_state() {
            let file = shard_file_name(state);
            if let Some(first) = owners.get(&file) {
                log::warn!(
                    "⚠️  States {:?} and {:?} both map to {}; merging shards",
                    first,
                    state,
                    file
                );
            } else {
                owners.insert(file.clone(), state);
            }
            shards
                .entry(file)
                .or_default()
                .extend(systems.into_iter().map(SummaryDocument::from));
        }

        for (file, documents) in &shards {
            write_json(&staging.join(file), documents, false)?;
            log::debug!("   ├─ {} ({} systems)", file, documents.len());
        }

        write_json(&staging.join(INDEX_FILE), snapshot.regions, true)?;
        write_json(
            &staging.join(ZIP_INDEX_FILE),
            &snapshot.refs.zip_index.to_document(),
            false,
        )?;
        write_json(
            &staging.join(ADDITIONAL_DATA_FILE),
            snapshot.refs.additional.as_map(),
            false,
        )?;

        let manifest = Manifest {
            generated_at: Utc::now().to_rfc3339(),
            water_systems: snapshot.aggregate.len(),
            states: snapshot.regions.0.len(),
            zip_codes: snapshot.refs.zip_index.zip_count(),
            additional_responses: snapshot.refs.additional.len(),
            sample_rows: snapshot.sample_rows,
        };
        write_json(&staging.join(MANIFEST_FILE), &manifest, true)?;

        Ok(shards.len() + 4)
    }

    /// Swap `staging` in with renames only, keeping the old run at `previous`
    fn swap_in(&mut self, staging: &Path, previous: &Path) -> std::io::Result<()> {
        if previous.exists() {
            fs::remove_dir_all(previous)?;
        }
        if self.output_dir.exists() {
            fs::rename(&self.output_dir, previous)?;
            self.had_previous = true;
        }
        if let Err(e) = fs::rename(staging, &self.output_dir) {
            // put the last good run back before reporting
            if self.had_previous {
                let _ = fs::rename(previous, &self.output_dir);
                self.had_previous = false;
            }
            return Err(e);
        }
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl MaterializerBackend for DocumentMaterializer {
    async fn stage(&mut self, snapshot: &Snapshot<'_>) -> Result<MaterializedOutput> {
        log::info!("📝 Staging document shards for: {}", self.output_dir.display());
        self.published = false;
        self.had_previous = false;

        if let Some(parent) = self.output_dir.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::write_failure(parent, e))?;
            }
        }

        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| PipelineError::write_failure(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| PipelineError::write_failure(&staging, e))?;

        let files = match self.write_all(&staging, snapshot) {
            Ok(files) => files,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(PipelineError::write_failure(&staging, e));
            }
        };

        log::info!(
            "✅ Staged {} document files ({} states, {} systems)",
            files,
            snapshot.regions.0.len(),
            snapshot.aggregate.len()
        );

        Ok(MaterializedOutput {
            backend: self.backend_type(),
            path: self.output_dir.clone(),
            artifacts: files,
            rows: snapshot.aggregate.len() as u64,
        })
    }

    fn publish(&mut self) -> Result<()> {
        let staging = self.staging_dir();
        let previous = self.previous_dir();
        self.swap_in(&staging, &previous).map_err(|e| {
            let _ = fs::remove_dir_all(&staging);
            PipelineError::write_failure(&self.output_dir, e)
        })?;
        self.published = true;
        log::info!("✅ Published documents: {}", self.output_dir.display());
        Ok(())
    }

    fn rollback(&mut self) {
        let staging = self.staging_dir();
        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                log::warn!("⚠️  Could not remove {}: {}", staging.display(), e);
            }
        }
        if !self.published {
            return;
        }

        let previous = self.previous_dir();
        if let Err(e) = fs::remove_dir_all(&self.output_dir) {
            log::error!("❌ Could not withdraw {}: {}", self.output_dir.display(), e);
            return;
        }
        if self.had_previous {
            if let Err(e) = fs::rename(&previous, &self.output_dir) {
                log::error!("❌ Could not restore {}: {}", self.output_dir.display(), e);
                return;
            }
        }
        self.published = false;
        self.had_previous = false;
        log::warn!("↩️  Restored previous documents: {}", self.output_dir.display());
    }

    fn commit(&mut self) {
        let previous = self.previous_dir();
        if self.had_previous && previous.exists() {
            if let Err(e) = fs::remove_dir_all(&previous) {
                log::warn!("⚠️  Could not remove {}: {}", previous.display(), e);
            }
        }
        self.published = false;
        self.had_previous = false;
    }

    fn backend_type(&self) -> &'static str {
        "Documents"
    }
}
