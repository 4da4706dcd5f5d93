//! Pipeline configuration from environment variables and command-line flags

use crate::error::PipelineError;
use std::env;
use std::path::PathBuf;

/// Which materialized representations a run publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBackend {
    Documents,
    Sqlite,
    All,
}

impl OutputBackend {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "documents" | "json" => Some(OutputBackend::Documents),
            "sqlite" => Some(OutputBackend::Sqlite),
            "all" => Some(OutputBackend::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputBackend::Documents => "documents",
            OutputBackend::Sqlite => "sqlite",
            OutputBackend::All => "all",
        }
    }

    pub fn includes_documents(&self) -> bool {
        matches!(self, OutputBackend::Documents | OutputBackend::All)
    }

    pub fn includes_sqlite(&self) -> bool {
        matches!(self, OutputBackend::Sqlite | OutputBackend::All)
    }

    /// Parse `--backend <name>` from the process arguments, defaulting to `All`
    pub fn parse_from_args() -> Self {
        let args: Vec<String> = env::args().collect();
        Self::parse_from(&args)
    }

    fn parse_from(args: &[String]) -> Self {
        if let Some(idx) = args.iter().position(|x| x == "--backend") {
            match args.get(idx + 1).and_then(|s| OutputBackend::from_str(s)) {
                Some(backend) => return backend,
                None => log::warn!("Unknown --backend value, defaulting to all"),
            }
        }
        OutputBackend::All
    }
}

/// Configuration for a pipeline run
///
/// Loaded from environment variables with defaults matching the layout of
/// the upstream extract (UCMR5 flat files next to the working directory).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Primary samples file (tab-delimited, 24 columns)
    pub samples_path: PathBuf,

    /// Facility → zip code cross-reference file
    pub zip_codes_path: PathBuf,

    /// Supplementary response file; skipped when absent
    pub additional_data_path: PathBuf,

    /// Directory receiving the sharded document form
    pub document_dir: PathBuf,

    /// Relational snapshot file
    pub sqlite_path: PathBuf,

    /// Rows per insert transaction in the relational snapshot
    pub insert_batch_size: usize,

    /// Log progress every N rows
    pub progress_interval: u64,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `UCMR_SAMPLES_PATH` (default: data/UCMR5_All.txt)
    /// - `UCMR_ZIPCODES_PATH` (default: data/UCMR5_ZIPCodes.txt)
    /// - `UCMR_ADDITIONAL_PATH` (default: data/UCMR5_AddtlDataElem.txt)
    /// - `DOCUMENT_OUTPUT_DIR` (default: api/data)
    /// - `SNAPSHOT_DB_PATH` (default: ucmr5-data.db)
    /// - `INSERT_BATCH_SIZE` (default: 1000)
    /// - `PROGRESS_INTERVAL` (default: 100000)
    pub fn from_env() -> Self {
        Self {
            samples_path: env::var("UCMR_SAMPLES_PATH")
                .unwrap_or_else(|_| "data/UCMR5_All.txt".to_string())
                .into(),
            zip_codes_path: env::var("UCMR_ZIPCODES_PATH")
                .unwrap_or_else(|_| "data/UCMR5_ZIPCodes.txt".to_string())
                .into(),
            additional_data_path: env::var("UCMR_ADDITIONAL_PATH")
                .unwrap_or_else(|_| "data/UCMR5_AddtlDataElem.txt".to_string())
                .into(),
            document_dir: env::var("DOCUMENT_OUTPUT_DIR")
                .unwrap_or_else(|_| "api/data".to_string())
                .into(),
            sqlite_path: env::var("SNAPSHOT_DB_PATH")
                .unwrap_or_else(|_| "ucmr5-data.db".to_string())
                .into(),
            insert_batch_size: env::var("INSERT_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_000),
            progress_interval: env::var("PROGRESS_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100_000),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.insert_batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "INSERT_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.document_dir.as_os_str().is_empty() || self.sqlite_path.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "output paths cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        env::remove_var("UCMR_SAMPLES_PATH");
        env::remove_var("INSERT_BATCH_SIZE");
        env::remove_var("DOCUMENT_OUTPUT_DIR");

        let config = PipelineConfig::from_env();

        assert_eq!(config.samples_path, PathBuf::from("data/UCMR5_All.txt"));
        assert_eq!(config.document_dir, PathBuf::from("api/data"));
        assert_eq!(config.insert_batch_size, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = PipelineConfig::from_env();
        config.insert_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_parsing() {
        let args: Vec<String> = vec!["ucmr_ingest".into(), "--backend".into(), "sqlite".into()];
        assert_eq!(OutputBackend::parse_from(&args), OutputBackend::Sqlite);

        let args: Vec<String> = vec!["ucmr_ingest".into()];
        assert_eq!(OutputBackend::parse_from(&args), OutputBackend::All);

        let args: Vec<String> = vec!["ucmr_ingest".into(), "--backend".into(), "bogus".into()];
        assert_eq!(OutputBackend::parse_from(&args), OutputBackend::All);

        assert!(OutputBackend::Documents.includes_documents());
        assert!(!OutputBackend::Documents.includes_sqlite());
    }
}
