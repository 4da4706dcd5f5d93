//! Error taxonomy for a pipeline run
//!
//! Malformed fields and orphan references are not errors: they are recovered
//! where they occur and only show up as counters in the run report.

use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum PipelineError {
    /// Required input file missing or unreadable. Raised before any output is touched.
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Header arity does not match the fixed column contract for the file.
    SchemaMismatch {
        file: &'static str,
        expected: usize,
        found: usize,
    },
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
    /// An output artifact could not be persisted.
    WriteFailure { path: PathBuf, reason: String },
    InvalidConfig(String),
    InvalidQuery(String),
}

impl PipelineError {
    pub fn source_unavailable(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PipelineError::SourceUnavailable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn write_failure(path: impl AsRef<Path>, reason: impl std::fmt::Display) -> Self {
        PipelineError::WriteFailure {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// True for the errors that abort a run before anything was written.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable { .. } | PipelineError::SchemaMismatch { .. }
        )
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err)
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Database(err.to_string())
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::SourceUnavailable { path, source } => {
                write!(f, "Source unavailable: {} ({})", path.display(), source)
            }
            PipelineError::SchemaMismatch {
                file,
                expected,
                found,
            } => write!(
                f,
                "Schema mismatch in {} file: expected {} header fields, found {}",
                file, expected, found
            ),
            PipelineError::Io(e) => write!(f, "IO error: {}", e),
            PipelineError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PipelineError::Database(e) => write!(f, "Database error: {}", e),
            PipelineError::WriteFailure { path, reason } => {
                write!(f, "Failed to write {}: {}", path.display(), reason)
            }
            PipelineError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            PipelineError::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::SourceUnavailable { source, .. } => Some(source),
            PipelineError::Io(e) => Some(e),
            PipelineError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
