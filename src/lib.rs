//! UCMR water-quality ingestion pipeline
//!
//! Streams the tab-delimited UCMR sample file into per-water-system
//! summaries, joins the zip-code and supplementary files onto them, and
//! publishes a sharded document form and a relational snapshot.

pub mod aggregate;
pub mod config;
pub mod crossref;
pub mod error;
pub mod ingest;
pub mod lookup;
pub mod materialize;
pub mod pipeline;

pub use config::{OutputBackend, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{run, RunReport};
