//! UCMR Ingest Binary - builds the published outputs from the raw extracts
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin ucmr_ingest -- --backend all
//! ```
//!
//! `--backend` accepts `documents`, `sqlite`, or `all` (default).
//!
//! ## Environment Variables
//!
//! - UCMR_SAMPLES_PATH - Sample results file (default: data/UCMR5_All.txt)
//! - UCMR_ZIPCODES_PATH - System to zip code file (default: data/UCMR5_ZIPCodes.txt)
//! - UCMR_ADDITIONAL_PATH - Supplementary responses, optional (default: data/UCMR5_AddtlDataElem.txt)
//! - DOCUMENT_OUTPUT_DIR - Document output directory (default: api/data)
//! - SNAPSHOT_DB_PATH - SQLite snapshot path (default: ucmr5-data.db)
//! - INSERT_BATCH_SIZE - Rows per insert transaction (default: 1000)
//! - PROGRESS_INTERVAL - Rows between progress lines (default: 100000)
//! - RUST_LOG - Logging level (optional, default: info)

use waterquality::{OutputBackend, PipelineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let backend = OutputBackend::parse_from_args();
    let config = PipelineConfig::from_env();

    log::info!("🚀 Starting UCMR ingest");
    log::info!("   Samples: {}", config.samples_path.display());
    log::info!("   Zip codes: {}", config.zip_codes_path.display());
    log::info!("   Supplementary: {}", config.additional_data_path.display());
    log::info!("   Backend: {}", backend.as_str());
    if backend.includes_documents() {
        log::info!("   Documents: {}", config.document_dir.display());
    }
    if backend.includes_sqlite() {
        log::info!("   Snapshot: {}", config.sqlite_path.display());
    }

    let report = match waterquality::run(&config, backend).await {
        Ok(report) => report,
        Err(e) => {
            log::error!("❌ Ingest failed: {}", e);
            return Err(e.into());
        }
    };

    log::info!("✅ Ingest finished in {:.1}s", report.elapsed_secs);
    log::info!("   ├─ Rows: {}", report.aggregation.rows);
    log::info!("   ├─ Water systems: {}", report.aggregation.facilities);
    log::info!("   ├─ States: {}", report.states);
    log::info!(
        "   ├─ Zip pairs: {} joined, {} orphaned, {} skipped",
        report.join.zip_joined,
        report.join.zip_orphans,
        report.join.zip_skipped
    );
    log::info!(
        "   ├─ Supplementary rows: {} ({} orphaned)",
        report.join.additional_rows,
        report.join.additional_orphans
    );
    for output in &report.outputs {
        log::info!(
            "   └─ {}: {} artifacts, {} rows → {}",
            output.backend,
            output.artifacts,
            output.rows,
            output.path.display()
        );
    }

    Ok(())
}
