//! UCMR Lookup Binary - queries a published document directory
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin ucmr_lookup -- --zipcode 78701
//! cargo run --bin ucmr_lookup -- --state TX --name austin --limit 10 --offset 20
//! ```
//!
//! `--dir` overrides DOCUMENT_OUTPUT_DIR (default: api/data). At least one of
//! `--zipcode`, `--pwsid`, `--name`, or `--state` is required.

use std::env;
use waterquality::lookup::{DocumentStore, SearchQuery};
use waterquality::PipelineConfig;

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn parse_count(args: &[String], flag: &str) -> Result<Option<usize>, Box<dyn std::error::Error>> {
    match arg_value(args, flag) {
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|e| format!("{} expects a non-negative integer, got {:?}: {}", flag, raw, e).into()),
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let dir = arg_value(&args, "--dir")
        .map(Into::into)
        .unwrap_or_else(|| PipelineConfig::from_env().document_dir);

    let query = SearchQuery {
        pwsid: arg_value(&args, "--pwsid"),
        name: arg_value(&args, "--name"),
        state: arg_value(&args, "--state"),
        zip_code: arg_value(&args, "--zipcode"),
        limit: parse_count(&args, "--limit")?,
        offset: parse_count(&args, "--offset")?,
    };

    log::debug!("🔍 Query {:?} against {}", query, dir.display());

    let store = DocumentStore::open(&dir)?;
    let page = store.search(&query)?;
    println!("{}", serde_json::to_string_pretty(&page)?);

    Ok(())
}
