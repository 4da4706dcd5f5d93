//! Relational snapshot: raw facts plus summaries recomputed by grouped queries
//!
//! Built at `<path>.tmp` and renamed over `<path>` only after `VACUUM`, so a
//! failed run leaves the previous snapshot untouched.

use super::sqlite_pragma::apply_bulk_load_pragmas;
use super::{MaterializedOutput, MaterializerBackend, Snapshot};
use crate::crossref::{AdditionalData, ZipCodeIndex};
use crate::error::{PipelineError, Result};
use crate::ingest::{SampleReader, SampleRecord};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};

const SCHEMA_SQL: &str = r#"
CREATE TABLE water_quality (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pwsid TEXT NOT NULL,
    pws_name TEXT NOT NULL,
    state TEXT NOT NULL,
    region INTEGER,
    contaminant TEXT NOT NULL,
    result_value REAL,
    result_sign TEXT,
    mrl REAL,
    units TEXT,
    collection_date TEXT,
    sample_id TEXT,
    facility_id TEXT,
    facility_name TEXT,
    sample_point_id TEXT,
    sample_point_name TEXT,
    size TEXT,
    monitoring_requirement TEXT,
    method_id TEXT
);

CREATE TABLE pws_zipcodes (
    pwsid TEXT NOT NULL,
    zipcode TEXT NOT NULL,
    PRIMARY KEY (pwsid, zipcode)
);

CREATE TABLE additional_data (
    pwsid TEXT NOT NULL,
    facility_id TEXT,
    sample_point_id TEXT,
    sample_event_code TEXT,
    data_element TEXT,
    response TEXT,
    other_text TEXT
);

CREATE TABLE pws_summary (
    pwsid TEXT PRIMARY KEY,
    pws_name TEXT NOT NULL,
    state TEXT NOT NULL,
    region INTEGER,
    size TEXT,
    zip_codes TEXT NOT NULL,
    contaminants_detected INTEGER NOT NULL,
    last_test_date TEXT,
    total_samples INTEGER NOT NULL
);

CREATE TABLE contaminant_results (
    pwsid TEXT NOT NULL,
    contaminant TEXT NOT NULL,
    units TEXT,
    mrl REAL,
    max_value REAL,
    detected INTEGER NOT NULL,
    below_limit_seen INTEGER NOT NULL,
    test_count INTEGER NOT NULL,
    last_collection_date TEXT
);
"#;

const INDEX_SQL: &str = r#"
CREATE INDEX idx_wq_pwsid ON water_quality(pwsid);
CREATE INDEX idx_wq_state ON water_quality(state);
CREATE INDEX idx_wq_contaminant ON water_quality(contaminant);
CREATE INDEX idx_wq_collection_date ON water_quality(collection_date);
CREATE INDEX idx_pz_zipcode ON pws_zipcodes(zipcode);
CREATE INDEX idx_ad_pwsid ON additional_data(pwsid);
"#;

// Descriptive fields come from each facility's first row (first-seen wins).
// Detection requires an exact result with a value, matching the streaming fold.
const SUMMARY_SQL: &str = r#"
WITH firsts AS (
    SELECT pwsid, MIN(id) AS first_id
    FROM water_quality
    GROUP BY pwsid
),
stats AS (
    SELECT
        pwsid,
        COUNT(DISTINCT CASE
            WHEN result_sign = '=' AND result_value IS NOT NULL
            THEN contaminant
        END) AS contaminants_detected,
        MAX(NULLIF(collection_date, '')) AS last_test_date,
        COUNT(DISTINCT NULLIF(sample_id, '')) AS total_samples
    FROM water_quality
    GROUP BY pwsid
)
INSERT INTO pws_summary (
    pwsid, pws_name, state, region, size, zip_codes,
    contaminants_detected, last_test_date, total_samples
)
SELECT
    f.pwsid,
    wq.pws_name,
    wq.state,
    wq.region,
    wq.size,
    (SELECT json_group_array(zipcode)
     FROM (SELECT zipcode FROM pws_zipcodes z WHERE z.pwsid = f.pwsid ORDER BY zipcode)),
    s.contaminants_detected,
    s.last_test_date,
    s.total_samples
FROM firsts f
JOIN water_quality wq ON wq.id = f.first_id
JOIN stats s ON s.pwsid = f.pwsid;

CREATE INDEX idx_summary_state ON pws_summary(state);

INSERT INTO contaminant_results (
    pwsid, contaminant, units, mrl, max_value, detected,
    below_limit_seen, test_count, last_collection_date
)
SELECT
    pwsid,
    contaminant,
    units,
    mrl,
    MAX(CASE WHEN result_sign = '=' THEN result_value END),
    MAX(CASE WHEN result_sign = '=' AND result_value IS NOT NULL THEN 1 ELSE 0 END),
    MAX(CASE WHEN result_sign = '<' THEN 1 ELSE 0 END),
    COUNT(*),
    MAX(NULLIF(collection_date, ''))
FROM water_quality
GROUP BY pwsid, contaminant, units, mrl;

CREATE INDEX idx_cr_pwsid ON contaminant_results(pwsid, contaminant);
"#;

const INSERT_SAMPLE_SQL: &str = "INSERT INTO water_quality (
    pwsid, pws_name, state, region, contaminant, result_value, result_sign,
    mrl, units, collection_date, sample_id, facility_id, facility_name,
    sample_point_id, sample_point_name, size, monitoring_requirement, method_id
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)";

const TABLE_COUNT: usize = 5;

pub struct SqliteMaterializer {
    db_path: PathBuf,
    samples_path: PathBuf,
    batch_size: usize,
    progress_interval: u64,
    published: bool,
    had_previous: bool,
}

impl SqliteMaterializer {
    pub fn new(db_path: PathBuf, samples_path: PathBuf, batch_size: usize, progress_interval: u64) -> Self {
        Self {
            db_path,
            samples_path,
            batch_size: batch_size.max(1),
            progress_interval,
            published: false,
            had_previous: false,
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .db_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.db_path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn previous_path(&self) -> PathBuf {
        self.sibling(".previous")
    }

    /// Re-stream the samples file into `water_quality`, one transaction per batch
    async fn load_samples(&self, conn: &mut Connection) -> Result<u64> {
        let mut reader = SampleReader::open(&self.samples_path).await?;
        let mut batch: Vec<SampleRecord> = Vec::with_capacity(self.batch_size);
        let mut rows: u64 = 0;

        while let Some(record) = reader.next_record().await? {
            batch.push(record);
            if batch.len() >= self.batch_size {
                rows += flush_batch(conn, &mut batch)?;
                if self.progress_interval > 0 && rows % self.progress_interval < self.batch_size as u64 {
                    log::info!("   ├─ Inserted {} sample rows", rows);
                }
            }
        }
        rows += flush_batch(conn, &mut batch)?;

        Ok(rows)
    }

    async fn build(&self, path: &Path, snapshot: &Snapshot<'_>) -> Result<u64> {
        let mut conn = Connection::open(path)?;
        apply_bulk_load_pragmas(&conn)?;
        conn.execute_batch(SCHEMA_SQL)?;

        let rows = self.load_samples(&mut conn).await?;
        if rows != snapshot.sample_rows {
            return Err(PipelineError::write_failure(
                path,
                format!(
                    "samples file changed between passes ({} rows aggregated, {} rows loaded)",
                    snapshot.sample_rows, rows
                ),
            ));
        }

        insert_zip_codes(&mut conn, &snapshot.refs.zip_index)?;
        insert_additional_data(&mut conn, &snapshot.refs.additional)?;

        log::info!("🔧 Creating indexes and summary tables...");
        conn.execute_batch(INDEX_SQL)?;
        conn.execute_batch(SUMMARY_SQL)?;

        log::info!("🔧 Optimizing database...");
        conn.execute_batch("VACUUM")?;
        conn.close().map_err(|(_, e)| PipelineError::from(e))?;

        Ok(rows)
    }
}

fn flush_batch(conn: &mut Connection, batch: &mut Vec<SampleRecord>) -> Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(INSERT_SAMPLE_SQL)?;
        for s in batch.iter() {
            stmt.execute(params![
                s.pwsid,
                s.pws_name,
                s.state,
                s.epa_region,
                s.contaminant,
                s.result_value,
                s.result_sign.as_symbol(),
                s.mrl,
                s.units,
                s.collection_date,
                s.sample_id,
                s.facility_id,
                s.facility_name,
                s.sample_point_id,
                s.sample_point_name,
                s.size,
                s.monitoring_requirement,
                s.method_id,
            ])?;
        }
    }
    tx.commit()?;

    let count = batch.len() as u64;
    log::debug!("✅ Flushed {} sample rows to SQLite", count);
    batch.clear();
    Ok(count)
}

fn insert_zip_codes(conn: &mut Connection, index: &ZipCodeIndex) -> Result<u64> {
    let tx = conn.transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare_cached("INSERT OR IGNORE INTO pws_zipcodes (pwsid, zipcode) VALUES (?1, ?2)")?;
        for (pwsid, zip_code) in index.pairs() {
            count += stmt.execute(params![pwsid, zip_code])? as u64;
        }
    }
    tx.commit()?;
    log::info!("   ├─ Inserted {} zip code pairs", count);
    Ok(count)
}

fn insert_additional_data(conn: &mut Connection, additional: &AdditionalData) -> Result<u64> {
    let tx = conn.transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO additional_data (
                pwsid, facility_id, sample_point_id, sample_event_code,
                data_element, response, other_text
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in additional.records() {
            stmt.execute(params![
                r.pwsid,
                r.facility_id,
                r.sample_point_id,
                r.sample_event_code,
                r.data_element,
                r.response,
                r.other_text,
            ])?;
            count += 1;
        }
    }
    tx.commit()?;
    log::info!("   ├─ Inserted {} supplementary responses", count);
    Ok(count)
}

#[async_trait]
impl MaterializerBackend for SqliteMaterializer {
    async fn stage(&mut self, snapshot: &Snapshot<'_>) -> Result<MaterializedOutput> {
        log::info!("📝 Building relational snapshot for: {}", self.db_path.display());
        self.published = false;
        self.had_previous = false;

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PipelineError::write_failure(parent, e))?;
            }
        }

        let temp = self.temp_path();
        if temp.exists() {
            fs::remove_file(&temp).map_err(|e| PipelineError::write_failure(&temp, e))?;
        }

        let rows = match self.build(&temp, snapshot).await {
            Ok(rows) => rows,
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(match e {
                    e @ PipelineError::WriteFailure { .. } => e,
                    e if e.is_source_error() => e,
                    e => PipelineError::write_failure(&self.db_path, e),
                });
            }
        };

        let size_mb = fs::metadata(&temp)
            .map(|m| m.len() as f64 / 1024.0 / 1024.0)
            .unwrap_or(0.0);
        log::info!(
            "✅ Relational snapshot staged: {} sample rows, {:.2} MB",
            rows,
            size_mb
        );

        Ok(MaterializedOutput {
            backend: self.backend_type(),
            path: self.db_path.clone(),
            artifacts: TABLE_COUNT,
            rows,
        })
    }

    fn publish(&mut self) -> Result<()> {
        let temp = self.temp_path();
        let previous = self.previous_path();

        if previous.exists() {
            fs::remove_file(&previous).map_err(|e| PipelineError::write_failure(&previous, e))?;
        }
        if self.db_path.exists() {
            fs::rename(&self.db_path, &previous)
                .map_err(|e| PipelineError::write_failure(&self.db_path, e))?;
            self.had_previous = true;
        }
        if let Err(e) = fs::rename(&temp, &self.db_path) {
            if self.had_previous {
                let _ = fs::rename(&previous, &self.db_path);
                self.had_previous = false;
            }
            let _ = fs::remove_file(&temp);
            return Err(PipelineError::write_failure(&self.db_path, e));
        }

        self.published = true;
        log::info!("✅ Published relational snapshot: {}", self.db_path.display());
        Ok(())
    }

    fn rollback(&mut self) {
        let temp = self.temp_path();
        if temp.exists() {
            if let Err(e) = fs::remove_file(&temp) {
                log::warn!("⚠️  Could not remove {}: {}", temp.display(), e);
            }
        }
        if !self.published {
            return;
        }

        if self.had_previous {
            if let Err(e) = fs::rename(self.previous_path(), &self.db_path) {
                log::error!("❌ Could not restore {}: {}", self.db_path.display(), e);
                return;
            }
        } else if let Err(e) = fs::remove_file(&self.db_path) {
            log::error!("❌ Could not withdraw {}: {}", self.db_path.display(), e);
            return;
        }
        self.published = false;
        self.had_previous = false;
        log::warn!("↩️  Restored previous snapshot: {}", self.db_path.display());
    }

    fn commit(&mut self) {
        let previous = self.previous_path();
        if self.had_previous && previous.exists() {
            if let Err(e) = fs::remove_file(&previous) {
                log::warn!("⚠️  Could not remove {}: {}", previous.display(), e);
            }
        }
        self.published = false;
        self.had_previous = false;
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregate, AggregationContext};
    use crate::crossref::{CrossReferenceJoiner, CrossReferences, RegionIndex};
    use crate::ingest::{schema, AdditionalDataRecord, RecordReader, ZipCodeRecord};
    use tempfile::tempdir;

    const HEADER_FIELDS: usize = schema::SAMPLES.arity;

    fn line(pwsid: &str, name: &str, contaminant: &str, value: &str, sign: &str, date: &str, sample_id: &str) -> String {
        let mut cols = vec![String::new(); HEADER_FIELDS];
        cols[0] = pwsid.to_string();
        cols[1] = name.to_string();
        cols[2] = "WA".to_string();
        cols[3] = "10".to_string();
        cols[4] = contaminant.to_string();
        cols[7] = value.to_string();
        cols[8] = sign.to_string();
        cols[9] = "0.004".to_string();
        cols[10] = "µg/L".to_string();
        cols[11] = date.to_string();
        cols[13] = sample_id.to_string();
        cols[21] = "L".to_string();
        cols.join("\t")
    }

    async fn setup(dir: &Path, lines: &[String]) -> (PathBuf, Aggregate, CrossReferences, u64) {
        let samples = dir.join("samples.txt");
        let header = vec!["col"; HEADER_FIELDS].join("\t");
        fs::write(&samples, format!("{}\n{}\n", header, lines.join("\n"))).unwrap();

        let mut ctx = AggregationContext::new(0);
        let mut reader = RecordReader::<_, SampleRecord>::open(&samples).await.unwrap();
        ctx.ingest(&mut reader).await.unwrap();
        let (mut aggregate, stats) = ctx.finish();

        let mut joiner = CrossReferenceJoiner::new();
        for (pwsid, zip) in [("WA1", "98101"), ("WA1", "98102"), ("WA9", "98109")] {
            joiner.join_zip(
                &mut aggregate,
                &ZipCodeRecord {
                    pwsid: pwsid.to_string(),
                    zip_code: zip.to_string(),
                },
            );
        }
        joiner.fold_response(
            &aggregate,
            AdditionalDataRecord {
                pwsid: "WA1".to_string(),
                facility_id: Some("F1".to_string()),
                sample_point_id: None,
                sample_event_code: Some("SE1".to_string()),
                data_element: "DisinfectantType".to_string(),
                response: "CLGA".to_string(),
                other_text: None,
            },
        );
        (samples, aggregate, joiner.finish(), stats.rows)
    }

    #[tokio::test]
    async fn test_snapshot_tables_and_summary() {
        let dir = tempdir().unwrap();
        let lines = vec![
            line("WA1", "Seattle", "PFOA", "", "<", "2023-01-10", "S1"),
            line("WA1", "Seattle Renamed", "PFOA", "5", "=", "2023-03-10", "S2"),
            line("WA1", "Seattle", "PFOS", "", "<", "2023-03-10", "S2"),
            line("WA2", "Tacoma", "PFOA", "", "<", "2023-02-01", "S3"),
        ];
        let (samples, aggregate, refs, sample_rows) = setup(dir.path(), &lines).await;
        let regions = RegionIndex::build(&aggregate);
        let snapshot = Snapshot {
            aggregate: &aggregate,
            refs: &refs,
            regions: &regions,
            sample_rows,
        };

        let db_path = dir.path().join("out").join("snapshot.db");
        let mut materializer = SqliteMaterializer::new(db_path.clone(), samples, 2, 0);
        let output = materializer.materialize(&snapshot).await.unwrap();
        assert_eq!(output.rows, 4);
        assert!(!dir.path().join("out").join("snapshot.db.tmp").exists());

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM water_quality", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 4);

        let (name, zips, detected, last, total): (String, String, i64, String, i64) = conn
            .query_row(
                "SELECT pws_name, zip_codes, contaminants_detected, last_test_date, total_samples
                 FROM pws_summary WHERE pwsid = 'WA1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();
        assert_eq!(name, "Seattle");
        assert_eq!(zips, r#"["98101","98102"]"#);
        assert_eq!(detected, 1);
        assert_eq!(last, "2023-03-10");
        assert_eq!(total, 2);

        let summary = aggregate.get("WA1").unwrap();
        assert_eq!(detected as usize, summary.contaminants_detected());
        assert_eq!(total as usize, summary.total_samples());
        assert_eq!(Some(last), summary.last_test_date);

        // exact result beats the earlier below-limit row
        let (max_value, detected_flag): (Option<f64>, i64) = conn
            .query_row(
                "SELECT max_value, detected FROM contaminant_results
                 WHERE pwsid = 'WA1' AND contaminant = 'PFOA'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(max_value, Some(5.0));
        assert_eq!(detected_flag, 1);

        // orphan pairs are kept in the join table
        let orphan: i64 = conn
            .query_row("SELECT COUNT(*) FROM pws_zipcodes WHERE pwsid = 'WA9'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphan, 1);

        let empty_zips: String = conn
            .query_row("SELECT zip_codes FROM pws_summary WHERE pwsid = 'WA2'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(empty_zips, "[]");

        let responses: i64 = conn
            .query_row("SELECT COUNT(*) FROM additional_data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(responses, 1);
    }

    #[tokio::test]
    async fn test_indexes_created() {
        let dir = tempdir().unwrap();
        let lines = vec![line("WA1", "Seattle", "PFOA", "1.5", "=", "2023-01-10", "S1")];
        let (samples, aggregate, refs, sample_rows) = setup(dir.path(), &lines).await;
        let regions = RegionIndex::build(&aggregate);
        let snapshot = Snapshot {
            aggregate: &aggregate,
            refs: &refs,
            regions: &regions,
            sample_rows,
        };

        let db_path = dir.path().join("snapshot.db");
        SqliteMaterializer::new(db_path.clone(), samples, 1000, 0)
            .materialize(&snapshot)
            .await
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        for expected in [
            "idx_wq_pwsid",
            "idx_wq_state",
            "idx_wq_contaminant",
            "idx_wq_collection_date",
            "idx_pz_zipcode",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing index {}", expected);
        }
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_snapshot() {
        let dir = tempdir().unwrap();
        let lines = vec![line("WA1", "Seattle", "PFOA", "1.5", "=", "2023-01-10", "S1")];
        let (samples, aggregate, refs, sample_rows) = setup(dir.path(), &lines).await;
        let regions = RegionIndex::build(&aggregate);

        let db_path = dir.path().join("snapshot.db");
        fs::write(&db_path, b"previous run").unwrap();

        // row count disagrees with the aggregation pass
        let snapshot = Snapshot {
            aggregate: &aggregate,
            refs: &refs,
            regions: &regions,
            sample_rows: sample_rows + 1,
        };
        let result = SqliteMaterializer::new(db_path.clone(), samples, 1000, 0)
            .materialize(&snapshot)
            .await;

        assert!(matches!(result, Err(PipelineError::WriteFailure { .. })));
        assert_eq!(fs::read(&db_path).unwrap(), b"previous run");
        assert!(!dir.path().join("snapshot.db.tmp").exists());
    }

    #[tokio::test]
    async fn test_rollback_after_publish_restores_previous_snapshot() {
        let dir = tempdir().unwrap();
        let lines = vec![line("WA1", "Seattle", "PFOA", "1.5", "=", "2023-01-10", "S1")];
        let (samples, aggregate, refs, sample_rows) = setup(dir.path(), &lines).await;
        let regions = RegionIndex::build(&aggregate);
        let snapshot = Snapshot {
            aggregate: &aggregate,
            refs: &refs,
            regions: &regions,
            sample_rows,
        };

        let db_path = dir.path().join("snapshot.db");
        fs::write(&db_path, b"previous run").unwrap();

        let mut materializer = SqliteMaterializer::new(db_path.clone(), samples, 1000, 0);
        materializer.stage(&snapshot).await.unwrap();
        assert_eq!(fs::read(&db_path).unwrap(), b"previous run");

        materializer.publish().unwrap();
        assert_ne!(fs::read(&db_path).unwrap(), b"previous run");

        materializer.rollback();

        assert_eq!(fs::read(&db_path).unwrap(), b"previous run");
        assert!(!dir.path().join("snapshot.db.tmp").exists());
        assert!(!dir.path().join("snapshot.db.previous").exists());
    }

    #[tokio::test]
    async fn test_commit_drops_previous_snapshot() {
        let dir = tempdir().unwrap();
        let lines = vec![line("WA1", "Seattle", "PFOA", "1.5", "=", "2023-01-10", "S1")];
        let (samples, aggregate, refs, sample_rows) = setup(dir.path(), &lines).await;
        let regions = RegionIndex::build(&aggregate);
        let snapshot = Snapshot {
            aggregate: &aggregate,
            refs: &refs,
            regions: &regions,
            sample_rows,
        };

        let db_path = dir.path().join("snapshot.db");
        fs::write(&db_path, b"previous run").unwrap();

        SqliteMaterializer::new(db_path.clone(), samples, 1000, 0)
            .materialize(&snapshot)
            .await
            .unwrap();

        assert!(!dir.path().join("snapshot.db.previous").exists());
        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM water_quality", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
