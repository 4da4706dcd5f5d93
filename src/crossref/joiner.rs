//! Merges the zip code and supplementary response streams into the aggregate

use super::index::{ZipCodeIndex, ZipEntry};
use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::ingest::{AdditionalDataRecord, ParseStats, RecordReader, ZipCodeRecord};
use std::collections::BTreeMap;
use tokio::io::AsyncBufRead;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    pub zip_rows: u64,
    /// Pairs whose facility was known from the samples pass
    pub zip_joined: u64,
    /// Pairs kept only in the zip index
    pub zip_orphans: u64,
    /// Rows with an empty pwsid or zip code
    pub zip_skipped: u64,
    pub additional_rows: u64,
    pub additional_orphans: u64,
    pub zip_parse: ParseStats,
    pub additional_parse: ParseStats,
}

/// Supplementary responses keyed by facility id, in file order per facility
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalData {
    by_pwsid: BTreeMap<String, Vec<AdditionalDataRecord>>,
}

impl AdditionalData {
    pub fn push(&mut self, record: AdditionalDataRecord) {
        self.by_pwsid
            .entry(record.pwsid.clone())
            .or_default()
            .push(record);
    }

    pub fn get(&self, pwsid: &str) -> &[AdditionalDataRecord] {
        self.by_pwsid.get(pwsid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_pwsid.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pwsid.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &AdditionalDataRecord> {
        self.by_pwsid.values().flatten()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<AdditionalDataRecord>> {
        &self.by_pwsid
    }
}

/// Everything the joiner produced besides the updated aggregate
#[derive(Debug, Clone, Default)]
pub struct CrossReferences {
    pub zip_index: ZipCodeIndex,
    pub additional: AdditionalData,
    pub stats: JoinStats,
}

pub struct CrossReferenceJoiner {
    refs: CrossReferences,
}

impl CrossReferenceJoiner {
    pub fn new() -> Self {
        Self {
            refs: CrossReferences::default(),
        }
    }

    /// Add one pair to the zip index, and to the facility when it is known
    ///
    /// Returns whether the facility was found in the aggregate.
    pub fn join_zip(&mut self, aggregate: &mut Aggregate, record: &ZipCodeRecord) -> bool {
        let stats = &mut self.refs.stats;
        stats.zip_rows += 1;

        if record.pwsid.is_empty() || record.zip_code.is_empty() {
            stats.zip_skipped += 1;
            return false;
        }

        let state = match aggregate.get_mut(&record.pwsid) {
            Some(summary) => {
                summary.zip_codes.insert(record.zip_code.clone());
                stats.zip_joined += 1;
                Some(summary.state.clone())
            }
            None => {
                stats.zip_orphans += 1;
                log::debug!("Zip code {} references unknown system {}", record.zip_code, record.pwsid);
                None
            }
        };

        let known = state.is_some();
        self.refs.zip_index.insert(
            &record.zip_code,
            ZipEntry {
                pwsid: record.pwsid.clone(),
                state,
            },
        );
        known
    }

    /// Keep a supplementary response; orphans are retained but counted
    pub fn fold_response(&mut self, aggregate: &Aggregate, record: AdditionalDataRecord) {
        self.refs.stats.additional_rows += 1;
        if aggregate.get(&record.pwsid).is_none() {
            self.refs.stats.additional_orphans += 1;
        }
        self.refs.additional.push(record);
    }

    pub async fn ingest_zip_codes<R: AsyncBufRead + Unpin>(
        &mut self,
        aggregate: &mut Aggregate,
        reader: &mut RecordReader<R, ZipCodeRecord>,
    ) -> Result<()> {
        while let Some(record) = reader.next_record().await? {
            self.join_zip(aggregate, &record);
        }
        self.refs.stats.zip_parse = reader.stats();

        let stats = &self.refs.stats;
        if stats.zip_orphans > 0 {
            log::warn!(
                "⚠️  {} zip code rows reference systems without samples (kept in zip index only)",
                stats.zip_orphans
            );
        }
        log::info!(
            "✅ Zip codes joined: {} rows, {} zip codes indexed",
            stats.zip_rows,
            self.refs.zip_index.zip_count()
        );
        Ok(())
    }

    pub async fn ingest_additional_data<R: AsyncBufRead + Unpin>(
        &mut self,
        aggregate: &Aggregate,
        reader: &mut RecordReader<R, AdditionalDataRecord>,
    ) -> Result<()> {
        while let Some(record) = reader.next_record().await? {
            self.fold_response(aggregate, record);
        }
        self.refs.stats.additional_parse = reader.stats();

        let stats = &self.refs.stats;
        if stats.additional_orphans > 0 {
            log::warn!(
                "⚠️  {} supplementary responses reference systems without samples",
                stats.additional_orphans
            );
        }
        log::info!("✅ Supplementary responses folded: {} rows", stats.additional_rows);
        Ok(())
    }

    pub fn finish(self) -> CrossReferences {
        self.refs
    }
}

impl Default for CrossReferenceJoiner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationContext;
    use crate::ingest::{ResultSign, SampleRecord};

    fn aggregate_with(pwsids: &[(&str, &str)]) -> Aggregate {
        let mut ctx = AggregationContext::new(0);
        for (pwsid, state) in pwsids {
            ctx.fold_sample(&SampleRecord {
                pwsid: pwsid.to_string(),
                pws_name: format!("System {}", pwsid),
                state: state.to_string(),
                epa_region: None,
                contaminant: "PFOA".to_string(),
                result_value: None,
                result_sign: ResultSign::BelowLimit,
                mrl: Some(0.004),
                units: "µg/L".to_string(),
                collection_date: "2023-01-01".to_string(),
                sample_id: "S".to_string(),
                facility_id: String::new(),
                facility_name: String::new(),
                sample_point_id: String::new(),
                sample_point_name: String::new(),
                size: "S".to_string(),
                monitoring_requirement: String::new(),
                method_id: String::new(),
            });
        }
        ctx.finish().0
    }

    fn zip(pwsid: &str, zip_code: &str) -> ZipCodeRecord {
        ZipCodeRecord {
            pwsid: pwsid.to_string(),
            zip_code: zip_code.to_string(),
        }
    }

    #[test]
    fn test_orphans_are_kept_in_zip_index_only() {
        let mut aggregate = aggregate_with(&[("NM1", "NM")]);
        let mut joiner = CrossReferenceJoiner::new();

        assert!(joiner.join_zip(&mut aggregate, &zip("NM1", "87001")));
        assert!(!joiner.join_zip(&mut aggregate, &zip("NM404", "87001")));
        assert!(joiner.join_zip(&mut aggregate, &zip("NM1", "87002")));

        let refs = joiner.finish();
        assert!(refs.zip_index.contains("87001", "NM1"));
        assert!(refs.zip_index.contains("87001", "NM404"));
        assert_eq!(refs.stats.zip_orphans, 1);
        assert_eq!(aggregate.len(), 1);

        let entries: Vec<&ZipEntry> = refs.zip_index.get("87001").unwrap().iter().collect();
        assert_eq!(entries[0].state.as_deref(), Some("NM"));
        assert_eq!(entries[1].state, None);

        let summary = aggregate.get("NM1").unwrap();
        assert_eq!(summary.zip_codes.iter().collect::<Vec<_>>(), vec!["87001", "87002"]);
    }

    #[test]
    fn test_duplicate_pairs_collapse() {
        let mut aggregate = aggregate_with(&[("NM1", "NM")]);
        let mut joiner = CrossReferenceJoiner::new();
        joiner.join_zip(&mut aggregate, &zip("NM1", "87001"));
        joiner.join_zip(&mut aggregate, &zip("NM1", "87001"));
        joiner.join_zip(&mut aggregate, &zip("", "87001"));

        let refs = joiner.finish();
        assert_eq!(refs.zip_index.pairs().count(), 1);
        assert_eq!(refs.stats.zip_rows, 3);
        assert_eq!(refs.stats.zip_skipped, 1);
        assert_eq!(aggregate.get("NM1").unwrap().zip_codes.len(), 1);
    }

    #[test]
    fn test_additional_responses_keyed_by_pwsid() {
        let aggregate = aggregate_with(&[("NM1", "NM")]);
        let mut joiner = CrossReferenceJoiner::new();
        let response = |pwsid: &str, element: &str| AdditionalDataRecord {
            pwsid: pwsid.to_string(),
            facility_id: None,
            sample_point_id: None,
            sample_event_code: None,
            data_element: element.to_string(),
            response: "Yes".to_string(),
            other_text: None,
        };
        joiner.fold_response(&aggregate, response("NM1", "Treatment"));
        joiner.fold_response(&aggregate, response("NM1", "Disinfectant"));
        joiner.fold_response(&aggregate, response("XX9", "Treatment"));

        let refs = joiner.finish();
        assert_eq!(refs.additional.len(), 3);
        assert_eq!(refs.additional.get("NM1").len(), 2);
        assert_eq!(refs.additional.get("NM1")[1].data_element, "Disinfectant");
        assert_eq!(refs.stats.additional_orphans, 1);
    }
}
