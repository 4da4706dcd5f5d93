//! Single-pass fold of the samples stream into per-facility summaries

use super::summary::WaterSystemSummary;
use crate::error::Result;
use crate::ingest::{ParseStats, RecordReader, SampleRecord};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tokio::io::AsyncBufRead;

/// Counters reported once the samples pass ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub rows: u64,
    pub facilities: usize,
    /// Rows whose facility name differed from the first-seen name
    pub name_conflicts: u64,
    pub parse: ParseStats,
}

/// The finished aggregate, handed by value to the joiner and materializers
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub systems: BTreeMap<String, WaterSystemSummary>,
}

impl Aggregate {
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn get(&self, pwsid: &str) -> Option<&WaterSystemSummary> {
        self.systems.get(pwsid)
    }

    pub fn get_mut(&mut self, pwsid: &str) -> Option<&mut WaterSystemSummary> {
        self.systems.get_mut(pwsid)
    }

    /// Summaries grouped by state, each group ordered by name then pwsid
    pub fn by_state(&self) -> BTreeMap<&str, Vec<&WaterSystemSummary>> {
        let mut shards: BTreeMap<&str, Vec<&WaterSystemSummary>> = BTreeMap::new();
        for summary in self.systems.values() {
            shards.entry(summary.state.as_str()).or_default().push(summary);
        }
        for systems in shards.values_mut() {
            systems.sort_by(|a, b| a.pws_name.cmp(&b.pws_name).then_with(|| a.pwsid.cmp(&b.pwsid)));
        }
        shards
    }
}

/// Owns the in-progress aggregate for exactly one run
pub struct AggregationContext {
    aggregate: Aggregate,
    stats: AggregationStats,
    progress_interval: u64,
}

impl AggregationContext {
    pub fn new(progress_interval: u64) -> Self {
        Self {
            aggregate: Aggregate::default(),
            stats: AggregationStats::default(),
            progress_interval,
        }
    }

    pub fn fold_sample(&mut self, sample: &SampleRecord) {
        self.stats.rows += 1;

        let summary = match self.aggregate.systems.entry(sample.pwsid.clone()) {
            Entry::Occupied(entry) => {
                let summary = entry.into_mut();
                if summary.pws_name != sample.pws_name {
                    self.stats.name_conflicts += 1;
                }
                summary
            }
            Entry::Vacant(entry) => entry.insert(WaterSystemSummary::seed(sample)),
        };
        summary.fold(sample);

        if self.progress_interval > 0 && self.stats.rows % self.progress_interval == 0 {
            log::info!(
                "   ├─ Aggregated {} rows ({} systems)",
                self.stats.rows,
                self.aggregate.len()
            );
        }
    }

    /// Drain a samples reader to the end of input
    pub async fn ingest<R: AsyncBufRead + Unpin>(
        &mut self,
        reader: &mut RecordReader<R, SampleRecord>,
    ) -> Result<()> {
        while let Some(sample) = reader.next_record().await? {
            self.fold_sample(&sample);
        }
        self.stats.parse = reader.stats();
        Ok(())
    }

    /// End the pass and release the aggregate
    pub fn finish(mut self) -> (Aggregate, AggregationStats) {
        self.stats.facilities = self.aggregate.len();

        if self.stats.name_conflicts > 0 {
            log::debug!(
                "{} rows carried a facility name different from the first-seen one",
                self.stats.name_conflicts
            );
        }
        log::info!(
            "✅ Aggregation complete: {} rows → {} water systems",
            self.stats.rows,
            self.stats.facilities
        );

        (self.aggregate, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ResultSign;

    fn row(pwsid: &str, name: &str, state: &str, contaminant: &str, sample_id: &str) -> SampleRecord {
        SampleRecord {
            pwsid: pwsid.to_string(),
            pws_name: name.to_string(),
            state: state.to_string(),
            epa_region: None,
            contaminant: contaminant.to_string(),
            result_value: Some(1.0),
            result_sign: ResultSign::Exact,
            mrl: Some(0.5),
            units: "µg/L".to_string(),
            collection_date: "2023-04-04".to_string(),
            sample_id: sample_id.to_string(),
            facility_id: String::new(),
            facility_name: String::new(),
            sample_point_id: String::new(),
            sample_point_name: String::new(),
            size: "S".to_string(),
            monitoring_requirement: String::new(),
            method_id: String::new(),
        }
    }

    #[test]
    fn test_one_summary_per_distinct_pwsid() {
        let mut ctx = AggregationContext::new(0);
        let rows = vec![
            row("TX1", "Brazos", "TX", "PFOA", "a"),
            row("TX1", "Brazos", "TX", "PFOS", "a"),
            row("TX2", "Austin", "TX", "PFOA", "b"),
            row("OK1", "Tulsa", "OK", "PFOA", "c"),
            row("TX2", "Austin East", "TX", "Lithium", "d"),
        ];
        for r in &rows {
            ctx.fold_sample(r);
        }

        let (aggregate, stats) = ctx.finish();
        assert_eq!(aggregate.len(), 3);
        assert_eq!(stats.rows, 5);
        assert_eq!(stats.facilities, 3);
        assert_eq!(stats.name_conflicts, 1);
        assert_eq!(aggregate.get("TX2").unwrap().pws_name, "Austin");
        assert_eq!(aggregate.get("TX2").unwrap().total_samples(), 2);
    }

    #[test]
    fn test_by_state_orders_by_name() {
        let mut ctx = AggregationContext::new(0);
        ctx.fold_sample(&row("TX9", "Zavala", "TX", "PFOA", "a"));
        ctx.fold_sample(&row("TX1", "Abilene", "TX", "PFOA", "b"));
        ctx.fold_sample(&row("OK1", "Tulsa", "OK", "PFOA", "c"));
        let (aggregate, _) = ctx.finish();

        let shards = aggregate.by_state();
        let tx: Vec<&str> = shards["TX"].iter().map(|s| s.pwsid.as_str()).collect();
        assert_eq!(tx, vec!["TX1", "TX9"]);
        assert_eq!(shards["OK"].len(), 1);
    }
}
