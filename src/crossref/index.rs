//! Secondary lookup indices over the finished aggregate

use crate::aggregate::Aggregate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A facility reachable from a zip code
///
/// `state` is absent for facilities that never appeared in the samples file;
/// they stay discoverable by zip code even without a shard entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZipEntry {
    pub pwsid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// zip code → facilities serving it (many-to-many)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipCodeIndex {
    entries: BTreeMap<String, BTreeSet<ZipEntry>>,
}

impl ZipCodeIndex {
    pub fn insert(&mut self, zip_code: &str, entry: ZipEntry) {
        self.entries
            .entry(zip_code.to_string())
            .or_default()
            .insert(entry);
    }

    pub fn get(&self, zip_code: &str) -> Option<&BTreeSet<ZipEntry>> {
        self.entries.get(zip_code)
    }

    pub fn contains(&self, zip_code: &str, pwsid: &str) -> bool {
        self.entries
            .get(zip_code)
            .map_or(false, |set| set.iter().any(|e| e.pwsid == pwsid))
    }

    pub fn zip_count(&self) -> usize {
        self.entries.len()
    }

    /// Distinct (pwsid, zip code) pairs, orphans included
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(zip, set)| set.iter().map(move |e| (e.pwsid.as_str(), zip.as_str())))
    }

    /// Document shape: zip code → list of `{pwsid, state}`
    pub fn to_document(&self) -> BTreeMap<&str, Vec<&ZipEntry>> {
        self.entries
            .iter()
            .map(|(zip, set)| (zip.as_str(), set.iter().collect()))
            .collect()
    }
}

/// state → number of water systems in that state's shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionIndex(pub BTreeMap<String, usize>);

impl RegionIndex {
    pub fn build(aggregate: &Aggregate) -> Self {
        let mut counts = BTreeMap::new();
        for summary in aggregate.systems.values() {
            *counts.entry(summary.state.clone()).or_insert(0) += 1;
        }
        RegionIndex(counts)
    }

    pub fn count(&self, state: &str) -> Option<usize> {
        self.0.get(state).copied()
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
