//! Per-facility summary built from the samples stream

use super::observation::{advance_date, ContaminantObservation, ObservationKey};
use crate::ingest::SampleRecord;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One regulated water system and everything folded into it during a run
#[derive(Debug, Clone)]
pub struct WaterSystemSummary {
    pub pwsid: String,
    pub pws_name: String,
    pub state: String,
    pub epa_region: Option<i64>,
    pub size: String,
    pub zip_codes: BTreeSet<String>,
    pub observations: BTreeMap<ObservationKey, ContaminantObservation>,
    pub last_test_date: Option<String>,
    sample_ids: HashSet<String>,
}

impl WaterSystemSummary {
    /// Seed a summary from the first sample seen for its facility id
    pub fn seed(sample: &SampleRecord) -> Self {
        Self {
            pwsid: sample.pwsid.clone(),
            pws_name: sample.pws_name.clone(),
            state: sample.state.clone(),
            epa_region: sample.epa_region,
            size: sample.size.clone(),
            zip_codes: BTreeSet::new(),
            observations: BTreeMap::new(),
            last_test_date: None,
            sample_ids: HashSet::new(),
        }
    }

    pub fn fold(&mut self, sample: &SampleRecord) {
        let key = ObservationKey::from_sample(sample);
        match self.observations.get_mut(&key) {
            Some(observation) => observation.fold(sample),
            None => {
                let mut observation = ContaminantObservation::new(&key);
                observation.fold(sample);
                self.observations.insert(key, observation);
            }
        }

        advance_date(&mut self.last_test_date, &sample.collection_date);

        if !sample.sample_id.is_empty() && !self.sample_ids.contains(&sample.sample_id) {
            self.sample_ids.insert(sample.sample_id.clone());
        }
    }

    /// Distinct non-empty sample ids; one sample spans many contaminant rows
    pub fn total_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Distinct contaminant names with at least one detected observation
    pub fn contaminants_detected(&self) -> usize {
        let detected: BTreeSet<&str> = self
            .observations
            .iter()
            .filter(|(_, obs)| obs.detected())
            .map(|(key, _)| key.contaminant.as_str())
            .collect();
        detected.len()
    }

    /// One observation per contaminant name, picking the dominant key when a
    /// contaminant was reported under several units or reporting limits
    pub fn contaminants_by_name(&self) -> BTreeMap<&str, &ContaminantObservation> {
        let mut by_name: BTreeMap<&str, &ContaminantObservation> = BTreeMap::new();
        for (key, obs) in &self.observations {
            let name = key.contaminant.as_str();
            let replace = by_name
                .get(name)
                .map_or(true, |current| obs.outranks(current));
            if replace {
                by_name.insert(name, obs);
            }
        }
        by_name
    }
}
