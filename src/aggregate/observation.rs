//! Per-contaminant fold of repeated measurements

use crate::ingest::{ResultSign, SampleRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Method reporting limit as part of an observation key
///
/// Ordered with `f64::total_cmp` so it can key a `BTreeMap`; `None` sorts first.
#[derive(Debug, Clone, Copy)]
pub struct ReportingLimit(pub Option<f64>);

impl PartialEq for ReportingLimit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReportingLimit {}

impl PartialOrd for ReportingLimit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReportingLimit {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObservationKey {
    pub contaminant: String,
    pub units: String,
    pub mrl: ReportingLimit,
}

impl ObservationKey {
    pub fn from_sample(sample: &SampleRecord) -> Self {
        Self {
            contaminant: sample.contaminant.clone(),
            units: sample.units.clone(),
            mrl: ReportingLimit(sample.mrl),
        }
    }
}

/// Displayed result: a measured number, or `"<{mrl}"` when nothing was detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservedValue {
    Measured(f64),
    BelowLimit(String),
}

/// Aggregated result for one (contaminant, unit, reporting limit) at one facility
///
/// Tie-break: an exact result with a value always beats below-limit results,
/// whatever the arrival order; among exact results the maximum wins. The
/// relational snapshot's grouped queries apply the same rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ContaminantObservation {
    pub units: String,
    pub mrl: Option<f64>,
    /// Maximum exact result value; `None` until an exact result with a value arrives
    pub max_value: Option<f64>,
    pub below_limit_seen: bool,
    pub test_count: u64,
    pub last_collection_date: Option<String>,
}

impl ContaminantObservation {
    pub fn new(key: &ObservationKey) -> Self {
        Self {
            units: key.units.clone(),
            mrl: key.mrl.0,
            max_value: None,
            below_limit_seen: false,
            test_count: 0,
            last_collection_date: None,
        }
    }

    pub fn fold(&mut self, sample: &SampleRecord) {
        self.test_count += 1;

        match (sample.result_sign, sample.result_value) {
            (ResultSign::Exact, Some(value)) => {
                self.max_value = Some(match self.max_value {
                    Some(current) if current >= value => current,
                    _ => value,
                });
            }
            (ResultSign::BelowLimit, _) => self.below_limit_seen = true,
            _ => {}
        }

        advance_date(&mut self.last_collection_date, &sample.collection_date);
    }

    pub fn detected(&self) -> bool {
        self.max_value.is_some()
    }

    /// Qualifier the displayed value was computed from
    pub fn qualifier(&self) -> ResultSign {
        if self.detected() {
            ResultSign::Exact
        } else if self.below_limit_seen {
            ResultSign::BelowLimit
        } else {
            ResultSign::Missing
        }
    }

    pub fn display_value(&self) -> Option<ObservedValue> {
        if let Some(value) = self.max_value {
            return Some(ObservedValue::Measured(value));
        }
        match (self.below_limit_seen, self.mrl) {
            (true, Some(mrl)) => Some(ObservedValue::BelowLimit(format!("<{}", mrl))),
            _ => None,
        }
    }

    /// Which of two observations of the same contaminant represents it when keyed by name only
    pub fn outranks(&self, other: &Self) -> bool {
        match (self.max_value, other.max_value) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => self.test_count > other.test_count,
        }
    }
}

/// Move `latest` forward to `candidate` when it is later
///
/// Collection dates are fixed-width ISO strings, so string order is date order.
pub(crate) fn advance_date(latest: &mut Option<String>, candidate: &str) {
    if candidate.is_empty() {
        return;
    }
    match latest {
        Some(current) if current.as_str() >= candidate => {}
        _ => *latest = Some(candidate.to_string()),
    }
}
