//! Aggregation Engine - folds per-sample rows into per-facility summaries
//!
//! # Architecture
//!
//! ```text
//! SampleRecord stream
//!     ↓
//! AggregationContext (owned, one per run)
//!     ├─ WaterSystemSummary per pwsid (first-seen descriptive fields)
//!     │    └─ ContaminantObservation per (contaminant, units, mrl)
//!     ↓
//! Aggregate (handed by value to the joiner and materializers)
//! ```

pub mod engine;
pub mod observation;
pub mod summary;

pub use engine::{Aggregate, AggregationContext, AggregationStats};
pub use observation::{ContaminantObservation, ObservationKey, ObservedValue, ReportingLimit};
pub use summary::WaterSystemSummary;
