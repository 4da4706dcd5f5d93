//! Cross-Reference Joiner - zip code and supplementary response streams
//!
//! Zip pairs join against known facilities (orphans dropped from the facility
//! side) while the zip index keeps every pair, so a facility without samples
//! can still be discovered by zip code.

pub mod index;
pub mod joiner;

pub use index::{RegionIndex, ZipCodeIndex, ZipEntry};
pub use joiner::{AdditionalData, CrossReferenceJoiner, CrossReferences, JoinStats};
