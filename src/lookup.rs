//! Read contract over the materialized document form
//!
//! Resolves a query by exact state key or exact zip code key only; name
//! matching is a case-insensitive substring scan inside the loaded shards.

use crate::crossref::{RegionIndex, ZipEntry};
use crate::error::{PipelineError, Result};
use crate::materialize::documents::{shard_file_name, INDEX_FILE, ZIP_INDEX_FILE};
use crate::materialize::SummaryDocument;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub pwsid: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchQuery {
    fn has_filter(&self) -> bool {
        [&self.pwsid, &self.name, &self.state, &self.zip_code]
            .iter()
            .any(|f| f.as_deref().map_or(false, |v| !v.trim().is_empty()))
    }

    fn matches(&self, system: &SummaryDocument) -> bool {
        if let Some(pwsid) = non_empty(&self.pwsid) {
            if !system.pwsid.eq_ignore_ascii_case(pwsid) {
                return false;
            }
        }
        if let Some(name) = non_empty(&self.name) {
            if !system.pws_name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(state) = non_empty(&self.state) {
            if !system.state.eq_ignore_ascii_case(state) {
                return false;
            }
        }
        if let Some(zip) = non_empty(&self.zip_code) {
            if !system.zip_codes.iter().any(|z| z == zip) {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub water_systems: Vec<T>,
    pub pagination: Pagination,
}

/// Slice `items` to one page; `has_more` is `offset + limit < total`
pub fn paginate<T>(items: Vec<T>, limit: usize, offset: usize) -> Page<T> {
    let total = items.len();
    let water_systems = items.into_iter().skip(offset).take(limit).collect();
    Page {
        water_systems,
        pagination: Pagination {
            total,
            limit,
            offset,
            has_more: offset.saturating_add(limit) < total,
        },
    }
}

/// A published document directory
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let index = dir.join(INDEX_FILE);
        if !index.exists() {
            return Err(PipelineError::source_unavailable(
                &index,
                std::io::Error::new(std::io::ErrorKind::NotFound, "document index not found"),
            ));
        }
        Ok(Self { dir })
    }

    pub fn region_index(&self) -> Result<RegionIndex> {
        read_json(&self.dir.join(INDEX_FILE))
    }

    pub fn zip_index(&self) -> Result<BTreeMap<String, Vec<ZipEntry>>> {
        read_json(&self.dir.join(ZIP_INDEX_FILE))
    }

    /// Load one state shard; an unknown state is an empty result
    ///
    /// States whose codes sanitize to the same file name share a shard, so
    /// callers filter by state after loading.
    pub fn shard(&self, state: &str) -> Result<Vec<SummaryDocument>> {
        self.shard_file(&shard_file_name(state))
    }

    fn shard_file(&self, file: &str) -> Result<Vec<SummaryDocument>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json(&path)
    }

    /// Load each distinct shard file behind `states` once
    fn shards_for<'a>(
        &self,
        states: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<SummaryDocument>> {
        let files: BTreeSet<String> = states.into_iter().map(shard_file_name).collect();
        let mut systems = Vec::new();
        for file in &files {
            systems.extend(self.shard_file(file)?);
        }
        Ok(systems)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Page<SummaryDocument>> {
        if !query.has_filter() {
            return Err(PipelineError::InvalidQuery(
                "at least one search parameter required (zipcode, pwsid, pws_name, or state)"
                    .to_string(),
            ));
        }

        let candidates = match (non_empty(&query.zip_code), non_empty(&query.state)) {
            (Some(zip), _) => self.systems_for_zip(zip)?,
            (None, Some(state)) => {
                // unknown states resolve without touching any shard
                let key = state.to_uppercase();
                if self.region_index()?.count(&key).is_some() {
                    self.shard(&key)?
                } else {
                    Vec::new()
                }
            }
            (None, None) => {
                let regions = self.region_index()?;
                self.shards_for(regions.states())?
            }
        };

        let results: Vec<SummaryDocument> =
            candidates.into_iter().filter(|s| query.matches(s)).collect();

        Ok(paginate(
            results,
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        ))
    }

    /// Read the zip index, then only the shards it references
    fn systems_for_zip(&self, zip: &str) -> Result<Vec<SummaryDocument>> {
        let zip_index = self.zip_index()?;
        let Some(entries) = zip_index.get(zip) else {
            return Ok(Vec::new());
        };

        let wanted: BTreeSet<&str> = entries.iter().map(|e| e.pwsid.as_str()).collect();
        let states = entries.iter().filter_map(|e| e.state.as_deref());

        Ok(self
            .shards_for(states)?
            .into_iter()
            .filter(|s| wanted.contains(s.pwsid.as_str()))
            .collect())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(|e| PipelineError::source_unavailable(path, e))?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_last_page() {
        let items: Vec<u32> = (0..25).collect();
        let page = paginate(items, 10, 20);
        assert_eq!(page.water_systems.len(), 5);
        assert_eq!(page.pagination.total, 25);
        assert!(!page.pagination.has_more);
    }

    #[test]
    fn test_pagination_middle_page() {
        let items: Vec<u32> = (0..25).collect();
        let page = paginate(items, 10, 10);
        assert_eq!(page.water_systems, (10..20).collect::<Vec<u32>>());
        assert!(page.pagination.has_more);
    }

    #[test]
    fn test_pagination_offset_past_end() {
        let page = paginate(vec![1, 2, 3], 10, 50);
        assert!(page.water_systems.is_empty());
        assert_eq!(page.pagination.total, 3);
        assert!(!page.pagination.has_more);
    }

    #[test]
    fn test_query_requires_a_filter() {
        let query = SearchQuery {
            name: Some("  ".to_string()),
            limit: Some(5),
            ..Default::default()
        };
        assert!(!query.has_filter());

        let query = SearchQuery {
            state: Some("tx".to_string()),
            ..Default::default()
        };
        assert!(query.has_filter());
    }
}
