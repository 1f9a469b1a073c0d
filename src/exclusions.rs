//! Cross-cycle deduplication state
//!
//! Each preset worker owns one [`ExclusionSet`] for the lifetime of the
//! process. Every fetched batch is folded into it, and every submission
//! serializes it into the engine's duplicate-suppression override so
//! already-seen records are not collected again. The set only ever grows and
//! is never persisted; a restart starts from empty.

use crate::error::{Error, Result};
use crate::types::{RegionCounts, ResultRecord};
use std::collections::{BTreeMap, BTreeSet};

/// Region name → identifiers already seen, for one preset
#[derive(Clone, Debug, Default)]
pub struct ExclusionSet {
    regions: BTreeMap<String, BTreeSet<String>>,
}

impl ExclusionSet {
    /// Create an empty exclusion set
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a sanitized result payload into the set
    ///
    /// Parses the payload as a record sequence and records each identifier
    /// under its region, counting identifiers not seen before. Every region
    /// present in the batch gets a count entry, zero when all of its records
    /// were already known. Running the same payload twice leaves the set
    /// unchanged and reports zero new additions the second time.
    ///
    /// # Errors
    /// Returns [`Error::Parse`] if the payload is not a valid record sequence.
    pub fn extract(&mut self, payload: &str) -> Result<RegionCounts> {
        let records: Vec<ResultRecord> = serde_json::from_str(payload)
            .map_err(|e| Error::Parse(format!("result payload is not a record sequence: {e}")))?;

        let mut counts = RegionCounts::new();
        for record in records {
            let ResultRecord { id, region } = record;
            let new_items = counts.entry(region.clone()).or_insert(0);
            let ids = self.regions.entry(region).or_default();
            if ids.insert(id) {
                *new_items += 1;
            }
        }
        Ok(counts)
    }

    /// Serialize the set for the engine's duplicate-suppression override
    ///
    /// Produces a JSON object mapping region names to identifier arrays.
    /// `BTreeMap`/`BTreeSet` backing keeps the output deterministic, so a
    /// submission is reproducible for a given state.
    ///
    /// # Errors
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn to_duplicate_override(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.regions)?)
    }

    /// Whether an identifier has been recorded under a region
    pub fn contains(&self, region: &str, id: &str) -> bool {
        self.regions
            .get(region)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Total number of recorded identifiers across all regions
    pub fn len(&self) -> usize {
        self.regions.values().map(BTreeSet::len).sum()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
