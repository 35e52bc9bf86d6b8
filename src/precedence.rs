//! Precedence merging of per-source maps.
//!
//! Sources are applied from the lowest tier to the highest; within a tier,
//! contributions keep their list order so a later provider or file wins.
//! A winning value replaces the lower one entirely, there is no field-level
//! merge of values.

use crate::types::Origin;
use std::collections::BTreeMap;
use tracing::debug;

/// A single raw key/value pair tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    pub raw_value: String,
    pub origin: Origin,
}

/// Everything one source (or one provider/file within a tier) contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub origin: Origin,
    pub entries: BTreeMap<String, String>,
}

impl Contribution {
    pub fn new(origin: Origin, entries: BTreeMap<String, String>) -> Self {
        Self { origin, entries }
    }

    pub fn empty(origin: Origin) -> Self {
        Self::new(origin, BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The contribution as immutable raw entries.
    pub fn raw_entries(&self) -> impl Iterator<Item = RawEntry> + '_ {
        self.entries.iter().map(|(key, value)| RawEntry {
            key: key.clone(),
            raw_value: value.clone(),
            origin: self.origin.clone(),
        })
    }
}

/// The winning raw value for a key plus the origins it overrode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    pub raw: String,
    pub origin: Origin,
    /// Lower-priority origins that also defined the key, lowest first.
    pub shadowed: Vec<Origin>,
}

/// Merged map, ordered by key.
pub type MergedMap = BTreeMap<String, MergedEntry>;

/// Merge contributions by tier.
///
/// The input order only matters within a tier; tiers are always applied by
/// their fixed index, so shuffling sources of different tiers yields the
/// same result.
pub fn merge(contributions: &[Contribution]) -> MergedMap {
    let mut ordered: Vec<&Contribution> = contributions.iter().collect();
    // Stable sort keeps the configured order inside each tier.
    ordered.sort_by_key(|c| c.origin.source.tier());

    let mut merged = MergedMap::new();
    for contribution in ordered {
        for (key, value) in &contribution.entries {
            match merged.get_mut(key) {
                Some(existing) => {
                    let previous = std::mem::replace(&mut existing.origin, contribution.origin.clone());
                    existing.shadowed.push(previous);
                    existing.raw = value.clone();
                }
                None => {
                    merged.insert(
                        key.clone(),
                        MergedEntry {
                            raw: value.clone(),
                            origin: contribution.origin.clone(),
                            shadowed: Vec::new(),
                        },
                    );
                }
            }
        }
    }

    debug!(keys = merged.len(), sources = contributions.len(), "Merged sources");
    merged
}

/// Plain key to raw value view of a merged map.
pub fn raw_values(merged: &MergedMap) -> BTreeMap<String, String> {
    merged
        .iter()
        .map(|(k, e)| (k.clone(), e.raw.clone()))
        .collect()
}
