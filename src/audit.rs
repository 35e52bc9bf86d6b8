//! Provenance audit trail.
//!
//! Built purely from snapshot metadata: an entry records where a key came
//! from and whether it is masked, never the value itself.

use crate::snapshot::ConfigSnapshot;
use crate::types::SourceId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Provenance of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub key: String,
    pub source: SourceId,
    pub provider: Option<String>,
    pub masked: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counts over an audit trail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total_variables: usize,
    pub masked_variables: usize,
    pub sources: BTreeMap<SourceId, usize>,
    pub providers: BTreeMap<String, usize>,
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Variables: {} ({} masked)",
            self.total_variables, self.masked_variables
        )?;
        if !self.sources.is_empty() {
            writeln!(f, "Sources:")?;
            for (source, count) in &self.sources {
                writeln!(f, "  {:20} : {}", source.as_str(), count)?;
            }
        }
        if !self.providers.is_empty() {
            writeln!(f, "Providers:")?;
            for (provider, count) in &self.providers {
                writeln!(f, "  {:20} : {}", provider, count)?;
            }
        }
        Ok(())
    }
}

/// Key-ordered audit entries for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuditTrail {
    entries: BTreeMap<String, AuditEntry>,
}

impl AuditTrail {
    /// Build the trail from a snapshot's metadata.
    ///
    /// Every entry carries the snapshot's resolution timestamp, so two
    /// resolutions of identical inputs differ only in timestamps.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let timestamp = snapshot.resolved_at();
        let entries = snapshot
            .iter()
            .map(|resolved| {
                (
                    resolved.key.clone(),
                    AuditEntry {
                        key: resolved.key.clone(),
                        source: resolved.origin.source,
                        provider: resolved.origin.provider.clone(),
                        masked: resolved.masked,
                        timestamp,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&AuditEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.values()
    }

    /// Entries that resolved from `source`.
    pub fn by_source(&self, source: SourceId) -> Vec<&AuditEntry> {
        self.entries
            .values()
            .filter(|e| e.source == source)
            .collect()
    }

    pub fn summary(&self) -> AuditSummary {
        let mut summary = AuditSummary {
            total_variables: self.entries.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            *summary.sources.entry(entry.source).or_default() += 1;
            if let Some(ref provider) = entry.provider {
                *summary.providers.entry(provider.clone()).or_default() += 1;
            }
            if entry.masked {
                summary.masked_variables += 1;
            }
        }
        summary
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
