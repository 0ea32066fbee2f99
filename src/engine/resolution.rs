//! Resolution tracking and application for FK conflicts
//!
//! Decisions are keyed by (field, value), never by row: every row
//! sharing a raw value receives the same resolution. Auto-matched
//! values are pre-filled as `Map` decisions the user can override
//! (remap or demote to `Ignore`); import may proceed only once every
//! missing value has a non-null action.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::config::ImportConfig;
use super::conflicts::FkConflict;
use super::validator::ValidatedRow;

/// Decision for one (field, value) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    /// Rewrite the value to an existing entity's id
    Map,
    /// Create the entity at commit time, then map to the new id
    Create,
    /// Exclude rows carrying this value from the payload
    Ignore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionEntry {
    pub action: Option<ResolutionAction>,
    pub target_id: Option<String>,
}

/// All decisions for one session, keyed by (field, value)
#[derive(Debug, Clone, Default)]
pub struct ResolutionMap {
    entries: HashMap<(String, String), ResolutionEntry>,
}

impl ResolutionMap {
    /// Pre-fill `Map` decisions for every auto-matched value, and an
    /// undecided entry for every missing one.
    pub fn prefill(conflicts: &[FkConflict]) -> Self {
        let mut entries = HashMap::new();
        for conflict in conflicts {
            for matched in &conflict.matched_values {
                entries.insert(
                    (conflict.field.clone(), matched.original.clone()),
                    ResolutionEntry {
                        action: Some(ResolutionAction::Map),
                        target_id: Some(matched.target_id.clone()),
                    },
                );
            }
            for missing in &conflict.missing_values {
                entries.insert(
                    (conflict.field.clone(), missing.clone()),
                    ResolutionEntry::default(),
                );
            }
        }
        Self { entries }
    }

    pub fn set(
        &mut self,
        field: impl Into<String>,
        value: impl Into<String>,
        action: Option<ResolutionAction>,
        target_id: Option<String>,
    ) {
        self.entries
            .insert((field.into(), value.into()), ResolutionEntry { action, target_id });
    }

    pub fn get(&self, field: &str, value: &str) -> Option<&ResolutionEntry> {
        self.entries
            .get(&(field.to_string(), value.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(String, String), &ResolutionEntry)> {
        self.entries.iter()
    }

    /// True iff every missing value across all conflicts has a
    /// non-null action.
    pub fn all_resolved(&self, conflicts: &[FkConflict]) -> bool {
        conflicts.iter().all(|conflict| {
            conflict.missing_values.iter().all(|value| {
                self.get(&conflict.field, value)
                    .map(|entry| entry.action.is_some())
                    .unwrap_or(false)
            })
        })
    }

    /// Distinct (field, value) pairs decided as `Create` that still
    /// lack a target id.
    pub fn pending_creations(&self) -> Vec<(String, String)> {
        let mut pending: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.action == Some(ResolutionAction::Create) && entry.target_id.is_none()
            })
            .map(|(key, _)| key.clone())
            .collect();
        pending.sort();
        pending
    }

    /// Rewrite a successfully created value to a `Map` decision so
    /// downstream logic treats creations and matches uniformly.
    pub fn mark_created(&mut self, field: &str, value: &str, target_id: String) {
        self.set(
            field,
            value,
            Some(ResolutionAction::Map),
            Some(target_id),
        );
    }

    /// Decisions usable as learned value patterns:
    /// field -> value -> target id, for every resolved `Map` entry.
    pub fn mapped_patterns(&self) -> HashMap<String, HashMap<String, String>> {
        let mut patterns: HashMap<String, HashMap<String, String>> = HashMap::new();
        for ((field, value), entry) in &self.entries {
            if entry.action == Some(ResolutionAction::Map) {
                if let Some(target_id) = &entry.target_id {
                    patterns
                        .entry(field.clone())
                        .or_default()
                        .insert(value.clone(), target_id.clone());
                }
            }
        }
        patterns
    }
}

/// Rewrite each FK column's raw value to the resolved target id for
/// `Map`/`Create` decisions. Values without a usable decision are left
/// untouched.
pub fn apply_resolutions(
    mut rows: Vec<ValidatedRow>,
    config: &ImportConfig,
    resolutions: &ResolutionMap,
) -> Vec<ValidatedRow> {
    let fk_fields: Vec<&str> = config.fk_columns().map(|c| c.id.as_str()).collect();

    for row in &mut rows {
        for field in &fk_fields {
            let Some(value) = row.values.get(*field) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            if let Some(entry) = resolutions.get(field, value) {
                match entry.action {
                    Some(ResolutionAction::Map) | Some(ResolutionAction::Create) => {
                        if let Some(target_id) = &entry.target_id {
                            row.values.insert(field.to_string(), target_id.clone());
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    rows
}

/// Drop every row whose FK value resolved to `Ignore`.
pub fn filter_ignored_rows(
    rows: Vec<ValidatedRow>,
    config: &ImportConfig,
    resolutions: &ResolutionMap,
) -> Vec<ValidatedRow> {
    let fk_fields: Vec<&str> = config.fk_columns().map(|c| c.id.as_str()).collect();

    rows.into_iter()
        .filter(|row| {
            !fk_fields.iter().any(|field| {
                row.values
                    .get(*field)
                    .filter(|value| !value.is_empty())
                    .and_then(|value| resolutions.get(field, value))
                    .map(|entry| entry.action == Some(ResolutionAction::Ignore))
                    .unwrap_or(false)
            })
        })
        .collect()
}
