//! Foreign-key conflict detection
//!
//! For each FK column, partitions the distinct non-empty observed
//! values into auto-matched (a learned value pattern or an existing
//! option with the same label) and missing (needs a user decision).
//! Existing options are fetched fresh per session; one conflict is
//! produced per FK column even when nothing is missing, so the user
//! can review and override auto-matches.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::config::ImportConfig;
use super::validator::ValidatedRow;
use crate::backend::{ImportBackend, RefOption};
use crate::resilience::{RetryPolicy, fan_out};

/// An observed value resolved to an existing option's id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedValue {
    pub original: String,
    pub target_id: String,
}

/// Conflict state for one FK column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FkConflict {
    pub field: String,
    pub field_label: String,
    /// Distinct observed values with no match, in first-seen order
    pub missing_values: Vec<String>,
    pub matched_values: Vec<MatchedValue>,
    pub existing_options: Vec<RefOption>,
    pub allow_create: bool,
}

impl FkConflict {
    pub fn has_missing(&self) -> bool {
        !self.missing_values.is_empty()
    }
}

/// Detect conflicts for every FK column of the config.
///
/// Classification priority per value: learned value pattern, then
/// case-insensitive equality with an existing option's label, then
/// missing. Any option-fetch failure fails the whole detection; the
/// session treats that as a degraded mode and proceeds directly to
/// import.
pub async fn detect_conflicts(
    rows: &[ValidatedRow],
    config: &ImportConfig,
    org_id: &str,
    learned_values: &HashMap<String, HashMap<String, String>>,
    backend: &Arc<dyn ImportBackend>,
    retry: &RetryPolicy,
    limit: usize,
) -> Result<Vec<FkConflict>> {
    let fk_fields: Vec<String> = config.fk_columns().map(|c| c.id.clone()).collect();
    if fk_fields.is_empty() {
        return Ok(Vec::new());
    }

    // Fetch options for all FK columns concurrently, fresh per session
    let tasks: Vec<_> = fk_fields
        .iter()
        .map(|field| {
            let backend = backend.clone();
            let retry = retry.clone();
            let org_id = org_id.to_string();
            let field = field.clone();
            async move {
                let label = format!("option fetch for '{}'", field);
                let result = retry
                    .execute(&label, || backend.reference_options(&org_id, &field))
                    .await;
                (field, result)
            }
        })
        .collect();

    let mut options_by_field: HashMap<String, Vec<RefOption>> = HashMap::new();
    for (field, result) in fan_out(tasks, limit, |task| task).await? {
        let options =
            result.with_context(|| format!("Failed to fetch options for field '{}'", field))?;
        options_by_field.insert(field, options);
    }

    let mut conflicts = Vec::new();
    for column in config.fk_columns() {
        let options = options_by_field.remove(&column.id).unwrap_or_default();
        let learned = learned_values.get(&column.id);

        // Option label -> id, case-insensitive
        let options_by_label: HashMap<String, &str> = options
            .iter()
            .map(|o| (o.label.trim().to_lowercase(), o.id.as_str()))
            .collect();

        // Distinct non-empty observed values, first-seen order
        let mut seen = HashSet::new();
        let mut observed = Vec::new();
        for row in rows {
            if let Some(value) = row.values.get(&column.id) {
                if !value.is_empty() && seen.insert(value.clone()) {
                    observed.push(value.clone());
                }
            }
        }

        let mut matched_values = Vec::new();
        let mut missing_values = Vec::new();
        for value in observed {
            if let Some(target_id) = learned.and_then(|m| m.get(&value)) {
                matched_values.push(MatchedValue {
                    original: value,
                    target_id: target_id.clone(),
                });
            } else if let Some(target_id) = options_by_label.get(&value.trim().to_lowercase()) {
                matched_values.push(MatchedValue {
                    original: value,
                    target_id: target_id.to_string(),
                });
            } else {
                missing_values.push(value);
            }
        }

        log::debug!(
            "FK '{}': {} matched, {} missing of {} options",
            column.id,
            matched_values.len(),
            missing_values.len(),
            options.len()
        );

        conflicts.push(FkConflict {
            field: column.id.clone(),
            field_label: column.label.clone(),
            missing_values,
            matched_values,
            existing_options: options,
            allow_create: column.foreign_key.map(|fk| fk.allow_create).unwrap_or(false),
        });
    }

    Ok(conflicts)
}
