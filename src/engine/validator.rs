//! Per-row validation against the mapped schema and live duplicate sets
//!
//! Per cell, in order: normalization, required check, format rule,
//! then (for unique columns) a case-insensitive membership test against
//! the duplicate set fetched from the backend. Errors accumulate per
//! row and never block stage progression; they only inform the user
//! and, ultimately, the backend's own judgment at commit time.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::config::ColumnSpec;
use super::mapper::Mapping;
use crate::backend::ImportBackend;
use crate::resilience::{RetryPolicy, fan_out};

/// One row after normalization and validation, values keyed by target
/// column id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedRow {
    /// Zero-based data-row index, for error display
    pub index: usize,
    pub values: HashMap<String, String>,
    pub errors: Vec<String>,
}

impl ValidatedRow {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validation outcome surfaced to the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub rows: Vec<ValidatedRow>,
}

/// Values already present in the system, per unique column id,
/// lowercased for case-insensitive membership tests
pub type DuplicateSets = HashMap<String, HashSet<String>>;

/// Validate all rows. Deterministic: identical inputs produce identical
/// error lists.
pub fn validate_rows(
    rows: &[HashMap<String, String>],
    mapping: &Mapping,
    columns: &[ColumnSpec],
    duplicate_sets: &DuplicateSets,
) -> ValidationSummary {
    // header -> column, resolved once; sorted so error order does not
    // depend on map iteration order
    let mut column_by_header: Vec<(&String, &ColumnSpec)> = mapping
        .iter()
        .filter_map(|(header, column_id)| {
            columns.iter().find(|c| &c.id == column_id).map(|c| (header, c))
        })
        .collect();
    column_by_header.sort_by(|a, b| a.1.id.cmp(&b.1.id));

    let mut validated = Vec::with_capacity(rows.len());

    for (index, raw_row) in rows.iter().enumerate() {
        let mut values = HashMap::new();
        let mut errors = Vec::new();

        for (header, column) in &column_by_header {
            let raw = raw_row.get(*header).map(String::as_str).unwrap_or("");
            let value = column.normalize.apply(raw);

            if value.is_empty() {
                if column.required {
                    errors.push(format!("{} es obligatorio", column.label));
                }
                values.insert(column.id.clone(), value);
                continue;
            }

            if let Some(rule) = &column.rule {
                if !rule.check(&value) {
                    errors.push(format!("{} tiene un formato inválido", column.label));
                }
            }

            if column.unique {
                if let Some(existing) = duplicate_sets.get(&column.id) {
                    if existing.contains(&value.to_lowercase()) {
                        errors.push(format!("{} ya existe en el sistema", column.label));
                    }
                }
            }

            values.insert(column.id.clone(), value);
        }

        validated.push(ValidatedRow {
            index,
            values,
            errors,
        });
    }

    let valid_count = validated.iter().filter(|r| r.is_valid()).count();
    ValidationSummary {
        valid_count,
        invalid_count: validated.len() - valid_count,
        rows: validated,
    }
}

/// Fetch the duplicate set of every mapped unique column, all columns
/// queried concurrently with a bounded limit.
///
/// A failed check leaves that column's set empty: uniqueness validation
/// informs, it never blocks, so a degraded duplicate check must not
/// stop the session.
pub async fn fetch_duplicate_sets(
    backend: &Arc<dyn ImportBackend>,
    retry: &RetryPolicy,
    org_id: &str,
    table: &str,
    columns: &[ColumnSpec],
    mapping: &Mapping,
    rows: &[HashMap<String, String>],
    limit: usize,
) -> DuplicateSets {
    // Observed normalized values per mapped unique column
    let mut targets: Vec<(String, Vec<String>)> = Vec::new();
    for column in columns.iter().filter(|c| c.unique) {
        let Some(header) = mapping
            .iter()
            .find(|(_, id)| id.as_str() == column.id)
            .map(|(h, _)| h)
        else {
            continue;
        };

        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for row in rows {
            let raw = row.get(header).map(String::as_str).unwrap_or("");
            let value = column.normalize.apply(raw);
            if !value.is_empty() && seen.insert(value.to_lowercase()) {
                values.push(value);
            }
        }
        if !values.is_empty() {
            targets.push((column.id.clone(), values));
        }
    }

    let tasks: Vec<_> = targets
        .into_iter()
        .map(|(column_id, values)| {
            let backend = backend.clone();
            let retry = retry.clone();
            let org_id = org_id.to_string();
            let table = table.to_string();
            async move {
                let label = format!("duplicate check for '{}'", column_id);
                let result = retry
                    .execute(&label, || {
                        backend.check_duplicates(&org_id, &table, &column_id, &values)
                    })
                    .await;
                (column_id, result)
            }
        })
        .collect();

    let mut sets = DuplicateSets::new();
    let outcomes = match fan_out(tasks, limit, |task| task).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            warn!("Duplicate check fan-out failed, skipping uniqueness validation: {}", e);
            return sets;
        }
    };

    for (column_id, result) in outcomes {
        match result {
            Ok(matching) => {
                sets.insert(
                    column_id,
                    matching.into_iter().map(|v| v.to_lowercase()).collect(),
                );
            }
            Err(e) => {
                warn!("Duplicate check for '{}' failed, treating as no duplicates: {}", column_id, e);
            }
        }
    }

    sets
}
