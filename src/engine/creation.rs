//! Deferred creation of missing referenced entities
//!
//! "Create new" decisions are postponed to commit time and executed
//! here in bulk: one `create_reference` call per distinct pending
//! (field, value) pair, fanned out with a bounded limit. A successful
//! creation rewrites the resolution to `Map` with the real id so
//! downstream logic treats creations and matches uniformly. A failed
//! creation demotes the value to `Ignore` with a warning carried into
//! the final import result; rows are never committed with a dangling
//! reference. A panic of the fan-out itself aborts the import with
//! nothing committed.

use anyhow::Result;
use log::warn;
use std::sync::Arc;

use super::config::ImportConfig;
use super::resolution::{ResolutionAction, ResolutionMap};
use crate::backend::ImportBackend;
use crate::resilience::{RetryPolicy, fan_out};

/// Outcome of the bulk creation phase
#[derive(Debug, Default)]
pub struct CreationOutcome {
    pub created: usize,
    /// User-facing warnings for demoted values
    pub warnings: Vec<String>,
}

/// Execute every pending creation in the resolution map.
pub async fn execute_deferred_creations(
    resolutions: &mut ResolutionMap,
    config: &ImportConfig,
    org_id: &str,
    backend: &Arc<dyn ImportBackend>,
    retry: &RetryPolicy,
    limit: usize,
) -> Result<CreationOutcome> {
    let mut outcome = CreationOutcome::default();

    let mut pending = Vec::new();
    for (field, value) in resolutions.pending_creations() {
        let allowed = config
            .column(&field)
            .and_then(|c| c.foreign_key)
            .map(|fk| fk.allow_create)
            .unwrap_or(false);

        if allowed {
            pending.push((field, value));
        } else {
            // Should not happen through the normal flow; demote rather
            // than commit an unresolvable reference
            warn!("Creation requested for '{}' which does not allow it", field);
            outcome.warnings.push(format!(
                "No se puede crear \"{}\" para el campo {}; las filas fueron omitidas",
                value, field
            ));
            resolutions.set(&field, &value, Some(ResolutionAction::Ignore), None);
        }
    }

    if pending.is_empty() {
        return Ok(outcome);
    }

    log::info!("Executing {} deferred creations", pending.len());

    let tasks: Vec<_> = pending
        .into_iter()
        .map(|(field, value)| {
            let backend = backend.clone();
            let retry = retry.clone();
            let org_id = org_id.to_string();
            async move {
                let label = format!("creation of '{}' for '{}'", value, field);
                let result = retry
                    .execute(&label, || backend.create_reference(&org_id, &field, &value))
                    .await;
                (field, value, result)
            }
        })
        .collect();

    // A JoinError here is a systemic failure: abort, nothing committed
    for (field, value, result) in fan_out(tasks, limit, |task| task).await? {
        match result {
            Ok(created) => {
                log::debug!("Created '{}' for '{}' -> {}", value, field, created.id);
                resolutions.mark_created(&field, &value, created.id);
                outcome.created += 1;
            }
            Err(e) => {
                warn!("Creation of '{}' for '{}' failed: {}", value, field, e);
                outcome.warnings.push(format!(
                    "No se pudo crear \"{}\" para el campo {}; las filas fueron omitidas",
                    value, field
                ));
                resolutions.set(&field, &value, Some(ResolutionAction::Ignore), None);
            }
        }
    }

    Ok(outcome)
}
