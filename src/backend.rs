//! External collaborator interface consumed by the import engine
//!
//! Everything that touches live system state goes through this trait:
//! duplicate lookups, reference option fetches, deferred entity
//! creation, the commit itself and batch revert. The engine never talks
//! to a database or API directly, so backends can be HTTP clients,
//! direct DB handles or in-memory fakes for tests.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One selectable option of a referenced entity (id + display label)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefOption {
    pub id: String,
    pub label: String,
}

impl RefOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Result of creating one missing referenced entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedRef {
    pub id: String,
}

/// Outcome of a commit, terminal for the session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    /// Number of rows actually committed
    pub imported: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Correlates all rows committed by this run, used for bulk revert
    pub batch_id: Option<String>,
}

/// A row payload as sent to the backend: target column id -> value,
/// with FK columns already rewritten to resolved target ids.
pub type ImportRow = HashMap<String, String>;

/// Collaborators the engine fans out to during an import session.
///
/// All methods are called through the session's retry policy (bounded
/// timeout, single retry) except [`import`](ImportBackend::import),
/// which runs exactly once per attempt to keep the commit idempotent
/// from the engine's point of view.
#[async_trait]
pub trait ImportBackend: Send + Sync {
    /// Which of `values` already exist in `table.column` for this org.
    /// Matching is expected to be case-insensitive on the backend side;
    /// the engine lowercases the returned set again before use.
    async fn check_duplicates(
        &self,
        org_id: &str,
        table: &str,
        column: &str,
        values: &[String],
    ) -> Result<Vec<String>>;

    /// All existing options for a foreign-key field, fetched fresh per
    /// session.
    async fn reference_options(&self, org_id: &str, field: &str) -> Result<Vec<RefOption>>;

    /// Create a missing referenced entity for `field` with the given
    /// raw value as its label.
    async fn create_reference(&self, org_id: &str, field: &str, value: &str) -> Result<CreatedRef>;

    /// Commit the final payload. The backend applies its own judgment
    /// to rows that still carry validation errors.
    async fn import(&self, rows: Vec<ImportRow>) -> Result<ImportResult>;

    /// Bulk revert of a previously committed batch.
    async fn revert(&self, batch_id: &str) -> Result<()>;
}
