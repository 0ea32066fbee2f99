//! Learned-pattern persistence
//!
//! Confirmed header→column and value→target-id mappings are persisted
//! per organization + entity and reused by the auto-mapper and the
//! conflict detector on the next import. The store is a small
//! org-scoped cache behind a repository trait so the backing store is
//! swappable: SQLite for the product, in-memory for tests and
//! embedding.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub mod db;
pub mod repository;

/// header -> column id, as confirmed by a successful import
pub type MappingPatterns = HashMap<String, String>;
/// field -> raw value -> target id
pub type ValuePatterns = HashMap<String, HashMap<String, String>>;

/// Repository interface for learned patterns, scoped by
/// (org_id, entity_id)
#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn mapping_patterns(&self, org_id: &str, entity_id: &str) -> Result<MappingPatterns>;

    async fn save_mapping_patterns(
        &self,
        org_id: &str,
        entity_id: &str,
        mapping: &MappingPatterns,
    ) -> Result<()>;

    async fn value_patterns(&self, org_id: &str, entity_id: &str) -> Result<ValuePatterns>;

    async fn save_value_patterns(
        &self,
        org_id: &str,
        entity_id: &str,
        patterns: &ValuePatterns,
    ) -> Result<()>;
}

/// SQLite-backed pattern store
pub struct SqlitePatternStore {
    pool: sqlx::SqlitePool,
}

impl SqlitePatternStore {
    /// Open (and migrate) the store at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        db::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Open the store at the platform default location
    pub async fn open_default() -> Result<Self> {
        let path = db::default_db_path()?;
        Self::open(&path).await
    }

    /// In-memory store for tests
    pub async fn open_in_memory() -> Result<Self> {
        let pool = db::connect_memory().await?;
        db::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn mapping_patterns(&self, org_id: &str, entity_id: &str) -> Result<MappingPatterns> {
        repository::get_mapping_patterns(&self.pool, org_id, entity_id).await
    }

    async fn save_mapping_patterns(
        &self,
        org_id: &str,
        entity_id: &str,
        mapping: &MappingPatterns,
    ) -> Result<()> {
        repository::set_mapping_patterns(&self.pool, org_id, entity_id, mapping).await
    }

    async fn value_patterns(&self, org_id: &str, entity_id: &str) -> Result<ValuePatterns> {
        repository::get_value_patterns(&self.pool, org_id, entity_id).await
    }

    async fn save_value_patterns(
        &self,
        org_id: &str,
        entity_id: &str,
        patterns: &ValuePatterns,
    ) -> Result<()> {
        repository::set_value_patterns(&self.pool, org_id, entity_id, patterns).await
    }
}

/// In-memory pattern store, keyed like the SQLite tables
#[derive(Default)]
pub struct MemoryPatternStore {
    mappings: Mutex<HashMap<(String, String), MappingPatterns>>,
    values: Mutex<HashMap<(String, String), ValuePatterns>>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternStore for MemoryPatternStore {
    async fn mapping_patterns(&self, org_id: &str, entity_id: &str) -> Result<MappingPatterns> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .get(&(org_id.to_string(), entity_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_mapping_patterns(
        &self,
        org_id: &str,
        entity_id: &str,
        mapping: &MappingPatterns,
    ) -> Result<()> {
        let mut store = self.mappings.lock().unwrap();
        let entry = store
            .entry((org_id.to_string(), entity_id.to_string()))
            .or_default();
        for (header, column_id) in mapping {
            entry.insert(header.clone(), column_id.clone());
        }
        Ok(())
    }

    async fn value_patterns(&self, org_id: &str, entity_id: &str) -> Result<ValuePatterns> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&(org_id.to_string(), entity_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_value_patterns(
        &self,
        org_id: &str,
        entity_id: &str,
        patterns: &ValuePatterns,
    ) -> Result<()> {
        let mut store = self.values.lock().unwrap();
        let entry = store
            .entry((org_id.to_string(), entity_id.to_string()))
            .or_default();
        for (field, values) in patterns {
            let field_entry = entry.entry(field.clone()).or_default();
            for (value, target_id) in values {
                field_entry.insert(value.clone(), target_id.clone());
            }
        }
        Ok(())
    }
}
