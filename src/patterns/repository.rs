//! Pattern repository: upsert/select free functions over the pool

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;

use super::{MappingPatterns, ValuePatterns};

/// Get all learned header -> column mappings for an org/entity pair
pub async fn get_mapping_patterns(
    pool: &SqlitePool,
    org_id: &str,
    entity_id: &str,
) -> Result<MappingPatterns> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT header, column_id FROM mapping_patterns
         WHERE org_id = ? AND entity_id = ?",
    )
    .bind(org_id)
    .bind(entity_id)
    .fetch_all(pool)
    .await
    .context("Failed to get mapping patterns")?;

    Ok(rows.into_iter().collect())
}

/// Upsert a confirmed header -> column mapping
pub async fn set_mapping_patterns(
    pool: &SqlitePool,
    org_id: &str,
    entity_id: &str,
    mapping: &MappingPatterns,
) -> Result<()> {
    for (header, column_id) in mapping {
        sqlx::query(
            "INSERT INTO mapping_patterns (org_id, entity_id, header, column_id, updated_at)
             VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(org_id, entity_id, header)
             DO UPDATE SET column_id = excluded.column_id, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(org_id)
        .bind(entity_id)
        .bind(header)
        .bind(column_id)
        .execute(pool)
        .await
        .context("Failed to set mapping pattern")?;
    }

    Ok(())
}

/// Get all learned value -> target-id mappings for an org/entity pair,
/// grouped by field
pub async fn get_value_patterns(
    pool: &SqlitePool,
    org_id: &str,
    entity_id: &str,
) -> Result<ValuePatterns> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT field, value, target_id FROM value_patterns
         WHERE org_id = ? AND entity_id = ?",
    )
    .bind(org_id)
    .bind(entity_id)
    .fetch_all(pool)
    .await
    .context("Failed to get value patterns")?;

    let mut patterns: ValuePatterns = HashMap::new();
    for (field, value, target_id) in rows {
        patterns.entry(field).or_default().insert(value, target_id);
    }

    Ok(patterns)
}

/// Upsert confirmed value -> target-id mappings
pub async fn set_value_patterns(
    pool: &SqlitePool,
    org_id: &str,
    entity_id: &str,
    patterns: &ValuePatterns,
) -> Result<()> {
    for (field, values) in patterns {
        for (value, target_id) in values {
            sqlx::query(
                "INSERT INTO value_patterns (org_id, entity_id, field, value, target_id, updated_at)
                 VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
                 ON CONFLICT(org_id, entity_id, field, value)
                 DO UPDATE SET target_id = excluded.target_id, updated_at = CURRENT_TIMESTAMP",
            )
            .bind(org_id)
            .bind(entity_id)
            .bind(field)
            .bind(value)
            .bind(target_id)
            .execute(pool)
            .await
            .context("Failed to set value pattern")?;
        }
    }

    Ok(())
}
