//! SQLite connection and schema for the pattern store

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};

/// Default database location under the platform config directory
pub fn default_db_path() -> Result<PathBuf> {
    let config_dir = if cfg!(target_os = "linux") {
        dirs::config_dir()
            .context("Failed to get XDG config directory")?
            .join("import-engine")
    } else {
        dirs::home_dir()
            .context("Failed to get home directory")?
            .join(".import-engine")
    };

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
        log::info!("Created config directory: {:?}", config_dir);
    }

    Ok(config_dir.join("patterns.db"))
}

/// Connect to the database file, creating it if needed
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open pattern database at {:?}", path))
}

/// Connect to an in-memory database (tests)
pub async fn connect_memory() -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory pattern database")
}

/// Create the schema if it does not exist yet
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mapping_patterns (
            org_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            header TEXT NOT NULL,
            column_id TEXT NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (org_id, entity_id, header)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create mapping_patterns table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS value_patterns (
            org_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            target_id TEXT NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (org_id, entity_id, field, value)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create value_patterns table")?;

    Ok(())
}
