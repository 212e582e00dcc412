use rusqlite::Connection;

use crate::error::{AppError, Result};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| AppError::Storage(format!("Failed to get schema version: {}", e)))?;

    log::info!(
        "Database schema version: {}, target: {}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    // Set the current schema version
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| AppError::Storage(format!("Failed to update schema version: {}", e)))?;

    Ok(())
}

/// Migration v1: ambient sync-session and per-file operation history.
///
/// The authoritative sync state (`SyncIndex`, `TombstoneStore`) lives in
/// the JSON files described in spec §6, not here. This schema only backs
/// the history/export commands.
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running migration v1: sync session and operation history schema");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sync_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vault_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            status TEXT NOT NULL,

            files_uploaded INTEGER DEFAULT 0,
            files_downloaded INTEGER DEFAULT 0,
            files_deleted_local INTEGER DEFAULT 0,
            files_deleted_remote INTEGER DEFAULT 0,
            conflicts INTEGER DEFAULT 0,
            skipped_files INTEGER DEFAULT 0,

            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_sessions_vault ON sync_sessions(vault_id, started_at DESC);

        CREATE TABLE IF NOT EXISTS sync_operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),

            vault_id TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            operation TEXT NOT NULL,

            size INTEGER,
            duration_ms INTEGER,

            status TEXT NOT NULL DEFAULT 'completed',
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_ops_timestamp ON sync_operations(timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_sync_ops_vault ON sync_operations(vault_id);
        "#,
    )
    .map_err(|e| AppError::Storage(format!("Failed to run migration v1: {}", e)))?;

    log::info!("Migration v1 completed successfully");
    Ok(())
}
