use tauri::State;

use crate::db::operations::{Operation, OperationFilter};
use crate::db::sync::SyncSession;
use crate::db::DbManager;
use crate::error::Result;

/// Query the per-file operation log, newest first.
#[tauri::command(rename_all = "camelCase")]
pub async fn get_operations(
    db: State<'_, DbManager>,
    filter: OperationFilter,
) -> Result<Vec<Operation>> {
    db.query_operations(&filter)
}

/// Recent `Reconciler::sync()` pass summaries for one vault.
#[tauri::command(rename_all = "camelCase")]
pub async fn get_sync_sessions(
    db: State<'_, DbManager>,
    vault_id: String,
    limit: Option<i64>,
) -> Result<Vec<SyncSession>> {
    db.get_sync_sessions(&vault_id, limit.unwrap_or(50))
}

/// Prune operation-log rows older than `days` (default 30).
#[tauri::command(rename_all = "camelCase")]
pub async fn cleanup_history(db: State<'_, DbManager>, days: Option<i64>) -> Result<usize> {
    db.cleanup_old_operations(days.unwrap_or(30))
}
