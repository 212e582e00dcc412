use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::DbManager;
use crate::error::{AppError, Result};

/// A reconciler action kind, matching the `op` field of `FileSyncState`'s
/// history ring buffer (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Upload,
    Download,
    Delete,
    ConflictCopy,
    Tombstone,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Upload => write!(f, "upload"),
            OperationType::Download => write!(f, "download"),
            OperationType::Delete => write!(f, "delete"),
            OperationType::ConflictCopy => write!(f, "conflict_copy"),
            OperationType::Tombstone => write!(f, "tombstone"),
        }
    }
}

impl TryFrom<&str> for OperationType {
    type Error = AppError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "upload" => Ok(OperationType::Upload),
            "download" => Ok(OperationType::Download),
            "delete" => Ok(OperationType::Delete),
            "conflict_copy" => Ok(OperationType::ConflictCopy),
            "tombstone" => Ok(OperationType::Tombstone),
            _ => Err(AppError::InvalidInput(format!(
                "unknown operation type: {}",
                value
            ))),
        }
    }
}

/// Status of a logged per-file operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl TryFrom<&str> for OperationStatus {
    type Error = AppError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            _ => Err(AppError::InvalidInput(format!(
                "unknown operation status: {}",
                value
            ))),
        }
    }
}

/// A single logged per-file reconciler action. This is the ambient,
/// queryable counterpart to the bounded 5-entry ring buffer kept inline on
/// each `FileSyncState`: the index keeps the recent history compact, this
/// table keeps the full record for the history/export commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: i64,
    pub timestamp: i64,
    pub vault_id: String,
    pub relative_path: String,
    pub operation: OperationType,
    pub size: Option<i64>,
    pub duration_ms: Option<i64>,
    pub status: OperationStatus,
    pub error_message: Option<String>,
}

impl Operation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let operation_str: String = row.get("operation")?;
        let status_str: String = row.get("status")?;

        Ok(Operation {
            id: row.get("id")?,
            timestamp: row.get("timestamp")?,
            vault_id: row.get("vault_id")?,
            relative_path: row.get("relative_path")?,
            operation: OperationType::try_from(operation_str.as_str())
                .unwrap_or(OperationType::Upload),
            size: row.get("size")?,
            duration_ms: row.get("duration_ms")?,
            status: OperationStatus::try_from(status_str.as_str())
                .unwrap_or(OperationStatus::Completed),
            error_message: row.get("error_message")?,
        })
    }
}

/// Filter for querying the operation log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFilter {
    pub vault_id: Option<String>,
    pub operation: Option<OperationType>,
    pub status: Option<OperationStatus>,
    pub from_timestamp: Option<i64>,
    pub limit: Option<i64>,
}

impl DbManager {
    /// Log a completed or failed per-file operation.
    pub fn log_operation(
        &self,
        vault_id: &str,
        relative_path: &str,
        operation: OperationType,
        size: Option<i64>,
        duration_ms: i64,
        error: Option<&str>,
    ) -> Result<i64> {
        let conn = self.get_conn()?;
        let status = if error.is_some() {
            OperationStatus::Failed
        } else {
            OperationStatus::Completed
        };

        conn.execute(
            r#"
            INSERT INTO sync_operations (vault_id, relative_path, operation, size, duration_ms, status, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                vault_id,
                relative_path,
                operation.to_string(),
                size,
                duration_ms,
                status.to_string(),
                error,
            ],
        )
        .map_err(|e| AppError::Storage(format!("failed to log operation: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Query the operation log with filters, newest first.
    pub fn query_operations(&self, filter: &OperationFilter) -> Result<Vec<Operation>> {
        let conn = self.get_conn()?;

        let mut sql = String::from(
            r#"
            SELECT id, timestamp, vault_id, relative_path, operation, size, duration_ms, status, error_message
            FROM sync_operations
            WHERE 1=1
            "#,
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(vault_id) = &filter.vault_id {
            sql.push_str(" AND vault_id = ?");
            params.push(Box::new(vault_id.clone()));
        }
        if let Some(operation) = &filter.operation {
            sql.push_str(" AND operation = ?");
            params.push(Box::new(operation.to_string()));
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.to_string()));
        }
        if let Some(from_ts) = filter.from_timestamp {
            sql.push_str(" AND timestamp >= ?");
            params.push(Box::new(from_ts));
        }

        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        params.push(Box::new(filter.limit.unwrap_or(200)));

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Storage(format!("failed to prepare query: {}", e)))?;

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let operations = stmt
            .query_map(params_refs.as_slice(), Operation::from_row)
            .map_err(|e| AppError::Storage(format!("failed to query operations: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(operations)
    }

    /// Cleanup logged operations older than `days`.
    pub fn cleanup_old_operations(&self, days: i64) -> Result<usize> {
        let conn = self.get_conn()?;
        let cutoff = chrono::Utc::now().timestamp() - (days * 86400);

        let deleted = conn
            .execute(
                "DELETE FROM sync_operations WHERE timestamp < ?1",
                params![cutoff],
            )
            .map_err(|e| AppError::Storage(format!("failed to cleanup operations: {}", e)))?;

        log::info!(
            "cleaned up {} old sync operations (older than {} days)",
            deleted,
            days
        );
        Ok(deleted)
    }
}
