use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::DbManager;
use crate::error::{AppError, Result};

/// Status of a logged sync session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SyncSessionStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for SyncSessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncSessionStatus::Running => write!(f, "running"),
            SyncSessionStatus::Completed => write!(f, "completed"),
            SyncSessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl TryFrom<&str> for SyncSessionStatus {
    type Error = AppError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "running" => Ok(SyncSessionStatus::Running),
            "completed" => Ok(SyncSessionStatus::Completed),
            "failed" => Ok(SyncSessionStatus::Failed),
            _ => Err(AppError::InvalidInput(format!(
                "unknown session status: {}",
                value
            ))),
        }
    }
}

/// One `Reconciler::sync()` pass, recorded purely for the history UI/API.
/// The authoritative record of what is in sync lives in the `SyncIndex`
/// JSON file, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub id: i64,
    pub vault_id: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub status: SyncSessionStatus,
    pub files_uploaded: i64,
    pub files_downloaded: i64,
    pub files_deleted_local: i64,
    pub files_deleted_remote: i64,
    pub conflicts: i64,
    pub skipped_files: i64,
    pub error_message: Option<String>,
}

impl DbManager {
    /// Start a new sync session row.
    pub fn create_sync_session(&self, vault_id: &str) -> Result<i64> {
        let conn = self.get_conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            r#"
            INSERT INTO sync_sessions (vault_id, started_at, status)
            VALUES (?1, ?2, 'running')
            "#,
            params![vault_id, now],
        )
        .map_err(|e| AppError::Storage(format!("failed to create sync session: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Record the final counts of a `SyncResult` (spec §7) against a session.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_sync_session(
        &self,
        session_id: i64,
        files_uploaded: i64,
        files_downloaded: i64,
        files_deleted_local: i64,
        files_deleted_remote: i64,
        conflicts: i64,
        skipped_files: i64,
    ) -> Result<()> {
        let conn = self.get_conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            r#"
            UPDATE sync_sessions
            SET completed_at = ?1, status = 'completed',
                files_uploaded = ?2, files_downloaded = ?3,
                files_deleted_local = ?4, files_deleted_remote = ?5,
                conflicts = ?6, skipped_files = ?7
            WHERE id = ?8
            "#,
            params![
                now,
                files_uploaded,
                files_downloaded,
                files_deleted_local,
                files_deleted_remote,
                conflicts,
                skipped_files,
                session_id
            ],
        )
        .map_err(|e| AppError::Storage(format!("failed to complete sync session: {}", e)))?;

        Ok(())
    }

    /// Mark a session as failed by an unhandled error (spec §7: only
    /// unhandled exceptions fail the whole pass).
    pub fn fail_sync_session(&self, session_id: i64, error: &str) -> Result<()> {
        let conn = self.get_conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            r#"
            UPDATE sync_sessions
            SET completed_at = ?1, status = 'failed', error_message = ?2
            WHERE id = ?3
            "#,
            params![now, error, session_id],
        )
        .map_err(|e| AppError::Storage(format!("failed to mark session failed: {}", e)))?;

        Ok(())
    }

    /// Recent sessions for a vault, newest first.
    pub fn get_sync_sessions(&self, vault_id: &str, limit: i64) -> Result<Vec<SyncSession>> {
        let conn = self.get_conn()?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT id, vault_id, started_at, completed_at, status,
                   files_uploaded, files_downloaded, files_deleted_local,
                   files_deleted_remote, conflicts, skipped_files, error_message
            FROM sync_sessions
            WHERE vault_id = ?1
            ORDER BY started_at DESC
            LIMIT ?2
            "#,
            )
            .map_err(|e| AppError::Storage(format!("failed to prepare query: {}", e)))?;

        let sessions = stmt
            .query_map(params![vault_id, limit], |row| {
                let status_str: String = row.get("status")?;
                Ok(SyncSession {
                    id: row.get("id")?,
                    vault_id: row.get("vault_id")?,
                    started_at: row.get("started_at")?,
                    completed_at: row.get("completed_at")?,
                    status: SyncSessionStatus::try_from(status_str.as_str())
                        .unwrap_or(SyncSessionStatus::Running),
                    files_uploaded: row.get("files_uploaded")?,
                    files_downloaded: row.get("files_downloaded")?,
                    files_deleted_local: row.get("files_deleted_local")?,
                    files_deleted_remote: row.get("files_deleted_remote")?,
                    conflicts: row.get("conflicts")?,
                    skipped_files: row.get("skipped_files")?,
                    error_message: row.get("error_message")?,
                })
            })
            .map_err(|e| AppError::Storage(format!("failed to get sessions: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(sessions)
    }
}
