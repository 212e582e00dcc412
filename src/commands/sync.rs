use serde::Serialize;
use tauri::{AppHandle, Emitter, State};

use crate::config;
use crate::credentials::CredentialsManager;
use crate::db::DbManager;
use crate::error::{AppError, Result};
use crate::session::{SessionState, VaultSession};
use crate::sync::SyncResult;

/// Completion event for one `Reconciler::sync()` pass, the "one aggregate
/// notification per pass" user-visible surface from spec §7.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCompleteEvent {
    pub vault_id: String,
    pub uploaded_files: i64,
    pub downloaded_files: i64,
    pub conflicts: i64,
    pub skipped_files: i64,
}

/// Emitted when an unhandled error aborts a whole pass (spec §7: per-file
/// errors never reach here, only e.g. an auth failure).
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorEvent {
    pub vault_id: String,
    pub error: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    pub vault_id: String,
}

/// Connects a vault to a configured account/bucket and starts its background
/// watcher + debounce pipeline. Only one vault is connected at a time
/// (§5's single-worker model); connecting a new one first disconnects any
/// existing session.
#[tauri::command(rename_all = "camelCase")]
pub async fn connect_vault(
    app: AppHandle,
    credentials: State<'_, CredentialsManager>,
    session: State<'_, SessionState>,
    db: State<'_, DbManager>,
    account_id: String,
    bucket: String,
    remote_prefix: String,
    vault_path: String,
) -> Result<VaultStatus> {
    let path = std::path::PathBuf::from(&vault_path);
    if !path.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "vault path is not a directory: {}",
            vault_path
        )));
    }

    let sync_config = config::load(&app)?;

    let new_session = VaultSession::connect(
        &credentials,
        &account_id,
        bucket,
        remote_prefix,
        path,
        &sync_config,
        db.inner().clone(),
    )
    .await?;
    let vault_id = new_session.vault_id.clone();

    let mut guard = session.0.lock().await;
    if let Some(previous) = guard.take() {
        previous.disconnect().await;
    }
    *guard = Some(new_session);

    Ok(VaultStatus { vault_id })
}

/// Disconnects the active vault, if any: cancels the pipeline timer and
/// unregisters the watcher (spec §5, plugin shutdown semantics).
#[tauri::command(rename_all = "camelCase")]
pub async fn disconnect_vault(session: State<'_, SessionState>) -> Result<()> {
    if let Some(active) = session.0.lock().await.take() {
        active.disconnect().await;
    }
    Ok(())
}

#[tauri::command(rename_all = "camelCase")]
pub async fn vault_status(session: State<'_, SessionState>) -> Result<Option<VaultStatus>> {
    Ok(session
        .0
        .lock()
        .await
        .as_ref()
        .map(|s| VaultStatus { vault_id: s.vault_id.clone() }))
}

async fn active_reconciler(
    session: &SessionState,
) -> Result<(String, std::sync::Arc<crate::sync::Reconciler>)> {
    let guard = session.0.lock().await;
    let active = guard
        .as_ref()
        .ok_or_else(|| AppError::InvalidInput("no vault is connected".to_string()))?;
    Ok((active.vault_id.clone(), active.reconciler.clone()))
}

/// Records a pass against the ambient `sync_sessions` history table and
/// emits the aggregate completion/error event (§7). The authoritative sync
/// state remains the `SyncIndex`/`TombstoneStore` JSON files regardless of
/// whether this bookkeeping succeeds.
fn record_pass(app: &AppHandle, db: &DbManager, vault_id: &str, outcome: &Result<SyncResult>) {
    let session_id = match db.create_sync_session(vault_id) {
        Ok(id) => id,
        Err(e) => {
            log::warn!("failed to record sync session start: {}", e);
            return;
        }
    };

    match outcome {
        Ok(result) => {
            if let Err(e) = db.complete_sync_session(
                session_id,
                result.uploaded_files,
                result.downloaded_files,
                0,
                0,
                result.conflicts,
                result.skipped_files,
            ) {
                log::warn!("failed to record sync session completion: {}", e);
            }
            let _ = app.emit(
                "sync-complete",
                SyncCompleteEvent {
                    vault_id: vault_id.to_string(),
                    uploaded_files: result.uploaded_files,
                    downloaded_files: result.downloaded_files,
                    conflicts: result.conflicts,
                    skipped_files: result.skipped_files,
                },
            );
        }
        Err(e) => {
            if let Err(log_err) = db.fail_sync_session(session_id, &e.to_string()) {
                log::warn!("failed to record sync session failure: {}", log_err);
            }
            let _ = app.emit(
                "sync-error",
                SyncErrorEvent {
                    vault_id: vault_id.to_string(),
                    error: e.to_string(),
                },
            );
        }
    }
}

/// Operator surface `sync` (spec §6): drives one reconciliation pass.
#[tauri::command(rename_all = "camelCase")]
pub async fn sync_now(
    app: AppHandle,
    db: State<'_, DbManager>,
    session: State<'_, SessionState>,
) -> Result<SyncResult> {
    let (vault_id, reconciler) = active_reconciler(&session).await?;
    let outcome = reconciler.sync().await;
    record_pass(&app, &db, &vault_id, &outcome);
    outcome
}

/// Operator surface `force-upload-all` (spec §4.4, §6): the recovery tool
/// that overwrites remote with every local file, clearing conflict state.
#[tauri::command(rename_all = "camelCase")]
pub async fn force_upload_all(
    app: AppHandle,
    db: State<'_, DbManager>,
    session: State<'_, SessionState>,
) -> Result<SyncResult> {
    let (vault_id, reconciler) = active_reconciler(&session).await?;
    let outcome = reconciler.force_upload_all().await;
    record_pass(&app, &db, &vault_id, &outcome);
    outcome
}

/// Operator surface `reconcile-index` (spec §6): re-scans the vault, tracks
/// untracked files, and prunes stale remote-only placeholders without
/// network I/O.
#[tauri::command(rename_all = "camelCase")]
pub async fn reconcile_index(session: State<'_, SessionState>) -> Result<()> {
    let (_, reconciler) = active_reconciler(&session).await?;
    reconciler.reconcile_index().await
}
