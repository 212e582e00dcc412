use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::db::operations::OperationType;
use crate::db::DbManager;
use crate::error::{AppError, Result};

use super::conflict;
use super::delta::{self, LocalCandidate};
use super::index::{FileSyncState, FolderSyncState, SyncIndex};
use super::remote::{RemoteFile, RemoteStore};
use super::tombstone::TombstoneStore;
use super::vault::{ScanFilters, VaultAdapter};

/// `SyncResult` (§7): always returned from `sync()`. Only unhandled
/// exceptions mark the whole pass failed; per-file errors never do.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    pub uploaded_files: i64,
    pub downloaded_files: i64,
    pub conflicts: i64,
    pub skipped_files: i64,
}

impl SyncResult {
    fn coalesced() -> Self {
        Self {
            success: true,
            message: "a sync pass was already running; this call was coalesced".to_string(),
            uploaded_files: 0,
            downloaded_files: 0,
            conflicts: 0,
            skipped_files: 0,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The heart of the engine (§4.4): builds a candidate local index, computes
/// the three-way delta against the remote listing, and drives one atomic
/// pass of downloads, then uploads, then conflicts, then tombstone cleanup.
pub struct Reconciler {
    index: Arc<SyncIndex>,
    tombstones: Arc<TombstoneStore>,
    remote: Arc<dyn RemoteStore>,
    vault: Arc<dyn VaultAdapter>,
    sync_agent_id: String,
    vault_id: String,
    filters: ScanFilters,
    in_progress: AtomicBool,
    db: Option<DbManager>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: Arc<SyncIndex>,
        tombstones: Arc<TombstoneStore>,
        remote: Arc<dyn RemoteStore>,
        vault: Arc<dyn VaultAdapter>,
        sync_agent_id: String,
        vault_id: String,
        filters: ScanFilters,
        db: Option<DbManager>,
    ) -> Self {
        Self {
            index,
            tombstones,
            remote,
            vault,
            sync_agent_id,
            vault_id,
            filters,
            in_progress: AtomicBool::new(false),
            db,
        }
    }

    /// Logs one completed or failed per-file action to the ambient
    /// `sync_operations` history table, if a `DbManager` was supplied. A
    /// transient failure (§7) is noted as such so the log reads as "will
    /// retry next pass" rather than a hard error.
    fn record_operation(
        &self,
        path: &str,
        op: OperationType,
        size: Option<i64>,
        started: Instant,
        error: Option<&AppError>,
    ) {
        let Some(db) = &self.db else { return };

        if let Some(e) = error {
            if e.is_transient() {
                log::warn!("transient error on {} for {}: {} (will retry next pass)", op, path, e);
            }
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        let error_message = error.map(|e| e.to_string());
        if let Err(log_err) = db.log_operation(
            &self.vault_id,
            path,
            op,
            size,
            duration_ms,
            error_message.as_deref(),
        ) {
            log::warn!("failed to log operation for {}: {}", path, log_err);
        }
    }

    /// `sync()` (§4.4). Non-reentrant: a call arriving while another pass is
    /// in flight is coalesced rather than run in parallel (§5).
    pub async fn sync(&self) -> Result<SyncResult> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            log::info!("sync() already in progress, coalescing this call");
            return Ok(SyncResult::coalesced());
        }

        let result = self.run_pass().await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run_pass(&self) -> Result<SyncResult> {
        let scanned = self.vault.scan_tree(&self.filters).await?;
        let mut candidate = self.build_candidate_index(&scanned).await?;
        self.process_local_deletions(&mut candidate).await?;
        self.hash_candidates(&mut candidate).await?;

        let remote_files = self.resolve_remote_files().await?;
        let delta = delta::compute(&candidate, &remote_files, &self.sync_agent_id);

        let mut uploaded = 0i64;
        let mut downloaded = 0i64;
        let mut conflicts = 0i64;
        let mut skipped = 0i64;

        // Downloads before uploads: remote changes are pulled before local
        // writes are pushed so same-session echoes do not mis-classify (§4.4 step 3).
        for action in &delta.downloads {
            if self.download_path(&action.path, &action.remote).await? {
                downloaded += 1;
            } else {
                skipped += 1;
            }
        }

        for action in &delta.uploads {
            if self.upload_path(&action.path).await? {
                uploaded += 1;
            } else {
                skipped += 1;
            }
        }

        for action in &delta.conflicts {
            if self.resolve_conflict(&action.path, &action.remote).await? {
                conflicts += 1;
            } else {
                skipped += 1;
            }
        }

        self.process_tombstones().await?;

        self.index.mark_pass_complete().await;
        self.index.flush().await?;

        Ok(SyncResult {
            success: true,
            message: format!(
                "synced: {} uploaded, {} downloaded, {} conflicts, {} skipped",
                uploaded, downloaded, conflicts, skipped
            ),
            uploaded_files: uploaded,
            downloaded_files: downloaded,
            conflicts,
            skipped_files: skipped,
        })
    }

    /// Alternative entry point (§4.4): uploads every vault file overwriting
    /// remote, clearing conflict state. Used as a recovery tool.
    pub async fn force_upload_all(&self) -> Result<SyncResult> {
        let scanned = self.vault.scan_tree(&self.filters).await?;
        let mut uploaded = 0i64;
        let mut skipped = 0i64;

        for meta in scanned.iter().filter(|f| !f.is_folder) {
            self.index.ensure_tracked(&meta.path).await;
            self.index.clear_conflict(&meta.path).await;
            if self.upload_path(&meta.path).await? {
                uploaded += 1;
            } else {
                skipped += 1;
            }
        }

        self.index.flush().await?;

        Ok(SyncResult {
            success: true,
            message: format!("force upload complete: {} uploaded, {} skipped", uploaded, skipped),
            uploaded_files: uploaded,
            downloaded_files: 0,
            conflicts: 0,
            skipped_files: skipped,
        })
    }

    /// Operator surface `reconcile-index` (§6): re-scans the vault, tracks
    /// untracked files, and prunes stale remote-only placeholders, without
    /// performing any network I/O.
    pub async fn reconcile_index(&self) -> Result<()> {
        let scanned = self.vault.scan_tree(&self.filters).await?;
        let scanned_paths: std::collections::HashSet<String> = scanned
            .iter()
            .filter(|f| !f.is_folder)
            .map(|f| f.path.clone())
            .collect();

        let snapshot = self.index.get_state().await;
        for (path, state) in snapshot.files.iter() {
            if !scanned_paths.contains(path) && state.is_remote_only_placeholder() {
                self.index.remove_file(path).await;
            }
        }

        for path in &scanned_paths {
            self.index.ensure_tracked(path).await;
        }

        self.index.flush().await
    }

    pub async fn handle_file_creation(&self, path: &str) -> Result<()> {
        self.index.ensure_tracked(path).await;
        self.upload_path(path).await?;
        Ok(())
    }

    pub async fn handle_file_modification(&self, path: &str) -> Result<()> {
        let bytes = self.vault.read_file(path).await?;
        let hash = compute_hash(&bytes);
        let mtime = self
            .vault
            .stat(path)
            .await?
            .map(|m| m.mtime)
            .unwrap_or_else(now_ms);

        if self.index.needs_sync(path, &hash, mtime, bytes.len() as u64).await {
            self.upload_path(path).await?;
        }
        Ok(())
    }

    /// `handleFileDeletion` (§4.4): tombstones the prior remote object, if
    /// any, and drops the index entry.
    pub async fn handle_file_deletion(&self, path: &str) -> Result<()> {
        if let Some(state) = self.index.file_state(path).await {
            if let Some(remote_id) = state.remote_file_id {
                self.tombstones.add(&remote_id, path, &self.sync_agent_id).await;
                self.tombstones.flush().await?;
            }
        }
        self.index.remove_file(path).await;
        self.index.flush().await
    }

    /// `handleFileRename` (§4.4): tombstones the old path's remote object
    /// and uploads the new path as a fresh file.
    pub async fn handle_file_rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        if let Some(state) = self.index.file_state(old_path).await {
            if let Some(remote_id) = state.remote_file_id {
                self.tombstones.add(&remote_id, old_path, &self.sync_agent_id).await;
                self.tombstones.flush().await?;
            }
        }
        self.index.remove_file(old_path).await;
        self.index.flush().await?;

        self.index.ensure_tracked(new_path).await;
        self.upload_path(new_path).await?;
        Ok(())
    }

    pub async fn handle_folder_creation(&self, path: &str) -> Result<()> {
        self.index.upsert_folder(path, FolderSyncState::default()).await;
        self.index.flush().await
    }

    pub async fn handle_folder_deletion(&self, path: &str) -> Result<()> {
        self.index.remove_folder(path).await;
        self.index.flush().await
    }

    /// Folder rename cascades via `SyncIndex::rename_folder`. The remote
    /// store models folders implicitly by object path, so no remote folder
    /// operation is needed (§4.4).
    pub async fn handle_folder_rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.index.rename_folder(old_path, new_path).await;
        self.index.flush().await
    }

    async fn build_candidate_index(
        &self,
        scanned: &[super::vault::FileMetadata],
    ) -> Result<HashMap<String, LocalCandidate>> {
        let snapshot = self.index.get_state().await;
        let scanned_paths: std::collections::HashSet<&str> = scanned
            .iter()
            .filter(|f| !f.is_folder)
            .map(|f| f.path.as_str())
            .collect();

        let mut candidate = HashMap::new();

        // §4.4 step 1: drop stale remote-only placeholders with no backing
        // local file.
        for (path, state) in snapshot.files.iter() {
            let exists = scanned_paths.contains(path.as_str());
            if !exists && state.is_remote_only_placeholder() {
                continue;
            }
            candidate.insert(
                path.clone(),
                LocalCandidate {
                    state: state.clone(),
                    exists,
                    current_hash: None,
                },
            );
        }

        // Every vault file not yet in the candidate index becomes an
        // upload candidate.
        for meta in scanned.iter().filter(|f| !f.is_folder) {
            candidate.entry(meta.path.clone()).or_insert_with(|| LocalCandidate {
                state: FileSyncState::placeholder(),
                exists: true,
                current_hash: None,
            });
        }

        Ok(candidate)
    }

    /// Catches deletions that reach `sync()` through the generic pending-set
    /// path rather than the immediate `handle_file_deletion` dispatch (§4.3:
    /// a plain, non-rename deletion is just added to `pendingChanges`).
    /// Without this, a previously-synced path with no backing local file
    /// would be compared against the remote listing by `delta::compute` and
    /// misclassified as in-sync, leaving the remote object undeleted and the
    /// path forever missing locally. Tombstone it here, before the delta
    /// runs, and drop it from the candidate set so it cannot be re-matched.
    async fn process_local_deletions(&self, candidate: &mut HashMap<String, LocalCandidate>) -> Result<()> {
        let deleted: Vec<String> = candidate
            .iter()
            .filter(|(_, c)| !c.exists && !c.state.is_remote_only_placeholder())
            .map(|(path, _)| path.clone())
            .collect();

        if deleted.is_empty() {
            return Ok(());
        }

        for path in &deleted {
            if let Some(entry) = candidate.remove(path) {
                if let Some(remote_id) = entry.state.remote_file_id {
                    self.tombstones.add(&remote_id, path, &self.sync_agent_id).await;
                }
                self.index.remove_file(path).await;
            }
        }

        self.tombstones.flush().await?;
        self.index.flush().await
    }

    /// Incremental remote polling, an optional fast path over a full
    /// `list_files` scan (§4.7). With no stored `changePageToken`, the first
    /// pass against a store always does a full list, first asking the store
    /// for a starting cursor to use from the next pass on. Once a token is
    /// stored, `getChanges` is tried; a store that reports no change-feed
    /// support (empty changes, no next token, the default trait behavior)
    /// falls back to a full list for that pass too.
    ///
    /// A partial change feed only reports what moved, so the unaffected
    /// remainder of the listing is reconstructed from the index's own
    /// last-synced state rather than re-fetched, and changes are layered on
    /// top by path.
    async fn resolve_remote_files(&self) -> Result<Vec<RemoteFile>> {
        let token = match self.index.change_page_token().await {
            Some(token) => token,
            None => {
                if let Some(start_token) = self.remote.get_start_page_token().await? {
                    self.index.set_change_page_token(Some(start_token)).await;
                    self.index.flush().await?;
                }
                return self.remote.list_files(&self.vault_id).await;
            }
        };

        let (changes, next_token) = self.remote.get_changes(&token).await?;
        if changes.is_empty() && next_token.is_none() {
            return self.remote.list_files(&self.vault_id).await;
        }

        let snapshot = self.index.get_state().await;
        let mut by_path: HashMap<String, RemoteFile> = HashMap::new();
        for (path, state) in snapshot.files.iter() {
            let (Some(remote_id), Some(revision)) =
                (&state.remote_file_id, &state.last_sync_revision_id)
            else {
                continue;
            };
            by_path.insert(
                path.clone(),
                RemoteFile {
                    id: remote_id.clone(),
                    path: path.clone(),
                    mime_type: String::new(),
                    size: state.last_synced_size,
                    modified_time: state.last_synced_time,
                    head_revision_id: revision.clone(),
                    app_properties: HashMap::new(),
                },
            );
        }

        for change in changes {
            if change.removed {
                by_path.retain(|_, f| f.id != change.file_id);
                continue;
            }
            if let Some(file) = change.file {
                by_path.insert(file.path.clone(), file);
            }
        }

        if let Some(next_token) = next_token {
            self.index.set_change_page_token(Some(next_token)).await;
            self.index.flush().await?;
        }

        Ok(by_path.into_values().collect())
    }

    async fn hash_candidates(&self, candidate: &mut HashMap<String, LocalCandidate>) -> Result<()> {
        for (path, entry) in candidate.iter_mut() {
            if !entry.exists {
                continue;
            }
            let bytes = self.vault.read_file(path).await?;
            entry.current_hash = Some(compute_hash(&bytes));
        }
        Ok(())
    }

    /// Uploads the current local bytes of `path`. Returns `Ok(false)` for a
    /// non-fatal per-file failure (recorded on the index, pass continues);
    /// propagates only `AppError::Auth`, which aborts the whole pass (§7).
    async fn upload_path(&self, path: &str) -> Result<bool> {
        let started = Instant::now();
        let bytes = match self.vault.read_file(path).await {
            Ok(b) => b,
            Err(e) => {
                self.index.mark_sync_error(path, &e.to_string(), OperationType::Upload).await;
                self.index.flush().await?;
                self.record_operation(path, OperationType::Upload, None, started, Some(&e));
                return Ok(false);
            }
        };

        let hash = compute_hash(&bytes);
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let mut app_properties = HashMap::new();
        app_properties.insert("lastModifiedByAgent".to_string(), self.sync_agent_id.clone());

        let size = bytes.len() as u64;
        match self.remote.upload_file(path, bytes, &mime, app_properties).await {
            Ok(result) => {
                let mtime = self
                    .vault
                    .stat(path)
                    .await
                    .ok()
                    .flatten()
                    .map(|m| m.mtime)
                    .unwrap_or_else(now_ms);

                self.index
                    .mark_synced(
                        path,
                        &hash,
                        mtime,
                        size,
                        Some(result.id),
                        OperationType::Upload,
                        Some(result.head_revision_id),
                    )
                    .await;
                self.index.flush().await?;
                self.record_operation(path, OperationType::Upload, Some(size as i64), started, None);
                Ok(true)
            }
            Err(e) => {
                self.index.mark_sync_error(path, &e.to_string(), OperationType::Upload).await;
                self.index.flush().await?;
                self.record_operation(path, OperationType::Upload, Some(size as i64), started, Some(&e));
                if matches!(e, AppError::Auth(_)) {
                    Err(e)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Downloads `remote` into `path`. Same error-propagation rule as
    /// `upload_path`.
    async fn download_path(&self, path: &str, remote: &RemoteFile) -> Result<bool> {
        let started = Instant::now();
        match self.remote.download_file(&remote.id).await {
            Ok(bytes) => {
                self.vault.write_file(path, &bytes).await?;
                let size = bytes.len() as u64;
                let hash = compute_hash(&bytes);
                self.index
                    .mark_synced(
                        path,
                        &hash,
                        now_ms(),
                        size,
                        Some(remote.id.clone()),
                        OperationType::Download,
                        Some(remote.head_revision_id.clone()),
                    )
                    .await;
                self.index.flush().await?;
                self.record_operation(path, OperationType::Download, Some(size as i64), started, None);
                Ok(true)
            }
            Err(e) => {
                self.index.mark_sync_error(path, &e.to_string(), OperationType::Download).await;
                self.index.flush().await?;
                self.record_operation(path, OperationType::Download, None, started, Some(&e));
                if matches!(e, AppError::Auth(_)) {
                    Err(e)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// "Conflicted Copy" resolution (§4.5): the remote version lands at a
    /// derived path, the local version uploads normally, nothing is discarded.
    async fn resolve_conflict(&self, path: &str, remote: &RemoteFile) -> Result<bool> {
        let started = Instant::now();
        let remote_bytes = match self.remote.download_file(&remote.id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.index.mark_sync_error(path, &e.to_string(), OperationType::Download).await;
                self.index.flush().await?;
                self.record_operation(path, OperationType::ConflictCopy, None, started, Some(&e));
                return if matches!(e, AppError::Auth(_)) { Err(e) } else { Ok(false) };
            }
        };

        let label = conflict::host_label(&self.sync_agent_id);
        let conflict_path = conflict::conflicted_copy_path(path, &label);

        self.vault.write_file(&conflict_path, &remote_bytes).await?;
        let hash = compute_hash(&remote_bytes);
        self.index
            .mark_synced(
                &conflict_path,
                &hash,
                now_ms(),
                remote_bytes.len() as u64,
                Some(remote.id.clone()),
                OperationType::ConflictCopy,
                Some(remote.head_revision_id.clone()),
            )
            .await;
        self.index.mark_conflict(path).await;
        self.index.flush().await?;

        self.upload_path(path).await
    }

    /// §4.4 step 5: move locally-present tombstoned files to the OS trash,
    /// then permanently delete the remote object for every expired tombstone.
    async fn process_tombstones(&self) -> Result<()> {
        for (_file_id, tombstone) in self.tombstones.get_all().await {
            if self.vault.exists(&tombstone.file_path).await.unwrap_or(false) {
                match self.vault.trash_file(&tombstone.file_path).await {
                    Ok(()) => self.index.remove_file(&tombstone.file_path).await,
                    Err(e) => log::warn!(
                        "failed to move tombstoned file {} to trash: {}",
                        tombstone.file_path,
                        e
                    ),
                }
            }
        }

        for (file_id, _tombstone) in self.tombstones.get_expired().await {
            match self.remote.delete_file(&file_id).await {
                Ok(()) => self.tombstones.remove(&file_id).await,
                Err(e) => log::warn!("failed to delete expired remote object {}: {}", file_id, e),
            }
        }

        self.tombstones.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::{ChangeEntry, UploadResult};
    use crate::sync::vault::FileMetadata;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;
    use std::sync::Mutex as StdMutex;

    /// An in-memory `RemoteStore` double for exercising the reconciler
    /// without a real S3-compatible endpoint.
    struct InMemoryRemote {
        objects: StdMutex<Map<String, (RemoteFile, Vec<u8>)>>,
        next_id: StdMutex<u64>,
    }

    impl InMemoryRemote {
        fn new() -> Self {
            Self {
                objects: StdMutex::new(Map::new()),
                next_id: StdMutex::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for InMemoryRemote {
        async fn list_files(&self, _vault_id: &str) -> Result<Vec<RemoteFile>> {
            Ok(self.objects.lock().unwrap().values().map(|(f, _)| f.clone()).collect())
        }

        async fn upload_file(
            &self,
            path: &str,
            bytes: Vec<u8>,
            mime: &str,
            app_properties: Map<String, String>,
        ) -> Result<UploadResult> {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let revision = format!("rev-{}", next_id);
            let id = format!("id-{}", path);

            let file = RemoteFile {
                id: id.clone(),
                path: path.to_string(),
                mime_type: mime.to_string(),
                size: bytes.len() as u64,
                modified_time: 0,
                head_revision_id: revision.clone(),
                app_properties,
            };

            self.objects.lock().unwrap().insert(id.clone(), (file, bytes));
            Ok(UploadResult { id, head_revision_id: revision })
        }

        async fn download_file(&self, id: &str) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(id)
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| AppError::NotFound(id.to_string()))
        }

        async fn delete_file(&self, id: &str) -> Result<()> {
            self.objects.lock().unwrap().remove(id);
            Ok(())
        }

        async fn get_file_metadata(&self, id: &str) -> Result<RemoteFile> {
            self.objects
                .lock()
                .unwrap()
                .get(id)
                .map(|(f, _)| f.clone())
                .ok_or_else(|| AppError::NotFound(id.to_string()))
        }

        async fn get_changes(&self, _token: &str) -> Result<(Vec<ChangeEntry>, Option<String>)> {
            Ok((Vec::new(), None))
        }
    }

    /// An in-memory `VaultAdapter` double backed by a `HashMap`.
    struct InMemoryVault {
        files: StdMutex<Map<String, Vec<u8>>>,
    }

    impl InMemoryVault {
        fn new() -> Self {
            Self { files: StdMutex::new(Map::new()) }
        }

        fn set(&self, path: &str, bytes: &[u8]) {
            self.files.lock().unwrap().insert(path.to_string(), bytes.to_vec());
        }

        fn get(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }
    }

    #[async_trait]
    impl VaultAdapter for InMemoryVault {
        async fn scan_tree(&self, _filters: &ScanFilters) -> Result<Vec<FileMetadata>> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(path, bytes)| FileMetadata {
                    path: path.clone(),
                    mtime: 0,
                    ctime: 0,
                    size: bytes.len() as u64,
                    is_folder: false,
                    extension: None,
                })
                .collect())
        }

        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.get(path).ok_or_else(|| AppError::NotFound(path.to_string()))
        }

        async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
            self.set(path, bytes);
            Ok(())
        }

        async fn create_folder(&self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn trash_file(&self, path: &str) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        async fn stat(&self, path: &str) -> Result<Option<FileMetadata>> {
            Ok(self.get(path).map(|bytes| FileMetadata {
                path: path.to_string(),
                mtime: 0,
                ctime: 0,
                size: bytes.len() as u64,
                is_folder: false,
                extension: None,
            }))
        }
    }

    async fn build_reconciler(vault_id: &str, agent_id: &str) -> (Reconciler, Arc<InMemoryVault>, Arc<InMemoryRemote>) {
        let index = Arc::new(SyncIndex::load(std::env::temp_dir().join(format!("idx-{}.json", uuid::Uuid::new_v4())), vault_id).await);
        let tombstones = Arc::new(TombstoneStore::load(std::env::temp_dir().join(format!("tomb-{}.json", uuid::Uuid::new_v4())), 30).await);
        let vault = Arc::new(InMemoryVault::new());
        let remote = Arc::new(InMemoryRemote::new());

        let reconciler = Reconciler::new(
            index,
            tombstones,
            remote.clone(),
            vault.clone(),
            agent_id.to_string(),
            vault_id.to_string(),
            ScanFilters::default(),
            None,
        );

        (reconciler, vault, remote)
    }

    #[tokio::test]
    async fn fresh_file_uploads_on_first_pass() {
        let (reconciler, vault, _remote) = build_reconciler("vault-1", "agent-a").await;
        vault.set("notes/a.md", b"x");

        let result = reconciler.sync().await.unwrap();

        assert_eq!(result.uploaded_files, 1);
        assert_eq!(result.downloaded_files, 0);
    }

    #[tokio::test]
    async fn second_pass_with_no_changes_is_a_no_op() {
        let (reconciler, vault, _remote) = build_reconciler("vault-1", "agent-a").await;
        vault.set("notes/a.md", b"x");

        reconciler.sync().await.unwrap();
        let result = reconciler.sync().await.unwrap();

        assert_eq!(result.uploaded_files, 0);
        assert_eq!(result.downloaded_files, 0);
        assert_eq!(result.conflicts, 0);
    }

    #[tokio::test]
    async fn own_echo_does_not_trigger_a_download() {
        let (reconciler, vault, _remote) = build_reconciler("vault-1", "agent-a").await;
        vault.set("notes/a.md", b"x");

        reconciler.sync().await.unwrap();
        // The object now carries agent-a's echo tag; a second pass must not
        // re-download it, even though nothing changed locally.
        let result = reconciler.sync().await.unwrap();

        assert_eq!(result.downloaded_files, 0);
    }

    #[tokio::test]
    async fn remote_only_file_downloads() {
        let (reconciler, vault, remote) = build_reconciler("vault-1", "agent-b").await;
        remote
            .upload_file("notes/remote.md", b"remote-bytes".to_vec(), "text/markdown", Map::new())
            .await
            .unwrap();

        let result = reconciler.sync().await.unwrap();

        assert_eq!(result.downloaded_files, 1);
        assert_eq!(vault.get("notes/remote.md").unwrap(), b"remote-bytes".to_vec());
    }

    #[tokio::test]
    async fn handle_file_deletion_tombstones_a_synced_file() {
        let (reconciler, vault, _remote) = build_reconciler("vault-1", "agent-a").await;
        vault.set("notes/a.md", b"x");
        reconciler.sync().await.unwrap();

        reconciler.handle_file_deletion("notes/a.md").await.unwrap();

        assert!(reconciler.index.file_state("notes/a.md").await.is_none());
        assert!(!reconciler.tombstones.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn sync_tombstones_a_deletion_seen_only_through_the_pending_path() {
        // A plain (non-rename) local deletion reaches sync() through the
        // ChangePipeline's generic pendingChanges set (§4.3), not through
        // handle_file_deletion. sync() itself must notice the vanished file
        // and tombstone it, or the remote object would never be cleaned up.
        let (reconciler, vault, _remote) = build_reconciler("vault-1", "agent-a").await;
        vault.set("notes/a.md", b"x");
        reconciler.sync().await.unwrap();

        vault.files.lock().unwrap().remove("notes/a.md");
        let result = reconciler.sync().await.unwrap();

        assert!(reconciler.index.file_state("notes/a.md").await.is_none());
        assert!(!reconciler.tombstones.get_all().await.is_empty());
        assert_eq!(result.uploaded_files, 0);
        assert_eq!(result.downloaded_files, 0);
    }

    /// A `RemoteStore` double with a real change feed, to exercise §4.7's
    /// fast path independent of `InMemoryRemote` (which reports no feed
    /// support at all, the more common case for an S3-compatible store).
    struct PagedRemote {
        file: RemoteFile,
        list_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for PagedRemote {
        async fn list_files(&self, _vault_id: &str) -> Result<Vec<RemoteFile>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![self.file.clone()])
        }

        async fn upload_file(
            &self,
            _path: &str,
            _bytes: Vec<u8>,
            _mime: &str,
            _app_properties: Map<String, String>,
        ) -> Result<UploadResult> {
            unreachable!("this test never uploads")
        }

        async fn download_file(&self, _id: &str) -> Result<Vec<u8>> {
            Ok(b"remote-bytes".to_vec())
        }

        async fn delete_file(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn get_file_metadata(&self, _id: &str) -> Result<RemoteFile> {
            Ok(self.file.clone())
        }

        async fn get_start_page_token(&self) -> Result<Option<String>> {
            Ok(Some("0".to_string()))
        }

        async fn get_changes(&self, token: &str) -> Result<(Vec<ChangeEntry>, Option<String>)> {
            if token == "0" {
                Ok((
                    vec![ChangeEntry {
                        file_id: self.file.id.clone(),
                        removed: false,
                        file: Some(self.file.clone()),
                    }],
                    Some("1".to_string()),
                ))
            } else {
                Ok((Vec::new(), Some(token.to_string())))
            }
        }
    }

    #[tokio::test]
    async fn incremental_polling_fast_path_skips_a_full_list_once_a_token_is_stored() {
        let vault_id = "vault-1";
        let index = Arc::new(
            SyncIndex::load(std::env::temp_dir().join(format!("idx-{}.json", uuid::Uuid::new_v4())), vault_id).await,
        );
        let tombstones = Arc::new(
            TombstoneStore::load(std::env::temp_dir().join(format!("tomb-{}.json", uuid::Uuid::new_v4())), 30).await,
        );
        let vault = Arc::new(InMemoryVault::new());
        let remote_file = RemoteFile {
            id: "remote-1".to_string(),
            path: "notes/new.md".to_string(),
            mime_type: "text/markdown".to_string(),
            size: 12,
            modified_time: 0,
            head_revision_id: "rev-1".to_string(),
            app_properties: Map::new(),
        };
        let remote = Arc::new(PagedRemote {
            file: remote_file,
            list_calls: std::sync::atomic::AtomicUsize::new(0),
        });

        let reconciler = Reconciler::new(
            index,
            tombstones,
            remote.clone(),
            vault,
            "agent-a".to_string(),
            vault_id.to_string(),
            ScanFilters::default(),
            None,
        );

        // No token stored yet: the reconciler asks for a starting cursor and
        // still does a full list for this pass.
        let result = reconciler.sync().await.unwrap();
        assert_eq!(result.downloaded_files, 1);
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1);

        // A token is now stored: the second pass must use getChanges instead
        // of listing every file again.
        let result = reconciler.sync().await.unwrap();
        assert!(result.success);
        assert_eq!(result.downloaded_files, 0);
        assert_eq!(
            remote.list_calls.load(Ordering::SeqCst),
            1,
            "second pass must not re-list"
        );
    }
}
