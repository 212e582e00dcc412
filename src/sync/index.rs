use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::db::operations::OperationType;
use crate::error::Result;

use super::persist;

const INDEX_VERSION: &str = "1.0.0";
const HISTORY_LIMIT: usize = 5;

/// One entry in a `FileSyncState`'s bounded history, newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub op: OperationType,
    pub success: bool,
    pub error: Option<String>,
}

/// Durable per-file sync state, keyed by vault-relative path in `VaultSyncState::files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncState {
    #[serde(default)]
    pub last_synced_hash: String,
    #[serde(default)]
    pub last_synced_time: i64,
    #[serde(default)]
    pub last_synced_size: u64,
    #[serde(default)]
    pub last_sync_revision_id: Option<String>,
    #[serde(default)]
    pub remote_file_id: Option<String>,
    #[serde(default)]
    pub first_synced_time: i64,
    #[serde(default)]
    pub sync_count: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub conflict_count: u64,
    #[serde(default)]
    pub history: VecDeque<HistoryEntry>,
}

impl FileSyncState {
    /// A fresh placeholder for a newly discovered local file, or for a path
    /// seen in a remote listing that has no candidate-index entry yet.
    pub(crate) fn placeholder() -> Self {
        Self {
            last_synced_hash: String::new(),
            last_synced_time: 0,
            last_synced_size: 0,
            last_sync_revision_id: None,
            remote_file_id: None,
            first_synced_time: now_ms(),
            sync_count: 0,
            last_error: None,
            conflict_count: 0,
            history: VecDeque::new(),
        }
    }

    /// A stale remote-only placeholder carries no identity and no history;
    /// it is dropped at the start of every pass (§4.4 step 1).
    pub fn is_remote_only_placeholder(&self) -> bool {
        self.last_synced_time == 0 && self.last_synced_hash.is_empty()
    }

    fn push_history(&mut self, op: OperationType, success: bool, error: Option<String>) {
        self.history.push_front(HistoryEntry {
            timestamp: now_ms(),
            op,
            success,
            error,
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_back();
        }
    }
}

/// Durable per-folder sync state. Folder paths always carry a trailing `/`
/// so prefix matching during a rename cascade is unambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSyncState {
    #[serde(default)]
    pub last_synced_time: i64,
    #[serde(default)]
    pub remote_folder_id: Option<String>,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub subfolder_count: u64,
}

impl Default for FolderSyncState {
    fn default() -> Self {
        Self {
            last_synced_time: now_ms(),
            remote_folder_id: None,
            file_count: 0,
            subfolder_count: 0,
        }
    }
}

/// The whole-vault persisted state, serialized verbatim to `sync-index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncState {
    #[serde(default = "default_version")]
    pub version: String,
    pub vault_id: String,
    #[serde(default)]
    pub last_full_sync: i64,
    #[serde(default)]
    pub last_remote_check: i64,
    #[serde(default)]
    pub change_page_token: Option<String>,
    #[serde(default)]
    pub files: HashMap<String, FileSyncState>,
    #[serde(default)]
    pub folders: HashMap<String, FolderSyncState>,
}

fn default_version() -> String {
    INDEX_VERSION.to_string()
}

impl VaultSyncState {
    fn empty(vault_id: &str) -> Self {
        Self {
            version: INDEX_VERSION.to_string(),
            vault_id: vault_id.to_string(),
            last_full_sync: 0,
            last_remote_check: 0,
            change_page_token: None,
            files: HashMap::new(),
            folders: HashMap::new(),
        }
    }
}

impl Default for VaultSyncState {
    fn default() -> Self {
        Self::empty("")
    }
}

/// The fallback decision `should_download` hands back for a path whose
/// `lastSyncRevisionId` is unknown (§4.6's `RevisionRef::Unknown` case).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadDecision {
    Download,
    Conflict,
    Skip,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Durable, crash-consistent in-memory state for one vault (§4.1).
///
/// Every mutation method is synchronous and only touches the in-memory
/// state; callers (the `Reconciler`) are expected to call `flush()` after
/// each committed action so a crash leaves exactly the actions that
/// completed on disk.
pub struct SyncIndex {
    state: RwLock<VaultSyncState>,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SyncIndex {
    /// Load `<pluginDir>/sync-index.json`, or start fresh if missing/corrupt.
    pub async fn load(path: PathBuf, vault_id: &str) -> Self {
        let mut state: VaultSyncState = persist::read_json_or_default(&path).await;
        if state.vault_id.is_empty() {
            state = VaultSyncState::empty(vault_id);
        }
        Self {
            state: RwLock::new(state),
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Atomically persist the current state. Serialized by `write_lock` so
    /// at most one write is ever in flight for this vault.
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.state.read().await.clone();
        persist::write_json_atomic(&self.path, &snapshot).await
    }

    /// `needsSync(path, hash, mtime, size) → bool` (§4.1): true iff no entry,
    /// or any of (hash, size, mtime-past-lastSynced) differ.
    pub async fn needs_sync(&self, path: &str, hash: &str, mtime: i64, size: u64) -> bool {
        match self.state.read().await.files.get(path) {
            None => true,
            Some(entry) => {
                entry.last_synced_hash != hash
                    || entry.last_synced_size != size
                    || entry.last_synced_time < mtime
                    || entry.last_synced_hash.is_empty()
            }
        }
    }

    /// `markSynced` (§4.1): idempotently records success, clears the error,
    /// bumps `syncCount`, and pushes a history entry.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_synced(
        &self,
        path: &str,
        hash: &str,
        mtime: i64,
        size: u64,
        remote_id: Option<String>,
        op: OperationType,
        revision_id: Option<String>,
    ) {
        let mut state = self.state.write().await;
        let entry = state
            .files
            .entry(path.to_string())
            .or_insert_with(FileSyncState::placeholder);

        if entry.first_synced_time == 0 {
            entry.first_synced_time = now_ms();
        }
        entry.last_synced_hash = hash.to_string();
        entry.last_synced_time = mtime;
        entry.last_synced_size = size;
        entry.last_sync_revision_id = revision_id;
        if remote_id.is_some() {
            entry.remote_file_id = remote_id;
        }
        entry.last_error = None;
        entry.sync_count += 1;
        entry.push_history(op, true, None);
    }

    /// `markSyncError` (§4.1): records a transient failure without touching
    /// sync-identity fields. Creates a minimal entry if none exists so the
    /// error is visible even for a file never successfully synced.
    pub async fn mark_sync_error(&self, path: &str, error: &str, op: OperationType) {
        let mut state = self.state.write().await;
        let entry = state
            .files
            .entry(path.to_string())
            .or_insert_with(FileSyncState::placeholder);

        entry.last_error = Some(error.to_string());
        entry.push_history(op, false, Some(error.to_string()));
    }

    /// `markConflict` (§4.1).
    pub async fn mark_conflict(&self, path: &str) {
        let mut state = self.state.write().await;
        let entry = state
            .files
            .entry(path.to_string())
            .or_insert_with(FileSyncState::placeholder);

        entry.conflict_count += 1;
        entry.push_history(OperationType::ConflictCopy, true, None);
    }

    /// Inserts a fresh placeholder entry for `path` if none exists yet,
    /// without touching history. Used when a re-scan discovers an
    /// untracked file (the `reconcile-index` operator surface, §6).
    pub async fn ensure_tracked(&self, path: &str) {
        let mut state = self.state.write().await;
        state
            .files
            .entry(path.to_string())
            .or_insert_with(FileSyncState::placeholder);
    }

    /// Resets a file's conflict count, used by `forceUploadAll`'s recovery
    /// path to clear conflict state on every overwritten file.
    pub async fn clear_conflict(&self, path: &str) {
        if let Some(entry) = self.state.write().await.files.get_mut(path) {
            entry.conflict_count = 0;
        }
    }

    pub async fn remove_file(&self, path: &str) {
        self.state.write().await.files.remove(path);
    }

    pub async fn remove_folder(&self, path: &str) {
        let folder_path = normalize_folder_path(path);
        self.state.write().await.folders.remove(&folder_path);
    }

    /// `renameFolder(old, new)`: rewrites the folder entry and every file
    /// entry whose path starts with `old/`, in one pass under the write lock.
    pub async fn rename_folder(&self, old: &str, new: &str) {
        let old_prefix = normalize_folder_path(old);
        let new_prefix = normalize_folder_path(new);

        let mut state = self.state.write().await;

        if let Some(folder) = state.folders.remove(&old_prefix) {
            state.folders.insert(new_prefix.clone(), folder);
        }

        let renamed: Vec<(String, FileSyncState)> = state
            .files
            .iter()
            .filter(|(path, _)| path.starts_with(&old_prefix))
            .map(|(path, entry)| {
                let new_path = format!("{}{}", new_prefix, &path[old_prefix.len()..]);
                (new_path, entry.clone())
            })
            .collect();

        state.files.retain(|path, _| !path.starts_with(&old_prefix));
        for (path, entry) in renamed {
            state.files.insert(path, entry);
        }
    }

    pub async fn upsert_folder(&self, path: &str, state_update: FolderSyncState) {
        let folder_path = normalize_folder_path(path);
        self.state.write().await.folders.insert(folder_path, state_update);
    }

    /// `shouldDownload` (§4.1): the fallback decision for paths without a
    /// valid `lastSyncRevisionId`, per the `RevisionRef::Unknown` rule in
    /// §9 (unknown is conservatively treated as "remote changed").
    pub async fn should_download(
        &self,
        path: &str,
        remote_mtime: i64,
        local_exists: bool,
        local_mtime: i64,
        local_hash: &str,
    ) -> DownloadDecision {
        let state = self.state.read().await;
        let entry = match state.files.get(path) {
            None => return DownloadDecision::Download,
            Some(entry) => entry,
        };

        if !local_exists {
            return DownloadDecision::Download;
        }

        let local_changed = local_hash != entry.last_synced_hash;
        let remote_changed = remote_mtime > entry.last_synced_time;

        match (local_changed, remote_changed) {
            (false, false) => DownloadDecision::Skip,
            (false, true) => DownloadDecision::Download,
            (true, false) => DownloadDecision::Skip,
            (true, true) => DownloadDecision::Conflict,
        }
    }

    /// Snapshot of the whole state, e.g. for the three-way delta pass.
    pub async fn get_state(&self) -> VaultSyncState {
        self.state.read().await.clone()
    }

    pub async fn set_state(&self, state: VaultSyncState) {
        *self.state.write().await = state;
    }

    pub async fn file_state(&self, path: &str) -> Option<FileSyncState> {
        self.state.read().await.files.get(path).cloned()
    }

    pub async fn set_change_page_token(&self, token: Option<String>) {
        self.state.write().await.change_page_token = token;
    }

    pub async fn change_page_token(&self) -> Option<String> {
        self.state.read().await.change_page_token.clone()
    }

    pub async fn mark_pass_complete(&self) {
        let now = now_ms();
        let mut state = self.state.write().await;
        state.last_full_sync = now;
        state.last_remote_check = now;
    }

    pub async fn to_json(&self) -> Result<String> {
        let state = self.state.read().await.clone();
        Ok(serde_json::to_string_pretty(&state)?)
    }
}

/// Normalizes a folder path to always end in exactly one trailing `/`,
/// per §9's note that the rename cascade requires it.
pub fn normalize_folder_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let trimmed = path.trim_end_matches('/');
    format!("{}/", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn needs_sync_is_true_for_unknown_path() {
        let index = SyncIndex::load(PathBuf::from("/tmp/does-not-exist-index.json"), "vault-1").await;
        assert!(index.needs_sync("notes/a.md", "abc123", 0, 1).await);
    }

    #[tokio::test]
    async fn mark_synced_clears_error_and_bumps_count() {
        let index = SyncIndex::load(PathBuf::from("/tmp/does-not-exist-index-2.json"), "vault-1").await;
        index
            .mark_sync_error("notes/a.md", "boom", OperationType::Upload)
            .await;
        index
            .mark_synced(
                "notes/a.md",
                "abc123",
                1000,
                3,
                Some("remote-1".to_string()),
                OperationType::Upload,
                Some("rev-1".to_string()),
            )
            .await;

        let entry = index.file_state("notes/a.md").await.unwrap();
        assert_eq!(entry.sync_count, 1);
        assert!(entry.last_error.is_none());
        assert_eq!(entry.history.len(), 2);
        assert!(entry.history.front().unwrap().success);
    }

    #[tokio::test]
    async fn rename_folder_cascades_child_paths() {
        let index = SyncIndex::load(PathBuf::from("/tmp/does-not-exist-index-3.json"), "vault-1").await;
        index
            .mark_synced(
                "old/child.md",
                "hash",
                1,
                1,
                None,
                OperationType::Upload,
                None,
            )
            .await;
        index.rename_folder("old", "new").await;

        assert!(index.file_state("old/child.md").await.is_none());
        assert!(index.file_state("new/child.md").await.is_some());
    }

    #[tokio::test]
    async fn history_is_bounded_to_five_entries() {
        let index = SyncIndex::load(PathBuf::from("/tmp/does-not-exist-index-4.json"), "vault-1").await;
        for i in 0..8 {
            index
                .mark_synced(
                    "notes/a.md",
                    &format!("hash-{}", i),
                    i,
                    1,
                    None,
                    OperationType::Upload,
                    None,
                )
                .await;
        }
        let entry = index.file_state("notes/a.md").await.unwrap();
        assert_eq!(entry.history.len(), 5);
        assert_eq!(entry.sync_count, 8);
    }
}
