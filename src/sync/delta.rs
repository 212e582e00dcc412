use std::collections::HashMap;

use super::index::FileSyncState;
use super::remote::RemoteFile;

/// A snapshot of one path's candidate-local state, as fed into `compute`.
/// `current_hash` is `None` when the local file no longer exists.
#[derive(Debug, Clone)]
pub struct LocalCandidate {
    pub state: FileSyncState,
    pub exists: bool,
    pub current_hash: Option<String>,
}

/// Why a path was classified the way it was. Purely informational, used
/// for logging and the per-file history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaReason {
    MissingLocal,
    LocalNewer,
    RemoteNewer,
    NeverSynced,
    MissingRemote,
}

#[derive(Debug, Clone)]
pub struct DownloadAction {
    pub path: String,
    pub remote: RemoteFile,
    pub reason: DeltaReason,
}

#[derive(Debug, Clone)]
pub struct UploadAction {
    pub path: String,
    pub reason: DeltaReason,
}

#[derive(Debug, Clone)]
pub struct ConflictAction {
    pub path: String,
    pub remote: RemoteFile,
}

/// The tuple `{downloads, uploads, conflicts, in-sync}` produced by one pass
/// (GLOSSARY: "Delta").
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub downloads: Vec<DownloadAction>,
    pub uploads: Vec<UploadAction>,
    pub conflicts: Vec<ConflictAction>,
    pub in_sync: Vec<String>,
}

/// Computes the three-way delta between the candidate local index `local`
/// and the remote listing `remote` (§4.6).
///
/// `headRevisionId` is preferred over `modifiedTime` for remote-change
/// detection (§4.6 rationale, §9): server and client clocks disagree but
/// revision ids are monotonic per object.
pub fn compute(
    local: &HashMap<String, LocalCandidate>,
    remote: &[RemoteFile],
    sync_agent_id: &str,
) -> Delta {
    let mut delta = Delta::default();
    let mut matched_paths: std::collections::HashSet<&str> = std::collections::HashSet::new();

    for r in remote {
        matched_paths.insert(r.path.as_str());

        if r.last_modified_by_agent() == Some(sync_agent_id) {
            delta.in_sync.push(r.path.clone());
            continue;
        }

        let Some(candidate) = local.get(&r.path) else {
            delta.downloads.push(DownloadAction {
                path: r.path.clone(),
                remote: r.clone(),
                reason: DeltaReason::MissingLocal,
            });
            continue;
        };

        let local_changed = match (&candidate.current_hash, candidate.exists) {
            (Some(hash), true) => *hash != candidate.state.last_synced_hash,
            _ => false,
        };
        let remote_changed = match &candidate.state.last_sync_revision_id {
            Some(known) => *known != r.head_revision_id,
            None => true,
        };

        match (local_changed, remote_changed) {
            (false, false) => delta.in_sync.push(r.path.clone()),
            (true, false) => delta.uploads.push(UploadAction {
                path: r.path.clone(),
                reason: DeltaReason::LocalNewer,
            }),
            (false, true) => delta.downloads.push(DownloadAction {
                path: r.path.clone(),
                remote: r.clone(),
                reason: DeltaReason::RemoteNewer,
            }),
            (true, true) => delta.conflicts.push(ConflictAction {
                path: r.path.clone(),
                remote: r.clone(),
            }),
        }
    }

    for (path, candidate) in local {
        if matched_paths.contains(path.as_str()) {
            continue;
        }
        if candidate.state.is_remote_only_placeholder() {
            continue;
        }
        if !candidate.exists {
            // Local deletion: the tombstone path owns this, not the delta.
            continue;
        }
        if candidate.state.remote_file_id.is_none() {
            delta.uploads.push(UploadAction {
                path: path.clone(),
                reason: DeltaReason::NeverSynced,
            });
        } else {
            // Remote deletion is never assumed; push back instead.
            delta.uploads.push(UploadAction {
                path: path.clone(),
                reason: DeltaReason::MissingRemote,
            });
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn remote(path: &str, revision: &str, agent: Option<&str>) -> RemoteFile {
        let mut app_properties = Map::new();
        if let Some(agent) = agent {
            app_properties.insert("lastModifiedByAgent".to_string(), agent.to_string());
        }
        RemoteFile {
            id: format!("id-{}", path),
            path: path.to_string(),
            mime_type: "text/markdown".to_string(),
            size: 1,
            modified_time: 0,
            head_revision_id: revision.to_string(),
            app_properties,
        }
    }

    fn synced_state(hash: &str, revision: &str) -> FileSyncState {
        FileSyncState {
            last_synced_hash: hash.to_string(),
            last_synced_time: 1,
            last_synced_size: 1,
            last_sync_revision_id: Some(revision.to_string()),
            remote_file_id: Some("remote-1".to_string()),
            first_synced_time: 1,
            sync_count: 1,
            last_error: None,
            conflict_count: 0,
            history: Default::default(),
        }
    }

    #[test]
    fn own_echo_is_in_sync_and_skipped() {
        let remote_files = vec![remote("notes/a.md", "rev-2", Some("agent-self"))];
        let local = Map::new();

        let delta = compute(&local, &remote_files, "agent-self");

        assert_eq!(delta.in_sync, vec!["notes/a.md".to_string()]);
        assert!(delta.downloads.is_empty());
    }

    #[test]
    fn missing_local_is_download() {
        let remote_files = vec![remote("notes/new.md", "rev-1", None)];
        let local = Map::new();

        let delta = compute(&local, &remote_files, "agent-self");

        assert_eq!(delta.downloads.len(), 1);
        assert_eq!(delta.downloads[0].reason, DeltaReason::MissingLocal);
    }

    #[test]
    fn both_changed_is_conflict() {
        let remote_files = vec![remote("notes/a.md", "rev-2", None)];
        let mut local = Map::new();
        local.insert(
            "notes/a.md".to_string(),
            LocalCandidate {
                state: synced_state("hash-1", "rev-1"),
                exists: true,
                current_hash: Some("hash-2".to_string()),
            },
        );

        let delta = compute(&local, &remote_files, "agent-self");

        assert_eq!(delta.conflicts.len(), 1);
        assert!(delta.uploads.is_empty());
        assert!(delta.downloads.is_empty());
    }

    #[test]
    fn unchanged_both_sides_is_in_sync() {
        let remote_files = vec![remote("notes/a.md", "rev-1", None)];
        let mut local = Map::new();
        local.insert(
            "notes/a.md".to_string(),
            LocalCandidate {
                state: synced_state("hash-1", "rev-1"),
                exists: true,
                current_hash: Some("hash-1".to_string()),
            },
        );

        let delta = compute(&local, &remote_files, "agent-self");

        assert_eq!(delta.in_sync, vec!["notes/a.md".to_string()]);
    }

    #[test]
    fn never_synced_local_only_file_is_uploaded() {
        let mut local = Map::new();
        local.insert(
            "notes/new.md".to_string(),
            LocalCandidate {
                state: FileSyncState {
                    last_synced_hash: String::new(),
                    last_synced_time: 0,
                    last_synced_size: 0,
                    last_sync_revision_id: None,
                    remote_file_id: None,
                    first_synced_time: 1,
                    sync_count: 0,
                    last_error: None,
                    conflict_count: 0,
                    history: Default::default(),
                },
                exists: true,
                current_hash: Some("hash-1".to_string()),
            },
        );

        let delta = compute(&local, &[], "agent-self");

        assert_eq!(delta.uploads.len(), 1);
        assert_eq!(delta.uploads[0].reason, DeltaReason::NeverSynced);
    }
}
