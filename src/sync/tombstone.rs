use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::Result;

use super::persist;

/// A durable record that a path was deleted locally; holds the remote
/// object's delete during a grace period so a still-offline peer cannot
/// resurrect it on its next sync (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub file_path: String,
    pub deleted_at: i64,
    pub deleted_by_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TombstoneMap(HashMap<String, Tombstone>);

/// Durable set of `{remoteFileId, path, deletedAt, deletedByAgent}` entries
/// with a configurable grace period, persisted at
/// `<pluginDir>/sync-tombstones.json`.
pub struct TombstoneStore {
    tombstones: RwLock<HashMap<String, Tombstone>>,
    path: PathBuf,
    write_lock: Mutex<()>,
    grace_period_ms: i64,
}

impl TombstoneStore {
    /// `gracePeriodDays` defaults to 30 per §4.2/§6 and is configurable at
    /// construction.
    pub async fn load(path: PathBuf, grace_period_days: i64) -> Self {
        let map: TombstoneMap = persist::read_json_or_default(&path).await;
        Self {
            tombstones: RwLock::new(map.0),
            path,
            write_lock: Mutex::new(()),
            grace_period_ms: grace_period_days * 24 * 60 * 60 * 1000,
        }
    }

    pub async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = TombstoneMap(self.tombstones.read().await.clone());
        persist::write_json_atomic(&self.path, &snapshot).await
    }

    /// A tombstone is created only for a file that had a `remoteFileId`,
    /// i.e. one that was actually synced at least once.
    pub async fn add(&self, file_id: &str, path: &str, agent_id: &str) {
        let tombstone = Tombstone {
            file_path: path.to_string(),
            deleted_at: chrono::Utc::now().timestamp_millis(),
            deleted_by_agent: agent_id.to_string(),
        };
        self.tombstones
            .write()
            .await
            .insert(file_id.to_string(), tombstone);
    }

    pub async fn has(&self, file_id: &str) -> bool {
        self.tombstones.read().await.contains_key(file_id)
    }

    pub async fn get_all(&self) -> Vec<(String, Tombstone)> {
        self.tombstones
            .read()
            .await
            .iter()
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect()
    }

    /// `getExpired() → Tombstone[]`: entries where `now − deletedAt > gracePeriod`.
    pub async fn get_expired(&self) -> Vec<(String, Tombstone)> {
        let now = chrono::Utc::now().timestamp_millis();
        self.tombstones
            .read()
            .await
            .iter()
            .filter(|(_, t)| now - t.deleted_at > self.grace_period_ms)
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect()
    }

    pub async fn remove(&self, file_id: &str) {
        self.tombstones.write().await.remove(file_id);
    }

    /// `cleanupExpired() → fileId[]`: removes every expired tombstone and
    /// returns the ids removed, for the caller to act on (§4.4 step 5
    /// permanently deletes the remote object for each before calling this).
    pub async fn cleanup_expired(&self) -> Vec<String> {
        let expired = self.get_expired().await;
        let mut removed = Vec::with_capacity(expired.len());
        let mut tombstones = self.tombstones.write().await;
        for (id, _) in expired {
            tombstones.remove(&id);
            removed.push(id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_tombstone_is_not_expired() {
        let store = TombstoneStore::load(PathBuf::from("/tmp/does-not-exist-tombstones.json"), 30).await;
        store.add("remote-1", "notes/a.md", "agent-1").await;

        assert!(store.has("remote-1").await);
        assert!(store.get_expired().await.is_empty());
    }

    #[tokio::test]
    async fn expired_tombstone_is_cleaned_up() {
        let store = TombstoneStore::load(PathBuf::from("/tmp/does-not-exist-tombstones-2.json"), 30).await;
        {
            let mut tombstones = store.tombstones.write().await;
            tombstones.insert(
                "remote-2".to_string(),
                Tombstone {
                    file_path: "notes/b.md".to_string(),
                    deleted_at: 0,
                    deleted_by_agent: "agent-1".to_string(),
                },
            );
        }

        let expired = store.get_expired().await;
        assert_eq!(expired.len(), 1);

        let removed = store.cleanup_expired().await;
        assert_eq!(removed, vec!["remote-2".to_string()]);
        assert!(!store.has("remote-2").await);
    }
}
