use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant};

use crate::error::Result;

use super::reconciler::Reconciler;

/// Mirrors spec §3's `FileEvent`. A rename surfaces as `Created` with
/// `old_path` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: String,
    pub kind: FileEventKind,
    pub is_folder: bool,
    pub old_path: Option<String>,
    pub timestamp: i64,
}

/// Tunables for the pipeline's debounce/catch-up behavior (§4.3, §6).
#[derive(Debug, Clone)]
pub struct ChangePipelineConfig {
    pub debounce: Duration,
    pub periodic_interval: Duration,
    pub initial_settle: Duration,
}

impl Default for ChangePipelineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
            periodic_interval: Duration::from_secs(30),
            initial_settle: Duration::from_secs(2),
        }
    }
}

/// Bridges the filesystem watcher to the `Reconciler` without thrash (§4.3).
///
/// Re-architected per §9 from an observer-callback design into a single
/// event-loop task: a `tokio::select!` wakes on the earliest of (new event,
/// debounce deadline, periodic tick, shutdown), matching the "monotonic
/// deadline reset on every event" guidance.
pub struct ChangePipeline {
    reconciler: Arc<Reconciler>,
    config: ChangePipelineConfig,
    events: mpsc::Receiver<FileEvent>,
    shutdown: mpsc::Receiver<()>,
}

impl ChangePipeline {
    pub fn new(
        reconciler: Arc<Reconciler>,
        config: ChangePipelineConfig,
        events: mpsc::Receiver<FileEvent>,
        shutdown: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            reconciler,
            config,
            events,
            shutdown,
        }
    }

    /// Drives the event loop until shutdown is signaled. Call once, on a
    /// spawned task.
    pub async fn run(mut self) {
        sleep(self.config.initial_settle).await;
        if let Err(e) = self.reconciler.sync().await {
            log::error!("initial sync pass failed: {}", e);
        }

        let mut pending: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut debounce_deadline: Option<Instant> = None;
        let mut periodic = interval(self.config.periodic_interval);
        periodic.tick().await; // first tick fires immediately; consume it

        loop {
            let debounce_sleep = async {
                match debounce_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = self.shutdown.recv() => {
                    log::info!("change pipeline shutting down");
                    break;
                }
                _ = periodic.tick() => {
                    if !pending.is_empty() {
                        self.drain_and_sync(&mut pending).await;
                        debounce_deadline = None;
                    }
                }
                _ = debounce_sleep => {
                    if !pending.is_empty() {
                        self.drain_and_sync(&mut pending).await;
                    }
                    debounce_deadline = None;
                }
                event = self.events.recv() => {
                    match event {
                        None => break,
                        Some(event) => {
                            self.handle_event(event, &mut pending).await;
                            debounce_deadline = Some(Instant::now() + self.config.debounce);
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(&self, event: FileEvent, pending: &mut std::collections::HashSet<String>) {
        if let Some(old_path) = &event.old_path {
            // Renames dispatch immediately and must never be coalesced with
            // content edits: ordering decides whether the old remote object
            // is tombstoned (§4.3).
            if let Err(e) = self
                .reconciler
                .handle_file_rename(old_path, &event.path)
                .await
            {
                log::error!("rename handling failed for {} -> {}: {}", old_path, event.path, e);
            }
            return;
        }

        if event.is_folder {
            let result = match event.kind {
                FileEventKind::Created => self.reconciler.handle_folder_creation(&event.path).await,
                FileEventKind::Deleted => self.reconciler.handle_folder_deletion(&event.path).await,
                FileEventKind::Modified => Ok(()),
            };
            if let Err(e) = result {
                log::error!("folder event handling failed for {}: {}", event.path, e);
            }
            return;
        }

        pending.insert(event.path);
    }

    async fn drain_and_sync(&self, pending: &mut std::collections::HashSet<String>) {
        pending.clear();
        if let Err(e) = self.reconciler.sync().await {
            log::error!("sync pass failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::index::SyncIndex;
    use crate::sync::remote::{ChangeEntry, RemoteFile, RemoteStore, UploadResult};
    use crate::sync::tombstone::TombstoneStore;
    use crate::sync::vault::{FileMetadata, ScanFilters, VaultAdapter};
    use async_trait::async_trait;
    use std::collections::HashMap as Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// A `RemoteStore` double that counts how many times `list_files` (i.e.
    /// a reconciliation pass) actually ran, without otherwise doing anything.
    struct CountingRemote {
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for CountingRemote {
        async fn list_files(&self, _vault_id: &str) -> Result<Vec<RemoteFile>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        async fn upload_file(
            &self,
            _path: &str,
            _bytes: Vec<u8>,
            _mime: &str,
            _app_properties: Map<String, String>,
        ) -> Result<UploadResult> {
            Ok(UploadResult { id: "id".to_string(), head_revision_id: "rev".to_string() })
        }
        async fn download_file(&self, _id: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn delete_file(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn get_file_metadata(&self, _id: &str) -> Result<RemoteFile> {
            Err(crate::error::AppError::NotFound("n/a".to_string()))
        }
        async fn get_changes(&self, _token: &str) -> Result<(Vec<ChangeEntry>, Option<String>)> {
            Ok((Vec::new(), None))
        }
    }

    struct EmptyVault;

    #[async_trait]
    impl VaultAdapter for EmptyVault {
        async fn scan_tree(&self, _filters: &ScanFilters) -> Result<Vec<FileMetadata>> {
            Ok(Vec::new())
        }
        async fn read_file(&self, _path: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn write_file(&self, _path: &str, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn create_folder(&self, _path: &str) -> Result<()> {
            Ok(())
        }
        async fn trash_file(&self, _path: &str) -> Result<()> {
            Ok(())
        }
        async fn exists(&self, _path: &str) -> Result<bool> {
            Ok(false)
        }
        async fn stat(&self, _path: &str) -> Result<Option<FileMetadata>> {
            Ok(None)
        }
    }

    async fn build_test_reconciler() -> (Arc<Reconciler>, Arc<CountingRemote>) {
        let index = Arc::new(
            SyncIndex::load(
                std::env::temp_dir().join(format!("pipeline-idx-{}.json", uuid::Uuid::new_v4())),
                "vault-1",
            )
            .await,
        );
        let tombstones = Arc::new(
            TombstoneStore::load(
                std::env::temp_dir().join(format!("pipeline-tomb-{}.json", uuid::Uuid::new_v4())),
                30,
            )
            .await,
        );
        let remote = Arc::new(CountingRemote { list_calls: AtomicUsize::new(0) });
        let reconciler = Arc::new(Reconciler::new(
            index,
            tombstones,
            remote.clone(),
            Arc::new(EmptyVault),
            "agent-a".to_string(),
            "vault-1".to_string(),
            ScanFilters::default(),
            None,
        ));
        (reconciler, remote)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_events_within_debounce_window_coalesce_into_one_sync_pass() {
        let (reconciler, remote) = build_test_reconciler().await;
        let (events_tx, events_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let config = ChangePipelineConfig {
            debounce: Duration::from_millis(100),
            periodic_interval: Duration::from_secs(3600),
            initial_settle: Duration::from_millis(1),
        };
        let pipeline = ChangePipeline::new(reconciler, config, events_rx, shutdown_rx);
        let handle = tokio::spawn(pipeline.run());

        tokio::time::advance(Duration::from_millis(5)).await; // past initial settle
        tokio::task::yield_now().await;
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1, "initial sync should have run");

        for i in 0..5 {
            events_tx
                .send(FileEvent {
                    path: format!("notes/{}.md", i),
                    kind: FileEventKind::Modified,
                    is_folder: false,
                    old_path: None,
                    timestamp: 0,
                })
                .await
                .unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        // Still inside the 100ms debounce window reset by the last event.
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(110)).await;
        tokio::task::yield_now().await;
        assert_eq!(
            remote.list_calls.load(Ordering::SeqCst),
            2,
            "five coalesced events should trigger exactly one more pass"
        );

        handle.abort();
    }
}

/// Spawns a `notify` watcher over `root` and forwards raw filesystem events
/// as `FileEvent`s on the returned channel. The watcher guard must be kept
/// alive for as long as events are wanted.
pub fn spawn_watcher(root: PathBuf) -> Result<(RecommendedWatcher, mpsc::Receiver<FileEvent>)> {
    let (tx, rx) = mpsc::channel(256);
    let root_for_closure = root.clone();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else { return };
        for file_event in translate_event(&root_for_closure, &event) {
            let _ = tx.blocking_send(file_event);
        }
    })?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    Ok((watcher, rx))
}

fn translate_event(root: &Path, event: &Event) -> Vec<FileEvent> {
    let now = chrono::Utc::now().timestamp_millis();
    let to_relative = |p: &Path| -> String {
        p.strip_prefix(root)
            .unwrap_or(p)
            .to_string_lossy()
            .replace('\\', "/")
    };

    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| FileEvent {
                path: to_relative(p),
                kind: FileEventKind::Created,
                is_folder: p.is_dir(),
                old_path: None,
                timestamp: now,
            })
            .collect(),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) if event.paths.len() == 2 => {
            vec![FileEvent {
                path: to_relative(&event.paths[1]),
                kind: FileEventKind::Created,
                is_folder: event.paths[1].is_dir(),
                old_path: Some(to_relative(&event.paths[0])),
                timestamp: now,
            }]
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| p.is_file())
            .map(|p| FileEvent {
                path: to_relative(p),
                kind: FileEventKind::Modified,
                is_folder: false,
                old_path: None,
                timestamp: now,
            })
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| FileEvent {
                path: to_relative(p),
                kind: FileEventKind::Deleted,
                is_folder: false,
                old_path: None,
                timestamp: now,
            })
            .collect(),
        _ => Vec::new(),
    }
}
