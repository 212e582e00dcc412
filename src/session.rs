use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::config::SyncConfig;
use crate::credentials::CredentialsManager;
use crate::db::DbManager;
use crate::error::{AppError, Result};
use crate::sync::pipeline::{spawn_watcher, ChangePipeline, ChangePipelineConfig};
use crate::sync::remote::s3_store::S3RemoteStore;
use crate::sync::vault::local::LocalVaultAdapter;
use crate::sync::{Reconciler, SyncIndex, TombstoneStore};

/// One connected vault: a local directory paired with a bucket/prefix on a
/// configured remote account, plus the background watcher driving it.
///
/// Only one vault is connected at a time. `SessionState` holds at most one
/// of these, matching the single-worker model in §5.
pub struct VaultSession {
    pub vault_id: String,
    pub reconciler: Arc<Reconciler>,
    _watcher: notify::RecommendedWatcher,
    shutdown_tx: mpsc::Sender<()>,
}

impl VaultSession {
    pub async fn connect(
        credentials: &CredentialsManager,
        account_id: &str,
        bucket: String,
        prefix: String,
        vault_path: PathBuf,
        config: &SyncConfig,
        db: DbManager,
    ) -> Result<Self> {
        let account = credentials.get_account(account_id)?;
        let secret = credentials.get_secret_key(account_id)?;

        let remote = S3RemoteStore::connect(
            &account.endpoint,
            &account.access_key_id,
            &secret,
            account.provider_type,
            account.region.as_deref(),
            bucket.clone(),
            prefix,
        )
        .await?;

        let vault_id = format!("{}/{}", account_id, bucket);
        let data_dir = vault_data_dir(&vault_id)?;
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| AppError::Storage(format!("failed to create vault data dir: {}", e)))?;

        let index = Arc::new(SyncIndex::load(data_dir.join("sync-index.json"), &vault_id).await);
        let tombstones = Arc::new(
            TombstoneStore::load(data_dir.join("sync-tombstones.json"), config.grace_period_days)
                .await,
        );
        let vault = Arc::new(LocalVaultAdapter::new(vault_path.clone()));

        let reconciler = Arc::new(Reconciler::new(
            index,
            tombstones,
            Arc::new(remote),
            vault,
            config.sync_agent_id.clone(),
            vault_id.clone(),
            config.scan_filters(),
            Some(db),
        ));

        let (watcher, events) = spawn_watcher(vault_path)?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let pipeline_config = ChangePipelineConfig {
            periodic_interval: Duration::from_secs(config.sync_interval),
            ..ChangePipelineConfig::default()
        };
        let pipeline = ChangePipeline::new(
            reconciler.clone(),
            pipeline_config,
            events,
            shutdown_rx,
        );
        tokio::spawn(pipeline.run());

        Ok(Self {
            vault_id,
            reconciler,
            _watcher: watcher,
            shutdown_tx,
        })
    }

    pub async fn disconnect(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

fn vault_data_dir(vault_id: &str) -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| AppError::Storage("could not determine data directory".to_string()))?;
    Ok(base.join("vaultsync").join("vaults").join(sanitize(vault_id)))
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Managed Tauri state holding the single active `VaultSession`, if any.
#[derive(Default)]
pub struct SessionState(pub Mutex<Option<VaultSession>>);
