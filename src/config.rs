use serde::{Deserialize, Serialize};
use tauri::AppHandle;
use tauri_plugin_store::StoreExt;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::sync::vault::ScanFilters;

const STORE_FILE: &str = "settings.json";
const CONFIG_KEY: &str = "syncConfig";

/// `conflictResolution` is superseded in practice by the always-on
/// conflicted-copy strategy (§4.5), kept as a configuration key per §6 for
/// forward compatibility with a future manual-resolution UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    Local,
    Remote,
    Manual,
}

/// The configuration keys named in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub sync_interval: u64,
    pub auto_sync: bool,
    pub conflict_resolution: ConflictResolution,
    pub sync_agent_id: String,
    pub grace_period_days: i64,
    pub extension_whitelist: Vec<String>,
}

impl SyncConfig {
    pub fn scan_filters(&self) -> ScanFilters {
        ScanFilters {
            include_extensions: self.extension_whitelist.clone(),
            exclude_paths: Vec::new(),
            recursive: true,
        }
    }

    fn clamp_sync_interval(&mut self) {
        self.sync_interval = self.sync_interval.clamp(10, 300);
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: 30,
            auto_sync: true,
            conflict_resolution: ConflictResolution::Manual,
            sync_agent_id: Uuid::new_v4().to_string(),
            grace_period_days: 30,
            extension_whitelist: ScanFilters::default().include_extensions,
        }
    }
}

/// Loads the persisted config, generating and persisting a fresh
/// `syncAgentId` on first run.
pub fn load(app: &AppHandle) -> Result<SyncConfig> {
    let store = app
        .store(STORE_FILE)
        .map_err(|e| AppError::Storage(format!("failed to open settings store: {}", e)))?;

    let config = match store.get(CONFIG_KEY) {
        Some(value) => serde_json::from_value(value)?,
        None => {
            let config = SyncConfig::default();
            save(app, &config)?;
            config
        }
    };

    Ok(config)
}

pub fn save(app: &AppHandle, config: &SyncConfig) -> Result<()> {
    let mut config = config.clone();
    config.clamp_sync_interval();

    let store = app
        .store(STORE_FILE)
        .map_err(|e| AppError::Storage(format!("failed to open settings store: {}", e)))?;

    store.set(CONFIG_KEY, serde_json::to_value(&config)?);
    store
        .save()
        .map_err(|e| AppError::Storage(format!("failed to persist settings: {}", e)))?;

    Ok(())
}
