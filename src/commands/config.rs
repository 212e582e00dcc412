use tauri::AppHandle;

use crate::config::{self, SyncConfig};
use crate::error::Result;

#[tauri::command(rename_all = "camelCase")]
pub async fn get_sync_config(app: AppHandle) -> Result<SyncConfig> {
    config::load(&app)
}

#[tauri::command(rename_all = "camelCase")]
pub async fn save_sync_config(app: AppHandle, config: SyncConfig) -> Result<()> {
    config::save(&app, &config)
}
