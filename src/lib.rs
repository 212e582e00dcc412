mod commands;
mod config;
mod credentials;
mod db;
mod error;
pub mod provider;
mod session;
mod sync;

use credentials::CredentialsManager;
use db::DbManager;
use session::SessionState;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let db_manager = DbManager::new().expect("Failed to initialize database");

    tauri::Builder::default()
        .plugin(tauri_plugin_store::Builder::new().build())
        .plugin(tauri_plugin_fs::init())
        .manage(CredentialsManager::new())
        .manage(db_manager)
        .manage(SessionState::default())
        .invoke_handler(tauri::generate_handler![
            // Account/credential commands
            commands::credentials::add_account,
            commands::credentials::list_accounts,
            commands::credentials::get_account,
            commands::credentials::remove_account,
            commands::credentials::test_connection,
            // Sync engine commands
            commands::sync::connect_vault,
            commands::sync::disconnect_vault,
            commands::sync::vault_status,
            commands::sync::sync_now,
            commands::sync::force_upload_all,
            commands::sync::reconcile_index,
            // Settings commands
            commands::config::get_sync_config,
            commands::config::save_sync_config,
            // Operation/session history commands
            commands::history::get_operations,
            commands::history::get_sync_sessions,
            commands::history::cleanup_history,
        ])
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
