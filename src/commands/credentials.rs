use tauri::State;

use crate::credentials::{Account, CredentialsManager};
use crate::error::Result;
use crate::provider::ProviderType;
use crate::sync::remote::s3_store::S3RemoteStore;
use crate::sync::remote::RemoteStore;

#[tauri::command(rename_all = "camelCase")]
pub async fn add_account(
    credentials: State<'_, CredentialsManager>,
    name: String,
    endpoint: String,
    access_key_id: String,
    secret_access_key: String,
    provider_type: ProviderType,
    region: Option<String>,
) -> Result<Account> {
    credentials.add_account(
        name,
        endpoint,
        access_key_id,
        secret_access_key,
        provider_type,
        region,
    )
}

#[tauri::command]
pub async fn list_accounts(credentials: State<'_, CredentialsManager>) -> Result<Vec<Account>> {
    credentials.list_accounts()
}

#[tauri::command]
pub async fn get_account(credentials: State<'_, CredentialsManager>, id: String) -> Result<Account> {
    credentials.get_account(&id)
}

#[tauri::command]
pub async fn remove_account(credentials: State<'_, CredentialsManager>, id: String) -> Result<()> {
    credentials.remove_account(&id)
}

/// Connects once with the stored credentials and lists the bucket, so a
/// misconfigured endpoint or a rejected key surfaces before a vault is wired
/// up to it.
#[tauri::command(rename_all = "camelCase")]
pub async fn test_connection(
    credentials: State<'_, CredentialsManager>,
    id: String,
    bucket: String,
) -> Result<bool> {
    let account = credentials.get_account(&id)?;
    let secret = credentials.get_secret_key(&id)?;

    let store = S3RemoteStore::connect(
        &account.endpoint,
        &account.access_key_id,
        &secret,
        account.provider_type,
        account.region.as_deref(),
        bucket,
        String::new(),
    )
    .await?;

    store.list_files("connection-test").await?;
    Ok(true)
}
