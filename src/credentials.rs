use crate::error::{AppError, Result};
use crate::provider::ProviderType;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

const SERVICE_NAME: &str = "com.vaultsync.credentials";
const ACCOUNTS_KEY: &str = "accounts_metadata";

/// A configured remote-store account. The OAuth2 flow for non-S3-compatible
/// providers is out of scope here; this manager only ever stores the
/// access-key/secret pair an `S3RemoteStore` needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub provider_type: ProviderType,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AccountsMetadata {
    accounts: HashMap<String, AccountMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountMetadata {
    name: String,
    endpoint: String,
    access_key_id: String,
    #[serde(default)]
    provider_type: ProviderType,
    region: Option<String>,
}

/// Keyring-backed store of remote-store accounts, one secret access key per
/// account plus a JSON metadata blob listing the non-secret fields.
pub struct CredentialsManager {
    metadata_cache: RwLock<Option<AccountsMetadata>>,
}

impl CredentialsManager {
    pub fn new() -> Self {
        Self {
            metadata_cache: RwLock::new(None),
        }
    }

    fn get_metadata_entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, ACCOUNTS_KEY).map_err(|e| AppError::Credential(e.to_string()))
    }

    fn get_secret_entry(account_id: &str) -> Result<Entry> {
        let key = format!("secret_{}", account_id);
        Entry::new(SERVICE_NAME, &key).map_err(|e| AppError::Credential(e.to_string()))
    }

    fn load_metadata(&self) -> Result<AccountsMetadata> {
        if let Ok(cache) = self.metadata_cache.read() {
            if let Some(ref metadata) = *cache {
                return Ok(metadata.clone());
            }
        }

        let entry = Self::get_metadata_entry()?;
        let metadata = match entry.get_password() {
            Ok(json) => serde_json::from_str(&json)?,
            Err(keyring::Error::NoEntry) => AccountsMetadata::default(),
            Err(e) => return Err(AppError::Credential(e.to_string())),
        };

        if let Ok(mut cache) = self.metadata_cache.write() {
            *cache = Some(metadata.clone());
        }

        Ok(metadata)
    }

    fn save_metadata(&self, metadata: &AccountsMetadata) -> Result<()> {
        let entry = Self::get_metadata_entry()?;
        let json = serde_json::to_string(metadata)?;
        entry
            .set_password(&json)
            .map_err(|e| AppError::Credential(e.to_string()))?;

        if let Ok(mut cache) = self.metadata_cache.write() {
            *cache = Some(metadata.clone());
        }

        Ok(())
    }

    pub fn add_account(
        &self,
        name: String,
        endpoint: String,
        access_key_id: String,
        secret_access_key: String,
        provider_type: ProviderType,
        region: Option<String>,
    ) -> Result<Account> {
        let id = Uuid::new_v4().to_string();

        let secret_entry = Self::get_secret_entry(&id)?;
        secret_entry
            .set_password(&secret_access_key)
            .map_err(|e| AppError::Credential(e.to_string()))?;

        let mut metadata = self.load_metadata()?;
        metadata.accounts.insert(
            id.clone(),
            AccountMetadata {
                name: name.clone(),
                endpoint: endpoint.clone(),
                access_key_id: access_key_id.clone(),
                provider_type,
                region: region.clone(),
            },
        );
        self.save_metadata(&metadata)?;

        Ok(Account {
            id,
            name,
            endpoint,
            access_key_id,
            provider_type,
            region,
        })
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let metadata = self.load_metadata()?;
        Ok(metadata
            .accounts
            .into_iter()
            .map(|(id, meta)| Self::metadata_to_account(id, meta))
            .collect())
    }

    pub fn get_account(&self, id: &str) -> Result<Account> {
        let metadata = self.load_metadata()?;
        let meta = metadata
            .accounts
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("account not found: {}", id)))?;

        Ok(Self::metadata_to_account(id.to_string(), meta.clone()))
    }

    fn metadata_to_account(id: String, meta: AccountMetadata) -> Account {
        Account {
            id,
            name: meta.name,
            endpoint: meta.endpoint,
            access_key_id: meta.access_key_id,
            provider_type: meta.provider_type,
            region: meta.region,
        }
    }

    pub fn get_secret_key(&self, account_id: &str) -> Result<String> {
        let entry = Self::get_secret_entry(account_id)?;
        entry
            .get_password()
            .map_err(|e| AppError::Credential(format!("failed to get secret key: {}", e)))
    }

    pub fn remove_account(&self, id: &str) -> Result<()> {
        if let Ok(entry) = Self::get_secret_entry(id) {
            let _ = entry.delete_credential();
        }

        let mut metadata = self.load_metadata()?;
        metadata.accounts.remove(id);
        self.save_metadata(&metadata)?;

        Ok(())
    }
}

impl Default for CredentialsManager {
    fn default() -> Self {
        Self::new()
    }
}
