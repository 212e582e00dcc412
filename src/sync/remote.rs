pub mod s3_store;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A file as the remote store reports it. `headRevisionId` changes on every
/// content mutation and is the authoritative "did this change?" signal
/// (§4.6). `modifiedTime` is kept for display only, never for comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub path: String,
    pub mime_type: String,
    pub size: u64,
    pub modified_time: i64,
    pub head_revision_id: String,
    pub app_properties: HashMap<String, String>,
}

impl RemoteFile {
    pub fn last_modified_by_agent(&self) -> Option<&str> {
        self.app_properties.get("lastModifiedByAgent").map(|s| s.as_str())
    }
}

/// Result of an upload: the object id and its new revision id, which the
/// store must return so echo-suppression (§4.6) can work.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub id: String,
    pub head_revision_id: String,
}

/// One entry of an incremental change feed (§4.7).
#[derive(Debug, Clone)]
pub struct ChangeEntry {
    pub file_id: String,
    pub removed: bool,
    pub file: Option<RemoteFile>,
}

/// External collaborator: the authenticated HTTP API of the remote object
/// store. The OAuth2 flow and the concrete wire protocol are out of scope;
/// this is the contract the reconciler depends on, and the S3-compatible
/// implementation in `s3_store` is one concrete fulfiller of it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_files(&self, vault_id: &str) -> Result<Vec<RemoteFile>>;

    /// Every uploaded object must carry `appProperties.lastModifiedByAgent`
    /// set to the calling device's `syncAgentId`, and the store must
    /// preserve and echo it back in subsequent listings.
    async fn upload_file(
        &self,
        path: &str,
        bytes: Vec<u8>,
        mime: &str,
        app_properties: HashMap<String, String>,
    ) -> Result<UploadResult>;

    async fn download_file(&self, id: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, id: &str) -> Result<()>;

    async fn get_file_metadata(&self, id: &str) -> Result<RemoteFile>;

    /// Optional fast path (§4.7). The default implementation reports no
    /// page-token support, forcing the reconciler to fall back to a full
    /// `list_files` scan.
    async fn get_changes(&self, _token: &str) -> Result<(Vec<ChangeEntry>, Option<String>)> {
        Ok((Vec::new(), None))
    }

    /// Initializes an incremental polling cursor. The default returns
    /// `None`, which the reconciler treats as "do a full list this pass".
    async fn get_start_page_token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}
