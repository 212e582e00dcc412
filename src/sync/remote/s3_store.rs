use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;

use crate::error::{AppError, Result};
use crate::provider::ProviderType;

use super::{ChangeEntry, RemoteFile, RemoteStore, UploadResult};

/// An S3-compatible `RemoteStore`: objects live at `<prefix>/<vaultRelativePath>`
/// in one bucket, `appProperties` are carried as S3 user metadata, and
/// `headRevisionId` is the object's ETag (monotonic per PUT, matching §4.6's
/// requirement that it changes on every content mutation).
pub struct S3RemoteStore {
    client: Arc<Client>,
    bucket: String,
    prefix: String,
}

impl S3RemoteStore {
    pub fn new(client: Arc<Client>, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub async fn connect(
        endpoint: &str,
        access_key_id: &str,
        secret_access_key: &str,
        provider_type: ProviderType,
        region: Option<&str>,
        bucket: String,
        prefix: String,
    ) -> Result<Self> {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "vaultsync",
        );

        let region = region
            .map(|r| r.to_string())
            .unwrap_or_else(|| provider_type.default_region().to_string());

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(provider_type.force_path_style())
            .build();

        Ok(Self::new(Arc::new(Client::from_conf(config)), bucket, prefix))
    }

    fn key_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn path_for(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            key.strip_prefix(&format!("{}/", self.prefix))
                .unwrap_or(key)
                .to_string()
        }
    }

    async fn remote_file_from_head(
        &self,
        key: &str,
        head: aws_sdk_s3::operation::head_object::HeadObjectOutput,
    ) -> RemoteFile {
        let app_properties: HashMap<String, String> = head.metadata().cloned().unwrap_or_default();

        RemoteFile {
            id: key.to_string(),
            path: self.path_for(key),
            mime_type: head
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            size: head.content_length().unwrap_or(0).max(0) as u64,
            modified_time: head
                .last_modified()
                .and_then(|d| d.secs().checked_mul(1000))
                .unwrap_or(0),
            head_revision_id: head
                .e_tag()
                .unwrap_or_default()
                .trim_matches('"')
                .to_string(),
            app_properties,
        }
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    async fn list_files(&self, _vault_id: &str) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !self.prefix.is_empty() {
                request = request.prefix(format!("{}/", self.prefix));
            }
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await?;

            for obj in response.contents() {
                let Some(key) = obj.key() else { continue };
                if key.ends_with('/') {
                    continue; // folder marker
                }

                let head = self
                    .client
                    .head_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await?;

                files.push(self.remote_file_from_head(key, head).await);
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(files)
    }

    async fn upload_file(
        &self,
        path: &str,
        bytes: Vec<u8>,
        mime: &str,
        app_properties: HashMap<String, String>,
    ) -> Result<UploadResult> {
        let key = self.key_for(path);

        let response = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(mime)
            .set_metadata(Some(app_properties))
            .body(bytes.into())
            .send()
            .await?;

        let head_revision_id = response
            .e_tag()
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();

        Ok(UploadResult {
            id: key,
            head_revision_id,
        })
    }

    async fn download_file(&self, id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Remote(format!("failed to read object body: {:?}", e)))?
            .into_bytes();

        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await?;
        Ok(())
    }

    async fn get_file_metadata(&self, id: &str) -> Result<RemoteFile> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await?;

        Ok(self.remote_file_from_head(id, head).await)
    }

    // S3-compatible stores expose no change feed; the reconciler falls back
    // to a full `list_files` pass every time (§4.7's documented fallback).
    async fn get_changes(&self, _token: &str) -> Result<(Vec<ChangeEntry>, Option<String>)> {
        Ok((Vec::new(), None))
    }
}
