pub mod local;

use async_trait::async_trait;

use crate::error::Result;

/// Filters applied to a `scanTree` pass: an extension whitelist plus
/// exclusions for dotfiles and the plugin's own data directory (§4.4 step 1).
#[derive(Debug, Clone)]
pub struct ScanFilters {
    pub include_extensions: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub recursive: bool,
}

impl Default for ScanFilters {
    fn default() -> Self {
        Self {
            include_extensions: vec![
                "md", "txt", "pdf", "png", "jpg", "jpeg", "gif", "svg",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            exclude_paths: Vec::new(),
            recursive: true,
        }
    }
}

/// One entry returned by `scanTree`.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: String,
    pub mtime: i64,
    pub ctime: i64,
    pub size: u64,
    pub is_folder: bool,
    pub extension: Option<String>,
}

/// External collaborator: all vault I/O passes through this interface so
/// the reconciler is storage-agnostic (§2, §6). The concrete implementation
/// in `local` reads/writes a real directory tree on disk; a test double can
/// substitute an in-memory tree without touching the reconciler.
#[async_trait]
pub trait VaultAdapter: Send + Sync {
    async fn scan_tree(&self, filters: &ScanFilters) -> Result<Vec<FileMetadata>>;
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn create_folder(&self, path: &str) -> Result<()>;
    async fn trash_file(&self, path: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn stat(&self, path: &str) -> Result<Option<FileMetadata>>;
}
