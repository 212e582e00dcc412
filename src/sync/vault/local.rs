use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, Result};

use super::{FileMetadata, ScanFilters, VaultAdapter};

/// A vault backed by a real directory tree on disk.
pub struct LocalVaultAdapter {
    root: PathBuf,
}

impl LocalVaultAdapter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn metadata_from_path(root: &Path, path: &Path) -> Result<FileMetadata> {
        let metadata = std::fs::metadata(path)?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let mtime = to_millis(metadata.modified().ok());
        let ctime = to_millis(metadata.created().ok().or(metadata.modified().ok()));
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        Ok(FileMetadata {
            path: relative,
            mtime,
            ctime,
            size: metadata.len(),
            is_folder: metadata.is_dir(),
            extension,
        })
    }

    fn should_skip(entry_path: &Path, filters: &ScanFilters) -> bool {
        let name = entry_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if name.starts_with('.') {
            return true;
        }

        for excluded in &filters.exclude_paths {
            if entry_path.to_string_lossy().contains(excluded.as_str()) {
                return true;
            }
        }

        false
    }
}

fn to_millis(time: Option<std::time::SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl VaultAdapter for LocalVaultAdapter {
    async fn scan_tree(&self, filters: &ScanFilters) -> Result<Vec<FileMetadata>> {
        let root = self.root.clone();
        let filters = filters.clone();

        tokio::task::spawn_blocking(move || scan_dir_recursive(&root, &root, &filters))
            .await
            .map_err(|e| AppError::Storage(format!("scan task panicked: {}", e)))?
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(path);
        Ok(tokio::fs::read(&full_path).await?)
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, bytes).await?;
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let full_path = self.resolve(path);
        tokio::fs::create_dir_all(&full_path).await?;
        Ok(())
    }

    /// Moves the file to the OS trash, not a permanent delete (§4.4 step 5).
    async fn trash_file(&self, path: &str) -> Result<()> {
        let full_path = self.resolve(path);
        tokio::task::spawn_blocking(move || trash::delete(&full_path))
            .await
            .map_err(|e| AppError::Storage(format!("trash task panicked: {}", e)))?
            .map_err(|e| AppError::Storage(format!("failed to move file to trash: {}", e)))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMetadata>> {
        let full_path = self.resolve(path);
        let root = self.root.clone();
        match tokio::fs::metadata(&full_path).await {
            Ok(_) => Ok(Some(Self::metadata_from_path(&root, &full_path)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn scan_tree_finds_whitelisted_extensions_and_skips_dotfiles() {
        let dir = TempDir::new().unwrap();
        let adapter = LocalVaultAdapter::new(dir.path().to_path_buf());

        adapter.write_file("notes/a.md", b"hello").await.unwrap();
        adapter.write_file(".hidden.md", b"nope").await.unwrap();
        adapter.write_file("notes/ignored.bin", b"nope").await.unwrap();

        let scanned = adapter.scan_tree(&ScanFilters::default()).await.unwrap();
        let paths: Vec<&str> = scanned.iter().map(|f| f.path.as_str()).collect();

        assert!(paths.contains(&"notes/a.md"));
        assert!(!paths.iter().any(|p| p.starts_with('.')));
        assert!(!paths.contains(&"notes/ignored.bin"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips_bytes() {
        let dir = TempDir::new().unwrap();
        let adapter = LocalVaultAdapter::new(dir.path().to_path_buf());

        adapter.write_file("deep/nested/path.md", b"content").await.unwrap();
        let bytes = adapter.read_file("deep/nested/path.md").await.unwrap();

        assert_eq!(bytes, b"content");
    }

    #[tokio::test]
    async fn exists_reflects_trash_removal() {
        let dir = TempDir::new().unwrap();
        let adapter = LocalVaultAdapter::new(dir.path().to_path_buf());

        adapter.write_file("a.md", b"x").await.unwrap();
        assert!(adapter.exists("a.md").await.unwrap());

        adapter.trash_file("a.md").await.unwrap();
        assert!(!adapter.exists("a.md").await.unwrap());
    }
}

fn scan_dir_recursive(
    root: &Path,
    current: &Path,
    filters: &ScanFilters,
) -> Result<Vec<FileMetadata>> {
    let mut results = Vec::new();

    let entries = std::fs::read_dir(current)
        .map_err(|e| AppError::Storage(format!("failed to read directory '{}': {}", current.display(), e)))?;

    for entry in entries {
        let entry = entry.map_err(|e| AppError::Storage(format!("failed to read entry: {}", e)))?;
        let path = entry.path();

        if LocalVaultAdapter::should_skip(&path, filters) {
            continue;
        }

        if path.is_dir() {
            if filters.recursive {
                results.extend(scan_dir_recursive(root, &path, filters)?);
            }
            continue;
        }

        let extension = path.extension().map(|e| e.to_string_lossy().to_lowercase());
        let included = match &extension {
            Some(ext) => filters.include_extensions.iter().any(|allowed| allowed == ext),
            None => false,
        };
        if !included {
            continue;
        }

        results.push(LocalVaultAdapter::metadata_from_path(root, &path)?);
    }

    Ok(results)
}
