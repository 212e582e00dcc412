use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Write `value` to `path` atomically: serialize, write to a temp file in the
/// same directory, then rename over the destination. A crash mid-write never
/// leaves a half-written `path` on disk.
pub async fn write_json_atomic<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let tmp_name = format!(".{}.{}.tmp", path.file_name().unwrap_or_default().to_string_lossy(), Uuid::new_v4());
    let tmp_path = parent.join(tmp_name);

    tokio::fs::write(&tmp_path, &json).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    Ok(())
}

/// Load `path` as JSON, yielding `None` on a missing file. A malformed file
/// is logged and treated the same as missing, so the index is rebuilt fresh
/// rather than blocking startup on a corrupt blob.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{} is malformed ({}), starting from an empty state", path.display(), e);
                T::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            log::warn!("failed to read {}: {}, starting from an empty state", path.display(), e);
            T::default()
        }
    }
}
