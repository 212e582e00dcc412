use std::path::Path;

use chrono::Utc;

/// Returns this device's label for conflicted-copy filenames: the OS
/// hostname, falling back to a prefix of `sync_agent_id` when the hostname
/// is unavailable (e.g. a sandboxed CI environment).
pub fn host_label(sync_agent_id: &str) -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| sync_agent_id.chars().take(8).collect())
}

/// Derives `<dir>/<stem> (conflicted copy <YYYY-MM-DD> from <hostLabel>).<ext>`
/// for a conflict on `path` (§4.5). If `path` has no extension, the trailing
/// `.ext` is omitted.
pub fn conflicted_copy_path(path: &str, host_label: &str) -> String {
    let date = Utc::now().format("%Y-%m-%d");
    let as_path = Path::new(path);

    let parent = as_path.parent().filter(|p| !p.as_os_str().is_empty());
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    let extension = as_path.extension().map(|e| e.to_string_lossy().to_string());

    let filename = match extension {
        Some(ext) => format!("{} (conflicted copy {} from {}).{}", stem, date, host_label, ext),
        None => format!("{} (conflicted copy {} from {})", stem, date, host_label),
    };

    match parent {
        Some(parent) => format!("{}/{}", parent.to_string_lossy(), filename),
        None => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicted_copy_preserves_directory_and_extension() {
        let path = conflicted_copy_path("notes/daily/a.md", "laptop");
        assert!(path.starts_with("notes/daily/a (conflicted copy "));
        assert!(path.ends_with(" from laptop).md"));
    }

    #[test]
    fn extensionless_file_omits_trailing_dot() {
        let path = conflicted_copy_path("notes/README", "laptop");
        assert!(!path.ends_with('.'));
        assert!(path.contains("README (conflicted copy "));
    }

    #[test]
    fn root_level_file_has_no_leading_slash() {
        let path = conflicted_copy_path("a.md", "laptop");
        assert!(!path.starts_with('/'));
    }
}
