//! Executable lookup.

use std::path::{Path, PathBuf};

/// Resolve the VPN client executable.
///
/// The search order is:
/// 1. Explicit paths (absolute or containing a separator) must point at a file.
/// 2. Bare names are looked up on the current PATH via `which`.
pub async fn resolve_executable_path(executable: &Path) -> Option<PathBuf> {
    if executable.as_os_str().is_empty() {
        return None;
    }

    if is_explicit(executable) {
        return tokio::fs::metadata(executable)
            .await
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map(|_| executable.to_path_buf());
    }

    which_async(executable).await
}

fn is_explicit(path: &Path) -> bool {
    path.is_absolute() || path.components().count() > 1
}

async fn which_async(executable: &Path) -> Option<PathBuf> {
    let executable = executable.to_path_buf();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("openvpn");
        assert_eq!(resolve_executable_path(&binary).await, None);

        std::fs::write(&binary, b"").unwrap();
        assert_eq!(resolve_executable_path(&binary).await, Some(binary));
    }

    #[tokio::test]
    async fn test_directory_is_not_an_executable() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_executable_path(dir.path()).await, None);
    }

    #[tokio::test]
    async fn test_empty_and_unknown_names() {
        assert_eq!(resolve_executable_path(Path::new("")).await, None);
        assert_eq!(
            resolve_executable_path(Path::new("definitely-not-a-real-binary-4f1c")).await,
            None
        );
    }
}
