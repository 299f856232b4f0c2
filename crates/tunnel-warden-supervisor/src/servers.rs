//! Tunnel configuration discovery.

use std::{io::ErrorKind, path::Path};

use crate::config::CONFIG_EXTENSION;

/// List configuration file names in `dir`, sorted.
///
/// A missing directory yields an empty list.
pub async fn list_servers(dir: &Path) -> Vec<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "Config directory does not exist");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(dir = %dir.display(), "Failed to read config directory: {e}");
            return Vec::new();
        }
    };

    let suffix = format!(".{CONFIG_EXTENSION}");
    let mut servers = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(&suffix) {
                    servers.push(name);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Stopped reading config directory: {e}");
                break;
            }
        }
    }
    servers.sort();
    servers
}
