//! Configuration loading for ttt-sim.

use anyhow::{Context, Result};
use std::path::Path;
use tictactoe_sync_client::ClientConfig;

/// Load the client configuration, or the defaults if no file is given.
pub fn load(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ClientConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_path_gives_defaults() {
        assert_eq!(load(None).unwrap(), ClientConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[broadcast]\nenabled = false\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert!(!config.broadcast.enabled);
        assert_eq!(config.retry.max_attempts, 8);
    }

    #[test]
    fn missing_file_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
