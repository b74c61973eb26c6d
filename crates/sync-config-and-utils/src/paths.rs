//! File system paths used by the sync runtime.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Resolves every on-disk location under one base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.gallery-sync)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a Paths instance rooted at `~/.gallery-sync`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".gallery-sync"),
        })
    }

    /// Create a Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Config file (~/.gallery-sync/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Extension-local key/value store (~/.gallery-sync/local-storage.json).
    pub fn local_store_file(&self) -> PathBuf {
        self.base_dir.join("local-storage.json")
    }

    /// Persisted web-application cookies (~/.gallery-sync/cookies.txt).
    pub fn cookie_file(&self) -> PathBuf {
        self.base_dir.join("cookies.txt")
    }

    /// Logs directory (~/.gallery-sync/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Central JSONL log file (~/.gallery-sync/logs/dev.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_are_under_base_dir() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/gallery"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/gallery/config.json"));
        assert_eq!(
            paths.local_store_file(),
            PathBuf::from("/tmp/gallery/local-storage.json")
        );
        assert_eq!(paths.cookie_file(), PathBuf::from("/tmp/gallery/cookies.txt"));
        assert_eq!(paths.log_file(), PathBuf::from("/tmp/gallery/logs/dev.jsonl"));
    }

    #[test]
    fn test_ensure_dirs_creates_logs_dir() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.logs_dir().is_dir());
    }
}
