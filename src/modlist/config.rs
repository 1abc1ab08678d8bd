//! Persisted modlist configuration
//!
//! Loads fall back to defaults on a missing or corrupt file. Saves go to a
//! sibling temp file that is renamed over the target, so a crash mid-write
//! never leaves a truncated config behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::types::ModBatchConfig;

/// Default file name next to the executable or in the working directory
pub const CONFIG_FILE: &str = "modlist_config.json";

/// Atomic JSON store for a [`ModBatchConfig`]
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, or return defaults if missing or unreadable.
    ///
    /// A corrupt file is left untouched on disk.
    pub fn load(&self) -> ModBatchConfig {
        match self.try_load() {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("No config at {}, using defaults", self.path.display());
                ModBatchConfig::default()
            }
            Err(e) => {
                warn!("Could not load config: {:#}. Using defaults.", e);
                ModBatchConfig::default()
            }
        }
    }

    /// Load the config, failing on a corrupt file. `Ok(None)` when missing.
    pub fn try_load(&self) -> Result<Option<ModBatchConfig>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let config: ModBatchConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        Ok(Some(config))
    }

    /// Save atomically: write a sibling temp file, then rename over the target
    pub fn save(&self, config: &ModBatchConfig) -> Result<()> {
        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize modlist config")?;
        write_atomic(&self.path, content.as_bytes(), ".tmp_modlist_config_")
    }
}

/// Write `bytes` to `path` through a temp file in the same directory
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], prefix: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".json")
        .tempfile_in(&parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temp file for {}", path.display()))?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modlist::ModDescriptor;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join(CONFIG_FILE));

        let config = store.load();
        assert_eq!(config.modlist_name, "ASTRA");
        assert_eq!(config.starsector_version, "0.98a-RC8");
        assert!(config.mods.is_empty());
        // Defaults are not written back
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_file_gives_defaults_and_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::new(&path);
        assert_eq!(store.load(), ModBatchConfig::default());
        assert!(store.try_load().is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join(CONFIG_FILE));

        let mut config = ModBatchConfig::default();
        let mut lazy = ModDescriptor::new("LazyLib", "https://example.com/lazy.zip");
        lazy.mod_version = Some("2.8".to_string());
        config.mods.push(lazy);

        store.save(&config).unwrap();
        assert_eq!(store.load(), config);

        // No temp files left next to the config
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp_modlist_config_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "old").unwrap();

        let store = ConfigStore::new(&path);
        let config = ModBatchConfig {
            modlist_name: "New".to_string(),
            ..Default::default()
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().modlist_name, "New");
    }
}
