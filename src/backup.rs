//! Snapshots of `enabled_mods.json`
//!
//! Each backup is a directory `modlist_backups/backup_<timestamp>/` holding a
//! copy of the enabled-mods manifest (when one exists) and `backup_info.json`.
//! Creating a backup prunes the oldest ones beyond the retention count.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::modlist::config::write_atomic;
use crate::paths::{backups_dir, enabled_mods_path, mods_dir, ENABLED_MODS_FILE};

/// Metadata file inside each backup directory
pub const BACKUP_INFO_FILE: &str = "backup_info.json";

/// Optional list of installed mod folders at backup time
pub const INSTALLED_LIST_FILE: &str = "installed_mods.json";

pub const DEFAULT_RETENTION: usize = 4;

const BACKUP_PREFIX: &str = "backup_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup directory not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("enabled_mods.json not found in backup {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("Invalid backup path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write backup metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

fn io_err(context: impl Into<String>) -> impl FnOnce(io::Error) -> BackupError {
    let context = context.into();
    move |source| BackupError::Io { context, source }
}

/// Contents of `backup_info.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub timestamp: String,
    #[serde(default)]
    pub backup_mods: bool,
    #[serde(default)]
    pub starsector_path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One backup on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub timestamp: String,
    pub path: PathBuf,
    pub metadata: BackupMetadata,
}

impl BackupRecord {
    pub fn has_manifest(&self) -> bool {
        self.path.join(ENABLED_MODS_FILE).is_file()
    }
}

/// Owns the backup tree under `<target>/modlist_backups`
#[derive(Debug, Clone)]
pub struct BackupManager {
    target: PathBuf,
    root: PathBuf,
    retention: usize,
    record_installed: bool,
}

impl BackupManager {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let root = backups_dir(&target);
        Self {
            target,
            root,
            retention: DEFAULT_RETENTION,
            record_installed: false,
        }
    }

    /// Number of backups kept after each create. Zero disables pruning.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Also record the installed mod folders in each backup
    pub fn with_installed_list(mut self, enabled: bool) -> Self {
        self.record_installed = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot the enabled-mods manifest, then prune old backups.
    ///
    /// A missing manifest is not an error: the backup then only carries
    /// metadata, and restoring it fails explicitly.
    pub fn create_backup(&self) -> Result<BackupRecord, BackupError> {
        std::fs::create_dir_all(&self.root)
            .map_err(io_err(format!("Failed to create {}", self.root.display())))?;

        let (timestamp, path) = self.allocate_dir()?;

        if let Err(e) = self.populate(&path, &timestamp) {
            // Half-written backups would be listed later; drop them
            let _ = std::fs::remove_dir_all(&path);
            return Err(e);
        }

        let metadata = self.write_metadata(&path, &timestamp)?;
        info!("Created backup {}", path.display());

        if self.retention > 0 {
            let pruned = self.prune(self.retention);
            if pruned > 0 {
                debug!("Pruned {} old backup(s)", pruned);
            }
        }

        Ok(BackupRecord {
            timestamp,
            path,
            metadata,
        })
    }

    /// Create a fresh, uniquely named backup directory
    fn allocate_dir(&self) -> Result<(String, PathBuf), BackupError> {
        // UTC: directory names must sort chronologically
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();

        for attempt in 0..1000u32 {
            let name = if attempt == 0 {
                format!("{}{}", BACKUP_PREFIX, timestamp)
            } else {
                format!("{}{}_{:03}", BACKUP_PREFIX, timestamp, attempt)
            };
            let path = self.root.join(name);
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok((timestamp, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(BackupError::Io {
                        context: format!("Failed to create {}", path.display()),
                        source: e,
                    })
                }
            }
        }

        Err(BackupError::Io {
            context: format!("No free backup name for {}", timestamp),
            source: io::Error::from(io::ErrorKind::AlreadyExists),
        })
    }

    fn populate(&self, path: &Path, timestamp: &str) -> Result<(), BackupError> {
        let manifest = enabled_mods_path(&self.target);
        if manifest.is_file() {
            std::fs::copy(&manifest, path.join(ENABLED_MODS_FILE))
                .map_err(io_err(format!("Failed to copy {}", manifest.display())))?;
        } else {
            debug!("No {} to back up", ENABLED_MODS_FILE);
        }

        if self.record_installed {
            let mut folders: Vec<String> = std::fs::read_dir(mods_dir(&self.target))
                .into_iter()
                .flatten()
                .flatten()
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            folders.sort();

            let list = serde_json::json!({ "mods": folders, "timestamp": timestamp });
            let content = serde_json::to_string_pretty(&list)?;
            std::fs::write(path.join(INSTALLED_LIST_FILE), content)
                .map_err(io_err("Failed to write installed mod list"))?;
        }

        Ok(())
    }

    fn write_metadata(&self, path: &Path, timestamp: &str) -> Result<BackupMetadata, BackupError> {
        let metadata = BackupMetadata {
            timestamp: timestamp.to_string(),
            backup_mods: self.record_installed,
            starsector_path: self.target.display().to_string(),
            extra: Map::new(),
        };
        let content = serde_json::to_string_pretty(&metadata)?;
        if let Err(e) = std::fs::write(path.join(BACKUP_INFO_FILE), content) {
            let _ = std::fs::remove_dir_all(path);
            return Err(BackupError::Io {
                context: format!("Failed to write {}", BACKUP_INFO_FILE),
                source: e,
            });
        }
        Ok(metadata)
    }

    /// Backups with readable metadata, newest first
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut backups: Vec<BackupRecord> = entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(BACKUP_PREFIX))
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let path = e.path();
                let content = std::fs::read_to_string(path.join(BACKUP_INFO_FILE)).ok()?;
                match serde_json::from_str::<BackupMetadata>(&content) {
                    Ok(metadata) => Some(BackupRecord {
                        timestamp: metadata.timestamp.clone(),
                        path,
                        metadata,
                    }),
                    Err(e) => {
                        debug!("Skipping backup {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();

        // Directory name breaks ties between backups from the same instant
        backups.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.path.file_name().cmp(&a.path.file_name()))
        });
        backups
    }

    /// Copy a backup's manifest back into the mods directory
    pub fn restore_backup(&self, backup: &Path) -> Result<(), BackupError> {
        if !backup.is_dir() {
            return Err(BackupError::NotFound(backup.to_path_buf()));
        }

        let source = backup.join(ENABLED_MODS_FILE);
        if !source.is_file() {
            return Err(BackupError::ManifestMissing(backup.to_path_buf()));
        }

        let bytes = std::fs::read(&source)
            .map_err(io_err(format!("Failed to read {}", source.display())))?;
        let dest = enabled_mods_path(&self.target);
        write_atomic(&dest, &bytes, ".tmp_enabled_mods_").map_err(|e| BackupError::Io {
            context: format!("Failed to restore {}", dest.display()),
            source: io::Error::other(format!("{:#}", e)),
        })?;

        info!("Restored {} from {}", ENABLED_MODS_FILE, backup.display());
        Ok(())
    }

    /// Delete a backup. Only direct children of the backup root qualify.
    pub fn delete_backup(&self, backup: &Path) -> Result<(), BackupError> {
        let invalid = || BackupError::InvalidPath(backup.to_path_buf());

        let canonical = backup.canonicalize().map_err(|_| invalid())?;
        let root = self.root.canonicalize().map_err(|_| invalid())?;
        if canonical.parent() != Some(root.as_path()) || !canonical.is_dir() {
            return Err(invalid());
        }

        std::fs::remove_dir_all(&canonical)
            .map_err(io_err(format!("Failed to delete {}", canonical.display())))?;
        debug!("Deleted backup {}", canonical.display());
        Ok(())
    }

    /// Delete all but the newest `keep` backups. Returns the number deleted.
    ///
    /// Ordering comes from the directory names, so backups whose metadata
    /// cannot be read still age out. Names without a timestamp count as oldest.
    pub fn prune(&self, keep: usize) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return 0;
        };

        let mut dirs: Vec<(bool, String, PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let stamp = name.strip_prefix(BACKUP_PREFIX)?;
                let stamped = stamp.starts_with(|c: char| c.is_ascii_digit());
                Some((stamped, name, e.path()))
            })
            .collect();
        dirs.sort_by(|a, b| b.cmp(a));

        let mut deleted = 0;
        for (_, _, path) in dirs.iter().skip(keep) {
            match self.delete_backup(path) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Failed to prune backup {}: {}", path.display(), e),
            }
        }

        deleted
    }
}
