//! Installation configuration
//!
//! Defines the knobs for one installation run and the progress events the
//! installer emits while it works.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::downloaders::RetryPolicy;
use crate::paths;

/// Download worker count
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 3;

/// Below this much free space the pre-flight check warns
pub const MIN_FREE_SPACE_GB: u64 = 5;

/// Configuration for a modlist installation
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Starsector installation directory (mods go in `<target>/mods`)
    pub target_dir: PathBuf,

    /// Directory for temporary archives
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads
    pub max_concurrent_downloads: usize,

    /// Number of backups kept after a new one is taken
    pub backup_retention: usize,

    /// Skip the enabled_mods.json backup
    pub skip_backup: bool,

    pub retry: RetryPolicy,

    pub min_free_space_gb: u64,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,

    pub skip_connectivity_check: bool,

    /// Enable every installed mod once the batch finishes
    pub enable_installed_mods: bool,
}

impl InstallConfig {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            download_dir: std::env::temp_dir(),
            max_concurrent_downloads: DEFAULT_DOWNLOAD_WORKERS,
            backup_retention: crate::backup::DEFAULT_RETENTION,
            skip_backup: false,
            retry: RetryPolicy::default(),
            min_free_space_gb: MIN_FREE_SPACE_GB,
            request_timeout: crate::downloaders::REQUEST_TIMEOUT,
            skip_connectivity_check: false,
            enable_installed_mods: false,
        }
    }

    /// `<target>/mods`
    pub fn mods_dir(&self) -> PathBuf {
        paths::mods_dir(&self.target_dir)
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target_dir.is_dir() {
            return Err(ConfigError::TargetNotFound(self.target_dir.clone()));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::NoWorkers);
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Starsector directory not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error("At least one download worker is required")]
    NoWorkers,

    #[error("Retry policy must allow at least one attempt")]
    NoAttempts,
}

/// Installation phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Backup,
    Preflight,
    Download,
    Extract,
    Finalize,
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InstallPhase::Backup => "Backup",
            InstallPhase::Preflight => "Pre-flight checks",
            InstallPhase::Download => "Download",
            InstallPhase::Extract => "Extract",
            InstallPhase::Finalize => "Finalize",
        };
        f.write_str(name)
    }
}

/// Progress information emitted during a run
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PhaseStarted { phase: InstallPhase, total: usize },
    DownloadFinished { name: String, success: bool },
    Extracting { name: String, index: usize, total: usize },
    ModFinished { name: String, index: usize, total: usize },
}

/// Progress callback for reporting installation status
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
