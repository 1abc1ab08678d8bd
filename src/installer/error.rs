//! Error taxonomy for installation failures
//!
//! Every per-mod failure is classified into an [`ErrorKind`] so the final
//! report can attach remedy text, and so tests can assert on which failure
//! happened rather than on log output.

use std::io;
use std::path::PathBuf;

use serde::Serialize;

/// Closed set of failure kinds surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout or connection failure
    NetworkTimeout,
    /// HTTP 404/410: the link is dead
    NotFound,
    /// HTTP 401/403/429: quota or permission
    AccessDenied,
    /// Download is not a sound archive
    CorruptedArchive,
    /// Archive entry escapes the target directory
    PathTraversal,
    PermissionDenied,
    DiskFull,
    /// Unusable data, e.g. an empty archive
    InvalidData,
    /// HTML confirmation page instead of a file
    Interstitial,
    Other,
}

impl ErrorKind {
    /// Classify an I/O error
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                ErrorKind::PermissionDenied
            }
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => ErrorKind::DiskFull,
            io::ErrorKind::TimedOut => ErrorKind::NetworkTimeout,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => ErrorKind::InvalidData,
            _ => {
                // ENOSPC surfaces as Other on some platforms
                if err.to_string().contains("No space left") {
                    ErrorKind::DiskFull
                } else {
                    ErrorKind::Other
                }
            }
        }
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => ErrorKind::NotFound,
            401 | 403 | 429 => ErrorKind::AccessDenied,
            408 | 504 => ErrorKind::NetworkTimeout,
            _ => ErrorKind::Other,
        }
    }

    /// Classify any error chain, looking for an I/O error inside it
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<io::Error>())
            .map(Self::from_io)
            .unwrap_or(ErrorKind::Other)
    }

    /// Short label for logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NetworkTimeout => "Connection timeout",
            ErrorKind::NotFound => "Mod not found (404)",
            ErrorKind::AccessDenied => "Access denied or quota exceeded",
            ErrorKind::CorruptedArchive => "Corrupted download",
            ErrorKind::PathTraversal => "Security: path traversal blocked",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::DiskFull => "Not enough disk space",
            ErrorKind::InvalidData => "Invalid archive contents",
            ErrorKind::Interstitial => "Confirmation page instead of file",
            ErrorKind::Other => "Unexpected error",
        }
    }

    /// Actionable advice for the user
    pub fn remedy(&self) -> &'static str {
        match self {
            ErrorKind::NetworkTimeout => {
                "The download took too long to respond. Check your internet connection, \
                 try again later, or check whether a firewall is blocking the connection."
            }
            ErrorKind::NotFound => {
                "The download link is dead or the mod was removed. Check whether the mod is \
                 still available online and update the modlist with a new link."
            }
            ErrorKind::AccessDenied => {
                "The host refused the download (permission or quota, e.g. Google Drive limits). \
                 Wait a few hours and retry, or ask the mod author for an alternative link."
            }
            ErrorKind::CorruptedArchive => {
                "The downloaded file is damaged or incomplete. Download again and check the \
                 stability of your connection; report the link if it keeps failing."
            }
            ErrorKind::PathTraversal => {
                "The archive tried to write outside the mods folder and was blocked. Do not \
                 install this file; report it to the modlist maintainer."
            }
            ErrorKind::PermissionDenied => {
                "The installer cannot write to the Starsector folder. Check folder permissions \
                 and close Starsector if it is running."
            }
            ErrorKind::DiskFull => {
                "Your drive does not have enough free space. Free up at least 5 GB, install to \
                 a different drive, or remove old mods first."
            }
            ErrorKind::InvalidData => {
                "The archive has no usable content. Check the link points at the mod file \
                 itself rather than a folder or web page."
            }
            ErrorKind::Interstitial => {
                "The host returned a confirmation page instead of the file. Use a direct \
                 download link (see `fix-url` for Google Drive links)."
            }
            ErrorKind::Other => {
                "Check the log for more information and retry; report the issue if it persists."
            }
        }
    }

    /// Whether a failed attempt of this kind is worth retrying
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::PathTraversal | ErrorKind::PermissionDenied | ErrorKind::DiskFull
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Batch-fatal failures raised before any mod is processed
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Cannot write to mods directory {}: {source}", .path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Installation cancelled: {0}")]
    Declined(String),

    #[error("Duplicate mod names in modlist: {}", .0.join(", "))]
    DuplicateNames(Vec<String>),

    #[error("An installation is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Config(#[from] super::config::ConfigError),
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::NotWritable { source, .. } => match ErrorKind::from_io(source) {
                ErrorKind::Other => ErrorKind::PermissionDenied,
                kind => kind,
            },
            InstallError::DuplicateNames(_) | InstallError::Config(_) => ErrorKind::InvalidData,
            InstallError::Declined(_) | InstallError::AlreadyRunning => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ErrorKind::from_io(&denied), ErrorKind::PermissionDenied);

        let full = io::Error::other("No space left on device (os error 28)");
        assert_eq!(ErrorKind::from_io(&full), ErrorKind::DiskFull);

        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(ErrorKind::from_io(&timeout), ErrorKind::NetworkTimeout);
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::AccessDenied);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::Other);
    }

    #[test]
    fn test_from_anyhow_finds_nested_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = anyhow::Error::new(io_err).context("Failed to create Foo/bar.txt");
        assert_eq!(ErrorKind::from_anyhow(&err), ErrorKind::PermissionDenied);

        let plain = anyhow::anyhow!("something else");
        assert_eq!(ErrorKind::from_anyhow(&plain), ErrorKind::Other);
    }

    #[test]
    fn test_remedies_distinguish_dead_link_from_quota() {
        assert_ne!(ErrorKind::NotFound.remedy(), ErrorKind::AccessDenied.remedy());
        assert!(ErrorKind::NotFound.remedy().contains("dead"));
        assert!(ErrorKind::AccessDenied.remedy().contains("quota"));
        assert_ne!(ErrorKind::DiskFull.remedy(), ErrorKind::PermissionDenied.remedy());
    }

    #[test]
    fn test_security_violations_not_retryable() {
        assert!(!ErrorKind::PathTraversal.is_retryable());
        assert!(ErrorKind::CorruptedArchive.is_retryable());
        assert!(ErrorKind::NetworkTimeout.is_retryable());
    }
}
