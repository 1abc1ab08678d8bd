//! Mod archive downloads
//!
//! A download is one streaming GET into a fresh temp file followed by an
//! integrity check. The whole attempt is retried with exponential backoff.
//! Google Drive confirmation pages are reported as their own outcome since
//! retrying the same link would only fetch the same page again.

mod google_drive;
mod http;
pub mod url_check;

pub use google_drive::{
    direct_download_url, domain_of, extract_file_id, fix_google_drive_url, is_google_drive_url,
    parse_confirmation_page,
};
pub use http::{Fetch, FetchResponse, HttpClient, PROBE_TIMEOUT, REQUEST_TIMEOUT};
pub use url_check::{validate_mod_urls, UrlCheckFailure, UrlCheckReport};

use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::archive::{detect_archive_type, is_valid_archive, ArchiveFormat};
use crate::installer::error::ErrorKind;
use crate::modlist::ModDescriptor;
use http::truncate_url;

/// Prefix of every temp archive; stale ones are swept on startup
pub const TEMP_PREFIX: &str = "modlist_";

/// Read/write buffer size while streaming to disk
pub const CHUNK_SIZE: usize = 8192;

/// Largest confirmation page read when looking for a download link
const MAX_INTERSTITIAL_BYTES: u64 = 1024 * 1024;

/// Retry budget with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Factor applied to the delay after each failed attempt
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Connection timed out: {0}")]
    Timeout(String),

    #[error("Connection failed for {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Downloaded file is not a valid {expected} archive{}", detected_note(.detected))]
    Integrity {
        expected: ArchiveFormat,
        detected: Option<ArchiveFormat>,
    },

    #[error("Google Drive returned a confirmation page instead of the file")]
    Interstitial,

    #[error("Download cancelled")]
    Cancelled,

    #[error("Failed to save download: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

fn detected_note(detected: &Option<ArchiveFormat>) -> String {
    match detected {
        Some(format) => format!(" (content looks like {})", format),
        None => String::new(),
    }
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Timeout(_) | DownloadError::Connection { .. } => {
                ErrorKind::NetworkTimeout
            }
            DownloadError::Status { status, .. } => ErrorKind::from_status(*status),
            DownloadError::Integrity { .. } => ErrorKind::CorruptedArchive,
            DownloadError::Interstitial => ErrorKind::Interstitial,
            DownloadError::Io(e) => ErrorKind::from_io(e),
            DownloadError::Cancelled | DownloadError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Interstitial | DownloadError::Cancelled => false,
            other => other.kind().is_retryable(),
        }
    }

    /// Connection-level failure with no HTTP status
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            DownloadError::Timeout(_) | DownloadError::Connection { .. }
        )
    }
}

/// Run `f` until it succeeds, fails permanently, or the budget runs out.
///
/// `f` receives the 1-based attempt number. The last error is returned on
/// exhaustion. A set `cancel` flag stops further attempts.
pub fn with_retry<T, F>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: Option<&AtomicBool>,
    mut f: F,
) -> Result<T, DownloadError>
where
    F: FnMut(u32) -> Result<T, DownloadError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f(attempt) {
            Ok(result) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}/{}", operation_name, attempt, max_attempts);
                }
                return Ok(result);
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_attempts, e
                );

                if !e.is_retryable() || attempt >= max_attempts {
                    return Err(e);
                }
                if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                    return Err(DownloadError::Cancelled);
                }

                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    info!("Retrying in {:.1} seconds...", delay.as_secs_f32());
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}

/// A validated archive on disk. The file is deleted when this is dropped.
#[derive(Debug)]
pub struct DownloadedArchive {
    path: TempPath,
    pub format: ArchiveFormat,
    pub size: u64,
}

impl DownloadedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, reporting failure
    pub fn discard(self) -> io::Result<()> {
        self.path.close()
    }
}

/// Outcome of downloading one mod
#[derive(Debug)]
pub enum DownloadResult {
    Archive(DownloadedArchive),
    /// HTML confirmation page instead of the archive
    Interstitial { url: String },
    Failed {
        kind: ErrorKind,
        error: String,
        attempts: u32,
    },
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Archive(_))
    }
}

/// Downloads archives through a [`Fetch`] implementation
pub struct Downloader<F: Fetch> {
    fetcher: F,
    retry: RetryPolicy,
    temp_dir: PathBuf,
    cancel: Option<Arc<AtomicBool>>,
}

impl<F: Fetch> Downloader<F> {
    pub fn new(fetcher: F, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            retry: RetryPolicy::default(),
            temp_dir: temp_dir.into(),
            cancel: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stop retrying once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Download one mod's archive. Never leaves a temp file behind on failure.
    pub fn download(&self, descriptor: &ModDescriptor) -> DownloadResult {
        let url = descriptor.download_url.trim();
        if url.is_empty() {
            return DownloadResult::Failed {
                kind: ErrorKind::InvalidData,
                error: "No download URL".to_string(),
                attempts: 0,
            };
        }

        let mut attempts = 0;
        let result = with_retry(
            &format!("Download of {}", descriptor.name),
            &self.retry,
            self.cancel.as_deref(),
            |attempt| {
                attempts = attempt;
                self.attempt(url)
            },
        );

        match result {
            Ok(archive) => {
                debug!(
                    "Downloaded {} ({} bytes, {})",
                    descriptor.name, archive.size, archive.format
                );
                DownloadResult::Archive(archive)
            }
            Err(DownloadError::Interstitial) => DownloadResult::Interstitial {
                url: url.to_string(),
            },
            Err(e) => DownloadResult::Failed {
                kind: e.kind(),
                error: e.to_string(),
                attempts,
            },
        }
    }

    /// One GET, stream to disk, validate
    fn attempt(&self, url: &str) -> Result<DownloadedArchive, DownloadError> {
        let mut response = self.fetcher.get(url)?;
        if !response.is_success() {
            return Err(DownloadError::Status {
                status: response.status,
                url: truncate_url(url),
            });
        }

        if response.is_html() && is_google_drive_url(url) {
            response = self.follow_confirmation(url, response)?;
        }

        let format = ArchiveFormat::from_url_and_content_type(url, response.content_type.as_deref());
        std::fs::create_dir_all(&self.temp_dir)?;
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(&self.temp_dir)?;

        // From here on the temp file is removed on any early return
        let (file, path) = file.into_parts();
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut reader = io::BufReader::with_capacity(CHUNK_SIZE, response.body);
        let size = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        drop(writer);

        if !is_valid_archive(&path, format) {
            let detected = detect_archive_type(&path).ok().flatten();
            return Err(DownloadError::Integrity {
                expected: format,
                detected: detected.filter(|d| *d != format),
            });
        }

        Ok(DownloadedArchive { path, format, size })
    }

    /// Try once to get past a Drive confirmation page
    fn follow_confirmation(
        &self,
        url: &str,
        response: FetchResponse,
    ) -> Result<FetchResponse, DownloadError> {
        let Some(file_id) = extract_file_id(url).or_else(|| extract_file_id(&response.final_url))
        else {
            return Err(DownloadError::Interstitial);
        };

        let mut html = String::new();
        response
            .body
            .take(MAX_INTERSTITIAL_BYTES)
            .read_to_string(&mut html)
            .map_err(|_| DownloadError::Interstitial)?;

        let confirmed = match parse_confirmation_page(&html, &file_id) {
            Ok(confirmed) if confirmed != url => confirmed,
            _ => return Err(DownloadError::Interstitial),
        };

        debug!("Following Drive confirmation link for {}", file_id);
        let next = self.fetcher.get(&confirmed)?;
        if !next.is_success() {
            return Err(DownloadError::Status {
                status: next.status,
                url: truncate_url(&confirmed),
            });
        }
        if next.is_html() {
            return Err(DownloadError::Interstitial);
        }
        Ok(next)
    }
}

/// Remove leftover `modlist_*` temp archives from a previous run.
/// Returns the number of files removed.
pub fn cleanup_stale_temp_files(dir: &Path) -> usize {
    let mut cleaned = 0;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_archive = name.ends_with(".zip") || name.ends_with(".7z");
            if name.starts_with(TEMP_PREFIX) && is_archive && entry.path().is_file() {
                if std::fs::remove_file(entry.path()).is_ok() {
                    cleaned += 1;
                }
            }
        }
    }
    if cleaned > 0 {
        info!("Cleaned up {} leftover temp archive(s)", cleaned);
    }
    cleaned
}

/// Run `op` on a dedicated pool of `workers` threads
pub(crate) fn run_pool<T: Send>(
    workers: usize,
    op: impl FnOnce() -> T + Send,
) -> Result<T, rayon::ThreadPoolBuildError> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    Ok(pool.install(op))
}
