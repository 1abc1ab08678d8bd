//! Installation orchestrator
//!
//! Coordinates the phases of a modlist installation:
//! 1. Backup     - snapshot enabled_mods.json
//! 2. Preflight  - game folder, disk space, write access, connectivity, dependencies
//! 3. Resolve    - dependency order over the whole batch
//! 4. Filter     - mods already current go straight to `skipped`
//! 5. Download   - bounded parallel pool
//! 6. Extract    - strictly sequential, in resolved order
//! 7. Finalize   - report, persist detected metadata, optionally enable mods

pub mod config;
pub mod error;
pub mod log;
pub mod preflight;
pub mod report;
pub mod resolver;
pub mod session;

pub use config::{InstallConfig, InstallPhase, ProgressCallback, ProgressEvent};
pub use error::{ErrorKind, InstallError};
pub use log::{LogSink, MemorySink, Severity, TracingSink};
pub use preflight::{auto_detect_game_dir, looks_like_game_dir, ConfirmFn, PreflightWarning};
pub use report::{InstallationReport, ModOutcome};
pub use resolver::{resolve, resolve_install_order};
pub use session::InstallSession;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::archive::{detect_archive_metadata, extract_archive, ExtractOutcome};
use crate::backup::BackupManager;
use crate::downloaders::{
    cleanup_stale_temp_files, fix_google_drive_url, run_pool, DownloadResult, Downloader, Fetch,
    HttpClient,
};
use crate::modlist::{
    detect_outdated_mods, enable_all_installed, installed_ids, is_mod_up_to_date,
    refresh_from_installed, scan_installed_mods, ConfigStore, ModBatchConfig,
};
use report::UrlFix;

fn log_phase_metrics(phase: InstallPhase, started: Instant) {
    debug!(
        "Phase done: phase='{}' elapsed_ms={}",
        phase,
        started.elapsed().as_millis()
    );
}

/// Main installer orchestrator
pub struct Installer<F: Fetch> {
    config: InstallConfig,
    fetcher: F,
    session: InstallSession,
    log: Arc<dyn LogSink>,
    progress: Option<ProgressCallback>,
    store: Option<ConfigStore>,
}

impl Installer<HttpClient> {
    /// Installer backed by a real HTTP client using the configured timeout
    pub fn with_http(config: InstallConfig) -> Result<Self> {
        let client = HttpClient::with_timeout(config.request_timeout)?;
        Ok(Self::new(config, client))
    }
}

impl<F: Fetch> Installer<F> {
    pub fn new(config: InstallConfig, fetcher: F) -> Self {
        Self {
            config,
            fetcher,
            session: InstallSession::new(),
            log: Arc::new(TracingSink),
            progress: None,
            store: None,
        }
    }

    /// Share an externally controlled session (pause/cancel from another thread)
    pub fn with_session(mut self, session: InstallSession) -> Self {
        self.session = session;
        self
    }

    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Persist detected metadata to this store after the run
    pub fn with_config_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn session(&self) -> &InstallSession {
        &self.session
    }

    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    fn report_progress(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.progress {
            callback(event);
        }
    }

    fn emit(&self, message: &str, severity: Severity) {
        self.log.log(message, severity);
    }

    /// Install every mod of `batch` into the target's mods directory.
    ///
    /// Per-mod failures end up in the report. Only batch-level problems
    /// (invalid config, duplicate names, unwritable mods folder, a declined
    /// pre-flight warning, a second concurrent run) are returned as errors.
    /// Descriptors in `batch` are updated with metadata found on disk and in
    /// the downloaded archives.
    pub fn install(
        &self,
        batch: &mut ModBatchConfig,
        confirm: ConfirmFn<'_>,
    ) -> Result<InstallationReport, InstallError> {
        let started = Instant::now();
        self.config.validate()?;

        let duplicates = batch.duplicate_names();
        if !duplicates.is_empty() {
            return Err(InstallError::DuplicateNames(duplicates));
        }

        let _run = self.session.begin()?;
        let mods_dir = self.config.mods_dir();
        let mut report = InstallationReport::new();

        info!(
            "Installing '{}' ({} mods) into {}",
            batch.modlist_name,
            batch.mods.len(),
            self.config.target_dir.display()
        );

        // === Phase 1: Backup ===
        let phase_start = Instant::now();
        self.report_progress(ProgressEvent::PhaseStarted {
            phase: InstallPhase::Backup,
            total: 1,
        });
        if self.config.skip_backup {
            debug!("Backup skipped");
        } else {
            let backups = BackupManager::new(&self.config.target_dir)
                .with_retention(self.config.backup_retention);
            match backups.create_backup() {
                Ok(record) => self.emit(
                    &format!("Backup created: {}", record.path.display()),
                    Severity::Info,
                ),
                Err(e) => self.emit(&format!("Backup failed: {}", e), Severity::Warning),
            }
        }
        cleanup_stale_temp_files(&self.config.download_dir);
        log_phase_metrics(InstallPhase::Backup, phase_start);

        // === Phase 2: Preflight ===
        let phase_start = Instant::now();
        self.report_progress(ProgressEvent::PhaseStarted {
            phase: InstallPhase::Preflight,
            total: batch.mods.len(),
        });
        let installed = scan_installed_mods(&mods_dir);
        let refreshed = refresh_from_installed(&mut batch.mods, &installed);
        preflight::run_preflight(&self.config, &batch.mods, &installed, self.log.as_ref(), confirm)?;

        for outdated in detect_outdated_mods(&batch.mods, &installed) {
            self.emit(
                &format!(
                    "{} is outdated: {} installed, {} expected",
                    outdated.name, outdated.installed_version, outdated.expected_version
                ),
                Severity::Info,
            );
        }
        log_phase_metrics(InstallPhase::Preflight, phase_start);

        // === Phase 3+4: Resolve, then filter current mods ===
        let order = resolve_install_order(&batch.mods, &installed_ids(&installed));
        let mut pending = Vec::with_capacity(order.len());
        for idx in order {
            let descriptor = &batch.mods[idx];
            let check = is_mod_up_to_date(descriptor, &installed);
            if check.up_to_date {
                let reason = format!(
                    "already up to date (v{})",
                    check.installed_version.as_deref().unwrap_or("?")
                );
                self.emit(&format!("{}: {}", descriptor.name, reason), Severity::Info);
                report.record(&descriptor.name, ModOutcome::Skipped(reason));
            } else {
                pending.push(idx);
            }
        }

        // === Phase 5: Download ===
        let phase_start = Instant::now();
        let downloads = self.download_all(batch, &pending);
        log_phase_metrics(InstallPhase::Download, phase_start);

        // === Phase 6: Extract ===
        let phase_start = Instant::now();
        self.report_progress(ProgressEvent::PhaseStarted {
            phase: InstallPhase::Extract,
            total: downloads.len(),
        });
        let total = downloads.len();
        let mut downloads = downloads.into_iter().enumerate();
        for (position, (idx, result)) in downloads.by_ref() {
            if !self.session.wait_while_paused() {
                break;
            }
            let Some(result) = result else {
                // Cancelled before its download started
                continue;
            };

            let name = batch.mods[idx].name.clone();
            self.report_progress(ProgressEvent::Extracting {
                name: name.clone(),
                index: position + 1,
                total,
            });

            let outcome = match result {
                DownloadResult::Archive(archive) => {
                    let patch =
                        detect_archive_metadata(archive.path(), archive.format, &self.config.download_dir);
                    if patch.apply(&mut batch.mods[idx]) {
                        report.metadata_updated += 1;
                    }

                    let expected = batch.mods[idx].expected_version().map(str::to_string);
                    let extracted =
                        extract_archive(archive.path(), &mods_dir, archive.format, expected.as_deref());
                    if let Err(e) = archive.discard() {
                        warn!("Failed to delete temp archive for {}: {}", name, e);
                    }
                    outcome_of(extracted)
                }
                DownloadResult::Interstitial { url } => {
                    if let Some(fixed) = fix_google_drive_url(&url) {
                        report.url_fixes.push(UrlFix {
                            name: name.clone(),
                            original: url,
                            fixed,
                        });
                    }
                    ModOutcome::Failed {
                        kind: ErrorKind::Interstitial,
                        error: "Google Drive returned a confirmation page instead of the file"
                            .to_string(),
                    }
                }
                DownloadResult::Failed {
                    kind,
                    error,
                    attempts,
                } => ModOutcome::Failed {
                    kind,
                    error: if attempts > 1 {
                        format!("{} (after {} attempts)", error, attempts)
                    } else {
                        error
                    },
                },
            };

            self.log_outcome(&name, &outcome);
            report.record(&name, outcome);
            self.report_progress(ProgressEvent::ModFinished {
                name,
                index: position + 1,
                total,
            });
        }
        // Anything left was cancelled; dropping it deletes the temp files
        let abandoned = downloads.filter(|(_, (_, r))| r.is_some()).count();
        if abandoned > 0 {
            debug!("Discarded {} downloaded archive(s) after cancel", abandoned);
        }
        report.cancelled = self.session.is_cancelled();
        log_phase_metrics(InstallPhase::Extract, phase_start);

        // === Phase 7: Finalize ===
        self.report_progress(ProgressEvent::PhaseStarted {
            phase: InstallPhase::Finalize,
            total: 1,
        });
        if refreshed + report.metadata_updated > 0 {
            if let Some(store) = &self.store {
                match store.save(batch) {
                    Ok(()) => debug!("Saved detected metadata to {}", store.path().display()),
                    Err(e) => self.emit(
                        &format!("Failed to save modlist config: {:#}", e),
                        Severity::Warning,
                    ),
                }
            }
        }

        if self.config.enable_installed_mods && !report.cancelled {
            match enable_all_installed(&mods_dir) {
                Ok(ids) => self.emit(&format!("Enabled {} mod(s)", ids.len()), Severity::Info),
                Err(e) => self.emit(&format!("Failed to enable mods: {:#}", e), Severity::Warning),
            }
        }

        report.duration = started.elapsed();
        let severity = if report.has_errors() {
            Severity::Warning
        } else {
            Severity::Success
        };
        self.emit(
            &format!(
                "Done: {} installed, {} updated, {} skipped, {} failed",
                report.installed.len(),
                report.updated.len(),
                report.skipped.len(),
                report.errors.len()
            ),
            severity,
        );
        Ok(report)
    }

    /// Download `pending` on a pool of `max_concurrent_downloads` workers.
    ///
    /// Results keep the order of `pending`. `None` marks a mod whose download
    /// never started because the run was cancelled.
    fn download_all(
        &self,
        batch: &ModBatchConfig,
        pending: &[usize],
    ) -> Vec<(usize, Option<DownloadResult>)> {
        let total = pending.len();
        self.report_progress(ProgressEvent::PhaseStarted {
            phase: InstallPhase::Download,
            total,
        });
        if total == 0 {
            return Vec::new();
        }

        let downloader = Downloader::new(&self.fetcher, &self.config.download_dir)
            .with_retry_policy(self.config.retry.clone())
            .with_cancel_flag(self.session.cancel_flag());
        let done = AtomicUsize::new(0);

        let fetch_one = |idx: usize| {
            if !self.session.wait_while_paused() {
                return (idx, None);
            }
            let descriptor = &batch.mods[idx];
            self.emit(&format!("Downloading {}", descriptor.name), Severity::Info);
            let result = downloader.download(descriptor);
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("Downloads finished: {}/{}", finished, total);
            self.report_progress(ProgressEvent::DownloadFinished {
                name: descriptor.name.clone(),
                success: result.is_success(),
            });
            (idx, Some(result))
        };

        let workers = self.config.max_concurrent_downloads.min(total);
        run_pool(workers, || pending.par_iter().map(|&idx| fetch_one(idx)).collect())
            .unwrap_or_else(|e| {
                warn!("Download pool unavailable ({}), downloading sequentially", e);
                pending.iter().map(|&idx| fetch_one(idx)).collect()
            })
    }

    fn log_outcome(&self, name: &str, outcome: &ModOutcome) {
        match outcome {
            ModOutcome::Installed => self.emit(&format!("Installed {}", name), Severity::Success),
            ModOutcome::Updated { from, to } => self.emit(
                &format!(
                    "Updated {} ({} -> {})",
                    name,
                    from.as_deref().unwrap_or("unknown"),
                    to
                ),
                Severity::Success,
            ),
            ModOutcome::Skipped(reason) => {
                self.emit(&format!("Skipped {}: {}", name, reason), Severity::Info)
            }
            ModOutcome::Failed { kind, error } => self.emit(
                &format!("{} failed ({}): {}\n  {}", name, kind, error, kind.remedy()),
                Severity::Error,
            ),
        }
    }
}

fn outcome_of(extracted: ExtractOutcome) -> ModOutcome {
    match extracted {
        ExtractOutcome::Installed => ModOutcome::Installed,
        ExtractOutcome::UpdateApplied { from, to, .. } => ModOutcome::Updated { from, to },
        ExtractOutcome::Skipped(reason) => ModOutcome::Skipped(reason.to_string()),
        ExtractOutcome::Failed { kind, reason } => ModOutcome::Failed {
            kind,
            error: reason,
        },
    }
}
