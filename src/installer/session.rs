//! Per-run installation state: running, paused and cancelled flags.
//!
//! A session is shared between the thread running the installer and whoever
//! controls it (CLI, GUI). All flags are cooperative: the installer polls them
//! between downloads and between extractions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::InstallError;

const PAUSE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct InstallSession {
    installing: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl InstallSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session as running. Fails if a run is already in progress.
    ///
    /// A cancel or pause requested before the run starts is kept and honoured.
    /// The returned guard ends the run and clears both flags when dropped.
    pub fn begin(&self) -> Result<RunGuard, InstallError> {
        if self
            .installing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(InstallError::AlreadyRunning);
        }
        Ok(RunGuard {
            session: self.clone(),
        })
    }

    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Request cancellation. In-flight downloads finish; nothing new starts.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Shared flag handed to the downloader so retries stop on cancel
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Block while paused. Returns `false` if cancelled before or during the wait.
    pub fn wait_while_paused(&self) -> bool {
        while self.is_paused() && !self.is_cancelled() {
            std::thread::sleep(PAUSE_POLL);
        }
        !self.is_cancelled()
    }
}

/// Ends the run on drop and resets the flags for the next one
#[derive(Debug)]
pub struct RunGuard {
    session: InstallSession,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.session.paused.store(false, Ordering::SeqCst);
        self.session.cancelled.store(false, Ordering::SeqCst);
        self.session.installing.store(false, Ordering::SeqCst);
    }
}
