//! Cooperative pause requests.
//!
//! A [`PauseHandle`] is shared between the seek engine and whatever wants to
//! pause it: a Ctrl-C listener in the same process, or another process that
//! drops a marker file into the history directory (`seekloop pause`).
//!
//! ```text
//! Ctrl-C / `seekloop pause`
//!    │
//!    ▼
//! PauseHandle::request()  ──►  engine observes at top of next iteration
//!                                 │
//!                                 ├─► persist session snapshot
//!                                 └─► TerminalOutcome::Paused
//! ```
//!
//! The engine never interrupts a validation command that is already running;
//! the request only suppresses the next iteration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;

/// Marker file name used for cross-process pause requests.
pub const PAUSE_MARKER: &str = "PAUSE";

/// Shared, cloneable pause flag.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    flag: Arc<AtomicBool>,
    marker: Option<PathBuf>,
}

impl PauseHandle {
    /// In-process handle with no marker file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that also honours a marker file at `marker`.
    #[must_use]
    pub fn with_marker(marker: impl Into<PathBuf>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            marker: Some(marker.into()),
        }
    }

    /// Marker file location inside a history directory.
    #[must_use]
    pub fn marker_path(history_dir: &Path) -> PathBuf {
        history_dir.join(PAUSE_MARKER)
    }

    /// Ask the engine to pause before its next iteration.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a pause has been requested in-process or via the marker file.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.marker.as_deref().is_some_and(Path::exists)
    }

    /// Withdraw any pending request, including the marker file.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
        if let Some(marker) = &self.marker {
            if let Err(e) = remove_marker(marker) {
                warn!("Failed to remove pause marker {}: {}", marker.display(), e);
            }
        }
    }

    /// Wait for Ctrl-C (or SIGTERM on Unix) and turn it into a pause request.
    ///
    /// # Errors
    ///
    /// Returns an error if signal handler registration fails.
    pub async fn pause_on_interrupt(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, pausing after the current iteration");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, pausing after the current iteration");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            info!("Received Ctrl+C, pausing after the current iteration");
        }

        self.request();
        Ok(())
    }
}

/// Write a pause marker so a running seek in another process pauses.
///
/// # Errors
///
/// Returns an error if the marker cannot be written.
pub fn write_marker(history_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(history_dir)?;
    let marker = PauseHandle::marker_path(history_dir);
    std::fs::write(&marker, chrono::Utc::now().to_rfc3339())?;
    Ok(marker)
}

/// Remove a pause marker; a missing marker is not an error.
///
/// # Errors
///
/// Returns an error if the marker exists but cannot be removed.
pub fn remove_marker(marker: &Path) -> Result<bool> {
    match std::fs::remove_file(marker) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_handle_not_requested() {
        let handle = PauseHandle::new();
        assert!(!handle.is_requested());
    }

    #[test]
    fn test_request_visible_through_clones() {
        let handle = PauseHandle::new();
        let clone = handle.clone();
        clone.request();
        assert!(handle.is_requested());

        handle.clear();
        assert!(!clone.is_requested());
    }

    #[test]
    fn test_marker_file_requests_pause() {
        let temp = TempDir::new().unwrap();
        let handle = PauseHandle::with_marker(PauseHandle::marker_path(temp.path()));
        assert!(!handle.is_requested());

        let marker = write_marker(temp.path()).unwrap();
        assert!(marker.exists());
        assert!(handle.is_requested());

        handle.clear();
        assert!(!marker.exists());
        assert!(!handle.is_requested());
    }

    #[test]
    fn test_remove_missing_marker_is_ok() {
        let temp = TempDir::new().unwrap();
        let removed = remove_marker(&temp.path().join(PAUSE_MARKER)).unwrap();
        assert!(!removed);
    }
}
