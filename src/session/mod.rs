//! Seek session state and its persistence.
//!
//! A [`SeekSession`] is the unit of persisted state: everything needed to
//! continue a seek loop after a pause or a process restart.
//!
//! # Architecture
//!
//! ```text
//! SeekSession
//!   ├── metadata: SessionMetadata (version, session id, timestamps, pid)
//!   ├── goal / validation_command
//!   ├── iteration_count
//!   ├── original_code (immutable)
//!   ├── attempts: Vec<Attempt> (append-only)
//!   └── last_successful: Option<SuccessSnapshot>
//! ```
//!
//! # Persistence
//!
//! [`SessionStore`] writes one timestamp-named JSON snapshot per save and
//! never overwrites an earlier one. [`PauseHandle`] carries cooperative pause
//! requests from signal handlers or other processes into the loop.

pub mod persistence;
pub mod signals;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempt::{summarize, Attempt, AttemptSummary, SuccessSnapshot, SUMMARY_WINDOW};

pub use persistence::{SessionStore, SnapshotEntry};
pub use signals::PauseHandle;

/// Current schema version for session snapshots.
/// Increment when making breaking changes to the serialization format.
pub const SESSION_STATE_VERSION: u32 = 1;

/// Minimum supported schema version.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

/// Session metadata containing version and timing information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Unique session identifier.
    pub session_id: String,
    /// When this session was created.
    pub created_at: DateTime<Utc>,
    /// When this session was last saved.
    pub saved_at: DateTime<Utc>,
    /// Process ID that last wrote this session.
    pub pid: u32,
}

impl SessionMetadata {
    /// Creates new session metadata with current timestamp and PID.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: SESSION_STATE_VERSION,
            session_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            saved_at: now,
            pid: std::process::id(),
        }
    }

    /// Updates the saved_at timestamp and PID.
    pub fn touch(&mut self) {
        self.saved_at = Utc::now();
        self.pid = std::process::id();
    }
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent state of one seek loop.
///
/// # Example
///
/// ```rust
/// use seekloop::attempt::Attempt;
/// use seekloop::session::SeekSession;
///
/// let mut session = SeekSession::new("fn main() {}", "make it compile", "cargo check");
/// assert_eq!(session.iteration_count(), 0);
///
/// let iteration = session.begin_iteration();
/// session.record(Attempt::new(iteration, "fn main() {}", "ok", Some(0), true));
/// assert!(session.has_succeeded());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeekSession {
    /// Session metadata (version, timestamps, PID).
    pub metadata: SessionMetadata,
    /// Natural-language goal given to the oracle.
    pub goal: String,
    /// Shell command that validates each candidate.
    pub validation_command: String,
    iteration_count: u32,
    original_code: String,
    attempts: Vec<Attempt>,
    last_successful: Option<SuccessSnapshot>,
}

impl SeekSession {
    /// Start a session from the code as it is right now.
    #[must_use]
    pub fn new(
        original_code: impl Into<String>,
        goal: impl Into<String>,
        validation_command: impl Into<String>,
    ) -> Self {
        Self {
            metadata: SessionMetadata::new(),
            goal: goal.into(),
            validation_command: validation_command.into(),
            iteration_count: 0,
            original_code: original_code.into(),
            attempts: Vec::new(),
            last_successful: None,
        }
    }

    /// Number of started iterations.
    #[must_use]
    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// Code as it was when the session started.
    #[must_use]
    pub fn original_code(&self) -> &str {
        &self.original_code
    }

    /// All attempts in iteration order.
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Most recent successful attempt, if any.
    #[must_use]
    pub fn last_successful(&self) -> Option<&SuccessSnapshot> {
        self.last_successful.as_ref()
    }

    /// Whether any attempt has succeeded.
    #[must_use]
    pub fn has_succeeded(&self) -> bool {
        self.last_successful.is_some()
    }

    /// Whether the session can make no further progress under `max_iterations`.
    #[must_use]
    pub fn is_terminal(&self, max_iterations: u32) -> bool {
        self.has_succeeded() || self.iteration_count >= max_iterations
    }

    /// Advance the iteration counter and return the new iteration number.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.iteration_count
    }

    /// Undo [`begin_iteration`](Self::begin_iteration) for an iteration that
    /// aborted before producing an attempt.
    pub fn abandon_iteration(&mut self) {
        if self.iteration_count as usize > self.attempts.len() {
            self.iteration_count -= 1;
        }
    }

    /// Append an attempt; a successful one becomes the last successful snapshot.
    pub fn record(&mut self, attempt: Attempt) {
        if attempt.success {
            self.last_successful = Some(SuccessSnapshot::from(&attempt));
        }
        self.attempts.push(attempt);
    }

    /// Bounded summary of prior attempts for the oracle.
    #[must_use]
    pub fn summary(&self) -> AttemptSummary {
        summarize(&self.attempts, SUMMARY_WINDOW)
    }

    /// Checks if a version number is compatible with this implementation.
    #[must_use]
    pub fn is_compatible_version(version: u32) -> bool {
        (MIN_SUPPORTED_VERSION..=SESSION_STATE_VERSION).contains(&version)
    }

    /// Checks if this session has a compatible version.
    #[must_use]
    pub fn is_version_compatible(&self) -> bool {
        Self::is_compatible_version(self.metadata.version)
    }

    /// Check the structural invariants of a loaded session.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.attempts.len() != self.iteration_count as usize {
            return Err(format!(
                "iteration count {} does not match {} recorded attempts",
                self.iteration_count,
                self.attempts.len()
            ));
        }
        let any_success = self.attempts.iter().any(|a| a.success);
        if any_success != self.last_successful.is_some() {
            return Err("last successful snapshot does not match attempt history".to_string());
        }
        Ok(())
    }

    /// Updates the session metadata timestamp before saving.
    pub fn touch(&mut self) {
        self.metadata.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SeekSession {
        SeekSession::new("fn main() {}", "fix it", "cargo check")
    }

    #[test]
    fn test_new_session_is_empty() {
        let s = session();
        assert_eq!(s.iteration_count(), 0);
        assert!(s.attempts().is_empty());
        assert!(s.last_successful().is_none());
        assert_eq!(s.original_code(), "fn main() {}");
        assert!(s.check_invariants().is_ok());
        assert!(!s.is_terminal(3));
    }

    #[test]
    fn test_record_failure_keeps_last_successful_absent() {
        let mut s = session();
        let i = s.begin_iteration();
        s.record(Attempt::new(i, "a", "error", Some(1), false));
        assert!(s.last_successful().is_none());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_last_successful_never_reverts() {
        let mut s = session();
        let i = s.begin_iteration();
        s.record(Attempt::new(i, "good", "ok", Some(0), true));
        let i = s.begin_iteration();
        s.record(Attempt::new(i, "bad", "error", Some(1), false));

        let snapshot = s.last_successful().unwrap();
        assert_eq!(snapshot.code, "good");
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_later_success_overwrites_snapshot() {
        let mut s = session();
        for (code, ok) in [("first", true), ("second", true)] {
            let i = s.begin_iteration();
            s.record(Attempt::new(i, code, "ok", Some(0), ok));
        }
        assert_eq!(s.last_successful().unwrap().code, "second");
    }

    #[test]
    fn test_abandon_iteration_restores_count() {
        let mut s = session();
        let i = s.begin_iteration();
        s.record(Attempt::new(i, "a", "error", Some(1), false));
        s.begin_iteration();
        s.abandon_iteration();
        assert_eq!(s.iteration_count(), 1);

        // Nothing to undo once counts agree.
        s.abandon_iteration();
        assert_eq!(s.iteration_count(), 1);
    }

    #[test]
    fn test_is_terminal() {
        let mut s = session();
        for _ in 0..2 {
            let i = s.begin_iteration();
            s.record(Attempt::new(i, "a", "error", Some(1), false));
        }
        assert!(s.is_terminal(2));
        assert!(!s.is_terminal(3));
    }

    #[test]
    fn test_invariant_violation_detected() {
        let mut s = session();
        s.begin_iteration();
        assert!(s.check_invariants().is_err());
    }

    #[test]
    fn test_version_compatibility() {
        assert!(SeekSession::is_compatible_version(SESSION_STATE_VERSION));
        assert!(!SeekSession::is_compatible_version(0));
        assert!(!SeekSession::is_compatible_version(999));
        assert!(session().is_version_compatible());
    }

    #[test]
    fn test_serde_roundtrip_preserves_history() {
        let mut s = session();
        let i = s.begin_iteration();
        s.record(Attempt::new(i, "a", "error: x", Some(1), false));
        let i = s.begin_iteration();
        s.record(Attempt::new(i, "b", "ok", Some(0), true));

        let json = serde_json::to_string(&s).unwrap();
        let restored: SeekSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, s);
    }

    #[test]
    fn test_metadata_touch_updates_saved_at() {
        let mut metadata = SessionMetadata::new();
        let created = metadata.created_at;
        metadata.touch();
        assert!(metadata.saved_at >= created);
        assert_eq!(metadata.version, SESSION_STATE_VERSION);
    }
}
