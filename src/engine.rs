//! The seek loop state machine.
//!
//! ```text
//!            run / resume
//!   Idle ───────────────► Running ──► Succeeded
//!     ▲                    │  ▲  ├──► Exhausted
//!     │ reset              │  │  └──► Aborted (fatal error)
//!     │                    ▼  │ resume
//!     └──────────────────  Paused
//! ```
//!
//! Each iteration asks the [`FixOracle`] for a candidate, installs it into
//! the [`EditingSurface`], runs the validation command and classifies the
//! output. The engine owns exactly one [`SeekSession`] at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attempt::Attempt;
use crate::classify::OutcomeClassifier;
use crate::config::SeekConfig;
use crate::error::{Result, SeekError};
use crate::oracle::{FixOracle, OpenAiBackend};
use crate::runner::{CommandRunner, ShellCommandRunner};
use crate::session::{PauseHandle, SeekSession, SessionStore};
use crate::surface::EditingSurface;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// No session in memory.
    Idle,
    /// Iterating.
    Running,
    /// Stopped by a pause request; the session was persisted.
    Paused,
    /// An attempt passed validation.
    Succeeded,
    /// The iteration cap was reached without success.
    Exhausted,
    /// A fatal error stopped the loop.
    Aborted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
            EngineState::Succeeded => write!(f, "succeeded"),
            EngineState::Exhausted => write!(f, "exhausted"),
            EngineState::Aborted => write!(f, "aborted"),
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TerminalOutcome {
    /// Attempt `iteration` passed validation.
    Succeeded { iteration: u32 },
    /// All `iterations` were used without success.
    Exhausted { iterations: u32 },
    /// Paused after `iteration` completed iterations.
    Paused { iteration: u32 },
}

impl TerminalOutcome {
    /// Engine state corresponding to this outcome.
    #[must_use]
    pub fn state(&self) -> EngineState {
        match self {
            TerminalOutcome::Succeeded { .. } => EngineState::Succeeded,
            TerminalOutcome::Exhausted { .. } => EngineState::Exhausted,
            TerminalOutcome::Paused { .. } => EngineState::Paused,
        }
    }
}

/// Orchestrates oracle, runner, classifier and session store.
pub struct SeekEngine {
    config: SeekConfig,
    project_dir: PathBuf,
    oracle: FixOracle,
    runner: Arc<dyn CommandRunner>,
    surface: Arc<dyn EditingSurface>,
    classifier: OutcomeClassifier,
    store: SessionStore,
    pause: PauseHandle,
    session: Option<SeekSession>,
    state: EngineState,
}

impl std::fmt::Debug for SeekEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeekEngine")
            .field("project_dir", &self.project_dir)
            .field("oracle", &self.oracle)
            .field("store", &self.store.dir())
            .field("state", &self.state)
            .field(
                "iteration",
                &self.session.as_ref().map(SeekSession::iteration_count),
            )
            .finish_non_exhaustive()
    }
}

impl SeekEngine {
    /// Create an engine from explicit collaborators.
    ///
    /// Snapshots go to the configured history directory under `project_dir`,
    /// and a pause marker in that directory is honoured.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::InvalidConfig`] if the configuration is invalid.
    pub fn new(
        config: SeekConfig,
        project_dir: impl Into<PathBuf>,
        oracle: FixOracle,
        runner: Arc<dyn CommandRunner>,
        surface: Arc<dyn EditingSurface>,
    ) -> Result<Self> {
        config.validate()?;
        let project_dir = project_dir.into();
        let history_dir = config.history_dir(&project_dir);

        Ok(Self {
            classifier: OutcomeClassifier::from_config(&config),
            store: SessionStore::new(&history_dir),
            pause: PauseHandle::with_marker(PauseHandle::marker_path(&history_dir)),
            config,
            project_dir,
            oracle,
            runner,
            surface,
            session: None,
            state: EngineState::Idle,
        })
    }

    /// Create an engine wired to the HTTP oracle and the shell runner.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Config`] if no API key can be found, or
    /// [`SeekError::InvalidConfig`] if the configuration is invalid.
    pub fn from_config(
        config: SeekConfig,
        project_dir: impl Into<PathBuf>,
        surface: Arc<dyn EditingSurface>,
    ) -> Result<Self> {
        config.validate()?;
        let api_key = config.resolve_api_key()?;
        let backend = OpenAiBackend::new(api_key)
            .with_api_base(&config.api_base)
            .with_timeout(config.request_timeout_secs);
        let oracle = FixOracle::new(Arc::new(backend), &config.model, config.temperature);

        Self::new(
            config,
            project_dir,
            oracle,
            Arc::new(ShellCommandRunner::new()),
            surface,
        )
    }

    /// Replace the pause handle.
    #[must_use]
    pub fn with_pause_handle(mut self, pause: PauseHandle) -> Self {
        self.pause = pause;
        self
    }

    /// Replace the session store.
    #[must_use]
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = store;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The live session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&SeekSession> {
        self.session.as_ref()
    }

    /// A clone of the pause handle, for signal listeners.
    #[must_use]
    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    #[must_use]
    pub fn config(&self) -> &SeekConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Seek a fix for `goal`, validated by `validation_command`.
    ///
    /// A new session is created from the surface's current text unless one is
    /// already live, in which case that session continues with its own goal
    /// and command. A pause request left over from before a new session is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that aborted the loop. The session keeps every
    /// attempt recorded before the failure.
    pub async fn run(&mut self, goal: &str, validation_command: &str) -> Result<TerminalOutcome> {
        if let Some(session) = &self.session {
            if session.goal != goal || session.validation_command != validation_command {
                warn!(
                    "A session is already live; continuing with its goal `{}`",
                    session.goal
                );
            }
            info!(
                "Continuing session {} at iteration {}",
                session.metadata.session_id,
                session.iteration_count()
            );
        } else {
            if self.pause.is_requested() {
                warn!("Discarding a pause request left over from before this session");
                self.pause.clear();
            }
            let original = self.surface.current_text()?;
            let session = SeekSession::new(original, goal, validation_command);
            info!("Starting session {}", session.metadata.session_id);
            self.session = Some(session);
        }

        self.run_loop().await
    }

    /// Persist the live session and mark the engine paused.
    ///
    /// A running loop is paused through [`pause_handle`](Self::pause_handle)
    /// instead; this is for an engine that is between runs.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::InvalidState`] without a session, or the
    /// persistence error if the snapshot cannot be written.
    pub fn pause(&mut self) -> Result<PathBuf> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SeekError::invalid_state("no session to pause"))?;
        session.touch();
        let path = self.store.save(session)?;
        self.state = EngineState::Paused;
        info!("Session paused at iteration {}", session.iteration_count());
        Ok(path)
    }

    /// Reload the most recent snapshot and continue the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::NoSnapshot`] if there is nothing to resume, or the
    /// fatal error that aborted the loop.
    pub async fn resume(&mut self) -> Result<TerminalOutcome> {
        let session = self
            .store
            .load_latest()?
            .ok_or_else(|| SeekError::NoSnapshot {
                dir: self.store.dir().to_path_buf(),
            })?;

        info!(
            "Resuming session {} at iteration {} ({} attempts)",
            session.metadata.session_id,
            session.iteration_count(),
            session.attempts().len()
        );
        self.pause.clear();
        self.session = Some(session);
        self.run_loop().await
    }

    /// Drop the live session and return to idle. Snapshots are kept.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Discarding session {}", session.metadata.session_id);
        }
        self.pause.clear();
        self.state = EngineState::Idle;
    }

    async fn run_loop(&mut self) -> Result<TerminalOutcome> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| SeekError::invalid_state("no session to run"))?;

        self.state = EngineState::Running;
        let result = self.drive(&mut session).await;
        self.session = Some(session);

        match &result {
            Ok(outcome) => {
                self.state = outcome.state();
                info!("Seek finished: {:?}", outcome);
            }
            Err(e) => {
                self.state = EngineState::Aborted;
                warn!("Seek aborted: {}", e);
            }
        }
        result
    }

    async fn drive(&self, session: &mut SeekSession) -> Result<TerminalOutcome> {
        let max_iterations = self.config.max_iterations;

        loop {
            if let Some(iteration) = last_success_iteration(session) {
                return Ok(TerminalOutcome::Succeeded { iteration });
            }
            if session.iteration_count() >= max_iterations {
                return Ok(TerminalOutcome::Exhausted {
                    iterations: session.iteration_count(),
                });
            }
            if self.pause.is_requested() {
                self.pause.clear();
                self.persist(session);
                return Ok(TerminalOutcome::Paused {
                    iteration: session.iteration_count(),
                });
            }

            let iteration = session.begin_iteration();
            info!("Iteration {}/{}", iteration, max_iterations);

            let attempt = match self.attempt(session, iteration).await {
                Ok(attempt) => attempt,
                Err(e) => {
                    session.abandon_iteration();
                    return Err(e);
                }
            };

            let success = attempt.success;
            session.record(attempt);

            if success {
                self.persist(session);
                return Ok(TerminalOutcome::Succeeded { iteration });
            }

            if self.config.save_history {
                self.persist(session);
            }

            if iteration < max_iterations && self.config.retry_delay_ms > 0 {
                debug!("Waiting {}ms before next iteration", self.config.retry_delay_ms);
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }
    }

    /// Steps 3-6 of one iteration. Any error here is fatal.
    async fn attempt(&self, session: &SeekSession, iteration: u32) -> Result<Attempt> {
        let summary = session.summary();
        let candidate = self
            .oracle
            .propose(session.original_code(), &session.goal, &summary)
            .await?;

        self.surface.replace_all_text(&candidate)?;

        let output = self
            .runner
            .execute(&session.validation_command, &self.project_dir)
            .await?;

        let verdict = self.classifier.verdict(&output.combined, output.exit_code);
        info!(
            iteration,
            success = verdict.is_success(),
            exit_code = ?output.exit_code,
            "Attempt classified: {}",
            verdict
        );

        Ok(Attempt::new(
            iteration,
            candidate,
            output.combined,
            output.exit_code,
            verdict.is_success(),
        ))
    }

    /// Save a snapshot. Failures are logged and never stop the loop.
    fn persist(&self, session: &mut SeekSession) {
        session.touch();
        match self.store.save(session) {
            Ok(path) => debug!("Session persisted to {}", path.display()),
            Err(e) => warn!("Failed to persist session: {}", e),
        }
    }
}

fn last_success_iteration(session: &SeekSession) -> Option<u32> {
    session.last_successful()?;
    session
        .attempts()
        .iter()
        .rev()
        .find(|a| a.success)
        .map(|a| a.iteration)
}
