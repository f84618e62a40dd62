//! seekloop - iterative fix-until-it-passes automation
//!
//! Given a piece of code, a natural-language goal and a validation command,
//! seekloop repeatedly asks a language model for a modified version, installs
//! it, runs the command and classifies the output until the command passes,
//! the iteration cap is hit, or the user pauses.
//!
//! # Architecture
//!
//! - [`runner`] - Validation command execution
//! - [`classify`] - Success/failure classification of command output
//! - [`attempt`] - Attempt records and rolling summaries
//! - [`oracle`] - Candidate generation through a chat completion service
//! - [`surface`] - The text buffer being fixed
//! - [`session`] - Persisted session state, snapshot store and pause handling
//! - [`engine`] - The seek loop state machine
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use seekloop::{FileSurface, SeekConfig, SeekEngine, TerminalOutcome};
//!
//! let config = SeekConfig::load(".")?;
//! let surface = Arc::new(FileSurface::new("src/calc.py"));
//! let mut engine = SeekEngine::from_config(config, ".", surface)?;
//!
//! match engine.run("make add() return the sum", "pytest -q").await? {
//!     TerminalOutcome::Succeeded { iteration } => println!("fixed in {iteration}"),
//!     other => println!("stopped: {other:?}"),
//! }
//! ```

pub mod attempt;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod runner;
pub mod session;
pub mod surface;

// Re-export commonly used types
pub use error::{Result, SeekError};

pub use attempt::{summarize, Attempt, AttemptSummary, SuccessSnapshot, SUMMARY_WINDOW};
pub use classify::{classify, OutcomeClassifier, Verdict};
pub use config::SeekConfig;
pub use engine::{EngineState, SeekEngine, TerminalOutcome};
pub use oracle::{ChatBackend, FixOracle, MockChatBackend, OpenAiBackend, OracleError};
pub use runner::{CommandOutput, CommandRunner, ShellCommandRunner};
pub use session::{PauseHandle, SeekSession, SessionStore, SnapshotEntry};
pub use surface::{EditingSurface, FileSurface, MemorySurface};
