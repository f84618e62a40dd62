//! Success/failure classification of validation command output.
//!
//! Rules are evaluated in order and the first one that decides wins:
//!
//! 1. exit code check (non-zero or missing exit code fails)
//! 2. error patterns (any match fails, even on a zero exit code)
//! 3. success patterns (when configured, one must match)
//! 4. otherwise success
//!
//! Patterns come from user configuration, so they are compiled
//! case-insensitively and a pattern that fails to compile is logged and
//! skipped instead of aborting classification.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SeekConfig;

/// The rule that decided a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "detail")]
pub enum Verdict {
    /// Exit code was non-zero (or missing) and exit codes are checked.
    ExitCode(Option<i32>),
    /// An error pattern matched the output.
    ErrorPattern(String),
    /// A configured success pattern matched.
    SuccessPattern(String),
    /// Success patterns are configured but none matched.
    NoSuccessPattern,
    /// Nothing objected to the run.
    Clean,
}

impl Verdict {
    /// Whether this verdict counts as a successful run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::SuccessPattern(_) | Self::Clean)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExitCode(Some(code)) => write!(f, "exit code {code}"),
            Self::ExitCode(None) => write!(f, "terminated without exit code"),
            Self::ErrorPattern(p) => write!(f, "error pattern /{p}/ matched"),
            Self::SuccessPattern(p) => write!(f, "success pattern /{p}/ matched"),
            Self::NoSuccessPattern => write!(f, "no success pattern matched"),
            Self::Clean => write!(f, "clean run"),
        }
    }
}

/// Compiled classification rules.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    check_exit_code: bool,
    error_patterns: Vec<Regex>,
    success_patterns: Vec<Regex>,
}

impl OutcomeClassifier {
    /// Compile a classifier from raw pattern lists.
    #[must_use]
    pub fn new<S: AsRef<str>>(
        success_patterns: &[S],
        error_patterns: &[S],
        check_exit_code: bool,
    ) -> Self {
        Self {
            check_exit_code,
            error_patterns: compile_patterns(error_patterns, "error"),
            success_patterns: compile_patterns(success_patterns, "success"),
        }
    }

    /// Compile a classifier from the loop configuration.
    #[must_use]
    pub fn from_config(config: &SeekConfig) -> Self {
        Self::new(
            config.success_patterns.as_slice(),
            config.error_patterns.as_slice(),
            config.check_exit_code,
        )
    }

    /// Number of usable error patterns after compilation.
    #[must_use]
    pub fn error_pattern_count(&self) -> usize {
        self.error_patterns.len()
    }

    /// Number of usable success patterns after compilation.
    #[must_use]
    pub fn success_pattern_count(&self) -> usize {
        self.success_patterns.len()
    }

    /// Decide the outcome of a run and report which rule decided it.
    #[must_use]
    pub fn verdict(&self, output: &str, exit_code: Option<i32>) -> Verdict {
        if self.check_exit_code && exit_code != Some(0) {
            return Verdict::ExitCode(exit_code);
        }

        if let Some(re) = self.error_patterns.iter().find(|re| re.is_match(output)) {
            return Verdict::ErrorPattern(re.as_str().to_string());
        }

        if self.success_patterns.is_empty() {
            return Verdict::Clean;
        }

        match self.success_patterns.iter().find(|re| re.is_match(output)) {
            Some(re) => Verdict::SuccessPattern(re.as_str().to_string()),
            None => Verdict::NoSuccessPattern,
        }
    }

    /// Boolean classification of a run.
    #[must_use]
    pub fn classify(&self, output: &str, exit_code: Option<i32>) -> bool {
        self.verdict(output, exit_code).is_success()
    }
}

/// Classify a run directly against a configuration.
#[must_use]
pub fn classify(output: &str, exit_code: Option<i32>, config: &SeekConfig) -> bool {
    OutcomeClassifier::from_config(config).classify(output, exit_code)
}

fn compile_patterns<S: AsRef<str>>(patterns: &[S], kind: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            let pattern = pattern.as_ref();
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Skipping invalid {} pattern '{}': {}", kind, pattern, e);
                    None
                }
            }
        })
        .collect()
}
