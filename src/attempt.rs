//! Attempt records and the rolling summary fed back to the oracle.
//!
//! The summary is advisory context only; the loop's continue/stop decision
//! never looks at it.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Number of recent attempts carried into the oracle prompt.
pub const SUMMARY_WINDOW: usize = 3;

/// One iteration's candidate code, captured output and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based iteration number that produced this attempt.
    pub iteration: u32,
    /// Candidate code installed for this iteration.
    pub code: String,
    /// Combined output, stdout then stderr.
    pub output: String,
    /// Exit code of the validation command, if it reported one.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// When the attempt was recorded.
    pub timestamp: DateTime<Utc>,
    /// Classification result.
    pub success: bool,
}

impl Attempt {
    /// Create an attempt stamped with the current time.
    #[must_use]
    pub fn new(
        iteration: u32,
        code: impl Into<String>,
        output: impl Into<String>,
        exit_code: Option<i32>,
        success: bool,
    ) -> Self {
        Self {
            iteration,
            code: code.into(),
            output: output.into(),
            exit_code,
            timestamp: Utc::now(),
            success,
        }
    }

    /// Compact one-line fingerprint of this attempt's output.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        error_fingerprint(&self.output)
    }
}

/// Snapshot of the most recent successful attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessSnapshot {
    pub code: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Attempt> for SuccessSnapshot {
    fn from(attempt: &Attempt) -> Self {
        Self {
            code: attempt.code.clone(),
            output: attempt.output.clone(),
            timestamp: attempt.timestamp,
        }
    }
}

/// Bounded view of prior attempts for prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    /// One entry per recent attempt, oldest first.
    pub recent: Vec<RecentAttempt>,
    /// Successes over all attempts so far, in `0.0..=1.0`.
    pub success_rate: f64,
    /// Number of attempts the rate was computed over.
    pub total: usize,
}

/// A single recent attempt reduced to its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAttempt {
    pub iteration: u32,
    pub success: bool,
    pub excerpt: String,
}

impl AttemptSummary {
    /// True when there is nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Render the summary as prompt text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!(
            "Previous attempts: {} (success rate {:.0}%)\n",
            self.total,
            self.success_rate * 100.0
        );
        for recent in &self.recent {
            let status = if recent.success { "passed" } else { "failed" };
            text.push_str(&format!(
                "- Attempt {} {}: {}\n",
                recent.iteration, status, recent.excerpt
            ));
        }
        text
    }
}

/// Summarize the most recent `window` attempts plus the overall success rate.
#[must_use]
pub fn summarize(attempts: &[Attempt], window: usize) -> AttemptSummary {
    let start = attempts.len().saturating_sub(window);
    let recent = attempts[start..]
        .iter()
        .map(|a| RecentAttempt {
            iteration: a.iteration,
            success: a.success,
            excerpt: a.fingerprint(),
        })
        .collect();

    AttemptSummary {
        recent,
        success_rate: success_rate(attempts),
        total: attempts.len(),
    }
}

/// Fraction of successful attempts; 0 when there are none.
#[must_use]
pub fn success_rate(attempts: &[Attempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    let successes = attempts.iter().filter(|a| a.success).count();
    successes as f64 / attempts.len() as f64
}

fn error_line_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(error|failed|failure|exception|panicked|fatal)\b").ok()
        })
        .as_ref()
}

/// First output line that looks like an error.
///
/// Falls back to the first non-empty line, or `(no output)`.
#[must_use]
pub fn error_fingerprint(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| error_line_pattern().is_some_and(|re| re.is_match(line)))
        .or_else(|| output.lines().map(str::trim).find(|line| !line.is_empty()))
        .map_or_else(|| "(no output)".to_string(), str::to_string)
}
