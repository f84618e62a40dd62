//! Validation command execution.
//!
//! Commands run through the platform shell so users can pass pipelines and
//! `&&` chains. Stdout and stderr are drained concurrently to avoid pipe
//! deadlocks and joined stdout-first once the process exits.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::{Result, SeekError};

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Stdout then stderr, joined by a line break.
    pub combined: String,
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Build an output record from separate streams.
    #[must_use]
    pub fn from_streams(stdout: &str, stderr: &str, exit_code: Option<i32>) -> Self {
        Self {
            combined: join_streams(stdout, stderr),
            exit_code,
        }
    }
}

/// Abstraction over running the validation command.
///
/// Spawn failures are errors ([`SeekError::Spawn`]); a command that runs and
/// exits non-zero is a normal [`CommandOutput`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `cwd` and wait for it to finish.
    async fn execute(&self, command: &str, cwd: &Path) -> Result<CommandOutput>;
}

/// Runs commands through `sh -c` (or `cmd /C` on Windows).
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the shell invocation.
    ///
    /// On Unix the child gets its own process group so a terminal Ctrl-C
    /// reaches only seekloop, which turns it into a pause request while the
    /// command runs to completion.
    fn shell_command(command: &str) -> AsyncCommand {
        #[cfg(windows)]
        {
            let mut cmd = std::process::Command::new("cmd");
            cmd.args(["/C", command]);
            AsyncCommand::from(cmd)
        }
        #[cfg(not(windows))]
        {
            use std::os::unix::process::CommandExt;

            let mut cmd = std::process::Command::new("sh");
            cmd.args(["-c", command]).process_group(0);
            AsyncCommand::from(cmd)
        }
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn execute(&self, command: &str, cwd: &Path) -> Result<CommandOutput> {
        debug!("Running validation command `{}` in {}", command, cwd.display());

        let spawn_error = |source: std::io::Error| SeekError::Spawn {
            command: command.to_string(),
            source,
        };

        if !cwd.is_dir() {
            return Err(spawn_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("working directory {} does not exist", cwd.display()),
            )));
        }

        let mut child = Self::shell_command(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(spawn_error)?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                out.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(err) = stderr.as_mut() {
                err.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (stdout_buf, stderr_buf) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;

        let output = CommandOutput::from_streams(
            &String::from_utf8_lossy(&stdout_buf),
            &String::from_utf8_lossy(&stderr_buf),
            status.code(),
        );

        debug!(
            "Validation command finished with {:?} ({} bytes of output)",
            output.exit_code,
            output.combined.len()
        );
        Ok(output)
    }
}

/// Join stdout and stderr with a single line break between them.
fn join_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => {
            if stdout.ends_with('\n') {
                format!("{stdout}{stderr}")
            } else {
                format!("{stdout}\n{stderr}")
            }
        }
    }
}
