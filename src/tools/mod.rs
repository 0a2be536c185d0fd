//! External tool invocation.
//!
//! The orchestrator shells out to two command-line tools:
//! - the metadata rewrite tool (`ffmpeg`), see [`crate::rewriter`]
//! - the fetch tool (`yt-dlp`), see [`crate::ingest`]
//!
//! Both are run through [`run`], which binds the child process to a
//! request-scoped [`CancellationToken`]. Cancelling the token kills the child
//! rather than just abandoning the wait.
//!
//! Install the tools:
//! - Windows: `winget install Gyan.FFmpeg yt-dlp.yt-dlp`
//! - macOS: `brew install ffmpeg yt-dlp`
//! - Linux: `apt install ffmpeg yt-dlp` or equivalent

use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Output of a tool that ran to completion (successfully or not).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// stdout followed by stderr, lossily decoded
    pub combined: String,
}

/// Why a tool invocation did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{status}")]
    Exit { status: ExitStatus, output: String },

    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    /// Convert into the application error, naming the tool.
    pub fn into_error(self, tool: &str) -> Error {
        match self {
            ToolError::Spawn(e) => Error::ToolInvocationFailed {
                tool: tool.to_string(),
                cause: format!("failed to spawn: {}", e),
                output: String::new(),
            },
            ToolError::Exit { status, output } => Error::ToolInvocationFailed {
                tool: tool.to_string(),
                cause: status.to_string(),
                output,
            },
            ToolError::Cancelled => Error::Cancelled {
                operation: tool.to_string(),
            },
        }
    }
}

/// Run `program` with `args`, optionally in `cwd`, until it exits or `cancel`
/// fires.
///
/// A non-zero exit is returned as [`ToolError::Exit`] with the captured
/// output. On cancellation the child is killed before this returns.
pub async fn run<I, S>(
    program: impl AsRef<OsStr>,
    args: I,
    cwd: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(ToolError::Spawn)?;

    // Dropping the wait future drops the child, and kill_on_drop kills it.
    let output = tokio::select! {
        output = child.wait_with_output() => output.map_err(ToolError::Spawn)?,
        _ = cancel.cancelled() => return Err(ToolError::Cancelled),
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(ToolOutput {
            status: output.status,
            combined,
        })
    } else {
        Err(ToolError::Exit {
            status: output.status,
            output: combined,
        })
    }
}

/// First line of the tool's version output (for diagnostics).
pub async fn probe_version(program: &str, version_flag: &str) -> Option<String> {
    let output = run(program, [version_flag], None, &CancellationToken::new())
        .await
        .ok()?;
    output
        .combined
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}
