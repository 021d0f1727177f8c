//! Subprocess execution seam for the dial tools

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::{Error, Result};

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit status was zero
    pub success: bool,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

/// Runs external programs with a deadline
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, killing it if `timeout` elapses
    ///
    /// Spawn failures and timeouts are [`Error::ExternalTool`]; a non-zero exit
    /// is a successful call with `success == false`.
    async fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| {
                Error::ExternalTool(format!(
                    "{} timed out after {}s",
                    program.display(),
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                Error::ExternalTool(format!("Failed to execute {}: {}", program.display(), e))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Resolve a dial tool: explicit path, else a PATH lookup, else the bare name
///
/// An unresolved tool still yields a path so that the failure surfaces when
/// the gate is acquired rather than at startup.
pub(crate) fn resolve_tool(explicit: Option<&Path>, name: &str, search_path: bool) -> std::path::PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if search_path {
        match which::which(name) {
            Ok(path) => return path,
            Err(_) => tracing::warn!(tool = name, "dial tool not found in PATH"),
        }
    }
    std::path::PathBuf::from(name)
}
