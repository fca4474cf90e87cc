use std::{fmt, process::Stdio};

use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStdout, Command},
};

/// The device-authorization CLI.
pub const DEVICE_AUTH_TOOL: &str = "aws";

/// The credential-sync CLI.
pub const CREDENTIAL_SYNC_TOOL: &str = "yawsso";

/// A supervised long-lived subprocess whose stdout is consumed line by line.
///
/// The process is expected to outlive its usefulness: once the sign-in flow
/// has completed in the browser, the orchestrator kills it mid-execution.
/// That deliberate non-zero termination is not a failure, so nothing here
/// inspects the exit status.
pub struct ToolProcess {
    child: Child,
}

impl ToolProcess {
    /// Start `program` with `args`, capturing stdout.
    ///
    /// # Errors
    ///
    /// Fails only if the process cannot be started at all; preflight
    /// [`version_check`]s make that unlikely for the known tools.
    pub fn spawn(program: &str, args: &[&str]) -> Result<Self, ProcessError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                ProcessError::new(format!("failed to start '{program}': {error}"))
            })?;

        Ok(Self { child })
    }

    /// The process's stdout as a lazy sequence of lines.
    ///
    /// Lines are produced as the process flushes them; the sequence ends
    /// when the process exits or is killed. May only be taken once.
    pub fn lines(&mut self) -> Lines<BufReader<ChildStdout>> {
        let stdout = self
            .child
            .stdout
            .take()
            .expect("stdout is piped at spawn and taken once");
        BufReader::new(stdout).lines()
    }

    /// Request termination and reap the process.
    ///
    /// Safe to call after the process has already exited on its own.
    pub async fn terminate(&mut self) {
        // start_kill errors when the process is already gone.
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

/// Verify that `program` is installed and invokable.
///
/// Runs `<program> --version` once, before any profile work.
///
/// # Errors
///
/// Fails fast with a [`ToolMissingError`] if the binary is missing or exits
/// non-zero.
pub async fn version_check(program: &str) -> Result<(), ToolMissingError> {
    let status = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(ToolMissingError {
            tool: program.to_string(),
        }),
    }
}

/// Run `program` with `args` to completion.
///
/// # Errors
///
/// Fails if the process cannot be started or exits non-zero.
pub async fn run_to_completion(program: &str, args: &[&str]) -> Result<(), ProcessError> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|error| ProcessError::new(format!("failed to start '{program}': {error}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(ProcessError::new(format!(
            "'{program}' exited with {status}"
        )))
    }
}

/// An error starting or running a subprocess.
///
/// The error message should be sufficient to aid end-user debugging.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct ProcessError(String);

impl ProcessError {
    pub(crate) fn new(error: impl Into<String>) -> Self {
        Self(error.into())
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ProcessError {}

/// An error indicating that a required external command is not invokable.
#[derive(Debug)]
pub struct ToolMissingError {
    /// The command that could not be run.
    pub tool: String,
}

impl fmt::Display for ToolMissingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "required tool '{}' was not found; check that it is installed and on PATH",
            self.tool
        )
    }
}

impl std::error::Error for ToolMissingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_check_fails_for_missing_tool() {
        let error = version_check("definitely-not-an-installed-tool")
            .await
            .unwrap_err();
        assert_eq!(error.tool, "definitely-not-an-installed-tool");
    }

    #[tokio::test]
    async fn version_check_fails_for_a_tool_exiting_non_zero() {
        assert!(version_check("false").await.is_err());
    }

    #[tokio::test]
    async fn version_check_passes_for_an_invokable_tool() {
        version_check("echo").await.unwrap();
    }

    #[tokio::test]
    async fn spawned_process_streams_lines() {
        let mut process = ToolProcess::spawn("echo", &["first\nsecond"]).unwrap();
        let mut lines = process.lines();

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap(), None);

        // Process already exited; terminate must still be safe.
        process.terminate().await;
    }

    #[tokio::test]
    async fn terminate_stops_a_running_process() {
        let mut process = ToolProcess::spawn("sleep", &["60"]).unwrap();
        process.terminate().await;
    }
}
