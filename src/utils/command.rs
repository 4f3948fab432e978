//! Utilities for running commands with proper error handling and timeouts

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tracing::debug;

/// Where a command's stdout goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    /// Buffer it in `CommandOutput::stdout`
    Capture,
    /// Stream it straight into a file (created or truncated)
    File(PathBuf),
}

/// A subprocess invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment; values are never logged
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdout: StdoutTarget,
}

impl CommandSpec {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            timeout: None,
            stdout: StdoutTarget::Capture,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdout_to_file(mut self, path: &Path) -> Self {
        self.stdout = StdoutTarget::File(path.to_path_buf());
        self
    }
}

/// Result of a finished subprocess
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Empty when stdout was redirected to a file
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("tool {0} is not installed")]
    NotFound(String),

    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("Failed to open output file {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion, killing it if the timeout expires
///
/// A non-zero exit status is not an error here; callers decide what it means.
pub fn run_command(spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
    let program_path =
        which::which(&spec.program).map_err(|_| ExecError::NotFound(spec.program.clone()))?;

    let mut cmd = tokio::process::Command::new(&program_path);
    cmd.args(&spec.args);
    cmd.stdin(Stdio::null());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    if let Some(ref dir) = spec.working_dir {
        cmd.current_dir(dir);
    }

    match spec.stdout {
        StdoutTarget::Capture => {
            cmd.stdout(Stdio::piped());
        }
        StdoutTarget::File(ref path) => {
            let file = File::create(path).map_err(|source| ExecError::Output {
                path: path.clone(),
                source,
            })?;
            cmd.stdout(Stdio::from(file));
        }
    }

    debug!(
        "Running command: {} {} (env: {})",
        spec.program,
        spec.args.join(" "),
        spec.env
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    let future = wait_for(cmd, spec.program.clone(), spec.timeout);

    let output = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(future)?,
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| ExecError::Spawn {
                program: spec.program.clone(),
                source,
            })?
            .block_on(future)?,
    };

    if !output.success() {
        debug!(
            "Command {} exited with {:?}: {}",
            spec.program,
            output.exit_code,
            output.stderr.trim()
        );
    }

    Ok(output)
}

async fn wait_for(
    mut cmd: tokio::process::Command,
    program: String,
    timeout: Option<Duration>,
) -> Result<CommandOutput, ExecError> {
    let child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Dropping the future drops the child, and kill_on_drop terminates it
    let wait = child.wait_with_output();

    let output = match timeout {
        Some(timeout_duration) => tokio::time::timeout(timeout_duration, wait)
            .await
            .map_err(|_| ExecError::TimedOut {
                program: program.clone(),
                timeout: timeout_duration,
            })?,
        None => wait.await,
    };

    output
        .map(CommandOutput::from)
        .map_err(|source| ExecError::Spawn { program, source })
}
