//! Shared handling for native dump utilities (mysqldump, pg_dump)

use crate::error::{BackupError, ErrorKind};
use crate::utils::command::{CommandSpec, ExecError};
use crate::utils::executor::CommandExecutor;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Map a subprocess facility error onto the backup error kinds
pub fn exec_error(err: ExecError) -> BackupError {
    let kind = match err {
        ExecError::NotFound(_) => ErrorKind::ToolNotFound,
        ExecError::TimedOut { .. } => ErrorKind::Timeout,
        ExecError::Spawn { .. } | ExecError::Output { .. } => ErrorKind::Io,
    };
    BackupError::new(kind, err.to_string())
}

/// Run a dump utility with stdout streamed into `output`
///
/// Any failure removes the partial file. A zero exit status with an empty
/// file is treated as a failure: some client versions exit 0 after a
/// rejected login.
pub fn run_dump(
    executor: &dyn CommandExecutor,
    spec: CommandSpec,
    output: &Path,
) -> Result<(), BackupError> {
    let result = execute(executor, spec.stdout_to_file(output), output);

    if result.is_err() && output.exists() {
        if let Err(e) = fs::remove_file(output) {
            warn!("Failed to remove partial dump {:?}: {}", output, e);
        }
    }

    result
}

fn execute(
    executor: &dyn CommandExecutor,
    spec: CommandSpec,
    output: &Path,
) -> Result<(), BackupError> {
    let program = spec.program.clone();
    let outcome = executor.execute(&spec).map_err(exec_error)?;

    if !outcome.success() {
        let message = match outcome.exit_code {
            Some(_) => outcome.stderr.clone(),
            None => format!("{} was terminated by a signal: {}", program, outcome.stderr),
        };
        return Err(BackupError::from_client_output(ErrorKind::Connection, &message));
    }

    let size = fs::metadata(output)
        .map_err(|e| BackupError::io("dump output missing", e))?
        .len();

    if size == 0 {
        let mut message = format!(
            "{} exited successfully but produced no output (possible silent authentication failure)",
            program
        );
        if !outcome.stderr.trim().is_empty() {
            message.push_str(": ");
            message.push_str(outcome.stderr.trim());
        }
        return Err(BackupError::new(ErrorKind::Auth, message));
    }

    Ok(())
}
