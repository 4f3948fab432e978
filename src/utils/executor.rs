//! Command execution abstraction for testability
//!
//! Generators talk to dump utilities and `sqlcmd` through this trait so tests
//! can substitute canned responses for real subprocesses.

use super::command::{CommandOutput, CommandSpec, ExecError};

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        super::command::run_command(spec)
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use crate::utils::command::StdoutTarget;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub env: Vec<(String, String)>,
        pub timeout: Option<Duration>,
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String, stderr: String },
        Failure { stderr: String, exit_code: i32 },
        Timeout,
        NotFound,
    }

    impl MockResponse {
        pub fn stdout(stdout: &str) -> Self {
            MockResponse::Success {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }
        }

        pub fn failure(exit_code: i32, stderr: &str) -> Self {
            MockResponse::Failure {
                stderr: stderr.to_string(),
                exit_code,
            }
        }
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }

    #[derive(Clone, Debug)]
    struct Rule {
        program: String,
        /// Substring one of the arguments must contain; `None` matches any call
        arg_contains: Option<String>,
        response: MockResponse,
    }

    /// Mock executor for testing
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Rules checked in insertion order
        rules: Arc<Mutex<Vec<Rule>>>,
        /// Default response when no rule matches
        default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a specific program
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.rules.lock().push(Rule {
                program: program.to_string(),
                arg_contains: None,
                response,
            });
            self
        }

        /// Configure a response for calls whose arguments contain `needle`
        pub fn expect_matching(self, program: &str, needle: &str, response: MockResponse) -> Self {
            self.rules.lock().push(Rule {
                program: program.to_string(),
                arg_contains: Some(needle.to_string()),
                response,
            });
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().clone()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.calls.lock().iter().any(|c| c.program == program)
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        fn response_for(&self, spec: &CommandSpec) -> MockResponse {
            let rules = self.rules.lock();
            rules
                .iter()
                .find(|rule| {
                    rule.program == spec.program
                        && rule
                            .arg_contains
                            .as_ref()
                            .map(|needle| spec.args.iter().any(|a| a.contains(needle.as_str())))
                            .unwrap_or(true)
                })
                .map(|rule| rule.response.clone())
                .unwrap_or_else(|| self.default_response.lock().clone())
        }
    }

    impl CommandExecutor for MockExecutor {
        fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
            self.calls.lock().push(CommandCall {
                program: spec.program.clone(),
                args: spec.args.clone(),
                env: spec.env.clone(),
                timeout: spec.timeout,
            });

            let (exit_code, stdout, stderr) = match self.response_for(spec) {
                MockResponse::Success { stdout, stderr } => (0, stdout, stderr),
                MockResponse::Failure { stderr, exit_code } => (exit_code, String::new(), stderr),
                MockResponse::Timeout => {
                    return Err(ExecError::TimedOut {
                        program: spec.program.clone(),
                        timeout: spec.timeout.unwrap_or_default(),
                    })
                }
                MockResponse::NotFound => return Err(ExecError::NotFound(spec.program.clone())),
            };

            let stdout = match spec.stdout {
                StdoutTarget::Capture => stdout.into_bytes(),
                StdoutTarget::File(ref path) => {
                    std::fs::write(path, stdout.as_bytes()).map_err(|source| {
                        ExecError::Output {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    Vec::new()
                }
            };

            Ok(CommandOutput {
                exit_code: Some(exit_code),
                stdout,
                stderr,
            })
        }
    }
}
