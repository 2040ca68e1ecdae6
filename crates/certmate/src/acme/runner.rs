//! External ACME client invocation

use std::fmt::Debug;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

/// Captured result of one ACME client run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Process exit code, if it exited normally
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    /// Whether the client reported success (exit code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Diagnostic text for a failed run: stderr, or stdout when stderr is
    /// empty
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Why a run produced no output
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("killed after {0:?}")]
    Timeout(Duration),
}

/// Runs the ACME client with a prepared argument list
#[async_trait]
pub trait AcmeRunner: Send + Sync + Debug {
    /// Program name, for logs and errors
    fn program(&self) -> &str;

    /// Run to completion and capture its output
    async fn run(&self, args: &[String]) -> Result<RunOutput, RunError>;
}

/// [`AcmeRunner`] that spawns certbot
#[derive(Debug, Clone)]
pub struct CertbotRunner {
    program: String,
    timeout: Option<Duration>,
}

impl CertbotRunner {
    /// Runner for the given executable, without a timeout
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill the client if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AcmeRunner for CertbotRunner {
    fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: &[String]) -> Result<RunOutput, RunError> {
        debug!(program = %self.program, subcommand = ?args.first(), "Starting ACME client");
        trace!(program = %self.program, ?args, "ACME client arguments");

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_err = |source| RunError::Spawn {
            program: self.program.clone(),
            source,
        };

        // Dropping the output future on timeout drops the child, which kills it
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| RunError::Timeout(limit))?
                .map_err(spawn_err)?,
            None => command.output().await.map_err(spawn_err)?,
        };

        let result = RunOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(program = %self.program, code = ?result.code, "ACME client exited");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = RunOutput {
            code: Some(1),
            stdout: "stdout text".to_string(),
            stderr: "  Some challenges have failed.\n".to_string(),
        };
        assert!(!output.success());
        assert_eq!(output.diagnostic(), "Some challenges have failed.");

        let output = RunOutput {
            code: Some(1),
            stdout: "only stdout\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.diagnostic(), "only stdout");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = CertbotRunner::new("/nonexistent/certbot-binary");
        let err = runner.run(&["--version".to_string()]).await.unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_exit_code_and_output() {
        let runner = CertbotRunner::new("sh");
        let output = runner
            .run(&["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.diagnostic(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_client() {
        let runner = CertbotRunner::new("sleep").with_timeout(Some(Duration::from_millis(100)));
        let err = runner.run(&["5".to_string()]).await.unwrap_err();
        assert!(matches!(err, RunError::Timeout(_)));
    }
}
