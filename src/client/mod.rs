//! Client abstraction over execution environments.
//!
//! Every transport implements the [`Client`] trait. A client is created per
//! request by a [`ClientFactory`], driven through its lifecycle by
//! [`ManagedClient`], and dropped when the request completes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ ClientFactory   │  ← Maps descriptor `type` to a transport
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  ManagedClient  │  ← Enforces connect → use → disconnect
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   dyn Client    │  ← Common interface
//! └────────┬────────┘
//!          │
//!   ┌──────┬──────┬───────┐
//!   ▼      ▼      ▼       ▼
//! local   ssh   docker  kubectl
//! ```

pub mod action;
pub mod descriptor;
pub mod docker;
pub mod error;
pub mod factory;
pub mod kubectl;
pub mod lifecycle;
pub mod local;
mod probe;
mod process;
pub mod ssh;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use descriptor::{ConnectionDescriptor, TransportKind};
pub use error::{ClientError, ClientResult, ErrorKind, ErrorPayload};
pub use factory::{ClientFactory, TransportDefaults, TransportFactory};
pub use lifecycle::ManagedClient;

/// Capabilities every transport provides.
///
/// Implementations hold the descriptor they were built from and whatever
/// session state they need. Callers go through [`ManagedClient`], which
/// guarantees the methods are invoked in lifecycle order.
#[async_trait]
pub trait Client: Send {
    /// Which transport this client talks through.
    fn transport(&self) -> TransportKind;

    /// The descriptor this client was built from. Valid in every state.
    fn connection(&self) -> &ConnectionDescriptor;

    /// Establish the session.
    async fn connect(&mut self) -> ClientResult<()>;

    /// Prepare the environment after connecting.
    async fn setup(&mut self) -> ClientResult<()> {
        Ok(())
    }

    /// Run an opaque script and return its raw stdout.
    async fn execute(&mut self, code: &str) -> ClientResult<String>;

    /// Run a named, transport-defined operation.
    async fn action(&mut self, action: &str, data: &Value) -> ClientResult<Value>;

    /// Snapshot of environment metadata.
    async fn info(&mut self) -> ClientResult<Value>;

    /// Release session resources. Must tolerate never having connected.
    async fn disconnect(&mut self) -> ClientResult<()>;
}

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Raw stdout, decoded only on demand
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, when the transport reports one
    pub exit_code: Option<i64>,
    pub success: bool,
}

impl CommandOutput {
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i64>) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            success: exit_code.unwrap_or(0) == 0,
        }
    }

    /// Return stdout as text, or an execution error built from stderr.
    pub fn into_stdout(self) -> ClientResult<String> {
        self.into_stdout_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Like [`CommandOutput::into_stdout`], without decoding.
    pub fn into_stdout_bytes(self) -> ClientResult<Vec<u8>> {
        if self.success {
            return Ok(self.stdout);
        }

        let stderr = String::from_utf8_lossy(&self.stderr);
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&self.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };

        Err(ClientError::execution(match self.exit_code {
            Some(code) => format!("Command exited with status {}: {}", code, detail),
            None => format!("Command failed: {}", detail),
        }))
    }
}

/// Quote a string for POSIX `sh`.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Prefix a script with `cd` into the working directory, if one is set.
pub(crate) fn in_workdir(workdir: Option<&str>, code: &str) -> String {
    match workdir {
        Some(dir) => format!("cd {} && {}", shell_quote(dir), code),
        None => code.to_string(),
    }
}

/// Resolve a per-connection timeout override against a default.
pub(crate) fn resolve_timeout(value: Option<&str>, default: Duration) -> ClientResult<Duration> {
    match value {
        Some(raw) => crate::config::parse_duration(raw).ok_or_else(|| {
            ClientError::configuration(format!(
                "Invalid timeout '{}'. Use format like '30s', '5m', or '300'",
                raw
            ))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput::new(b"hello".to_vec(), Vec::new(), Some(0));
        assert!(output.success);
        assert_eq!(output.into_stdout().unwrap(), "hello");
    }

    #[test]
    fn test_command_output_failure_uses_stderr() {
        let output = CommandOutput::new(Vec::new(), b"no such file\n".to_vec(), Some(2));
        assert!(!output.success);
        let err = output.into_stdout().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(
            err.to_string(),
            "Execution failed: Command exited with status 2: no such file"
        );
    }

    #[test]
    fn test_command_output_keeps_raw_bytes() {
        let output = CommandOutput::new(vec![0xff, b'a', 0xfe], Vec::new(), Some(0));
        assert_eq!(output.clone().into_stdout_bytes().unwrap(), vec![0xff, b'a', 0xfe]);
        assert_eq!(output.into_stdout().unwrap(), "\u{fffd}a\u{fffd}");
    }

    #[test]
    fn test_command_output_missing_exit_code_counts_as_success() {
        let output = CommandOutput::new(b"ok".to_vec(), Vec::new(), None);
        assert!(output.success);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_in_workdir() {
        assert_eq!(in_workdir(None, "ls"), "ls");
        assert_eq!(in_workdir(Some("/srv/app"), "ls"), "cd '/srv/app' && ls");
    }

    #[test]
    fn test_resolve_timeout() {
        let default = Duration::from_secs(10);
        assert_eq!(resolve_timeout(None, default).unwrap(), default);
        assert_eq!(
            resolve_timeout(Some("2m"), default).unwrap(),
            Duration::from_secs(120)
        );
        assert!(resolve_timeout(Some("soon"), default)
            .unwrap_err()
            .is_configuration());
    }
}
