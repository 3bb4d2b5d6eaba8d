//! Subprocess execution shared by the local and kubectl transports.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::{ClientError, ClientResult};
use super::CommandOutput;

/// One process invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            stdin: None,
            timeout,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }
}

/// Spawn the process, feed stdin, and collect its output.
///
/// Feeding stdin and waiting share one timeout. The child is killed if it
/// elapses.
pub async fn run(spec: ProcessSpec) -> ClientResult<CommandOutput> {
    let ProcessSpec {
        program,
        args,
        cwd,
        env,
        stdin,
        timeout,
    } = spec;
    let name = program.display().to_string();

    let mut command = Command::new(&program);
    command
        .args(&args)
        .envs(&env)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &cwd {
        command.current_dir(dir);
    }

    tracing::debug!("Spawning {} {:?}", name, args);

    let mut child = command
        .spawn()
        .map_err(|e| ClientError::execution(format!("Failed to spawn {}: {}", name, e)))?;

    let pipe = child.stdin.take();
    let feed = async move {
        let (Some(mut pipe), Some(input)) = (pipe, stdin) else {
            return Ok(());
        };
        match pipe.write_all(&input).await {
            // Child exited without reading all of it
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!("Child closed stdin before reading all input");
                Ok(())
            }
            // Dropping the pipe signals EOF
            other => other,
        }
    };

    let (fed, output) = tokio::time::timeout(timeout, async move {
        tokio::join!(feed, child.wait_with_output())
    })
    .await
    .map_err(|_| ClientError::timeout(name.clone(), timeout))?;

    fed.map_err(|e| ClientError::execution(format!("Failed to write stdin of {}: {}", name, e)))?;
    let output =
        output.map_err(|e| ClientError::execution(format!("Failed to wait for {}: {}", name, e)))?;

    Ok(CommandOutput::new(
        output.stdout,
        output.stderr,
        output.status.code().map(i64::from),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let spec = ProcessSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo hello"]);
        let output = run(spec).await.unwrap();
        assert!(output.success);
        assert_eq!(output.into_stdout().unwrap().trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let spec = ProcessSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo oops >&2; exit 3"]);
        let output = run(spec).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
    }

    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let spec = ProcessSpec::new("cat", Duration::from_secs(5)).stdin(b"piped".to_vec());
        let output = run(spec).await.unwrap();
        assert_eq!(output.stdout, b"piped");
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let spec = ProcessSpec::new("sh", Duration::from_millis(100)).args(["-c", "sleep 5"]);
        let err = run(spec).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_timeout_covers_unread_stdin() {
        // Larger than any pipe buffer, and the child never reads it
        let spec = ProcessSpec::new("sh", Duration::from_millis(200))
            .args(["-c", "sleep 5"])
            .stdin(vec![b'x'; 1 << 20]);

        let started = std::time::Instant::now();
        let err = run(spec).await.unwrap_err();

        assert!(matches!(err, ClientError::Timeout { .. }), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_run_child_ignoring_stdin_still_reports_output() {
        let spec = ProcessSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo done"])
            .stdin(vec![b'x'; 1 << 20]);
        let output = run(spec).await.unwrap();
        assert_eq!(output.into_stdout().unwrap().trim(), "done");
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let spec = ProcessSpec::new("/nonexistent/ferry-test-binary", Duration::from_secs(1));
        let err = run(spec).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
