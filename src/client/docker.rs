//! Docker transport.
//!
//! Executes commands inside an existing container through the Docker exec
//! API (bollard). The container must already be running; ferry never
//! creates or starts containers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use bollard::container::LogOutput;
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::ContainerInspectResponse;
use bollard::Docker;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{
    to_result, ActionKind, FileContent, FileWritten, PathArgs, PingResult, WriteFileArgs,
};
use super::descriptor::{ConnectionDescriptor, TransportKind};
use super::error::{ClientError, ClientResult};
use super::factory::TransportDefaults;
use super::probe::{SystemProbe, PROBE_SCRIPT};
use super::{resolve_timeout, shell_quote, Client, CommandOutput};

const SUPPORTED_ACTIONS: &[ActionKind] = &[
    ActionKind::Ping,
    ActionKind::Status,
    ActionKind::ReadFile,
    ActionKind::WriteFile,
];

/// Seconds bollard waits on the daemon per API call
const DAEMON_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Deserialize)]
struct DockerParams {
    container: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    docker_host: Option<String>,
    #[serde(default)]
    timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerStatus {
    pub id: Option<String>,
    pub name: Option<String>,
    pub running: bool,
    pub state: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DockerInfo {
    pub transport: TransportKind,
    pub id: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub created: Option<String>,
    pub platform: Option<String>,
    pub state: Value,
    pub system: SystemProbe,
    pub collected_at: String,
}

pub struct DockerClient {
    connection: ConnectionDescriptor,
    container: String,
    user: Option<String>,
    workdir: Option<String>,
    docker_host: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
    docker: Option<Docker>,
}

impl DockerClient {
    pub fn new(connection: ConnectionDescriptor, defaults: &TransportDefaults) -> ClientResult<Self> {
        let params: DockerParams = connection.params()?;
        if params.container.trim().is_empty() {
            return Err(ClientError::configuration("Docker container must not be empty"));
        }

        Ok(Self {
            container: params.container,
            user: params.user,
            workdir: params.workdir,
            docker_host: params.docker_host,
            timeout: resolve_timeout(params.timeout.as_deref(), defaults.command_timeout)?,
            connect_timeout: defaults.connect_timeout,
            connection,
            docker: None,
        })
    }

    fn open_daemon(&self) -> ClientResult<Docker> {
        let result = match self.docker_host.as_deref() {
            None => Docker::connect_with_socket_defaults(),
            Some(host) if host.starts_with("unix://") => Docker::connect_with_socket(
                host.trim_start_matches("unix://"),
                DAEMON_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Some(host) => {
                Docker::connect_with_http(host, DAEMON_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
        };

        result.map_err(|e| ClientError::connection(format!("Failed to connect to Docker: {}", e)))
    }

    fn docker(&self) -> ClientResult<&Docker> {
        self.docker.as_ref().ok_or_else(|| {
            ClientError::execution(format!("Not connected to container {}", self.container))
        })
    }

    async fn inspect(&self, docker: &Docker) -> ClientResult<ContainerInspectResponse> {
        docker
            .inspect_container(&self.container, None)
            .await
            .map_err(|e| match e {
                DockerError::DockerResponseServerError {
                    status_code: 404, ..
                } => ClientError::connection(format!("Container {} not found", self.container)),
                other => ClientError::connection(format!(
                    "Failed to inspect container {}: {}",
                    self.container, other
                )),
            })
    }

    /// Execute a non-interactive command and capture its output.
    async fn exec(&self, cmd: &str, workdir: Option<&str>) -> ClientResult<CommandOutput> {
        let docker = self.docker()?;

        let exec = docker
            .create_exec(
                &self.container,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", cmd]),
                    user: self.user.as_deref(),
                    working_dir: workdir,
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ClientError::execution(format!("Failed to create exec: {}", e)))?;

        let output = docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(|e| ClientError::execution(format!("Failed to start exec: {}", e)))?;

        let (stdout, stderr) = match output {
            StartExecResults::Attached { mut output, .. } => {
                let mut stdout = Vec::new();
                let mut stderr = Vec::new();

                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message }) => stdout.extend(message),
                        Ok(LogOutput::StdErr { message }) => stderr.extend(message),
                        Ok(_) => {}
                        Err(e) => {
                            return Err(ClientError::execution(format!(
                                "Error reading exec output: {}",
                                e
                            )));
                        }
                    }
                }

                (stdout, stderr)
            }
            StartExecResults::Detached => {
                return Err(ClientError::execution("Unexpected detached exec"));
            }
        };

        let inspect = docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| ClientError::execution(format!("Failed to inspect exec: {}", e)))?;

        Ok(CommandOutput::new(stdout, stderr, inspect.exit_code))
    }

    async fn exec_timed(&self, cmd: &str, workdir: Option<&str>) -> ClientResult<CommandOutput> {
        tokio::time::timeout(self.timeout, self.exec(cmd, workdir))
            .await
            .map_err(|_| {
                ClientError::timeout(format!("docker exec in {}", self.container), self.timeout)
            })?
    }

    async fn run(&self, cmd: &str, workdir: Option<&str>) -> ClientResult<String> {
        self.exec_timed(cmd, workdir).await?.into_stdout()
    }

    fn container_path(&self, path: &str) -> String {
        match &self.workdir {
            Some(dir) if !path.starts_with('/') => format!("{}/{}", dir.trim_end_matches('/'), path),
            _ => path.to_string(),
        }
    }

    async fn status(&self) -> ClientResult<Value> {
        let info = self.inspect(self.docker()?).await?;
        to_result(&ContainerStatus {
            running: is_running(&info),
            id: info.id,
            name: info.name.map(|n| n.trim_start_matches('/').to_string()),
            state: serde_json::to_value(&info.state).unwrap_or(Value::Null),
        })
    }
}

fn is_running(info: &ContainerInspectResponse) -> bool {
    info.state.as_ref().and_then(|s| s.running).unwrap_or(false)
}

/// Build a script that writes `content` to `path` without needing stdin.
fn write_file_script(path: &str, content: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    format!(
        "printf '%s' {} | base64 -d > {}",
        shell_quote(&encoded),
        shell_quote(path)
    )
}

#[async_trait]
impl Client for DockerClient {
    fn transport(&self) -> TransportKind {
        TransportKind::Docker
    }

    fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    async fn connect(&mut self) -> ClientResult<()> {
        let docker = self.open_daemon()?;

        let info = tokio::time::timeout(self.connect_timeout, self.inspect(&docker))
            .await
            .map_err(|_| {
                ClientError::connection(format!(
                    "Timed out after {:?} reaching the Docker daemon",
                    self.connect_timeout
                ))
            })??;

        if !is_running(&info) {
            return Err(ClientError::connection(format!(
                "Container {} is not running",
                self.container
            )));
        }

        tracing::debug!("Attached to container {}", self.container);
        self.docker = Some(docker);
        Ok(())
    }

    async fn setup(&mut self) -> ClientResult<()> {
        match &self.workdir {
            Some(dir) => self
                .run(&format!("mkdir -p {}", shell_quote(dir)), None)
                .await
                .map(|_| ()),
            None => self.run("true", None).await.map(|_| ()),
        }
    }

    async fn execute(&mut self, code: &str) -> ClientResult<String> {
        self.run(code, self.workdir.as_deref()).await
    }

    async fn action(&mut self, action: &str, data: &Value) -> ClientResult<Value> {
        let kind = ActionKind::resolve(TransportKind::Docker, action, SUPPORTED_ACTIONS)?;

        match kind {
            ActionKind::Ping => {
                let start = Instant::now();
                self.run("true", None).await?;
                to_result(&PingResult {
                    latency_ms: start.elapsed().as_millis() as u64,
                })
            }
            ActionKind::Status => self.status().await,
            ActionKind::ReadFile => {
                let args: PathArgs = kind.args(data)?;
                let path = self.container_path(&args.path);
                let bytes = self
                    .exec_timed(&format!("cat -- {}", shell_quote(&path)), None)
                    .await?
                    .into_stdout_bytes()?;
                to_result(&FileContent::from_bytes(args.path, &bytes))
            }
            ActionKind::WriteFile => {
                let args: WriteFileArgs = kind.args(data)?;
                let path = self.container_path(&args.path);
                self.run(&write_file_script(&path, args.content.as_bytes()), None)
                    .await?;
                to_result(&FileWritten {
                    path: args.path,
                    bytes_written: args.content.len(),
                })
            }
            _ => Err(ClientError::unsupported_action(TransportKind::Docker, action)),
        }
    }

    async fn info(&mut self) -> ClientResult<Value> {
        let inspect = self.inspect(self.docker()?).await?;
        let probe = self.run(PROBE_SCRIPT, None).await?;

        let info = DockerInfo {
            transport: TransportKind::Docker,
            id: inspect.id,
            name: inspect.name.map(|n| n.trim_start_matches('/').to_string()),
            image: inspect.config.and_then(|c| c.image),
            created: inspect.created,
            platform: inspect.platform,
            state: serde_json::to_value(&inspect.state).unwrap_or(Value::Null),
            system: SystemProbe::parse(&probe),
            collected_at: Utc::now().to_rfc3339(),
        };

        to_result(&info)
    }

    async fn disconnect(&mut self) -> ClientResult<()> {
        // bollard holds no session; dropping the client releases the connection pool
        self.docker = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(params: Value) -> ClientResult<DockerClient> {
        let descriptor: ConnectionDescriptor = serde_json::from_value(params).unwrap();
        DockerClient::new(descriptor, &TransportDefaults::default())
    }

    #[test]
    fn test_construction_does_not_touch_daemon() {
        let docker = client(json!({"type": "docker", "container": "web", "user": "app"})).unwrap();
        assert_eq!(docker.container, "web");
        assert_eq!(docker.user.as_deref(), Some("app"));
        assert!(docker.docker.is_none());
    }

    #[test]
    fn test_empty_container_rejected() {
        let result = client(json!({"type": "docker", "container": ""}));
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_container_path() {
        let docker = client(json!({"type": "docker", "container": "web", "workdir": "/app"})).unwrap();
        assert_eq!(docker.container_path("config.yml"), "/app/config.yml");
        assert_eq!(docker.container_path("/etc/hosts"), "/etc/hosts");
    }

    #[test]
    fn test_write_file_script() {
        let script = write_file_script("/tmp/it's.txt", b"hello");
        assert_eq!(
            script,
            "printf '%s' 'aGVsbG8=' | base64 -d > '/tmp/it'\\''s.txt'"
        );
    }

    #[tokio::test]
    async fn test_unsupported_action_checked_before_io() {
        let mut docker = client(json!({"type": "docker", "container": "web"})).unwrap();
        let err = docker.action("upload", &json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedAction { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_before_connect() {
        let mut docker = client(json!({"type": "docker", "container": "web"})).unwrap();
        assert!(docker.disconnect().await.is_ok());
    }
}
