//! Kubernetes transport.
//!
//! Drives the `kubectl` binary rather than talking to the API server
//! directly, so whatever auth plugins and contexts the user already has
//! configured keep working.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{
    to_result, ActionKind, FileContent, FileWritten, PathArgs, PingResult, WriteFileArgs,
};
use super::descriptor::{ConnectionDescriptor, TransportKind};
use super::error::{ClientError, ClientResult};
use super::factory::TransportDefaults;
use super::probe::{SystemProbe, PROBE_SCRIPT};
use super::process::{self, ProcessSpec};
use super::{in_workdir, resolve_timeout, shell_quote, Client, CommandOutput};

const SUPPORTED_ACTIONS: &[ActionKind] = &[
    ActionKind::Ping,
    ActionKind::Status,
    ActionKind::ReadFile,
    ActionKind::WriteFile,
];

#[derive(Debug, Clone, Deserialize)]
struct KubectlParams {
    pod: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    kubeconfig: Option<String>,
    #[serde(default)]
    kubectl: Option<String>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    timeout: Option<String>,
}

/// The subset of `kubectl get pod -o json` ferry reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pod {
    #[serde(default)]
    metadata: PodMetadata,
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PodMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    #[serde(default)]
    node_name: Option<String>,
    #[serde(default)]
    containers: Vec<NamedContainer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NamedContainer {
    name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default, rename = "podIP")]
    pod_ip: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
}

impl Pod {
    fn is_running(&self) -> bool {
        self.status.phase.as_deref() == Some("Running")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PodStatusResult {
    pub pod: String,
    pub namespace: Option<String>,
    pub phase: Option<String>,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct KubectlInfo {
    pub transport: TransportKind,
    pub pod: String,
    pub namespace: Option<String>,
    pub context: Option<String>,
    pub node: Option<String>,
    pub pod_ip: Option<String>,
    pub phase: Option<String>,
    pub started_at: Option<String>,
    pub containers: Vec<String>,
    pub system: SystemProbe,
    pub collected_at: String,
}

pub struct KubectlClient {
    connection: ConnectionDescriptor,
    pod: String,
    namespace: Option<String>,
    container: Option<String>,
    context: Option<String>,
    kubeconfig: Option<String>,
    kubectl: String,
    workdir: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
    /// Absolute kubectl path, resolved on connect
    binary: Option<PathBuf>,
}

impl KubectlClient {
    pub fn new(connection: ConnectionDescriptor, defaults: &TransportDefaults) -> ClientResult<Self> {
        let params: KubectlParams = connection.params()?;
        if params.pod.trim().is_empty() {
            return Err(ClientError::configuration("Kubernetes pod must not be empty"));
        }

        Ok(Self {
            pod: params.pod,
            namespace: params.namespace,
            container: params.container,
            context: params.context,
            kubeconfig: params
                .kubeconfig
                .map(|p| shellexpand::tilde(&p).to_string()),
            kubectl: params.kubectl.unwrap_or_else(|| defaults.kubectl.clone()),
            workdir: params.workdir,
            timeout: resolve_timeout(params.timeout.as_deref(), defaults.command_timeout)?,
            connect_timeout: defaults.connect_timeout,
            connection,
            binary: None,
        })
    }

    /// Flags that select the cluster and namespace, shared by every call.
    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push(format!("--kubeconfig={}", kubeconfig));
        }
        if let Some(context) = &self.context {
            args.push(format!("--context={}", context));
        }
        if let Some(namespace) = &self.namespace {
            args.push(format!("--namespace={}", namespace));
        }
        args
    }

    fn exec_args(&self, script: &str, with_stdin: bool) -> Vec<String> {
        let mut args = self.global_args();
        args.push("exec".to_string());
        if with_stdin {
            args.push("-i".to_string());
        }
        args.push(self.pod.clone());
        if let Some(container) = &self.container {
            args.push("-c".to_string());
            args.push(container.clone());
        }
        args.extend(["--", "sh", "-c", script].map(String::from));
        args
    }

    fn binary(&self) -> ClientResult<&PathBuf> {
        self.binary
            .as_ref()
            .ok_or_else(|| ClientError::execution(format!("Not connected to pod {}", self.pod)))
    }

    async fn exec(&self, script: &str) -> ClientResult<CommandOutput> {
        let spec = ProcessSpec::new(self.binary()?.clone(), self.timeout)
            .args(self.exec_args(script, false));
        process::run(spec).await
    }

    async fn run(&self, script: &str) -> ClientResult<String> {
        self.exec(script).await?.into_stdout()
    }

    async fn fetch_pod(&self, binary: &PathBuf, timeout: Duration) -> ClientResult<Pod> {
        let spec = ProcessSpec::new(binary.clone(), timeout)
            .args(self.global_args())
            .args(["get", "pod", self.pod.as_str(), "-o", "json"]);

        let stdout = process::run(spec).await?.into_stdout()?;
        serde_json::from_str(&stdout).map_err(|e| {
            ClientError::execution(format!("Failed to parse pod {}: {}", self.pod, e))
        })
    }

    fn container_path(&self, path: &str) -> String {
        match &self.workdir {
            Some(dir) if !path.starts_with('/') => format!("{}/{}", dir.trim_end_matches('/'), path),
            _ => path.to_string(),
        }
    }
}

#[async_trait]
impl Client for KubectlClient {
    fn transport(&self) -> TransportKind {
        TransportKind::Kubectl
    }

    fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    async fn connect(&mut self) -> ClientResult<()> {
        let binary = which::which(&self.kubectl).map_err(|_| {
            ClientError::connection(format!("kubectl binary '{}' not found in PATH", self.kubectl))
        })?;

        let pod = self
            .fetch_pod(&binary, self.connect_timeout)
            .await
            .map_err(ClientError::into_connection)?;

        if !pod.is_running() {
            return Err(ClientError::connection(format!(
                "Pod {} is not running (phase: {})",
                self.pod,
                pod.status.phase.as_deref().unwrap_or("unknown")
            )));
        }

        tracing::debug!("Attached to pod {}", self.pod);
        self.binary = Some(binary);
        Ok(())
    }

    async fn setup(&mut self) -> ClientResult<()> {
        let script = match &self.workdir {
            Some(dir) => format!("mkdir -p {}", shell_quote(dir)),
            None => "true".to_string(),
        };
        self.run(&script).await.map(|_| ())
    }

    async fn execute(&mut self, code: &str) -> ClientResult<String> {
        self.run(&in_workdir(self.workdir.as_deref(), code)).await
    }

    async fn action(&mut self, action: &str, data: &Value) -> ClientResult<Value> {
        let kind = ActionKind::resolve(TransportKind::Kubectl, action, SUPPORTED_ACTIONS)?;

        match kind {
            ActionKind::Ping => {
                let start = Instant::now();
                self.run("true").await?;
                to_result(&PingResult {
                    latency_ms: start.elapsed().as_millis() as u64,
                })
            }
            ActionKind::Status => {
                let pod = self.fetch_pod(self.binary()?, self.timeout).await?;
                to_result(&PodStatusResult {
                    running: pod.is_running(),
                    pod: self.pod.clone(),
                    namespace: pod.metadata.namespace,
                    phase: pod.status.phase,
                })
            }
            ActionKind::ReadFile => {
                let args: PathArgs = kind.args(data)?;
                let path = self.container_path(&args.path);
                let bytes = self
                    .exec(&format!("cat -- {}", shell_quote(&path)))
                    .await?
                    .into_stdout_bytes()?;
                to_result(&FileContent::from_bytes(args.path, &bytes))
            }
            ActionKind::WriteFile => {
                let args: WriteFileArgs = kind.args(data)?;
                let path = self.container_path(&args.path);
                let script = format!("cat > {}", shell_quote(&path));
                let spec = ProcessSpec::new(self.binary()?.clone(), self.timeout)
                    .args(self.exec_args(&script, true))
                    .stdin(args.content.as_bytes().to_vec());
                process::run(spec).await?.into_stdout()?;

                to_result(&FileWritten {
                    path: args.path,
                    bytes_written: args.content.len(),
                })
            }
            _ => Err(ClientError::unsupported_action(TransportKind::Kubectl, action)),
        }
    }

    async fn info(&mut self) -> ClientResult<Value> {
        let pod = self.fetch_pod(self.binary()?, self.timeout).await?;
        let probe = self.run(PROBE_SCRIPT).await?;

        let info = KubectlInfo {
            transport: TransportKind::Kubectl,
            pod: pod.metadata.name.unwrap_or_else(|| self.pod.clone()),
            namespace: pod.metadata.namespace,
            context: self.context.clone(),
            node: pod.spec.node_name,
            pod_ip: pod.status.pod_ip,
            phase: pod.status.phase,
            started_at: pod.status.start_time,
            containers: pod.spec.containers.into_iter().map(|c| c.name).collect(),
            system: SystemProbe::parse(&probe),
            collected_at: Utc::now().to_rfc3339(),
        };

        to_result(&info)
    }

    async fn disconnect(&mut self) -> ClientResult<()> {
        self.binary = None;
        Ok(())
    }
}
