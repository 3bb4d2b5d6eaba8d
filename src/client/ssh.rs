//! SSH transport.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{
    to_result, ActionKind, FileContent, FileWritten, PathArgs, PingResult, TransferArgs,
    TransferResult, WriteFileArgs,
};
use super::descriptor::{ConnectionDescriptor, TransportKind};
use super::error::{ClientError, ClientResult};
use super::factory::TransportDefaults;
use super::probe::{SystemProbe, PROBE_SCRIPT};
use super::{in_workdir, resolve_timeout, shell_quote, Client};
use crate::ssh::{HostKeyPolicy, SshConfig, SshSession};

const SUPPORTED_ACTIONS: &[ActionKind] = &[
    ActionKind::Ping,
    ActionKind::ReadFile,
    ActionKind::WriteFile,
    ActionKind::Upload,
    ActionKind::Download,
];

#[derive(Debug, Clone, Deserialize)]
struct SshParams {
    host: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    key_path: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    host_key: Option<HostKeyPolicy>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SshInfo {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Fingerprint of the configured key, when readable
    pub key_fingerprint: Option<String>,
    pub system: SystemProbe,
    pub collected_at: String,
}

pub struct SshTransport {
    connection: ConnectionDescriptor,
    host: String,
    port: u16,
    config: SshConfig,
    workdir: Option<String>,
    timeout: Duration,
    session: Option<SshSession>,
}

impl SshTransport {
    pub fn new(connection: ConnectionDescriptor, defaults: &TransportDefaults) -> ClientResult<Self> {
        let params: SshParams = connection.params()?;
        if params.host.trim().is_empty() {
            return Err(ClientError::configuration("SSH host must not be empty"));
        }

        let timeout = resolve_timeout(params.timeout.as_deref(), defaults.command_timeout)?;
        let key_path = params
            .key_path
            .map(|p| PathBuf::from(shellexpand::tilde(&p).as_ref()))
            .unwrap_or_else(|| defaults.ssh_key_path.clone());

        let mut config = SshConfig::new(
            params.user.unwrap_or_else(|| defaults.ssh_user.clone()),
            key_path,
        );
        config.password = params.password;
        config.host_key_policy = params.host_key.unwrap_or_default();
        config.connect_timeout = defaults.connect_timeout;

        Ok(Self {
            host: params.host,
            port: params.port.unwrap_or(defaults.ssh_port),
            config,
            workdir: params.workdir,
            timeout,
            connection,
            session: None,
        })
    }

    fn session(&self) -> ClientResult<&SshSession> {
        self.session
            .as_ref()
            .ok_or_else(|| ClientError::execution(format!("Not connected to {}", self.host)))
    }

    /// Run a script with the transport timeout and return stdout.
    async fn run(&self, script: &str) -> ClientResult<String> {
        let session = self.session()?;
        tokio::time::timeout(self.timeout, session.exec(script))
            .await
            .map_err(|_| ClientError::timeout(format!("ssh exec on {}", self.host), self.timeout))??
            .into_stdout()
    }

    fn remote_path(&self, path: &str) -> String {
        match &self.workdir {
            Some(dir) if !path.starts_with('/') => format!("{}/{}", dir.trim_end_matches('/'), path),
            _ => path.to_string(),
        }
    }

    async fn transfer(&self, kind: ActionKind, args: TransferArgs) -> ClientResult<Value> {
        let sftp = self.session()?.sftp().await?;

        let bytes = match kind {
            ActionKind::Upload => {
                let local = shellexpand::tilde(&args.source).to_string();
                let remote = self.remote_path(&args.destination);
                sftp.upload(local, &remote).await?
            }
            _ => {
                let remote = self.remote_path(&args.source);
                let local = shellexpand::tilde(&args.destination).to_string();
                sftp.download(&remote, local).await?
            }
        };

        to_result(&TransferResult {
            source: args.source,
            destination: args.destination,
            bytes,
        })
    }
}

#[async_trait]
impl Client for SshTransport {
    fn transport(&self) -> TransportKind {
        TransportKind::Ssh
    }

    fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    async fn connect(&mut self) -> ClientResult<()> {
        tracing::debug!("Connecting to {}@{}:{}", self.config.user, self.host, self.port);
        let session = SshSession::connect(&self.host, self.port, &self.config).await?;
        self.session = Some(session);
        Ok(())
    }

    async fn setup(&mut self) -> ClientResult<()> {
        let script = match &self.workdir {
            Some(dir) => format!("mkdir -p {} && cd {}", shell_quote(dir), shell_quote(dir)),
            None => "true".to_string(),
        };
        self.run(&script).await.map(|_| ())
    }

    async fn execute(&mut self, code: &str) -> ClientResult<String> {
        self.run(&in_workdir(self.workdir.as_deref(), code)).await
    }

    async fn action(&mut self, action: &str, data: &Value) -> ClientResult<Value> {
        let kind = ActionKind::resolve(TransportKind::Ssh, action, SUPPORTED_ACTIONS)?;

        match kind {
            ActionKind::Ping => {
                let start = Instant::now();
                self.run("true").await?;
                to_result(&PingResult {
                    latency_ms: start.elapsed().as_millis() as u64,
                })
            }
            ActionKind::ReadFile => {
                let args: PathArgs = kind.args(data)?;
                let sftp = self.session()?.sftp().await?;
                let bytes = sftp.read(&self.remote_path(&args.path)).await?;
                to_result(&FileContent::from_bytes(args.path, &bytes))
            }
            ActionKind::WriteFile => {
                let args: WriteFileArgs = kind.args(data)?;
                let sftp = self.session()?.sftp().await?;
                sftp.write(&self.remote_path(&args.path), args.content.as_bytes())
                    .await?;
                to_result(&FileWritten {
                    path: args.path,
                    bytes_written: args.content.len(),
                })
            }
            ActionKind::Upload | ActionKind::Download => self.transfer(kind, kind.args(data)?).await,
            _ => Err(ClientError::unsupported_action(TransportKind::Ssh, action)),
        }
    }

    async fn info(&mut self) -> ClientResult<Value> {
        let probe = self.run(PROBE_SCRIPT).await?;

        let info = SshInfo {
            transport: TransportKind::Ssh,
            host: self.session()?.host().to_string(),
            port: self.port,
            user: self.config.user.clone(),
            key_fingerprint: crate::ssh::keys::key_fingerprint(&self.config.key_path).ok(),
            system: SystemProbe::parse(&probe),
            collected_at: Utc::now().to_rfc3339(),
        };

        to_result(&info)
    }

    async fn disconnect(&mut self) -> ClientResult<()> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transport(params: Value) -> ClientResult<SshTransport> {
        let descriptor: ConnectionDescriptor = serde_json::from_value(params).unwrap();
        SshTransport::new(descriptor, &TransportDefaults::default())
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let ssh = transport(json!({"type": "ssh", "host": "example.com"})).unwrap();
        assert_eq!(ssh.port, 22);
        assert_eq!(ssh.config.user, "root");
        assert_eq!(ssh.config.host_key_policy, HostKeyPolicy::AcceptAny);
        assert!(ssh.session.is_none());
    }

    #[test]
    fn test_descriptor_overrides() {
        let ssh = transport(json!({
            "type": "ssh",
            "host": "example.com",
            "port": 2222,
            "user": "deploy",
            "password": "hunter2",
            "host_key": {"fingerprint": "SHA256:abc"},
            "timeout": "10s"
        }))
        .unwrap();

        assert_eq!(ssh.port, 2222);
        assert_eq!(ssh.config.user, "deploy");
        assert_eq!(ssh.config.password.as_deref(), Some("hunter2"));
        assert_eq!(
            ssh.config.host_key_policy,
            HostKeyPolicy::Fingerprint("SHA256:abc".to_string())
        );
        assert_eq!(ssh.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_empty_host_rejected() {
        let result = transport(json!({"type": "ssh", "host": " "}));
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_remote_path_joins_workdir() {
        let ssh = transport(json!({"type": "ssh", "host": "h", "workdir": "/srv/app/"})).unwrap();
        assert_eq!(ssh.remote_path("logs/out.txt"), "/srv/app/logs/out.txt");
        assert_eq!(ssh.remote_path("/etc/hosts"), "/etc/hosts");
    }

    #[tokio::test]
    async fn test_execute_without_session_fails() {
        let mut ssh = transport(json!({"type": "ssh", "host": "h"})).unwrap();
        let err = ssh.execute("ls").await.unwrap_err();
        assert!(matches!(err, ClientError::Execution(_)));
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let mut ssh = transport(json!({"type": "ssh", "host": "h"})).unwrap();
        assert!(ssh.disconnect().await.is_ok());
    }
}
