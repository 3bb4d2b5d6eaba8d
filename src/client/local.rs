//! Local transport.
//!
//! Runs scripts through a shell on the machine ferry itself runs on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysinfo::System;

use super::action::{
    to_result, ActionKind, FileContent, FileWritten, PathArgs, PingResult, WriteFileArgs,
};
use super::descriptor::{ConnectionDescriptor, TransportKind};
use super::error::{ClientError, ClientResult};
use super::factory::TransportDefaults;
use super::process::{self, ProcessSpec};
use super::{resolve_timeout, Client};

const SUPPORTED_ACTIONS: &[ActionKind] = &[
    ActionKind::Ping,
    ActionKind::ReadFile,
    ActionKind::WriteFile,
    ActionKind::ListDir,
];

#[derive(Debug, Clone, Default, Deserialize)]
struct LocalParams {
    #[serde(default)]
    shell: Option<String>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    timeout: Option<String>,
}

/// Metadata returned by `info`.
#[derive(Debug, Clone, Serialize)]
pub struct LocalInfo {
    pub transport: TransportKind,
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub arch: String,
    pub cpus: usize,
    pub memory_total: u64,
    pub shell: String,
    pub workdir: Option<String>,
    pub collected_at: String,
}

#[derive(Debug, Clone, Serialize)]
struct DirEntry {
    name: String,
    is_dir: bool,
    size: u64,
}

#[derive(Debug, Clone, Serialize)]
struct DirListing {
    path: String,
    entries: Vec<DirEntry>,
}

pub struct LocalClient {
    connection: ConnectionDescriptor,
    shell: String,
    workdir: Option<PathBuf>,
    env: HashMap<String, String>,
    timeout: Duration,
    /// Absolute shell path, resolved on connect
    resolved_shell: Option<PathBuf>,
}

impl LocalClient {
    pub fn new(connection: ConnectionDescriptor, defaults: &TransportDefaults) -> ClientResult<Self> {
        let params: LocalParams = connection.params()?;
        let timeout = resolve_timeout(params.timeout.as_deref(), defaults.command_timeout)?;

        Ok(Self {
            shell: params.shell.unwrap_or_else(|| defaults.shell.clone()),
            workdir: params
                .workdir
                .map(|dir| PathBuf::from(shellexpand::tilde(&dir).as_ref())),
            env: params.env,
            timeout,
            connection,
            resolved_shell: None,
        })
    }

    fn shell(&self) -> ClientResult<&PathBuf> {
        self.resolved_shell
            .as_ref()
            .ok_or_else(|| ClientError::execution("Local shell is not connected"))
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
        match &self.workdir {
            Some(dir) if expanded.is_relative() => dir.join(expanded),
            _ => expanded,
        }
    }

    async fn run_script(&self, code: &str) -> ClientResult<String> {
        let mut spec = ProcessSpec::new(self.shell()?.clone(), self.timeout).args(["-c", code]);
        spec.env = self.env.clone();
        if let Some(dir) = &self.workdir {
            if !dir.is_dir() {
                return Err(ClientError::execution(format!(
                    "Working directory {} does not exist. Connect with setup to create it.",
                    dir.display()
                )));
            }
            spec.cwd = Some(dir.clone());
        }

        process::run(spec).await?.into_stdout()
    }

    async fn read_file(&self, args: PathArgs) -> ClientResult<Value> {
        let path = self.resolve_path(&args.path);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ClientError::execution(format!("Failed to read {}: {}", path.display(), e))
        })?;
        to_result(&FileContent::from_bytes(args.path, &bytes))
    }

    async fn write_file(&self, args: WriteFileArgs) -> ClientResult<Value> {
        let path = self.resolve_path(&args.path);
        tokio::fs::write(&path, args.content.as_bytes())
            .await
            .map_err(|e| {
                ClientError::execution(format!("Failed to write {}: {}", path.display(), e))
            })?;
        to_result(&FileWritten {
            path: args.path,
            bytes_written: args.content.len(),
        })
    }

    async fn list_dir(&self, args: PathArgs) -> ClientResult<Value> {
        let path = self.resolve_path(&args.path);
        let mut reader = tokio::fs::read_dir(&path).await.map_err(|e| {
            ClientError::execution(format!("Failed to list {}: {}", path.display(), e))
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ClientError::execution(format!("Failed to list {}: {}", path.display(), e)))?
        {
            let metadata = entry.metadata().await.ok();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false),
                size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        to_result(&DirListing {
            path: args.path,
            entries,
        })
    }
}

#[async_trait]
impl Client for LocalClient {
    fn transport(&self) -> TransportKind {
        TransportKind::Local
    }

    fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    async fn connect(&mut self) -> ClientResult<()> {
        let shell = which::which(&self.shell).map_err(|e| {
            ClientError::connection(format!("Shell '{}' not found: {}", self.shell, e))
        })?;
        tracing::debug!("Local shell resolved to {}", shell.display());
        self.resolved_shell = Some(shell);
        Ok(())
    }

    async fn setup(&mut self) -> ClientResult<()> {
        if let Some(dir) = &self.workdir {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ClientError::connection(format!(
                    "Failed to create working directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        self.run_script("true").await.map(|_| ())
    }

    async fn execute(&mut self, code: &str) -> ClientResult<String> {
        self.run_script(code).await
    }

    async fn action(&mut self, action: &str, data: &Value) -> ClientResult<Value> {
        let kind = ActionKind::resolve(TransportKind::Local, action, SUPPORTED_ACTIONS)?;

        match kind {
            ActionKind::Ping => {
                let start = Instant::now();
                self.run_script("true").await?;
                to_result(&PingResult {
                    latency_ms: start.elapsed().as_millis() as u64,
                })
            }
            ActionKind::ReadFile => self.read_file(kind.args(data)?).await,
            ActionKind::WriteFile => self.write_file(kind.args(data)?).await,
            ActionKind::ListDir => self.list_dir(kind.args(data)?).await,
            _ => Err(ClientError::unsupported_action(TransportKind::Local, action)),
        }
    }

    async fn info(&mut self) -> ClientResult<Value> {
        let sys = System::new_all();

        let info = LocalInfo {
            transport: TransportKind::Local,
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            os: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            arch: std::env::consts::ARCH.to_string(),
            cpus: sys.cpus().len(),
            memory_total: sys.total_memory(),
            shell: self.shell()?.display().to_string(),
            workdir: self.workdir.as_ref().map(|d| d.display().to_string()),
            collected_at: Utc::now().to_rfc3339(),
        };

        to_result(&info)
    }

    async fn disconnect(&mut self) -> ClientResult<()> {
        self.resolved_shell = None;
        Ok(())
    }
}
