//! Named actions shared across transports.
//!
//! Each transport declares which [`ActionKind`]s it supports; the name sent
//! by the caller is resolved against that list before anything runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::descriptor::TransportKind;
use super::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Round-trip a no-op command and report latency.
    Ping,
    /// Container state or pod phase.
    Status,
    ReadFile,
    WriteFile,
    ListDir,
    /// Copy a local file to the target (SFTP).
    Upload,
    /// Copy a file from the target to the local machine (SFTP).
    Download,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Ping => "ping",
            ActionKind::Status => "status",
            ActionKind::ReadFile => "read_file",
            ActionKind::WriteFile => "write_file",
            ActionKind::ListDir => "list_dir",
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
        }
    }

    /// Resolve an action name against the set a transport supports.
    pub fn resolve(
        transport: TransportKind,
        name: &str,
        supported: &[ActionKind],
    ) -> ClientResult<ActionKind> {
        supported
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| ClientError::unsupported_action(transport, name))
    }

    /// Deserialize the action's data payload.
    pub fn args<T: DeserializeOwned>(&self, data: &Value) -> ClientResult<T> {
        serde_json::from_value(data.clone()).map_err(|e| {
            ClientError::execution(format!("Invalid data for action '{}': {}", self.as_str(), e))
        })
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferArgs {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub size: usize,
}

impl FileContent {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            content: String::from_utf8_lossy(bytes).to_string(),
            size: bytes.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileWritten {
    pub path: String,
    pub bytes_written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub source: String,
    pub destination: String,
    pub bytes: u64,
}

/// Serialize an action result into the reply value.
pub fn to_result<T: Serialize>(value: &T) -> ClientResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| ClientError::execution(format!("Failed to encode action result: {}", e)))
}
