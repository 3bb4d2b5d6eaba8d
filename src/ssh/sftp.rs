//! SFTP file transfer over an open SSH session.

use std::path::Path;

use russh::client::Handle;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::client::{ClientError, ClientResult};
use crate::ssh::client::ClientHandler;

/// SFTP client for file transfers.
pub struct SftpClient {
    session: SftpSession,
}

impl SftpClient {
    /// Create a new SFTP client from an SSH session.
    pub async fn new(ssh_session: &Handle<ClientHandler>) -> ClientResult<Self> {
        let channel = ssh_session
            .channel_open_session()
            .await
            .map_err(|e| ClientError::execution(format!("Failed to open SFTP channel: {}", e)))?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            ClientError::execution(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| ClientError::execution(format!("Failed to initialize SFTP: {}", e)))?;

        Ok(Self { session: sftp })
    }

    /// Read a whole remote file.
    pub async fn read(&self, remote_path: &str) -> ClientResult<Vec<u8>> {
        let mut file = self.session.open(remote_path).await.map_err(|e| {
            ClientError::execution(format!("Failed to open remote file {}: {}", remote_path, e))
        })?;

        let mut content = Vec::new();
        file.read_to_end(&mut content).await.map_err(|e| {
            ClientError::execution(format!("Failed to read remote file {}: {}", remote_path, e))
        })?;

        Ok(content)
    }

    /// Create or truncate a remote file and write `content` to it.
    pub async fn write(&self, remote_path: &str, content: &[u8]) -> ClientResult<()> {
        let mut remote_file = self.session.create(remote_path).await.map_err(|e| {
            ClientError::execution(format!("Failed to create remote file {}: {}", remote_path, e))
        })?;

        remote_file.write_all(content).await.map_err(|e| {
            ClientError::execution(format!("Failed to write to remote file {}: {}", remote_path, e))
        })?;

        // Ensure data is flushed
        remote_file.shutdown().await.map_err(|e| {
            ClientError::execution(format!("Failed to close remote file {}: {}", remote_path, e))
        })?;

        Ok(())
    }

    /// Upload a local file. Returns the number of bytes sent.
    pub async fn upload(&self, local_path: impl AsRef<Path>, remote_path: &str) -> ClientResult<u64> {
        let local_path = local_path.as_ref();

        let content = tokio::fs::read(local_path).await.map_err(|e| {
            ClientError::execution(format!(
                "Failed to read local file {}: {}",
                local_path.display(),
                e
            ))
        })?;

        self.write(remote_path, &content).await?;
        Ok(content.len() as u64)
    }

    /// Download a remote file. Returns the number of bytes received.
    pub async fn download(&self, remote_path: &str, local_path: impl AsRef<Path>) -> ClientResult<u64> {
        let local_path = local_path.as_ref();
        let content = self.read(remote_path).await?;

        tokio::fs::write(local_path, &content).await.map_err(|e| {
            ClientError::execution(format!(
                "Failed to write local file {}: {}",
                local_path.display(),
                e
            ))
        })?;

        Ok(content.len() as u64)
    }
}
