//! SSH session implementation using russh.
//!
//! Provides connection management and authentication.

use std::net::ToSocketAddrs;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::PublicKeyBase64;
use tokio::net::UnixStream;

use crate::client::{ClientError, ClientResult, CommandOutput};
use crate::ssh::config::{HostKeyPolicy, SshConfig};
use crate::ssh::sftp::SftpClient;

/// SSH session wrapper over russh.
pub struct SshSession {
    handle: Handle<ClientHandler>,
    host: String,
}

impl SshSession {
    /// Connect and authenticate, bounded by `config.connect_timeout`.
    pub async fn connect(host: &str, port: u16, config: &SshConfig) -> ClientResult<Self> {
        tokio::time::timeout(config.connect_timeout, Self::establish(host, port, config))
            .await
            .map_err(|_| {
                ClientError::connection(format!(
                    "Timed out after {:?} connecting to {}:{}",
                    config.connect_timeout, host, port
                ))
            })?
    }

    async fn establish(host: &str, port: u16, config: &SshConfig) -> ClientResult<Self> {
        let russh_config = Arc::new(client::Config {
            // Sessions live for a single request
            inactivity_timeout: None,
            keepalive_interval: Some(std::time::Duration::from_secs(15)),
            keepalive_max: 4,
            ..Default::default()
        });

        // Resolve hostname to IP
        let addr = format!("{}:{}", host, port)
            .to_socket_addrs()
            .map_err(|e| ClientError::connection(format!("Failed to resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| ClientError::connection(format!("No address found for {}", host)))?;

        let handler = ClientHandler {
            host_key_policy: config.host_key_policy.clone(),
        };

        let mut handle = client::connect(russh_config, addr, handler)
            .await
            .map_err(|e| ClientError::connection(format!("Connection to {} failed: {}", host, e)))?;

        Self::authenticate(&mut handle, config).await?;
        tracing::debug!("Authenticated to {} as {}", host, config.user);

        Ok(Self {
            handle,
            host: host.to_string(),
        })
    }

    /// Authenticate with the SSH server.
    ///
    /// Order: password (when given), agent identities, then the key file.
    async fn authenticate(handle: &mut Handle<ClientHandler>, config: &SshConfig) -> ClientResult<()> {
        if let Some(password) = &config.password {
            let accepted = handle
                .authenticate_password(&config.user, password)
                .await
                .map_err(|e| ClientError::connection(format!("Password auth failed: {}", e)))?;

            if accepted {
                return Ok(());
            }
            tracing::debug!("Server rejected password for {}", config.user);
        }

        match Self::auth_with_agent(handle, config).await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                tracing::debug!("Agent authentication: server rejected all keys");
            }
            Err(e) => {
                tracing::debug!("Agent authentication failed: {}", e);
            }
        }

        if key_has_passphrase(config) {
            return Err(ClientError::connection(format!(
                "SSH authentication failed for {}. Key {} is missing or requires a passphrase \
                 and no agent identity was accepted. Add it with: ssh-add {}",
                config.user,
                config.key_path.display(),
                config.key_path.display()
            )));
        }

        Self::auth_with_key_file(handle, config).await
    }

    /// Authenticate using SSH agent.
    async fn auth_with_agent(
        handle: &mut Handle<ClientHandler>,
        config: &SshConfig,
    ) -> ClientResult<bool> {
        let socket_path = std::env::var("SSH_AUTH_SOCK")
            .map_err(|_| ClientError::connection("SSH_AUTH_SOCK not set"))?;

        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| ClientError::connection(format!("Failed to connect to agent: {}", e)))?;

        let mut agent = russh_keys::agent::client::AgentClient::connect(stream);

        let identities = agent.request_identities().await.map_err(|e| {
            ClientError::connection(format!("Failed to get agent identities: {}", e))
        })?;

        tracing::debug!("Agent has {} identities", identities.len());

        for identity in identities {
            let auth_result = handle
                .authenticate_publickey_with(&config.user, identity, &mut agent)
                .await;

            match auth_result {
                Ok(true) => return Ok(true),
                Ok(false) => continue,
                Err(e) => {
                    tracing::debug!("Agent auth error: {}", e);
                    continue;
                }
            }
        }

        Ok(false)
    }

    /// Authenticate using key file directly.
    async fn auth_with_key_file(
        handle: &mut Handle<ClientHandler>,
        config: &SshConfig,
    ) -> ClientResult<()> {
        let key = russh_keys::load_secret_key(&config.key_path, None)
            .map_err(|e| ClientError::connection(format!("Failed to load key: {}", e)))?;

        let accepted = handle
            .authenticate_publickey(&config.user, Arc::new(key))
            .await
            .map_err(|e| ClientError::connection(format!("Authentication failed: {}", e)))?;

        if accepted {
            Ok(())
        } else {
            Err(ClientError::connection(format!(
                "Server rejected key {} for {}",
                config.key_path.display(),
                config.user
            )))
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Execute a command on the remote host (non-interactive).
    pub async fn exec(&self, command: &str) -> ClientResult<CommandOutput> {
        crate::ssh::exec::exec_command(&self.handle, command).await
    }

    /// Get an SFTP client for file transfers.
    pub async fn sftp(&self) -> ClientResult<SftpClient> {
        SftpClient::new(&self.handle).await
    }

    /// Close the session.
    pub async fn close(&self) -> ClientResult<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| ClientError::connection(format!("Failed to close session to {}: {}", self.host, e)))
    }
}

fn key_has_passphrase(config: &SshConfig) -> bool {
    crate::ssh::keys::key_has_passphrase(&config.key_path)
}

/// Client handler for russh connection callbacks.
pub struct ClientHandler {
    pub host_key_policy: HostKeyPolicy,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let fingerprint =
            crate::ssh::keys::calculate_fingerprint(&server_public_key.public_key_bytes());
        let accepted = self.host_key_policy.accepts(&fingerprint);

        if !accepted {
            tracing::warn!("Rejected server host key {}", fingerprint);
        }

        Ok(accepted)
    }
}
