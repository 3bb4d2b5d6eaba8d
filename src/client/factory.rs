//! Client factory.
//!
//! Maps a connection descriptor's `type` tag to a freshly constructed,
//! unconnected transport. Construction only validates parameters; no
//! sockets are opened and no processes are spawned here.

use std::path::PathBuf;
use std::time::Duration;

use super::descriptor::{ConnectionDescriptor, TransportKind};
use super::docker::DockerClient;
use super::error::{ClientError, ClientResult};
use super::kubectl::KubectlClient;
use super::local::LocalClient;
use super::ssh::SshTransport;
use super::Client;

/// Factory trait for creating clients from descriptors.
pub trait ClientFactory: Send + Sync {
    /// Build a client for a descriptor that is known to be present.
    fn create(&self, connection: &ConnectionDescriptor) -> ClientResult<Box<dyn Client>>;

    /// Build a client, rejecting a missing descriptor.
    fn acquire(&self, connection: Option<&ConnectionDescriptor>) -> ClientResult<Box<dyn Client>> {
        let connection =
            connection.ok_or_else(|| ClientError::configuration("Connection is required"))?;
        self.create(connection)
    }
}

/// Fallback values for fields a descriptor leaves out.
#[derive(Debug, Clone)]
pub struct TransportDefaults {
    pub ssh_user: String,
    pub ssh_port: u16,
    pub ssh_key_path: PathBuf,
    pub shell: String,
    pub kubectl: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            ssh_user: "root".to_string(),
            ssh_port: 22,
            ssh_key_path: PathBuf::from(shellexpand::tilde("~/.ssh/id_ed25519").as_ref()),
            shell: "/bin/sh".to_string(),
            kubectl: "kubectl".to_string(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(300),
        }
    }
}

/// The built-in factory covering every [`TransportKind`].
#[derive(Debug, Clone, Default)]
pub struct TransportFactory {
    defaults: TransportDefaults,
}

impl TransportFactory {
    pub fn new(defaults: TransportDefaults) -> Self {
        Self { defaults }
    }
}

impl ClientFactory for TransportFactory {
    fn create(&self, connection: &ConnectionDescriptor) -> ClientResult<Box<dyn Client>> {
        let kind = connection.transport()?;
        tracing::debug!("Creating {} client for {}", kind, connection.label());

        let client: Box<dyn Client> = match kind {
            TransportKind::Local => Box::new(LocalClient::new(connection.clone(), &self.defaults)?),
            TransportKind::Ssh => Box::new(SshTransport::new(connection.clone(), &self.defaults)?),
            TransportKind::Docker => {
                Box::new(DockerClient::new(connection.clone(), &self.defaults)?)
            }
            TransportKind::Kubectl => {
                Box::new(KubectlClient::new(connection.clone(), &self.defaults)?)
            }
        };

        Ok(client)
    }
}
