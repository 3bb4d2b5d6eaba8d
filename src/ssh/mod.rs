//! Pure Rust SSH plumbing for the ssh transport.
//!
//! ## Modules
//!
//! - [`client`] - session establishment and authentication
//! - [`config`] - connection settings and host key policy
//! - [`exec`] - remote command execution
//! - [`keys`] - key fingerprints and passphrase detection
//! - [`sftp`] - file transfer via SFTP

mod client;
pub mod config;
mod exec;
pub mod keys;
mod sftp;

pub use client::SshSession;
pub use config::{HostKeyPolicy, SshConfig};
