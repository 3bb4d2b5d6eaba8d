//! SSH connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// SSH username.
    pub user: String,

    /// Path to the private key file.
    pub key_path: PathBuf,

    /// Password, tried before any key.
    pub password: Option<String>,

    /// Host key verification policy.
    pub host_key_policy: HostKeyPolicy,

    /// Upper bound on TCP connect plus authentication.
    pub connect_timeout: Duration,
}

/// Host key verification policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept any host key (insecure, but matches OpenSSH StrictHostKeyChecking=no).
    #[default]
    AcceptAny,

    /// Accept only a host key with this `SHA256:` fingerprint.
    Fingerprint(String),
}

impl HostKeyPolicy {
    pub fn accepts(&self, fingerprint: &str) -> bool {
        match self {
            HostKeyPolicy::AcceptAny => true,
            HostKeyPolicy::Fingerprint(expected) => expected == fingerprint,
        }
    }
}

impl SshConfig {
    /// Create a new SSH configuration.
    pub fn new(user: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            key_path: key_path.into(),
            password: None,
            host_key_policy: HostKeyPolicy::AcceptAny,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_config_new() {
        let config = SshConfig::new("root", "/path/to/key");

        assert_eq!(config.user, "root");
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptAny);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_fingerprint_policy() {
        let policy = HostKeyPolicy::Fingerprint("SHA256:abc".to_string());
        assert!(policy.accepts("SHA256:abc"));
        assert!(!policy.accepts("SHA256:xyz"));
        assert!(HostKeyPolicy::AcceptAny.accepts("anything"));
    }

    #[test]
    fn test_policy_deserialization() {
        let policy: HostKeyPolicy = serde_json::from_str(r#""accept_any""#).unwrap();
        assert_eq!(policy, HostKeyPolicy::AcceptAny);

        let policy: HostKeyPolicy =
            serde_json::from_str(r#"{"fingerprint": "SHA256:abc"}"#).unwrap();
        assert_eq!(policy, HostKeyPolicy::Fingerprint("SHA256:abc".to_string()));
    }
}
