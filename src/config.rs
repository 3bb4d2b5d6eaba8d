use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::client::{ConnectionDescriptor, TransportDefaults};
use crate::error::{FerryError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_ssh_key_path")]
    pub ssh_key_path: String,
    /// Shell used by the local transport
    #[serde(default = "default_shell")]
    pub shell: String,
    /// kubectl binary, looked up in PATH when not absolute
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,
    /// Named connection descriptors usable in place of inline JSON.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connections: BTreeMap<String, ConnectionDescriptor>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_key_path() -> String {
    "~/.ssh/id_ed25519".to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_connect_timeout() -> String {
    "30s".to_string()
}

fn default_command_timeout() -> String {
    "5m".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ssh_user: default_ssh_user(),
            ssh_port: default_ssh_port(),
            ssh_key_path: default_ssh_key_path(),
            shell: default_shell(),
            kubectl: default_kubectl(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            connections: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("ferry"))
            .ok_or_else(|| FerryError::Config("Could not determine config directory".to_string()))
    }

    /// `FERRY_CONFIG` wins over the default location.
    pub fn config_path() -> Result<PathBuf> {
        match std::env::var("FERRY_CONFIG") {
            Ok(path) if !path.is_empty() => Ok(PathBuf::from(shellexpand::tilde(&path).as_ref())),
            _ => Ok(Self::config_dir()?.join("config.yaml")),
        }
    }

    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .map_err(|e| FerryError::Config(format!("Invalid config {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(user) = std::env::var("FERRY_SSH_USER") {
            self.ssh_user = user;
        }
        if let Ok(key) = std::env::var("FERRY_SSH_KEY") {
            self.ssh_key_path = key;
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| FerryError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        // Connections may carry passwords
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("connect_timeout", &self.connect_timeout),
            ("command_timeout", &self.command_timeout),
        ] {
            if parse_duration(value).is_none() {
                return Err(FerryError::Config(format!(
                    "Invalid {} '{}'. Use format like '30s', '5m', or '300'",
                    key, value
                )));
            }
        }

        if self.ssh_port == 0 {
            return Err(FerryError::Config("ssh_port must not be 0".to_string()));
        }

        for (name, connection) in &self.connections {
            connection
                .transport()
                .map_err(|e| FerryError::Config(format!("Connection '{}': {}", name, e)))?;
        }

        Ok(())
    }

    /// Update a single key from its string form, as used by `ferry config set`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "ssh_user" | "ssh-user" => self.ssh_user = value.to_string(),
            "ssh_port" | "ssh-port" => {
                self.ssh_port = value
                    .parse()
                    .map_err(|_| FerryError::Config(format!("Invalid port '{}'", value)))?
            }
            "ssh_key" | "ssh-key" | "ssh_key_path" => self.ssh_key_path = value.to_string(),
            "shell" => self.shell = value.to_string(),
            "kubectl" => self.kubectl = value.to_string(),
            "connect_timeout" | "connect-timeout" => self.connect_timeout = value.to_string(),
            "command_timeout" | "command-timeout" => self.command_timeout = value.to_string(),
            _ => {
                return Err(FerryError::Config(format!(
                    "Unknown config key '{}'. Available keys: {}",
                    key,
                    Self::KEYS.join(", ")
                )))
            }
        }

        self.validate()
    }

    pub const KEYS: &'static [&'static str] = &[
        "ssh_user",
        "ssh_port",
        "ssh_key",
        "shell",
        "kubectl",
        "connect_timeout",
        "command_timeout",
    ];

    pub fn connection(&self, name: &str) -> Option<&ConnectionDescriptor> {
        self.connections.get(name)
    }

    pub fn to_transport_defaults(&self) -> TransportDefaults {
        let fallback = TransportDefaults::default();

        TransportDefaults {
            ssh_user: self.ssh_user.clone(),
            ssh_port: self.ssh_port,
            ssh_key_path: PathBuf::from(shellexpand::tilde(&self.ssh_key_path).as_ref()),
            shell: self.shell.clone(),
            kubectl: self.kubectl.clone(),
            connect_timeout: parse_duration(&self.connect_timeout)
                .unwrap_or(fallback.connect_timeout),
            command_timeout: parse_duration(&self.command_timeout)
                .unwrap_or(fallback.command_timeout),
        }
    }
}

/// Parse `2h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(seconds) = s.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportKind;

    #[test]
    fn test_parse_duration_hours() {
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("24H"), Some(Duration::from_secs(86400)));
    }

    #[test]
    fn test_parse_duration_minutes() {
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("90M"), Some(Duration::from_secs(5400)));
    }

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration("60s"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("300"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("  2h  "), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("2x"), None);
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.ssh_user, "root");
        assert_eq!(config.ssh_port, 22);
        assert_eq!(config.shell, "/bin/sh");
        assert_eq!(config.command_timeout, "5m");
        assert!(config.connections.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
ssh_user: deploy
command_timeout: 10m
connections:
  web:
    type: docker
    container: web-1
  prod:
    type: ssh
    host: prod.example.com
    port: 2222
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ssh_user, "deploy");
        assert_eq!(config.ssh_port, 22);
        assert_eq!(config.command_timeout, "10m");

        let web = config.connection("web").unwrap();
        assert_eq!(web.transport().unwrap(), TransportKind::Docker);
        assert_eq!(web.label(), "docker:web-1");
        assert_eq!(
            config.connection("prod").unwrap().params.get("port"),
            Some(&serde_json::json!(2222))
        );
    }

    #[test]
    fn test_config_serialization_skips_empty_connections() {
        let yaml = serde_yaml::to_string(&AppConfig::default()).unwrap();
        assert!(yaml.contains("ssh_user: root"));
        assert!(!yaml.contains("connections"));
    }

    #[test]
    fn test_validate_rejects_bad_timeout() {
        let config = AppConfig {
            connect_timeout: "soon".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid connect_timeout"));
    }

    #[test]
    fn test_validate_rejects_unknown_connection_type() {
        let mut config = AppConfig::default();
        let mut bogus = ConnectionDescriptor::default();
        bogus.kind = Some("ftp".to_string());
        config.connections.insert("old".to_string(), bogus);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Connection 'old'"));
    }

    #[test]
    fn test_set_known_and_unknown_keys() {
        let mut config = AppConfig::default();
        config.set("ssh-user", "admin").unwrap();
        config.set("ssh_port", "2200").unwrap();
        assert_eq!(config.ssh_user, "admin");
        assert_eq!(config.ssh_port, 2200);

        assert!(config.set("ssh_port", "many").is_err());
        assert!(config.set("command_timeout", "forever").is_err());
        assert!(config.set("region", "nyc1").is_err());
    }

    #[test]
    fn test_transport_defaults() {
        let config = AppConfig {
            connect_timeout: "10s".to_string(),
            command_timeout: "1m".to_string(),
            kubectl: "/usr/local/bin/kubectl".to_string(),
            ..Default::default()
        };

        let defaults = config.to_transport_defaults();
        assert_eq!(defaults.connect_timeout, Duration::from_secs(10));
        assert_eq!(defaults.command_timeout, Duration::from_secs(60));
        assert_eq!(defaults.kubectl, "/usr/local/bin/kubectl");
        assert!(!defaults.ssh_key_path.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&temp_dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("ferry").join("config.yaml");

        let mut config = AppConfig::default();
        config.set("shell", "/bin/bash").unwrap();
        config.connections.insert(
            "box".to_string(),
            ConnectionDescriptor::new(TransportKind::Ssh).with_param("host", "box.local"),
        );
        config.save_to(&path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "ssh_port: [not a port").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, FerryError::Config(_)));
    }
}
