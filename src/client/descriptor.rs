//! Connection descriptors.
//!
//! A descriptor names the transport through its `type` tag and carries every
//! other field verbatim. The core never interprets those fields; each
//! transport deserializes its own parameter struct from them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ClientError, ClientResult};

/// The closed set of supported transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Local,
    Ssh,
    Docker,
    Kubectl,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [
        TransportKind::Local,
        TransportKind::Ssh,
        TransportKind::Docker,
        TransportKind::Kubectl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Local => "local",
            TransportKind::Ssh => "ssh",
            TransportKind::Docker => "docker",
            TransportKind::Kubectl => "kubectl",
        }
    }

    /// Parse a transport tag. Tags are matched exactly.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    pub fn supported_names() -> Vec<String> {
        Self::ALL.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied identification of a transport and its target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Transport tag. Kept as raw text so unknown tags surface as
    /// configuration errors instead of parse failures.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Transport-specific fields, passed through untouched.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ConnectionDescriptor {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind: Some(kind.as_str().to_string()),
            params: Map::new(),
        }
    }

    /// Add a transport parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Resolve the `type` tag.
    pub fn transport(&self) -> ClientResult<TransportKind> {
        let tag = self
            .kind
            .as_deref()
            .ok_or_else(|| ClientError::configuration("Connection type is required"))?;

        TransportKind::from_str(tag).ok_or_else(|| {
            ClientError::configuration(format!(
                "Type not supported: '{}'. Supported types: {:?}",
                tag,
                TransportKind::supported_names()
            ))
        })
    }

    /// Deserialize the transport-specific fields into `T`.
    pub fn params<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|e| {
            ClientError::configuration(format!(
                "Invalid {} connection: {}",
                self.kind.as_deref().unwrap_or("unknown"),
                e
            ))
        })
    }

    /// Short human-readable target label used in logs.
    pub fn label(&self) -> String {
        let kind = self.kind.as_deref().unwrap_or("?");
        let target = ["host", "container", "pod"]
            .iter()
            .find_map(|key| self.params.get(*key).and_then(Value::as_str));

        match target {
            Some(target) => format!("{}:{}", kind, target),
            None => kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_kind_from_str() {
        assert_eq!(TransportKind::from_str("local"), Some(TransportKind::Local));
        assert_eq!(TransportKind::from_str("ssh"), Some(TransportKind::Ssh));
        assert_eq!(TransportKind::from_str("docker"), Some(TransportKind::Docker));
        assert_eq!(TransportKind::from_str("kubectl"), Some(TransportKind::Kubectl));
        assert_eq!(TransportKind::from_str("SSH"), None);
        assert_eq!(TransportKind::from_str("bogus"), None);
    }

    #[test]
    fn test_descriptor_round_trip_preserves_fields() {
        let raw = json!({
            "type": "ssh",
            "host": "build.example.com",
            "port": 2222,
            "extra": {"nested": [1, 2, 3]}
        });

        let descriptor: ConnectionDescriptor = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(descriptor.kind.as_deref(), Some("ssh"));
        assert_eq!(descriptor.params["port"], 2222);
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), raw);
    }

    #[test]
    fn test_missing_type_is_configuration_error() {
        let descriptor: ConnectionDescriptor =
            serde_json::from_value(json!({"host": "example.com"})).unwrap();
        let err = descriptor.transport().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("type is required"));
    }

    #[test]
    fn test_unknown_type_is_configuration_error() {
        let descriptor: ConnectionDescriptor =
            serde_json::from_value(json!({"type": "bogus"})).unwrap();
        let err = descriptor.transport().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_params_reports_missing_field() {
        #[derive(Debug, Deserialize)]
        struct NeedsHost {
            #[allow(dead_code)]
            host: String,
        }

        let descriptor = ConnectionDescriptor::new(TransportKind::Ssh);
        let err = descriptor.params::<NeedsHost>().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Invalid ssh connection"));
    }

    #[test]
    fn test_label() {
        let descriptor = ConnectionDescriptor::new(TransportKind::Docker).with_param("container", "web");
        assert_eq!(descriptor.label(), "docker:web");
        assert_eq!(ConnectionDescriptor::new(TransportKind::Local).label(), "local");
    }
}
