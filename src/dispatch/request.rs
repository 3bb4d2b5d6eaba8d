//! Inbound operation payloads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::client::ConnectionDescriptor;

/// One operation, tagged by `op` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Connect(ConnectRequest),
    Execute(ExecuteRequest),
    Action(ActionRequest),
    Info(InfoRequest),
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::Connect(_) => "connect",
            Request::Execute(_) => "execute",
            Request::Action(_) => "action",
            Request::Info(_) => "info",
        }
    }

    pub fn connection(&self) -> Option<&ConnectionDescriptor> {
        match self {
            Request::Connect(r) => r.connection.as_ref(),
            Request::Execute(r) => r.connection.as_ref(),
            Request::Action(r) => r.connection.as_ref(),
            Request::Info(r) => r.connection.as_ref(),
        }
    }
}

/// Connectivity test, optionally followed by environment setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub connection: Option<ConnectionDescriptor>,
    /// Opaque caller data, echoed back in the reply. An explicit `null`
    /// is kept so the echo matches what was sent.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

impl ConnectRequest {
    /// Setup runs only when `data.setup` is literally `true`.
    pub fn wants_setup(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|data| data.get("setup"))
            .and_then(Value::as_bool)
            == Some(true)
    }
}

/// Any value that is present, `null` included.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub connection: Option<ConnectionDescriptor>,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub connection: Option<ConnectionDescriptor>,
    #[serde(rename = "type")]
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub connection: Option<ConnectionDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tagged_request() {
        let request: Request = serde_json::from_value(json!({
            "op": "action",
            "connection": {"type": "docker", "container": "web"},
            "type": "read_file",
            "data": {"path": "/etc/hostname"}
        }))
        .unwrap();

        let Request::Action(action) = &request else {
            panic!("expected action request, got {:?}", request);
        };
        assert_eq!(request.op(), "action");
        assert_eq!(action.action, "read_file");
        assert_eq!(action.data["path"], "/etc/hostname");
        assert_eq!(
            request.connection().unwrap().params.get("container"),
            Some(&json!("web"))
        );
    }

    #[test]
    fn test_missing_connection_is_none() {
        let request: Request = serde_json::from_value(json!({"op": "info"})).unwrap();
        assert!(request.connection().is_none());
    }

    #[test]
    fn test_wants_setup_requires_literal_true() {
        let with = |data: Value| ConnectRequest {
            connection: None,
            data: Some(data),
        };

        assert!(with(json!({"setup": true})).wants_setup());
        assert!(!with(json!({"setup": "true"})).wants_setup());
        assert!(!with(json!({"setup": 1})).wants_setup());
        assert!(!with(json!({})).wants_setup());
        assert!(!with(Value::Null).wants_setup());
        assert!(!ConnectRequest::default().wants_setup());
    }

    #[test]
    fn test_connect_data_absent_vs_null() {
        let request: Request = serde_json::from_value(json!({"op": "connect"})).unwrap();
        let Request::Connect(missing) = request else {
            panic!("expected connect request");
        };
        assert_eq!(missing.data, None);

        let request: Request =
            serde_json::from_value(json!({"op": "connect", "data": null})).unwrap();
        let Request::Connect(null) = request else {
            panic!("expected connect request");
        };
        assert_eq!(null.data, Some(Value::Null));
    }

    #[test]
    fn test_unknown_op_rejected() {
        let result = serde_json::from_value::<Request>(json!({"op": "reboot"}));
        assert!(result.is_err());
    }
}
