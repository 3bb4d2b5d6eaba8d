//! Client error taxonomy.
//!
//! Every transport reports failures through [`ClientError`]. The dispatcher
//! folds these into reply envelopes using the serializable [`ErrorPayload`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::descriptor::TransportKind;
use super::lifecycle::ClientState;

/// Errors that can occur while building or driving a client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or invalid connection descriptor. Raised before any transport exists.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Target unreachable, credentials rejected, or target resource missing.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Command ran but failed, or the transport broke mid-command.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Action name not known to the transport.
    #[error("Action '{action}' is not supported by the {transport} transport")]
    UnsupportedAction {
        transport: TransportKind,
        action: String,
    },

    /// Operation attempted in the wrong lifecycle state.
    #[error("Cannot {operation} while client is {state}")]
    InvalidState {
        operation: &'static str,
        state: ClientState,
    },

    /// Transport-level timeout
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },
}

impl ClientError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn unsupported_action(transport: TransportKind, action: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            transport,
            action: action.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Category reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Execution(_) | Self::Timeout { .. } => ErrorKind::Execution,
            Self::UnsupportedAction { .. } => ErrorKind::UnsupportedAction,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }

    #[cfg(test)]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Re-tag an execution-side failure as a connection failure.
    ///
    /// Setup runs commands but is part of establishing the session, so its
    /// failures are reported like connect failures.
    pub fn into_connection(self) -> Self {
        match self {
            Self::Execution(message) => Self::Connection(message),
            Self::Timeout { .. } => Self::Connection(self.to_string()),
            other => other,
        }
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Error category as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Connection,
    Execution,
    UnsupportedAction,
    InvalidState,
}

/// Serializable error value placed into reply envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ClientError> for ErrorPayload {
    fn from(err: &ClientError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ClientError> for ErrorPayload {
    fn from(err: ClientError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_action_display() {
        let err = ClientError::unsupported_action(TransportKind::Docker, "upload");
        assert_eq!(
            err.to_string(),
            "Action 'upload' is not supported by the docker transport"
        );
        assert_eq!(err.kind(), ErrorKind::UnsupportedAction);
    }

    #[test]
    fn test_timeout_is_execution_kind() {
        let err = ClientError::timeout("execute", Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_into_connection() {
        let err = ClientError::execution("mkdir: permission denied").into_connection();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("permission denied"));

        let err = ClientError::timeout("setup", Duration::from_secs(1)).into_connection();
        assert_eq!(err.kind(), ErrorKind::Connection);

        let err = ClientError::configuration("bad").into_connection();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_payload_serialization() {
        let payload = ErrorPayload::from(ClientError::connection("host unreachable"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "connection");
        assert_eq!(json["message"], "Connection failed: host unreachable");
    }
}
