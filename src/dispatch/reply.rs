//! Normalized reply envelopes, one per request kind.

use serde::Serialize;
use serde_json::Value;

use crate::client::{ClientError, ClientResult, ConnectionDescriptor, ErrorPayload};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Connect(ConnectReply),
    Execute(ExecuteReply),
    Action(ActionReply),
    Info(InfoReply),
}

impl Reply {
    /// Channel name the reply is delivered under.
    pub fn name(&self) -> &'static str {
        match self {
            Reply::Connect(_) => "connect.reply",
            Reply::Execute(_) => "execute.reply",
            Reply::Action(_) => "action.reply",
            Reply::Info(_) => "info.reply",
        }
    }

    /// Whether the reply reports a failure.
    pub fn is_error(&self) -> bool {
        match self {
            Reply::Connect(r) => !r.connected,
            Reply::Execute(r) => matches!(r, ExecuteReply::Error(_)),
            Reply::Action(r) => r.error.is_some(),
            Reply::Info(r) => matches!(r, InfoReply::Error { .. }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectReply {
    pub connected: bool,
    pub connection: ConnectionDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ConnectReply {
    pub fn new(
        connection: ConnectionDescriptor,
        data: Option<Value>,
        outcome: ClientResult<()>,
    ) -> Self {
        Self {
            connected: outcome.is_ok(),
            connection,
            data,
            error: outcome.err().map(ErrorPayload::from),
        }
    }
}

/// Normalized output on success, the bare error value on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecuteReply {
    Output(String),
    Error(ErrorPayload),
}

impl From<ClientResult<String>> for ExecuteReply {
    fn from(result: ClientResult<String>) -> Self {
        match result {
            Ok(raw) => ExecuteReply::Output(normalize_output(&raw)),
            Err(e) => ExecuteReply::Error(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReply {
    #[serde(rename = "type")]
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ActionReply {
    pub fn new(action: String, result: ClientResult<Value>) -> Self {
        match result {
            Ok(value) => Self {
                action,
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                action,
                result: None,
                error: Some(e.into()),
            },
        }
    }
}

/// The raw info value, or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoReply {
    Info(Value),
    Error { error: ErrorPayload },
}

impl From<ClientResult<Value>> for InfoReply {
    fn from(result: ClientResult<Value>) -> Self {
        match result {
            Ok(value) => InfoReply::Info(value),
            Err(e) => InfoReply::Error {
                error: ErrorPayload::from(&e),
            },
        }
    }
}

impl From<ClientError> for InfoReply {
    fn from(err: ClientError) -> Self {
        Self::from(Err::<Value, _>(err))
    }
}

/// Trim, then drop one pair of double quotes wrapping the whole output.
///
/// Some shells hand back quoted strings; `"\"unbalanced` stays as is.
pub fn normalize_output(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}
