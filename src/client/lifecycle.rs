//! Per-request client lifecycle.
//!
//! [`ManagedClient`] owns a transport for the duration of one request and
//! refuses calls that do not fit the current state:
//!
//! ```text
//! Unconnected ──connect──▶ Connected ──setup──▶ SetUp
//!      │                      │                   │
//!      └──(connect fails)──▶ Failed               │
//!                             │                   │
//!  any state ─────────────disconnect──────────▶ Disconnected
//! ```

use serde_json::Value;

use super::descriptor::ConnectionDescriptor;
use super::error::{ClientError, ClientResult};
use super::Client;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unconnected,
    Connected,
    SetUp,
    /// Connect failed; the instance must not be reused.
    Failed,
    Disconnected,
}

impl ClientState {
    fn is_usable(&self) -> bool {
        matches!(self, ClientState::Connected | ClientState::SetUp)
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Unconnected => write!(f, "unconnected"),
            ClientState::Connected => write!(f, "connected"),
            ClientState::SetUp => write!(f, "set up"),
            ClientState::Failed => write!(f, "failed"),
            ClientState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A transport plus its lifecycle state.
pub struct ManagedClient {
    inner: Box<dyn Client>,
    state: ClientState,
}

impl ManagedClient {
    pub fn new(inner: Box<dyn Client>) -> Self {
        Self {
            inner,
            state: ClientState::Unconnected,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn connection(&self) -> &ConnectionDescriptor {
        self.inner.connection()
    }

    fn require(&self, operation: &'static str, allowed: bool) -> ClientResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    pub async fn connect(&mut self) -> ClientResult<()> {
        self.require("connect", self.state == ClientState::Unconnected)?;

        match self.inner.connect().await {
            Ok(()) => {
                self.state = ClientState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ClientState::Failed;
                Err(e)
            }
        }
    }

    /// Run transport setup. Failures are reported as connection errors.
    pub async fn setup(&mut self) -> ClientResult<()> {
        self.require("setup", self.state == ClientState::Connected)?;

        self.inner.setup().await.map_err(ClientError::into_connection)?;
        self.state = ClientState::SetUp;
        Ok(())
    }

    pub async fn execute(&mut self, code: &str) -> ClientResult<String> {
        self.require("execute", self.state.is_usable())?;
        self.inner.execute(code).await
    }

    pub async fn action(&mut self, action: &str, data: &Value) -> ClientResult<Value> {
        self.require("run an action", self.state.is_usable())?;
        self.inner.action(action, data).await
    }

    pub async fn info(&mut self) -> ClientResult<Value> {
        self.require("fetch info", self.state.is_usable())?;
        self.inner.info().await
    }

    /// Release the transport. Never fails; problems are logged.
    ///
    /// Idempotent, and terminal: every later call is rejected.
    pub async fn disconnect(&mut self) {
        if self.state == ClientState::Disconnected {
            return;
        }

        if let Err(e) = self.inner.disconnect().await {
            tracing::warn!(
                "Disconnect from {} failed: {}",
                self.inner.connection().label(),
                e
            );
        }
        self.state = ClientState::Disconnected;
        tracing::debug!("Disconnected from {}", self.inner.connection().label());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory client used by lifecycle and dispatcher tests.

    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::client::descriptor::{ConnectionDescriptor, TransportKind};
    use crate::client::error::{ClientError, ClientResult};
    use crate::client::Client;

    /// Shared record of the calls a mock received, in order.
    pub type CallLog = Arc<Mutex<Vec<String>>>;

    /// Mock behaviour is read from descriptor params:
    /// `fail` names the stage that errors, `output` is the execute result,
    /// `delay_ms` delays execute.
    pub struct MockClient {
        connection: ConnectionDescriptor,
        calls: CallLog,
    }

    impl MockClient {
        pub fn new(connection: ConnectionDescriptor, calls: CallLog) -> Self {
            Self { connection, calls }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn fails_at(&self, stage: &str) -> bool {
            self.connection.params.get("fail").and_then(Value::as_str) == Some(stage)
        }
    }

    #[async_trait]
    impl Client for MockClient {
        fn transport(&self) -> TransportKind {
            TransportKind::Local
        }

        fn connection(&self) -> &ConnectionDescriptor {
            &self.connection
        }

        async fn connect(&mut self) -> ClientResult<()> {
            self.record("connect");
            if self.fails_at("connect") {
                return Err(ClientError::connection("target unreachable"));
            }
            Ok(())
        }

        async fn setup(&mut self) -> ClientResult<()> {
            self.record("setup");
            if self.fails_at("setup") {
                return Err(ClientError::execution("mkdir failed"));
            }
            Ok(())
        }

        async fn execute(&mut self, code: &str) -> ClientResult<String> {
            self.record(&format!("execute:{}", code));
            if let Some(ms) = self.connection.params.get("delay_ms").and_then(Value::as_u64) {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
            if self.fails_at("execute") {
                return Err(ClientError::execution("exit status 1"));
            }
            Ok(self
                .connection
                .params
                .get("output")
                .and_then(Value::as_str)
                .unwrap_or(code)
                .to_string())
        }

        async fn action(&mut self, action: &str, data: &Value) -> ClientResult<Value> {
            self.record(&format!("action:{}", action));
            match action {
                "echo" => Ok(json!({ "echo": data })),
                other => Err(ClientError::unsupported_action(TransportKind::Local, other)),
            }
        }

        async fn info(&mut self) -> ClientResult<Value> {
            self.record("info");
            if self.fails_at("info") {
                return Err(ClientError::execution("probe failed"));
            }
            Ok(json!({ "transport": "mock", "label": self.connection.label() }))
        }

        async fn disconnect(&mut self) -> ClientResult<()> {
            self.record("disconnect");
            if self.fails_at("disconnect") {
                return Err(ClientError::connection("socket already closed"));
            }
            Ok(())
        }
    }
}
