//! Request dispatch.
//!
//! Every request, whatever its kind, goes through [`Dispatcher::with_client`]:
//! acquire a fresh client, connect, run the kind-specific step, disconnect.
//! Configuration errors come back as `Err` because no client ever existed to
//! answer for them; everything else is folded into the reply.

mod reply;
mod request;

use std::time::Instant;

use futures::future::BoxFuture;

use crate::client::{ClientFactory, ClientResult, ConnectionDescriptor, ManagedClient};

pub use reply::{ActionReply, ConnectReply, ExecuteReply, InfoReply, Reply};
pub use request::{ActionRequest, ConnectRequest, ExecuteRequest, InfoRequest, Request};

pub struct Dispatcher<F> {
    factory: F,
}

impl<F: ClientFactory> Dispatcher<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    #[cfg(test)]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub async fn dispatch(&self, request: Request) -> ClientResult<Reply> {
        match request {
            Request::Connect(r) => self.connect(r).await.map(Reply::Connect),
            Request::Execute(r) => self.execute(r).await.map(Reply::Execute),
            Request::Action(r) => self.action(r).await.map(Reply::Action),
            Request::Info(r) => self.info(r).await.map(Reply::Info),
        }
    }

    pub async fn connect(&self, request: ConnectRequest) -> ClientResult<ConnectReply> {
        let wants_setup = request.wants_setup();
        let data = request.data;

        self.with_client("connect", request.connection.as_ref(), move |client, connected| {
            Box::pin(async move {
                let outcome = match connected {
                    Ok(()) if wants_setup => client.setup().await,
                    other => other,
                };
                ConnectReply::new(client.connection().clone(), data, outcome)
            })
        })
        .await
    }

    pub async fn execute(&self, request: ExecuteRequest) -> ClientResult<ExecuteReply> {
        let code = request.code;

        self.with_client("execute", request.connection.as_ref(), move |client, connected| {
            Box::pin(async move {
                let output = match connected {
                    Ok(()) => client.execute(&code).await,
                    Err(e) => Err(e),
                };
                ExecuteReply::from(output)
            })
        })
        .await
    }

    pub async fn action(&self, request: ActionRequest) -> ClientResult<ActionReply> {
        let action = request.action;
        let data = request.data;

        self.with_client("action", request.connection.as_ref(), move |client, connected| {
            Box::pin(async move {
                let result = match connected {
                    Ok(()) => client.action(&action, &data).await,
                    Err(e) => Err(e),
                };
                ActionReply::new(action, result)
            })
        })
        .await
    }

    pub async fn info(&self, request: InfoRequest) -> ClientResult<InfoReply> {
        self.with_client("info", request.connection.as_ref(), |client, connected| {
            Box::pin(async move {
                let info = match connected {
                    Ok(()) => client.info().await,
                    Err(e) => Err(e),
                };
                InfoReply::from(info)
            })
        })
        .await
    }

    /// Run `op` against a freshly connected client and always disconnect.
    ///
    /// `op` receives the connect outcome so it can shape its own reply when
    /// the connection could not be made.
    pub async fn with_client<T, Op>(
        &self,
        operation: &'static str,
        connection: Option<&ConnectionDescriptor>,
        op: Op,
    ) -> ClientResult<T>
    where
        Op: for<'c> FnOnce(&'c mut ManagedClient, ClientResult<()>) -> BoxFuture<'c, T>,
    {
        let mut client = ManagedClient::new(self.factory.acquire(connection)?);
        let label = client.connection().label();
        let started = Instant::now();

        tracing::debug!("{}: connecting to {}", operation, label);
        let connected = client.connect().await;
        if let Err(e) = &connected {
            tracing::debug!("{}: connect to {} failed: {}", operation, label, e);
        }

        let reply = op(&mut client, connected).await;
        client.disconnect().await;

        tracing::info!(
            "{} on {} finished in {}ms",
            operation,
            label,
            started.elapsed().as_millis()
        );
        Ok(reply)
    }
}
