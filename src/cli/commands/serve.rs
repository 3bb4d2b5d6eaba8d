use crate::client::ClientFactory;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::server;

pub async fn execute<F: ClientFactory + 'static>(dispatcher: Dispatcher<F>) -> Result<()> {
    server::serve_stdio(dispatcher).await
}
