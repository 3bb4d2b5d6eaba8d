//! JSON-lines request/reply channel.
//!
//! Reads one request object per line, runs each as its own task and writes
//! one reply object per line in completion order. Callers correlate by `id`.
//!
//! ```text
//! → {"id": 1, "op": "execute", "connection": {"type": "local"}, "code": "uname"}
//! ← {"id": 1, "reply": "execute.reply", "payload": "Linux"}
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::{ClientFactory, ErrorKind, ErrorPayload};
use crate::dispatch::{Dispatcher, Reply, Request};
use crate::error::Result;

/// One outbound line.
#[derive(Debug, Serialize)]
struct Frame {
    id: Value,
    reply: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Reply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorPayload>,
}

impl Frame {
    fn reply(id: Value, payload: Reply) -> Self {
        Self {
            id,
            reply: payload.name(),
            payload: Some(payload),
            error: None,
        }
    }

    fn error(id: Value, error: ErrorPayload) -> Self {
        Self {
            id,
            reply: "error",
            payload: None,
            error: Some(error),
        }
    }
}

fn rejected(id: Value, message: String) -> Frame {
    Frame::error(
        id,
        ErrorPayload {
            kind: ErrorKind::Configuration,
            message,
        },
    )
}

/// Split a raw line into its correlation id and request, or an error frame.
fn parse_line(line: &[u8]) -> std::result::Result<(Value, Request), Frame> {
    let line = std::str::from_utf8(line)
        .map_err(|e| rejected(Value::Null, format!("Invalid UTF-8: {}", e)))?;
    let value: Value = serde_json::from_str(line)
        .map_err(|e| rejected(Value::Null, format!("Invalid JSON: {}", e)))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);

    match serde_json::from_value::<Request>(value) {
        Ok(request) => Ok((id, request)),
        Err(e) => Err(rejected(id, format!("Invalid request: {}", e))),
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(output: &mut W, frame: &Frame) -> Result<()> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}

/// Serve requests from `input` until EOF, then wait for in-flight requests.
///
/// A read error stops intake but still drains in-flight requests before it
/// is returned.
pub async fn serve<F, R, W>(dispatcher: Arc<Dispatcher<F>>, input: R, mut output: W) -> Result<()>
where
    F: ClientFactory + 'static,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).split(b'\n');
    let mut tasks: JoinSet<Frame> = JoinSet::new();
    let mut input_open = true;
    let mut read_error = None;
    let mut served = 0usize;

    loop {
        tokio::select! {
            line = lines.next_segment(), if input_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::debug!("Input closed, draining {} request(s)", tasks.len());
                        input_open = false;
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to read input, draining {} request(s): {}",
                            tasks.len(),
                            e
                        );
                        read_error = Some(e);
                        input_open = false;
                        continue;
                    }
                };

                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }

                match parse_line(&line) {
                    Ok((id, request)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let span = tracing::info_span!(
                            "request",
                            trace_id = %Uuid::new_v4(),
                            op = request.op()
                        );
                        tasks.spawn(
                            async move { handle(&dispatcher, id, request).await }.instrument(span),
                        );
                    }
                    Err(frame) => {
                        tracing::warn!("Rejected request line: {:?}", frame.error);
                        write_frame(&mut output, &frame).await?;
                    }
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                match joined {
                    Ok(frame) => {
                        served += 1;
                        write_frame(&mut output, &frame).await?;
                    }
                    Err(e) => tracing::error!("Request task failed: {}", e),
                }
            }
            else => break,
        }
    }

    tracing::debug!("Served {} request(s)", served);
    match read_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Serve on the process's stdin and stdout.
pub async fn serve_stdio<F>(dispatcher: Dispatcher<F>) -> Result<()>
where
    F: ClientFactory + 'static,
{
    tracing::info!("Serving JSON-lines requests on stdio");
    serve(Arc::new(dispatcher), tokio::io::stdin(), tokio::io::stdout()).await
}

async fn handle<F: ClientFactory>(dispatcher: &Dispatcher<F>, id: Value, request: Request) -> Frame {
    let op = request.op();

    match dispatcher.dispatch(request).await {
        Ok(reply) => Frame::reply(id, reply),
        Err(e) => {
            tracing::warn!("{} request {} rejected: {}", op, id, e);
            Frame::error(id, ErrorPayload::from(&e))
        }
    }
}
