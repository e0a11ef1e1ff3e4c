//! Line-delimited JSON transport.
//!
//! Each input line is `{ "id", "operation", "arguments" }`; each output line
//! is `{ "id", "success", "data", "error" }`. Requests run concurrently and
//! responses are written in completion order by a single writer task.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sharplens_core::Error;
use sharplens_protocol::{Dispatcher, Envelope};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operation name that cancels the in-flight request whose id is given in
/// `arguments.id`. It produces no response of its own.
pub const CANCEL_OPERATION: &str = "$/cancel";

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    operation: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    #[serde(flatten)]
    envelope: Envelope,
}

/// Cancellation tokens of running requests keyed by their serialized id.
/// Requests sharing an id each keep their own entry.
#[derive(Debug, Default)]
struct InFlight {
    next_ticket: u64,
    requests: HashMap<String, Vec<(u64, CancellationToken)>>,
}

impl InFlight {
    fn register(&mut self, key: String, token: CancellationToken) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.requests.entry(key).or_default().push((ticket, token));
        ticket
    }

    fn finish(&mut self, key: &str, ticket: u64) {
        if let Some(entries) = self.requests.get_mut(key) {
            entries.retain(|(held, _)| *held != ticket);
            if entries.is_empty() {
                self.requests.remove(key);
            }
        }
    }

    /// Cancel every running request with this key, returning how many
    fn cancel(&self, key: &str) -> usize {
        let entries = self.requests.get(key).map(Vec::as_slice).unwrap_or_default();
        for (_, token) in entries {
            token.cancel();
        }
        entries.len()
    }
}

pub struct Server {
    dispatcher: Arc<Dispatcher>,
    in_flight: Mutex<InFlight>,
}

impl Server {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// Serve requests from `input` until it reaches EOF, then wait for every
    /// in-flight request to answer.
    pub async fn serve<R, W>(self: Arc<Self>, input: R, output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel::<Response>();
        let writer = tokio::spawn(write_responses(receiver, output));
        let mut tasks = JoinSet::new();
        let mut lines = BufReader::new(input).lines();

        info!("Serving requests");
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request: Request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Malformed request line: {}", e);
                    let error = Error::invalid_argument(format!("Malformed request: {}", e));
                    let _ = sender.send(Response {
                        id: Value::Null,
                        envelope: Envelope::failure(&error),
                    });
                    continue;
                }
            };

            if request.operation == CANCEL_OPERATION {
                self.cancel(&request.arguments).await;
                continue;
            }

            let token = CancellationToken::new();
            let registration = match request_key(&request.id) {
                Some(key) => {
                    let ticket = self.in_flight.lock().await.register(key.clone(), token.clone());
                    Some((key, ticket))
                }
                None => None,
            };

            let server = self.clone();
            let sender = sender.clone();
            tasks.spawn(async move {
                let envelope = server
                    .dispatcher
                    .dispatch(&request.operation, request.arguments, token)
                    .await;
                if let Some((key, ticket)) = registration {
                    server.in_flight.lock().await.finish(&key, ticket);
                }
                let _ = sender.send(Response {
                    id: request.id,
                    envelope,
                });
            });
        }

        debug!("Input closed; waiting for {} in-flight requests", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Request task failed: {}", e);
            }
        }

        drop(sender);
        writer.await??;
        info!("Input closed; server stopped");
        Ok(())
    }

    async fn cancel(&self, arguments: &Value) {
        let Some(key) = arguments.get("id").and_then(request_key) else {
            warn!("Cancel request without an id");
            return;
        };

        match self.in_flight.lock().await.cancel(&key) {
            0 => debug!("Cancel for unknown or finished request {}", key),
            count => info!("Cancelling request {} ({} in flight)", key, count),
        }
    }
}

/// Serialized JSON id, so `"7"` and `7` stay distinct.
/// Requests without an id cannot be cancelled.
fn request_key(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

async fn write_responses<W>(
    mut receiver: mpsc::UnboundedReceiver<Response>,
    mut output: W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = receiver.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
