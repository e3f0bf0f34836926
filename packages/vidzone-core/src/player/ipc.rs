//! JSON IPC transport to the renderer.
//!
//! The renderer speaks newline-delimited JSON over a Unix socket. Commands
//! carry a `request_id` and are answered by a reply with the same id; lines
//! without an id are asynchronous events.
//!
//! ```text
//! → {"command":["set_property","volume",40],"request_id":7}
//! ← {"data":null,"error":"success","request_id":7}
//! ← {"event":"property-change","id":1,"name":"time-pos","data":12.48}
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::protocol_constants::IPC_SUCCESS;

/// Buffered events per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("'{command}' got no reply within {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("renderer IPC connection closed")]
    Closed,

    /// The renderer answered with an error status.
    #[error("renderer rejected '{command}': {message}")]
    Command { command: String, message: String },

    #[error("renderer IPC I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode renderer command: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Kinds of asynchronous renderer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PropertyChange,
    EndFile,
}

/// An asynchronous renderer event.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// An observed property changed. `id` is the observation id.
    PropertyChange { id: u64, name: String, data: Value },
    /// The current file ended or failed to load.
    EndFile { reason: Option<String> },
}

impl MediaEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PropertyChange { .. } => EventKind::PropertyChange,
            Self::EndFile { .. } => EventKind::EndFile,
        }
    }
}

/// One inbound line, before it is classified as reply or event.
#[derive(Debug, Deserialize)]
struct InboundLine {
    request_id: Option<u64>,
    error: Option<String>,
    #[serde(default)]
    data: Value,
    event: Option<String>,
    id: Option<u64>,
    name: Option<String>,
    reason: Option<String>,
}

type Reply = Result<Value, String>;
type PendingReplies = Arc<DashMap<u64, oneshot::Sender<Reply>>>;

/// Request/response channel to a running renderer.
///
/// Cloning is not supported; share it behind an `Arc`. Dropping the transport
/// stops its reader task, which ends all event streams.
pub struct IpcTransport {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingReplies,
    next_id: AtomicU64,
    events: Arc<Mutex<Option<broadcast::Sender<MediaEvent>>>>,
    closed: CancellationToken,
    command_timeout: Duration,
    reader: JoinHandle<()>,
}

impl IpcTransport {
    /// Connects to a renderer socket once. Use the launcher's retry loop to
    /// wait for the socket to appear.
    pub async fn connect(path: &Path, command_timeout: Duration) -> TransportResult<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::new(stream, command_timeout))
    }

    /// Wraps an already connected stream and starts the reader task.
    pub fn new(stream: UnixStream, command_timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: PendingReplies = Arc::new(DashMap::new());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let events = Arc::new(Mutex::new(Some(event_tx)));
        let closed = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&events),
            closed.clone(),
        ));

        Self {
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            events,
            closed,
            command_timeout,
            reader,
        }
    }

    /// Returns true once the renderer side has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Sends a command and waits for its reply.
    ///
    /// Returns the reply's `data` field on success.
    pub async fn send(&self, command: &str, args: Vec<Value>) -> TransportResult<Value> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(Value::from(command));
        words.extend(args);
        let mut line = serde_json::to_vec(&json!({ "command": words, "request_id": id }))?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // The reader clears the table after marking the channel closed.
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let exchange = async {
            {
                let mut writer = self.writer.lock().await;
                writer.write_all(&line).await.map_err(map_write_error)?;
                writer.flush().await.map_err(map_write_error)?;
            }
            rx.await.map_err(|_| TransportError::Closed)
        };

        let reply = tokio::time::timeout(self.command_timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                command: command.to_string(),
                after: self.command_timeout,
            })??;

        reply.map_err(|message| TransportError::Command {
            command: command.to_string(),
            message,
        })
    }

    /// Returns a lazy stream of events of one kind.
    ///
    /// The stream runs for the life of the connection and ends when the
    /// renderer closes the socket.
    pub fn subscribe(&self, kind: EventKind) -> impl Stream<Item = MediaEvent> + Send + 'static {
        let rx = self.events.lock().as_ref().map(broadcast::Sender::subscribe);
        async_stream::stream! {
            let Some(rx) = rx else {
                return;
            };
            let mut events = BroadcastStream::new(rx);
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) if event.kind() == kind => yield event,
                    Ok(_) => {}
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        log::warn!("[Ipc] Event subscriber lagged, skipped {} event(s)", skipped);
                    }
                }
            }
        }
    }
}

impl Drop for IpcTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a pending reply slot when `send` returns for any reason.
struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

fn map_write_error(err: std::io::Error) -> TransportError {
    match err.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::NotConnected => TransportError::Closed,
        _ => TransportError::Io(err),
    }
}

async fn read_loop(
    read_half: OwnedReadHalf,
    pending: PendingReplies,
    events: Arc<Mutex<Option<broadcast::Sender<MediaEvent>>>>,
    closed: CancellationToken,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch_line(&line, &pending, &events),
            Ok(None) => {
                log::debug!("[Ipc] Renderer closed the connection");
                break;
            }
            Err(e) => {
                log::warn!("[Ipc] Read failed: {}", e);
                break;
            }
        }
    }

    closed.cancel();
    // Dropping the senders fails outstanding requests and ends event streams.
    pending.clear();
    events.lock().take();
}

fn dispatch_line(
    line: &str,
    pending: &PendingReplies,
    events: &Mutex<Option<broadcast::Sender<MediaEvent>>>,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let inbound: InboundLine = match serde_json::from_str(line) {
        Ok(inbound) => inbound,
        Err(e) => {
            log::warn!("[Ipc] Skipping unparseable line ({}): {}", e, line);
            return;
        }
    };

    if let Some(request_id) = inbound.request_id {
        let Some((_, tx)) = pending.remove(&request_id) else {
            log::debug!("[Ipc] Reply for unknown request {}", request_id);
            return;
        };
        let reply = match inbound.error.as_deref() {
            Some(IPC_SUCCESS) | None => Ok(inbound.data),
            Some(message) => Err(message.to_string()),
        };
        let _ = tx.send(reply);
        return;
    }

    let event = match inbound.event.as_deref() {
        Some("property-change") => MediaEvent::PropertyChange {
            id: inbound.id.unwrap_or_default(),
            name: inbound.name.unwrap_or_default(),
            data: inbound.data,
        },
        Some("end-file") => MediaEvent::EndFile {
            reason: inbound.reason,
        },
        Some(other) => {
            log::trace!("[Ipc] Ignoring event '{}'", other);
            return;
        }
        None => {
            log::warn!("[Ipc] Line is neither reply nor event: {}", line);
            return;
        }
    };

    if let Some(tx) = events.lock().as_ref() {
        let _ = tx.send(event);
    }
}
