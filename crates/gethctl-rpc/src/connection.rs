//! The link to the node's IPC endpoint.
//!
//! A [`Connection`] opens its link lazily, on the first call, and reuses it
//! while it stays writable. One reader task per link feeds inbound bytes
//! through the dechunker and routes each response to the [`Correlator`].
//! When the link closes, from either side, the calls still waiting on it
//! fail with [`CallError::ConnectionClosed`] and the next call reconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gethctl_frame::{
    responses_from_frame, DecodeError, Decoded, DechunkerConfig, FrameError, MessageReader,
    MessageWriter, Request, RequestId,
};
use gethctl_transport::{Endpoint, IpcStream};
use serde_json::Value;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::correlator::{Correlator, RequestIds, Resolution};
use crate::error::{CallError, ConnectionError, Result};

/// Default number of buffered diagnostics per subscriber.
pub const DEFAULT_DIAGNOSTIC_CAPACITY: usize = 64;

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Where the node listens.
    pub endpoint: Endpoint,
    /// Framing limits for inbound data.
    pub dechunker: DechunkerConfig,
    /// Deadline for each call's response. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Tear the link down after this long without inbound data.
    pub idle_timeout: Option<Duration>,
    /// Buffered diagnostics per subscriber before the oldest are dropped.
    pub diagnostic_capacity: usize,
}

impl ConnectionConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            dechunker: DechunkerConfig::default(),
            request_timeout: None,
            idle_timeout: None,
            diagnostic_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_dechunker(mut self, dechunker: DechunkerConfig) -> Self {
        self.dechunker = dechunker;
        self
    }
}

/// Event with no owning call, published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Inbound data that could not be decoded.
    Decode(DecodeError),
    /// A decoded message that is not a JSON-RPC response.
    InvalidResponse { reason: String },
    /// A response no call was waiting for. `None` when it had no id.
    UnmatchedResponse { id: Option<RequestId> },
    /// The link went away on its own.
    LinkClosed { reason: String },
}

struct Link {
    writer: MessageWriter<WriteHalf<IpcStream>>,
    alive: CancellationToken,
    reader: JoinHandle<()>,
}

impl Link {
    fn is_writable(&self) -> bool {
        !self.alive.is_cancelled()
    }

    /// Stop the reader and wait until it has failed the calls it carried.
    async fn close(mut self) {
        self.alive.cancel();
        if let Err(err) = self.writer.shutdown().await {
            debug!(error = %err, "shutdown of closed link failed");
        }
        if let Err(err) = self.reader.await {
            debug!(error = %err, "link reader ended abnormally");
        }
    }
}

/// Lazily connected JSON-RPC link to a local node.
pub struct Connection {
    config: ConnectionConfig,
    correlator: Arc<Correlator>,
    link: Mutex<Option<Link>>,
    destroyed: AtomicBool,
    diagnostics: broadcast::Sender<Diagnostic>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_request_ids(config, Arc::new(RequestIds::new()))
    }

    /// Connection whose request ids continue an existing sequence.
    pub fn with_request_ids(config: ConnectionConfig, ids: Arc<RequestIds>) -> Self {
        let (diagnostics, _) = broadcast::channel(config.diagnostic_capacity.max(1));
        Self {
            config,
            correlator: Arc::new(Correlator::with_ids(ids)),
            link: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            diagnostics,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Receive diagnostics emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    /// True while a link is open and accepting writes.
    pub async fn is_writable(&self) -> bool {
        self.link.lock().await.as_ref().is_some_and(Link::is_writable)
    }

    /// Open a link unless a writable one already exists.
    ///
    /// Fails with [`ConnectionError::Destroyed`] once [`Connection::destroy`]
    /// has run.
    pub async fn ensure_connected(&self) -> Result<()> {
        let mut slot = self.link.lock().await;
        if self.is_destroyed() {
            return Err(ConnectionError::Destroyed);
        }
        if slot.as_ref().is_some_and(Link::is_writable) {
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            debug!("discarding closed link");
            stale.close().await;
        }

        let stream = self.config.endpoint.connect().await?;
        info!(
            endpoint = %self.config.endpoint,
            transport = stream.transport_name(),
            "connected to node"
        );

        let (read_half, write_half) = tokio::io::split(stream);
        let alive = CancellationToken::new();
        let reader = ReadLoop {
            reader: MessageReader::with_config(read_half, self.config.dechunker.clone()),
            correlator: Arc::clone(&self.correlator),
            diagnostics: self.diagnostics.clone(),
            idle_timeout: self.config.idle_timeout,
            alive: alive.clone(),
        };

        *slot = Some(Link {
            writer: MessageWriter::with_max_payload(write_half, self.config.dechunker.max_pending),
            alive,
            reader: tokio::spawn(reader.run()),
        });
        Ok(())
    }

    /// Write one request on the current link.
    ///
    /// Fails with [`ConnectionError::NotWritable`] when there is no writable
    /// link or the write fails. Never connects.
    pub async fn send(&self, request: &Request) -> Result<()> {
        let mut slot = self.link.lock().await;
        let Some(link) = slot.as_mut().filter(|link| link.is_writable()) else {
            return Err(ConnectionError::NotWritable {
                reason: "no open link".to_string(),
            });
        };

        let written = link.writer.send(request).await;
        if let Err(err) = written {
            warn!(id = request.id, method = %request.method, error = %err, "request write failed");
            if matches!(err, FrameError::Io(_)) {
                if let Some(dead) = slot.take() {
                    dead.close().await;
                }
            }
            return Err(ConnectionError::NotWritable {
                reason: err.to_string(),
            });
        }
        debug!(id = request.id, method = %request.method, "sent request");
        Ok(())
    }

    /// Issue one call and wait for its response.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> std::result::Result<Value, CallError> {
        self.ensure_connected().await?;

        let (id, rx) = self.correlator.register();
        if let Err(err) = self.send(&Request::new(id, method, params)).await {
            self.correlator.cancel(id);
            return Err(err.into());
        }

        let received = match self.config.request_timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.correlator.cancel(id);
                    warn!(id, method, ?after, "request timed out");
                    return Err(CallError::Timeout { id, after });
                }
            },
            None => rx.await,
        };
        received.unwrap_or_else(|_| Err(CallError::ConnectionClosed))
    }

    /// True once [`Connection::destroy`] has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Close the link, if any, failing the calls still waiting on it.
    ///
    /// Final: later calls fail with [`CallError::ConnectionClosed`] instead
    /// of reconnecting.
    pub async fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        let link = self.link.lock().await.take();
        if let Some(link) = link {
            info!(endpoint = %self.config.endpoint, "closing node link");
            link.close().await;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The reader winds down on its own and fails what is still pending.
        if let Some(link) = self.link.get_mut().take() {
            link.alive.cancel();
        }
    }
}

struct ReadLoop {
    reader: MessageReader<ReadHalf<IpcStream>>,
    correlator: Arc<Correlator>,
    diagnostics: broadcast::Sender<Diagnostic>,
    idle_timeout: Option<Duration>,
    alive: CancellationToken,
}

impl ReadLoop {
    async fn run(mut self) {
        let reason = loop {
            let item = tokio::select! {
                _ = self.alive.cancelled() => break "closed locally".to_string(),
                item = next_within(&mut self.reader, self.idle_timeout) => item,
            };

            match item {
                None => break "idle timeout".to_string(),
                Some(Ok(Decoded::Message(frame))) => self.dispatch(frame),
                Some(Ok(Decoded::Error(err))) => {
                    warn!(kind = %err.kind, text = %err.text, "couldn't decode data from node");
                    self.emit(Diagnostic::Decode(err));
                }
                Some(Err(FrameError::ConnectionClosed)) => break "closed by node".to_string(),
                Some(Err(err)) => break err.to_string(),
            }
        };

        // Unwritable first, then fail: nothing registered later can land here.
        self.alive.cancel();
        info!(reason = %reason, "node link closed");
        let failed = self.correlator.fail_all(|| CallError::ConnectionClosed);
        if failed > 0 {
            warn!(failed, "failed requests still waiting on closed link");
        }
        self.emit(Diagnostic::LinkClosed { reason });
    }

    fn dispatch(&self, frame: Value) {
        for part in responses_from_frame(frame) {
            match part {
                Ok(response) => match self.correlator.resolve(response) {
                    Resolution::Delivered(_) => {}
                    Resolution::Unmatched(id) => {
                        self.emit(Diagnostic::UnmatchedResponse { id: Some(id) })
                    }
                    Resolution::MissingId => self.emit(Diagnostic::UnmatchedResponse { id: None }),
                },
                Err(err) => {
                    warn!(error = %err, "ignoring message that is not a response");
                    self.emit(Diagnostic::InvalidResponse {
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    fn emit(&self, diagnostic: Diagnostic) {
        // No subscribers is fine.
        let _ = self.diagnostics.send(diagnostic);
    }
}

async fn next_within(
    reader: &mut MessageReader<ReadHalf<IpcStream>>,
    idle: Option<Duration>,
) -> Option<gethctl_frame::Result<Decoded>> {
    match idle {
        Some(after) => tokio::time::timeout(after, reader.next()).await.ok(),
        None => Some(reader.next().await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders() {
        let config = ConnectionConfig::new(Endpoint::new("/tmp/geth.ipc"))
            .with_request_timeout(Duration::from_secs(30))
            .with_idle_timeout(Duration::from_secs(600));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.diagnostic_capacity, DEFAULT_DIAGNOSTIC_CAPACITY);
    }

    #[tokio::test]
    async fn send_without_link_is_not_writable() {
        let conn = Connection::new(ConnectionConfig::new(Endpoint::new("/tmp/none.ipc")));
        let err = conn
            .send(&Request::new(1, "eth_accounts", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NotWritable { .. }));
        assert!(!conn.is_writable().await);
    }

    #[tokio::test]
    async fn destroy_without_link_is_a_no_op() {
        let conn = Connection::new(ConnectionConfig::new(Endpoint::new("/tmp/none.ipc")));
        conn.destroy().await;
        conn.destroy().await;
        assert_eq!(conn.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn destroyed_connection_refuses_to_connect() {
        let conn = Connection::new(ConnectionConfig::new(Endpoint::new("/tmp/none.ipc")));
        conn.destroy().await;
        assert!(conn.is_destroyed());
        assert!(matches!(
            conn.ensure_connected().await,
            Err(ConnectionError::Destroyed)
        ));
        assert!(matches!(
            conn.call("eth_accounts", vec![]).await,
            Err(CallError::ConnectionClosed)
        ));
        assert_eq!(conn.correlator().pending_count(), 0);
    }
}
