use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::dechunker::DEFAULT_MAX_PENDING;
use crate::error::{FrameError, Result};

/// Writes JSON messages to any `AsyncWrite` stream.
///
/// Messages are written back to back with no delimiter, the way the node
/// expects them.
pub struct MessageWriter<T> {
    inner: T,
    max_payload_size: usize,
}

impl<T: AsyncWrite + Unpin> MessageWriter<T> {
    /// Create a new writer with the default payload cap (16 MiB).
    pub fn new(inner: T) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PENDING)
    }

    /// Create a new writer with an explicit payload cap.
    pub fn with_max_payload(inner: T, max_payload_size: usize) -> Self {
        Self {
            inner,
            max_payload_size,
        }
    }

    /// Serialize and write one message.
    pub async fn send<M: Serialize>(&mut self, message: &M) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.send_raw(&payload).await
    }

    /// Write pre-serialized bytes as one message.
    pub async fn send_raw(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }

        trace!(payload_bytes = payload.len(), "writing message");
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
