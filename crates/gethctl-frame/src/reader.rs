use std::collections::VecDeque;
use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::debug;

use crate::dechunker::{Decoded, Dechunker, DechunkerConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads decoded JSON values from any `AsyncRead` stream.
///
/// Handles partial reads internally and drives the dechunker's decode
/// deadline, so a stalled partial value surfaces as a
/// [`Decoded::Error`] even when no more bytes arrive.
pub struct MessageReader<T> {
    inner: T,
    dechunker: Dechunker,
    ready: VecDeque<Decoded>,
    chunk: Box<[u8]>,
}

impl<T: AsyncRead + Unpin> MessageReader<T> {
    /// Create a new reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, DechunkerConfig::default())
    }

    /// Create a new reader with explicit configuration.
    pub fn with_config(inner: T, config: DechunkerConfig) -> Self {
        Self {
            inner,
            dechunker: Dechunker::with_config(config),
            ready: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Wait for the next decoded item.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Cancel-safe: dropping the future loses no buffered data.
    pub async fn next(&mut self) -> Result<Decoded> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Ok(item);
            }

            let Self {
                inner,
                dechunker,
                chunk,
                ..
            } = self;

            let read = match dechunker.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        read = inner.read(&mut chunk[..]) => Some(read),
                        _ = tokio::time::sleep_until(Instant::from_std(deadline)) => None,
                    }
                }
                None => Some(inner.read(&mut chunk[..]).await),
            };

            match read {
                None => {
                    if let Some(err) = self.dechunker.poll_expired(Instant::now().into_std()) {
                        return Ok(Decoded::Error(err));
                    }
                }
                Some(Ok(0)) => {
                    if let Some(pending) = self.dechunker.pending() {
                        debug!(
                            pending_bytes = pending.len(),
                            "stream ended with partial data"
                        );
                    }
                    return Err(FrameError::ConnectionClosed);
                }
                Some(Ok(n)) => {
                    let now = Instant::now().into_std();
                    let ready = &mut self.ready;
                    self.dechunker
                        .feed(&self.chunk[..n], now, |item| ready.push_back(item));
                }
                Some(Err(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Some(Err(err)) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes currently held as partial data.
    pub fn pending(&self) -> Option<&[u8]> {
        self.dechunker.pending()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::dechunker::DEFAULT_DECODE_TIMEOUT;
    use crate::error::DecodeErrorKind;

    #[tokio::test]
    async fn reads_values_across_writes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = MessageReader::new(rx);

        tx.write_all(br#"{"id":1,"resu"#).await.unwrap();
        tx.write_all(br#"lt":"0xabc"}{"id":2,"result":true}"#)
            .await
            .unwrap();

        assert_eq!(
            reader.next().await.unwrap(),
            Decoded::Message(json!({"id":1,"result":"0xabc"}))
        );
        assert_eq!(
            reader.next().await.unwrap(),
            Decoded::Message(json!({"id":2,"result":true}))
        );
    }

    #[tokio::test]
    async fn eof_is_connection_closed() {
        let (tx, rx) = tokio::io::duplex(64);
        let mut reader = MessageReader::new(rx);
        drop(tx);

        assert!(matches!(
            reader.next().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn values_before_eof_are_delivered() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = MessageReader::new(rx);
        tx.write_all(br#"{"a":1}{"b":2}"#).await.unwrap();
        drop(tx);

        assert_eq!(reader.next().await.unwrap(), Decoded::Message(json!({"a":1})));
        assert_eq!(reader.next().await.unwrap(), Decoded::Message(json!({"b":2})));
        assert!(matches!(
            reader.next().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_partial_value_times_out() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = MessageReader::new(rx);
        tx.write_all(br#"{"id":1,"resu"#).await.unwrap();

        let started = Instant::now();
        match reader.next().await.unwrap() {
            Decoded::Error(err) => {
                assert_eq!(err.kind, DecodeErrorKind::TimedOut);
                assert_eq!(err.text, r#"{"id":1,"resu"#);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(started.elapsed() >= DEFAULT_DECODE_TIMEOUT);

        // Nothing more is reported for the same stalled data.
        let again = tokio::time::timeout(Duration::from_secs(60), reader.next()).await;
        assert!(again.is_err());
        assert!(reader.pending().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_decode_timeout_is_honoured() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = MessageReader::with_config(
            rx,
            DechunkerConfig {
                decode_timeout: Duration::from_millis(250),
                ..DechunkerConfig::default()
            },
        );
        tx.write_all(b"[1,").await.unwrap();

        let started = Instant::now();
        let item = reader.next().await.unwrap();
        assert!(matches!(item, Decoded::Error(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn reads_over_ipc_stream_pair() {
        let (mut left, right) = gethctl_transport::IpcStream::pair().unwrap();
        let mut reader = MessageReader::new(right);

        left.write_all(br#"{"id":9,"result":"0x1"}"#).await.unwrap();
        assert_eq!(
            reader.next().await.unwrap(),
            Decoded::Message(json!({"id":9,"result":"0x1"}))
        );
    }
}
