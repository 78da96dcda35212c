//! Async TCP transport.
//!
//! The native protocol is length-free: messages are self-delimiting by
//! their content, so the reader cannot know a message's size up front.
//! [`Connection::decode`] bridges that to the synchronous codecs: it runs a
//! sync parser over the bytes accumulated so far, and every
//! [`Error::UnexpectedEof`] becomes a socket read followed by a retry.
//! Bytes beyond the parsed message stay buffered for the next call, so the
//! stream never loses alignment.
//!
//! Writes are whole encoded messages; backpressure is the awaited
//! `write_all`. Read, write, and connect operations each honor their
//! configured timeout; expiry surfaces [`Error::Timeout`] and poisons the
//! session, which closes the socket by dropping it.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::wire::WireReader;
use crate::{Error, Result};

const READ_CHUNK: usize = 64 * 1024;
const KEEPALIVE_TIME: Duration = Duration::from_secs(60);

/// Timeouts applied to a connection's socket operations.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Deadline for the TCP connect.
    pub connect: Duration,
    /// Idle deadline for each read; `None` waits forever.
    pub read: Option<Duration>,
    /// Deadline for each write; `None` waits forever.
    pub write: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: None,
            write: Some(Duration::from_secs(60)),
        }
    }
}

/// One TCP connection to a server.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    timeouts: Timeouts,
}

impl Connection {
    /// Dials `host:port` with TCP_NODELAY and keepalive enabled.
    pub async fn connect(
        host: &str,
        port: u16,
        timeouts: Timeouts,
    ) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = timeout(timeouts.connect, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout(timeouts.connect))??;

        stream.set_nodelay(true)?;
        SockRef::from(&stream)
            .set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_TIME))?;

        tracing::debug!(addr = %addr, "connected");
        Ok(Self { stream, read_buf: BytesMut::with_capacity(READ_CHUNK), timeouts })
    }

    /// Wraps an already-established stream; used by tests with an
    /// in-process listener.
    pub fn from_stream(stream: TcpStream, timeouts: Timeouts) -> Self {
        Self { stream, read_buf: BytesMut::with_capacity(READ_CHUNK), timeouts }
    }

    /// Runs a sync parser over the buffered bytes, reading more from the
    /// socket whenever the parser reports a short buffer.
    ///
    /// On success the parsed bytes are consumed; any surplus stays
    /// buffered for the next message. Parser errors other than
    /// [`Error::UnexpectedEof`] pass through unchanged.
    pub async fn decode<T, F>(&mut self, mut parse: F) -> Result<T>
    where
        F: FnMut(&mut WireReader<'_>) -> Result<T>,
    {
        loop {
            let mut reader = WireReader::new(&self.read_buf);
            match parse(&mut reader) {
                Ok(value) => {
                    let consumed = reader.consumed();
                    self.read_buf.advance(consumed);
                    return Ok(value);
                }
                Err(Error::UnexpectedEof) => {}
                Err(other) => return Err(other),
            }
            self.fill().await?;
        }
    }

    /// Runs a sync parser over the bytes already buffered, without touching
    /// the socket. `Ok(None)` means the buffer does not yet hold a full
    /// message.
    pub fn try_decode<T, F>(&mut self, mut parse: F) -> Result<Option<T>>
    where
        F: FnMut(&mut WireReader<'_>) -> Result<T>,
    {
        let mut reader = WireReader::new(&self.read_buf);
        match parse(&mut reader) {
            Ok(value) => {
                let consumed = reader.consumed();
                self.read_buf.advance(consumed);
                Ok(Some(value))
            }
            Err(Error::UnexpectedEof) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// One socket read into the buffer; 0 bytes means the peer closed.
    async fn fill(&mut self) -> Result<()> {
        self.read_buf.reserve(READ_CHUNK);
        let read = self.stream.read_buf(&mut self.read_buf);
        let n = match self.timeouts.read {
            Some(t) => {
                timeout(t, read).await.map_err(|_| Error::Timeout(t))??
            }
            None => read.await?,
        };
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Pulls whatever is available without blocking. Returns true when new
    /// bytes arrived, false when the socket had nothing to offer.
    ///
    /// The insert pipeline uses this between blocks to notice an early
    /// server exception without stalling the upload.
    pub fn try_fill(&mut self) -> Result<bool> {
        self.read_buf.reserve(READ_CHUNK);
        match self.stream.try_read_buf(&mut self.read_buf) {
            Ok(0) => Err(Error::ConnectionClosed),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// True when undecoded bytes are already buffered.
    pub fn has_buffered(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Writes one encoded message and flushes it.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match self.timeouts.write {
            Some(t) => {
                timeout(t, write_flush(&mut self.stream, bytes))
                    .await
                    .map_err(|_| Error::Timeout(t))??
            }
            None => write_flush(&mut self.stream, bytes).await?,
        }
        Ok(())
    }

    /// Gracefully shuts down the write half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn write_flush(
    stream: &mut TcpStream,
    bytes: &[u8],
) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Connection::from_stream(client, Timeouts::default()), server)
    }

    #[tokio::test]
    async fn test_decode_across_partial_writes() {
        let (mut conn, mut server) = pair().await;

        let mut payload = BytesMut::new();
        wire::put_varint(&mut payload, 300);
        wire::put_string(&mut payload, "hello");

        // Deliver the message one byte at a time.
        let handle = tokio::spawn(async move {
            for byte in payload.freeze() {
                server.write_all(&[byte]).await.unwrap();
                server.flush().await.unwrap();
            }
            server
        });

        let (n, s) = conn
            .decode(|r| {
                let n = r.read_varint()?;
                let s = r.read_string_lossy()?;
                Ok((n, s))
            })
            .await
            .unwrap();
        assert_eq!(n, 300);
        assert_eq!(s, "hello");
        assert!(!conn.has_buffered());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_keeps_surplus_for_next_message() {
        let (mut conn, mut server) = pair().await;

        let mut payload = BytesMut::new();
        wire::put_varint(&mut payload, 1);
        wire::put_varint(&mut payload, 2);
        server.write_all(&payload).await.unwrap();

        let first = conn.decode(|r| r.read_varint()).await.unwrap();
        assert_eq!(first, 1);
        assert!(conn.has_buffered());
        let second = conn.decode(|r| r.read_varint()).await.unwrap();
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_closed() {
        let (mut conn, server) = pair().await;
        drop(server);
        let err = conn.decode(|r| r.read_varint()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let timeouts = Timeouts {
            read: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();
        let mut conn = Connection::from_stream(client, timeouts);

        let err = conn.decode(|r| r.read_varint()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
