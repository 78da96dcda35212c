#![allow(dead_code)]
//! A scripted in-process server for session tests.
//!
//! Each test binds a listener, spawns a script that speaks the server side
//! of the protocol over the crate's own primitives, and connects a real
//! `Session` to it.

use bytes::BytesMut;
use tokio::net::{TcpListener, TcpStream};

use ch_native::column::ColumnData;
use ch_native::connection::Connection;
use ch_native::protocol::{self, ClientCode, CompressionMethod, ServerCode};
use ch_native::query::{Progress, ServerException, ServerInfo};
use ch_native::wire::{self, WireReader};
use ch_native::{compression, Block, Error, Result};

/// Fields of the client Hello as they appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub first_byte: u8,
    pub client_name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub revision: u64,
    pub database: String,
    pub user: String,
    pub password: String,
}

/// The server side of one scripted connection.
pub struct MockServer {
    conn: Connection,
    pub revision: u64,
    pub compression: CompressionMethod,
}

impl MockServer {
    /// Accepts one connection from the listener.
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            conn: Connection::from_stream(stream, Default::default()),
            revision: protocol::CLIENT_REVISION,
            compression: CompressionMethod::None,
        }
    }

    /// Reads the client Hello and replies with a Hello carrying `info`.
    pub async fn handshake(&mut self, info: &ServerInfo) -> ClientHello {
        let hello = self
            .conn
            .decode(|r| {
                let first_byte =
                    *r.peek_remaining().first().ok_or(Error::UnexpectedEof)?;
                let code = r.read_varint()?;
                assert_eq!(code, ClientCode::Hello as u64);
                Ok(ClientHello {
                    first_byte,
                    client_name: r.read_string_lossy()?,
                    version_major: r.read_varint()?,
                    version_minor: r.read_varint()?,
                    revision: r.read_varint()?,
                    database: r.read_string_lossy()?,
                    user: r.read_string_lossy()?,
                    password: r.read_string_lossy()?,
                })
            })
            .await
            .unwrap();
        self.revision = hello.revision.min(info.revision);

        let mut reply = BytesMut::new();
        wire::put_varint(&mut reply, ServerCode::Hello as u64);
        info.write_to(&mut reply);
        self.conn.send(&reply).await.unwrap();
        hello
    }

    /// Default handshake at the client's own revision.
    pub async fn handshake_default(&mut self) -> ClientHello {
        let info = ServerInfo {
            name: "MockHouse".into(),
            version_major: 24,
            version_minor: 1,
            version_patch: 2,
            revision: protocol::CLIENT_REVISION,
            timezone: "UTC".into(),
            display_name: "mock".into(),
        };
        self.handshake(&info).await
    }

    /// Reads a full Query message plus its empty finalizer Data block and
    /// returns the SQL text.
    pub async fn read_query(&mut self) -> String {
        let revision = self.revision;
        let compressed = self.compression.is_enabled();
        self.conn
            .decode(|r| {
                let code = r.read_varint()?;
                assert_eq!(code, ClientCode::Query as u64);
                let _query_id = r.read_string_lossy()?;
                read_client_info(r, revision)?;
                // Settings: (key, flags, value) until the empty key.
                loop {
                    let key = r.read_string_bytes()?;
                    if key.is_empty() {
                        break;
                    }
                    let _flags = r.read_varint()?;
                    let _value = r.read_string_bytes()?;
                }
                let _stage = r.read_varint()?;
                let _compression = r.read_varint()?;
                let text = r.read_string_lossy()?;
                if revision >= protocol::MIN_REVISION_WITH_PARAMETERS {
                    loop {
                        let key = r.read_string_bytes()?;
                        if key.is_empty() {
                            break;
                        }
                        let _kind = r.read_varint()?;
                        let _value = r.read_string_bytes()?;
                    }
                }
                // The query is finalized by an empty Data block.
                let finalizer = read_data_message(r, compressed)?;
                assert!(finalizer.is_empty());
                Ok(text)
            })
            .await
            .unwrap()
    }

    /// Reads one client Data message.
    pub async fn read_data(&mut self) -> Block {
        let compressed = self.compression.is_enabled();
        self.conn
            .decode(|r| {
                let code = r.read_varint()?;
                assert_eq!(code, ClientCode::Data as u64);
                read_data_message(r, compressed)
            })
            .await
            .unwrap()
    }

    /// Reads a Cancel message.
    pub async fn read_cancel(&mut self) {
        self.conn
            .decode(|r| {
                let code = r.read_varint()?;
                assert_eq!(code, ClientCode::Cancel as u64);
                Ok(())
            })
            .await
            .unwrap()
    }

    /// Reads a Ping message.
    pub async fn read_ping(&mut self) {
        self.conn
            .decode(|r| {
                let code = r.read_varint()?;
                assert_eq!(code, ClientCode::Ping as u64);
                Ok(())
            })
            .await
            .unwrap()
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.conn.send(bytes).await.unwrap();
    }

    /// Consumes and discards everything until the peer closes.
    pub async fn drain_until_close(&mut self) {
        loop {
            let drained = self
                .conn
                .decode(|r| {
                    let n = r.remaining();
                    if n == 0 {
                        return Err(Error::UnexpectedEof);
                    }
                    r.read_raw(n)?;
                    Ok(())
                })
                .await;
            if drained.is_err() {
                return;
            }
        }
    }

    /// Sends a Data message carrying `block`.
    pub async fn send_data(&mut self, block: &Block) {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ServerCode::Data as u64);
        wire::put_string(&mut buf, "");
        let mut body = BytesMut::new();
        block.write(&mut body).unwrap();
        if self.compression.is_enabled() {
            let framed = compression::compress(self.compression, &body).unwrap();
            buf.extend_from_slice(&framed);
        } else {
            buf.extend_from_slice(&body);
        }
        self.conn.send(&buf).await.unwrap();
    }

    pub async fn send_end_of_stream(&mut self) {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ServerCode::EndOfStream as u64);
        self.conn.send(&buf).await.unwrap();
    }

    pub async fn send_pong(&mut self) {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ServerCode::Pong as u64);
        self.conn.send(&buf).await.unwrap();
    }

    pub async fn send_progress(&mut self, progress: &Progress) {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ServerCode::Progress as u64);
        progress.write_to(&mut buf, self.revision);
        self.conn.send(&buf).await.unwrap();
    }

    pub async fn send_exception(&mut self, exception: &ServerException) {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ServerCode::Exception as u64);
        exception.write_to(&mut buf);
        self.conn.send(&buf).await.unwrap();
    }
}

fn read_client_info(r: &mut WireReader<'_>, revision: u64) -> Result<()> {
    let query_kind = r.read_u8()?;
    assert_eq!(query_kind, 1);
    let _initial_user = r.read_string_bytes()?;
    let _initial_query_id = r.read_string_bytes()?;
    let _initial_address = r.read_string_bytes()?;
    if revision >= protocol::MIN_REVISION_WITH_INITIAL_QUERY_START_TIME {
        let _start_time = r.read_i64()?;
    }
    let interface = r.read_u8()?;
    assert_eq!(interface, 1);
    let _os_user = r.read_string_bytes()?;
    let _hostname = r.read_string_bytes()?;
    let _client_name = r.read_string_bytes()?;
    let _major = r.read_varint()?;
    let _minor = r.read_varint()?;
    let _client_revision = r.read_varint()?;
    if revision >= protocol::MIN_REVISION_WITH_QUOTA_KEY {
        let _quota_key = r.read_string_bytes()?;
    }
    if revision >= protocol::MIN_REVISION_WITH_DISTRIBUTED_DEPTH {
        let _depth = r.read_varint()?;
    }
    if revision >= protocol::MIN_REVISION_WITH_VERSION_PATCH {
        let _patch = r.read_varint()?;
    }
    if revision >= protocol::MIN_REVISION_WITH_OPENTELEMETRY {
        let _otel = r.read_u8()?;
    }
    Ok(())
}

fn read_data_message(
    r: &mut WireReader<'_>,
    compressed: bool,
) -> Result<Block> {
    let _table = r.read_string_bytes()?;
    if !compressed {
        return Block::read(r);
    }
    let total = compression::frame_total_len(r.peek_remaining())?;
    let frame = r.read_raw(total)?;
    let payload = compression::decompress(frame)?;
    let mut inner = WireReader::new(&payload);
    let block = Block::read(&mut inner)?;
    if !inner.is_empty() {
        return Err(Error::ProtocolViolation(
            "trailing bytes in frame".into(),
        ));
    }
    Ok(block)
}

/// Builds a one-column UInt64 block for tests.
pub fn uint64_block(name: &str, values: &[u64]) -> Block {
    use ch_native::column::ColumnUInt64;
    let mut col = ColumnUInt64::new();
    for &v in values {
        col.append(v);
    }
    let mut block = Block::new();
    block.append_column(name, Box::new(col)).unwrap();
    block
}

/// Asserts a column holds the given u64 values.
pub fn assert_uint64_column(col: &dyn ColumnData, expected: &[u64]) {
    assert_eq!(col.len(), expected.len());
    for (i, &v) in expected.iter().enumerate() {
        assert_eq!(col.value_at(i), ch_native::Value::UInt64(v));
    }
}
