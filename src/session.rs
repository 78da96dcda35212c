//! The client session: one TCP connection and its protocol state machine.
//!
//! ```text
//! Disconnected -> (dial + Hello/HelloReply) -> Idle
//! Idle -> (send Query + empty Data) -> AwaitingData
//! AwaitingData -> Data | Progress | ProfileInfo | TableColumns | Log
//!               | Totals | Extremes | Exception | EndOfStream
//! Exception -> Idle            (surfaced to the caller)
//! EndOfStream -> Idle
//! AwaitingData -> Cancelled    (caller dispatched Cancel)
//! Cancelled -> Idle            (after draining to EndOfStream)
//! Idle -> InsertReady          (INSERT sent, sample block received)
//! ```
//!
//! A session is single-tenant: one query or insert in flight, enforced by
//! `&mut self` receivers and a phase check that reports [`Error::SessionBusy`]
//! when a previous cursor or inserter was abandoned mid-stream. Server
//! messages are handled strictly in delivery order. Transport and protocol
//! errors poison the session (socket closed, state `Disconnected`); server
//! exceptions return it to `Idle` with the socket intact.

use bytes::BytesMut;

use crate::block::Block;
use crate::connection::{Connection, Timeouts};
use crate::compression;
use crate::protocol::{
    self, ClientCode, CompressionMethod, ServerCode,
};
use crate::query::{
    ClientInfo, ProfileInfo, Progress, Query, ServerException, ServerInfo,
};
use crate::sanitize::sanitize_sql;
use crate::wire::{self, WireReader};
use crate::{Error, Result};

/// Connection settings for a session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Server host.
    pub host: String,
    /// Native protocol port.
    pub port: u16,
    /// Database selected at handshake.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Block compression for Data messages, both directions.
    pub compression: CompressionMethod,
    /// Socket timeouts.
    pub timeouts: Timeouts,
    /// Identity reported to the server.
    pub client_info: ClientInfo,
    /// Row threshold at which the insert pipeline ships a block.
    pub insert_batch_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            compression: CompressionMethod::Lz4,
            timeouts: Timeouts::default(),
            client_info: ClientInfo::default(),
            insert_batch_size: 10_000,
        }
    }
}

impl SessionOptions {
    /// Options for `host:port` with the defaults above.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Default::default() }
    }

    /// Sets the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Sets the block compression method.
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Sets the socket timeouts.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the insert pipeline batch size.
    pub fn insert_batch_size(mut self, rows: usize) -> Self {
        self.insert_batch_size = rows;
        self
    }
}

/// The session's protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for a query, insert, or ping.
    Idle,
    /// A query is in flight; the server is streaming its reply.
    AwaitingData,
    /// An insert handshake completed; the caller is shipping blocks.
    InsertReady,
    /// A cancel was dispatched; draining to end of stream.
    Cancelled,
    /// The socket is gone or the stream position is unknown.
    Disconnected,
}

/// A message received from the server, payload decoded.
#[derive(Debug)]
pub(crate) enum ServerMessage {
    Data(Block),
    Totals(Block),
    Extremes(Block),
    Log(Block),
    TableColumns {
        #[allow(dead_code)]
        table: String,
        #[allow(dead_code)]
        description: String,
    },
    Progress(Progress),
    ProfileInfo(ProfileInfo),
    Exception(ServerException),
    Pong,
    EndOfStream,
}

/// The stateful client side of one connection.
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    options: SessionOptions,
    server: ServerInfo,
    revision: u64,
    state: SessionState,
}

impl Session {
    /// Dials the server and performs the Hello handshake.
    pub async fn connect(options: SessionOptions) -> Result<Session> {
        let mut conn =
            Connection::connect(&options.host, options.port, options.timeouts)
                .await?;

        let mut hello = BytesMut::new();
        wire::put_varint(&mut hello, ClientCode::Hello as u64);
        wire::put_string(&mut hello, &options.client_info.client_name);
        wire::put_varint(&mut hello, options.client_info.version_major);
        wire::put_varint(&mut hello, options.client_info.version_minor);
        wire::put_varint(&mut hello, options.client_info.revision);
        wire::put_string(&mut hello, &options.database);
        wire::put_string(&mut hello, &options.user);
        wire::put_string(&mut hello, &options.password);
        conn.send(&hello).await?;

        let server = conn
            .decode(|r| {
                match ServerCode::try_from(r.read_varint()?)? {
                    ServerCode::Hello => ServerInfo::read_from(r),
                    ServerCode::Exception => Err(Error::Server(Box::new(
                        ServerException::read_from(r)?,
                    ))),
                    other => Err(Error::ProtocolViolation(format!(
                        "expected Hello reply, got {:?}",
                        other
                    ))),
                }
            })
            .await?;

        let revision = server.revision.min(options.client_info.revision);
        let version = format!(
            "{}.{}.{}",
            server.version_major, server.version_minor, server.version_patch
        );
        tracing::debug!(
            server = %server.name,
            version = %version,
            revision,
            timezone = %server.timezone,
            "handshake complete"
        );

        Ok(Session {
            conn,
            options,
            server,
            revision,
            state: SessionState::Idle,
        })
    }

    /// Server identity captured at handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// The negotiated protocol revision (min of client and server).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current protocol phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The options this session was opened with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn ensure_idle(&self) -> Result<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Disconnected => Err(Error::InvalidState(
                "session is disconnected".into(),
            )),
            _ => Err(Error::SessionBusy),
        }
    }

    /// Marks the session unusable after a transport or protocol error and
    /// closes the socket.
    async fn poison(&mut self) {
        self.state = SessionState::Disconnected;
        let _ = self.conn.shutdown().await;
    }

    pub(crate) async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        match self.conn.send(bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.poison().await;
                Err(e)
            }
        }
    }

    /// Receives one server message, in delivery order.
    pub(crate) async fn receive(&mut self) -> Result<ServerMessage> {
        let revision = self.revision;
        let compressed = self.options.compression.is_enabled();
        let result = self
            .conn
            .decode(|r| decode_server_message(r, revision, compressed))
            .await;
        match result {
            Ok(message) => Ok(message),
            Err(e) => {
                if e.poisons_session() {
                    self.poison().await;
                }
                Err(e)
            }
        }
    }

    /// Non-blocking receive: decodes a message if one is fully buffered or
    /// readable without waiting.
    pub(crate) fn try_receive(&mut self) -> Result<Option<ServerMessage>> {
        let _ = self.conn.try_fill()?;
        if !self.conn.has_buffered() {
            return Ok(None);
        }
        let revision = self.revision;
        let compressed = self.options.compression.is_enabled();
        self.conn
            .try_decode(|r| decode_server_message(r, revision, compressed))
    }

    /// Encodes a Query message followed by the empty finalizer Data block.
    pub(crate) fn encode_query(&self, query: &Query) -> Result<BytesMut> {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ClientCode::Query as u64);
        wire::put_string(&mut buf, query.id());
        self.options.client_info.write_to(&mut buf, self.revision);

        for (key, value) in query.settings() {
            wire::put_string(&mut buf, key);
            wire::put_varint(&mut buf, 0); // flags
            wire::put_string(&mut buf, value);
        }
        wire::put_string(&mut buf, ""); // end of settings

        wire::put_varint(&mut buf, query.stage() as u64);
        wire::put_varint(
            &mut buf,
            self.options.compression.is_enabled() as u64,
        );
        wire::put_string(&mut buf, query.text());

        if self.revision >= protocol::MIN_REVISION_WITH_PARAMETERS {
            for (key, value) in query.parameters() {
                wire::put_string(&mut buf, key);
                wire::put_varint(&mut buf, 2); // custom kind
                wire::put_string(&mut buf, value);
            }
            wire::put_string(&mut buf, ""); // end of parameters
        }

        self.encode_data(&mut buf, &Block::new())?;
        Ok(buf)
    }

    /// Appends a Data message (table name + optionally framed block).
    pub(crate) fn encode_data(
        &self,
        buf: &mut BytesMut,
        block: &Block,
    ) -> Result<()> {
        wire::put_varint(buf, ClientCode::Data as u64);
        wire::put_string(buf, "");

        let mut body = BytesMut::new();
        block.write(&mut body)?;
        if self.options.compression.is_enabled() {
            let framed =
                compression::compress(self.options.compression, &body)?;
            buf.extend_from_slice(&framed);
        } else {
            buf.extend_from_slice(&body);
        }
        Ok(())
    }

    /// Starts a query and returns a cursor over the reply stream.
    pub async fn query(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryCursor<'_>> {
        let query = query.into();
        self.ensure_idle()?;
        tracing::debug!(
            id = %query.id(),
            sql = %sanitize_sql(query.text()),
            "sending query"
        );
        let bytes = self.encode_query(&query)?;
        self.send_bytes(&bytes).await?;
        self.state = SessionState::AwaitingData;
        Ok(QueryCursor {
            session: self,
            progress: Progress::default(),
            profile: None,
            totals: None,
            extremes: None,
            done: false,
        })
    }

    /// Runs a query and discards any result rows. For DDL and other
    /// statements where only success matters.
    pub async fn execute(&mut self, query: impl Into<Query>) -> Result<()> {
        let mut cursor = self.query(query).await?;
        while cursor.next_block().await?.is_some() {}
        Ok(())
    }

    /// Runs a query and collects every block.
    pub async fn fetch_all(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryResult> {
        let cursor = self.query(query).await?;
        cursor.collect().await
    }

    /// Sends Cancel for the in-flight query and drains the reply stream.
    ///
    /// The socket stays open and the session returns to `Idle`; an
    /// exception observed while draining is expected (the server reports
    /// the kill) and logged rather than raised. A drain failure closes the
    /// socket.
    pub async fn cancel(&mut self) -> Result<()> {
        match self.state {
            SessionState::AwaitingData | SessionState::InsertReady => {}
            SessionState::Idle => return Ok(()),
            _ => {
                return Err(Error::InvalidState(
                    "no cancellable operation in flight".into(),
                ))
            }
        }
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ClientCode::Cancel as u64);
        self.send_bytes(&buf).await?;
        self.state = SessionState::Cancelled;
        tracing::debug!("cancel dispatched, draining");

        loop {
            match self.receive().await? {
                ServerMessage::EndOfStream => {
                    self.state = SessionState::Idle;
                    return Ok(());
                }
                ServerMessage::Exception(e) => {
                    tracing::debug!(code = e.code, "exception while draining cancelled query");
                    self.state = SessionState::Idle;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    /// Sends Ping and waits for Pong. The health-check operation used by
    /// pools and balancers.
    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ClientCode::Ping as u64);
        self.send_bytes(&buf).await?;
        match self.receive().await? {
            ServerMessage::Pong => Ok(()),
            _ => {
                self.poison().await;
                Err(Error::ProtocolViolation("expected Pong".into()))
            }
        }
    }
}

/// Decodes one server message from buffered bytes. Must be a pure function
/// of the reader so the connection can retry it as bytes accumulate.
fn decode_server_message(
    r: &mut WireReader<'_>,
    revision: u64,
    compressed: bool,
) -> Result<ServerMessage> {
    match ServerCode::try_from(r.read_varint()?)? {
        ServerCode::Hello => Err(Error::ProtocolViolation(
            "unexpected Hello outside handshake".into(),
        )),
        ServerCode::Data => {
            Ok(ServerMessage::Data(read_data_block(r, compressed)?))
        }
        ServerCode::Totals => {
            Ok(ServerMessage::Totals(read_data_block(r, compressed)?))
        }
        ServerCode::Extremes => {
            Ok(ServerMessage::Extremes(read_data_block(r, compressed)?))
        }
        // Log blocks are never compressed, whatever was negotiated.
        ServerCode::Log => {
            Ok(ServerMessage::Log(read_data_block(r, false)?))
        }
        ServerCode::TableColumns => Ok(ServerMessage::TableColumns {
            table: r.read_string_lossy()?,
            description: r.read_string_lossy()?,
        }),
        ServerCode::Progress => {
            Ok(ServerMessage::Progress(Progress::read_from(r, revision)?))
        }
        ServerCode::ProfileInfo => {
            Ok(ServerMessage::ProfileInfo(ProfileInfo::read_from(r)?))
        }
        ServerCode::Exception => {
            Ok(ServerMessage::Exception(ServerException::read_from(r)?))
        }
        ServerCode::Pong => Ok(ServerMessage::Pong),
        ServerCode::EndOfStream => Ok(ServerMessage::EndOfStream),
        ServerCode::TablesStatusResponse => Err(Error::ProtocolViolation(
            "unsolicited TablesStatusResponse".into(),
        )),
    }
}

/// Reads a Data message payload: table name, then the block, framed when
/// compression is negotiated.
fn read_data_block(
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
    let block = Block::read(&mut inner).map_err(|e| match e {
        // EOF inside a decompressed frame is corruption, not a short
        // socket read; it must not trigger a retry.
        Error::UnexpectedEof => Error::ProtocolViolation(
            "truncated block inside compressed frame".into(),
        ),
        other => other,
    })?;
    if !inner.is_empty() {
        return Err(Error::ProtocolViolation(
            "trailing bytes inside compressed frame".into(),
        ));
    }
    Ok(block)
}

/// Pull-based reader over a query's reply stream.
///
/// Each [`QueryCursor::next_block`] call consumes server messages in
/// order, folding progress and profile info aside, and returns the next
/// non-empty data block. `Ok(None)` means the stream ended and the session
/// is idle again.
pub struct QueryCursor<'a> {
    session: &'a mut Session,
    progress: Progress,
    profile: Option<ProfileInfo>,
    totals: Option<Block>,
    extremes: Option<Block>,
    done: bool,
}

impl QueryCursor<'_> {
    /// Next data block, or `None` at end of stream.
    pub async fn next_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.session.receive().await? {
                ServerMessage::Data(block) => {
                    // Row-less blocks announce the result schema; they are
                    // not data.
                    if block.row_count() == 0 {
                        continue;
                    }
                    return Ok(Some(block));
                }
                ServerMessage::Progress(p) => self.progress.accumulate(&p),
                ServerMessage::ProfileInfo(p) => self.profile = Some(p),
                ServerMessage::Totals(block) => self.totals = Some(block),
                ServerMessage::Extremes(block) => {
                    self.extremes = Some(block)
                }
                ServerMessage::Log(block) => {
                    tracing::debug!(rows = block.row_count(), "server log");
                }
                ServerMessage::TableColumns { .. } => {}
                ServerMessage::EndOfStream => {
                    self.done = true;
                    self.session.set_state(SessionState::Idle);
                    return Ok(None);
                }
                ServerMessage::Exception(e) => {
                    self.done = true;
                    self.session.set_state(SessionState::Idle);
                    return Err(Error::Server(Box::new(e)));
                }
                ServerMessage::Pong => {
                    self.session.poison().await;
                    return Err(Error::ProtocolViolation(
                        "Pong during query stream".into(),
                    ));
                }
            }
        }
    }

    /// Cancels the in-flight query and drains the stream.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.session.cancel().await
    }

    /// Progress accumulated so far.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Profile info, if the server sent it yet.
    pub fn profile(&self) -> Option<&ProfileInfo> {
        self.profile.as_ref()
    }

    /// The totals block, if any.
    pub fn totals(&self) -> Option<&Block> {
        self.totals.as_ref()
    }

    /// The extremes block, if any.
    pub fn extremes(&self) -> Option<&Block> {
        self.extremes.as_ref()
    }

    /// Drains the stream and collects everything.
    pub async fn collect(mut self) -> Result<QueryResult> {
        let mut blocks = Vec::new();
        while let Some(block) = self.next_block().await? {
            blocks.push(block);
        }
        Ok(QueryResult {
            blocks,
            progress: self.progress,
            profile: self.profile,
        })
    }
}

/// A fully collected query result.
#[derive(Debug)]
pub struct QueryResult {
    /// The data blocks, in delivery order.
    pub blocks: Vec<Block>,
    /// Final accumulated progress.
    pub progress: Progress,
    /// Profile info, if the server sent it.
    pub profile: Option<ProfileInfo>,
}

impl QueryResult {
    /// Total rows across all blocks.
    pub fn total_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.row_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Stage;

    #[test]
    fn test_options_builder() {
        let options = SessionOptions::new("db.internal", 9440)
            .database("metrics")
            .user("writer")
            .password("secret")
            .compression(CompressionMethod::Zstd)
            .insert_batch_size(500);
        assert_eq!(options.host, "db.internal");
        assert_eq!(options.database, "metrics");
        assert_eq!(options.compression, CompressionMethod::Zstd);
        assert_eq!(options.insert_batch_size, 500);
    }

    #[test]
    fn test_decode_rejects_unknown_message() {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, 99);
        let err = decode_server_message(
            &mut WireReader::new(&buf),
            protocol::CLIENT_REVISION,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownMessageKind(99)));
    }

    #[test]
    fn test_decode_end_of_stream() {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, ServerCode::EndOfStream as u64);
        let message = decode_server_message(
            &mut WireReader::new(&buf),
            protocol::CLIENT_REVISION,
            false,
        )
        .unwrap();
        assert!(matches!(message, ServerMessage::EndOfStream));
    }

    #[test]
    fn test_stage_complete_is_two() {
        assert_eq!(Stage::Complete as u64, 2);
    }
}
