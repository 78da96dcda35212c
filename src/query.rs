//! Query state and the message payload structs.
//!
//! Each struct that crosses the wire carries a `write_to`/`read_from` pair
//! over the sync codec; the session composes them into full messages.
//! Revision-gated fields appear on the wire in ascending gate order and
//! only when the negotiated revision allows them.

use std::fmt;

use bytes::{BufMut, BytesMut};
use uuid::Uuid;

use crate::protocol::{self, Stage};
use crate::wire::{self, WireReader};
use crate::Result;

/// A query prepared for execution.
#[derive(Clone, Debug)]
pub struct Query {
    id: String,
    text: String,
    settings: Vec<(String, String)>,
    parameters: Vec<(String, String)>,
    stage: Stage,
}

impl Query {
    /// Creates a query with a generated UUID id and default stage.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            settings: Vec::new(),
            parameters: Vec::new(),
            stage: Stage::Complete,
        }
    }

    /// Overrides the generated query id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Adds a per-query setting.
    pub fn with_setting(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.settings.push((key.into(), value.into()));
        self
    }

    /// Adds a query parameter (revision-gated on the wire).
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    /// The query id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The SQL text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The ordered settings list.
    pub fn settings(&self) -> &[(String, String)] {
        &self.settings
    }

    /// The ordered parameters list.
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// The requested processing stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// Client identity sent in the Hello and Query messages.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    /// 1 = this is the initial query, not a distributed sub-query.
    pub query_kind: u8,
    /// User that issued the initial query (empty for direct clients).
    pub initial_user: String,
    /// Id of the initial query (empty for direct clients).
    pub initial_query_id: String,
    /// Address the initial query came from.
    pub initial_address: String,
    /// Interface: 1 = TCP.
    pub interface: u8,
    /// Operating system user name.
    pub os_user: String,
    /// Hostname reported to the server.
    pub client_hostname: String,
    /// Client program name.
    pub client_name: String,
    /// Client version, major.
    pub version_major: u64,
    /// Client version, minor.
    pub version_minor: u64,
    /// Client version, patch.
    pub version_patch: u64,
    /// Highest protocol revision the client speaks.
    pub revision: u64,
    /// Quota key, revision-gated.
    pub quota_key: String,
    /// Distributed query depth, revision-gated.
    pub distributed_depth: u64,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            query_kind: 1,
            initial_user: String::new(),
            initial_query_id: String::new(),
            initial_address: "0.0.0.0:0".to_string(),
            interface: 1,
            os_user: std::env::var("USER").unwrap_or_default(),
            client_hostname: "localhost".to_string(),
            client_name: protocol::CLIENT_NAME.to_string(),
            version_major: protocol::CLIENT_VERSION_MAJOR,
            version_minor: protocol::CLIENT_VERSION_MINOR,
            version_patch: protocol::CLIENT_VERSION_PATCH,
            revision: protocol::CLIENT_REVISION,
            quota_key: String::new(),
            distributed_depth: 0,
        }
    }
}

impl ClientInfo {
    /// Writes the client info section of a Query message.
    pub fn write_to(&self, buf: &mut BytesMut, revision: u64) {
        buf.put_u8(self.query_kind);
        wire::put_string(buf, &self.initial_user);
        wire::put_string(buf, &self.initial_query_id);
        wire::put_string(buf, &self.initial_address);
        if revision >= protocol::MIN_REVISION_WITH_INITIAL_QUERY_START_TIME {
            buf.put_i64_le(0); // start time is filled in by the server
        }
        buf.put_u8(self.interface);
        wire::put_string(buf, &self.os_user);
        wire::put_string(buf, &self.client_hostname);
        wire::put_string(buf, &self.client_name);
        wire::put_varint(buf, self.version_major);
        wire::put_varint(buf, self.version_minor);
        wire::put_varint(buf, self.revision);
        if revision >= protocol::MIN_REVISION_WITH_QUOTA_KEY {
            wire::put_string(buf, &self.quota_key);
        }
        if revision >= protocol::MIN_REVISION_WITH_DISTRIBUTED_DEPTH {
            wire::put_varint(buf, self.distributed_depth);
        }
        if revision >= protocol::MIN_REVISION_WITH_VERSION_PATCH {
            wire::put_varint(buf, self.version_patch);
        }
        if revision >= protocol::MIN_REVISION_WITH_OPENTELEMETRY {
            buf.put_u8(0); // no trace context attached
        }
    }
}

/// Server identity captured once at handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server program name.
    pub name: String,
    /// Server version, major.
    pub version_major: u64,
    /// Server version, minor.
    pub version_minor: u64,
    /// Server version, patch (0 below the gate).
    pub version_patch: u64,
    /// Server protocol revision.
    pub revision: u64,
    /// Server timezone (empty below the gate).
    pub timezone: String,
    /// Server display name (empty below the gate).
    pub display_name: String,
}

impl ServerInfo {
    /// Writes a Hello reply body; gated fields in ascending gate order.
    pub fn write_to(&self, buf: &mut BytesMut) {
        wire::put_string(buf, &self.name);
        wire::put_varint(buf, self.version_major);
        wire::put_varint(buf, self.version_minor);
        wire::put_varint(buf, self.revision);
        if self.revision >= protocol::MIN_REVISION_WITH_SERVER_TIMEZONE {
            wire::put_string(buf, &self.timezone);
        }
        if self.revision >= protocol::MIN_REVISION_WITH_VERSION_PATCH {
            wire::put_varint(buf, self.version_patch);
        }
        if self.revision >= protocol::MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
            wire::put_string(buf, &self.display_name);
        }
    }

    /// Reads a Hello reply body.
    pub fn read_from(reader: &mut WireReader<'_>) -> Result<Self> {
        let name = reader.read_string_lossy()?;
        let version_major = reader.read_varint()?;
        let version_minor = reader.read_varint()?;
        let revision = reader.read_varint()?;
        let timezone =
            if revision >= protocol::MIN_REVISION_WITH_SERVER_TIMEZONE {
                reader.read_string_lossy()?
            } else {
                String::new()
            };
        let version_patch =
            if revision >= protocol::MIN_REVISION_WITH_VERSION_PATCH {
                reader.read_varint()?
            } else {
                0
            };
        let display_name =
            if revision >= protocol::MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
                reader.read_string_lossy()?
            } else {
                String::new()
            };
        Ok(Self {
            name,
            version_major,
            version_minor,
            version_patch,
            revision,
            timezone,
            display_name,
        })
    }
}

/// Revision from which Progress carries written rows/bytes.
const MIN_REVISION_WITH_WRITTEN_PROGRESS: u64 = 54449;

/// Query progress counters; cumulative over a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    /// Rows read so far.
    pub rows: u64,
    /// Bytes read so far.
    pub bytes: u64,
    /// Estimated total rows to read.
    pub total_rows: u64,
    /// Rows written so far (inserts).
    pub written_rows: u64,
    /// Bytes written so far (inserts).
    pub written_bytes: u64,
}

impl Progress {
    /// Writes a Progress message body.
    pub fn write_to(&self, buf: &mut BytesMut, revision: u64) {
        wire::put_varint(buf, self.rows);
        wire::put_varint(buf, self.bytes);
        wire::put_varint(buf, self.total_rows);
        if revision >= MIN_REVISION_WITH_WRITTEN_PROGRESS {
            wire::put_varint(buf, self.written_rows);
            wire::put_varint(buf, self.written_bytes);
        }
    }

    /// Reads a Progress message body.
    pub fn read_from(
        reader: &mut WireReader<'_>,
        revision: u64,
    ) -> Result<Self> {
        let rows = reader.read_varint()?;
        let bytes = reader.read_varint()?;
        let total_rows = reader.read_varint()?;
        let (written_rows, written_bytes) =
            if revision >= MIN_REVISION_WITH_WRITTEN_PROGRESS {
                (reader.read_varint()?, reader.read_varint()?)
            } else {
                (0, 0)
            };
        Ok(Self { rows, bytes, total_rows, written_rows, written_bytes })
    }

    /// Accumulates another progress message into this one.
    pub fn accumulate(&mut self, other: &Progress) {
        self.rows += other.rows;
        self.bytes += other.bytes;
        self.total_rows = self.total_rows.max(other.total_rows);
        self.written_rows += other.written_rows;
        self.written_bytes += other.written_bytes;
    }
}

/// Query profiling summary sent near the end of a result stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    /// Result rows.
    pub rows: u64,
    /// Result blocks.
    pub blocks: u64,
    /// Result bytes.
    pub bytes: u64,
    /// True when a LIMIT was applied.
    pub applied_limit: bool,
    /// Rows before the LIMIT cut in.
    pub rows_before_limit: u64,
    /// True when `rows_before_limit` is exact.
    pub calculated_rows_before_limit: bool,
}

impl ProfileInfo {
    /// Writes a ProfileInfo message body.
    pub fn write_to(&self, buf: &mut BytesMut) {
        wire::put_varint(buf, self.rows);
        wire::put_varint(buf, self.blocks);
        wire::put_varint(buf, self.bytes);
        wire::put_bool(buf, self.applied_limit);
        wire::put_varint(buf, self.rows_before_limit);
        wire::put_bool(buf, self.calculated_rows_before_limit);
    }

    /// Reads a ProfileInfo message body.
    pub fn read_from(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            rows: reader.read_varint()?,
            blocks: reader.read_varint()?,
            bytes: reader.read_varint()?,
            applied_limit: reader.read_bool()?,
            rows_before_limit: reader.read_varint()?,
            calculated_rows_before_limit: reader.read_bool()?,
        })
    }
}

/// A server exception chain; the head frame's code is the caller-visible
/// error class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerException {
    /// Server error code, surfaced verbatim.
    pub code: i32,
    /// Exception class name.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Server-side stack trace.
    pub stack_trace: String,
    /// The cause, if the server chained one.
    pub nested: Option<Box<ServerException>>,
}

impl ServerException {
    /// Writes an exception chain.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.code);
        wire::put_string(buf, &self.name);
        wire::put_string(buf, &self.message);
        wire::put_string(buf, &self.stack_trace);
        wire::put_bool(buf, self.nested.is_some());
        if let Some(nested) = &self.nested {
            nested.write_to(buf);
        }
    }

    /// Reads an exception chain.
    pub fn read_from(reader: &mut WireReader<'_>) -> Result<Self> {
        let code = reader.read_i32()?;
        let name = reader.read_string_lossy()?;
        let message = reader.read_string_lossy()?;
        let stack_trace = reader.read_string_lossy()?;
        let nested = if reader.read_bool()? {
            Some(Box::new(ServerException::read_from(reader)?))
        } else {
            None
        };
        Ok(Self { code, name, message, stack_trace, nested })
    }

    /// Depth of the chain, head included.
    pub fn chain_len(&self) -> usize {
        1 + self.nested.as_deref().map_or(0, ServerException::chain_len)
    }
}

impl fmt::Display for ServerException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.code, self.message)?;
        if let Some(nested) = &self.nested {
            write!(f, "; caused by: {}", nested)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_gets_uuid_id() {
        let query = Query::new("SELECT 1");
        assert!(Uuid::parse_str(query.id()).is_ok());
        assert_eq!(query.text(), "SELECT 1");
        assert_eq!(query.stage(), Stage::Complete);
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new("SELECT 1")
            .with_id("q-1")
            .with_setting("max_threads", "4")
            .with_parameter("p", "42");
        assert_eq!(query.id(), "q-1");
        assert_eq!(query.settings(), &[("max_threads".into(), "4".into())]);
        assert_eq!(query.parameters(), &[("p".into(), "42".into())]);
    }

    #[test]
    fn test_server_info_roundtrip() {
        let info = ServerInfo {
            name: "ClickHouse".into(),
            version_major: 24,
            version_minor: 3,
            version_patch: 5,
            revision: protocol::CLIENT_REVISION,
            timezone: "UTC".into(),
            display_name: "prod-1".into(),
        };
        let mut buf = BytesMut::new();
        info.write_to(&mut buf);
        let decoded =
            ServerInfo::read_from(&mut WireReader::new(&buf)).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_server_info_old_revision_omits_gated_fields() {
        let info = ServerInfo {
            name: "old".into(),
            version_major: 1,
            version_minor: 1,
            revision: 54059, // below every gate
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        info.write_to(&mut buf);
        let decoded =
            ServerInfo::read_from(&mut WireReader::new(&buf)).unwrap();
        assert_eq!(decoded.timezone, "");
        assert_eq!(decoded.version_patch, 0);
        assert_eq!(decoded.display_name, "");
    }

    #[test]
    fn test_progress_roundtrip() {
        let progress = Progress {
            rows: 100,
            bytes: 1024,
            total_rows: 1000,
            written_rows: 5,
            written_bytes: 50,
        };
        let mut buf = BytesMut::new();
        progress.write_to(&mut buf, protocol::CLIENT_REVISION);
        let decoded = Progress::read_from(
            &mut WireReader::new(&buf),
            protocol::CLIENT_REVISION,
        )
        .unwrap();
        assert_eq!(decoded, progress);
    }

    #[test]
    fn test_profile_info_roundtrip() {
        let profile = ProfileInfo {
            rows: 3,
            blocks: 1,
            bytes: 96,
            applied_limit: true,
            rows_before_limit: 10,
            calculated_rows_before_limit: true,
        };
        let mut buf = BytesMut::new();
        profile.write_to(&mut buf);
        let decoded =
            ProfileInfo::read_from(&mut WireReader::new(&buf)).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn test_exception_chain_roundtrip() {
        let exception = ServerException {
            code: 60,
            name: "UNKNOWN_TABLE".into(),
            message: "Table test.missing does not exist".into(),
            stack_trace: "0. DB::Exception".into(),
            nested: Some(Box::new(ServerException {
                code: 1,
                name: "INNER".into(),
                message: "root cause".into(),
                stack_trace: String::new(),
                nested: None,
            })),
        };
        let mut buf = BytesMut::new();
        exception.write_to(&mut buf);
        let decoded =
            ServerException::read_from(&mut WireReader::new(&buf)).unwrap();
        assert_eq!(decoded, exception);
        assert_eq!(decoded.chain_len(), 2);
        assert!(decoded.to_string().contains("caused by"));
    }
}
