//! Protocol constants: message ids, revision gates, query stage.

/// Name this client reports in the Hello handshake.
pub const CLIENT_NAME: &str = "CH.Native";

/// Client version, major part.
pub const CLIENT_VERSION_MAJOR: u64 = 1;
/// Client version, minor part.
pub const CLIENT_VERSION_MINOR: u64 = 0;
/// Client version, patch part.
pub const CLIENT_VERSION_PATCH: u64 = 0;

/// Highest protocol revision this client speaks. The session uses
/// `min(CLIENT_REVISION, server revision)` for all gated fields.
pub const CLIENT_REVISION: u64 = 54467;

/// Revision that added the server timezone to the Hello reply.
pub const MIN_REVISION_WITH_SERVER_TIMEZONE: u64 = 54060;
/// Revision that added the server version patch to the Hello reply.
pub const MIN_REVISION_WITH_VERSION_PATCH: u64 = 54372;
/// Revision that added the quota key to client info.
pub const MIN_REVISION_WITH_QUOTA_KEY: u64 = 54420;
/// Revision that added the server display name to the Hello reply.
pub const MIN_REVISION_WITH_SERVER_DISPLAY_NAME: u64 = 54429;
/// Revision that added the distributed depth to client info.
pub const MIN_REVISION_WITH_DISTRIBUTED_DEPTH: u64 = 54441;
/// Revision that added the initial query start time to client info.
pub const MIN_REVISION_WITH_INITIAL_QUERY_START_TIME: u64 = 54449;
/// Revision that added typed query parameters to the Query message.
pub const MIN_REVISION_WITH_PARAMETERS: u64 = 54451;
/// Revision that added the OpenTelemetry carrier to client info.
pub const MIN_REVISION_WITH_OPENTELEMETRY: u64 = 54454;

/// Message ids sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ClientCode {
    /// Handshake with client name, version, and credentials.
    Hello = 0,
    /// Query with id, client info, settings, stage, and text.
    Query = 1,
    /// Data block (query finalizer or INSERT payload), may be compressed.
    Data = 2,
    /// Cancel the currently running query.
    Cancel = 3,
    /// Liveness probe; the server answers with Pong.
    Ping = 4,
}

/// Message ids received from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ServerCode {
    /// Handshake reply with server name, version, and revision.
    Hello = 0,
    /// Block of data, may be compressed.
    Data = 1,
    /// Exception raised during query execution.
    Exception = 2,
    /// Query progress: rows and bytes read so far.
    Progress = 3,
    /// Reply to a client Ping.
    Pong = 4,
    /// All messages for the current operation have been sent.
    EndOfStream = 5,
    /// Profiling summary for the query.
    ProfileInfo = 6,
    /// Block of totals, may be compressed.
    Totals = 7,
    /// Block of extremes (mins and maxes), may be compressed.
    Extremes = 8,
    /// Reply to a tables status request.
    TablesStatusResponse = 9,
    /// Server-side query log block (never compressed).
    Log = 10,
    /// Column descriptions for default value calculation.
    TableColumns = 11,
}

impl TryFrom<u64> for ServerCode {
    type Error = crate::Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerCode::Hello),
            1 => Ok(ServerCode::Data),
            2 => Ok(ServerCode::Exception),
            3 => Ok(ServerCode::Progress),
            4 => Ok(ServerCode::Pong),
            5 => Ok(ServerCode::EndOfStream),
            6 => Ok(ServerCode::ProfileInfo),
            7 => Ok(ServerCode::Totals),
            8 => Ok(ServerCode::Extremes),
            9 => Ok(ServerCode::TablesStatusResponse),
            10 => Ok(ServerCode::Log),
            11 => Ok(ServerCode::TableColumns),
            other => Err(crate::Error::UnknownMessageKind(other)),
        }
    }
}

/// Query processing stage requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum Stage {
    /// Fully process the query and return the final result.
    #[default]
    Complete = 2,
}

/// Block compression negotiated for Data messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// Frames are written with the passthrough method byte (0x02).
    #[default]
    None,
    /// LZ4 block compression, fast with a good ratio.
    Lz4,
    /// ZSTD block compression, better ratio but slower.
    Zstd,
}

impl CompressionMethod {
    /// True when the Query message should announce compressed data blocks.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CompressionMethod::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_code_conversion() {
        assert_eq!(ServerCode::try_from(0).unwrap(), ServerCode::Hello);
        assert_eq!(ServerCode::try_from(5).unwrap(), ServerCode::EndOfStream);
        assert_eq!(ServerCode::try_from(11).unwrap(), ServerCode::TableColumns);
    }

    #[test]
    fn test_unknown_server_code_is_fatal() {
        // Ids 12+ exist in newer servers but are not negotiated at our
        // revision, so they must surface as an error.
        let err = ServerCode::try_from(12).unwrap_err();
        assert!(matches!(err, crate::Error::UnknownMessageKind(12)));
    }

    #[test]
    fn test_compression_default() {
        assert_eq!(CompressionMethod::default(), CompressionMethod::None);
        assert!(!CompressionMethod::None.is_enabled());
        assert!(CompressionMethod::Lz4.is_enabled());
    }
}
