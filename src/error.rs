//! Error types for the client.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, Error>`. Every error classifies into an
//! [`ErrorKind`]: transport failures and protocol corruption poison the
//! session, server exceptions leave it reusable, usage errors never touch
//! the wire.

use thiserror::Error;

use crate::query::ServerException;

/// Errors that can occur when talking to the server.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred on the underlying TCP connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A connect, read, or write did not complete within the configured
    /// timeout. The socket is closed.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The server closed the connection mid-stream.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A decoder ran past the end of its buffer.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A LEB128 varint ran longer than the 10 bytes a u64 can occupy.
    #[error("varint overflow")]
    VarIntOverflow,

    /// A type expression could not be parsed, or violates nesting rules.
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// The peer sent something the protocol does not allow in the current
    /// state. Non-recoverable for this session.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server sent a message id this client does not recognize.
    /// Forward compatibility is negotiated through the revision, so this is
    /// always fatal rather than skippable.
    #[error("unknown server message kind: {0}")]
    UnknownMessageKind(u64),

    /// The checksum of a compressed frame did not match its contents.
    #[error("compressed frame checksum mismatch")]
    ChecksumMismatch,

    /// An error during LZ4 or ZSTD compression or decompression.
    #[error("compression error: {0}")]
    Compression(String),

    /// An exception raised by the server. The session returns to idle and
    /// stays usable.
    #[error("server exception: {0}")]
    Server(Box<ServerException>),

    /// A query or insert is already in flight on this session.
    #[error("session is busy with another query")]
    SessionBusy,

    /// The operation is not valid in the session's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A row field could not be bound to the target table schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A value or type the column codec cannot represent.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification of an [`Error`], orthogonal to server error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket-level failure. The session is disconnected.
    Transport,
    /// Wire-format corruption or an illegal message. The session is
    /// disconnected.
    Protocol,
    /// The server reported an exception. The session stays usable.
    Server,
    /// API misuse detected before anything reached the wire.
    Usage,
    /// Caller-initiated cancellation was observed.
    Cancelled,
}

impl Error {
    /// Returns the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Timeout(_) | Error::ConnectionClosed => {
                ErrorKind::Transport
            }
            Error::UnexpectedEof
            | Error::VarIntOverflow
            | Error::InvalidType(_)
            | Error::ProtocolViolation(_)
            | Error::UnknownMessageKind(_)
            | Error::ChecksumMismatch
            | Error::Compression(_) => ErrorKind::Protocol,
            Error::Server(_) => ErrorKind::Server,
            Error::SessionBusy
            | Error::InvalidState(_)
            | Error::SchemaMismatch(_)
            | Error::UnsupportedType(_) => ErrorKind::Usage,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True if the session that produced this error must be discarded.
    ///
    /// Transport and protocol errors leave the stream in an unknown position;
    /// server exceptions and usage errors do not.
    pub fn poisons_session(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Protocol)
    }

    /// Returns the server exception chain if this is a server error.
    pub fn as_server_exception(&self) -> Option<&ServerException> {
        match self {
            Error::Server(e) => Some(e),
            _ => None,
        }
    }
}

/// A type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::VarIntOverflow.kind(), ErrorKind::Protocol);
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Transport);
        assert_eq!(Error::SessionBusy.kind(), ErrorKind::Usage);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_poisoning() {
        assert!(Error::ChecksumMismatch.poisons_session());
        assert!(Error::ConnectionClosed.poisons_session());
        assert!(!Error::SessionBusy.poisons_session());
        assert!(!Error::Cancelled.poisons_session());
    }
}
