//! # ch-native
//!
//! An async Rust client for the ClickHouse native TCP protocol: typed
//! columnar blocks, the full type system (integers to 256 bits, decimals,
//! dates, UUIDs, IPs, arrays, tuples, maps, nullable and low-cardinality
//! wrappers), LZ4/ZSTD block compression with checksum verification, a
//! streaming bulk-insert pipeline, and pluggable cluster balancing.
//!
//! # Quick Start
//!
//! ```no_run
//! use ch_native::{Session, SessionOptions, FieldDef, Value};
//!
//! # async fn example() -> ch_native::Result<()> {
//! let options = SessionOptions::new("localhost", 9000)
//!     .database("default")
//!     .user("default");
//! let mut session = Session::connect(options).await?;
//!
//! session
//!     .execute("CREATE TABLE IF NOT EXISTS t (id UInt32, name String) ENGINE = Memory")
//!     .await?;
//!
//! let mut insert = session
//!     .insert("t", vec![FieldDef::new("id"), FieldDef::new("name")])
//!     .await?;
//! insert.write_row(vec![Value::UInt32(1), Value::from("alice")]).await?;
//! insert.finish().await?;
//!
//! let result = session.fetch_all("SELECT id, name FROM t").await?;
//! for block in &result.blocks {
//!     for row in block.rows() {
//!         println!("{:?} {:?}", row.get("id"), row.get_str("name"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`session`] - Connection handshake, query lifecycle, cancel, ping
//! - [`insert`] - Batched and streaming bulk inserts
//! - [`block`] - Data blocks and their wire codec
//! - [`mod@column`] - Typed column buffers for every server type
//! - [`types`] - Type expressions and their parser
//! - [`value`] - Dynamic row values
//! - [`row`] - Row views and bind-once mapping over blocks
//! - [`compression`] - Checksummed LZ4/ZSTD block frames
//! - [`wire`] - Varint/fixed/string primitives
//! - [`balance`] - Health tracking and server selection strategies
//! - [`protocol`] - Message ids and revision gates
//! - [`error`] - The error taxonomy

#![warn(missing_docs)]

/// Health tracking and load-balancing strategies.
pub mod balance;
/// Data blocks and the block wire codec.
pub mod block;
/// Typed column buffers for every server type.
pub mod column;
/// Checksummed compression frames for Data messages.
pub mod compression;
/// Async TCP transport with the accumulate-and-reparse read pump.
pub mod connection;
/// Error types and the `Result` alias.
pub mod error;
/// The bulk-insert pipeline.
pub mod insert;
/// Protocol constants: message ids, revision gates.
pub mod protocol;
/// Query state and message payload structs.
pub mod query;
/// Row views and bind-once row mapping.
pub mod row;
/// SQL literal masking for trace labels.
pub mod sanitize;
/// Sessions: handshake, query lifecycle, cancellation, keepalive.
pub mod session;
/// The server type system and its parser.
pub mod types;
/// Dynamic values crossing the row boundary.
pub mod value;
/// Wire format primitives.
pub mod wire;

pub use balance::{
    Endpoint, FailureWindow, FirstAvailable, HealthCheck, LoadBalancer,
    Random, RoundRobin,
};
pub use block::{Block, BlockInfo};
pub use connection::Timeouts;
pub use error::{Error, ErrorKind, Result};
pub use insert::{FieldDef, Inserter};
pub use protocol::CompressionMethod;
pub use query::{
    ClientInfo, ProfileInfo, Progress, Query, ServerException, ServerInfo,
};
pub use row::{Row, RowMapper};
pub use sanitize::sanitize_sql;
pub use session::{
    QueryCursor, QueryResult, Session, SessionOptions, SessionState,
};
pub use types::Type;
pub use value::{Int256, UInt256, Value};
