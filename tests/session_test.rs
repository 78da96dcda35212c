//! Session state machine tests against a scripted in-process server.

mod common;

use common::{assert_uint64_column, uint64_block, MockServer};
use tokio::net::TcpListener;

use ch_native::protocol::{self, CompressionMethod};
use ch_native::query::{Progress, ServerException, ServerInfo};
use ch_native::{
    Error, FieldDef, Session, SessionOptions, SessionState, Value,
};

async fn listener() -> (TcpListener, SessionOptions) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let options = SessionOptions::new(addr.ip().to_string(), addr.port())
        .compression(CompressionMethod::None);
    (listener, options)
}

fn plain_exception(code: i32, message: &str) -> ServerException {
    ServerException {
        code,
        name: "DB::Exception".into(),
        message: message.into(),
        stack_trace: String::new(),
        nested: None,
    }
}

#[tokio::test]
async fn test_hello_wire_shape_and_negotiation() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await
    });

    let session = Session::connect(options).await.unwrap();
    let hello = server.await.unwrap();

    // The Hello message id is varint 0, so the first byte on the wire is 0.
    assert_eq!(hello.first_byte, 0x00);
    assert_eq!(hello.client_name, "CH.Native");
    assert_eq!(hello.version_major, 1);
    assert_eq!(hello.version_minor, 0);
    assert_eq!(hello.revision, 54467);
    assert_eq!(hello.database, "default");
    assert_eq!(hello.user, "default");
    assert_eq!(hello.password, "");

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.revision(), 54467);
    assert_eq!(session.server_info().name, "MockHouse");
    assert_eq!(session.server_info().timezone, "UTC");
}

#[tokio::test]
async fn test_revision_negotiates_to_minimum() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        let info = ServerInfo {
            name: "old".into(),
            version_major: 21,
            version_minor: 8,
            version_patch: 0,
            revision: 54450,
            timezone: "UTC".into(),
            ..Default::default()
        };
        server.handshake(&info).await
    });

    let session = Session::connect(options).await.unwrap();
    server.await.unwrap();
    assert_eq!(session.revision(), 54450);
}

#[tokio::test]
async fn test_select_streams_blocks_and_progress() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;

        let sql = server.read_query().await;
        assert_eq!(sql, "SELECT id FROM t");

        // Schema announcement: zero-row block, then data, then progress,
        // then the rest of the data, then end of stream.
        server.send_data(&uint64_block("id", &[])).await;
        server.send_data(&uint64_block("id", &[1, 2, 3])).await;
        server
            .send_progress(&Progress {
                rows: 3,
                bytes: 24,
                total_rows: 5,
                ..Default::default()
            })
            .await;
        server.send_data(&uint64_block("id", &[4, 5])).await;
        server
            .send_progress(&Progress {
                rows: 2,
                bytes: 16,
                total_rows: 5,
                ..Default::default()
            })
            .await;
        server.send_end_of_stream().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let mut cursor = session.query("SELECT id FROM t").await.unwrap();

    let first = cursor.next_block().await.unwrap().unwrap();
    assert_uint64_column(first.column(0).unwrap(), &[1, 2, 3]);

    let second = cursor.next_block().await.unwrap().unwrap();
    assert_uint64_column(second.column(0).unwrap(), &[4, 5]);

    assert!(cursor.next_block().await.unwrap().is_none());
    assert_eq!(cursor.progress().rows, 5);
    assert_eq!(cursor.progress().bytes, 40);

    server.await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_compressed_roundtrip_through_session() {
    let (listener, options) = listener().await;
    let options = options.compression(CompressionMethod::Lz4);

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.compression = CompressionMethod::Lz4;
        server.handshake_default().await;
        let _sql = server.read_query().await;
        server.send_data(&uint64_block("n", &[7, 8, 9])).await;
        server.send_end_of_stream().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let result = session.fetch_all("SELECT n FROM t").await.unwrap();
    assert_eq!(result.total_rows(), 3);
    assert_uint64_column(result.blocks[0].column(0).unwrap(), &[7, 8, 9]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_exception_returns_session_to_idle() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;

        let _sql = server.read_query().await;
        server.send_exception(&plain_exception(60, "no such table")).await;

        // The session stays usable: answer the follow-up query.
        let _sql = server.read_query().await;
        server.send_data(&uint64_block("x", &[1])).await;
        server.send_end_of_stream().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let err = session.fetch_all("SELECT * FROM missing").await.unwrap_err();
    match &err {
        Error::Server(e) => {
            assert_eq!(e.code, 60);
            assert_eq!(e.message, "no such table");
        }
        other => panic!("expected server exception, got {:?}", other),
    }
    assert!(!err.poisons_session());
    assert_eq!(session.state(), SessionState::Idle);

    let result = session.fetch_all("SELECT 1").await.unwrap();
    assert_eq!(result.total_rows(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn test_cancel_mid_stream_then_reuse() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;

        let _sql = server.read_query().await;
        server.send_data(&uint64_block("id", &[1, 2])).await;

        // Wait for the cancel, then close the stream.
        server.read_cancel().await;
        server.send_end_of_stream().await;

        // A subsequent SELECT succeeds on the same connection.
        let sql = server.read_query().await;
        assert_eq!(sql, "SELECT 1");
        server.send_data(&uint64_block("one", &[1])).await;
        server.send_end_of_stream().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let mut cursor = session.query("SELECT id FROM big").await.unwrap();
    let first = cursor.next_block().await.unwrap().unwrap();
    assert_eq!(first.row_count(), 2);

    cursor.cancel().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    let result = session.fetch_all("SELECT 1").await.unwrap();
    assert_eq!(result.total_rows(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn test_ping_pong() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;
        server.read_ping().await;
        server.send_pong().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    session.ping().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    server.await.unwrap();
}

#[tokio::test]
async fn test_unknown_message_id_poisons_session() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;
        let _sql = server.read_query().await;
        // Message id 12 is beyond this client's table.
        server.send_raw(&[12]).await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let err = session.fetch_all("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::UnknownMessageKind(12)));
    assert!(err.poisons_session());
    assert_eq!(session.state(), SessionState::Disconnected);

    // Everything after a poisoning error is refused locally.
    let err = session.fetch_all("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_insert_pipeline_batches_and_finishes() {
    let (listener, options) = listener().await;
    let options = options.insert_batch_size(2);

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;

        let sql = server.read_query().await;
        assert_eq!(sql, "INSERT INTO people (`id`, `name`) VALUES");

        // Sample block: the target schema with zero rows.
        let sample = ch_native::Block::with_schema([
            ("id", &ch_native::Type::UInt32),
            ("name", &ch_native::Type::String),
        ])
        .unwrap();
        server.send_data(&sample).await;

        // Batch size 2 and three rows: two row-bearing blocks, then the
        // empty terminator.
        let first = server.read_data().await;
        assert_eq!(first.row_count(), 2);
        assert_eq!(first.column_name(0), Some("id"));
        let second = server.read_data().await;
        assert_eq!(second.row_count(), 1);
        assert_eq!(
            second.column(1).unwrap().value_at(0),
            Value::from("charlie")
        );
        let terminator = server.read_data().await;
        assert!(terminator.is_empty());
        server.send_end_of_stream().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let mut insert = session
        .insert(
            "people",
            vec![FieldDef::new("id"), FieldDef::new("name")],
        )
        .await
        .unwrap();

    insert
        .write_rows([
            vec![Value::UInt32(1), Value::from("alice")],
            vec![Value::UInt32(2), Value::from("bob")],
            vec![Value::UInt32(3), Value::from("charlie")],
        ])
        .await
        .unwrap();
    let rows = insert.finish().await.unwrap();
    assert_eq!(rows, 3);

    // Closing an already-closed insert is a protocol violation.
    let err = insert.finish().await.unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation(_)));

    drop(insert);
    assert_eq!(session.state(), SessionState::Idle);
    server.await.unwrap();
}

#[tokio::test]
async fn test_insert_schema_mismatch_lists_both_types() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;
        let _sql = server.read_query().await;
        let sample = ch_native::Block::with_schema([(
            "id",
            &ch_native::Type::UInt32,
        )])
        .unwrap();
        server.send_data(&sample).await;
        // The client aborts the insert with the empty terminator.
        let terminator = server.read_data().await;
        assert!(terminator.is_empty());
        server.send_end_of_stream().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let err = session
        .insert("t", vec![FieldDef::new("id").with_type("UInt64")])
        .await
        .err()
        .expect("binding must fail");
    match &err {
        Error::SchemaMismatch(text) => {
            assert!(text.contains("UInt64") && text.contains("UInt32"));
        }
        other => panic!("expected schema mismatch, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Idle);
    server.await.unwrap();
}

#[tokio::test]
async fn test_insert_fails_fast_on_server_exception() {
    let (listener, options) = listener().await;
    let options = options.insert_batch_size(1);

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;
        let _sql = server.read_query().await;
        let sample = ch_native::Block::with_schema([(
            "id",
            &ch_native::Type::UInt64,
        )])
        .unwrap();
        server.send_data(&sample).await;

        let _first = server.read_data().await;
        server
            .send_exception(&plain_exception(241, "memory limit exceeded"))
            .await;
        // Keep the socket alive until the client gives up.
        server.drain_until_close().await;
    });

    let mut session = Session::connect(options).await.unwrap();
    let mut insert =
        session.insert("t", vec![FieldDef::new("id")]).await.unwrap();

    // The first row ships immediately (batch size 1); the exception lands
    // between blocks and must surface on a later append.
    insert.write_row(vec![Value::UInt64(1)]).await.unwrap();
    let mut outcome = Ok(());
    for i in 2..100u64 {
        match insert.write_row(vec![Value::UInt64(i)]).await {
            Ok(()) => {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    let err = outcome.expect_err("exception must fail the pipeline");
    match err {
        Error::Server(e) => assert_eq!(e.code, 241),
        other => panic!("expected server exception, got {:?}", other),
    }
    drop(insert);
    assert_eq!(session.state(), SessionState::Idle);

    drop(session);
    server.await.unwrap();
}

#[tokio::test]
async fn test_abandoned_cursor_makes_session_busy() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.handshake_default().await;
        let _sql = server.read_query().await;
        // Keep the stream open; the client abandons the cursor.
        server
    });

    let mut session = Session::connect(options).await.unwrap();
    let cursor = session.query("SELECT sleep(10)").await.unwrap();
    drop(cursor);

    let err =
        session.query("SELECT 1").await.err().expect("session is busy");
    assert!(matches!(err, Error::SessionBusy));

    // Cancel clears the abandoned query.
    let server_task = server;
    let drain = tokio::spawn(async move {
        let mut server = server_task.await.unwrap();
        server.read_cancel().await;
        server.send_end_of_stream().await;
    });
    session.cancel().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    drain.await.unwrap();
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = SessionOptions::new(addr.ip().to_string(), addr.port());
    let err = Session::connect(options).await.unwrap_err();
    assert_eq!(err.kind(), ch_native::ErrorKind::Transport);
}

#[tokio::test]
async fn test_handshake_exception_surfaces_as_server_error() {
    let (listener, options) = listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut server = MockServer::from_stream(stream);
        // Reject authentication without a Hello reply.
        let mut buf = bytes::BytesMut::new();
        ch_native::wire::put_varint(
            &mut buf,
            protocol::ServerCode::Exception as u64,
        );
        plain_exception(516, "Authentication failed").write_to(&mut buf);
        server.send_raw(&buf).await;
    });

    let err = Session::connect(options).await.unwrap_err();
    match err {
        Error::Server(e) => assert_eq!(e.code, 516),
        other => panic!("expected server exception, got {:?}", other),
    }
    server.await.unwrap();
}
