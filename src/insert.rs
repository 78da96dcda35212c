//! The bulk-insert pipeline.
//!
//! An insert opens with `INSERT INTO t (cols) VALUES` carrying no rows;
//! the server answers with a sample block describing the target schema.
//! Fields bind to sample columns by name (case-insensitive), rows
//! accumulate in a working block, and each full batch ships as one Data
//! message -- the awaited socket write is the backpressure, so exactly one
//! encoded block is in flight. Between blocks the pipeline polls the
//! socket without blocking and fails fast if the server already raised an
//! exception. [`Inserter::finish`] flushes the remainder, sends the empty
//! terminator block, and waits for EndOfStream.

use bytes::BytesMut;
use tokio::sync::mpsc;

use crate::block::Block;
use crate::query::Query;
use crate::session::{ServerMessage, Session, SessionState};
use crate::types::Type;
use crate::value::Value;
use crate::{Error, Result};

/// Streaming ingestion yields to the runtime this often.
const YIELD_EVERY: usize = 100_000;

/// Metadata for one field of a row type being inserted.
#[derive(Clone, Debug)]
pub struct FieldDef {
    /// Column name this field binds to (matched case-insensitively).
    pub name: String,
    /// Optional declared server type; binding fails if the server
    /// disagrees.
    pub type_hint: Option<String>,
    /// True when the field may carry NULL; the bound column must accept it.
    pub nullable: bool,
}

impl FieldDef {
    /// A field bound by name only.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), type_hint: None, nullable: false }
    }

    /// Declares the expected server type expression.
    pub fn with_type(mut self, expr: impl Into<String>) -> Self {
        self.type_hint = Some(expr.into());
        self
    }

    /// Marks the field as carrying NULLs.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

impl Session {
    /// Opens a bulk insert into `table` for the given fields.
    ///
    /// Issues the INSERT handshake, binds every field against the server's
    /// sample block, and returns the pipeline. Binding failures abort the
    /// insert cleanly and leave the session idle.
    pub async fn insert(
        &mut self,
        table: &str,
        fields: Vec<FieldDef>,
    ) -> Result<Inserter<'_>> {
        self.ensure_idle()?;
        if fields.is_empty() {
            return Err(Error::SchemaMismatch(
                "insert requires at least one field".into(),
            ));
        }

        let column_list = fields
            .iter()
            .map(|f| format!("`{}`", f.name.replace('`', "``")))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO {} ({}) VALUES", table, column_list);
        tracing::debug!(table, fields = fields.len(), "opening insert");

        let bytes = self.encode_query(&Query::new(sql))?;
        self.send_bytes(&bytes).await?;
        self.set_state(SessionState::AwaitingData);

        let sample = loop {
            match self.receive().await? {
                ServerMessage::Data(block) => break block,
                ServerMessage::Progress(_)
                | ServerMessage::ProfileInfo(_)
                | ServerMessage::Log(_)
                | ServerMessage::TableColumns { .. } => {}
                ServerMessage::Exception(e) => {
                    self.set_state(SessionState::Idle);
                    return Err(Error::Server(Box::new(e)));
                }
                ServerMessage::EndOfStream => {
                    self.set_state(SessionState::Idle);
                    return Err(Error::ProtocolViolation(
                        "insert stream ended before the sample block".into(),
                    ));
                }
                _ => {
                    self.set_state(SessionState::Disconnected);
                    return Err(Error::ProtocolViolation(
                        "unexpected message during insert handshake".into(),
                    ));
                }
            }
        };
        self.set_state(SessionState::InsertReady);

        let bindings = match bind_fields(&fields, &sample) {
            Ok(bindings) => bindings,
            Err(e) => {
                // The server is already waiting for blocks; close the
                // insert with the empty terminator before reporting.
                abort_insert(self).await?;
                return Err(e);
            }
        };

        let schema: Vec<(String, Type)> = sample
            .iter()
            .map(|(name, col)| (name.to_string(), col.data_type().clone()))
            .collect();
        let batch = fresh_batch(&schema)?;
        let batch_size = self.options().insert_batch_size;

        Ok(Inserter {
            session: self,
            schema,
            bindings,
            batch,
            batch_size,
            rows_sent: 0,
            finished: false,
        })
    }

    /// One-shot insert of a fully built block.
    pub async fn insert_block(
        &mut self,
        table: &str,
        block: Block,
    ) -> Result<()> {
        let fields = block
            .iter()
            .map(|(name, col)| {
                FieldDef::new(name).with_type(col.data_type().to_string())
            })
            .collect();
        let mut inserter = self.insert(table, fields).await?;
        for row in 0..block.row_count() {
            let values = (0..block.column_count())
                .map(|c| block.column(c).expect("in range").value_at(row))
                .collect();
            inserter.write_row(values).await?;
        }
        inserter.finish().await?;
        Ok(())
    }
}

/// Maps each sample column ordinal to the field that feeds it.
fn bind_fields(fields: &[FieldDef], sample: &Block) -> Result<Vec<usize>> {
    let mut used = vec![false; fields.len()];
    let mut bindings = Vec::with_capacity(sample.column_count());

    for (name, column) in sample.iter() {
        let position = fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "table column {:?} has no matching field",
                    name
                ))
            })?;
        if used[position] {
            return Err(Error::SchemaMismatch(format!(
                "field {:?} matches more than one column",
                fields[position].name
            )));
        }
        used[position] = true;

        let field = &fields[position];
        let server_type = column.data_type();
        if let Some(hint) = &field.type_hint {
            let declared = Type::parse(hint)?;
            if &declared != server_type {
                return Err(Error::SchemaMismatch(format!(
                    "field {:?} is declared {} but the server column is {}",
                    field.name, declared, server_type
                )));
            }
        }
        if field.nullable {
            let accepts_null = match server_type {
                Type::Nullable(_) => true,
                Type::LowCardinality(inner) => inner.is_nullable(),
                _ => false,
            };
            if !accepts_null {
                return Err(Error::SchemaMismatch(format!(
                    "field {:?} is nullable but the server column is {}",
                    field.name, server_type
                )));
            }
        }
        bindings.push(position);
    }

    if let Some(unused) = used.iter().position(|&u| !u) {
        return Err(Error::SchemaMismatch(format!(
            "field {:?} does not match any table column",
            fields[unused].name
        )));
    }
    Ok(bindings)
}

fn fresh_batch(schema: &[(String, Type)]) -> Result<Block> {
    Block::with_schema(schema.iter().map(|(n, t)| (n.as_str(), t)))
}

/// Closes a half-open insert with the empty terminator and drains to
/// EndOfStream.
async fn abort_insert(session: &mut Session) -> Result<()> {
    let mut buf = BytesMut::new();
    session.encode_data(&mut buf, &Block::new())?;
    session.send_bytes(&buf).await?;
    loop {
        match session.receive().await? {
            ServerMessage::EndOfStream | ServerMessage::Exception(_) => {
                session.set_state(SessionState::Idle);
                return Ok(());
            }
            _ => {}
        }
    }
}

/// A running bulk insert bound to a session.
pub struct Inserter<'a> {
    session: &'a mut Session,
    schema: Vec<(String, Type)>,
    bindings: Vec<usize>,
    batch: Block,
    batch_size: usize,
    rows_sent: u64,
    finished: bool,
}

impl Inserter<'_> {
    /// Overrides the batch size for this insert.
    pub fn set_batch_size(&mut self, rows: usize) {
        self.batch_size = rows.max(1);
    }

    /// Rows buffered but not yet shipped.
    pub fn pending_rows(&self) -> usize {
        self.batch.row_count()
    }

    /// Rows already shipped to the server.
    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    /// The target schema, in server column order.
    pub fn schema(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.schema.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Drains any messages the server pushed between blocks; a server
    /// exception fails the insert immediately.
    fn check_server(&mut self) -> Result<()> {
        loop {
            let message = match self.session.try_receive() {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(()),
                Err(e) => {
                    if e.poisons_session() {
                        self.session.set_state(SessionState::Disconnected);
                    }
                    self.finished = true;
                    return Err(e);
                }
            };
            match message {
                ServerMessage::Exception(e) => {
                    self.finished = true;
                    self.session.set_state(SessionState::Idle);
                    return Err(Error::Server(Box::new(e)));
                }
                ServerMessage::Progress(_)
                | ServerMessage::ProfileInfo(_)
                | ServerMessage::Log(_)
                | ServerMessage::TableColumns { .. } => {}
                _ => {
                    self.finished = true;
                    self.session.set_state(SessionState::Disconnected);
                    return Err(Error::ProtocolViolation(
                        "unexpected message during insert".into(),
                    ));
                }
            }
        }
    }

    /// Appends one row, given values in field-definition order. Ships the
    /// working block when it reaches the batch size.
    pub async fn write_row(&mut self, values: Vec<Value>) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidState(
                "insert pipeline already finished".into(),
            ));
        }
        self.check_server()?;
        if values.len() != self.bindings.len() {
            return Err(Error::SchemaMismatch(format!(
                "row has {} values, insert has {} fields",
                values.len(),
                self.bindings.len()
            )));
        }

        let mut slots: Vec<Option<Value>> =
            values.into_iter().map(Some).collect();
        let row = self
            .bindings
            .iter()
            .map(|&field| slots[field].take().expect("binding is a bijection"))
            .collect();
        self.batch.append_row(row)?;

        if self.batch.row_count() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Batched ingestion of a materialized row sequence.
    pub async fn write_rows(
        &mut self,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<()> {
        for (n, row) in rows.into_iter().enumerate() {
            self.write_row(row).await?;
            if (n + 1) % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(())
    }

    /// Streaming ingestion from a bounded channel; the channel depth is the
    /// producer-side backpressure.
    pub async fn copy_from(
        &mut self,
        rows: &mut mpsc::Receiver<Vec<Value>>,
    ) -> Result<()> {
        let mut n = 0usize;
        while let Some(row) = rows.recv().await {
            self.write_row(row).await?;
            n += 1;
            if n % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(())
    }

    /// Ships the working block now, even short of the batch size.
    pub async fn flush(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidState(
                "insert pipeline already finished".into(),
            ));
        }
        if self.batch.row_count() == 0 {
            return Ok(());
        }
        self.check_server()?;

        let block =
            std::mem::replace(&mut self.batch, fresh_batch(&self.schema)?);
        let mut buf = BytesMut::new();
        self.session.encode_data(&mut buf, &block)?;
        tracing::debug!(
            rows = block.row_count(),
            bytes = buf.len(),
            "shipping insert block"
        );
        self.session.send_bytes(&buf).await?;
        self.rows_sent += block.row_count() as u64;
        Ok(())
    }

    /// Flushes the remainder, sends the empty terminator block, and waits
    /// for the server's EndOfStream. Returns the total rows shipped.
    ///
    /// The terminator may be sent exactly once; a second `finish` is a
    /// protocol violation.
    pub async fn finish(&mut self) -> Result<u64> {
        if self.finished {
            return Err(Error::ProtocolViolation(
                "insert already closed; the terminator block may be sent \
                 only once"
                    .into(),
            ));
        }
        self.flush().await?;
        self.finished = true;

        let mut buf = BytesMut::new();
        self.session.encode_data(&mut buf, &Block::new())?;
        self.session.send_bytes(&buf).await?;
        tracing::debug!(rows = self.rows_sent, "insert terminator sent");

        loop {
            match self.session.receive().await? {
                ServerMessage::EndOfStream => {
                    self.session.set_state(SessionState::Idle);
                    return Ok(self.rows_sent);
                }
                ServerMessage::Exception(e) => {
                    self.session.set_state(SessionState::Idle);
                    return Err(Error::Server(Box::new(e)));
                }
                ServerMessage::Progress(_)
                | ServerMessage::ProfileInfo(_)
                | ServerMessage::Log(_)
                | ServerMessage::TableColumns { .. }
                | ServerMessage::Data(_)
                | ServerMessage::Totals(_)
                | ServerMessage::Extremes(_) => {}
                ServerMessage::Pong => {
                    self.session.set_state(SessionState::Disconnected);
                    return Err(Error::ProtocolViolation(
                        "Pong while closing insert".into(),
                    ));
                }
            }
        }
    }

    /// Abandons the insert: dispatches Cancel and drains. Rows already
    /// shipped are not rewound.
    pub async fn abort(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.session.cancel().await
    }
}
