//! Scripted in-process driver.
//!
//! [`MemoryConnection`] answers prepared statements from result sets registered per
//! positional SQL text and records every native call, so statement behavior can be
//! checked without a server.
//!
//! ```
//! use sqlx_named_stmt::driver::memory::{Event, MemoryConnection};
//! use sqlx_named_stmt::Statement;
//!
//! let mut conn = MemoryConnection::new();
//! let mut stmt = Statement::new(&mut conn)?;
//! stmt.prepare("DELETE FROM t WHERE id = :id")?;
//! stmt.bind("id", 3)?;
//! stmt.execute()?;
//!
//! assert!(conn.events().contains(&Event::Prepare("DELETE FROM t WHERE id = ?".into())));
//! assert_eq!(conn.executed().len(), 1);
//! # Ok::<(), sqlx_named_stmt::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub use super::Cell;
use super::{Connection, DriverError, DriverResult, NativeStatement};
use crate::value::DateTime;
use crate::wire::{
    flags, ColumnDefinition, FetchStatus, FieldType, ParamBind, ParamData, ResultBind,
    CHARSET_BINARY,
};

/// A scripted result set.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    columns: Vec<ColumnDefinition>,
    rows: Vec<Vec<Cell>>,
}

impl Rows {
    pub fn new(columns: Vec<ColumnDefinition>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, cells: Vec<Cell>) -> Self {
        self.rows.push(cells);
        self
    }

    fn from_params(params: &[OwnedBind]) -> Self {
        let mut columns = Vec::with_capacity(params.len());
        let mut cells = Vec::with_capacity(params.len());
        for (idx, param) in params.iter().enumerate() {
            let binary = param.buffer_type == FieldType::Blob;
            let mut column = ColumnDefinition::new(format!("p{}", idx + 1), param.buffer_type);
            if binary {
                column = column.with_charset(CHARSET_BINARY);
            }
            if param.is_unsigned {
                column = column.with_flags(flags::UNSIGNED);
            }
            columns.push(column);
            cells.push(match &param.data {
                OwnedParam::Null => Cell::Null,
                OwnedParam::Integer(v) => Cell::Integer(*v),
                OwnedParam::Float(v) => Cell::Float(*v),
                OwnedParam::Bool(v) => Cell::Bool(*v),
                OwnedParam::DateTime(v) => Cell::DateTime(*v),
                OwnedParam::Bytes(b) | OwnedParam::LongData(b) if binary => Cell::Bytes(b.clone()),
                OwnedParam::Bytes(b) | OwnedParam::LongData(b) => {
                    Cell::Text(String::from_utf8_lossy(b).into_owned())
                }
            });
        }
        Self {
            columns,
            rows: vec![cells],
        }
    }
}

/// Owned copy of a parameter as it reached the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedParam {
    Null,
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    DateTime(DateTime),
    /// Everything sent with `send_long_data` since the last execute.
    LongData(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnedBind {
    pub buffer_type: FieldType,
    pub is_unsigned: bool,
    pub data: OwnedParam,
}

/// A native call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SelectDb(String),
    StmtInit,
    Prepare(String),
    BindParams(usize),
    LongData { slot: usize, len: usize },
    Execute,
    BindResults(usize),
    Fetch,
    FreeResult,
    Reset,
    Close,
}

#[derive(Debug, Default)]
struct State {
    responses: HashMap<String, Rows>,
    prepare_failures: HashMap<String, DriverError>,
    execute_failure: Option<DriverError>,
    long_data_failure: Option<DriverError>,
    fetch_failure: Option<(usize, DriverError)>,
    echo: bool,
    events: Vec<Event>,
    executed: Vec<Vec<OwnedBind>>,
    last_error: Option<String>,
}

impl State {
    fn fail(&mut self, error: DriverError) -> DriverError {
        self.last_error = Some(error.message.clone());
        error
    }
}

/// In-process connection. Clones share the same script and journal.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    shared: Rc<RefCell<State>>,
    current_db: Option<String>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers executions of `sql` with `rows`.
    pub fn respond(&mut self, sql: impl Into<String>, rows: Rows) {
        self.shared.borrow_mut().responses.insert(sql.into(), rows);
    }

    /// Answers executions of unscripted SQL with a single row holding the parameters,
    /// named `p1`, `p2`, …
    pub fn echo_params(&mut self, echo: bool) {
        self.shared.borrow_mut().echo = echo;
    }

    /// Makes preparing `sql` fail with `error`.
    pub fn fail_prepare(&mut self, sql: impl Into<String>, error: DriverError) {
        self.shared
            .borrow_mut()
            .prepare_failures
            .insert(sql.into(), error);
    }

    /// Makes the next execute fail with `error`.
    pub fn fail_execute(&mut self, error: DriverError) {
        self.shared.borrow_mut().execute_failure = Some(error);
    }

    /// Makes the next `send_long_data` fail with `error`.
    pub fn fail_long_data(&mut self, error: DriverError) {
        self.shared.borrow_mut().long_data_failure = Some(error);
    }

    /// Makes the fetch after `rows` rows of the next result fail with `error`.
    pub fn fail_fetch(&mut self, rows: usize, error: DriverError) {
        self.shared.borrow_mut().fetch_failure = Some((rows, error));
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.borrow().events.clone()
    }

    /// Parameters of every execute so far.
    pub fn executed(&self) -> Vec<Vec<OwnedBind>> {
        self.shared.borrow().executed.clone()
    }

    pub fn clear_events(&mut self) {
        let mut state = self.shared.borrow_mut();
        state.events.clear();
        state.executed.clear();
    }
}

impl Connection for MemoryConnection {
    type Statement = MemoryStatement;

    fn select_db(&mut self, name: &str) -> DriverResult<()> {
        if self.current_db.as_deref() == Some(name) {
            return Ok(());
        }
        self.shared
            .borrow_mut()
            .events
            .push(Event::SelectDb(name.to_owned()));
        self.current_db = Some(name.to_owned());
        Ok(())
    }

    fn current_db(&self) -> Option<&str> {
        self.current_db.as_deref()
    }

    fn ping(&mut self) -> DriverResult<()> {
        Ok(())
    }

    fn error_message(&self) -> Option<String> {
        self.shared.borrow().last_error.clone()
    }

    fn stmt_init(&mut self) -> DriverResult<MemoryStatement> {
        self.shared.borrow_mut().events.push(Event::StmtInit);
        Ok(MemoryStatement {
            shared: Rc::clone(&self.shared),
            sql: None,
            params_declared: false,
            long_data: HashMap::new(),
            result: None,
            cursor: 0,
            current: None,
            closed: false,
            last_error: None,
        })
    }
}

/// Statement handle of a [`MemoryConnection`].
#[derive(Debug)]
pub struct MemoryStatement {
    shared: Rc<RefCell<State>>,
    sql: Option<String>,
    params_declared: bool,
    long_data: HashMap<usize, Vec<u8>>,
    result: Option<Rows>,
    cursor: usize,
    current: Option<usize>,
    closed: bool,
    last_error: Option<String>,
}

impl MemoryStatement {
    fn record(&self, event: Event) {
        self.shared.borrow_mut().events.push(event);
    }

    fn fail(&mut self, error: DriverError) -> DriverError {
        self.last_error = Some(error.message.clone());
        self.shared.borrow_mut().fail(error)
    }

    fn ensure_open(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(self.fail(DriverError::new(2056, "Statement closed")));
        }
        Ok(())
    }

    fn ensure_prepared(&mut self) -> DriverResult<&str> {
        self.ensure_open()?;
        if self.sql.is_none() {
            return Err(self.fail(DriverError::new(2030, "Statement not prepared")));
        }
        Ok(self.sql.as_deref().unwrap_or_default())
    }

    fn current_cell(&self, slot: usize) -> Option<&Cell> {
        let row = self.current?;
        self.result.as_ref()?.rows.get(row)?.get(slot)
    }
}

impl NativeStatement for MemoryStatement {
    fn prepare(&mut self, sql: &str) -> DriverResult<()> {
        self.ensure_open()?;
        self.record(Event::Prepare(sql.to_owned()));
        let failure = self.shared.borrow().prepare_failures.get(sql).cloned();
        if let Some(error) = failure {
            self.sql = None;
            return Err(self.fail(error));
        }
        self.sql = Some(sql.to_owned());
        self.params_declared = false;
        self.long_data.clear();
        self.result = None;
        self.current = None;
        Ok(())
    }

    fn bind_params(&mut self, binds: &[ParamBind<'_>]) -> DriverResult<()> {
        self.ensure_prepared()?;
        self.record(Event::BindParams(binds.len()));
        self.params_declared = true;
        Ok(())
    }

    fn send_long_data(&mut self, slot: usize, chunk: &[u8]) -> DriverResult<()> {
        self.ensure_prepared()?;
        self.record(Event::LongData {
            slot,
            len: chunk.len(),
        });
        let failure = self.shared.borrow_mut().long_data_failure.take();
        if let Some(error) = failure {
            return Err(self.fail(error));
        }
        self.long_data.entry(slot).or_default().extend_from_slice(chunk);
        Ok(())
    }

    fn execute(&mut self, binds: &[ParamBind<'_>]) -> DriverResult<()> {
        let sql = self.ensure_prepared()?.to_owned();
        if !binds.is_empty() && !self.params_declared {
            return Err(self.fail(DriverError::new(2031, "No data supplied for parameters in prepared statement")));
        }
        self.record(Event::Execute);

        let params: Vec<OwnedBind> = binds
            .iter()
            .enumerate()
            .map(|(slot, bind)| OwnedBind {
                buffer_type: bind.buffer_type,
                is_unsigned: bind.is_unsigned,
                data: match bind.data {
                    ParamData::Null => OwnedParam::Null,
                    ParamData::Integer(v) => OwnedParam::Integer(v),
                    ParamData::Float(v) => OwnedParam::Float(v),
                    ParamData::Bool(v) => OwnedParam::Bool(v),
                    ParamData::Bytes(b) => OwnedParam::Bytes(b.to_vec()),
                    ParamData::DateTime(v) => OwnedParam::DateTime(v),
                    ParamData::LongData => {
                        OwnedParam::LongData(self.long_data.remove(&slot).unwrap_or_default())
                    }
                },
            })
            .collect();

        let mut state = self.shared.borrow_mut();
        state.executed.push(params.clone());
        if let Some(error) = state.execute_failure.take() {
            drop(state);
            return Err(self.fail(error));
        }
        self.result = match state.responses.get(&sql) {
            Some(rows) => Some(rows.clone()),
            None if state.echo => Some(Rows::from_params(&params)),
            None => None,
        };
        self.cursor = 0;
        self.current = None;
        self.long_data.clear();
        Ok(())
    }

    fn result_metadata(&mut self) -> DriverResult<Option<Vec<ColumnDefinition>>> {
        self.ensure_prepared()?;
        Ok(self.result.as_ref().map(|rows| rows.columns.clone()))
    }

    fn bind_results(&mut self, binds: &[ResultBind]) -> DriverResult<()> {
        self.ensure_prepared()?;
        self.record(Event::BindResults(binds.len()));
        Ok(())
    }

    fn fetch(&mut self, binds: &mut [ResultBind]) -> DriverResult<FetchStatus> {
        self.ensure_prepared()?;
        self.record(Event::Fetch);
        let failure = {
            let mut state = self.shared.borrow_mut();
            match state.fetch_failure {
                Some((after, _)) if after == self.cursor => state.fetch_failure.take(),
                _ => None,
            }
        };
        if let Some((_, error)) = failure {
            return Err(self.fail(error));
        }

        let Some(result) = self.result.as_ref() else {
            return Ok(FetchStatus::NoData);
        };
        let Some(row) = result.rows.get(self.cursor) else {
            self.current = None;
            return Ok(FetchStatus::NoData);
        };

        let mut truncated = false;
        for (slot, bind) in binds.iter_mut().enumerate() {
            let cell = row.get(slot).unwrap_or(&Cell::Null);
            truncated |= cell.fill(bind);
            bind.is_unsigned = result
                .columns
                .get(slot)
                .is_some_and(ColumnDefinition::is_unsigned);
        }
        self.current = Some(self.cursor);
        self.cursor += 1;
        Ok(if truncated {
            FetchStatus::Truncated
        } else {
            FetchStatus::Row
        })
    }

    fn fetch_column(&mut self, slot: usize, offset: usize, buf: &mut [u8]) -> DriverResult<usize> {
        let Some(cell) = self.current_cell(slot) else {
            return Err(self.fail(DriverError::new(2034, "Invalid column or no current row")));
        };
        let bytes = cell.to_bytes();
        let tail = bytes.get(offset..).unwrap_or_default();
        let n = tail.len().min(buf.len());
        buf[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }

    fn free_result(&mut self) -> DriverResult<()> {
        self.record(Event::FreeResult);
        self.result = None;
        self.current = None;
        Ok(())
    }

    fn reset(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        self.record(Event::Reset);
        self.long_data.clear();
        self.result = None;
        self.current = None;
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.record(Event::Close);
        self.closed = true;
        Ok(())
    }

    fn error_message(&self) -> Option<String> {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_db_skips_current() {
        let mut conn = MemoryConnection::new();
        conn.select_db("app").unwrap();
        conn.select_db("app").unwrap();
        conn.select_db("other").unwrap();
        assert_eq!(conn.current_db(), Some("other"));
        assert_eq!(
            conn.events(),
            vec![Event::SelectDb("app".into()), Event::SelectDb("other".into())]
        );
    }

    #[test]
    fn test_fetch_reports_lengths_for_unbound_buffers() {
        let mut conn = MemoryConnection::new();
        conn.respond(
            "SELECT name",
            Rows::new(vec![ColumnDefinition::new("name", FieldType::VarString)])
                .row(vec!["abc".into()]),
        );
        let mut stmt = conn.stmt_init().unwrap();
        stmt.prepare("SELECT name").unwrap();
        stmt.execute(&[]).unwrap();

        let mut binds = vec![ResultBind::default()];
        assert_eq!(stmt.fetch(&mut binds).unwrap(), FetchStatus::Truncated);
        assert_eq!(binds[0].length, 3);

        let mut buf = [0u8; 2];
        assert_eq!(stmt.fetch_column(0, 1, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"bc");
        assert_eq!(stmt.fetch(&mut binds).unwrap(), FetchStatus::NoData);
    }

    #[test]
    fn test_execute_requires_declared_params() {
        let mut conn = MemoryConnection::new();
        let mut stmt = conn.stmt_init().unwrap();
        stmt.prepare("SELECT ?").unwrap();
        let bind = ParamBind {
            buffer_type: FieldType::LongLong,
            is_unsigned: false,
            data: ParamData::Integer(1),
        };
        let err = stmt.execute(&[bind]).unwrap_err();
        assert_eq!(err.code, 2031);
        assert!(stmt.error_message().is_some());
        assert!(conn.error_message().is_some());
    }

    #[test]
    fn test_closed_statement_rejects_calls() {
        let mut conn = MemoryConnection::new();
        let mut stmt = conn.stmt_init().unwrap();
        stmt.close().unwrap();
        assert_eq!(stmt.prepare("SELECT 1").unwrap_err().code, 2056);
    }
}
