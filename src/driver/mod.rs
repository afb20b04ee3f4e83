//! Native connection layer.
//!
//! A [`Statement`](crate::Statement) never talks to the network itself. It drives a
//! [`NativeStatement`] obtained from a [`Connection`], which mirrors the blocking
//! prepared-statement primitives of the MySQL client library.
//!
//! Two implementations ship with the crate:
//!
//! - [`mysql::MySqlConnection`], backed by `sqlx`
//! - [`memory::MemoryConnection`], scripted in-process, for tests

mod cell;
pub mod memory;
pub mod mysql;

pub use cell::Cell;

use crate::wire::{ColumnDefinition, FetchStatus, ParamBind, ResultBind};

/// Failure reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct DriverError {
    pub code: u32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(e: sqlx::Error) -> Self {
        let code = match &e {
            sqlx::Error::Database(db) => db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| u32::from(e.number()))
                .unwrap_or(2000),
            _ => 2000,
        };
        DriverError::new(code, e.to_string())
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// An open database connection.
///
/// Statements may share a connection one after another, never at the same time.
pub trait Connection {
    type Statement: NativeStatement;

    /// Selects the default database. Selecting the current one again is a no-op.
    fn select_db(&mut self, name: &str) -> DriverResult<()>;

    /// Name of the database last selected through [`select_db`](Self::select_db).
    fn current_db(&self) -> Option<&str>;

    fn ping(&mut self) -> DriverResult<()>;

    /// Message of the last failure seen on this connection.
    fn error_message(&self) -> Option<String>;

    /// Allocates a native statement handle.
    fn stmt_init(&mut self) -> DriverResult<Self::Statement>;
}

/// Blocking prepared-statement primitives.
pub trait NativeStatement {
    /// Prepares positional SQL, replacing any previously prepared text.
    fn prepare(&mut self, sql: &str) -> DriverResult<()>;

    /// Declares the parameter buffer table. Called once per prepare.
    fn bind_params(&mut self, binds: &[ParamBind<'_>]) -> DriverResult<()>;

    /// Appends a chunk to the long data of parameter `slot`.
    fn send_long_data(&mut self, slot: usize, chunk: &[u8]) -> DriverResult<()>;

    /// Executes with the current contents of the parameter buffers.
    fn execute(&mut self, binds: &[ParamBind<'_>]) -> DriverResult<()>;

    /// Column metadata of the result set, `None` for statements without one.
    fn result_metadata(&mut self) -> DriverResult<Option<Vec<ColumnDefinition>>>;

    /// Declares the result buffer table.
    fn bind_results(&mut self, binds: &[ResultBind]) -> DriverResult<()>;

    /// Advances to the next row, filling fixed-size buffers and reporting the length
    /// of every column.
    fn fetch(&mut self, binds: &mut [ResultBind]) -> DriverResult<FetchStatus>;

    /// Copies column `slot` of the current row, starting at `offset`, into `buf`.
    /// Returns the number of bytes copied.
    fn fetch_column(&mut self, slot: usize, offset: usize, buf: &mut [u8]) -> DriverResult<usize>;

    /// Discards the rest of the current result set.
    fn free_result(&mut self) -> DriverResult<()>;

    /// Resets the server-side statement: pending long data and results are dropped,
    /// the prepared form is kept.
    fn reset(&mut self) -> DriverResult<()>;

    /// Closes the statement handle.
    fn close(&mut self) -> DriverResult<()>;

    fn error_message(&self) -> Option<String>;
}
