//! # sqlx-named-stmt
//!
//! Named-parameter prepared statements for MySQL, with typed bind and fetch buffers
//! kept in tiered arenas.
//!
//! ## Features
//!
//! - **Named Placeholders**: Use `:param_name` instead of `?` in your SQL queries; quoted
//!   regions and escapes are left alone
//! - **Bind by Name**: One `bind` call updates every occurrence of a name, compared
//!   case-insensitively
//! - **Streaming Parameters**: Large text and blobs are pulled from a callback and sent as
//!   long data in chunks
//! - **Typed Fetch**: Columns are materialized as integer, float, string, bytes or
//!   datetime values and looked up by alias or original column name
//! - **Tiered Arenas**: Statement, query and result memory are released independently, and
//!   borrowed values cannot outlive a reset
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sqlx-named-stmt = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Basic Query Execution
//!
//! ```rust,no_run
//! use sqlx_named_stmt::driver::mysql::MySqlConnection;
//! use sqlx_named_stmt::Statement;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = MySqlConnection::connect("mysql://localhost/test")?;
//!
//! let mut stmt = Statement::new(&mut conn)?;
//! stmt.prepare("INSERT INTO users (id, name) VALUES (:id, :name)")?;
//! stmt.bind("id", 42)?;
//! stmt.bind("name", "John Doe")?;
//! stmt.execute()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading Rows
//!
//! ```rust
//! use sqlx_named_stmt::driver::memory::{MemoryConnection, Rows};
//! use sqlx_named_stmt::wire::{ColumnDefinition, FieldType};
//! use sqlx_named_stmt::Statement;
//!
//! # let mut conn = MemoryConnection::new();
//! # conn.respond(
//! #     "SELECT id, name FROM users WHERE age >= ?",
//! #     Rows::new(vec![
//! #         ColumnDefinition::new("id", FieldType::Long),
//! #         ColumnDefinition::new("name", FieldType::VarString),
//! #     ])
//! #     .row(vec![1.into(), "Ann".into()])
//! #     .row(vec![2.into(), "Bob".into()]),
//! # );
//! let mut stmt = Statement::new(&mut conn)?;
//! stmt.prepare("SELECT id, name FROM users WHERE age >= :min_age")?;
//! stmt.bind("min_age", 18)?;
//! stmt.execute()?;
//!
//! let mut names = Vec::new();
//! while stmt.fetch()? {
//!     names.push(stmt.get_str("name").unwrap_or_default().to_owned());
//! }
//! assert_eq!(names, ["Ann", "Bob"]);
//! # Ok::<(), sqlx_named_stmt::Error>(())
//! ```
//!
//! ### Streaming Parameters
//!
//! ```rust
//! use sqlx_named_stmt::driver::memory::MemoryConnection;
//! use sqlx_named_stmt::{data_callback, Statement};
//!
//! # let mut conn = MemoryConnection::new();
//! let mut remaining = vec![b'x'; 10_000];
//! let source = data_callback(move |buf: &mut [u8]| {
//!     let n = remaining.len().min(buf.len());
//!     buf[..n].copy_from_slice(&remaining[..n]);
//!     remaining.drain(..n);
//!     n
//! });
//!
//! let mut stmt = Statement::new(&mut conn)?;
//! stmt.prepare("INSERT INTO files (body) VALUES (:body)")?;
//! stmt.bind_lbytes("body", source)?;
//! stmt.execute()?;
//! # Ok::<(), sqlx_named_stmt::Error>(())
//! ```
//!
//! ### Re-executing with New Values
//!
//! ```rust
//! # use sqlx_named_stmt::driver::memory::MemoryConnection;
//! # use sqlx_named_stmt::Statement;
//! # let mut conn = MemoryConnection::new();
//! let mut stmt = Statement::new(&mut conn)?;
//! stmt.prepare("UPDATE accounts SET balance = balance + :amount WHERE id = :id")?;
//!
//! for (id, amount) in [(1, -100), (2, 100)] {
//!     stmt.bind("id", id)?;
//!     stmt.bind("amount", amount)?;
//!     stmt.execute()?;
//!     stmt.reset_execution()?;
//! }
//! # Ok::<(), sqlx_named_stmt::Error>(())
//! ```
//!
//! ## How It Works
//!
//! 1. **Rewrite**: `:name` placeholders outside quotes become `?`, and every occurrence
//!    gets its own parameter entry in bind order
//! 2. **Bind**: values are copied into the query arena; the parameter buffer table is
//!    declared once per prepare and re-read on every execute
//! 3. **Fetch**: fixed-size columns land in bound buffers, strings and blobs are sized by
//!    the row advance and then copied into the result arena
//!
//! ## Limitations
//!
//! - Currently only supports MySQL
//! - Placeholder names must match `[a-zA-Z0-9_]+`
//! - A statement owns no connection; statements on one connection run one at a time
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod arena;
pub mod array;
mod bind;
pub mod builder;
pub mod config;
pub mod driver;
pub mod error;
mod fetch;
pub mod query;
pub mod value;
pub mod wire;

pub use bind::ParamView;
pub use config::StatementConfig;
pub use error::{Error, Result};
pub use fetch::{Column, FieldView};
pub use query::Statement;
pub use value::{data_callback, BindValue, DataCallback, DateTime, Kind, LongData, Value};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::driver::{Connection, NativeStatement};
    pub use crate::error::{Error, Result};
    pub use crate::value::{data_callback, BindValue, DateTime, Kind, Value};
    pub use crate::{Statement, StatementConfig};
}
