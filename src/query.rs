use std::io::{self, Write};

use crate::arena::{ArenaRef, Tier, Tiers};
use crate::array::IndirectArray;
use crate::bind::{self, ParamView, Parameter, Staged};
use crate::builder::{rewrite, Rewritten};
use crate::config::{ArenaConfig, StatementConfig, UnknownParameter};
use crate::driver::{Connection, DriverError, NativeStatement};
use crate::error::Error;
use crate::fetch::{Column, FetchState, FieldView, ResultSet};
use crate::value::{BindValue, DataCallback, DateTime, Kind, Value};

/// A prepared statement with named placeholders.
///
/// `Statement` rewrites `:name` placeholders into `?`, keeps one parameter entry per
/// occurrence, and exchanges values with the native statement through buffers
/// held in three arenas:
///
/// - the statement tier holds field descriptors
/// - the query tier holds the rewritten SQL, parameter names and bound values
/// - the result tier holds string and blob columns of the current result set
///
/// # Lifecycle
///
/// `prepare` → `bind`… → `execute` → `fetch`… (→ `reset_execution` → `bind`… →
/// `execute` …) → `reset` → `prepare` …
///
/// # Examples
///
/// ```
/// use sqlx_named_stmt::driver::memory::{MemoryConnection, Rows};
/// use sqlx_named_stmt::wire::{ColumnDefinition, FieldType};
/// use sqlx_named_stmt::Statement;
///
/// let mut conn = MemoryConnection::new();
/// conn.respond(
///     "SELECT id, name FROM users WHERE id = ?",
///     Rows::new(vec![
///         ColumnDefinition::new("id", FieldType::LongLong),
///         ColumnDefinition::new("name", FieldType::VarString),
///     ])
///     .row(vec![42i64.into(), "John Doe".into()]),
/// );
///
/// let mut stmt = Statement::new(&mut conn)?;
/// stmt.prepare("SELECT id, name FROM users WHERE id = :id")?;
/// stmt.bind("id", 42)?;
/// stmt.execute()?;
///
/// while stmt.fetch()? {
///     assert_eq!(stmt.get_i64("id"), Some(42));
///     assert_eq!(stmt.get_str("name"), Some("John Doe"));
/// }
/// # Ok::<(), sqlx_named_stmt::Error>(())
/// ```
pub struct Statement<S: NativeStatement> {
    native: S,
    config: StatementConfig,
    tiers: Tiers,
    query: Option<ArenaRef>,
    params: IndirectArray<Parameter>,
    results: ResultSet,
    params_bound: bool,
    result_bound: bool,
    query_executed: bool,
    closed: bool,
}

impl<S: NativeStatement> Statement<S> {
    /// Creates a statement on `conn` with the default configuration.
    pub fn new<C>(conn: &mut C) -> crate::Result<Self>
    where
        C: Connection<Statement = S>,
    {
        Self::with_config(conn, StatementConfig::default())
    }

    /// Creates a statement on `conn`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid configuration, [`Error::Protocol`] when the
    /// connection cannot allocate a statement handle.
    pub fn with_config<C>(conn: &mut C, config: StatementConfig) -> crate::Result<Self>
    where
        C: Connection<Statement = S>,
    {
        config.validate()?;
        let native = conn.stmt_init()?;
        Ok(Self {
            native,
            tiers: Tiers::new(&config.arena),
            query: None,
            params: IndirectArray::new(config.params_capacity, Tier::Query),
            results: ResultSet::new(),
            params_bound: false,
            result_bound: false,
            query_executed: false,
            closed: false,
            config,
        })
    }

    /// Rewrites `template` and prepares it.
    ///
    /// Any previously prepared query, its parameters and its result set are released
    /// first, so the new parameter table starts empty.
    ///
    /// # Errors
    ///
    /// - [`Error::UnterminatedQuote`] / [`Error::TrailingEscape`] for a malformed template
    /// - [`Error::Allocation`] when the query arena is exhausted
    /// - [`Error::Protocol`] when the server rejects the SQL
    pub fn prepare(&mut self, template: &str) -> crate::Result<()> {
        let rewritten = rewrite(template, self.config.quoting)?;

        if self.query_executed {
            if let Err(e) = self.native.free_result() {
                tracing::warn!(error = %e, "free_result failed before prepare");
            }
        }
        self.release_query();

        match self.load_query(&rewritten) {
            Ok(query) => {
                self.query = Some(query);
                Ok(())
            }
            Err(e) => {
                // nothing of the failed template survives
                self.release_query();
                Err(e)
            }
        }
    }

    fn load_query(&mut self, rewritten: &Rewritten) -> crate::Result<ArenaRef> {
        let arena = self.tiers.arena_mut(Tier::Query);
        let query = arena.alloc_str(&rewritten.sql)?;
        for placeholder in &rewritten.placeholders {
            let name = arena.alloc_str(&placeholder.name)?;
            self.params.push(Parameter::new(name))?;
        }

        tracing::debug!(sql = %rewritten.sql, params = self.params.len(), "preparing statement");
        if let Err(e) = self.native.prepare(&rewritten.sql) {
            tracing::warn!(error = %e, "prepare failed");
            return Err(e.into());
        }
        Ok(query)
    }

    /// Binds `value` to every parameter named `name`, compared case-insensitively.
    ///
    /// Returns how many placeholders were updated. Binding again overwrites the
    /// previous value. An unknown name updates nothing, or fails with
    /// [`Error::UnknownParameter`] when configured so.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sqlx_named_stmt::driver::memory::MemoryConnection;
    /// # use sqlx_named_stmt::Statement;
    /// # let mut conn = MemoryConnection::new();
    /// let mut stmt = Statement::new(&mut conn)?;
    /// stmt.prepare("SELECT * FROM t WHERE a = :x AND b = :x")?;
    /// assert_eq!(stmt.bind("x", 5)?, 2);
    /// assert_eq!(stmt.bind("missing", 1)?, 0);
    /// # Ok::<(), sqlx_named_stmt::Error>(())
    /// ```
    pub fn bind<'v>(&mut self, name: &str, value: impl Into<BindValue<'v>>) -> crate::Result<usize> {
        if self.query.is_none() {
            return Err(Error::NotPrepared);
        }
        let mut matched = self.params.iter().filter(|p| p.matches(&self.tiers, name));
        let Some(first) = matched.next() else {
            return match self.config.unknown_parameter {
                UnknownParameter::Ignore => Ok(0),
                UnknownParameter::Error => Err(Error::UnknownParameter(name.to_owned())),
            };
        };
        // every occurrence of a name shares one value block
        let buffer = first.buffer();
        let matches = 1 + matched.count();

        let staged = Staged::new(value.into(), self.tiers.arena_mut(Tier::Query), buffer)?;
        for param in self.params.iter_mut() {
            if param.matches(&self.tiers, name) {
                param.apply(&staged);
            }
        }
        tracing::trace!(name, kind = ?staged.kind(), matches, "parameter bound");
        Ok(matches)
    }

    pub fn bind_int(&mut self, name: &str, value: i64) -> crate::Result<usize> {
        self.bind(name, BindValue::Integer(value))
    }

    pub fn bind_uint(&mut self, name: &str, value: u64) -> crate::Result<usize> {
        self.bind(name, BindValue::Unsigned(value))
    }

    pub fn bind_float(&mut self, name: &str, value: f64) -> crate::Result<usize> {
        self.bind(name, BindValue::Float(value))
    }

    pub fn bind_bool(&mut self, name: &str, value: bool) -> crate::Result<usize> {
        self.bind(name, BindValue::Bool(value))
    }

    pub fn bind_str(&mut self, name: &str, value: &str) -> crate::Result<usize> {
        self.bind(name, BindValue::Str(value))
    }

    /// Binds the first `len` bytes of `data`. A zero length binds NULL.
    pub fn bind_bytes(&mut self, name: &str, data: &[u8], len: usize) -> crate::Result<usize> {
        self.bind(name, BindValue::Bytes(&data[..len.min(data.len())]))
    }

    pub fn bind_datetime(&mut self, name: &str, value: DateTime) -> crate::Result<usize> {
        self.bind(name, BindValue::DateTime(value))
    }

    pub fn bind_null(&mut self, name: &str) -> crate::Result<usize> {
        self.bind(name, BindValue::Null)
    }

    /// Binds text produced by `source` while executing.
    pub fn bind_lstr(&mut self, name: &str, source: DataCallback) -> crate::Result<usize> {
        self.bind(name, BindValue::StreamStr(source))
    }

    /// Binds binary data produced by `source` while executing.
    pub fn bind_lbytes(&mut self, name: &str, source: DataCallback) -> crate::Result<usize> {
        self.bind(name, BindValue::StreamBytes(source))
    }

    /// Executes the prepared query with the current bindings.
    ///
    /// The parameter buffer table is declared to the native layer on the first
    /// execute after a prepare only. Streamed parameters are drained chunk by chunk
    /// through `send_long_data` before the execute itself. Field descriptors are
    /// captured after the first successful execute and kept for the statement's
    /// lifetime.
    ///
    /// # Errors
    ///
    /// - [`Error::NotPrepared`] without a prepared query
    /// - [`Error::UnboundPlaceholder`] for a placeholder never bound (when configured)
    /// - [`Error::Protocol`] when binding, sending long data or executing fails
    pub fn execute(&mut self) -> crate::Result<()> {
        if self.query.is_none() {
            return Err(Error::NotPrepared);
        }
        if self.config.reject_unbound {
            if let Some(param) = self.params.iter().find(|p| !p.is_bound()) {
                return Err(Error::UnboundPlaceholder(param.name(&self.tiers).to_owned()));
            }
        }
        for param in self.params.iter_mut() {
            param.set_error(false);
        }

        {
            let binds = bind::param_binds(&self.params, &self.tiers)?;
            if !self.params_bound {
                self.native.bind_params(&binds)?;
                self.params_bound = true;
            }

            let streams: Vec<(usize, DataCallback)> = self
                .params
                .iter()
                .enumerate()
                .filter_map(|(slot, p)| p.stream().map(|s| (slot, s.clone())))
                .collect();
            let mut chunk = vec![0u8; self.config.long_data_chunk];
            for (slot, source) in streams {
                let mut sent = 0usize;
                loop {
                    let produced = source.borrow_mut().fill(&mut chunk).min(chunk.len());
                    if produced == 0 {
                        break;
                    }
                    if let Err(e) = self.native.send_long_data(slot, &chunk[..produced]) {
                        tracing::warn!(slot, error = %e, "send_long_data failed");
                        if let Some(param) = self.params.get_mut(slot) {
                            param.set_error(true);
                        }
                        return Err(e.into());
                    }
                    sent += produced;
                }
                tracing::debug!(slot, bytes = sent, "long data sent");
            }

            if let Err(e) = self.native.execute(&binds) {
                tracing::warn!(error = %e, "execute failed");
                return Err(e.into());
            }
        }

        self.query_executed = true;
        self.results.rewind();
        if !self.result_bound {
            match self.native.result_metadata()? {
                Some(columns) => self.results.capture(&columns, &mut self.tiers)?,
                None => self.results.forget_fields(),
            }
            self.result_bound = true;
        }
        Ok(())
    }

    /// Fetches the next row. Returns `Ok(false)` when the rows are exhausted or the
    /// native fetch failed; see [`last_error`](Self::last_error).
    ///
    /// # Errors
    ///
    /// [`Error::NotExecuted`] before a successful execute, [`Error::Allocation`] or
    /// [`Error::Protocol`] when the result buffers cannot be set up.
    pub fn fetch(&mut self) -> crate::Result<bool> {
        if !self.query_executed {
            return Err(Error::NotExecuted);
        }
        self.results.fetch(&mut self.native, &mut self.tiers)
    }

    /// Resets the native statement so it can run again with new bindings. The
    /// prepared query, parameter values and captured fields are kept.
    pub fn reset_execution(&mut self) -> crate::Result<()> {
        self.query_executed = false;
        self.results.rewind();
        self.native.reset()?;
        Ok(())
    }

    /// Releases the query and result tiers and every cached latch. A new
    /// [`prepare`](Self::prepare) is needed before the next execute.
    pub fn reset(&mut self) -> crate::Result<()> {
        let freed = self.native.free_result();
        let reset = self.native.reset();
        self.release_query();
        tracing::debug!("statement reset");
        freed?;
        reset?;
        Ok(())
    }

    /// Closes the native statement and releases every arena.
    pub fn close(mut self) -> crate::Result<()> {
        self.closed = true;
        self.shutdown()?;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        let freed = self.native.free_result();
        let closed = self.native.close();
        self.release_query();
        let tiers = std::mem::replace(&mut self.tiers, Tiers::new(&ArenaConfig::default()));
        let bytes = tiers.destroy();
        tracing::debug!(bytes, "statement closed");
        freed.and(closed)
    }

    fn release_query(&mut self) {
        self.results.forget_fields();
        self.tiers.reset(Tier::Query);
        self.tiers.reset(Tier::Result);
        self.params.clear();
        self.query = None;
        self.params_bound = false;
        self.result_bound = false;
        self.query_executed = false;
    }

    /// The rewritten, positional SQL.
    pub fn sql(&self) -> Option<&str> {
        self.query.map(|q| self.tiers.get_str(q))
    }

    pub fn is_prepared(&self) -> bool {
        self.query.is_some()
    }

    /// Number of placeholder occurrences in the prepared query.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Parameters in bind-index order.
    pub fn parameters(&self) -> impl Iterator<Item = ParamView<'_>> {
        self.params.iter().map(move |param| ParamView {
            param,
            tiers: &self.tiers,
        })
    }

    /// Number of columns of the captured result shape.
    pub fn field_count(&self) -> usize {
        self.results.field_count()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldView<'_>> {
        self.results.fields(&self.tiers)
    }

    /// Column of the current row by alias or original column name.
    pub fn column(&self, name: &str) -> Option<Column<'_>> {
        if self.results.state() != FetchState::Filled {
            return None;
        }
        self.results.column(&self.tiers, name)
    }

    pub fn column_at(&self, idx: usize) -> Option<Column<'_>> {
        if self.results.state() != FetchState::Filled {
            return None;
        }
        self.results.column_at(&self.tiers, idx)
    }

    /// Value of a column in the current row; `None` when the column is unknown or
    /// NULL.
    pub fn value(&self, name: &str) -> Option<Value<'_>> {
        let column = self.column(name)?;
        if column.is_null() {
            return None;
        }
        Some(column.value())
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.value(name)?.as_i64()
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.value(name)?.as_f64()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.value(name)?.as_bool()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.value(name)?.as_str()
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.value(name)?.as_bytes()
    }

    pub fn get_datetime(&self, name: &str) -> Option<DateTime> {
        self.value(name)?.as_datetime()
    }

    /// Failure that ended the last fetch loop early, if any.
    pub fn last_error(&self) -> Option<&DriverError> {
        self.results.last_error()
    }

    /// Message of the last failure on the native statement.
    pub fn error_message(&self) -> Option<String> {
        self.native.error_message()
    }

    /// Writes the rewritten SQL and every parameter in a tabular debug format.
    ///
    /// ```text
    /// PARSED QUERY [SELECT * FROM t WHERE id = ?]
    ///     PARAMETERS [expected   1, found   1]:
    ///     •   1 integer( 1)   id                   "42"
    /// ```
    pub fn dump<W: Write>(&self, mut sink: W) -> io::Result<()> {
        let sql = self.sql().unwrap_or_default();
        let expected = sql.bytes().filter(|&b| b == b'?').count();
        writeln!(sink, "PARSED QUERY [{sql}]")?;
        writeln!(
            sink,
            "\tPARAMETERS [expected {:3}, found {:3}]:",
            expected,
            self.params.len()
        )?;
        for (idx, param) in self.parameters().enumerate() {
            let kind = param.kind();
            write!(
                sink,
                "\t• {:3} {:>7}({:2})\t{:<20} ",
                idx + 1,
                kind.name(),
                kind.bits(),
                param.name()
            )?;
            match param.value() {
                Value::CString(s) => write!(sink, "\"{}\"", s.to_string_lossy())?,
                Value::Float(v) => write!(sink, "\"{v:.6}\"")?,
                Value::Integer(v) if param.is_unsigned() => write!(sink, "\"{}\"", v as u64)?,
                Value::Integer(v) => write!(sink, "\"{v}\"")?,
                Value::Bool(v) => write!(sink, "\"{}\"", if v { "TRUE" } else { "FALSE" })?,
                Value::Bytes(bytes) => {
                    for b in bytes {
                        write!(sink, "{b:02X} ")?;
                    }
                }
                Value::DateTime(dt) => write!(sink, "\"{dt}\"")?,
                Value::DataCallback(_) => write!(sink, "<stream>")?,
                Value::Null | Value::None => write!(sink, "\"NULL\"")?,
            }
            writeln!(sink)?;
        }
        Ok(())
    }

    /// Kind of every parameter, in bind-index order.
    pub fn param_kinds(&self) -> Vec<Kind> {
        self.params.iter().map(Parameter::kind).collect()
    }
}

impl<S: NativeStatement> Drop for Statement<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "closing statement failed");
        }
    }
}
