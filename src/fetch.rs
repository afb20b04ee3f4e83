//! Read path: field descriptors, result values and the row fetch loop.
//!
//! Fixed-size columns are fetched straight into their [`ResultBind`] buffers. String
//! and blob columns are fetched in two steps: the row advance only reports their
//! length, then each one is copied into a result-arena buffer of exactly that size
//! with `fetch_column`.

use crate::arena::{AllocError, Arena, ArenaRef, Tier, Tiers};
use crate::array::IndirectArray;
use crate::driver::{DriverError, NativeStatement};
use crate::value::{DateTime, Kind, Value};
use crate::wire::{ColumnDefinition, FetchStatus, FieldType, ResultBind, ResultBuffer};

/// Column metadata, captured once after the first execute.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: ArenaRef,
    org_name: ArenaRef,
    table: ArenaRef,
    field_type: FieldType,
    charset: u16,
    decimals: u8,
    flags: u16,
}

impl FieldDescriptor {
    fn capture(column: &ColumnDefinition, arena: &mut Arena) -> Result<Self, AllocError> {
        Ok(Self {
            name: arena.alloc_str(&column.name)?,
            org_name: arena.alloc_str(&column.org_name)?,
            table: arena.alloc_str(&column.table)?,
            field_type: column.field_type,
            charset: column.charset,
            decimals: column.decimals,
            flags: column.flags,
        })
    }

    fn matches(&self, tiers: &Tiers, name: &str) -> bool {
        tiers.get_str(self.name) == name || tiers.get_str(self.org_name) == name
    }

    fn kind(&self) -> Kind {
        self.field_type.classify(self.charset)
    }
}

/// Read-only view of a field descriptor.
#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    field: &'a FieldDescriptor,
    tiers: &'a Tiers,
}

impl<'a> FieldView<'a> {
    /// Column name or alias.
    pub fn name(&self) -> &'a str {
        self.tiers.get_str(self.field.name)
    }

    /// Name of the column in its table.
    pub fn org_name(&self) -> &'a str {
        self.tiers.get_str(self.field.org_name)
    }

    pub fn table(&self) -> &'a str {
        self.tiers.get_str(self.field.table)
    }

    pub fn field_type(&self) -> FieldType {
        self.field.field_type
    }

    pub fn charset(&self) -> u16 {
        self.field.charset
    }

    pub fn decimals(&self) -> u8 {
        self.field.decimals
    }

    pub fn flags(&self) -> u16 {
        self.field.flags
    }

    /// Kind values of this column are materialized as.
    pub fn kind(&self) -> Kind {
        self.field.kind()
    }
}

#[derive(Debug, Clone, Copy)]
enum ResultData {
    None,
    Integer(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime),
    Buffer(ArenaRef),
}

/// Value of one column in the current row.
#[derive(Debug, Clone)]
pub struct ResultValue {
    name: ArenaRef,
    kind: Kind,
    data: ResultData,
    /// Result-arena buffer reused from row to row.
    buffer: Option<ArenaRef>,
    is_null: bool,
    is_unsigned: bool,
    error: bool,
    length: usize,
}

impl ResultValue {
    fn new(field: &FieldDescriptor) -> Self {
        let kind = field.kind();
        Self {
            name: field.name,
            kind,
            data: ResultData::None,
            buffer: None,
            is_null: kind == Kind::NULL,
            is_unsigned: false,
            error: false,
            length: 0,
        }
    }

    fn value<'t>(&self, tiers: &'t Tiers) -> Value<'t> {
        if self.is_null || self.kind == Kind::NULL {
            return Value::Null;
        }
        match self.data {
            ResultData::None => Value::None,
            ResultData::Integer(v) => Value::Integer(v),
            ResultData::Float(v) => Value::Float(v),
            ResultData::Bool(v) => Value::Bool(v),
            ResultData::DateTime(v) => Value::DateTime(v),
            ResultData::Buffer(h) if self.kind == Kind::CSTRING => {
                tiers.get_cstr(h).map_or(Value::None, Value::CString)
            }
            ResultData::Buffer(h) => tiers
                .get(h)
                .ok()
                .and_then(|b| b.get(..self.length))
                .map_or(Value::None, Value::Bytes),
        }
    }
}

/// Read-only view of one column of the current row.
#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    field: &'a FieldDescriptor,
    value: &'a ResultValue,
    tiers: &'a Tiers,
}

impl<'a> Column<'a> {
    pub fn name(&self) -> &'a str {
        self.tiers.get_str(self.value.name)
    }

    pub fn field(&self) -> FieldView<'a> {
        FieldView {
            field: self.field,
            tiers: self.tiers,
        }
    }

    pub fn kind(&self) -> Kind {
        self.value.kind
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null || self.value.kind == Kind::NULL
    }

    pub fn is_unsigned(&self) -> bool {
        self.value.is_unsigned
    }

    /// Set when the native layer truncated the value.
    pub fn error(&self) -> bool {
        self.value.error
    }

    /// Byte length reported for this column in the current row.
    pub fn length(&self) -> usize {
        self.value.length
    }

    pub fn value(&self) -> Value<'a> {
        self.value.value(self.tiers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchState {
    /// Result buffers not declared yet.
    Unbound,
    /// Buffers declared, no row fetched.
    Empty,
    /// A row is materialized.
    Filled,
    Exhausted,
}

/// Field table, value table and result buffers of one statement, kept in lock-step:
/// `values[i]` and `binds[i]` always describe `fields[i]`.
#[derive(Debug)]
pub(crate) struct ResultSet {
    fields: IndirectArray<FieldDescriptor>,
    values: IndirectArray<ResultValue>,
    binds: IndirectArray<ResultBind>,
    state: FetchState,
    last_error: Option<DriverError>,
}

impl ResultSet {
    pub(crate) fn new() -> Self {
        Self {
            fields: IndirectArray::new(16, Tier::Statement),
            values: IndirectArray::new(16, Tier::Result),
            binds: IndirectArray::new(16, Tier::Result),
            state: FetchState::Unbound,
            last_error: None,
        }
    }

    pub(crate) fn state(&self) -> FetchState {
        self.state
    }

    pub(crate) fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn last_error(&self) -> Option<&DriverError> {
        self.last_error.as_ref()
    }

    /// Replaces the field table, rebuilding the statement tier.
    pub(crate) fn capture(
        &mut self,
        columns: &[ColumnDefinition],
        tiers: &mut Tiers,
    ) -> Result<(), AllocError> {
        self.clear();
        self.fields.clear();
        tiers.reset(Tier::Statement);
        let arena = tiers.arena_mut(Tier::Statement);
        for column in columns {
            self.fields.push(FieldDescriptor::capture(column, arena)?)?;
        }
        Ok(())
    }

    /// Forgets the current result: values, buffers and state. Field descriptors and
    /// the memory behind them are kept until the next capture.
    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.binds.clear();
        self.state = FetchState::Unbound;
        self.last_error = None;
    }

    /// A new execute starts a fresh result: buffers stay declared, rows start over.
    pub(crate) fn rewind(&mut self) {
        if self.state != FetchState::Unbound {
            self.state = FetchState::Empty;
        }
        self.last_error = None;
    }

    pub(crate) fn forget_fields(&mut self) {
        self.clear();
        self.fields.clear();
    }

    pub(crate) fn fields<'a>(&'a self, tiers: &'a Tiers) -> impl Iterator<Item = FieldView<'a>> {
        self.fields.iter().map(move |field| FieldView { field, tiers })
    }

    /// Column of the current row by alias or original name, compared exactly.
    pub(crate) fn column<'a>(&'a self, tiers: &'a Tiers, name: &str) -> Option<Column<'a>> {
        let idx = self.fields.iter().position(|f| f.matches(tiers, name))?;
        self.column_at(tiers, idx)
    }

    pub(crate) fn column_at<'a>(&'a self, tiers: &'a Tiers, idx: usize) -> Option<Column<'a>> {
        Some(Column {
            field: self.fields.get(idx)?,
            value: self.values.get(idx)?,
            tiers,
        })
    }

    /// Advances to the next row. `Ok(false)` once the rows are exhausted or the native
    /// fetch failed; the failure is kept in [`last_error`](Self::last_error).
    pub(crate) fn fetch<S: NativeStatement>(
        &mut self,
        native: &mut S,
        tiers: &mut Tiers,
    ) -> crate::Result<bool> {
        match self.state {
            FetchState::Exhausted => return Ok(false),
            FetchState::Unbound => self.bind(native)?,
            FetchState::Empty | FetchState::Filled => self.rearm(),
        }

        let status = match native.fetch(self.binds.as_mut_slice()) {
            Ok(FetchStatus::NoData) => {
                self.state = FetchState::Exhausted;
                return Ok(false);
            }
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "fetch failed, ending result set");
                self.last_error = Some(e);
                self.state = FetchState::Exhausted;
                return Ok(false);
            }
        };
        tracing::trace!(?status, columns = self.fields.len(), "row fetched");

        for idx in 0..self.values.len() {
            self.materialize(idx, native, tiers);
        }
        self.state = FetchState::Filled;
        Ok(true)
    }

    fn bind<S: NativeStatement>(&mut self, native: &mut S) -> crate::Result<()> {
        self.values.clear();
        self.binds.clear();
        for field in &self.fields {
            let value = ResultValue::new(field);
            let buffer = match value.kind {
                Kind::INTEGER | Kind::NULL => ResultBuffer::Integer(0),
                Kind::FLOAT => ResultBuffer::Float(0.0),
                Kind::BOOL => ResultBuffer::Bool(false),
                Kind::DATETIME => ResultBuffer::DateTime(DateTime::default()),
                _ => ResultBuffer::Unbound,
            };
            self.binds.push(ResultBind {
                buffer_type: Some(field.field_type.fetch_buffer_type()),
                buffer,
                is_null: value.kind == Kind::NULL,
                ..ResultBind::default()
            })?;
            self.values.push(value)?;
        }
        native.bind_results(self.binds.as_slice())?;
        self.state = FetchState::Empty;
        Ok(())
    }

    /// Clears what the previous row left behind. Variable-length columns go back to
    /// "report the length only"; fixed buffers stay bound.
    fn rearm(&mut self) {
        for (value, bind) in self.values.iter_mut().zip(self.binds.iter_mut()) {
            value.data = ResultData::None;
            value.is_null = value.kind == Kind::NULL;
            value.error = false;
            value.length = 0;
            bind.length = 0;
            bind.error = false;
            if value.kind.is_variable() {
                bind.buffer = ResultBuffer::Unbound;
            }
        }
    }

    fn materialize<S: NativeStatement>(&mut self, idx: usize, native: &mut S, tiers: &mut Tiers) {
        let Some(bind) = self.binds.get(idx) else {
            return;
        };
        let Some(value) = self.values.get_mut(idx) else {
            return;
        };
        value.length = bind.length;
        value.error = bind.error;
        value.is_unsigned = bind.is_unsigned;

        if !value.kind.is_variable() {
            value.is_null = bind.is_null || value.kind == Kind::NULL;
            value.data = match bind.buffer {
                ResultBuffer::Unbound => ResultData::None,
                ResultBuffer::Integer(v) => ResultData::Integer(v),
                ResultBuffer::Float(v) => ResultData::Float(v),
                ResultBuffer::Bool(v) => ResultData::Bool(v),
                ResultBuffer::DateTime(v) => ResultData::DateTime(v),
            };
            return;
        }

        // an empty string or blob reads as NULL
        if bind.is_null || bind.length == 0 {
            value.is_null = true;
            return;
        }

        let length = bind.length;
        let size = length + usize::from(value.kind == Kind::CSTRING);
        let handle = match tiers.arena_mut(Tier::Result).realloc(value.buffer, size) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(column = idx, length, error = %e, "no buffer for column, skipping");
                return;
            }
        };
        value.buffer = Some(handle);
        let buf = match tiers.get_mut(handle) {
            Ok(buf) => buf,
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "column buffer lost, skipping");
                return;
            }
        };
        if let Err(e) = native.fetch_column(idx, 0, &mut buf[..length]) {
            tracing::warn!(column = idx, error = %e, "fetch_column failed, skipping");
            return;
        }
        if value.kind == Kind::CSTRING {
            buf[length] = 0;
        }
        value.data = ResultData::Buffer(handle);
        value.error = false;
    }
}
