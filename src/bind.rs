//! Write path: parameter table entries and their wire buffers.

use crate::arena::{AllocError, Arena, ArenaRef, Tiers};
use crate::array::IndirectArray;
use crate::value::{BindValue, DataCallback, DateTime, Kind, Value};
use crate::wire::{FieldType, ParamBind, ParamData};

#[derive(Clone)]
enum Payload {
    None,
    Integer(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime),
    Text(ArenaRef),
    Bytes(ArenaRef),
    Stream(DataCallback),
    Null,
}

/// A bind value copied into the query arena, ready to be applied to every
/// parameter sharing a name.
#[derive(Clone)]
pub(crate) struct Staged {
    kind: Kind,
    payload: Payload,
    is_unsigned: bool,
    length: usize,
    /// Query-arena block backing string and byte values, reused by later binds.
    buffer: Option<ArenaRef>,
}

impl Staged {
    /// Stages `value`. String and byte payloads are written into `buffer`, the block
    /// left by a previous bind of the same name, resized in place; a new block is
    /// taken only when there is none yet.
    pub(crate) fn new(
        value: BindValue<'_>,
        arena: &mut Arena,
        buffer: Option<ArenaRef>,
    ) -> Result<Self, AllocError> {
        let kind = value.kind();
        let mut kept = buffer;
        let (payload, is_unsigned, length) = match value {
            BindValue::Integer(v) => (Payload::Integer(v), false, 8),
            // same 64 bits, sent with the unsigned flag
            BindValue::Unsigned(v) => (Payload::Integer(v as i64), true, 8),
            BindValue::Float(v) => (Payload::Float(v), false, 8),
            BindValue::Bool(v) => (Payload::Bool(v), false, 1),
            BindValue::DateTime(v) => (Payload::DateTime(v), false, 0),
            BindValue::Str(s) => {
                let handle = arena.realloc(buffer, s.len() + 1)?;
                let block = arena.get_mut(handle)?;
                block[..s.len()].copy_from_slice(s.as_bytes());
                block[s.len()] = 0;
                kept = Some(handle);
                (Payload::Text(handle), false, s.len())
            }
            BindValue::Bytes(b) if b.is_empty() => return Ok(Self::null(buffer)),
            BindValue::Bytes(b) => {
                let handle = arena.realloc(buffer, b.len())?;
                arena.get_mut(handle)?.copy_from_slice(b);
                kept = Some(handle);
                (Payload::Bytes(handle), false, b.len())
            }
            BindValue::Null => return Ok(Self::null(buffer)),
            BindValue::StreamStr(source) | BindValue::StreamBytes(source) => {
                (Payload::Stream(source), false, 0)
            }
        };
        Ok(Self {
            kind,
            payload,
            is_unsigned,
            length,
            buffer: kept,
        })
    }

    fn null(buffer: Option<ArenaRef>) -> Self {
        Self {
            kind: Kind::NULL,
            payload: Payload::Null,
            is_unsigned: false,
            length: 0,
            buffer,
        }
    }

    pub(crate) fn kind(&self) -> Kind {
        self.kind
    }
}

/// One placeholder occurrence of the prepared query.
#[derive(Clone)]
pub struct Parameter {
    name: ArenaRef,
    kind: Kind,
    payload: Payload,
    is_null: bool,
    is_unsigned: bool,
    error: bool,
    length: usize,
    buffer: Option<ArenaRef>,
}

impl Parameter {
    /// An unbound parameter whose name lives at `name`.
    pub(crate) fn new(name: ArenaRef) -> Self {
        Self {
            name,
            kind: Kind::NONE,
            payload: Payload::None,
            is_null: false,
            is_unsigned: false,
            error: false,
            length: 0,
            buffer: None,
        }
    }

    pub(crate) fn name<'t>(&self, tiers: &'t Tiers) -> &'t str {
        tiers.get_str(self.name)
    }

    pub(crate) fn matches(&self, tiers: &Tiers, name: &str) -> bool {
        self.name(tiers).eq_ignore_ascii_case(name)
    }

    pub(crate) fn apply(&mut self, staged: &Staged) {
        self.kind = staged.kind;
        self.payload = staged.payload.clone();
        self.is_null = matches!(staged.payload, Payload::Null);
        self.is_unsigned = staged.is_unsigned;
        self.length = staged.length;
        self.buffer = staged.buffer;
        self.error = false;
    }

    /// Query-arena block of the last string or byte value bound here.
    pub(crate) fn buffer(&self) -> Option<ArenaRef> {
        self.buffer
    }

    pub(crate) fn set_error(&mut self, error: bool) {
        self.error = error;
    }

    pub(crate) fn stream(&self) -> Option<&DataCallback> {
        match &self.payload {
            Payload::Stream(source) => Some(source),
            _ => None,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_bound(&self) -> bool {
        self.kind != Kind::NONE
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn is_unsigned(&self) -> bool {
        self.is_unsigned
    }

    /// Set when the native layer rejected this parameter on the last execute.
    pub fn error(&self) -> bool {
        self.error
    }

    /// Declared byte length of the bound value.
    pub fn length(&self) -> usize {
        self.length
    }

    pub(crate) fn value<'t>(&self, tiers: &'t Tiers) -> Value<'t> {
        match self.payload {
            Payload::None => Value::None,
            Payload::Integer(v) => Value::Integer(v),
            Payload::Float(v) => Value::Float(v),
            Payload::Bool(v) => Value::Bool(v),
            Payload::DateTime(v) => Value::DateTime(v),
            Payload::Text(h) => tiers.get_cstr(h).map_or(Value::None, Value::CString),
            Payload::Bytes(h) => tiers.get(h).map_or(Value::None, Value::Bytes),
            Payload::Stream(_) => Value::DataCallback(self.kind.base()),
            Payload::Null => Value::Null,
        }
    }

    /// Wire buffer for this parameter.
    pub(crate) fn wire<'t>(&self, tiers: &'t Tiers) -> Result<ParamBind<'t>, AllocError> {
        let (buffer_type, data) = match self.payload {
            Payload::None | Payload::Null => (FieldType::Null, ParamData::Null),
            Payload::Integer(v) => (FieldType::LongLong, ParamData::Integer(v)),
            Payload::Float(v) => (FieldType::Double, ParamData::Float(v)),
            Payload::Bool(v) => (FieldType::Tiny, ParamData::Bool(v)),
            Payload::DateTime(v) => (FieldType::DateTime, ParamData::DateTime(v)),
            Payload::Text(h) => (FieldType::String, ParamData::Bytes(&tiers.get(h)?[..self.length])),
            Payload::Bytes(h) => (FieldType::Blob, ParamData::Bytes(tiers.get(h)?)),
            Payload::Stream(_) if self.kind.contains(Kind::BYTES) => {
                (FieldType::Blob, ParamData::LongData)
            }
            Payload::Stream(_) => (FieldType::String, ParamData::LongData),
        };
        Ok(ParamBind {
            buffer_type,
            is_unsigned: self.is_unsigned,
            data,
        })
    }
}

/// Wire buffer table of a parameter table, in bind-index order.
pub(crate) fn param_binds<'t>(
    params: &IndirectArray<Parameter>,
    tiers: &'t Tiers,
) -> Result<Vec<ParamBind<'t>>, AllocError> {
    params.iter().map(|p| p.wire(tiers)).collect()
}

/// Read-only view of a parameter, borrowed from its statement.
#[derive(Clone, Copy)]
pub struct ParamView<'a> {
    pub(crate) param: &'a Parameter,
    pub(crate) tiers: &'a Tiers,
}

impl<'a> ParamView<'a> {
    pub fn name(&self) -> &'a str {
        self.param.name(self.tiers)
    }

    pub fn value(&self) -> Value<'a> {
        self.param.value(self.tiers)
    }

    pub fn kind(&self) -> Kind {
        self.param.kind()
    }

    pub fn is_null(&self) -> bool {
        self.param.is_null()
    }

    pub fn is_unsigned(&self) -> bool {
        self.param.is_unsigned()
    }

    pub fn length(&self) -> usize {
        self.param.length()
    }

    pub fn error(&self) -> bool {
        self.param.error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Tier;
    use crate::config::ArenaConfig;

    fn setup(name: &str) -> (Tiers, Parameter) {
        let mut tiers = Tiers::new(&ArenaConfig::default());
        let handle = tiers.arena_mut(Tier::Query).alloc_str(name).unwrap();
        (tiers, Parameter::new(handle))
    }

    fn stage(tiers: &mut Tiers, value: BindValue<'_>) -> Staged {
        Staged::new(value, tiers.arena_mut(Tier::Query), None).unwrap()
    }

    fn rebind(tiers: &mut Tiers, param: &mut Parameter, value: BindValue<'_>) {
        let staged = Staged::new(value, tiers.arena_mut(Tier::Query), param.buffer()).unwrap();
        param.apply(&staged);
    }

    #[test]
    fn test_name_matches_case_insensitively() {
        let (tiers, param) = setup("Prj_Id");
        assert!(param.matches(&tiers, "prj_id"));
        assert!(param.matches(&tiers, "PRJ_ID"));
        assert!(!param.matches(&tiers, "prj"));
    }

    #[test]
    fn test_unbound_parameter() {
        let (tiers, param) = setup("x");
        assert!(!param.is_bound());
        assert_eq!(param.value(&tiers), Value::None);
        assert!(param.wire(&tiers).unwrap().is_null());
    }

    #[test]
    fn test_integer_wire() {
        let (mut tiers, mut param) = setup("x");
        let staged = stage(&mut tiers, BindValue::Unsigned(u64::MAX));
        param.apply(&staged);
        let bind = param.wire(&tiers).unwrap();
        assert_eq!(bind.buffer_type, FieldType::LongLong);
        assert!(bind.is_unsigned);
        assert_eq!(bind.data, ParamData::Integer(-1));
        assert_eq!(param.length(), 8);
    }

    #[test]
    fn test_string_is_copied_without_nul() {
        let (mut tiers, mut param) = setup("x");
        let owned = String::from("hello");
        let staged = stage(&mut tiers, BindValue::Str(&owned));
        drop(owned);
        param.apply(&staged);
        let bind = param.wire(&tiers).unwrap();
        assert_eq!(bind.buffer_type, FieldType::String);
        assert_eq!(bind.data, ParamData::Bytes(b"hello"));
        assert_eq!(param.value(&tiers).as_str(), Some("hello"));
    }

    #[test]
    fn test_empty_bytes_bind_null() {
        let (mut tiers, mut param) = setup("x");
        let staged = stage(&mut tiers, BindValue::Bytes(&[]));
        param.apply(&staged);
        assert!(param.is_null());
        assert_eq!(param.kind(), Kind::NULL);
        assert_eq!(param.wire(&tiers).unwrap().buffer_type, FieldType::Null);
    }

    #[test]
    fn test_stream_is_long_data() {
        let (mut tiers, mut param) = setup("x");
        let source = crate::value::data_callback(|_: &mut [u8]| 0);
        let staged = stage(&mut tiers, BindValue::StreamBytes(source));
        param.apply(&staged);
        assert!(param.stream().is_some());
        assert!(param.kind().is_streaming());
        let bind = param.wire(&tiers).unwrap();
        assert_eq!(bind.buffer_type, FieldType::Blob);
        assert_eq!(bind.data, ParamData::LongData);
        assert_eq!(param.value(&tiers), Value::DataCallback(Kind::BYTES));
    }

    #[test]
    fn test_rebind_overwrites() {
        let (mut tiers, mut param) = setup("x");
        let first = stage(&mut tiers, BindValue::Null);
        param.apply(&first);
        let second = stage(&mut tiers, BindValue::Float(2.5));
        param.apply(&second);
        assert!(!param.is_null());
        assert_eq!(param.value(&tiers), Value::Float(2.5));
    }

    #[test]
    fn test_rebind_reuses_value_block() {
        let (mut tiers, mut param) = setup("x");
        rebind(&mut tiers, &mut param, BindValue::Str("hello"));
        let block = param.buffer();
        assert_eq!(tiers.arena(Tier::Query).len(), 2);

        rebind(&mut tiers, &mut param, BindValue::Str("hi"));
        assert_eq!(param.value(&tiers).as_str(), Some("hi"));
        assert_eq!(param.wire(&tiers).unwrap().data, ParamData::Bytes(b"hi"));

        rebind(&mut tiers, &mut param, BindValue::Integer(3));
        assert_eq!(param.buffer(), block);

        rebind(&mut tiers, &mut param, BindValue::Bytes(b"a longer payload"));
        assert_eq!(param.value(&tiers).as_bytes(), Some(&b"a longer payload"[..]));
        assert_eq!(param.buffer(), block);
        assert_eq!(tiers.arena(Tier::Query).len(), 2);
        // name "x\0" plus the payload
        assert_eq!(tiers.arena(Tier::Query).used(), 2 + 16);
    }
}
