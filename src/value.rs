//! Value model shared by parameters and result columns.

use std::cell::RefCell;
use std::ffi::CStr;
use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

/// Kind tag of a value. Kinds are bit flags: [`Kind::DATA_CALLBACK`] combines with
/// [`Kind::CSTRING`] or [`Kind::BYTES`] for values streamed through a callback.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Kind(u16);

impl Kind {
    pub const NONE: Kind = Kind(0x0000);
    pub const INTEGER: Kind = Kind(0x0001);
    pub const FLOAT: Kind = Kind(0x0002);
    pub const CSTRING: Kind = Kind(0x0004);
    pub const BYTES: Kind = Kind(0x0008);
    pub const BOOL: Kind = Kind(0x0010);
    pub const NULL: Kind = Kind(0x0020);
    pub const DATETIME: Kind = Kind(0x0040);
    pub const DATA_CALLBACK: Kind = Kind(0x1000);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Kind) -> bool {
        self.0 & other.0 == other.0
    }

    /// The kind without the streaming flag.
    pub const fn base(self) -> Kind {
        Kind(self.0 & !Self::DATA_CALLBACK.0)
    }

    pub const fn is_streaming(self) -> bool {
        self.0 & Self::DATA_CALLBACK.0 != 0
    }

    /// Variable-length kinds are fetched in two passes.
    pub const fn is_variable(self) -> bool {
        self.0 & (Self::CSTRING.0 | Self::BYTES.0) != 0
    }

    pub fn name(self) -> &'static str {
        match self.base() {
            Kind::INTEGER => "integer",
            Kind::FLOAT => "float",
            Kind::CSTRING => "string",
            Kind::BYTES => "bytes",
            Kind::BOOL => "boolean",
            Kind::NULL => "null",
            Kind::DATETIME => "datetime",
            _ => "none",
        }
    }
}

impl BitOr for Kind {
    type Output = Kind;

    fn bitor(self, rhs: Kind) -> Kind {
        Kind(self.0 | rhs.0)
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_streaming() {
            write!(f, "Kind({}|callback)", self.name())
        } else {
            write!(f, "Kind({})", self.name())
        }
    }
}

/// Date and/or time, laid out like the MySQL binary protocol's temporal values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u32,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
    /// Only meaningful for TIME values.
    pub negative: bool,
}

impl DateTime {
    pub fn date(year: u16, month: u8, day: u8) -> Self {
        Self {
            year,
            month,
            day,
            ..Self::default()
        }
    }

    pub fn with_time(self, hour: u32, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
            ..self
        }
    }

    pub fn with_microsecond(self, microsecond: u32) -> Self {
        Self {
            microsecond,
            ..self
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.microsecond > 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        Ok(())
    }
}

/// Pull source for streamed parameters.
///
/// `fill` writes up to `buf.len()` bytes and returns how many it produced; `0` ends
/// the stream. Closures of the same shape implement it.
pub trait LongData {
    fn fill(&mut self, buf: &mut [u8]) -> usize;
}

impl<F> LongData for F
where
    F: FnMut(&mut [u8]) -> usize,
{
    fn fill(&mut self, buf: &mut [u8]) -> usize {
        self(buf)
    }
}

/// Shared handle to a streaming source. Every placeholder bound to the same source
/// drains the same handle.
pub type DataCallback = Rc<RefCell<dyn LongData>>;

/// Wraps a pull closure into a [`DataCallback`]. Other [`LongData`] implementations
/// are wrapped with `Rc::new(RefCell::new(..))`.
pub fn data_callback<F>(source: F) -> DataCallback
where
    F: FnMut(&mut [u8]) -> usize + 'static,
{
    Rc::new(RefCell::new(source))
}

/// A value to bind to a named parameter.
#[derive(Clone)]
pub enum BindValue<'v> {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
    /// Copied into the query arena. An empty string is still a value.
    Str(&'v str),
    /// Copied into the query arena. An empty slice binds NULL.
    Bytes(&'v [u8]),
    DateTime(DateTime),
    Null,
    /// Text sent as long data.
    StreamStr(DataCallback),
    /// Binary data sent as long data.
    StreamBytes(DataCallback),
}

impl BindValue<'_> {
    pub fn kind(&self) -> Kind {
        match self {
            BindValue::Integer(_) | BindValue::Unsigned(_) => Kind::INTEGER,
            BindValue::Float(_) => Kind::FLOAT,
            BindValue::Bool(_) => Kind::BOOL,
            BindValue::Str(_) => Kind::CSTRING,
            BindValue::Bytes(_) => Kind::BYTES,
            BindValue::DateTime(_) => Kind::DATETIME,
            BindValue::Null => Kind::NULL,
            BindValue::StreamStr(_) => Kind::CSTRING | Kind::DATA_CALLBACK,
            BindValue::StreamBytes(_) => Kind::BYTES | Kind::DATA_CALLBACK,
        }
    }
}

impl fmt::Debug for BindValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::Integer(v) => f.debug_tuple("Integer").field(v).finish(),
            BindValue::Unsigned(v) => f.debug_tuple("Unsigned").field(v).finish(),
            BindValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            BindValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            BindValue::Str(v) => f.debug_tuple("Str").field(v).finish(),
            BindValue::Bytes(v) => f.debug_tuple("Bytes").field(v).finish(),
            BindValue::DateTime(v) => f.debug_tuple("DateTime").field(v).finish(),
            BindValue::Null => f.write_str("Null"),
            BindValue::StreamStr(_) => f.write_str("StreamStr(..)"),
            BindValue::StreamBytes(_) => f.write_str("StreamBytes(..)"),
        }
    }
}

macro_rules! bind_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'v> From<$ty> for BindValue<'v> {
                fn from(v: $ty) -> Self {
                    BindValue::$variant(v.into())
                }
            }
        )*
    };
}

bind_value_from! {
    i8 => Integer,
    i16 => Integer,
    i32 => Integer,
    i64 => Integer,
    u8 => Unsigned,
    u16 => Unsigned,
    u32 => Unsigned,
    u64 => Unsigned,
    f32 => Float,
    f64 => Float,
    bool => Bool,
    &'v str => Str,
    &'v [u8] => Bytes,
    DateTime => DateTime,
}

impl<'v> From<&'v String> for BindValue<'v> {
    fn from(v: &'v String) -> Self {
        BindValue::Str(v)
    }
}

impl<'v, T> From<Option<T>> for BindValue<'v>
where
    T: Into<BindValue<'v>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(BindValue::Null, Into::into)
    }
}

/// A value read back from a parameter or a result column. Borrowed data lives in the
/// statement's arenas, so a `Value` cannot outlive the next reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    None,
    Integer(i64),
    Float(f64),
    CString(&'a CStr),
    Bytes(&'a [u8]),
    Bool(bool),
    Null,
    DateTime(DateTime),
    /// A streamed parameter; its payload never sits in memory.
    DataCallback(Kind),
}

impl<'a> Value<'a> {
    pub fn kind(&self) -> Kind {
        match self {
            Value::None => Kind::NONE,
            Value::Integer(_) => Kind::INTEGER,
            Value::Float(_) => Kind::FLOAT,
            Value::CString(_) => Kind::CSTRING,
            Value::Bytes(_) => Kind::BYTES,
            Value::Bool(_) => Kind::BOOL,
            Value::Null => Kind::NULL,
            Value::DateTime(_) => Kind::DATETIME,
            Value::DataCallback(kind) => *kind | Kind::DATA_CALLBACK,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Integer(v) => Some(v),
            Value::Bool(v) => Some(v.into()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v),
            Value::Integer(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            Value::Integer(v) => Some(v != 0),
            _ => None,
        }
    }

    /// Text of a string value. `None` for other kinds and for text that is not UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            Value::CString(s) => s.to_str().ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Value::Bytes(b) => Some(b),
            Value::CString(s) => Some(s.to_bytes()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime> {
        match *self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_flags() {
        let streamed = Kind::CSTRING | Kind::DATA_CALLBACK;
        assert!(streamed.is_streaming());
        assert!(streamed.contains(Kind::CSTRING));
        assert_eq!(streamed.base(), Kind::CSTRING);
        assert_eq!(streamed.bits(), 0x1004);
        assert!(!Kind::INTEGER.is_streaming());
        assert!(Kind::BYTES.is_variable());
        assert!(!Kind::DATETIME.is_variable());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Kind::INTEGER.name(), "integer");
        assert_eq!((Kind::BYTES | Kind::DATA_CALLBACK).name(), "bytes");
        assert_eq!(Kind::NONE.name(), "none");
    }

    #[test]
    fn test_bind_value_conversions() {
        assert!(matches!(BindValue::from(5), BindValue::Integer(5)));
        assert!(matches!(BindValue::from(5u32), BindValue::Unsigned(5)));
        assert!(matches!(BindValue::from("x"), BindValue::Str("x")));
        assert!(matches!(BindValue::from(None::<i64>), BindValue::Null));
        assert!(matches!(BindValue::from(Some(1.5)), BindValue::Float(_)));
        assert_eq!(BindValue::from(true).kind(), Kind::BOOL);
    }

    #[test]
    fn test_closure_is_long_data() {
        let mut left = 3;
        let source = data_callback(move |buf: &mut [u8]| {
            if left == 0 {
                return 0;
            }
            left -= 1;
            buf[0] = b'x';
            1
        });
        let mut buf = [0u8; 4];
        let mut total = 0;
        while source.borrow_mut().fill(&mut buf) > 0 {
            total += 1;
        }
        assert_eq!(total, 3);
    }

    #[test]
    fn test_datetime_display() {
        let dt = DateTime::date(2024, 2, 29).with_time(13, 5, 9);
        assert_eq!(dt.to_string(), "2024-02-29 13:05:09");
        assert_eq!(dt.with_microsecond(42).to_string(), "2024-02-29 13:05:09.000042");
    }

    #[test]
    fn test_value_accessors() {
        let text = CStr::from_bytes_with_nul(b"abc\0").unwrap();
        assert_eq!(Value::CString(text).as_str(), Some("abc"));
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Null.as_i64(), None);
        assert!(Value::Null.is_null());
        assert_eq!(Value::DataCallback(Kind::BYTES).kind().bits(), 0x1008);
    }
}
