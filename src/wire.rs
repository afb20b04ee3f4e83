//! Native wire vocabulary exchanged with a [`NativeStatement`](crate::driver::NativeStatement).

use crate::value::{DateTime, Kind};

/// Character set id MySQL reports for binary strings.
pub const CHARSET_BINARY: u16 = 63;

/// Column flag bits from the column definition packet.
pub mod flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
}

/// MySQL column and buffer type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Decimal = 0,
    Tiny = 1,
    Short = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Null = 6,
    Timestamp = 7,
    LongLong = 8,
    Int24 = 9,
    Date = 10,
    Time = 11,
    DateTime = 12,
    Year = 13,
    NewDate = 14,
    VarChar = 15,
    Bit = 16,
    Timestamp2 = 17,
    DateTime2 = 18,
    Time2 = 19,
    Json = 245,
    NewDecimal = 246,
    Enum = 247,
    Set = 248,
    TinyBlob = 249,
    MediumBlob = 250,
    LongBlob = 251,
    Blob = 252,
    VarString = 253,
    String = 254,
    Geometry = 255,
}

impl FieldType {
    pub fn from_u8(id: u8) -> Option<Self> {
        use FieldType::*;
        Some(match id {
            0 => Decimal,
            1 => Tiny,
            2 => Short,
            3 => Long,
            4 => Float,
            5 => Double,
            6 => Null,
            7 => Timestamp,
            8 => LongLong,
            9 => Int24,
            10 => Date,
            11 => Time,
            12 => DateTime,
            13 => Year,
            14 => NewDate,
            15 => VarChar,
            16 => Bit,
            17 => Timestamp2,
            18 => DateTime2,
            19 => Time2,
            245 => Json,
            246 => NewDecimal,
            247 => Enum,
            248 => Set,
            249 => TinyBlob,
            250 => MediumBlob,
            251 => LongBlob,
            252 => Blob,
            253 => VarString,
            254 => String,
            255 => Geometry,
            _ => return None,
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn is_temporal(self) -> bool {
        use FieldType::*;
        matches!(
            self,
            Timestamp | Date | Time | DateTime | NewDate | Timestamp2 | DateTime2 | Time2
        )
    }

    /// Kind a column of this type is materialized as. `charset` separates binary
    /// strings from text.
    pub fn classify(self, charset: u16) -> Kind {
        use FieldType::*;
        let text_or_bytes = if charset == CHARSET_BINARY {
            Kind::BYTES
        } else {
            Kind::CSTRING
        };
        match self {
            Tiny | Short | Long | LongLong | Int24 | Year | Bit => Kind::INTEGER,
            Float | Double | Decimal | NewDecimal => Kind::FLOAT,
            Timestamp | Date | Time | DateTime | NewDate | Timestamp2 | DateTime2 | Time2 => {
                Kind::DATETIME
            }
            VarChar | VarString | String | TinyBlob | MediumBlob | LongBlob | Blob => text_or_bytes,
            Enum | Set | Json | Geometry => Kind::CSTRING,
            Null => Kind::NULL,
        }
    }

    /// Buffer type requested when fetching a column of this type.
    pub fn fetch_buffer_type(self) -> FieldType {
        match self {
            FieldType::Float => FieldType::Double,
            other => other,
        }
    }
}

/// Column metadata as reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub org_name: String,
    pub table: String,
    pub field_type: FieldType,
    pub charset: u16,
    pub decimals: u8,
    pub flags: u16,
}

impl ColumnDefinition {
    /// A column with no table information and the server's default charset.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            org_name: name.clone(),
            name,
            table: String::new(),
            field_type,
            charset: 45,
            decimals: 0,
            flags: 0,
        }
    }

    pub fn with_charset(mut self, charset: u16) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>, org_name: impl Into<String>) -> Self {
        self.table = table.into();
        self.org_name = org_name.into();
        self
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & flags::UNSIGNED != 0
    }
}

/// Payload of one parameter buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamData<'a> {
    Null,
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bytes(&'a [u8]),
    DateTime(DateTime),
    /// Value was sent beforehand with `send_long_data`.
    LongData,
}

/// One parameter buffer descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamBind<'a> {
    pub buffer_type: FieldType,
    pub is_unsigned: bool,
    pub data: ParamData<'a>,
}

impl ParamBind<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self.data, ParamData::Null)
    }
}

/// Fixed-size result storage written by `fetch`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ResultBuffer {
    /// No storage bound: only the length is reported.
    #[default]
    Unbound,
    Integer(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime),
}

/// One result buffer descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultBind {
    pub buffer_type: Option<FieldType>,
    pub buffer: ResultBuffer,
    /// Full byte length of the column in the current row.
    pub length: usize,
    pub is_null: bool,
    pub is_unsigned: bool,
    /// Set when the value did not fit the bound buffer.
    pub error: bool,
}

/// Outcome of a row advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Row,
    /// Row fetched, but some columns are longer than their bound buffers.
    Truncated,
    NoData,
}

/// Decodes a temporal value in binary protocol layout, length byte included.
pub fn decode_temporal(field_type: FieldType, raw: &[u8]) -> Option<DateTime> {
    let (&len, body) = raw.split_first()?;
    let body = body.get(..len as usize)?;
    let mut dt = DateTime::default();
    match field_type {
        FieldType::Time | FieldType::Time2 => {
            if len == 0 {
                return Some(dt);
            }
            if body.len() < 8 {
                return None;
            }
            dt.negative = body[0] == 1;
            let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
            dt.hour = days * 24 + u32::from(body[5]);
            dt.minute = body[6];
            dt.second = body[7];
            if body.len() >= 12 {
                dt.microsecond = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
            }
        }
        _ => {
            if body.len() >= 4 {
                dt.year = u16::from_le_bytes([body[0], body[1]]);
                dt.month = body[2];
                dt.day = body[3];
            }
            if body.len() >= 7 {
                dt.hour = u32::from(body[4]);
                dt.minute = body[5];
                dt.second = body[6];
            }
            if body.len() >= 11 {
                dt.microsecond = u32::from_le_bytes([body[7], body[8], body[9], body[10]]);
            }
        }
    }
    Some(dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_text_and_binary() {
        assert_eq!(FieldType::VarString.classify(33), Kind::CSTRING);
        assert_eq!(FieldType::VarString.classify(CHARSET_BINARY), Kind::BYTES);
        assert_eq!(FieldType::Blob.classify(CHARSET_BINARY), Kind::BYTES);
        assert_eq!(FieldType::Json.classify(CHARSET_BINARY), Kind::CSTRING);
    }

    #[test]
    fn test_classify_fixed() {
        assert_eq!(FieldType::LongLong.classify(63), Kind::INTEGER);
        assert_eq!(FieldType::Int24.classify(63), Kind::INTEGER);
        assert_eq!(FieldType::NewDecimal.classify(63), Kind::FLOAT);
        assert_eq!(FieldType::Timestamp2.classify(63), Kind::DATETIME);
        assert_eq!(FieldType::Null.classify(63), Kind::NULL);
    }

    #[test]
    fn test_float_is_fetched_as_double() {
        assert_eq!(FieldType::Float.fetch_buffer_type(), FieldType::Double);
        assert_eq!(FieldType::Long.fetch_buffer_type(), FieldType::Long);
    }

    #[test]
    fn test_field_type_ids_round_trip() {
        for id in (0u8..=19).chain(245..=255) {
            assert_eq!(FieldType::from_u8(id).map(FieldType::id), Some(id));
        }
        assert_eq!(FieldType::from_u8(100), None);
    }

    #[test]
    fn test_decode_datetime() {
        let raw = [11, 0xE8, 0x07, 3, 15, 10, 20, 30, 0x40, 0xE2, 0x01, 0x00];
        let dt = decode_temporal(FieldType::DateTime, &raw).unwrap();
        assert_eq!(dt, DateTime::date(2024, 3, 15).with_time(10, 20, 30).with_microsecond(123_456));
    }

    #[test]
    fn test_decode_date_only() {
        let dt = decode_temporal(FieldType::Date, &[4, 0xE8, 0x07, 1, 2]).unwrap();
        assert_eq!(dt, DateTime::date(2024, 1, 2));
    }

    #[test]
    fn test_decode_zero_length() {
        assert_eq!(decode_temporal(FieldType::Timestamp, &[0]), Some(DateTime::default()));
    }

    #[test]
    fn test_decode_negative_time() {
        let raw = [8, 1, 1, 0, 0, 0, 2, 3, 4];
        let dt = decode_temporal(FieldType::Time, &raw).unwrap();
        assert!(dt.negative);
        assert_eq!(dt.hour, 26);
        assert_eq!((dt.minute, dt.second), (3, 4));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode_temporal(FieldType::DateTime, &[7, 1, 2]), None);
        assert_eq!(decode_temporal(FieldType::DateTime, &[]), None);
    }
}
