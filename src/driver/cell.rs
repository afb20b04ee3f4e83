use crate::value::DateTime;
use crate::wire::{ResultBind, ResultBuffer};

/// One column value of a row held by a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(DateTime),
}

impl Cell {
    fn as_i64(&self) -> i64 {
        match self {
            Cell::Integer(v) => *v,
            Cell::Float(v) => *v as i64,
            Cell::Bool(v) => i64::from(*v),
            Cell::Text(s) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Cell::Integer(v) => *v as f64,
            Cell::Float(v) => *v,
            Cell::Bool(v) => f64::from(u8::from(*v)),
            Cell::Text(s) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        }
    }

    /// Text protocol rendering, used for columns fetched by length.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Cell::Null => Vec::new(),
            Cell::Integer(v) => v.to_string().into_bytes(),
            Cell::Float(v) => v.to_string().into_bytes(),
            Cell::Bool(true) => b"1".to_vec(),
            Cell::Bool(false) => b"0".to_vec(),
            Cell::Text(s) => s.clone().into_bytes(),
            Cell::Bytes(b) => b.clone(),
            Cell::DateTime(dt) => dt.to_string().into_bytes(),
        }
    }

    /// Writes this value into a result buffer the way a row advance does: fixed
    /// buffers receive the value, unbound ones only the length.
    ///
    /// Returns `true` when the value did not fit.
    pub(crate) fn fill(&self, bind: &mut ResultBind) -> bool {
        bind.is_null = matches!(self, Cell::Null);
        bind.error = false;
        if bind.is_null {
            bind.length = 0;
            return false;
        }
        match bind.buffer {
            ResultBuffer::Unbound => {
                bind.length = self.to_bytes().len();
                bind.error = bind.length > 0;
                return bind.error;
            }
            ResultBuffer::Integer(_) => bind.buffer = ResultBuffer::Integer(self.as_i64()),
            ResultBuffer::Float(_) => bind.buffer = ResultBuffer::Float(self.as_f64()),
            ResultBuffer::Bool(_) => bind.buffer = ResultBuffer::Bool(self.as_i64() != 0),
            ResultBuffer::DateTime(_) => match self {
                Cell::DateTime(dt) => bind.buffer = ResultBuffer::DateTime(*dt),
                _ => {
                    bind.error = true;
                    return true;
                }
            },
        }
        bind.length = 8;
        false
    }
}

macro_rules! cell_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Cell {
                fn from(v: $ty) -> Self {
                    Cell::$variant(v.into())
                }
            }
        )*
    };
}

cell_from! {
    i32 => Integer,
    i64 => Integer,
    f64 => Float,
    bool => Bool,
    &str => Text,
    String => Text,
    Vec<u8> => Bytes,
    &[u8] => Bytes,
    DateTime => DateTime,
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_fixed_buffer() {
        let mut bind = ResultBind {
            buffer: ResultBuffer::Float(0.0),
            ..ResultBind::default()
        };
        assert!(!Cell::Integer(3).fill(&mut bind));
        assert_eq!(bind.buffer, ResultBuffer::Float(3.0));
        assert!(!bind.is_null);
    }

    #[test]
    fn test_fill_unbound_reports_length() {
        let mut bind = ResultBind::default();
        assert!(Cell::from("hello").fill(&mut bind));
        assert_eq!(bind.length, 5);
        assert!(bind.error);

        assert!(!Cell::from("").fill(&mut bind));
        assert_eq!(bind.length, 0);
    }

    #[test]
    fn test_fill_null() {
        let mut bind = ResultBind {
            buffer: ResultBuffer::Integer(9),
            ..ResultBind::default()
        };
        Cell::from(None::<i64>).fill(&mut bind);
        assert!(bind.is_null);
        assert_eq!(bind.length, 0);
    }
}
