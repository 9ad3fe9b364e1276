mod reader;
mod writer;

pub use reader::*;
pub use writer::*;

use std::borrow::Cow;
use std::fmt::{Display, Formatter};

/// A single RESP value.
///
/// Null bulk strings and null arrays are their own variants, so a null value
/// never carries a payload and an empty payload is never null.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    SimpleString(String),

    SimpleError(String),

    Integer(i64),

    BulkString(Vec<u8>),

    Array(Vec<Value>),

    NullBulkString,

    NullArray,
}

impl Value {
    pub fn simple_string(value: &str) -> Self {
        Self::SimpleString(value.to_string())
    }

    pub fn simple_error(value: &str) -> Self {
        Self::SimpleError(value.to_string())
    }

    /// An error reply carrying the generic `ERR` prefix.
    pub fn error(message: &str) -> Self {
        Self::SimpleError(format!("ERR {}", message))
    }

    pub fn integer(value: i64) -> Self {
        Self::Integer(value)
    }

    pub fn bulk_string_from_bytes(value: Vec<u8>) -> Self {
        Self::BulkString(value)
    }

    /// An empty `value` gives an empty bulk string, not a null one.
    pub fn bulk_string(value: &str) -> Self {
        Self::bulk_string_from_bytes(value.as_bytes().to_vec())
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::Array(values)
    }

    pub fn command_str(command: &str, args: &[&str]) -> Self {
        let mut array = Vec::with_capacity(args.len() + 1);
        array.push(Self::bulk_string(command));

        for arg in args {
            array.push(Self::bulk_string(arg));
        }

        Self::Array(array)
    }

    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::NullBulkString | Self::NullArray)
    }

    /// Textual payload of the value, as used when the value is a command
    /// name or argument. Integers give their decimal form; nulls and arrays
    /// have no text.
    pub fn text_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Self::SimpleString(text) | Self::SimpleError(text) => {
                Some(Cow::Borrowed(text.as_bytes()))
            }
            Self::BulkString(bytes) => Some(Cow::Borrowed(bytes.as_slice())),
            Self::Integer(value) => Some(Cow::Owned(value.to_string().into_bytes())),
            Self::Array(_) | Self::NullBulkString | Self::NullArray => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::SimpleString(value) => write!(f, "{}", value),
            Value::SimpleError(value) => write!(f, "(error) {}", value),
            Value::Integer(value) => write!(f, "(integer) {}", value),
            Value::BulkString(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Value::Array(values) => {
                let value = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");

                write!(f, "[{}]", value)
            }
            Value::NullBulkString | Value::NullArray => write!(f, "(nil)"),
        }
    }
}
