use crate::protocol::Value;
use std::fmt::{Display, Formatter};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Default maximum number of nested arrays in one value.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Default maximum bulk string payload, the protocol's conventional 512 MiB ceiling.
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Default maximum declared element count of a single array.
pub const DEFAULT_MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Default maximum length of a simple line, excluding the terminator.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

// upper bound on capacity reserved up front from an untrusted length
const INITIAL_CAPACITY: usize = 1024;

/// Resource limits applied while decoding untrusted input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadLimits {
    pub max_depth: usize,
    pub max_bulk_len: usize,
    pub max_array_len: usize,
    pub max_line_len: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_array_len: DEFAULT_MAX_ARRAY_LEN,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// The part of a value being decoded when an error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    SimpleString,
    SimpleError,
    Integer,
    BulkLength,
    BulkTerminator,
    ArrayLength,
    ArrayElement,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::SimpleString => "simple string",
            Stage::SimpleError => "simple error",
            Stage::Integer => "integer",
            Stage::BulkLength => "bulk string length",
            Stage::BulkTerminator => "bulk string terminator",
            Stage::ArrayLength => "array length",
            Stage::ArrayElement => "array element",
        };

        f.write_str(name)
    }
}

/// A possible error reading a RESP value.
///
/// This is the error type for the [`read`] method on [`ValueReader`]. Apart
/// from [`EndOfInput`](ValueReadError::EndOfInput) and
/// [`Io`](ValueReadError::Io), every variant is a framing error: the stream
/// position can no longer be trusted.
///
/// [`read`]: ValueReader::read
#[derive(Debug, thiserror::Error)]
pub enum ValueReadError {
    /// EOF reached when _starting_ to read a RESP value
    #[error("EOF reached; no value to read")]
    EndOfInput,

    /// The leading byte is not one of the known type tags
    #[error("unknown RESP type: {0:?}")]
    UnknownType(char),

    /// EOF reached in the middle of a value
    #[error("{stage}: input ended before the value was complete")]
    Truncated { stage: Stage },

    /// A line ended in `\n` without the preceding `\r`
    #[error("{stage}: line not terminated by \\r\\n")]
    MissingCarriageReturn { stage: Stage },

    #[error("{stage}: line exceeds {max} bytes")]
    LineTooLong { stage: Stage, max: usize },

    #[error("{stage}: invalid integer {:?}", String::from_utf8_lossy(.data))]
    InvalidInteger { stage: Stage, data: Vec<u8> },

    /// A negative length other than -1
    #[error("{stage}: invalid length {length}")]
    InvalidLength { stage: Stage, length: i64 },

    #[error("{stage}: length {length} exceeds limit of {max}")]
    LengthTooLarge { stage: Stage, length: i64, max: usize },

    #[error("bulk string payload too short: expected {expected} bytes, got {actual}")]
    ShortPayload { expected: usize, actual: usize },

    #[error("bulk string not terminated by \\r\\n, found {:?}", String::from_utf8_lossy(.found))]
    BadTerminator { found: Vec<u8> },

    #[error("array nesting exceeds maximum depth of {max}")]
    TooDeep { max: usize },

    #[error("{stage}: invalid UTF-8")]
    InvalidUtf8 { stage: Stage },

    /// An unexpected I/O error ocurred while reading data
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ValueReadError {
    pub fn is_framing(&self) -> bool {
        !matches!(self, Self::EndOfInput | Self::Io(_))
    }
}

/// Decodes RESP values from a buffered byte stream, one at a time.
///
/// Each call to [`read`](ValueReader::read) consumes exactly one value and
/// leaves the stream positioned right after its terminator.
pub struct ValueReader<R> {
    reader: R,
    limits: ReadLimits,
}

impl<R> ValueReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, ReadLimits::default())
    }

    pub fn with_limits(reader: R, limits: ReadLimits) -> Self {
        Self { reader, limits }
    }

    /// Waits until input is buffered, returning `false` on EOF.
    ///
    /// Nothing is consumed, so the returned future can be dropped at any
    /// point without losing data.
    pub async fn wait_for_input(&mut self) -> io::Result<bool> {
        let buffered = self.reader.fill_buf().await?;
        Ok(!buffered.is_empty())
    }

    pub async fn read(&mut self) -> Result<Value, ValueReadError> {
        self.read_nested(0).await
    }

    async fn read_nested(&mut self, depth: usize) -> Result<Value, ValueReadError> {
        let prefix = self.read_prefix().await?;

        match prefix {
            b'+' => self.read_simple_string().await,
            b'-' => self.read_simple_error().await,
            b':' => self.read_integer().await,
            b'$' => self.read_bulk_string().await,
            b'*' => self.read_array(depth + 1).await,
            other => Err(ValueReadError::UnknownType(other.into())),
        }
    }

    async fn read_prefix(&mut self) -> Result<u8, ValueReadError> {
        self.reader
            .read_u8()
            .await
            .map_err(|error| match error.kind() {
                io::ErrorKind::UnexpectedEof => ValueReadError::EndOfInput,
                _ => ValueReadError::Io(error),
            })
    }

    async fn read_simple_string(&mut self) -> Result<Value, ValueReadError> {
        let value = self.read_line(Stage::SimpleString).await?;
        Ok(Value::SimpleString(value))
    }

    async fn read_simple_error(&mut self) -> Result<Value, ValueReadError> {
        let value = self.read_line(Stage::SimpleError).await?;
        Ok(Value::SimpleError(value))
    }

    async fn read_integer(&mut self) -> Result<Value, ValueReadError> {
        let value = self.read_number(Stage::Integer).await?;
        Ok(Value::Integer(value))
    }

    async fn read_bulk_string(&mut self) -> Result<Value, ValueReadError> {
        let max = self.limits.max_bulk_len;
        let Some(length) = self.read_length(Stage::BulkLength, max).await? else {
            return Ok(Value::NullBulkString);
        };

        // grows with the bytes actually received rather than the declared length
        let mut data = Vec::with_capacity(length.min(INITIAL_CAPACITY));
        let actual = (&mut self.reader)
            .take(length as u64)
            .read_to_end(&mut data)
            .await?;

        if actual < length {
            return Err(ValueReadError::ShortPayload {
                expected: length,
                actual,
            });
        }

        let mut terminator = Vec::with_capacity(2);
        (&mut self.reader)
            .take(2)
            .read_to_end(&mut terminator)
            .await?;

        if terminator.len() < 2 && b"\r\n".starts_with(&terminator) {
            return Err(ValueReadError::Truncated {
                stage: Stage::BulkTerminator,
            });
        }

        if terminator != b"\r\n" {
            return Err(ValueReadError::BadTerminator { found: terminator });
        }

        Ok(Value::BulkString(data))
    }

    async fn read_array(&mut self, depth: usize) -> Result<Value, ValueReadError> {
        if depth > self.limits.max_depth {
            return Err(ValueReadError::TooDeep {
                max: self.limits.max_depth,
            });
        }

        let max = self.limits.max_array_len;
        let Some(length) = self.read_length(Stage::ArrayLength, max).await? else {
            return Ok(Value::NullArray);
        };

        let mut values = Vec::with_capacity(length.min(INITIAL_CAPACITY));

        for _ in 0..length {
            // pin is required to add indirection to a recursive call
            let value = Box::pin(self.read_nested(depth))
                .await
                .map_err(|error| match error {
                    ValueReadError::EndOfInput => ValueReadError::Truncated {
                        stage: Stage::ArrayElement,
                    },
                    error => error,
                })?;

            values.push(value);
        }

        Ok(Value::Array(values))
    }

    async fn read_line_bytes(&mut self, stage: Stage) -> Result<Vec<u8>, ValueReadError> {
        let limit = self.limits.max_line_len as u64 + 2;
        let mut line = Vec::new();

        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await?;

        if line.last() != Some(&b'\n') {
            return if bytes_read as u64 == limit {
                Err(ValueReadError::LineTooLong {
                    stage,
                    max: self.limits.max_line_len,
                })
            } else {
                Err(ValueReadError::Truncated { stage })
            };
        }

        if line.len() < 2 || line[line.len() - 2] != b'\r' {
            return Err(ValueReadError::MissingCarriageReturn { stage });
        }

        line.truncate(line.len() - 2);
        Ok(line)
    }

    async fn read_line(&mut self, stage: Stage) -> Result<String, ValueReadError> {
        let bytes = self.read_line_bytes(stage).await?;
        String::from_utf8(bytes).map_err(|_| ValueReadError::InvalidUtf8 { stage })
    }

    async fn read_number(&mut self, stage: Stage) -> Result<i64, ValueReadError> {
        let line = self.read_line_bytes(stage).await?;

        std::str::from_utf8(&line)
            .ok()
            .and_then(|text| text.parse::<i64>().ok())
            .ok_or(ValueReadError::InvalidInteger { stage, data: line })
    }

    /// Reads a length line; `None` stands for the null length `-1`.
    async fn read_length(
        &mut self,
        stage: Stage,
        max: usize,
    ) -> Result<Option<usize>, ValueReadError> {
        let length = self.read_number(stage).await?;

        match length {
            -1 => Ok(None),
            length if length < 0 => Err(ValueReadError::InvalidLength { stage, length }),
            length => usize::try_from(length)
                .ok()
                .filter(|length| *length <= max)
                .map(Some)
                .ok_or(ValueReadError::LengthTooLarge { stage, length, max }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn read_line_two_lines() {
        let reader = BufReader::new("ONE\r\nTWO\r\n".as_bytes());
        let mut parser = ValueReader::new(reader);

        let one = parser.read_line_bytes(Stage::SimpleString).await.unwrap();
        assert_eq!(one, "ONE".as_bytes());

        let two = parser.read_line_bytes(Stage::SimpleString).await.unwrap();
        assert_eq!(two, "TWO".as_bytes());
    }

    #[tokio::test]
    async fn read_line_crlf_in_boundary() {
        let reader = AsyncReadExt::chain("+OK\r".as_bytes(), "\n+AGAIN\r\n".as_bytes());
        let reader = BufReader::new(reader);
        let mut parser = ValueReader::new(reader);

        assert_eq!(parser.read().await.unwrap(), Value::simple_string("OK"));
        assert_eq!(parser.read().await.unwrap(), Value::simple_string("AGAIN"));
    }

    #[tokio::test]
    async fn read_simple_string() {
        match read_value("+OK\r\n").await {
            Ok(Value::SimpleString(val)) => assert_eq!(val, "OK"),
            val => panic!("expected simple string, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_simple_error() {
        match read_value("-ERR invalid command\r\n").await {
            Ok(Value::SimpleError(val)) => assert_eq!(val, "ERR invalid command"),
            val => panic!("expected simple error, got {:?}", val),
        }
    }

    #[rstest]
    #[case(":123\r\n", 123)]
    #[case(":+1\r\n", 1)]
    #[case(":-1\r\n", -1)]
    #[case(":9223372036854775807\r\n", i64::MAX)]
    #[case(":-9223372036854775808\r\n", i64::MIN)]
    #[tokio::test]
    async fn read_integer_valid(#[case] input: &str, #[case] expected: i64) {
        match read_value(input).await {
            Ok(Value::Integer(val)) => assert_eq!(val, expected),
            val => panic!("expected Integer({}), got {:?}", expected, val),
        }
    }

    #[tokio::test]
    async fn read_integer_out_of_range() {
        match read_value(":9223372036854775808\r\n").await {
            Err(ValueReadError::InvalidInteger { stage, .. }) => assert_eq!(stage, Stage::Integer),
            val => panic!("expected invalid integer, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_bulk_string_valid() {
        match read_value("$5\r\nhello\r\n").await {
            Ok(Value::BulkString(val)) => assert_eq!(val, "hello".as_bytes()),
            val => panic!("expected BulkString(hello), got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_bulk_string_binary_payload() {
        match read_value("$6\r\na\r\nb\nc\r\n").await {
            Ok(Value::BulkString(val)) => assert_eq!(val, "a\r\nb\nc".as_bytes()),
            val => panic!("expected binary bulk string, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_empty_bulk_string() {
        match read_value("$0\r\n\r\n").await {
            Ok(Value::BulkString(val)) => assert!(val.is_empty()),
            val => panic!("expected empty bulk string, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_null_bulk_string() {
        match read_value("$-1\r\n").await {
            Ok(Value::NullBulkString) => {}
            val => panic!("expected NullBulkString, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_array_valid() {
        match read_value("*1\r\n:123\r\n").await {
            Ok(Value::Array(values)) => assert_eq!(values, vec![Value::Integer(123)]),
            val => panic!("expected array, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_nested_array() {
        let value = read_value("*2\r\n:1\r\n*1\r\n:2\r\n").await.unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Integer(1),
                Value::Array(vec![Value::Integer(2)]),
            ])
        );
    }

    #[tokio::test]
    async fn read_empty_array() {
        match read_value("*0\r\n").await {
            Ok(Value::Array(values)) => assert!(values.is_empty()),
            val => panic!("expected empty array, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_null_array() {
        match read_value("*-1\r\n").await {
            Ok(Value::NullArray) => {}
            val => panic!("expected null array, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_empty() {
        match read_value("").await {
            Err(ValueReadError::EndOfInput) => {}
            val => panic!("expected end of input, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_invalid() {
        match read_value("x").await {
            Err(error @ ValueReadError::UnknownType('x')) => {
                assert_eq!(error.to_string(), "unknown RESP type: 'x'")
            }
            val => panic!("expected unknown type, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_leaves_following_value_unread() {
        let reader = BufReader::new("$5\r\nhello\r\n:7\r\n".as_bytes());
        let mut parser = ValueReader::new(reader);

        assert_eq!(parser.read().await.unwrap(), Value::bulk_string("hello"));
        assert_eq!(parser.read().await.unwrap(), Value::integer(7));

        match parser.read().await {
            Err(ValueReadError::EndOfInput) => {}
            val => panic!("expected end of input, got {:?}", val),
        }
    }

    #[rstest]
    #[case::line_unterminated("*invalid", "truncated")]
    #[case::line_without_cr("*invalid\n", "missing cr")]
    #[case::array_length_not_numeric("*x\r\n", "invalid integer")]
    #[case::array_length_not_numeric_crlf("*invalid\r\n", "invalid integer")]
    #[case::array_element_invalid("*1\r\n:x", "truncated")]
    #[case::array_element_missing("*2\r\n:1\r\n", "truncated")]
    #[case::bulk_length_not_numeric("$x\r\nhello\r\n", "invalid integer")]
    #[case::bulk_length_negative("$-2\r\n", "invalid length")]
    #[case::array_length_negative("*-5\r\n", "invalid length")]
    #[case::bulk_payload_short("$5\r\n\r\n", "short payload")]
    #[case::bulk_not_terminated("$5\r\nhell\r\n", "bad terminator")]
    #[case::bulk_wrong_terminator("$2\r\nOKxx", "bad terminator")]
    #[case::bulk_ends_before_terminator("$2\r\nOK", "truncated")]
    #[case::bulk_ends_inside_terminator("$2\r\nOK\r", "truncated")]
    #[case::integer_not_numeric(":x\r\n", "invalid integer")]
    #[tokio::test]
    async fn read_malformed(#[case] input: &str, #[case] kind: &str) {
        let error = read_value(input).await.unwrap_err();
        assert!(error.is_framing(), "expected framing error, got {:?}", error);

        let matched = match kind {
            "truncated" => matches!(error, ValueReadError::Truncated { .. }),
            "missing cr" => matches!(error, ValueReadError::MissingCarriageReturn { .. }),
            "invalid integer" => matches!(error, ValueReadError::InvalidInteger { .. }),
            "invalid length" => matches!(error, ValueReadError::InvalidLength { .. }),
            "short payload" => matches!(
                error,
                ValueReadError::ShortPayload {
                    expected: 5,
                    actual: 2
                }
            ),
            "bad terminator" => matches!(error, ValueReadError::BadTerminator { .. }),
            other => panic!("unknown error kind {}", other),
        };

        assert!(matched, "expected {}, got {:?}", kind, error);
    }

    #[tokio::test]
    async fn read_error_names_stage() {
        match read_value("*1\r\n$x\r\n").await {
            Err(error @ ValueReadError::InvalidInteger { .. }) => {
                assert_eq!(
                    error.to_string(),
                    "bulk string length: invalid integer \"x\""
                )
            }
            val => panic!("expected invalid integer, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_depth_limit() {
        let limits = ReadLimits {
            max_depth: 2,
            ..ReadLimits::default()
        };

        let nested = read_with_limits("*1\r\n*1\r\n:1\r\n", limits).await.unwrap();
        assert_eq!(
            nested,
            Value::array(vec![Value::array(vec![Value::integer(1)])])
        );

        match read_with_limits("*1\r\n*1\r\n*1\r\n:1\r\n", limits).await {
            Err(ValueReadError::TooDeep { max: 2 }) => {}
            val => panic!("expected too deep, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_length_limits() {
        let limits = ReadLimits {
            max_bulk_len: 4,
            max_array_len: 1,
            ..ReadLimits::default()
        };

        match read_with_limits("$5\r\nhello\r\n", limits).await {
            Err(ValueReadError::LengthTooLarge {
                stage: Stage::BulkLength,
                length: 5,
                max: 4,
            }) => {}
            val => panic!("expected bulk length too large, got {:?}", val),
        }

        match read_with_limits("*2\r\n:1\r\n:2\r\n", limits).await {
            Err(ValueReadError::LengthTooLarge {
                stage: Stage::ArrayLength,
                ..
            }) => {}
            val => panic!("expected array length too large, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_huge_declared_length_fails_without_allocating() {
        match read_value("$536870912\r\nabc").await {
            Err(ValueReadError::ShortPayload {
                expected: 536870912,
                actual: 3,
            }) => {}
            val => panic!("expected short payload, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_line_limit() {
        let limits = ReadLimits {
            max_line_len: 4,
            ..ReadLimits::default()
        };

        assert_eq!(
            read_with_limits("+abcd\r\n", limits).await.unwrap(),
            Value::simple_string("abcd")
        );

        match read_with_limits("+abcdefgh\r\n", limits).await {
            Err(ValueReadError::LineTooLong { max: 4, .. }) => {}
            val => panic!("expected line too long, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn read_simple_string_invalid_utf8() {
        let bytes: &[u8] = b"+\xff\xfe\r\n";
        let mut parser = ValueReader::new(BufReader::new(bytes));

        match parser.read().await {
            Err(ValueReadError::InvalidUtf8 {
                stage: Stage::SimpleString,
            }) => {}
            val => panic!("expected invalid UTF-8, got {:?}", val),
        }
    }

    #[tokio::test]
    async fn wait_for_input_does_not_consume() {
        let reader = BufReader::new("+OK\r\n".as_bytes());
        let mut parser = ValueReader::new(reader);

        assert!(parser.wait_for_input().await.unwrap());
        assert_eq!(parser.read().await.unwrap(), Value::ok());
        assert!(!parser.wait_for_input().await.unwrap());
    }

    async fn read_value(buffer: &str) -> Result<Value, ValueReadError> {
        read_with_limits(buffer, ReadLimits::default()).await
    }

    async fn read_with_limits(buffer: &str, limits: ReadLimits) -> Result<Value, ValueReadError> {
        let bytes = buffer.as_bytes();
        let reader = BufReader::new(bytes);
        let mut parser = ValueReader::with_limits(reader, limits);
        parser.read().await
    }
}
