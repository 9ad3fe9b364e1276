use crate::protocol::Value;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const CRLF: &[u8] = b"\r\n";

/// Appends the wire encoding of `value` to `buffer`.
pub fn encode(value: &Value, buffer: &mut BytesMut) {
    match value {
        Value::SimpleString(val) => encode_line(buffer, b'+', val.as_bytes()),
        Value::SimpleError(val) => encode_line(buffer, b'-', val.as_bytes()),
        Value::Integer(val) => encode_line(buffer, b':', val.to_string().as_bytes()),
        Value::BulkString(bytes) => {
            encode_line(buffer, b'$', bytes.len().to_string().as_bytes());
            buffer.put_slice(bytes);
            buffer.put_slice(CRLF);
        }
        Value::Array(values) => {
            encode_line(buffer, b'*', values.len().to_string().as_bytes());

            for value in values {
                encode(value, buffer);
            }
        }
        Value::NullBulkString => buffer.put_slice(b"$-1\r\n"),
        Value::NullArray => buffer.put_slice(b"*-1\r\n"),
    }
}

fn encode_line(buffer: &mut BytesMut, prefix: u8, line: &[u8]) {
    buffer.reserve(line.len() + 3);
    buffer.put_u8(prefix);
    buffer.put_slice(line);
    buffer.put_slice(CRLF);
}

impl Value {
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::new();
        encode(self, &mut buffer);
        buffer.freeze()
    }
}

/// Writes whole encoded values to an async sink.
pub struct ValueWriter<W> {
    writer: W,
    buffer: BytesMut,
}

impl<W> ValueWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: BytesMut::new(),
        }
    }

    /// Encodes `value` in full before writing, then flushes.
    pub async fn write(&mut self, value: &Value) -> io::Result<()> {
        self.buffer.clear();
        encode(value, &mut self.buffer);

        self.writer.write_all(&self.buffer).await?;
        self.writer.flush().await
    }
}
