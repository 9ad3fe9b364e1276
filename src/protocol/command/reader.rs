use crate::protocol::{Value, ValueReadError, ValueReader};
use std::io;
use tokio::io::AsyncBufRead;

/// A request that passed shape validation.
#[derive(Debug, PartialEq)]
pub struct Request {
    /// Element 0 of the request, uppercased.
    pub name: String,

    /// Every element of the request, the command name included.
    pub args: Vec<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestReadError {
    /// The value was read in full but is not a usable request; the
    /// connection can carry on after sending the reply.
    #[error("invalid request")]
    Invalid(Value),

    #[error(transparent)]
    Read(#[from] ValueReadError),
}

pub struct RequestReader<R> {
    reader: ValueReader<R>,
}

impl<R> RequestReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: ValueReader<R>) -> Self {
        Self { reader }
    }

    pub async fn wait_for_input(&mut self) -> io::Result<bool> {
        self.reader.wait_for_input().await
    }

    pub async fn read(&mut self) -> Result<Request, RequestReadError> {
        let value = self.reader.read().await?;
        parse_request(value)
    }
}

fn parse_request(value: Value) -> Result<Request, RequestReadError> {
    match value.into_array() {
        Some(args) if !args.is_empty() => {
            let name = args[0]
                .text_bytes()
                .map(|text| String::from_utf8_lossy(&text).to_uppercase())
                .unwrap_or_default();

            Ok(Request { name, args })
        }
        _ => Err(RequestReadError::Invalid(Value::error(
            "expected array value",
        ))),
    }
}
