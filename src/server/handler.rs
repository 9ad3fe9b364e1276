use crate::protocol::{Command, Value};
use tracing::debug;

/// Executes the command `name` (already uppercased) and returns its reply.
///
/// `args` is the whole request, command name included. Argument and lookup
/// failures come back as error replies.
pub fn dispatch(name: &str, args: &[Value]) -> Value {
    match Command::parse(name, args) {
        Ok(command) => handle(command),
        Err(error) => {
            debug!(command = name, %error, "rejected command");
            error.into()
        }
    }
}

fn handle(command: Command<'_>) -> Value {
    match command {
        Command::Ping { message } => ping(message),
        Command::Echo { message } => echo(message),
    }
}

fn ping(message: Option<&Value>) -> Value {
    match message {
        None => Value::simple_string("PONG"),
        Some(message) => bulk_reply(message),
    }
}

fn echo(message: &Value) -> Value {
    bulk_reply(message)
}

// an argument without text (null or array) echoes back as a null bulk string
fn bulk_reply(value: &Value) -> Value {
    match value.text_bytes() {
        Some(text) => Value::bulk_string_from_bytes(text.into_owned()),
        None => Value::NullBulkString,
    }
}
