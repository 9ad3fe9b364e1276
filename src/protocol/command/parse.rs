use crate::protocol::{Command, Value};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("wrong number of arguments for '{0}' command")]
    WrongNumberOfArguments(&'static str),

    /// Carries the command name as the client sent it.
    #[error("unknown command '{0}'")]
    Unknown(String),
}

impl From<CommandError> for Value {
    fn from(error: CommandError) -> Self {
        Value::error(&error.to_string())
    }
}

pub fn from_args<'a>(name: &str, args: &'a [Value]) -> Result<Command<'a>, CommandError> {
    match name {
        "PING" => parse_ping(args),
        "ECHO" => parse_echo(args),
        _ => Err(unknown_command(name, args)),
    }
}

fn parse_ping(args: &[Value]) -> Result<Command<'_>, CommandError> {
    match args {
        [] | [_] => Ok(Command::Ping { message: None }),
        [_, message] => Ok(Command::Ping {
            message: Some(message),
        }),
        _ => Err(CommandError::WrongNumberOfArguments("ping")),
    }
}

fn parse_echo(args: &[Value]) -> Result<Command<'_>, CommandError> {
    match args {
        [_, message] => Ok(Command::Echo { message }),
        _ => Err(CommandError::WrongNumberOfArguments("echo")),
    }
}

fn unknown_command(name: &str, args: &[Value]) -> CommandError {
    let sent = args
        .first()
        .and_then(Value::text_bytes)
        .map(|text| String::from_utf8_lossy(&text).into_owned())
        .unwrap_or_else(|| name.to_string());

    // the name ends up inside a single-line error reply
    CommandError::Unknown(sent.replace(['\r', '\n'], " "))
}
