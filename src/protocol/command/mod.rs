mod parse;
mod reader;

use crate::protocol::Value;

pub use parse::CommandError;
pub use reader::{Request, RequestReadError, RequestReader};

/// A parsed command, borrowing its arguments from the request.
#[derive(Clone, Debug, PartialEq)]
pub enum Command<'a> {
    Ping { message: Option<&'a Value> },

    Echo { message: &'a Value },
}

impl<'a> Command<'a> {
    /// Parses `args` for the uppercased command `name`.
    ///
    /// `args` holds the whole request, so `args[0]` is the command name
    /// itself.
    pub fn parse(name: &str, args: &'a [Value]) -> Result<Self, CommandError> {
        parse::from_args(name, args)
    }
}
