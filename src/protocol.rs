//! The RESP wire protocol: the value model, its codec and request parsing.

mod command;
mod value;

pub use command::*;
pub use value::*;
