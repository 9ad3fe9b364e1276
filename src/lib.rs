//! A server for the Redis serialization protocol (RESP).
//!
//! Requests are decoded from each connection by [`protocol::ValueReader`],
//! dispatched by [`server::handler::dispatch`] and the replies encoded back
//! with [`protocol::ValueWriter`]. [`listener::listen`] runs one task per
//! accepted TCP connection.

pub mod listener;
pub mod protocol;
pub mod server;
