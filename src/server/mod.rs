pub mod connection;
pub mod handler;

use crate::protocol::ReadLimits;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 6379;

#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub limits: ReadLimits,

    /// Connections with no request for this long are closed. `None` keeps
    /// idle connections open indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl ServerOptions {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            limits: ReadLimits::default(),
            idle_timeout: None,
        }
    }
}
