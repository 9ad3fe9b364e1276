use anyhow::Context;
use clap::Parser;
use resp_server::listener;
use resp_server::protocol::{
    ReadLimits, DEFAULT_MAX_ARRAY_LEN, DEFAULT_MAX_BULK_LEN, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_LINE_LEN,
};
use resp_server::server::{ServerOptions, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// A server speaking the Redis serialization protocol.
#[derive(Parser, Debug)]
#[command(name = "resp-server", version)]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to start the server on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum array nesting depth accepted in a request
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Maximum bulk string length in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BULK_LEN)]
    max_bulk_len: usize,

    /// Maximum number of elements in one array
    #[arg(long, default_value_t = DEFAULT_MAX_ARRAY_LEN)]
    max_array_len: usize,

    /// Maximum length of a simple string, error or length line
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LEN)]
    max_line_len: usize,

    /// Close connections that send nothing for this many seconds
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

impl From<Args> for ServerOptions {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            limits: ReadLimits {
                max_depth: args.max_depth,
                max_bulk_len: args.max_bulk_len,
                max_array_len: args.max_array_len,
                max_line_len: args.max_line_len,
            },
            idle_timeout: args.idle_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let options = ServerOptions::from(Args::parse());
    let addr = options.addr();

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to listen on {}", addr))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    listener::listen(listener, options, shutdown)
        .await
        .context("failed to accept connection")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received Ctrl-C; shutting down");
            shutdown.cancel();
        }
        Err(err) => error!(error = %err, "failed to listen for Ctrl-C"),
    }
}
