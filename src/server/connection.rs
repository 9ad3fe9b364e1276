//! The per-connection request loop.
//!
//! Each iteration reads one request, dispatches it and writes the reply.
//! Malformed input is fatal to the connection since the stream position can
//! no longer be trusted; a well-formed value that is not a request is
//! answered with an error reply and the loop carries on.
//!
//! Neither the idle timeout nor shutdown interrupts a request that has
//! started arriving, so a client that stalls mid-request holds its task open
//! and keeps a graceful shutdown waiting until it sends more or disconnects.

use crate::protocol::{
    RequestReadError, RequestReader, ValueReadError, ValueReader, ValueWriter,
};
use crate::server::{handler, ServerOptions};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// How a connection ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionClosed {
    /// The client closed the stream between requests.
    Eof,

    /// Shutdown was signalled while waiting for a request.
    Cancelled,

    /// No request arrived within the idle timeout.
    IdleTimeout,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to read request: {0}")]
    Read(#[source] ValueReadError),

    #[error("failed to write reply: {0}")]
    Write(#[source] io::Error),
}

/// Serves requests on `stream` until it closes, fails or `shutdown` fires.
pub async fn run<S>(
    stream: S,
    options: &ServerOptions,
    shutdown: CancellationToken,
) -> Result<ConnectionClosed, ConnectionError>
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    let reader = ValueReader::with_limits(BufReader::new(read), options.limits);

    let mut connection = Connection {
        reader: RequestReader::new(reader),
        writer: ValueWriter::new(write),
        shutdown,
        idle_timeout: options.idle_timeout,
    };

    connection.serve().await
}

struct Connection<R, W> {
    reader: RequestReader<R>,
    writer: ValueWriter<W>,
    shutdown: CancellationToken,
    idle_timeout: Option<Duration>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn serve(&mut self) -> Result<ConnectionClosed, ConnectionError> {
        loop {
            if let Some(closed) = self.wait_for_request().await? {
                return Ok(closed);
            }

            let reply = match self.reader.read().await {
                Ok(request) => {
                    trace!(command = %request.name, args = request.args.len(), "dispatching");
                    handler::dispatch(&request.name, &request.args)
                }
                Err(RequestReadError::Invalid(reply)) => reply,
                Err(RequestReadError::Read(ValueReadError::EndOfInput)) => {
                    return Ok(ConnectionClosed::Eof)
                }
                Err(RequestReadError::Read(error)) => return Err(ConnectionError::Read(error)),
            };

            trace!(%reply, "writing reply");
            self.writer
                .write(&reply)
                .await
                .map_err(ConnectionError::Write)?;
        }
    }

    /// Blocks until the next request starts arriving. Returns why the
    /// connection should close instead, if it should.
    async fn wait_for_request(&mut self) -> Result<Option<ConnectionClosed>, ConnectionError> {
        let reader = &mut self.reader;
        let idle_timeout = self.idle_timeout;

        let input = async move {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, reader.wait_for_input())
                    .await
                    .ok(),
                None => Some(reader.wait_for_input().await),
            }
        };

        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Ok(Some(ConnectionClosed::Cancelled)),
            input = input => match input {
                None => Ok(Some(ConnectionClosed::IdleTimeout)),
                Some(Ok(true)) => Ok(None),
                Some(Ok(false)) => Ok(Some(ConnectionClosed::Eof)),
                Some(Err(error)) => Err(ConnectionError::Read(error.into())),
            },
        }
    }
}
