use crate::server::connection::{self, ConnectionClosed, ConnectionError};
use crate::server::ServerOptions;
use std::io;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Accepts connections until `shutdown` fires or accepting fails, serving
/// each one on its own task. Waits for open connections before returning.
pub async fn listen(
    listener: TcpListener,
    options: ServerOptions,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let tracker = TaskTracker::new();
    let mut conn_counter: u64 = 0;
    info!(addr = %listener.local_addr()?, "listening");

    let result = loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer)) => {
                conn_counter += 1;
                info!(connection = conn_counter, %peer, "accepted connection");

                if let Err(err) = socket.set_nodelay(true) {
                    warn!(connection = conn_counter, error = %err, "failed to set TCP_NODELAY");
                }

                let options = options.clone();
                let token = shutdown.clone();
                let span = info_span!("connection", id = conn_counter, %peer);

                tracker.spawn(
                    async move {
                        let result = connection::run(socket, &options, token).await;
                        log_outcome(result);
                    }
                    .instrument(span),
                );
            }
            Err(err) => {
                error!(error = %err, "error accepting new connection; shutting down");
                shutdown.cancel();
                break Err(err);
            }
        }
    };

    tracker.close();
    debug!(open = tracker.len(), "waiting for open connections");
    tracker.wait().await;

    info!("exiting listener");
    result
}

fn log_outcome(result: Result<ConnectionClosed, ConnectionError>) {
    match result {
        Ok(ConnectionClosed::Eof) => debug!("client closed connection"),
        Ok(ConnectionClosed::Cancelled) => debug!("closing connection for shutdown"),
        Ok(ConnectionClosed::IdleTimeout) => info!("closing idle connection"),
        Err(err) => warn!(error = %err, "closing connection"),
    }
}
