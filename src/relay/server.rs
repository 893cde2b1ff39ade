/// Relay server — shared state, accept loop, and shutdown.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::filter::PhraseFilter;
use super::outbound;
use super::registry::Registry;
use super::router::Router;
use super::session::{self, SessionEnd};

/// Shared server state.
#[derive(Debug)]
pub struct ServerState {
    /// Display name used in the connect prompt and logs.
    pub server_name: String,
    /// Routing over the process-wide registry and phrase filter.
    pub router: Router,
    /// Lines a connection may have queued before it is dropped as lagging.
    pub outbound_capacity: usize,
}

impl ServerState {
    pub fn new(server_name: impl Into<String>, filter: PhraseFilter) -> Self {
        Self {
            server_name: server_name.into(),
            router: Router::new(Registry::new(), Arc::new(filter)),
            outbound_capacity: outbound::DEFAULT_CAPACITY,
        }
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    pub fn registry(&self) -> &Registry {
        self.router.registry()
    }
}

/// Shared, thread-safe server state.
pub type SharedState = Arc<ServerState>;

/// How long `run` waits for sessions to finish before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Each connection runs in its own task. On shutdown every session is asked
/// to stop and `run` waits for their teardown. Sessions still running after
/// a grace period are aborted. The registry is cleared last.
pub async fn run<F>(listener: TcpListener, state: SharedState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let token = CancellationToken::new();
    let mut sessions = JoinSet::new();
    tokio::pin!(shutdown);

    if let Ok(addr) = listener.local_addr() {
        info!("{} listening on {addr}", state.server_name);
    }

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),

            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) if is_transient(&e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                    Err(e) => break Err(e),
                };
                info!(%addr, "new connection");
                let state = Arc::clone(&state);
                let token = token.clone();
                sessions.spawn(async move {
                    match session::handle_client(socket, addr, state, token).await {
                        Ok(SessionEnd::Rejected(name)) => info!(%addr, name = %name, "rejected"),
                        Ok(end) => info!(%addr, ?end, "disconnected"),
                        Err(e) => warn!(%addr, "client error: {e}"),
                    }
                });
            }

            // Reap finished sessions so the set does not grow unbounded.
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!("session task panicked: {e}");
                    }
                }
            }
        }
    };

    info!(active = sessions.len(), "shutting down");
    token.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        // Aborting still drops each session's membership.
        warn!(remaining = sessions.len(), "sessions did not stop in time, aborting");
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}
    }

    let leftover = state.registry().clear();
    if leftover > 0 {
        warn!(leftover, "registry still held entries after shutdown");
    }
    info!("server stopped");
    result
}

/// Errors that only affect the one connection being accepted.
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(e.kind(), ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | WouldBlock)
}
