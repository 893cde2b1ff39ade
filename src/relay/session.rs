/// Per-connection session: name prompt → registration → message loop → teardown.
///
/// The session task is the only writer on its socket. Lines from other
/// sessions arrive through the connection's outbound queue and are drained
/// in the same `select!` loop that reads client input. Registry membership
/// lives in a [`Membership`] guard, so unregistering and the leave notice
/// happen exactly once on every exit path, including task abort.
///
/// Socket writes race the shutdown token and the queue's overflow flag, so a
/// peer that stops reading can stall neither shutdown nor its own removal.
use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{CodecError, LineCodec};
use super::command::Command;
use super::notice;
use super::outbound::{Outbound, OutboundRx};
use super::registry::{ClientHandle, ConnectionId, NameTaken};
use super::router::Router;
use super::server::SharedState;

/// How long teardown may spend writing lines still queued for the peer.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport failure that ended a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] CodecError),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent `exit`.
    Exit,
    /// Peer closed the stream.
    Disconnected,
    /// Requested name was already registered.
    Rejected(String),
    /// Server is stopping.
    Shutdown,
    /// Peer stopped reading and its outbound queue overflowed.
    Lagged,
}

/// Registry membership for an active session. Dropping it leaves the chat.
///
/// No leave notice goes out once the server is shutting down: everyone is
/// leaving, and the shutdown notice must stay the last line each peer sees.
struct Membership {
    router: Router,
    handle: ClientHandle,
    shutdown: CancellationToken,
}

impl Membership {
    fn join(router: &Router, handle: ClientHandle, shutdown: &CancellationToken) -> Result<Self, NameTaken> {
        router.registry().register(handle.clone())?;
        router.announce(&notice::joined(&handle.name), Some(handle.id));
        Ok(Self {
            router: router.clone(),
            handle,
            shutdown: shutdown.clone(),
        })
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        let Self { router, handle, shutdown } = self;
        if router.registry().unregister(&handle.name, handle.id) {
            if !shutdown.is_cancelled() {
                router.announce(&notice::left(&handle.name), Some(handle.id));
            }
            info!(name = %handle.name, addr = %handle.addr, "left the chat");
        }
    }
}

/// Control flow after handling one client line.
enum Flow {
    Continue,
    Close,
}

/// Name to register: the trimmed request, or `Client-<port>` when blank.
pub fn resolve_name(requested: &str, addr: SocketAddr) -> String {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        format!("Client-{}", addr.port())
    } else {
        trimmed.to_owned()
    }
}

/// Drive one client connection to completion.
pub async fn handle_client<S>(
    socket: S,
    addr: SocketAddr,
    state: SharedState,
    shutdown: CancellationToken,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LineCodec);
    framed.send(notice::prompt(&state.server_name)).await?;

    // Awaiting name.
    let requested = tokio::select! {
        frame = framed.next() => match frame {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(e.into()),
            None => {
                debug!(%addr, "closed before choosing a name");
                return Ok(SessionEnd::Disconnected);
            }
        },
        _ = shutdown.cancelled() => {
            let _ = tokio::time::timeout(FLUSH_TIMEOUT, framed.send(notice::SHUTTING_DOWN)).await;
            return Ok(SessionEnd::Shutdown);
        }
    };

    let name = resolve_name(&requested, addr);
    let (outbound, mut rx) = Outbound::with_capacity(state.outbound_capacity);
    let handle = ClientHandle::new(ConnectionId::next(), name, addr, outbound);

    let membership = match Membership::join(&state.router, handle, &shutdown) {
        Ok(m) => m,
        Err(NameTaken(name)) => {
            info!(%addr, name = %name, "name taken, closing");
            framed.send(notice::name_taken(&name)).await?;
            return Ok(SessionEnd::Rejected(name));
        }
    };
    info!(name = %membership.handle.name, %addr, "joined the chat");

    // Written before the queue is drained, so the welcome block always
    // precedes any chat that arrived in the meantime.
    let names = state.router.registry().snapshot_names();
    framed.feed(notice::connected_clients(&names)).await?;
    for line in notice::INSTRUCTIONS {
        framed.feed(line).await?;
    }
    SinkExt::<String>::flush(&mut framed).await?;

    // Active.
    let outcome = message_loop(&mut framed, &mut rx, &membership, &shutdown).await;

    // Closed.
    drop(membership);
    if matches!(outcome, Ok(SessionEnd::Lagged)) {
        warn!(%addr, "peer stopped reading, disconnected");
        return outcome;
    }
    match tokio::time::timeout(FLUSH_TIMEOUT, flush_pending(&mut framed, &mut rx)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(%addr, "close failed: {e}"),
        Err(_) => debug!(%addr, "peer not reading, dropped pending lines"),
    }

    outcome
}

/// Write whatever is still queued, then close the socket.
async fn flush_pending<S>(framed: &mut Framed<S, LineCodec>, rx: &mut OutboundRx) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Ok(line) = rx.try_recv() {
        framed.feed(line).await?;
    }
    SinkExt::<String>::close(framed).await
}

async fn message_loop<S>(
    framed: &mut Framed<S, LineCodec>,
    rx: &mut OutboundRx,
    membership: &Membership,
    shutdown: &CancellationToken,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let me = &membership.handle;
    let router = &membership.router;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                reply(me, notice::SHUTTING_DOWN);
                return Ok(SessionEnd::Shutdown);
            }

            _ = me.lagged() => return Ok(SessionEnd::Lagged),

            // Queued lines from the router and our own replies.
            Some(line) = rx.recv() => {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        reply(me, notice::SHUTTING_DOWN);
                        return Ok(SessionEnd::Shutdown);
                    }
                    _ = me.lagged() => return Ok(SessionEnd::Lagged),
                    sent = framed.send(line) => sent?,
                }
            }

            // Incoming line from the client.
            frame = framed.next() => {
                let line = match frame {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(name = %me.name, "read error: {e}");
                        return Err(e.into());
                    }
                    None => return Ok(SessionEnd::Disconnected),
                };
                if let Flow::Close = dispatch(&line, me, router) {
                    return Ok(SessionEnd::Exit);
                }
            }
        }
    }
}

/// Handle one client line.
fn dispatch(line: &str, me: &ClientHandle, router: &Router) -> Flow {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(malformed) => {
            reply(me, malformed.usage());
            return Flow::Continue;
        }
    };

    match command {
        Command::Empty => reply(me, notice::EMPTY_MESSAGE),
        Command::Exit => return Flow::Close,
        Command::Banned => reply(me, &notice::banned_phrases(router.filter().phrases())),
        Command::Send { recipients, text } => {
            let report = router.send_to_each(&text, me, &recipients);
            if !report.missing.is_empty() {
                let available = router.registry().snapshot_names();
                for name in &report.missing {
                    reply(me, &notice::not_found(name, &available));
                }
            }
        }
        Command::Exclude { excluded, text } => {
            // Blocked content is already reported to the sender by the router.
            let _ = router.broadcast_excluding(&text, me, &excluded);
        }
        Command::Broadcast(text) => {
            let _ = router.broadcast(&text, me);
        }
    }
    Flow::Continue
}

fn reply(me: &ClientHandle, line: &str) {
    if let Err(e) = me.send(line) {
        debug!(name = %me.name, "reply dropped: {e}");
    }
}
