/// Connection registry — display name → client handle.
///
/// All operations take one short `std::sync::Mutex` critical section and
/// never do I/O while holding it: broadcasts copy the entries out first and
/// enqueue afterwards. A plain mutex (rather than an async lock) lets the
/// session teardown guard unregister from `Drop`.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::outbound::{Outbound, OutboundError};

/// Process-unique id of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to send lines to a registered client.
///
/// Carries no socket: the only thing other tasks can do with it is enqueue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: ConnectionId,
    pub name: String,
    pub addr: SocketAddr,
    outbound: Outbound,
}

impl ClientHandle {
    pub fn new(id: ConnectionId, name: impl Into<String>, addr: SocketAddr, outbound: Outbound) -> Self {
        Self {
            id,
            name: name.into(),
            addr,
            outbound,
        }
    }

    /// Queue a line for this client.
    pub fn send(&self, line: impl Into<String>) -> Result<(), OutboundError> {
        self.outbound.send(line)
    }

    /// Resolves once this client's queue has overflowed.
    pub async fn lagged(&self) {
        self.outbound.lagged().await
    }
}

/// Registration refused: someone already holds the name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("name {0:?} is already taken")]
pub struct NameTaken(pub String);

#[derive(Debug)]
struct Entry {
    seq: u64,
    handle: ClientHandle,
}

#[derive(Debug, Default)]
struct Inner {
    clients: HashMap<String, Entry>,
    next_seq: u64,
}

/// Shared, thread-safe registry of named connections.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Inner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the map consistent, so a panic
        // elsewhere while holding the lock cannot corrupt it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `handle.name`. Check and insert happen under one lock.
    pub fn register(&self, handle: ClientHandle) -> Result<(), NameTaken> {
        let mut inner = self.lock();
        if inner.clients.contains_key(&handle.name) {
            return Err(NameTaken(handle.name));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        debug!(name = %handle.name, id = %handle.id, "registered");
        inner.clients.insert(handle.name.clone(), Entry { seq, handle });
        Ok(())
    }

    /// Remove `name` if it is still held by connection `id`.
    ///
    /// Idempotent: returns `false` when the entry is already gone or now
    /// belongs to a newer connection that re-registered the name.
    pub fn unregister(&self, name: &str, id: ConnectionId) -> bool {
        let mut inner = self.lock();
        match inner.clients.get(name) {
            Some(entry) if entry.handle.id == id => {
                inner.clients.remove(name);
                debug!(name, %id, "unregistered");
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ClientHandle> {
        self.lock().clients.get(name).map(|e| e.handle.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().clients.contains_key(name)
    }

    /// Point-in-time copy of the registered names, in join order.
    pub fn snapshot_names(&self) -> Vec<String> {
        self.snapshot_entries().into_iter().map(|h| h.name).collect()
    }

    /// Point-in-time copy of every handle, in join order.
    pub fn snapshot_entries(&self) -> Vec<ClientHandle> {
        let inner = self.lock();
        let mut entries: Vec<&Entry> = inner.clients.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.handle.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().clients.is_empty()
    }

    /// Drop every entry (server shutdown). Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let n = inner.clients.len();
        inner.clients.clear();
        n
    }
}
