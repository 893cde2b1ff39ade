/// Message router — broadcast, exclusion-broadcast, and direct delivery.
///
/// The router takes a snapshot of the registry, releases the lock, then
/// enqueues onto each recipient's outbound queue. A recipient that vanished
/// after the snapshot, or whose queue is full, just fails its enqueue; the
/// failure is logged and the loop moves on.
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::filter::PhraseFilter;
use super::notice;
use super::registry::{ClientHandle, ConnectionId, Registry};

/// Why a message was not routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("message contains a banned phrase")]
    ContentBlocked,
    #[error("user {0} not found")]
    RecipientNotFound(String),
}

/// Outcome of a fan-out: how many queues accepted the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Per-recipient outcome of a multi-recipient direct message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectReport {
    pub delivered: Vec<String>,
    pub missing: Vec<String>,
    pub blocked: bool,
}

/// Routes chat lines between registered clients.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Registry,
    filter: Arc<PhraseFilter>,
}

impl Router {
    pub fn new(registry: Registry, filter: Arc<PhraseFilter>) -> Self {
        Self { registry, filter }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn filter(&self) -> &PhraseFilter {
        &self.filter
    }

    /// Send `"<sender>: <text>"` to everyone but the sender.
    pub fn broadcast(&self, text: &str, sender: &ClientHandle) -> Result<Delivery, RouteError> {
        self.broadcast_excluding::<&str>(text, sender, &[])
    }

    /// Like [`Router::broadcast`], also skipping every name in `excluded`.
    ///
    /// Excluded names are trimmed before comparison.
    pub fn broadcast_excluding<S: AsRef<str>>(
        &self,
        text: &str,
        sender: &ClientHandle,
        excluded: &[S],
    ) -> Result<Delivery, RouteError> {
        if self.filter.contains_banned(text) {
            Self::notify_blocked(sender, notice::BLOCKED_BROADCAST);
            return Err(RouteError::ContentBlocked);
        }

        let excluded: HashSet<&str> = excluded.iter().map(|n| n.as_ref().trim()).collect();
        let line = notice::chat(&sender.name, text);
        let delivery = self.fan_out(&line, |h| h.id == sender.id || excluded.contains(h.name.as_str()));
        debug!(
            sender = %sender.name,
            delivered = delivery.delivered,
            failed = delivery.failed,
            excluded = excluded.len(),
            "broadcast"
        );
        Ok(delivery)
    }

    /// Send `"<sender> (private): <text>"` to one recipient.
    pub fn send_direct(&self, text: &str, sender: &ClientHandle, recipient: &str) -> Result<(), RouteError> {
        let report = self.send_to_each(text, sender, &[recipient]);
        if report.blocked {
            return Err(RouteError::ContentBlocked);
        }
        match report.missing.into_iter().next() {
            Some(name) => Err(RouteError::RecipientNotFound(name)),
            None if report.delivered.is_empty() => Err(RouteError::RecipientNotFound(recipient.trim().to_owned())),
            None => Ok(()),
        }
    }

    /// One direct message per recipient, filtering the text once.
    ///
    /// Recipients are trimmed; blanks are skipped. Partial success is normal:
    /// each recipient lands in either `delivered` or `missing`.
    pub fn send_to_each<S: AsRef<str>>(
        &self,
        text: &str,
        sender: &ClientHandle,
        recipients: &[S],
    ) -> DirectReport {
        let mut report = DirectReport::default();
        if self.filter.contains_banned(text) {
            Self::notify_blocked(sender, notice::BLOCKED_DIRECT);
            report.blocked = true;
            return report;
        }

        let line = notice::private(&sender.name, text);
        for recipient in recipients.iter().map(|r| r.as_ref().trim()) {
            if recipient.is_empty() {
                continue;
            }
            match self.deliver_direct(&line, recipient) {
                Ok(()) => report.delivered.push(recipient.to_owned()),
                Err(_) => report.missing.push(recipient.to_owned()),
            }
        }
        report
    }

    /// Deliver a system line (join/leave/shutdown) to everyone except `except`.
    ///
    /// Not filtered: the text is produced by the server, not a client.
    pub fn announce(&self, line: &str, except: Option<ConnectionId>) -> Delivery {
        self.fan_out(line, |h| Some(h.id) == except)
    }

    fn deliver_direct(&self, line: &str, recipient: &str) -> Result<(), RouteError> {
        let Some(handle) = self.registry.lookup(recipient) else {
            return Err(RouteError::RecipientNotFound(recipient.to_owned()));
        };
        handle.send(line).map_err(|e| {
            warn!(recipient, "direct delivery failed: {e}");
            RouteError::RecipientNotFound(recipient.to_owned())
        })
    }

    fn fan_out(&self, line: &str, skip: impl Fn(&ClientHandle) -> bool) -> Delivery {
        let mut delivery = Delivery::default();
        for handle in self.registry.snapshot_entries() {
            if skip(&handle) {
                continue;
            }
            match handle.send(line) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    warn!(recipient = %handle.name, "delivery failed: {e}");
                    delivery.failed += 1;
                }
            }
        }
        delivery
    }

    fn notify_blocked(sender: &ClientHandle, line: &str) {
        if let Err(e) = sender.send(line) {
            warn!(sender = %sender.name, "could not deliver blocked notice: {e}");
        }
    }
}
