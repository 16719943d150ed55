use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{trace, warn};
use uuid::Uuid;

/// Identifies one WebSocket connection for the lifetime of its session.
pub type ConnId = Uuid;

/// Per-connection outbox. Frames are pre-serialized JSON; the connection's
/// send task drains this channel into the socket, so frames queued by one
/// sender arrive in queue order.
pub type OutboundSender = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct Group {
    members: HashMap<ConnId, OutboundSender>,
}

/// Process-wide mapping from group name to the set of active connections.
///
/// An instance is injected into every connection handler — no ambient
/// singleton. All membership mutation and send iteration is serialized under
/// one lock, so a join racing a disconnect can never observe a half-applied
/// membership change.
#[derive(Clone, Default)]
pub struct GroupRegistry {
    inner: Arc<RwLock<HashMap<String, Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert, creating the group if absent.
    pub async fn add(&self, group: &str, conn_id: ConnId, tx: OutboundSender) {
        let mut groups = self.inner.write().await;
        groups.entry(group.to_string()).or_default().members.insert(conn_id, tx);
    }

    /// Idempotent removal. The group entry is dropped entirely once its
    /// member set empties — no stale empty groups are kept around.
    ///
    /// Returns whether the connection was actually a member, so disconnect
    /// cleanup can log registry inconsistencies without aborting.
    pub async fn discard(&self, group: &str, conn_id: ConnId) -> bool {
        let mut groups = self.inner.write().await;
        let Some(entry) = groups.get_mut(group) else {
            return false;
        };
        let removed = entry.members.remove(&conn_id).is_some();
        if entry.members.is_empty() {
            groups.remove(group);
        }
        removed
    }

    /// Deliver a frame to every current member of `group`. A member whose
    /// outbox is already closed is skipped; the failures are surfaced as one
    /// aggregate log line rather than aborting the remaining deliveries.
    ///
    /// Returns the number of members the frame was queued for.
    pub async fn send(&self, group: &str, frame: &str) -> usize {
        let groups = self.inner.read().await;
        let Some(entry) = groups.get(group) else {
            trace!(group, "send to empty group dropped");
            return 0;
        };

        let mut delivered = 0;
        let mut failed = 0;
        for (conn_id, tx) in &entry.members {
            if tx.send(frame.to_string()).is_ok() {
                delivered += 1;
            } else {
                trace!(group, %conn_id, "member outbox closed, skipping");
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(group, failed, delivered, "dropped frames for closing connections");
        }
        delivered
    }

    /// Whether `conn_id` is currently a member of `group`.
    pub async fn contains(&self, group: &str, conn_id: ConnId) -> bool {
        self.inner
            .read()
            .await
            .get(group)
            .is_some_and(|g| g.members.contains_key(&conn_id))
    }

    /// Number of live (non-empty) groups.
    pub async fn group_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
