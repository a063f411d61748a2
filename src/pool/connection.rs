use super::queue::OutboundQueue;
use crate::Handle;

use std::fmt;

/// Identity of an admitted connection.
///
/// Ids increase monotonically and are never reused, so two connections
/// that happen to share a handle value (the platform recycles closed
/// descriptors) are always distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a connection inside the pool.
///
/// `Evicted` is terminal; an evicted connection is never readmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted and registered, nothing read or written yet.
    Admitted,
    /// Has taken part in at least one read or write.
    Active,
    /// Removed from the pool; only observable on the value returned by
    /// [`ConnectionPool::evict`](super::ConnectionPool::evict).
    Evicted,
}

/// A connected client: its handle and the bytes waiting to reach it.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    handle: Handle,
    outbound: OutboundQueue,
    state: ConnectionState,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, handle: Handle) -> Self {
        Self {
            id,
            handle,
            outbound: OutboundQueue::new(),
            state: ConnectionState::Admitted,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub(crate) fn outbound_mut(&mut self) -> &mut OutboundQueue {
        &mut self.outbound
    }

    /// A connection wants write readiness iff it has bytes queued.
    pub fn is_write_interested(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub(crate) fn mark_active(&mut self) {
        if self.state == ConnectionState::Admitted {
            self.state = ConnectionState::Active;
        }
    }

    /// Marks the connection evicted and releases every queued message.
    ///
    /// Returns the number of messages that were discarded.
    pub(crate) fn evict(&mut self) -> usize {
        self.state = ConnectionState::Evicted;
        let discarded = self.outbound.len();
        self.outbound = OutboundQueue::new();
        discarded
    }
}
