//! Registry of live connections.
//!
//! The [`ConnectionPool`] owns every admitted [`Connection`] together with
//! its [`OutboundQueue`]. It is the only place where connections are
//! created and destroyed, and it derives the interest sets handed to the
//! readiness wait.
//!
//! Members are kept in admission order so that a broadcast fans out
//! deterministically. Lookups by handle go through a side index, which
//! keeps removal of the first, last or any middle member the same
//! operation.

mod connection;
mod queue;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use queue::{DrainStatus, Message, OutboundQueue};

use crate::Handle;
use crate::error::{RelayError, Result};
use crate::net::Transport;
use crate::reactor::poller::InterestSets;

use std::collections::HashMap;
use tracing::{debug, trace};

/// Result of fanning one chunk out to the pool.
#[derive(Debug, Default)]
pub struct Fanout {
    /// Recipients that now hold a copy of the chunk.
    pub delivered: usize,
    /// Recipients that could not take the chunk and must be evicted.
    pub rejected: Vec<(Handle, RelayError)>,
}

/// The set of live connections plus the listener they were accepted from.
#[derive(Debug)]
pub struct ConnectionPool {
    /// Listening socket; always part of the read interest set.
    listener: Handle,
    /// Live connections, ascending by id (i.e. admission order).
    members: Vec<Connection>,
    /// Handle to id index for the live members.
    by_handle: HashMap<Handle, ConnectionId>,
    /// Id handed to the next admitted connection.
    next_id: u64,
    /// Largest handle among the listener and all members.
    max_handle: Handle,
    /// Per-connection ceiling on queued bytes, `None` for unbounded.
    backlog_limit: Option<usize>,
    /// Largest handle the readiness wait can watch.
    handle_limit: Option<Handle>,
}

impl ConnectionPool {
    /// Creates an empty pool for connections accepted from `listener`.
    pub fn new(listener: Handle) -> Self {
        Self {
            listener,
            members: Vec::new(),
            by_handle: HashMap::new(),
            next_id: 0,
            max_handle: listener,
            backlog_limit: None,
            handle_limit: None,
        }
    }

    /// Limits the bytes any one connection may have queued.
    ///
    /// `0` removes the limit.
    pub fn with_backlog_limit(mut self, limit: usize) -> Self {
        self.set_backlog_limit(limit);
        self
    }

    pub fn set_backlog_limit(&mut self, limit: usize) {
        self.backlog_limit = (limit > 0).then_some(limit);
    }

    /// Refuses to admit handles above `limit`.
    pub fn with_handle_limit(mut self, limit: Option<Handle>) -> Self {
        self.handle_limit = limit;
        self
    }

    /// Registers a freshly accepted handle.
    ///
    /// The new connection is read-interested and has an empty queue.
    ///
    /// # Errors
    ///
    /// - [`RelayError::HandleOutOfRange`] if `handle` is above the handle
    ///   limit,
    /// - [`RelayError::DuplicateHandle`] if `handle` is already live,
    /// - [`RelayError::Exhausted`] if the registry cannot grow.
    pub fn admit(&mut self, handle: Handle) -> Result<&Connection> {
        if let Some(limit) = self.handle_limit.filter(|&limit| handle > limit) {
            return Err(RelayError::HandleOutOfRange { handle, limit });
        }

        if self.by_handle.contains_key(&handle) {
            return Err(RelayError::DuplicateHandle(handle));
        }

        self.members
            .try_reserve(1)
            .map_err(|_| RelayError::Exhausted { what: "connection" })?;
        self.by_handle
            .try_reserve(1)
            .map_err(|_| RelayError::Exhausted { what: "connection" })?;

        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        self.by_handle.insert(handle, id);
        self.members.push(Connection::new(id, handle));
        self.max_handle = self.max_handle.max(handle);

        debug!(handle, %id, max_handle = self.max_handle, "connection admitted");

        let last = self.members.len() - 1;
        Ok(&self.members[last])
    }

    /// Removes the connection owning `handle` and releases its queue.
    ///
    /// The returned connection is in the [`ConnectionState::Evicted`]
    /// state; its handle is still open and must be closed by the caller.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotFound`] if no live connection owns `handle`.
    pub fn evict(&mut self, handle: Handle) -> Result<Connection> {
        let id = self
            .by_handle
            .remove(&handle)
            .ok_or(RelayError::NotFound(handle))?;

        let position = self
            .position(id)
            .ok_or(RelayError::NotFound(handle))?;

        let mut connection = self.members.remove(position);
        let discarded = connection.evict();

        if handle == self.max_handle {
            self.max_handle = self
                .members
                .iter()
                .map(Connection::handle)
                .fold(self.listener, Handle::max);
        }

        debug!(
            handle,
            id = %connection.id(),
            discarded,
            max_handle = self.max_handle,
            "connection evicted"
        );

        Ok(connection)
    }

    /// Evicts every member and returns their handles in admission order.
    pub fn teardown(&mut self) -> Vec<Handle> {
        let handles: Vec<Handle> = self.members.iter().map(Connection::handle).collect();

        for &handle in &handles {
            // Every handle was just read from `members`, so it is live.
            let _ = self.evict(handle);
        }

        handles
    }

    /// Looks up the live connection owning `handle`.
    pub fn find(&self, handle: Handle) -> Option<&Connection> {
        let id = self.by_handle.get(&handle)?;
        self.position(*id).map(|i| &self.members[i])
    }

    fn find_mut(&mut self, handle: Handle) -> Option<&mut Connection> {
        let id = *self.by_handle.get(&handle)?;
        self.position(id).map(|i| &mut self.members[i])
    }

    fn position(&self, id: ConnectionId) -> Option<usize> {
        self.members
            .binary_search_by_key(&id, Connection::id)
            .ok()
    }

    /// Returns `true` if `handle` is live and still belongs to `id`.
    pub fn is_current(&self, handle: Handle, id: ConnectionId) -> bool {
        self.by_handle.get(&handle) == Some(&id)
    }

    /// Queues a copy of `chunk` for every member except `source`.
    ///
    /// A recipient either receives the whole chunk or is reported in
    /// [`Fanout::rejected`]; nothing is half-registered.
    pub fn broadcast(&mut self, source: Handle, chunk: &[u8]) -> Fanout {
        let limit = self.backlog_limit;
        let mut fanout = Fanout::default();

        for connection in self.members.iter_mut() {
            if connection.handle() == source {
                connection.mark_active();
                continue;
            }

            match enqueue(connection, chunk, limit) {
                Ok(()) => fanout.delivered += 1,
                Err(e) => fanout.rejected.push((connection.handle(), e)),
            }
        }

        trace!(
            source,
            len = chunk.len(),
            delivered = fanout.delivered,
            rejected = fanout.rejected.len(),
            "chunk fanned out"
        );

        fanout
    }

    /// Writes as much of `handle`'s queue as `transport` accepts without
    /// blocking.
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotFound`] if the handle is not live,
    /// - [`RelayError::Io`] if the write failed; the connection must be
    ///   evicted and the drain must not be retried.
    pub fn drain<T>(&mut self, handle: Handle, transport: &mut T) -> Result<DrainStatus>
    where
        T: Transport + ?Sized,
    {
        let connection = self
            .find_mut(handle)
            .ok_or(RelayError::NotFound(handle))?;

        connection.mark_active();
        connection
            .outbound_mut()
            .drain_with(|bytes| transport.write(handle, bytes))
            .map_err(|e| RelayError::io("write", e))
    }

    /// Marks `handle` as having taken part in I/O.
    pub(crate) fn touch(&mut self, handle: Handle) {
        if let Some(connection) = self.find_mut(handle) {
            connection.mark_active();
        }
    }

    /// Builds the read and write interest sets for the next wait.
    ///
    /// The listener and every member are read-interested; a member is
    /// write-interested exactly when its queue is non-empty.
    pub fn interest_sets(&self) -> InterestSets {
        let mut sets = InterestSets::new(self.max_handle);
        sets.watch_read(self.listener);

        for connection in &self.members {
            sets.watch_connection(
                connection.id(),
                connection.handle(),
                connection.is_write_interested(),
            );
        }

        sets
    }

    /// Largest handle among the listener and all live members.
    pub fn max_handle(&self) -> Handle {
        self.max_handle
    }

    pub fn listener(&self) -> Handle {
        self.listener
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over live members in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.members.iter()
    }
}

fn enqueue(connection: &mut Connection, chunk: &[u8], limit: Option<usize>) -> Result<()> {
    if let Some(limit) = limit {
        let queued = connection.outbound().pending_bytes() + chunk.len();
        if queued > limit {
            return Err(RelayError::BacklogExceeded {
                handle: connection.handle(),
                queued,
                limit,
            });
        }
    }

    let message = Message::copy_from(chunk)?;
    connection.outbound_mut().push(message)
}
