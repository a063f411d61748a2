use super::unix::{sys_close, sys_pipe, sys_read, sys_write};
use crate::Handle;
use crate::pool::ConnectionId;

use std::collections::{BTreeMap, HashMap};
use std::io;

/// Readiness a handle is waited on for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

/// Read and write interest sets for one readiness wait.
///
/// A fresh value is derived from the pool before every wait; nothing
/// mutates it incrementally across iterations.
#[derive(Debug, Clone, Default)]
pub struct InterestSets {
    /// Every watched handle with its interest, ascending by handle.
    handles: BTreeMap<Handle, Interest>,
    /// Connection that owned each member handle when the sets were built.
    owners: HashMap<Handle, ConnectionId>,
    /// Upper bound over all watched handles.
    max_handle: Handle,
}

impl InterestSets {
    /// Creates empty sets whose bound starts at `max_handle`.
    pub fn new(max_handle: Handle) -> Self {
        Self {
            handles: BTreeMap::new(),
            owners: HashMap::new(),
            max_handle,
        }
    }

    /// Watches `handle` for read readiness.
    pub fn watch_read(&mut self, handle: Handle) {
        self.handles.entry(handle).or_default().read = true;
        self.max_handle = self.max_handle.max(handle);
    }

    /// Stops watching `handle`. The bound is left as is.
    pub fn unwatch(&mut self, handle: Handle) {
        self.handles.remove(&handle);
        self.owners.remove(&handle);
    }

    pub(crate) fn watch_connection(&mut self, id: ConnectionId, handle: Handle, write: bool) {
        let interest = self.handles.entry(handle).or_default();
        interest.read = true;
        interest.write |= write;

        self.owners.insert(handle, id);
        self.max_handle = self.max_handle.max(handle);
    }

    pub fn is_read_interested(&self, handle: Handle) -> bool {
        self.interest(handle).read
    }

    pub fn is_write_interested(&self, handle: Handle) -> bool {
        self.interest(handle).write
    }

    /// Interest registered for `handle`, all `false` if it is not watched.
    pub fn interest(&self, handle: Handle) -> Interest {
        self.handles.get(&handle).copied().unwrap_or_default()
    }

    /// Watched handles with their interest, ascending by handle.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, Interest)> + '_ {
        self.handles.iter().map(|(&handle, &interest)| (handle, interest))
    }

    /// Connection that owned `handle` when these sets were derived.
    pub fn owner(&self, handle: Handle) -> Option<ConnectionId> {
        self.owners.get(&handle).copied()
    }

    /// Largest watched handle; `select(2)` needs it as `nfds - 1`.
    pub fn max_handle(&self) -> Handle {
        self.max_handle
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Self-pipe used to interrupt a blocked readiness wait.
///
/// [`wake`](Self::wake) only performs a `write(2)` and is safe to call
/// from a signal handler.
#[derive(Debug)]
pub struct Waker {
    reader: Handle,
    writer: Handle,
}

impl Waker {
    /// Creates a non-blocking pipe pair.
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = sys_pipe()?;
        Ok(Self { reader, writer })
    }

    /// Handle the loop watches for read readiness.
    pub fn handle(&self) -> Handle {
        self.reader
    }

    /// Makes the read end readable.
    ///
    /// A full pipe already guarantees a pending wakeup, so a failed write
    /// is ignored.
    pub fn wake(&self) {
        let _ = sys_write(self.writer, &[1]);
    }

    /// Consumes every pending wakeup byte.
    pub fn reset(&self) {
        let mut buffer = [0u8; 64];
        while sys_read(self.reader, &mut buffer) > 0 {}
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        sys_close(self.reader);
        sys_close(self.writer);
    }
}
