//! In-memory doubles for the transport and the readiness wait.

#![allow(dead_code)]

use chorus::Handle;
use chorus::net::Transport;
use chorus::reactor::Event;
use chorus::reactor::poller::{InterestSets, Readiness};

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;

/// Handle of the fake listener. Fake handles start high so they never
/// collide with the real pipe a `StopToken` opens.
pub const LISTENER: Handle = 900;

#[derive(Default)]
pub struct TransportState {
    /// Results handed out by successive `accept` calls.
    pub accepts: VecDeque<io::Result<Handle>>,
    /// Scripted read results per handle; an empty script would block.
    pub reads: HashMap<Handle, VecDeque<io::Result<Vec<u8>>>>,
    /// Bytes accepted by `write`, per handle.
    pub wire: HashMap<Handle, Vec<u8>>,
    /// Size of every individual write call, per handle.
    pub writes: HashMap<Handle, Vec<usize>>,
    /// Most bytes one `write` call accepts.
    pub write_limit: Option<usize>,
    /// Writes to these handles fail with the given kind.
    pub write_errors: HashMap<Handle, io::ErrorKind>,
    /// Handles closed, in order.
    pub closed: Vec<Handle>,
}

/// Cloneable in-memory transport; clones share state.
#[derive(Clone, Default)]
pub struct FakeTransport {
    pub state: Rc<RefCell<TransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_limit(limit: usize) -> Self {
        let transport = Self::default();
        transport.state.borrow_mut().write_limit = Some(limit);
        transport
    }

    pub fn push_accept(&self, result: io::Result<Handle>) {
        self.state.borrow_mut().accepts.push_back(result);
    }

    pub fn push_read(&self, handle: Handle, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .reads
            .entry(handle)
            .or_default()
            .push_back(Ok(bytes.to_vec()));
    }

    pub fn push_read_error(&self, handle: Handle, kind: io::ErrorKind) {
        self.state
            .borrow_mut()
            .reads
            .entry(handle)
            .or_default()
            .push_back(Err(kind.into()));
    }

    pub fn fail_writes(&self, handle: Handle, kind: io::ErrorKind) {
        self.state.borrow_mut().write_errors.insert(handle, kind);
    }

    pub fn wire(&self, handle: Handle) -> Vec<u8> {
        self.state
            .borrow()
            .wire
            .get(&handle)
            .cloned()
            .unwrap_or_default()
    }

    pub fn writes(&self, handle: Handle) -> Vec<usize> {
        self.state
            .borrow()
            .writes
            .get(&handle)
            .cloned()
            .unwrap_or_default()
    }

    pub fn closed(&self) -> Vec<Handle> {
        self.state.borrow().closed.clone()
    }
}

impl Transport for FakeTransport {
    fn accept(&mut self, _listener: Handle) -> io::Result<Handle> {
        self.state
            .borrow_mut()
            .accepts
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::WouldBlock.into()))
    }

    fn read(&mut self, handle: Handle, buffer: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let next = state
            .reads
            .get_mut(&handle)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(io::ErrorKind::WouldBlock.into()))?;

        let n = next.len().min(buffer.len());
        buffer[..n].copy_from_slice(&next[..n]);
        Ok(n)
    }

    fn write(&mut self, handle: Handle, buffer: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();

        if let Some(&kind) = state.write_errors.get(&handle) {
            return Err(kind.into());
        }

        let n = state
            .write_limit
            .map_or(buffer.len(), |limit| limit.min(buffer.len()));

        state
            .wire
            .entry(handle)
            .or_default()
            .extend_from_slice(&buffer[..n]);
        state.writes.entry(handle).or_default().push(n);

        Ok(n)
    }

    fn close(&mut self, handle: Handle) {
        self.state.borrow_mut().closed.push(handle);
    }
}

#[derive(Default)]
pub struct PollerState {
    /// Batches returned by successive waits; an empty script yields no
    /// events.
    pub script: VecDeque<io::Result<Vec<Event>>>,
    /// Interest sets seen by every wait, in order.
    pub seen: Vec<InterestSets>,
    /// Largest handle the poller claims to support.
    pub handle_limit: Option<Handle>,
}

/// Readiness double returning scripted batches.
#[derive(Clone, Default)]
pub struct ScriptedPoller {
    pub state: Rc<RefCell<PollerState>>,
}

impl ScriptedPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle_limit(limit: Handle) -> Self {
        let poller = Self::default();
        poller.state.borrow_mut().handle_limit = Some(limit);
        poller
    }

    pub fn push(&self, events: Vec<Event>) {
        self.state.borrow_mut().script.push_back(Ok(events));
    }

    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state.borrow_mut().script.push_back(Err(kind.into()));
    }

    pub fn last_sets(&self) -> InterestSets {
        self.state
            .borrow()
            .seen
            .last()
            .cloned()
            .expect("no wait happened yet")
    }
}

impl Readiness for ScriptedPoller {
    fn wait(&mut self, sets: &InterestSets, ready: &mut Vec<Event>) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.seen.push(sets.clone());

        ready.clear();
        if let Some(batch) = state.script.pop_front() {
            ready.extend(batch?);
        }

        Ok(())
    }

    fn max_supported_handle(&self) -> Option<Handle> {
        self.state.borrow().handle_limit
    }
}

/// Readable event for `handle`.
pub fn readable(handle: Handle) -> Event {
    Event::readable(handle)
}

/// Writable event for `handle`.
pub fn writable(handle: Handle) -> Event {
    Event::writable(handle)
}
