//! The relay event loop.
//!
//! [`EventLoop`] is a single-threaded readiness loop. Each iteration:
//!
//! 1. derives the interest sets from the pool (plus the stop waker),
//! 2. blocks in the readiness wait, the only place the loop suspends,
//! 3. accepts at most one pending connection if the listener is ready,
//! 4. reads one chunk from every readable member and fans it out,
//! 5. drains the queue of every writable member.
//!
//! All pool mutations happen between two waits, so nothing races. The loop
//! ends when its [`StopToken`] is requested or when the listener breaks;
//! either way every remaining connection is torn down before
//! [`EventLoop::run`] returns.

mod event;
mod stop;

pub mod poller;

pub use event::Event;
pub use stop::{StopToken, install_signal_handlers};

use crate::Handle;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::net::Transport;
use crate::pool::{ConnectionPool, DrainStatus};
use poller::{InterestSets, Readiness};

use std::{io, mem};
use tracing::{debug, error, info, trace, warn};

/// Why [`EventLoop::run`] returned.
#[derive(Debug)]
pub enum Exit {
    /// A stop was requested.
    Stopped,
    /// Accepting from the listener failed in a way retrying cannot fix.
    ListenerFailed(io::Error),
}

impl Exit {
    /// `true` for an orderly, requested shutdown.
    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Stopped)
    }
}

/// Counters kept by the loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Connections admitted to the pool.
    pub accepted: u64,
    /// Accepted handles closed because the pool could not admit them.
    pub rejected: u64,
    /// Connections evicted for any reason, shutdown included.
    pub evicted: u64,
    /// Bytes read from clients.
    pub bytes_in: u64,
    /// Chunks handed to broadcast.
    pub chunks_relayed: u64,
}

/// Single-threaded accept/read/broadcast/drain loop.
pub struct EventLoop<T, R> {
    pool: ConnectionPool,
    transport: T,
    poller: R,
    stop: StopToken,
    /// Scratch buffer one read fills.
    buffer: Vec<u8>,
    /// Readiness reported by the last wait.
    ready: Vec<Event>,
    /// Set once the listener failed terminally.
    exit: Option<Exit>,
    /// The listener is left out of the wait until a connection closes.
    accept_paused: bool,
    /// The last accept failed; later failures are not logged again.
    accept_failing: bool,
    stats: LoopStats,
}

impl<T, R> EventLoop<T, R>
where
    T: Transport,
    R: Readiness,
{
    /// Creates a loop accepting from `listener`.
    ///
    /// The listener must already be bound, listening and non-blocking. The
    /// loop never closes it. Accepted handles the poller cannot wait on are
    /// closed and counted as rejected.
    pub fn new(listener: Handle, transport: T, poller: R, stop: StopToken) -> Self {
        Self {
            pool: ConnectionPool::new(listener)
                .with_handle_limit(poller.max_supported_handle()),
            transport,
            poller,
            stop,
            buffer: vec![0; crate::config::DEFAULT_READ_BUFFER],
            ready: Vec::with_capacity(64),
            exit: None,
            accept_paused: false,
            accept_failing: false,
            stats: LoopStats::default(),
        }
    }

    /// Applies the buffer size and backlog limit from `config`.
    pub fn configure(self, config: &RelayConfig) -> Self {
        self.read_buffer_size(config.read_buffer_size)
            .backlog_limit(config.max_backlog_bytes)
    }

    /// Sets how many bytes one read may return.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn read_buffer_size(mut self, n: usize) -> Self {
        assert!(n > 0, "read buffer size must be > 0");

        self.buffer = vec![0; n];
        self
    }

    /// Caps the bytes any one connection may have queued; `0` disables it.
    pub fn backlog_limit(mut self, bytes: usize) -> Self {
        self.pool.set_backlog_limit(bytes);
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs until a stop is requested or the listener fails.
    ///
    /// Every connection still in the pool is evicted and closed before
    /// this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`RelayError::Wait`] if the readiness wait failed for a reason
    /// other than an interruption.
    pub fn run(&mut self) -> Result<Exit> {
        info!(listener = self.pool.listener(), "relay loop started");

        let outcome = loop {
            if self.stop.is_requested() {
                break Ok(self.exit.take().unwrap_or(Exit::Stopped));
            }

            if let Err(e) = self.turn() {
                error!(error = %e, "relay loop aborted");
                break Err(e);
            }
        };

        self.teardown();
        outcome
    }

    /// Runs a single iteration: one wait followed by dispatch.
    pub fn turn(&mut self) -> Result<()> {
        let mut sets = self.pool.interest_sets();
        sets.watch_read(self.stop.wake_handle());
        if self.accept_paused {
            sets.unwatch(self.pool.listener());
        }

        trace!(
            watched = sets.len(),
            max_handle = sets.max_handle(),
            "waiting for readiness"
        );

        self.poller
            .wait(&sets, &mut self.ready)
            .map_err(RelayError::Wait)?;

        let ready = mem::take(&mut self.ready);
        self.dispatch(&sets, &ready);
        self.ready = ready;

        Ok(())
    }

    fn dispatch(&mut self, sets: &InterestSets, ready: &[Event]) {
        let listener = self.pool.listener();
        let wake = self.stop.wake_handle();

        for event in ready.iter().filter(|e| e.readable) {
            if event.handle == wake {
                self.stop.reset_wakeups();
            } else if event.handle == listener {
                self.accept();
            }
        }

        for event in ready.iter().filter(|e| e.readable) {
            if self.is_current(sets, event.handle) {
                self.read(event.handle);
            }
        }

        for event in ready.iter().filter(|e| e.writable) {
            if self.is_current(sets, event.handle) {
                self.flush(event.handle);
            }
        }
    }

    /// `true` if `handle` still belongs to the connection it belonged to
    /// when `sets` was derived.
    fn is_current(&self, sets: &InterestSets, handle: Handle) -> bool {
        sets.owner(handle)
            .is_some_and(|id| self.pool.is_current(handle, id))
    }

    fn accept(&mut self) {
        let listener = self.pool.listener();

        let accepted = self.transport.accept(listener);
        if accepted.is_ok() {
            self.accept_failing = false;
        }

        match accepted {
            Ok(handle) => match self.pool.admit(handle) {
                Ok(connection) => {
                    debug!(handle, id = %connection.id(), "new incoming connection");
                    self.stats.accepted += 1;
                }
                Err(e) => {
                    warn!(handle, error = %e, "connection rejected");
                    self.transport.close(handle);
                    self.stats.rejected += 1;
                }
            },
            Err(e) if is_transient(&e) => trace!(listener, "no pending connection"),
            Err(e) if is_transient_accept(&e) => {
                if mem::replace(&mut self.accept_failing, true) {
                    trace!(listener, error = %e, "accept deferred");
                } else {
                    warn!(listener, error = %e, "accept deferred");
                }

                // The listener stays readable while descriptors are short;
                // only an eviction can free one.
                if is_descriptor_exhaustion(&e) && !self.pool.is_empty() {
                    debug!(listener, "listener paused until a connection closes");
                    self.accept_paused = true;
                }
            }
            Err(e) => {
                error!(listener, error = %e, "listener failed, stopping");
                self.exit = Some(Exit::ListenerFailed(e));
                self.stop.request();
            }
        }
    }

    fn read(&mut self, handle: Handle) {
        trace!(handle, "descriptor is readable");

        match self.transport.read(handle, &mut self.buffer) {
            Ok(0) => {
                debug!(handle, "connection closed by peer");
                self.disconnect(handle);
            }
            Ok(n) => {
                debug!(handle, bytes = n, "bytes received");

                self.stats.bytes_in += n as u64;
                self.stats.chunks_relayed += 1;

                self.pool.touch(handle);
                let fanout = self.pool.broadcast(handle, &self.buffer[..n]);

                for (recipient, e) in fanout.rejected {
                    warn!(handle = recipient, error = %e, "dropping recipient");
                    self.disconnect(recipient);
                }
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => {
                debug!(handle, error = %e, "read failed");
                self.disconnect(handle);
            }
        }
    }

    fn flush(&mut self, handle: Handle) {
        match self.pool.drain(handle, &mut self.transport) {
            Ok(DrainStatus::Flushed) => trace!(handle, "outbound queue flushed"),
            Ok(DrainStatus::Pending) => trace!(handle, "outbound queue pending"),
            Err(RelayError::NotFound(_)) => {}
            Err(e) => {
                debug!(handle, error = %e, "write failed");
                self.disconnect(handle);
            }
        }
    }

    /// Evicts `handle` from the pool, then closes it.
    ///
    /// The queue is released and the handle leaves every interest set
    /// before the descriptor is closed. Unknown handles are ignored.
    fn disconnect(&mut self, handle: Handle) {
        match self.pool.evict(handle) {
            Ok(connection) => {
                drop(connection);
                self.transport.close(handle);
                self.stats.evicted += 1;

                if mem::take(&mut self.accept_paused) {
                    debug!(listener = self.pool.listener(), "listener resumed");
                }
            }
            Err(e) => trace!(handle, error = %e, "already evicted"),
        }
    }

    fn teardown(&mut self) {
        let handles = self.pool.teardown();
        let count = handles.len();

        for handle in handles {
            self.transport.close(handle);
            self.stats.evicted += 1;
        }

        info!(closed = count, "relay loop stopped");
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn is_descriptor_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EMFILE | libc::ENFILE))
}

/// Accept errors that leave the listener usable.
fn is_transient_accept(e: &io::Error) -> bool {
    if is_transient(e)
        || matches!(
            e.kind(),
            io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
        )
    {
        return true;
    }

    // Per-process/system descriptor and buffer exhaustion, plus network
    // errors Linux reports on the pending connection rather than the
    // listener.
    matches!(
        e.raw_os_error(),
        Some(
            libc::EMFILE
                | libc::ENFILE
                | libc::ENOBUFS
                | libc::ENOMEM
                | libc::EPROTO
                | libc::ENOPROTOOPT
                | libc::EHOSTDOWN
                | libc::ENETDOWN
                | libc::EHOSTUNREACH
                | libc::ENETUNREACH
        )
    )
}
