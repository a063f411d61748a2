//! Cooperative shutdown.
//!
//! A [`StopToken`] is a shared flag the event loop checks once per
//! iteration. Requesting a stop also wakes a blocked readiness wait
//! through a self-pipe, so the loop notices without waiting for I/O.

use super::poller::Waker;
use crate::Handle;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug)]
struct Inner {
    requested: AtomicBool,
    waker: Waker,
}

/// Shared, cloneable stop flag.
#[derive(Debug, Clone)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl StopToken {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                waker: Waker::new()?,
            }),
        })
    }

    /// Asks the loop to stop after its current iteration.
    ///
    /// Async-signal-safe: an atomic store and a single `write(2)`.
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::Release);
        self.inner.waker.wake();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Read end of the wake pipe.
    pub(crate) fn wake_handle(&self) -> Handle {
        self.inner.waker.handle()
    }

    pub(crate) fn reset_wakeups(&self) {
        self.inner.waker.reset();
    }
}

/// Token the signal handler forwards to.
static SIGNAL_TOKEN: OnceLock<StopToken> = OnceLock::new();

extern "C" fn on_signal(_signal: libc::c_int) {
    if let Some(token) = SIGNAL_TOKEN.get() {
        token.request();
    }
}

/// Routes `SIGINT` and `SIGTERM` to `token` and ignores `SIGPIPE`.
///
/// Only the first installed token receives signals; later calls keep the
/// original one.
pub fn install_signal_handlers(token: &StopToken) -> io::Result<()> {
    let _ = SIGNAL_TOKEN.set(token.clone());

    for signal in [libc::SIGINT, libc::SIGTERM] {
        set_handler(
            signal,
            on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
        )?;
    }

    set_handler(libc::SIGPIPE, libc::SIG_IGN)
}

fn set_handler(signal: libc::c_int, handler: libc::sighandler_t) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(signal, &action, std::ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}
