//! Readiness wait backends.
//!
//! The event loop hands a backend the interest sets derived from the pool
//! and gets back the handles that became ready. Backends keep no
//! registration state between waits, so the sets are the only source of
//! truth for what is watched.
//!
//! Two backends are provided:
//! - [`PollPoller`], built on `poll(2)`, the default;
//! - [`SelectPoller`], built on `select(2)`, bounded by `FD_SETSIZE` and
//!   driven by the pool's maximum handle.

pub(crate) mod common;
mod poll;
mod select;

#[cfg(unix)]
pub(crate) mod unix;

pub use common::{Interest, InterestSets, Waker};
pub use poll::PollPoller;
pub use select::SelectPoller;

use crate::Handle;
use crate::reactor::event::Event;

use std::fmt;
use std::io;

/// Blocks until at least one watched handle is ready.
///
/// An interrupted wait returns `Ok(())` with `ready` empty; the caller
/// simply waits again. Any other error is fatal to the loop.
pub trait Readiness {
    /// Waits on `sets` and replaces the contents of `ready` with the
    /// handles that can be serviced without blocking.
    fn wait(&mut self, sets: &InterestSets, ready: &mut Vec<Event>) -> io::Result<()>;

    /// Largest handle this backend can wait on, `None` if unbounded.
    fn max_supported_handle(&self) -> Option<Handle> {
        None
    }
}

impl<R: Readiness + ?Sized> Readiness for Box<R> {
    fn wait(&mut self, sets: &InterestSets, ready: &mut Vec<Event>) -> io::Result<()> {
        (**self).wait(sets, ready)
    }

    fn max_supported_handle(&self) -> Option<Handle> {
        (**self).max_supported_handle()
    }
}

/// Which readiness primitive to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PollerKind {
    #[default]
    Poll,
    Select,
}

impl PollerKind {
    /// Creates the backend for this kind.
    pub fn build(self) -> Box<dyn Readiness> {
        match self {
            PollerKind::Poll => Box::new(PollPoller::new()),
            PollerKind::Select => Box::new(SelectPoller::new()),
        }
    }
}

impl fmt::Display for PollerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollerKind::Poll => f.write_str("poll"),
            PollerKind::Select => f.write_str("select"),
        }
    }
}
