//! `select(2)` backend.

use super::{InterestSets, Readiness};
use crate::Handle;
use crate::reactor::event::{self, Event};

use libc::{FD_ISSET, FD_SET, FD_SETSIZE, FD_ZERO, fd_set, select};
use std::{io, mem, ptr};

/// Readiness wait built on `select(2)`.
///
/// `nfds` is taken from [`InterestSets::max_handle`], so a stale upper
/// bound would silently stop watching the highest handles. Handles at or
/// above `FD_SETSIZE` cannot be represented and are rejected.
#[derive(Debug, Default)]
pub struct SelectPoller;

impl SelectPoller {
    pub fn new() -> Self {
        Self
    }
}

impl Readiness for SelectPoller {
    fn wait(&mut self, sets: &InterestSets, ready: &mut Vec<Event>) -> io::Result<()> {
        ready.clear();

        let mut read_set: fd_set = unsafe { mem::zeroed() };
        let mut write_set: fd_set = unsafe { mem::zeroed() };

        unsafe {
            FD_ZERO(&mut read_set);
            FD_ZERO(&mut write_set);
        }

        for (handle, interest) in sets.iter() {
            if handle < 0 || handle as usize >= FD_SETSIZE as usize {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("handle {handle} does not fit in an fd_set"),
                ));
            }

            debug_assert!(handle <= sets.max_handle(), "max handle is stale");

            unsafe {
                if interest.read {
                    FD_SET(handle, &mut read_set);
                }
                if interest.write {
                    FD_SET(handle, &mut write_set);
                }
            }
        }

        let n = unsafe {
            select(
                sets.max_handle() + 1,
                &mut read_set,
                &mut write_set,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for (handle, interest) in sets.iter() {
            let readable = interest.read && unsafe { FD_ISSET(handle, &read_set) };
            let writable = interest.write && unsafe { FD_ISSET(handle, &write_set) };

            event::merge(ready, handle, readable, writable);
        }

        Ok(())
    }

    fn max_supported_handle(&self) -> Option<Handle> {
        Some(FD_SETSIZE as Handle - 1)
    }
}
