//! `poll(2)` backend.

use super::{InterestSets, Readiness};
use crate::reactor::event::{self, Event};

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, poll, pollfd};
use std::io;

/// Readiness wait built on `poll(2)`.
///
/// The descriptor array is rebuilt from the interest sets on every wait;
/// only its allocation is reused.
#[derive(Debug, Default)]
pub struct PollPoller {
    fds: Vec<pollfd>,
}

impl PollPoller {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Readiness for PollPoller {
    fn wait(&mut self, sets: &InterestSets, ready: &mut Vec<Event>) -> io::Result<()> {
        ready.clear();
        self.fds.clear();

        for (handle, interest) in sets.iter() {
            let mut events = 0;

            if interest.read {
                events |= POLLIN;
            }
            if interest.write {
                events |= POLLOUT;
            }

            self.fds.push(pollfd {
                fd: handle,
                events,
                revents: 0,
            });
        }

        let n = unsafe { poll(self.fds.as_mut_ptr(), self.fds.len() as nfds_t, -1) };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for fd in self.fds.iter().filter(|fd| fd.revents != 0) {
            let interest = sets.interest(fd.fd);

            // Hang-ups and errors surface through the next read or write.
            let readable = interest.read && fd.revents & (POLLIN | POLLHUP | POLLERR | POLLNVAL) != 0;
            let writable = interest.write && fd.revents & (POLLOUT | POLLERR | POLLNVAL) != 0;

            event::merge(ready, fd.fd, readable, writable);
        }

        Ok(())
    }
}
