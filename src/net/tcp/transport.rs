use crate::Handle;
use crate::net::Transport;
use crate::reactor::poller::unix::{sys_accept, sys_close, sys_read, sys_send};

use std::io;

/// [`Transport`] over raw non-blocking socket descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketTransport;

impl SocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for SocketTransport {
    fn accept(&mut self, listener: Handle) -> io::Result<Handle> {
        sys_accept(listener)
    }

    fn read(&mut self, handle: Handle, buffer: &mut [u8]) -> io::Result<usize> {
        let n = sys_read(handle, buffer);
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn write(&mut self, handle: Handle, buffer: &[u8]) -> io::Result<usize> {
        let n = sys_send(handle, buffer);
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn close(&mut self, handle: Handle) {
        sys_close(handle);
    }
}
