//! Socket plumbing around the relay core.
//!
//! The core never touches sockets directly; it goes through the
//! [`Transport`] trait. [`SocketTransport`] implements it over raw,
//! non-blocking descriptors, and [`TcpListener`] bootstraps the listening
//! socket the event loop accepts from.

mod tcp;

pub use tcp::listener::TcpListener;
pub use tcp::transport::SocketTransport;

use crate::Handle;

use std::io;

/// Non-blocking byte transport over connected handles.
///
/// Short reads and writes are the normal case, not errors. Operations
/// that cannot make progress return [`io::ErrorKind::WouldBlock`].
pub trait Transport {
    /// Accepts one pending connection from `listener`.
    fn accept(&mut self, listener: Handle) -> io::Result<Handle>;

    /// Reads up to `buffer.len()` bytes. `Ok(0)` means the peer closed.
    fn read(&mut self, handle: Handle, buffer: &mut [u8]) -> io::Result<usize>;

    /// Writes a prefix of `buffer` and returns its length.
    fn write(&mut self, handle: Handle, buffer: &[u8]) -> io::Result<usize>;

    /// Releases `handle`. Called exactly once per accepted handle.
    fn close(&mut self, handle: Handle);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn accept(&mut self, listener: Handle) -> io::Result<Handle> {
        (**self).accept(listener)
    }

    fn read(&mut self, handle: Handle, buffer: &mut [u8]) -> io::Result<usize> {
        (**self).read(handle, buffer)
    }

    fn write(&mut self, handle: Handle, buffer: &[u8]) -> io::Result<usize> {
        (**self).write(handle, buffer)
    }

    fn close(&mut self, handle: Handle) {
        (**self).close(handle)
    }
}
