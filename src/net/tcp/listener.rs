use crate::Handle;
use crate::reactor::poller::unix::{
    domain_of, sys_bind, sys_close, sys_ipv6_is_necessary, sys_listen, sys_set_reuseaddr,
    sys_socket, sys_sockname,
};

use std::io;
use std::net::SocketAddr;

/// A non-blocking TCP listening socket.
///
/// The relay loop only borrows the raw handle; the listener itself stays
/// with the caller, which closes it on drop once the loop has returned.
#[derive(Debug)]
pub struct TcpListener {
    /// Descriptor of the listening socket.
    fd: Handle,
}

impl TcpListener {
    /// Binds a listener to `address` with the given accept backlog.
    ///
    /// This function:
    /// - creates a non-blocking socket,
    /// - enables `SO_REUSEADDR`,
    /// - configures IPv6 dual-stack if applicable,
    /// - binds and starts listening.
    pub fn bind(address: SocketAddr, backlog: i32) -> io::Result<Self> {
        let domain = domain_of(&address);
        let fd = sys_socket(domain)?;

        // Owning the descriptor first makes every early return close it.
        let listener = Self { fd };

        sys_set_reuseaddr(fd)?;
        sys_ipv6_is_necessary(fd, domain)?;
        sys_bind(fd, &address)?;
        sys_listen(fd, backlog)?;

        Ok(listener)
    }

    /// Returns the local socket address of this listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        sys_sockname(self.fd)
    }

    /// Raw handle handed to the event loop.
    pub fn handle(&self) -> Handle {
        self.fd
    }
}

impl Drop for TcpListener {
    /// Closes the listening socket.
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}
