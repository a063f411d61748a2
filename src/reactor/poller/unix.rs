use crate::Handle;

use libc::{
    AF_INET, AF_INET6, F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, IPPROTO_IPV6, IPV6_V6ONLY,
    O_NONBLOCK, SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET, accept, bind, c_int, close, fcntl,
    getsockname, listen, pipe, read, send, setsockopt, sockaddr, sockaddr_in, sockaddr_in6,
    sockaddr_storage, socket, socklen_t, write,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::{io, mem};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: c_int = 0;

/// Reads from a descriptor into `buffer`.
///
/// Returns the number of bytes read, or a negative value on error.
/// The descriptor **must** be non-blocking.
pub(crate) fn sys_read(fd: Handle, buffer: &mut [u8]) -> isize {
    unsafe { read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) }
}

/// Writes `buffer` to a descriptor.
///
/// Returns the number of bytes written, or a negative value on error.
/// Async-signal-safe.
pub(crate) fn sys_write(fd: Handle, buffer: &[u8]) -> isize {
    unsafe { write(fd, buffer.as_ptr() as *const _, buffer.len()) }
}

/// Sends `buffer` on a connected socket without raising `SIGPIPE` where
/// the platform allows it.
pub(crate) fn sys_send(fd: Handle, buffer: &[u8]) -> isize {
    unsafe { send(fd, buffer.as_ptr() as *const _, buffer.len(), SEND_FLAGS) }
}

/// Closes a descriptor.
pub(crate) fn sys_close(fd: Handle) {
    unsafe { close(fd) };
}

/// Sets a descriptor to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: Handle) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Marks a descriptor close-on-exec.
pub(crate) fn sys_set_cloexec(fd: Handle) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFD, flags | FD_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates a non-blocking pipe and returns `(reader, writer)`.
pub(crate) fn sys_pipe() -> io::Result<(Handle, Handle)> {
    let mut fds = [0 as c_int; 2];

    let rc = unsafe { pipe(fds.as_mut_ptr()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    for &fd in &fds {
        if let Err(e) = sys_set_nonblocking(fd).and_then(|()| sys_set_cloexec(fd)) {
            sys_close(fds[0]);
            sys_close(fds[1]);
            return Err(e);
        }
    }

    Ok((fds[0], fds[1]))
}

/// Creates a non-blocking stream socket.
pub(crate) fn sys_socket(domain: c_int) -> io::Result<Handle> {
    let fd = unsafe { socket(domain, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = sys_set_nonblocking(fd).and_then(|()| sys_set_cloexec(fd)) {
        sys_close(fd);
        return Err(e);
    }

    Ok(fd)
}

/// Binds a socket to an address.
pub(crate) fn sys_bind(fd: Handle, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);

    let rc = unsafe { bind(fd, &storage as *const _ as *const sockaddr, len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: Handle, backlog: c_int) -> io::Result<()> {
    let rc = unsafe { listen(fd, backlog) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Accepts one pending connection.
///
/// The returned socket is non-blocking and close-on-exec.
pub(crate) fn sys_accept(fd: Handle) -> io::Result<Handle> {
    let client = unsafe { accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
    if client < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = sys_set_nonblocking(client).and_then(|()| sys_set_cloexec(client)) {
        sys_close(client);
        return Err(e);
    }

    Ok(client)
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: Handle) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let rc = unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        sockaddr_storage_to_socketaddr(&storage)
    }
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: Handle) -> io::Result<()> {
    set_int_option(fd, SOL_SOCKET, SO_REUSEADDR, 1)
}

/// Lets an IPv6 listener accept IPv4-mapped peers as well.
pub(crate) fn sys_ipv6_is_necessary(fd: Handle, domain: c_int) -> io::Result<()> {
    if domain == AF_INET6 {
        set_int_option(fd, IPPROTO_IPV6, IPV6_V6ONLY, 0)?;
    }
    Ok(())
}

fn set_int_option(fd: Handle, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Address family for `addr`.
pub(crate) fn domain_of(addr: &SocketAddr) -> c_int {
    match addr {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    }
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
pub(crate) fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockaddr_conversion_keeps_ip_and_port() {
        let addr: SocketAddr = "127.0.0.1:4242".parse().unwrap();
        let (storage, _) = socketaddr_to_storage(&addr);

        assert_eq!(sockaddr_storage_to_socketaddr(&storage).unwrap(), addr);
    }

    #[test]
    fn test_pipe_is_non_blocking() {
        let (reader, writer) = sys_pipe().unwrap();
        let mut buffer = [0u8; 4];

        assert!(sys_read(reader, &mut buffer) < 0, "empty pipe must not block");
        assert_eq!(
            io::Error::last_os_error().kind(),
            io::ErrorKind::WouldBlock
        );

        sys_close(reader);
        sys_close(writer);
    }
}
