//! Socket operations for the connection state machine: non-blocking
//! connect, zero-RTT fast-open priming, the unacked-bytes backpressure
//! probe, and flagged sends.

use std::io;
use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::fd::AsRawFd;

use socket2::{Domain, SockAddr, Socket, Type};

/// Resolve `host:port` to the first usable stream address.
pub fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}:{port}"),
        )
    })
}

/// Create a non-blocking stream socket for the address family of `addr`.
pub fn open_stream(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Issue a non-blocking connect. In-progress counts as success here;
/// completion (or failure) is observed later through the poller.
pub fn start_connect(socket: &Socket, addr: SocketAddr) -> io::Result<()> {
    match socket.connect(&SockAddr::from(addr)) {
        Ok(()) => Ok(()),
        Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Connect with an initial payload carried in the handshake (TCP fast-open).
/// Returns how many payload bytes the kernel accepted; falls back to a plain
/// connect when fast-open is unavailable.
pub fn fastopen_connect(socket: &Socket, addr: SocketAddr, payload: &[u8]) -> io::Result<usize> {
    let dest = SockAddr::from(addr);
    match socket.send_to_with_flags(payload, &dest, libc::MSG_FASTOPEN | libc::MSG_DONTWAIT) {
        Ok(sent) => Ok(sent),
        Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => Ok(0),
        Err(_) => {
            start_connect(socket, addr)?;
            Ok(0)
        }
    }
}

/// Bytes sent but not yet acknowledged by the peer, per `TCP_INFO`.
pub fn unacked_bytes(socket: &Socket) -> io::Result<u32> {
    let mut info: libc::tcp_info = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::tcp_info>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            socket.as_raw_fd(),
            libc::SOL_TCP,
            libc::TCP_INFO,
            &mut info as *mut libc::tcp_info as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(info.tcpi_unacked)
}

/// Non-blocking send that never raises SIGPIPE.
pub fn send_chunk(socket: &Socket, chunk: &[u8]) -> io::Result<usize> {
    socket.send_with_flags(chunk, libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL)
}
