//! Zero-timeout epoll wrapper for connect-completion readiness.
//!
//! Connections register writability interest tagged with their pool token;
//! each tick the engine collects whatever fired without ever blocking.

use std::io;
use std::os::fd::RawFd;

/// Thin epoll handle. Interest is writability-only and one-shot in usage:
/// the pool deregisters a socket as soon as its connect is confirmed.
#[derive(Debug)]
pub struct Poller {
    epoll_fd: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epoll_fd })
    }

    /// Register writability interest for `fd`, tagged with `token`.
    pub fn watch_writable(&self, fd: RawFd, token: u64) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLOUT as u32,
            u64: token,
        };
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Drop interest for `fd`.
    pub fn unwatch(&self, fd: RawFd) -> io::Result<()> {
        let rc =
            unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Collect the tokens of every watched fd with a pending event, without
    /// blocking. Error conditions (EPOLLERR/EPOLLHUP) surface here too; the
    /// caller distinguishes them by reading the socket's error status.
    pub fn ready_tokens(&self, max_events: usize) -> io::Result<Vec<u64>> {
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)];
        let n = unsafe {
            libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), events.len() as i32, 0)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            // A signal during the wait just means nothing fired yet.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        Ok(events[..n as usize].iter().map(|event| event.u64).collect())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::os::fd::AsRawFd;

    #[test]
    fn reports_writable_fd_with_its_token() {
        let poller = Poller::new().unwrap();
        // A fresh UDP socket has an empty send buffer, so it is writable
        // immediately and the zero-timeout wait picks it up first call.
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        poller.watch_writable(socket.as_raw_fd(), 42).unwrap();
        assert_eq!(poller.ready_tokens(8).unwrap(), vec![42]);
    }

    #[test]
    fn unwatch_stops_reporting() {
        let poller = Poller::new().unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        poller.watch_writable(socket.as_raw_fd(), 7).unwrap();
        poller.unwatch(socket.as_raw_fd()).unwrap();
        assert!(poller.ready_tokens(8).unwrap().is_empty());
    }

    #[test]
    fn unwatch_of_unregistered_fd_is_an_error() {
        let poller = Poller::new().unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        assert!(poller.unwatch(socket.as_raw_fd()).is_err());
    }
}
