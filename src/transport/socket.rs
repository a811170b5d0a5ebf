//! Unix domain stream socket transport.
//!
//! # Example
//!
//! ```ignore
//! use vnet_ipc_client::transport::{Transport, UnixTransport};
//!
//! let mut transport = UnixTransport::new();
//! let mut endpoint = transport.open()?;
//! transport.connect(&mut endpoint, "/var/run/switch.sock")?;
//! ```

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use passfd::FdPassingExt;

use super::{Endpoint, Transport};
use crate::error::{LinkError, Result};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SOCKET_TYPE: libc::c_int = libc::SOCK_STREAM | libc::SOCK_CLOEXEC;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SOCKET_TYPE: libc::c_int = libc::SOCK_STREAM;

/// Creates Unix stream endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixTransport;

impl UnixTransport {
    /// Create a new transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for UnixTransport {
    type Endpoint = UnixEndpoint;

    fn open(&mut self) -> Result<UnixEndpoint> {
        UnixEndpoint::open().map_err(LinkError::EndpointCreation)
    }

    fn connect(&mut self, endpoint: &mut UnixEndpoint, address: &str) -> Result<()> {
        endpoint.connect(address).map_err(|source| LinkError::Connect {
            address: address.to_string(),
            source,
        })
    }
}

/// One Unix stream socket. Shut down and closed on drop.
#[derive(Debug)]
pub struct UnixEndpoint {
    stream: UnixStream,
}

impl UnixEndpoint {
    /// Create an unconnected stream socket.
    pub fn open() -> io::Result<Self> {
        // SAFETY: plain syscall with constant arguments; the result is checked.
        let fd = unsafe { libc::socket(libc::AF_UNIX, SOCKET_TYPE, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the descriptor was just created and nothing else owns it.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            stream: UnixStream::from(owned),
        })
    }

    /// Connect to the socket at `path`.
    pub fn connect(&mut self, path: &str) -> io::Result<()> {
        // SAFETY: sockaddr_un is plain data; all-zero is a valid value.
        let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

        let bytes = path.as_bytes();
        if bytes.is_empty() || bytes.len() >= addr.sun_path.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid socket path length {}", bytes.len()),
            ));
        }
        if bytes.contains(&0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "socket path contains a nul byte",
            ));
        }
        for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }

        let path_offset =
            addr.sun_path.as_ptr() as usize - &addr as *const libc::sockaddr_un as usize;
        let len = (path_offset + bytes.len() + 1) as libc::socklen_t;

        // SAFETY: `addr` outlives the call and `len` covers only its
        // initialized prefix plus the terminating nul.
        let rc = unsafe {
            libc::connect(
                self.stream.as_raw_fd(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                len,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Endpoint for UnixEndpoint {
    fn send_fd(&mut self, fd: RawFd, carrier: &[u8]) -> io::Result<()> {
        self.stream.as_raw_fd().send_fd_with_payload(fd, carrier)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(nonblocking)
    }

    fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Read for UnixEndpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for UnixEndpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Drop for UnixEndpoint {
    fn drop(&mut self) {
        // Ignore errors: the socket may never have been connected.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
