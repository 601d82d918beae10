//! Linux L2CAP sockets
//!
//! HID runs over two connection-oriented L2CAP channels. Neither std nor
//! nix know `AF_BLUETOOTH` addresses, so the socket is created through
//! libc and driven by tokio's [`AsyncFd`].

use std::fmt;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use nix::sys::socket::{self, Backlog};
use tokio::io::unix::AsyncFd;
use tracing::debug;

const BTPROTO_L2CAP: libc::c_int = 0;

/// Bluetooth device address
///
/// Stored in the kernel's little-endian byte order, displayed most
/// significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub const ANY: BdAddr = BdAddr([0; 6]);
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// `struct sockaddr_l2` from `<bluetooth/l2cap.h>`
#[repr(C)]
#[derive(Clone, Copy)]
struct SockaddrL2 {
    l2_family: libc::sa_family_t,
    l2_psm: u16,
    l2_bdaddr: [u8; 6],
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

impl SockaddrL2 {
    fn new(psm: u16, addr: BdAddr) -> Self {
        Self {
            l2_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            l2_psm: psm.to_le(),
            l2_bdaddr: addr.0,
            l2_cid: 0,
            l2_bdaddr_type: 0,
        }
    }

    fn zeroed() -> Self {
        Self::new(0, BdAddr::ANY)
    }
}

fn new_socket() -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_SEQPACKET | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            BTPROTO_L2CAP,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn register(fd: OwnedFd) -> io::Result<AsyncFd<OwnedFd>> {
    // SAFETY: `OwnedFd` keeps the descriptor open and returns the same one
    // from `as_raw_fd` until the `AsyncFd` drops it
    Ok(unsafe { AsyncFd::register(fd) }?)
}

/// Listening L2CAP socket bound to one PSM on any local adapter
pub struct L2capListener {
    fd: AsyncFd<OwnedFd>,
    psm: u16,
}

impl L2capListener {
    /// Bind and listen with a backlog of one; must run inside a tokio runtime
    pub fn bind(psm: u16) -> io::Result<Self> {
        let fd = new_socket()?;
        let addr = SockaddrL2::new(psm, BdAddr::ANY);
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const SockaddrL2 as *const libc::sockaddr,
                mem::size_of::<SockaddrL2>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let backlog = Backlog::new(1).map_err(io::Error::from)?;
        socket::listen(&fd, backlog).map_err(io::Error::from)?;
        debug!("L2CAP listening on PSM 0x{:04x}", psm);

        Ok(Self {
            fd: register(fd)?,
            psm,
        })
    }

    pub fn psm(&self) -> u16 {
        self.psm
    }

    /// Accept the next connection
    pub async fn accept(&self) -> io::Result<L2capStream> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| accept_raw(inner.get_ref())) {
                Ok(result) => {
                    let (fd, peer) = result?;
                    return Ok(L2capStream {
                        fd: register(fd)?,
                        peer,
                    });
                }
                Err(_would_block) => continue,
            }
        }
    }
}

fn accept_raw(listener: &OwnedFd) -> io::Result<(OwnedFd, BdAddr)> {
    let mut addr = SockaddrL2::zeroed();
    let mut len = mem::size_of::<SockaddrL2>() as libc::socklen_t;
    let fd = unsafe {
        libc::accept4(
            listener.as_raw_fd(),
            &mut addr as *mut SockaddrL2 as *mut libc::sockaddr,
            &mut len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((unsafe { OwnedFd::from_raw_fd(fd) }, BdAddr(addr.l2_bdaddr)))
}

/// Connected L2CAP channel
pub struct L2capStream {
    fd: AsyncFd<OwnedFd>,
    peer: BdAddr,
}

impl L2capStream {
    pub fn peer_addr(&self) -> BdAddr {
        self.peer
    }

    /// Send one packet; a closed peer surfaces as `EPIPE` rather than SIGPIPE
    pub async fn send(&self, data: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| {
                let n = unsafe {
                    libc::send(
                        inner.as_raw_fd(),
                        data.as_ptr() as *const libc::c_void,
                        data.len(),
                        libc::MSG_NOSIGNAL,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bdaddr_display() {
        let addr = BdAddr([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(BdAddr::ANY.to_string(), "00:00:00:00:00:00");
    }

    #[tokio::test]
    async fn test_stream_send_over_registered_fd() {
        use std::io::Read;
        use std::os::unix::net::UnixStream;

        let (local, mut remote) = UnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        let stream = L2capStream {
            fd: register(OwnedFd::from(local)).unwrap(),
            peer: BdAddr([1, 2, 3, 4, 5, 6]),
        };

        assert_eq!(stream.send(&[0xA1, 0x01, 0x05]).await.unwrap(), 3);
        let mut buf = [0u8; 3];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xA1, 0x01, 0x05]);
        assert_eq!(stream.peer_addr().to_string(), "06:05:04:03:02:01");

        drop(remote);
        assert!(stream.send(&[0xA1]).await.is_err());
    }

    #[test]
    fn test_sockaddr_psm_little_endian() {
        let addr = SockaddrL2::new(0x0013, BdAddr::ANY);
        assert_eq!(u16::from_le(addr.l2_psm), 19);
        assert_eq!(addr.l2_family, libc::AF_BLUETOOTH as libc::sa_family_t);
    }
}
