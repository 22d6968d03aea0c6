//! Thin wrappers over the libc raw CAN socket calls, adapted from [socketcan](https://crates.io/crates/socketcan)

use std::{ffi::CString, fmt, io, mem, os::{fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd}, raw::{c_int, c_void}}};
use libc::{bind, if_nametoindex, read, sa_family_t, sockaddr, sockaddr_can, socket, socklen_t, write, AF_CAN, CAN_RAW, PF_CAN, SOCK_CLOEXEC, SOCK_RAW};
use can_core::error::SessionError;

/// A datagram-like socket that carries one CAN wire frame per read/write.
pub trait RawSocket: AsFd + Send {
    /// Write one frame, returning the bytes actually written.
    fn write_frame(&self, buf: &[u8]) -> io::Result<usize>;
    /// Read at most one frame, returning the bytes actually read.
    fn read_frame(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens sockets bound to a named interface.
pub trait SocketFactory: Send + Sync {
    type Socket: RawSocket;

    fn open(&self, iface: &str) -> Result<Self::Socket, SessionError>;
}

/// Allocate a CAN_RAW socket. The descriptor is closed when dropped.
pub fn raw_open_socket() -> io::Result<OwnedFd> {
    let fd = unsafe { socket(PF_CAN, SOCK_RAW | SOCK_CLOEXEC, CAN_RAW) };

    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind a socket to the interface in `addr`.
pub fn raw_bind_socket(fd: BorrowedFd<'_>, addr: &CanAddr) -> io::Result<()> {
    let ret = unsafe { bind(fd.as_raw_fd(), addr.as_sockaddr_ptr(), CanAddr::len() as socklen_t) };

    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

// Write a single frame image to the socket, fd.
pub fn raw_write_frame(fd: BorrowedFd<'_>, buf: &[u8]) -> io::Result<usize> {
    let ret = unsafe { write(fd.as_raw_fd(), buf.as_ptr().cast::<c_void>(), buf.len()) };

    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

// Read a single frame image from the socket, fd.
pub fn raw_read_frame(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { read(fd.as_raw_fd(), buf.as_mut_ptr().cast::<c_void>(), buf.len()) };

    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// CAN socket address.
///
/// This is the address for use with CAN sockets. It is simply an address to
/// the SocketCAN host interface. It can be created by looking up the name
/// of the interface, like "can0", "vcan0", etc, or an interface index can
/// be specified directly, if known.
///
/// This is based on, and compatible with, the `sockaddr_can` struct from
/// libc.
/// [ref](https://docs.rs/libc/latest/libc/struct.sockaddr_can.html)
#[derive(Clone, Copy)]
pub struct CanAddr(sockaddr_can);

impl CanAddr {
    /// Creates a new CAN socket address for the specified interface by index.
    pub fn new(ifindex: u32) -> Self {
        let mut addr = Self::default();
        addr.0.can_ifindex = ifindex as c_int;
        addr
    }

    /// Try to create an address from an interface name.
    pub fn from_iface(ifname: &str) -> io::Result<Self> {
        let ifname = CString::new(ifname)?;
        let ifindex = unsafe { if_nametoindex(ifname.as_ptr()) };
        if ifindex == 0 {
            Err(io::Error::last_os_error())
        }
        else {
            Ok(Self::new(ifindex))
        }
    }

    #[inline]
    pub fn ifindex(&self) -> u32 {
        self.0.can_ifindex as u32
    }

    /// Gets the address of the structure as a `sockaddr` pointer.
    pub fn as_sockaddr_ptr(&self) -> *const sockaddr {
        (&self.0 as *const sockaddr_can).cast()
    }

    /// Gets the size of the address structure.
    pub fn len() -> usize {
        mem::size_of::<sockaddr_can>()
    }
}

impl Default for CanAddr {
    fn default() -> Self {
        let mut addr: sockaddr_can = unsafe { mem::zeroed() };
        addr.can_family = AF_CAN as sa_family_t;
        Self(addr)
    }
}

impl fmt::Debug for CanAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CanAddr {{ can_family: {}, can_ifindex: {} }}",
            self.0.can_family, self.0.can_ifindex
        )
    }
}

/// A bound CAN_RAW socket.
#[derive(Debug)]
pub struct CanRawSocket {
    fd: OwnedFd,
    ifindex: u32,
}

impl CanRawSocket {
    #[inline]
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }
}

impl AsFd for CanRawSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl RawSocket for CanRawSocket {
    #[inline]
    fn write_frame(&self, buf: &[u8]) -> io::Result<usize> {
        raw_write_frame(self.fd.as_fd(), buf)
    }

    #[inline]
    fn read_frame(&self, buf: &mut [u8]) -> io::Result<usize> {
        raw_read_frame(self.fd.as_fd(), buf)
    }
}

/// Opens real SocketCAN sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketCanFactory;

impl SocketFactory for SocketCanFactory {
    type Socket = CanRawSocket;

    fn open(&self, iface: &str) -> Result<Self::Socket, SessionError> {
        let fd = raw_open_socket()
            .map_err(|e| SessionError::os_failure(format!("socket() failed: {}", e)))?;
        // `fd` is dropped on every early return below
        let addr = CanAddr::from_iface(iface)
            .map_err(|e| SessionError::os_failure(format!("interface index of {} failed: {}", iface, e)))?;
        raw_bind_socket(fd.as_fd(), &addr)
            .map_err(|e| SessionError::os_failure(format!("bind failed: {}", e)))?;

        log::debug!("CAN-PANEL - socket bound to {} ({:?})", iface, addr);
        Ok(CanRawSocket { fd, ifindex: addr.ifindex() })
    }
}
