//! Datagram network stack abstraction
//!
//! Two transmission disciplines are exposed:
//!
//! - **copy**: [`DatagramStack::send_copy`] duplicates the payload into a
//!   stack-owned buffer; the caller's buffer is reusable as soon as the
//!   call returns, whatever the outcome.
//! - **handoff**: the caller borrows a stack-owned buffer with
//!   [`DatagramStack::acquire_send_buffer`], writes into it and passes it
//!   to [`DatagramStack::send_handoff`]. Ownership follows the buffer value:
//!   on success the stack keeps it, on failure it comes back in `Err` and
//!   the caller must hand it to [`DatagramStack::release_send_buffer`].

use core::future::Future;
use core::net::{Ipv4Addr, SocketAddrV4};

/// Link-state events delivered by the network stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkEvent {
    /// Interface configured and an address assigned
    Up,
    /// Interface lost its configuration
    Down,
}

/// Network collaborator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetError {
    /// No datagram socket could be created
    SocketUnavailable,
    /// Socket could not be bound to a local port
    BindFailed,
}

impl core::fmt::Display for NetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SocketUnavailable => write!(f, "no datagram socket available"),
            Self::BindFailed => write!(f, "socket bind failed"),
        }
    }
}

impl core::error::Error for NetError {}

/// UDP/IP stack as seen by the telemetry publisher
pub trait DatagramStack {
    /// Open datagram socket
    type Socket;
    /// Stack-owned transmit buffer used by the handoff discipline
    type Buffer: AsMut<[u8]>;

    /// Create an unbound IPv4 datagram socket
    fn open_socket(&mut self) -> Result<Self::Socket, NetError>;

    /// Address currently assigned to the interface, `None` while unassigned
    fn assigned_address(&self) -> Option<Ipv4Addr>;

    /// Send a copy of `payload` to `dest`
    ///
    /// Returns the number of bytes accepted; zero means the datagram was
    /// dropped.
    fn send_copy(
        &mut self,
        socket: &mut Self::Socket,
        payload: &[u8],
        dest: SocketAddrV4,
    ) -> impl Future<Output = usize>;

    /// Borrow a transmit buffer of at least `len` bytes
    ///
    /// Waits at most `max_wait_ms` for one to become free.
    fn acquire_send_buffer(
        &mut self,
        len: usize,
        max_wait_ms: u32,
    ) -> impl Future<Output = Option<Self::Buffer>>;

    /// Send the first `len` bytes of `buffer` to `dest` without copying
    ///
    /// `Ok(n)` (with `n > 0`) means the stack took ownership of `buffer`.
    /// A send that accepts zero bytes returns the buffer in `Err`.
    fn send_handoff(
        &mut self,
        socket: &mut Self::Socket,
        buffer: Self::Buffer,
        len: usize,
        dest: SocketAddrV4,
    ) -> impl Future<Output = Result<usize, Self::Buffer>>;

    /// Return a buffer that was not consumed by a send
    fn release_send_buffer(&mut self, buffer: Self::Buffer);
}
