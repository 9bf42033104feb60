#![deny(unsafe_code)]
//! Datagram stack for the telemetry publisher
//!
//! The copy discipline maps straight onto `UdpSocket::send_to`. embassy-net
//! always copies into the socket's transmit ring, so the handoff discipline
//! is modelled with a small pool of static buffers: the publisher borrows
//! one, fills it, and the stack takes it back once the datagram has been
//! queued. An exhausted pool makes `acquire_send_buffer` wait, bounded by
//! the caller's timeout.

use core::net::{Ipv4Addr, SocketAddrV4};

use defmt::{debug, warn};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{with_timeout, Duration};
use hal_abstractions::{DatagramStack, NetError};
use static_cell::StaticCell;

/// Size of one handoff buffer
pub const TX_BUFFER_LEN: usize = 64;
/// Number of handoff buffers
pub const TX_BUFFER_COUNT: usize = 2;

const RX_META: usize = 2;
const RX_LEN: usize = 64;
const TX_META: usize = 8;
const TX_LEN: usize = 512;

/// Transmit buffer on loan from the [`TxPool`]
pub struct TxBuffer(&'static mut [u8; TX_BUFFER_LEN]);

impl AsMut<[u8]> for TxBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self.0
    }
}

/// Free list of handoff buffers
pub struct TxPool {
    free: Channel<CriticalSectionRawMutex, TxBuffer, TX_BUFFER_COUNT>,
}

impl TxPool {
    pub const fn new() -> Self {
        Self {
            free: Channel::new(),
        }
    }

    /// Put the static buffers on the free list; only the first call fills it
    pub fn fill(&self) {
        static BUFFERS: StaticCell<[[u8; TX_BUFFER_LEN]; TX_BUFFER_COUNT]> = StaticCell::new();
        let Some(buffers) = BUFFERS.try_init([[0; TX_BUFFER_LEN]; TX_BUFFER_COUNT]) else {
            return;
        };
        for buffer in buffers.iter_mut() {
            self.recycle(TxBuffer(buffer));
        }
    }

    /// Buffers currently free
    pub fn available(&self) -> usize {
        self.free.len()
    }

    fn recycle(&self, buffer: TxBuffer) {
        // Capacity equals the number of buffers in existence
        if self.free.try_send(buffer).is_err() {
            warn!("tx buffer pool overflow");
        }
    }
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new()
    }
}

struct SocketBuffers {
    rx_meta: [PacketMetadata; RX_META],
    rx: [u8; RX_LEN],
    tx_meta: [PacketMetadata; TX_META],
    tx: [u8; TX_LEN],
}

/// embassy-net seen through [`DatagramStack`]
pub struct NetStack {
    stack: Stack<'static>,
    pool: &'static TxPool,
}

impl NetStack {
    pub fn new(stack: Stack<'static>, pool: &'static TxPool) -> Self {
        pool.fill();
        Self { stack, pool }
    }
}

fn endpoint(dest: SocketAddrV4) -> IpEndpoint {
    IpEndpoint::new(IpAddress::Ipv4(*dest.ip()), dest.port())
}

impl DatagramStack for NetStack {
    type Socket = UdpSocket<'static>;
    type Buffer = TxBuffer;

    /// Only one publisher socket exists; a second call fails
    fn open_socket(&mut self) -> Result<UdpSocket<'static>, NetError> {
        static BUFFERS: StaticCell<SocketBuffers> = StaticCell::new();
        let SocketBuffers {
            rx_meta,
            rx,
            tx_meta,
            tx,
        } = BUFFERS
            .try_init(SocketBuffers {
                rx_meta: [PacketMetadata::EMPTY; RX_META],
                rx: [0; RX_LEN],
                tx_meta: [PacketMetadata::EMPTY; TX_META],
                tx: [0; TX_LEN],
            })
            .ok_or(NetError::SocketUnavailable)?;

        let mut socket = UdpSocket::new(self.stack, rx_meta, rx, tx_meta, tx);
        // Port 0 picks an ephemeral port
        socket.bind(0).map_err(|_| NetError::BindFailed)?;
        Ok(socket)
    }

    fn assigned_address(&self) -> Option<Ipv4Addr> {
        self.stack.config_v4().map(|config| config.address.address())
    }

    async fn send_copy(
        &mut self,
        socket: &mut UdpSocket<'static>,
        payload: &[u8],
        dest: SocketAddrV4,
    ) -> usize {
        match socket.send_to(payload, endpoint(dest)).await {
            Ok(()) => payload.len(),
            Err(e) => {
                debug!("send_to failed: {:?}", e);
                0
            }
        }
    }

    async fn acquire_send_buffer(&mut self, len: usize, max_wait_ms: u32) -> Option<TxBuffer> {
        if len > TX_BUFFER_LEN {
            warn!("handoff buffer of {} bytes requested, max {}", len, TX_BUFFER_LEN);
            return None;
        }
        with_timeout(
            Duration::from_millis(max_wait_ms.into()),
            self.pool.free.receive(),
        )
        .await
        .ok()
    }

    async fn send_handoff(
        &mut self,
        socket: &mut UdpSocket<'static>,
        buffer: TxBuffer,
        len: usize,
        dest: SocketAddrV4,
    ) -> Result<usize, TxBuffer> {
        let Some(payload) = buffer.0.get(..len).filter(|p| !p.is_empty()) else {
            return Err(buffer);
        };
        match socket.send_to(payload, endpoint(dest)).await {
            Ok(()) => {
                // Queued in the socket ring; the buffer is ours to reuse
                self.pool.recycle(buffer);
                Ok(len)
            }
            Err(e) => {
                debug!("send_to failed: {:?}", e);
                Err(buffer)
            }
        }
    }

    fn release_send_buffer(&mut self, buffer: TxBuffer) {
        self.pool.recycle(buffer);
    }
}
