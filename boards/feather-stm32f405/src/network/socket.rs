#![deny(unsafe_code)]
//! Listening TCP socket exposing `embedded-io-async` streams
//!
//! One connection at a time: `accept` waits for a client, the caller
//! reads and writes through the `Read`/`Write` impls, then `finish`
//! closes the connection and returns the socket to the closed state so
//! it can listen again.

use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration};
use embedded_io_async::{ErrorType, Read, Write};

use super::error::NetworkError;

/// How long a closing connection may take to drain
const LINGER: Duration = Duration::from_secs(1);

pub struct ListeningSocket<'a> {
    socket: TcpSocket<'a>,
    port: u16,
}

impl<'a> ListeningSocket<'a> {
    pub fn new(
        stack: Stack<'a>,
        port: u16,
        rx_buffer: &'a mut [u8],
        tx_buffer: &'a mut [u8],
        idle_timeout: Duration,
    ) -> Self {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(idle_timeout));
        Self { socket, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for a client to connect
    ///
    /// Cancel-safe: dropping the future leaves the socket listening, and
    /// the next call resumes on the same port.
    pub async fn accept(&mut self) -> Result<(), NetworkError> {
        self.socket
            .accept(self.port)
            .await
            .map_err(|_| NetworkError::SocketError)
    }

    /// Close the connection gracefully if the peer allows, then reset
    pub async fn finish(&mut self) {
        self.socket.close();
        let _ = with_timeout(LINGER, self.socket.flush()).await;
        self.socket.abort();
        let _ = with_timeout(LINGER, self.socket.flush()).await;
    }
}

impl ErrorType for ListeningSocket<'_> {
    type Error = NetworkError;
}

impl Read for ListeningSocket<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| NetworkError::SocketError)
    }
}

impl Write for ListeningSocket<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self.socket.write(buf).await {
            Ok(0) if !buf.is_empty() => Err(NetworkError::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(_) => Err(NetworkError::SocketError),
        }
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket
            .flush()
            .await
            .map_err(|_| NetworkError::SocketError)
    }
}
