#![deny(unsafe_code)]
//! Read-only HTTP/1.0 file server over the RAM volume
//!
//! Serves `GET` and `HEAD` for files under the configured root; `/` and
//! paths ending in `/` map to `index.html`. One connection is handled at
//! a time and every response closes it, so no `Content-Length` is sent.
//! FTP entries in the server table are reported and skipped.

use core::fmt::Write as _;

use defmt::{debug, info, warn, Format};
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration};
use embedded_io::Read as _;
use embedded_io_async::{Read as _, Write as _};
use hal_abstractions::{
    OpenMode, ServerEntry, ServerHost, ServerKind, ServiceError, StorageError, Volume,
};
use heapless::String;
use node_core::seed::MAX_PATH;
use static_cell::StaticCell;

use crate::ramdisk::RamVolume;

use super::error::NetworkError;
use super::launch;
use super::socket::ListeningSocket;

const REQUEST_LEN: usize = 256;
const CHUNK_LEN: usize = 256;
const RX_LEN: usize = 512;
const TX_LEN: usize = 1024;
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
enum Method {
    Get,
    Head,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalError,
}

impl Status {
    fn line(self) -> &'static str {
        match self {
            Self::Ok => "200 OK",
            Self::BadRequest => "400 Bad Request",
            Self::NotFound => "404 Not Found",
            Self::MethodNotAllowed => "405 Method Not Allowed",
            Self::InternalError => "500 Internal Server Error",
        }
    }
}

/// Parse `METHOD target HTTP/x.y`
fn parse_request_line(line: &[u8]) -> Result<(Method, &str), Status> {
    let line = core::str::from_utf8(line).map_err(|_| Status::BadRequest)?;
    let mut parts = line.trim_end().split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Status::BadRequest);
    };
    if !version.starts_with("HTTP/1.") || !target.starts_with('/') {
        return Err(Status::BadRequest);
    }
    let method = match method {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        _ => return Err(Status::MethodNotAllowed),
    };
    Ok((method, target))
}

/// Map a request target onto a volume path below `root`
fn resolve(root: &str, target: &str) -> Result<String<MAX_PATH>, Status> {
    let target = target.split(['?', '#']).next().unwrap_or_default();
    if target.split('/').any(|segment| segment == "..") {
        return Err(Status::BadRequest);
    }

    let mut path = String::new();
    path.push_str(root)
        .and_then(|_| path.push_str(target))
        .map_err(|_| Status::NotFound)?;
    if target.ends_with('/') {
        path.push_str("index.html").map_err(|_| Status::NotFound)?;
    }
    Ok(path)
}

fn content_type(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") | Some("htm") => "text/html",
        Some("txt") | Some("csv") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Read until the end of the request line
async fn read_request_line<'b>(
    socket: &mut ListeningSocket<'_>,
    buf: &'b mut [u8],
) -> Result<&'b [u8], NetworkError> {
    let mut len = 0;
    loop {
        if let Some(end) = buf[..len].iter().position(|&b| b == b'\n') {
            return Ok(&buf[..end]);
        }
        if len == buf.len() {
            return Err(NetworkError::InvalidResponse);
        }
        match socket.read(&mut buf[len..]).await? {
            0 => return Err(NetworkError::ConnectionClosed),
            n => len += n,
        }
    }
}

async fn send_head(
    socket: &mut ListeningSocket<'_>,
    status: Status,
    content_type: &str,
) -> Result<(), NetworkError> {
    let mut head: String<128> = String::new();
    write!(
        head,
        "HTTP/1.0 {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        status.line(),
        content_type
    )
    .map_err(|_| NetworkError::InvalidResponse)?;
    socket.write_all(head.as_bytes()).await
}

async fn send_status(socket: &mut ListeningSocket<'_>, status: Status) -> Result<(), NetworkError> {
    send_head(socket, status, "text/plain").await?;
    socket.write_all(status.line().as_bytes()).await?;
    socket.write_all(b"\r\n").await
}

async fn send_file(
    socket: &mut ListeningSocket<'_>,
    file: &mut <RamVolume as Volume>::File,
) -> Result<(), NetworkError> {
    let mut chunk = [0u8; CHUNK_LEN];
    loop {
        let n = file.read(&mut chunk).map_err(|e| {
            warn!("HTTP file read failed: {}", e);
            NetworkError::SocketError
        })?;
        if n == 0 {
            return Ok(());
        }
        socket.write_all(&chunk[..n]).await?;
    }
}

/// HTTP server bound to one [`ServerEntry`]
pub struct HttpServer {
    socket: ListeningSocket<'static>,
    root: &'static str,
    served: u32,
}

impl HttpServer {
    fn new(stack: Stack<'static>, entry: &ServerEntry) -> Result<Self, ServiceError> {
        static BUFFERS: StaticCell<([u8; RX_LEN], [u8; TX_LEN])> = StaticCell::new();
        let (rx, tx) = BUFFERS
            .try_init(([0; RX_LEN], [0; TX_LEN]))
            .ok_or(ServiceError::ListenFailed)?;
        Ok(Self {
            socket: ListeningSocket::new(stack, entry.port, rx, tx, IDLE_TIMEOUT),
            root: entry.root,
            served: 0,
        })
    }

    async fn serve(&mut self, volume: &RamVolume) {
        let mut request = [0u8; REQUEST_LEN];
        let result = match read_request_line(&mut self.socket, &mut request).await {
            Ok(line) => respond(&mut self.socket, volume, self.root, line).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(status) => {
                self.served += 1;
                debug!("HTTP {} (request {})", status, self.served);
            }
            Err(e) => warn!("HTTP request on port {} failed: {}", self.socket.port(), e),
        }
        self.socket.finish().await;
    }
}

async fn respond(
    socket: &mut ListeningSocket<'_>,
    volume: &RamVolume,
    root: &str,
    line: &[u8],
) -> Result<Status, NetworkError> {
    let (method, target) = match parse_request_line(line) {
        Ok(request) => request,
        Err(status) => return send_status(socket, status).await.map(|_| status),
    };
    let path = match resolve(root, target) {
        Ok(path) => path,
        Err(status) => return send_status(socket, status).await.map(|_| status),
    };

    let mut file = match volume.open(&path, OpenMode::Read) {
        Ok(file) => file,
        Err(StorageError::NotFound | StorageError::InvalidPath) => {
            return send_status(socket, Status::NotFound)
                .await
                .map(|_| Status::NotFound)
        }
        Err(e) => {
            warn!("HTTP open {} failed: {}", path.as_str(), e);
            return send_status(socket, Status::InternalError)
                .await
                .map(|_| Status::InternalError);
        }
    };

    let mut sent = send_head(socket, Status::Ok, content_type(&path)).await;
    if sent.is_ok() && method == Method::Get {
        sent = send_file(socket, &mut file).await;
    }
    if let Err(e) = volume.close(file) {
        warn!("HTTP close {} failed: {}", path.as_str(), e);
    }
    sent.map(|_| Status::Ok)
}

/// The servers this board can run
pub struct NodeServers {
    http: HttpServer,
}

/// [`ServerHost`] over embassy-net and the RAM volume
pub struct NodeServerHost {
    stack: Stack<'static>,
    volume: RamVolume,
}

impl NodeServerHost {
    pub fn new(stack: Stack<'static>, volume: RamVolume) -> Self {
        Self { stack, volume }
    }
}

impl ServerHost for NodeServerHost {
    type Server = NodeServers;

    fn start_time_sync(&mut self) -> Result<(), ServiceError> {
        launch::start_time_sync()?;
        info!("SNTP client released");
        Ok(())
    }

    fn create_server(&mut self, config: &[ServerEntry]) -> Result<NodeServers, ServiceError> {
        let mut http: Option<HttpServer> = None;
        for entry in config {
            match entry.kind {
                ServerKind::Http if http.is_none() => {
                    http = Some(HttpServer::new(self.stack, entry)?);
                    info!(
                        "HTTP server on port {} serving {} (backlog {} requested, 1 served)",
                        entry.port, entry.root, entry.backlog
                    );
                }
                ServerKind::Http => warn!("extra HTTP server on port {} skipped", entry.port),
                ServerKind::Ftp => warn!(
                    "FTP server on port {} not supported on this board, skipped",
                    entry.port
                ),
            }
        }
        http.map(|http| NodeServers { http })
            .ok_or(ServiceError::NoUsableServer)
    }

    async fn do_server_work(&mut self, server: &mut NodeServers, max_wait_ms: u32) {
        let http = &mut server.http;
        match with_timeout(
            Duration::from_millis(max_wait_ms.into()),
            http.socket.accept(),
        )
        .await
        {
            // Nothing pending within the wait
            Err(_) => {}
            Ok(Err(e)) => warn!("HTTP accept failed: {}", e),
            Ok(Ok(())) => http.serve(&self.volume).await,
        }
    }
}
