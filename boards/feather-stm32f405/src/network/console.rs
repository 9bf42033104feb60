#![deny(unsafe_code)]
//! UDP command console
//!
//! Parked until the activation gate releases it, then answers one-line
//! commands, one datagram per reply:
//!
//! ```text
//! $ echo stats | nc -u -w1 <node> 5001
//! ```

use core::fmt::Write as _;

use defmt::{error, info, warn};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::Stack;
use embassy_time::Instant;
use hal_abstractions::WallClock;
use heapless::String;
use node_core::CalendarTime;

use crate::ramdisk::RamVolume;
use crate::stats;
use crate::time::{is_time_synced, RtcClock};

use super::launch::CONSOLE_START;

const REQUEST_LEN: usize = 64;
const REPLY_LEN: usize = 512;

const HELP: &str = "commands:\r\n\
  help    this text\r\n\
  ip      interface address\r\n\
  time    RTC time (UTC)\r\n\
  uptime  seconds since boot\r\n\
  stats   logger and publisher counters\r\n\
  files   RAM volume listing\r\n";

type Reply = String<REPLY_LEN>;

/// Serve the console forever once released
pub async fn run(stack: Stack<'static>, volume: RamVolume) -> ! {
    let config = CONSOLE_START.wait().await;
    info!(
        "console starting on UDP port {} ({} byte stack, priority {})",
        config.port, config.stack_size, config.priority
    );

    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; 256];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; 2 * REPLY_LEN];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(e) = socket.bind(config.port) {
        error!("console bind on port {} failed: {:?}", config.port, e);
        loop {
            core::future::pending::<()>().await;
        }
    }

    let mut request = [0u8; REQUEST_LEN];
    loop {
        let (n, meta) = match socket.recv_from(&mut request).await {
            Ok(received) => received,
            Err(e) => {
                warn!("console receive failed: {:?}", e);
                continue;
            }
        };
        let command = core::str::from_utf8(&request[..n]).unwrap_or("").trim();
        let reply = execute(command, stack, &volume);
        if let Err(e) = socket.send_to(reply.as_bytes(), meta.endpoint).await {
            warn!("console reply dropped: {:?}", e);
        }
    }
}

fn execute(command: &str, stack: Stack<'static>, volume: &RamVolume) -> Reply {
    let mut reply = Reply::new();
    // A full reply is truncated, not an error
    let _ = match command {
        "help" | "" => reply.push_str(HELP).map_err(|_| core::fmt::Error),
        "ip" => write_ip(&mut reply, stack),
        "time" => write_time(&mut reply),
        "uptime" => write!(reply, "{} s\r\n", Instant::now().as_secs()),
        "stats" => write_stats(&mut reply),
        "files" => write_files(&mut reply, volume),
        other => write!(reply, "unknown command '{}', try help\r\n", other),
    };
    reply
}

fn write_ip(reply: &mut Reply, stack: Stack<'static>) -> core::fmt::Result {
    match stack.config_v4() {
        Some(config) => {
            write!(reply, "address {}\r\n", config.address)?;
            if let Some(gateway) = config.gateway {
                write!(reply, "gateway {}\r\n", gateway)?;
            }
            Ok(())
        }
        None => reply.write_str("no address\r\n"),
    }
}

fn write_time(reply: &mut Reply) -> core::fmt::Result {
    if !is_time_synced() {
        return reply.write_str("not synchronized\r\n");
    }
    let now = RtcClock.now();
    let t = CalendarTime::from_unix(now);
    write!(
        reply,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC ({})\r\n",
        t.year, t.month, t.day, t.hour, t.minute, t.second, now
    )
}

fn write_stats(reply: &mut Reply) -> core::fmt::Result {
    match stats::logger() {
        Some(s) => write!(
            reply,
            "logger: {} cycles, {} records, {} invalid, failures open {} write {} close {}\r\n",
            s.cycles, s.records, s.invalid, s.open_failures, s.write_failures, s.close_failures
        )?,
        None => reply.write_str("logger: no cycle yet\r\n")?,
    }
    match stats::publisher() {
        Some(s) => write!(
            reply,
            "publisher: {} sent, {} offline polls, {} send failures, {} released, {} buffer timeouts\r\n",
            s.sent, s.offline_polls, s.send_failures, s.released_buffers, s.buffer_timeouts
        ),
        None => reply.write_str("publisher: no cycle yet\r\n"),
    }
}

fn write_files(reply: &mut Reply, volume: &RamVolume) -> core::fmt::Result {
    let mut listing = Ok(());
    let walked = volume.for_each_file(|name, len| {
        if listing.is_ok() {
            listing = write!(reply, "{:>6}  {}\r\n", len, name);
        }
    });
    listing?;
    match (walked, volume.usage()) {
        (Ok(()), Ok((used, total))) => write!(reply, "{}/{} sectors used\r\n", used, total),
        _ => reply.write_str("volume not mounted\r\n"),
    }
}
