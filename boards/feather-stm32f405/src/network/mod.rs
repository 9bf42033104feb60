//! Network side of the node over W5500 + embassy-net
//!
//! - **`config`**: SNTP and stack configuration with `Default` impls
//! - **`console`**: UDP command console
//! - **`error`**: error enum for the network services
//! - **`http`**: read-only HTTP server, the board's `ServerHost`
//! - **`launch`**: start signals, the board's `ServiceLauncher`
//! - **`manager`**: DHCP wait and link supervision
//! - **`sntp`**: SNTP client writing the RTC
//! - **`socket`**: listening TCP socket with `embedded-io-async` streams
//! - **`udp`**: the publisher's `DatagramStack`
//!
//! Everything here runs inside the network task: the embassy-net `Stack`
//! is `!Send` and never leaves it.

pub mod config;
pub mod console;
pub mod error;
pub mod http;
pub mod launch;
pub mod manager;
pub mod sntp;
pub mod socket;
pub mod udp;

pub use config::{NetworkConfig, SntpConfig};
pub use error::NetworkError;
pub use http::NodeServerHost;
pub use launch::SignalLauncher;
pub use sntp::SntpClient;
pub use udp::{NetStack, TxPool};
