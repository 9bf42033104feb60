//! Service transport abstraction: command console and protocol servers

use core::future::Future;

use crate::task::SpawnError;

/// Protocol served by one [`ServerEntry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServerKind {
    /// HTTP file server
    Http,
    /// FTP file server
    Ftp,
}

/// One protocol server multiplexed by the server work loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServerEntry {
    pub kind: ServerKind,
    /// Listening TCP port
    pub port: u16,
    /// Pending-connection backlog
    pub backlog: u8,
    /// Root directory served, empty for the volume root
    pub root: &'static str,
}

/// Network command console parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConsoleConfig {
    /// UDP port the console listens on
    pub port: u16,
    /// Stack reserved for the console task, in bytes
    pub stack_size: usize,
    /// Scheduling priority of the console task
    pub priority: u8,
}

impl ConsoleConfig {
    pub const fn new(port: u16, stack_size: usize, priority: u8) -> Self {
        Self {
            port,
            stack_size,
            priority,
        }
    }
}

/// Service transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceError {
    /// No server in the configuration could be started
    NoUsableServer,
    /// Listening socket could not be created
    ListenFailed,
    /// Background task could not be started
    Spawn(SpawnError),
}

impl core::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoUsableServer => write!(f, "no usable server in configuration"),
            Self::ListenFailed => write!(f, "listen socket unavailable"),
            Self::Spawn(e) => write!(f, "task spawn failed: {}", e),
        }
    }
}

impl core::error::Error for ServiceError {}

impl From<SpawnError> for ServiceError {
    fn from(e: SpawnError) -> Self {
        Self::Spawn(e)
    }
}

/// Creates the network-facing service tasks
///
/// Called once, from the network event context, when the link first comes
/// up. Implementations must not block.
pub trait ServiceLauncher {
    /// Start the command console on the transport described by `config`
    fn start_console(&mut self, config: &ConsoleConfig) -> Result<(), SpawnError>;

    /// Start the task running the server work loop
    fn spawn_server_work(&mut self) -> Result<(), SpawnError>;
}

/// Composed multi-protocol server
pub trait ServerHost {
    /// Handle to the composed server
    type Server;

    /// Start network time synchronization
    fn start_time_sync(&mut self) -> Result<(), ServiceError>;

    /// Create one server per entry of `config`
    fn create_server(&mut self, config: &[ServerEntry]) -> Result<Self::Server, ServiceError>;

    /// Serve pending work, blocking for at most `max_wait_ms`
    fn do_server_work(
        &mut self,
        server: &mut Self::Server,
        max_wait_ms: u32,
    ) -> impl Future<Output = ()>;
}
