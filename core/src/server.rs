//! Server work loop
//!
//! Builds the composed multi-protocol server once, then drives its
//! bounded-blocking work function forever.

use core::num::NonZeroU32;

use hal_abstractions::ServerHost;

use crate::config::ServiceConfig;
use crate::error::FatalError;

pub struct ServiceWorkLoop<H: ServerHost> {
    host: H,
    server: H::Server,
    max_wait_ms: NonZeroU32,
}

impl<H: ServerHost> ServiceWorkLoop<H> {
    /// Start time sync and create the servers in `config`
    ///
    /// Time sync failure only costs timestamps and is logged. A server
    /// that cannot be created, or a zero wait, is fatal.
    pub fn start(mut host: H, config: &ServiceConfig) -> Result<Self, FatalError> {
        let max_wait_ms = NonZeroU32::new(config.max_wait_ms).ok_or_else(|| {
            error!("server work wait must be non-zero");
            FatalError::ZeroServerWait
        })?;

        if let Err(e) = host.start_time_sync() {
            warn!("time sync not started: {}", e);
        }

        let server = host.create_server(config.servers).map_err(|e| {
            error!("server creation failed: {}", e);
            FatalError::ServerCreate(e)
        })?;
        info!(
            "{} server(s) up, work wait {} ms",
            config.servers.len(),
            max_wait_ms.get()
        );

        Ok(Self {
            host,
            server,
            max_wait_ms,
        })
    }

    pub fn max_wait_ms(&self) -> u32 {
        self.max_wait_ms.get()
    }

    /// Serve pending connections, blocking at most the configured wait
    pub async fn work_once(&mut self) {
        self.host
            .do_server_work(&mut self.server, self.max_wait_ms.get())
            .await;
    }

    pub async fn run(mut self) -> ! {
        loop {
            self.work_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use embassy_futures::block_on;
    use hal_abstractions::{ServerEntry, ServerKind, ServiceError};

    #[test]
    fn test_work_uses_configured_wait() {
        let host = MockHost::new();
        let mut work = ServiceWorkLoop::start(&host, &ServiceConfig::default()).unwrap();

        for _ in 0..10 {
            block_on(work.work_once());
        }

        let waits = host.waits();
        assert_eq!(waits.len(), 10);
        assert!(waits.iter().all(|&w| w == 200));
    }

    #[test]
    fn test_zero_wait_is_rejected() {
        let host = MockHost::new();
        let config = ServiceConfig {
            max_wait_ms: 0,
            ..ServiceConfig::default()
        };

        assert!(matches!(
            ServiceWorkLoop::start(&host, &config),
            Err(FatalError::ZeroServerWait)
        ));
        assert!(host.created().is_empty());
    }

    #[test]
    fn test_servers_created_from_config() {
        static SERVERS: [ServerEntry; 1] = [ServerEntry {
            kind: ServerKind::Http,
            port: 8080,
            backlog: 4,
            root: "/ram/web",
        }];
        let host = MockHost::new();
        let config = ServiceConfig {
            servers: &SERVERS,
            max_wait_ms: 50,
        };

        let work = ServiceWorkLoop::start(&host, &config).unwrap();
        assert_eq!(work.max_wait_ms(), 50);
        assert_eq!(host.created(), SERVERS.to_vec());
        assert_eq!(host.order(), vec!["time_sync", "create"]);
    }

    #[test]
    fn test_creation_failure_is_fatal() {
        let host = MockHost::new();
        host.fail_create(ServiceError::ListenFailed);

        assert!(matches!(
            ServiceWorkLoop::start(&host, &ServiceConfig::default()),
            Err(FatalError::ServerCreate(ServiceError::ListenFailed))
        ));
    }

    #[test]
    fn test_time_sync_failure_is_tolerated() {
        let host = MockHost::new();
        host.fail_time_sync(ServiceError::ListenFailed);

        let mut work = ServiceWorkLoop::start(&host, &ServiceConfig::default()).unwrap();
        block_on(work.work_once());
        assert_eq!(host.waits(), vec![200]);
    }
}
