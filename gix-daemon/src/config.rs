//! Daemon configuration, mirroring `git daemon`'s flag surface (`spec.md` §B/CLI).

use std::time::Duration;

/// Options controlling how the accept loop and its workers behave.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// TCP port to listen on. Default `9418`, matching `spec.md` §6.4.
    pub port: u16,
    /// Address to bind to. Default `0.0.0.0`.
    pub bind_address: String,
    /// Per-connection IO timeout (`spec.md` §4.7/§5). `None` disables the timeout.
    pub timeout: Option<Duration>,
    /// Timeout applied while waiting for the initial request line, separate from the
    /// steady-state `timeout` (matches `git daemon --init-timeout`).
    pub init_timeout: Option<Duration>,
    /// Maximum number of simultaneously active workers. `None` means unbounded.
    pub max_connections: Option<usize>,
    /// Grace period given to in-flight workers when [`crate::Daemon::stop`] is called.
    pub shutdown_grace_period: Duration,
    /// Emit verbose per-connection log lines.
    pub verbose: bool,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            port: 9418,
            bind_address: "0.0.0.0".to_string(),
            timeout: Some(Duration::from_secs(3 * 60)),
            init_timeout: Some(Duration::from_secs(3 * 60)),
            max_connections: None,
            shutdown_grace_period: Duration::from_secs(5),
            verbose: false,
        }
    }
}

impl DaemonOptions {
    /// Set the listening port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the per-connection IO timeout. `Duration::ZERO` disables it, matching `git
    /// daemon --timeout=0`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    /// Set the initial-request-line timeout.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    /// Cap the number of simultaneously active connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }
}
