//! Launch and timing options for a supervised proxy.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::proxy::admin::DEFAULT_ADMIN_TIMEOUT;
use crate::proxy::bootstrap::DEFAULT_NODE_ID;

/// Proxy binary looked up on `PATH` when none is configured.
pub const DEFAULT_PROXY_BINARY: &str = "cilium-envoy";

/// Default admin port.
pub const DEFAULT_ADMIN_PORT: u16 = 9901;

/// Pause between an unexpected exit and the relaunch.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(100);

/// How long to wait for the proxy to exit, after a quit request and again
/// after a kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the supervisor needs to launch and control one proxy lineage.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Proxy executable, a path or a name resolved through `PATH`.
    pub binary: String,
    /// Bootstrap configuration passed with `-c`.
    pub bootstrap_path: PathBuf,
    /// Loopback address of the proxy admin interface.
    pub admin_address: SocketAddr,
    /// Distinguishes proxies sharing a host (`--base-id`).
    pub base_id: u64,
    /// Node identifier handed to the bootstrap writer.
    pub node_id: String,
    pub restart_delay: Duration,
    /// Bound on each admin request.
    pub admin_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            binary: DEFAULT_PROXY_BINARY.to_string(),
            bootstrap_path: PathBuf::from(crate::proxy::bootstrap::BOOTSTRAP_FILE_NAME),
            admin_address: admin_address(DEFAULT_ADMIN_PORT),
            base_id: 0,
            node_id: DEFAULT_NODE_ID.to_string(),
            restart_delay: DEFAULT_RESTART_DELAY,
            admin_timeout: DEFAULT_ADMIN_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl SupervisorOptions {
    /// Set the proxy binary.
    #[must_use]
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn bootstrap_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap_path = path.into();
        self
    }

    /// Admin interface on `127.0.0.1:<port>`.
    #[must_use]
    pub const fn admin_port(mut self, port: u16) -> Self {
        self.admin_address = admin_address(port);
        self
    }

    #[must_use]
    pub const fn base_id(mut self, base_id: u64) -> Self {
        self.base_id = base_id;
        self
    }

    #[must_use]
    pub const fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    #[must_use]
    pub const fn admin_timeout(mut self, timeout: Duration) -> Self {
        self.admin_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

const fn admin_address(port: u16) -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}
