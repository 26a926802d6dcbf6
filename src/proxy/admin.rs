//! Client for the proxy's loopback admin interface.
//!
//! Two operations are used: `GET /logging?level=<native>` to change the log
//! level at runtime and `GET /quitquitquit` to ask the proxy to exit.
//! Response bodies are opaque and only logged.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{Error, Result};
use super::level::{LogSettings, NativeLevel, Severity};

/// Default timeout for a single admin request.
pub const DEFAULT_ADMIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Admin endpoint plus the last level the proxy is known to run at.
pub struct AdminClient {
    base_url: String,
    client: reqwest::Client,
    /// Serializes level changes so the idempotence check sees a settled value.
    applied: Mutex<Option<NativeLevel>>,
}

impl AdminClient {
    /// Create a client for the admin interface listening on `address`.
    ///
    /// Every request is bounded by `timeout`; an expired request is reported
    /// like an unreachable endpoint.
    pub fn new(address: SocketAddr, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .pool_max_idle_per_host(1)
            .build()
            .map_err(Error::Client)?;

        Ok(Self {
            base_url: format!("http://{address}"),
            client,
            applied: Mutex::new(None),
        })
    }

    /// Base URL of the admin interface, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Last level successfully applied, if any.
    pub async fn applied_level(&self) -> Option<NativeLevel> {
        *self.applied.lock().await
    }

    /// Note the level a freshly launched proxy was started with.
    pub async fn record_launch_level(&self, level: NativeLevel) {
        *self.applied.lock().await = Some(level);
    }

    /// Change the proxy log level to match `level` under `settings`.
    ///
    /// Returns `Ok(false)` without any request when the proxy already runs
    /// at the resulting native level, `Ok(true)` when the level was changed.
    /// A failed request leaves the recorded level untouched.
    pub async fn change_log_level(&self, level: Severity, settings: &LogSettings) -> Result<bool> {
        let native = settings.native_level_for(level);
        let mut applied = self.applied.lock().await;

        if *applied == Some(native) {
            debug!(level = %native, "Proxy log level is already set");
            return Ok(false);
        }

        match self.transact(&format!("logging?level={native}")).await {
            Ok(_) => {
                *applied = Some(native);
                Ok(true)
            },
            Err(e) => {
                warn!(level = %native, error = %e, "Failed to set proxy log level");
                Err(e)
            },
        }
    }

    /// Ask the proxy to shut down gracefully.
    ///
    /// Fails if the proxy cannot be reached, which is expected when it has
    /// already exited.
    pub async fn request_shutdown(&self) -> Result<()> {
        self.transact("quitquitquit").await.map(|_| ())
    }

    async fn transact(&self, query: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, query);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| Error::Admin {
                query: query.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| Error::Admin {
                query: query.to_string(),
                source,
            })?
            .replace('\r', "");

        debug!(query = %query, status = status.as_u16(), response = %body, "Proxy admin response");

        if !status.is_success() {
            return Err(Error::AdminStatus {
                query: query.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}
