//! Sidecar proxy management.
//!
//! - [`level`]: Agent severity to proxy log level mapping
//! - [`admin`]: Admin interface client (log level, graceful quit)
//! - [`supervisor`]: Launch, crash restart and stop of the proxy process
//! - [`bootstrap`]: Bootstrap configuration seam
//! - [`version`]: Proxy binary version query
//! - [`error`]: Error types

pub mod admin;
pub mod bootstrap;
pub mod error;
pub mod level;
pub mod supervisor;
pub mod version;

pub use admin::AdminClient;
pub use bootstrap::{BootstrapParams, BootstrapWriter, PregeneratedBootstrap};
pub use error::{Error, Result};
pub use level::{LogSettings, NativeLevel, Severity, SharedSettings, map_log_level};
pub use supervisor::{Supervisor, SupervisorHandle, SupervisorOptions};
pub use version::proxy_version;
