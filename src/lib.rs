//! Supervisor for a sidecar proxy process.
//!
//! Launches the proxy with a log level derived from the agent's severity,
//! restarts it when it exits unexpectedly, changes its log level at runtime
//! through the admin interface, and stops it gracefully with a forced kill
//! as the fallback. The proxy's output is captured in a rotating log file.
//!
//! ## Module Structure
//!
//! - [`proxy`]: Level mapping, admin client, supervisor, version query
//! - [`log_sink`]: Rotating file for the proxy's stdout and stderr
//! - [`config`]: TOML configuration
//! - [`logging`]: Supervisor logging setup

pub mod config;
pub mod log_sink;
pub mod logging;
pub mod proxy;
