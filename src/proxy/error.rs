//! Error types for proxy supervision.
//!
//! Only two conditions are terminal for a caller: the first launch failing
//! and a forced termination that could not be confirmed. Crashes are handled
//! by the restart loop and never show up here.

use std::path::PathBuf;

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Supervisor errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The proxy binary could not be executed.
    #[error("failed to launch proxy '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The bootstrap configuration could not be produced.
    #[error("bootstrap configuration {path:?} unavailable: {reason}")]
    Bootstrap { path: PathBuf, reason: String },

    /// An admin request failed at the transport level (refused, timed out).
    #[error("admin request '{query}' failed: {source}")]
    Admin {
        query: String,
        #[source]
        source: reqwest::Error,
    },

    /// The admin HTTP client could not be built.
    #[error("failed to build admin HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The admin interface answered with a non-success status.
    #[error("admin request '{query}' returned {status}: {body}")]
    AdminStatus {
        query: String,
        status: u16,
        body: String,
    },

    /// Killing the proxy failed or its exit could not be confirmed.
    #[error("failed to terminate proxy with pid {pid}: {reason}")]
    ForcedTermination { pid: u32, reason: String },

    /// `<binary> --version` failed.
    #[error("proxy binary '{binary}' cannot be executed: {reason}")]
    Version { binary: String, reason: String },

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The control task ended without reporting a result.
    #[error("supervisor task failed: {0}")]
    Supervisor(String),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a launch error.
    pub fn launch(binary: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            binary: binary.into(),
            source,
        }
    }

    /// Create a forced termination error.
    pub fn forced_termination(pid: u32, reason: impl Into<String>) -> Self {
        Self::ForcedTermination {
            pid,
            reason: reason.into(),
        }
    }

    /// Create a bootstrap error.
    pub fn bootstrap(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Bootstrap {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is an admin transaction failure.
    ///
    /// Admin failures are expected during shutdown (the proxy may already be
    /// gone) and lead to the forced-termination fallback.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. } | Self::AdminStatus { .. })
    }

    /// Returns true if the error must be escalated to the process owner.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Launch { .. } | Self::Bootstrap { .. } | Self::ForcedTermination { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_display() {
        let err = Error::launch(
            "cilium-envoy",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert_eq!(
            err.to_string(),
            "failed to launch proxy 'cilium-envoy': No such file or directory"
        );
        assert!(err.is_terminal());
        assert!(!err.is_admin());
    }

    #[test]
    fn test_forced_termination_is_terminal() {
        let err = Error::forced_termination(42, "Operation not permitted");
        assert!(err.is_terminal());
        assert!(err.to_string().contains("pid 42"));
    }

    #[test]
    fn test_admin_status_is_admin() {
        let err = Error::AdminStatus {
            query: "logging?level=bogus".to_string(),
            status: 404,
            body: "invalid level".to_string(),
        };
        assert!(err.is_admin());
        assert!(!err.is_terminal());
    }
}
