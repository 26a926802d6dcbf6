//! Seam for the proxy's bootstrap configuration.
//!
//! Producing the bootstrap content belongs to the agent; the supervisor only
//! needs a file at a known path before the first launch.

use std::path::{Path, PathBuf};

use super::error::{Error, Result};

/// Node identifier, in the `nodeType~ipAddress~proxyId~domain` form.
pub const DEFAULT_NODE_ID: &str = "host~127.0.0.1~no-id~localdomain";

/// File name of the bootstrap configuration inside the state directory.
pub const BOOTSTRAP_FILE_NAME: &str = "bootstrap.pb";

/// What a bootstrap writer needs to know about the proxy being started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapParams {
    pub node_id: String,
    pub cluster: String,
    pub admin_port: u16,
    pub state_dir: PathBuf,
}

/// Produces the bootstrap configuration consumed by the proxy at launch.
pub trait BootstrapWriter: Send + Sync {
    /// Write the configuration to `path`.
    fn write(&self, path: &Path, params: &BootstrapParams) -> Result<()>;
}

/// Uses a bootstrap file generated ahead of time by someone else.
///
/// Writing only checks that the file is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct PregeneratedBootstrap;

impl BootstrapWriter for PregeneratedBootstrap {
    fn write(&self, path: &Path, _params: &BootstrapParams) -> Result<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(Error::bootstrap(path, "file does not exist"))
        }
    }
}

impl<F> BootstrapWriter for F
where
    F: Fn(&Path, &BootstrapParams) -> Result<()> + Send + Sync,
{
    fn write(&self, path: &Path, params: &BootstrapParams) -> Result<()> {
        self(path, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params(dir: &Path) -> BootstrapParams {
        BootstrapParams {
            node_id: DEFAULT_NODE_ID.to_string(),
            cluster: "cluster1".to_string(),
            admin_port: 9901,
            state_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_pregenerated_requires_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(BOOTSTRAP_FILE_NAME);

        let err = PregeneratedBootstrap
            .write(&path, &params(temp_dir.path()))
            .unwrap_err();
        assert!(matches!(err, Error::Bootstrap { .. }));

        std::fs::write(&path, b"static").unwrap();
        PregeneratedBootstrap
            .write(&path, &params(temp_dir.path()))
            .unwrap();
    }

    #[test]
    fn test_closure_writer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(BOOTSTRAP_FILE_NAME);

        let writer = |path: &Path, params: &BootstrapParams| {
            std::fs::write(path, params.node_id.as_bytes()).map_err(|e| Error::io("bootstrap", e))
        };
        writer.write(&path, &params(temp_dir.path())).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_NODE_ID);
    }
}
