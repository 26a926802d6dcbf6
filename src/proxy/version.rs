//! Proxy binary version query.

use tokio::process::Command;

use super::error::{Error, Result};

/// Run `<binary> --version` and return its trimmed standard output.
///
/// # Errors
///
/// Returns [`Error::Version`] if the binary cannot be executed or exits
/// unsuccessfully. This only concerns the caller of the query; a running
/// supervisor is unaffected.
pub async fn proxy_version(binary: &str) -> Result<String> {
    let output = Command::new(binary)
        .arg("--version")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Version {
            binary: binary.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::Version {
            binary: binary.to_string(),
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("fake-proxy");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    #[serial]
    async fn test_version_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let binary = script(&dir, "echo '  fake-proxy version: 1.2.3/RELEASE  '");

        let version = proxy_version(&binary).await.unwrap();
        assert_eq!(version, "fake-proxy version: 1.2.3/RELEASE");
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_binary() {
        let err = proxy_version("/nonexistent/fake-proxy").await.unwrap_err();
        assert!(matches!(err, Error::Version { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn test_failing_binary() {
        let dir = TempDir::new().unwrap();
        let binary = script(&dir, "echo 'unknown flag' >&2; exit 2");

        let err = proxy_version(&binary).await.unwrap_err();
        assert!(err.to_string().contains("unknown flag"));
    }
}
