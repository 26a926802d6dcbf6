//! Configuration for the supervisor.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [proxy]
//! binary = "cilium-envoy"
//! state_dir = "/var/run/sidecar"
//! admin_port = 9901
//! base_id = 0
//! restart_delay_ms = 100
//!
//! [log]
//! severity = "info"
//! tracing = false
//! flow_debug = false
//!
//! [log_rotation]
//! max_size_mb = 100
//! max_backups = 3
//! max_age_days = 28
//! compress = true
//! ```
//!
//! Every section and field is optional; defaults match the values above.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::log_sink::LogRotationConfig;
use crate::proxy::admin::DEFAULT_ADMIN_TIMEOUT;
use crate::proxy::bootstrap::{BOOTSTRAP_FILE_NAME, DEFAULT_NODE_ID};
use crate::proxy::level::LogSettings;
use crate::proxy::supervisor::{
    DEFAULT_ADMIN_PORT, DEFAULT_PROXY_BINARY, DEFAULT_RESTART_DELAY, DEFAULT_STOP_TIMEOUT,
    SupervisorOptions,
};

/// State directory used when none is configured, relative to the home dir.
const DEFAULT_STATE_DIR_NAME: &str = ".sidecar-supervisor";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub log_rotation: LogRotationConfig,
}

/// `[proxy]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Holds the bootstrap file and, by default, the proxy log.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Overrides `<state_dir>/bootstrap.pb`.
    #[serde(default)]
    pub bootstrap_path: Option<PathBuf>,
    /// Overrides `<state_dir>/logs/proxy.log`.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    #[serde(default)]
    pub base_id: u64,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            state_dir: None,
            bootstrap_path: None,
            log_path: None,
            admin_port: default_admin_port(),
            base_id: 0,
            restart_delay_ms: default_restart_delay_ms(),
            admin_timeout_ms: default_admin_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

fn default_binary() -> String {
    DEFAULT_PROXY_BINARY.to_string()
}

fn default_admin_port() -> u16 {
    DEFAULT_ADMIN_PORT
}

fn default_restart_delay_ms() -> u64 {
    duration_ms(DEFAULT_RESTART_DELAY)
}

fn default_admin_timeout_ms() -> u64 {
    duration_ms(DEFAULT_ADMIN_TIMEOUT)
}

fn default_stop_timeout_ms() -> u64 {
    duration_ms(DEFAULT_STOP_TIMEOUT)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields have invalid types or values (e.g. an unknown severity)
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found:
    /// - Empty proxy binary
    /// - Admin port 0
    /// - Zero admin or stop timeout
    /// - Zero rotation size
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.proxy.binary.trim().is_empty() {
            errors.push("proxy.binary cannot be empty".to_string());
        }

        if self.proxy.admin_port == 0 {
            errors.push(
                "proxy.admin_port cannot be 0. The admin interface needs a fixed port \
                 (default: 9901)"
                    .to_string(),
            );
        } else if self.proxy.admin_port < 1024 {
            warnings.push(format!(
                "proxy.admin_port {} is a privileged port (< 1024)",
                self.proxy.admin_port
            ));
        }

        if self.proxy.admin_timeout_ms == 0 {
            errors.push("proxy.admin_timeout_ms must be positive".to_string());
        }

        if self.proxy.stop_timeout_ms == 0 {
            errors.push("proxy.stop_timeout_ms must be positive".to_string());
        }

        if self.proxy.restart_delay_ms == 0 {
            warnings.push(
                "proxy.restart_delay_ms is 0: a proxy failing at startup will be \
                 restarted in a tight loop"
                    .to_string(),
            );
        }

        if self.log_rotation.max_size_mb == 0 {
            errors.push("log_rotation.max_size_mb must be positive".to_string());
        }

        if self.log.tracing {
            warnings.push("log.tracing is enabled: the proxy will log at trace level".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }

    /// State directory, `~/.sidecar-supervisor` unless configured.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.proxy.state_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(DEFAULT_STATE_DIR_NAME))
    }

    pub fn bootstrap_path(&self) -> Result<PathBuf> {
        match &self.proxy.bootstrap_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.state_dir()?.join(BOOTSTRAP_FILE_NAME)),
        }
    }

    /// Proxy log file path.
    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.proxy.log_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.state_dir()?.join("logs").join("proxy.log")),
        }
    }

    /// Options for [`Supervisor::new`](crate::proxy::Supervisor::new).
    pub fn supervisor_options(&self) -> Result<SupervisorOptions> {
        Ok(SupervisorOptions {
            binary: self.proxy.binary.clone(),
            bootstrap_path: self.bootstrap_path()?,
            node_id: DEFAULT_NODE_ID.to_string(),
            base_id: self.proxy.base_id,
            restart_delay: Duration::from_millis(self.proxy.restart_delay_ms),
            admin_timeout: Duration::from_millis(self.proxy.admin_timeout_ms),
            stop_timeout: Duration::from_millis(self.proxy.stop_timeout_ms),
            ..SupervisorOptions::default()
        }
        .admin_port(self.proxy.admin_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::level::Severity;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.proxy.binary, "cilium-envoy");
        assert_eq!(config.proxy.admin_port, 9901);
        assert_eq!(config.proxy.restart_delay_ms, 100);
        assert_eq!(config.proxy.admin_timeout_ms, 2000);
        assert_eq!(config.proxy.stop_timeout_ms, 5000);
        assert_eq!(config.log, LogSettings::default());
        assert_eq!(config.log_rotation, LogRotationConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[proxy]
binary = "/usr/bin/cilium-envoy"
state_dir = "/var/run/sidecar"
admin_port = 19901
base_id = 2
restart_delay_ms = 250

[log]
severity = "warn"
flow_debug = true

[log_rotation]
max_size_mb = 10
max_backups = 5
max_age_days = 7
compress = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.proxy.binary, "/usr/bin/cilium-envoy");
        assert_eq!(config.proxy.base_id, 2);
        assert_eq!(config.log.severity, Severity::Warning);
        assert!(config.log.flow_debug);
        assert!(!config.log.tracing);
        assert_eq!(config.log_rotation.max_backups, 5);
        assert!(!config.log_rotation.compress);

        assert_eq!(
            config.bootstrap_path().unwrap(),
            PathBuf::from("/var/run/sidecar/bootstrap.pb")
        );
        assert_eq!(
            config.log_path().unwrap(),
            PathBuf::from("/var/run/sidecar/logs/proxy.log")
        );

        let options = config.supervisor_options().unwrap();
        assert_eq!(options.admin_address.to_string(), "127.0.0.1:19901");
        assert_eq!(options.restart_delay, Duration::from_millis(250));
        assert_eq!(options.base_id, 2);
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("[log]\nseverity = \"loud\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_paths_override_state_dir() {
        let toml_str = r#"
[proxy]
state_dir = "/var/run/sidecar"
bootstrap_path = "/etc/proxy/bootstrap.pb"
log_path = "/var/log/proxy.log"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.bootstrap_path().unwrap(),
            PathBuf::from("/etc/proxy/bootstrap.pb")
        );
        assert_eq!(config.log_path().unwrap(), PathBuf::from("/var/log/proxy.log"));
    }

    #[test]
    fn test_validate_errors_collected() {
        let toml_str = r#"
[proxy]
binary = ""
admin_port = 0
stop_timeout_ms = 0

[log_rotation]
max_size_mb = 0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("proxy.binary"));
        assert!(err.contains("proxy.admin_port"));
        assert!(err.contains("proxy.stop_timeout_ms"));
        assert!(err.contains("log_rotation.max_size_mb"));
    }

    #[test]
    fn test_validate_warnings() {
        let toml_str = r#"
[proxy]
admin_port = 901
restart_delay_ms = 0

[log]
tracing = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let result = config.validate().unwrap();
        assert!(result.has_warnings());
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("supervisor.toml");
        std::fs::write(&path, "[proxy]\nbase_id = 9\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.proxy.base_id, 9);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load_from("/nonexistent/supervisor.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
