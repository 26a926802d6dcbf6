//! Log level translation between the agent and the proxy.
//!
//! The agent speaks in [`Severity`]; the proxy understands its own
//! vocabulary ([`NativeLevel`]). Two switches influence the mapping: a
//! global tracing override and flow-level debugging. Both live in
//! [`LogSettings`], shared through [`SharedSettings`] so every launch and
//! every live change reads the values current at that moment.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Agent-side severity, ordered from most to least verbose.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
    #[serde(alias = "fatal")]
    Critical,
    #[serde(alias = "panic")]
    Off,
}

impl Severity {
    /// All severities, most verbose first.
    pub const ALL: [Self; 7] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Off,
    ];
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" | "fatal" => Ok(Self::Critical),
            "off" | "panic" => Ok(Self::Off),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Log levels in the proxy's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Off,
}

impl NativeLevel {
    /// The string passed on the command line and to `/logging?level=`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for NativeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an agent severity to the proxy's native level.
///
/// Tracing wins over everything and selects `trace`, the only way to reach
/// it. Debug is demoted to info unless flow-level debugging is on.
/// `Severity::Trace` has no native counterpart of its own and is handled as
/// `Debug`.
pub const fn map_log_level(level: Severity, tracing: bool, flow_debug: bool) -> NativeLevel {
    if tracing {
        return NativeLevel::Trace;
    }

    match level {
        Severity::Trace | Severity::Debug if !flow_debug => NativeLevel::Info,
        Severity::Trace | Severity::Debug => NativeLevel::Debug,
        Severity::Info => NativeLevel::Info,
        Severity::Warning => NativeLevel::Warning,
        Severity::Error => NativeLevel::Error,
        Severity::Critical => NativeLevel::Critical,
        Severity::Off => NativeLevel::Off,
    }
}

/// Logging switches that decide the proxy's level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LogSettings {
    /// Severity the agent currently logs at.
    #[serde(default)]
    pub severity: Severity,
    /// Force the proxy to its most verbose level.
    #[serde(default)]
    pub tracing: bool,
    /// Keep debug output from the proxy instead of demoting it to info.
    #[serde(default)]
    pub flow_debug: bool,
}

impl LogSettings {
    /// Native level for these settings.
    pub const fn native_level(&self) -> NativeLevel {
        map_log_level(self.severity, self.tracing, self.flow_debug)
    }

    /// Native level for `level` under these settings' switches.
    pub const fn native_level_for(&self, level: Severity) -> NativeLevel {
        map_log_level(level, self.tracing, self.flow_debug)
    }
}

/// Shared, synchronized access to the current [`LogSettings`].
///
/// Cloning is cheap and every clone sees the same values.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<LogSettings>>,
}

impl SharedSettings {
    /// Wrap initial settings.
    pub fn new(settings: LogSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> LogSettings {
        *self.inner.read()
    }

    /// Replace all settings at once.
    pub fn replace(&self, settings: LogSettings) {
        *self.inner.write() = settings;
    }

    pub fn set_severity(&self, severity: Severity) {
        self.inner.write().severity = severity;
    }

    /// Enable or disable the tracing override.
    pub fn set_tracing(&self, enabled: bool) {
        self.inner.write().tracing = enabled;
    }

    pub fn set_flow_debug(&self, enabled: bool) {
        self.inner.write().flow_debug = enabled;
    }

    /// Native level for the current settings.
    pub fn native_level(&self) -> NativeLevel {
        self.snapshot().native_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_severity() -> impl Strategy<Value = Severity> {
        prop::sample::select(Severity::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn tracing_always_selects_trace(level in any_severity(), flow_debug in any::<bool>()) {
            prop_assert_eq!(map_log_level(level, true, flow_debug), NativeLevel::Trace);
        }

        #[test]
        fn trace_only_reachable_through_tracing(level in any_severity(), flow_debug in any::<bool>()) {
            prop_assert_ne!(map_log_level(level, false, flow_debug), NativeLevel::Trace);
        }
    }

    #[test]
    fn test_debug_demoted_without_flow_debug() {
        assert_eq!(
            map_log_level(Severity::Debug, false, false),
            map_log_level(Severity::Info, false, false)
        );
        assert_eq!(map_log_level(Severity::Debug, false, true), NativeLevel::Debug);
    }

    #[test]
    fn test_direct_mapping() {
        let cases = [
            (Severity::Off, "off"),
            (Severity::Critical, "critical"),
            (Severity::Error, "error"),
            (Severity::Warning, "warning"),
            (Severity::Info, "info"),
            (Severity::Debug, "debug"),
        ];
        for (severity, native) in cases {
            assert_eq!(map_log_level(severity, false, true).as_str(), native);
        }
    }

    #[test]
    fn test_severity_trace_behaves_like_debug() {
        assert_eq!(map_log_level(Severity::Trace, false, false), NativeLevel::Info);
        assert_eq!(map_log_level(Severity::Trace, false, true), NativeLevel::Debug);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Critical < Severity::Off);
    }

    #[test]
    fn test_severity_from_str_aliases() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("fatal".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("panic".parse::<Severity>().unwrap(), Severity::Off);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_shared_settings_visible_across_clones() {
        let settings = SharedSettings::default();
        let other = settings.clone();
        assert_eq!(settings.native_level(), NativeLevel::Info);

        other.set_severity(Severity::Error);
        assert_eq!(settings.native_level(), NativeLevel::Error);

        other.set_tracing(true);
        assert_eq!(settings.native_level(), NativeLevel::Trace);
    }
}
