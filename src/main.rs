//! sidecar-supervisor - keeps a sidecar proxy running next to the agent.
//!
//! See `sidecar-supervisor --help` for usage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use sidecar_supervisor::config::Config;
use sidecar_supervisor::log_sink::LogSink;
use sidecar_supervisor::logging::{LogConfig, LogFormat, init_logging};
use sidecar_supervisor::proxy::supervisor::DEFAULT_PROXY_BINARY;
use sidecar_supervisor::proxy::{
    PregeneratedBootstrap, SharedSettings, Supervisor, SupervisorHandle, proxy_version,
};

#[derive(Parser)]
#[command(name = "sidecar-supervisor")]
#[command(version)]
#[command(about = "Launch, restart and stop a sidecar proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy under supervision until SIGINT or SIGTERM
    Run {
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Supervisor log output format
        #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
        log_format: LogFormat,
    },
    /// Print the supervisor and proxy versions
    Version {
        /// Proxy binary to query
        #[arg(long, default_value = DEFAULT_PROXY_BINARY)]
        binary: String,
    },
}

/// What a received signal asks for.
enum Signal {
    Shutdown,
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, log_format } => {
            init_logging(&LogConfig::default().format(log_format));
            run(&config).await
        },
        Commands::Version { binary } => {
            println!("sidecar-supervisor {}", env!("CARGO_PKG_VERSION"));
            let version = proxy_version(&binary)
                .await
                .with_context(|| format!("Failed to query version of {binary}"))?;
            println!("{version}");
            Ok(())
        },
    }
}

async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let settings = SharedSettings::new(config.log);
    let sink = LogSink::open(config.log_path()?, config.log_rotation.clone())
        .context("Failed to open proxy log file")?;
    let options = config.supervisor_options()?;

    let handle = Supervisor::new(options, settings.clone(), sink)
        .start(&PregeneratedBootstrap)
        .await
        .context("Failed to start proxy")?;

    info!(
        pid = ?handle.pid(),
        admin = %handle.admin_url(),
        level = %settings.native_level(),
        "Proxy supervisor running"
    );

    let mut signals = Signals::register()?;
    let mut state = handle.watch_state();
    loop {
        tokio::select! {
            signal = signals.recv() => match signal? {
                Signal::Shutdown => break,
                Signal::Reload => reload_log_level(config_path, &settings, &handle).await,
            },
            _ = state.wait_for(|state| state.is_terminal()) => {
                error!("Proxy supervision ended");
                break;
            },
        }
    }

    handle.stop().await.context("Failed to stop proxy")?;
    Ok(())
}

/// Re-read `[log]` and apply it to the running proxy.
async fn reload_log_level(config_path: &Path, settings: &SharedSettings, handle: &SupervisorHandle) {
    let config = match Config::load_from(config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Ignoring reload, config could not be read");
            return;
        },
    };

    settings.replace(config.log);
    match handle.change_log_level(config.log.severity).await {
        Ok(true) => info!(level = %settings.native_level(), "Proxy log level changed"),
        Ok(false) => info!(level = %settings.native_level(), "Proxy log level unchanged"),
        Err(e) => warn!(error = %e, "Failed to change proxy log level"),
    }
}

/// Process signals the supervisor reacts to, registered once.
struct Signals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sighup: tokio::signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    fn register() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigterm: signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?,
            sigint: signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?,
            sighup: signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?,
        })
    }

    #[cfg(not(unix))]
    fn register() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Result<Signal> {
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM");
                Ok(Signal::Shutdown)
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT");
                Ok(Signal::Shutdown)
            }
            _ = self.sighup.recv() => {
                info!("Received SIGHUP, reloading log level");
                Ok(Signal::Reload)
            }
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Result<Signal> {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl_c")?;
        info!("Received Ctrl+C");
        Ok(Signal::Shutdown)
    }
}
