//! Supervision of the sidecar proxy process.
//!
//! [`Supervisor::start`] launches the proxy and returns once the first
//! launch is known to have succeeded. A background control task then keeps
//! the proxy alive: when it exits on its own the task waits a short, fixed
//! delay and launches a new instance, one at a time. [`SupervisorHandle`]
//! changes the log level of the running proxy and stops it, asking the
//! admin interface first and killing the process if that does not work.
//!
//! ## Module Structure
//!
//! - [`state`]: States, events and the pure transition function
//! - [`types`]: Launch and timing options
//! - `control`: The control task driving the state machine
//! - `process`: One launched instance, its exit watcher and output pumps

mod control;
mod process;
pub mod state;
mod types;


use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

pub use state::{Event, Exit, State};
pub use types::{
    DEFAULT_ADMIN_PORT, DEFAULT_PROXY_BINARY, DEFAULT_RESTART_DELAY, DEFAULT_STOP_TIMEOUT,
    SupervisorOptions,
};

use self::control::Control;
use super::admin::AdminClient;
use super::bootstrap::{BootstrapParams, BootstrapWriter};
use super::error::{Error, Result};
use super::level::{Severity, SharedSettings};
use crate::log_sink::LogSink;

/// Cluster name handed to the bootstrap writer.
pub const DEFAULT_CLUSTER: &str = "cluster1";

/// Starts a supervised proxy.
pub struct Supervisor {
    options: SupervisorOptions,
    settings: SharedSettings,
    sink: LogSink,
}

impl Supervisor {
    /// Create a supervisor; nothing runs until [`start`](Self::start).
    ///
    /// `settings` is read at every launch and every level change, so updates
    /// made through any clone take effect without restarting.
    pub fn new(options: SupervisorOptions, settings: SharedSettings, sink: LogSink) -> Self {
        Self {
            options,
            settings,
            sink,
        }
    }

    /// Produce the bootstrap configuration and launch the proxy.
    ///
    /// Blocks until the first launch succeeded or failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bootstrap configuration cannot be produced or
    /// the proxy cannot be executed. No background task is left running in
    /// that case.
    pub async fn start(self, bootstrap: &dyn BootstrapWriter) -> Result<SupervisorHandle> {
        let params = BootstrapParams {
            node_id: self.options.node_id.clone(),
            cluster: DEFAULT_CLUSTER.to_string(),
            admin_port: self.options.admin_address.port(),
            state_dir: self
                .options
                .bootstrap_path
                .parent()
                .map(std::path::Path::to_path_buf)
                .unwrap_or_default(),
        };
        bootstrap.write(&self.options.bootstrap_path, &params)?;

        let admin = Arc::new(AdminClient::new(
            self.options.admin_address,
            self.options.admin_timeout,
        )?);

        debug!(
            binary = %self.options.binary,
            admin = %admin.base_url(),
            bootstrap = %self.options.bootstrap_path.display(),
            "Starting proxy supervisor"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let (pid_tx, pid_rx) = watch::channel(None);
        let (launches_tx, launches_rx) = watch::channel(0);
        let (state_tx, state_rx) = watch::channel(State::Starting);
        let (started_tx, started_rx) = oneshot::channel();

        let control = Control {
            options: self.options,
            settings: self.settings.clone(),
            sink: self.sink,
            admin: Arc::clone(&admin),
            stop: stop_rx,
            pid: pid_tx,
            launches: launches_tx,
            state: state_tx,
        };
        let task = tokio::spawn(control.run(started_tx));

        match started_rx.await {
            Ok(Ok(_pid)) => Ok(SupervisorHandle {
                stop: stop_tx,
                task,
                admin,
                settings: self.settings,
                pid: pid_rx,
                launches: launches_rx,
                state: state_rx,
            }),
            Ok(Err(e)) => {
                // The task ends on its own after a failed first launch.
                let _ = task.await;
                Err(e)
            },
            Err(_) => match task.await {
                Err(e) => Err(Error::Supervisor(e.to_string())),
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(Error::Supervisor(
                    "control task ended before the first launch".to_string(),
                )),
            },
        }
    }
}

/// Control over a running supervisor, owned by whoever started it.
///
/// [`stop`](Self::stop) consumes the handle. Dropping the handle without
/// stopping is treated as a stop request.
pub struct SupervisorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
    admin: Arc<AdminClient>,
    settings: SharedSettings,
    pid: watch::Receiver<Option<u32>>,
    launches: watch::Receiver<u64>,
    state: watch::Receiver<State>,
}

impl SupervisorHandle {
    /// Pid of the current proxy instance, `None` between instances.
    pub fn pid(&self) -> Option<u32> {
        *self.pid.borrow()
    }

    /// Follow pid changes; each restart publishes a new value.
    pub fn watch_pid(&self) -> watch::Receiver<Option<u32>> {
        self.pid.clone()
    }

    /// Number of successful launches so far, the first one included.
    pub fn launches(&self) -> u64 {
        *self.launches.borrow()
    }

    /// Follow the launch counter.
    pub fn watch_launches(&self) -> watch::Receiver<u64> {
        self.launches.clone()
    }

    /// Current supervisor state.
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Follow state transitions. Reaching [`State::Stopped`] without a stop
    /// request means supervision ended on a failed relaunch.
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.state.clone()
    }

    /// Whether the control task is still supervising.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Admin interface base URL.
    pub fn admin_url(&self) -> &str {
        self.admin.base_url()
    }

    /// Apply `level` to the running proxy through its admin interface.
    ///
    /// The tracing and flow-debug switches are taken from the shared settings
    /// as they are now. Returns `Ok(false)` if the proxy already runs at the
    /// resulting level. A failure is reported but leaves supervision
    /// untouched.
    pub async fn change_log_level(&self, level: Severity) -> Result<bool> {
        let settings = self.settings.snapshot();
        self.admin.change_log_level(level, &settings).await
    }

    /// Stop the proxy and wait for the supervisor to finish.
    ///
    /// # Errors
    ///
    /// Returns the first error met while stopping, typically a
    /// [`Error::ForcedTermination`], or the launch error that ended
    /// supervision earlier.
    pub async fn stop(self) -> Result<()> {
        self.stop.send_replace(true);

        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::Supervisor(e.to_string())),
        }
    }
}
