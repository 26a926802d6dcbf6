//! The control task: drives the state machine for one proxy lineage.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use super::process::ProcessRecord;
use super::state::{Event, Exit, State, wait_event, wait_restart_delay};
use super::types::SupervisorOptions;
use crate::log_sink::LogSink;
use crate::proxy::admin::AdminClient;
use crate::proxy::error::{Error, Result};
use crate::proxy::level::SharedSettings;

pub(crate) struct Control {
    pub(crate) options: SupervisorOptions,
    pub(crate) settings: SharedSettings,
    pub(crate) sink: LogSink,
    pub(crate) admin: Arc<AdminClient>,
    pub(crate) stop: watch::Receiver<bool>,
    pub(crate) pid: watch::Sender<Option<u32>>,
    pub(crate) launches: watch::Sender<u64>,
    pub(crate) state: watch::Sender<State>,
}

impl Control {
    /// Run until `Stopped`.
    ///
    /// The outcome of the first launch goes to `started`. If that launch
    /// fails the task ends right away with `Ok`, the error having been
    /// handed over. Later results are the task's return value: `Ok` for a
    /// clean stop, otherwise the first error met.
    pub(crate) async fn run(mut self, started: oneshot::Sender<Result<u32>>) -> Result<()> {
        let mut started = Some(started);
        let mut state = State::Starting;
        let mut current: Option<ProcessRecord> = None;
        let mut outcome = Ok(());

        while !state.is_terminal() {
            let event = match state {
                State::Starting => match self.launch().await {
                    Ok(record) => {
                        if let Some(tx) = started.take() {
                            let _ = tx.send(Ok(record.pid));
                        }
                        current = Some(record);
                        Event::Launched
                    },
                    Err(e) => {
                        warn!(binary = %self.options.binary, error = %e, "Failed to start proxy");
                        match started.take() {
                            Some(tx) => {
                                let _ = tx.send(Err(e));
                            },
                            None => outcome = Err(e),
                        }
                        Event::LaunchFailed
                    },
                },
                State::Running => match current.as_mut() {
                    Some(record) => wait_event(&mut self.stop, record.wait()).await,
                    None => {
                        outcome = Err(Error::Supervisor("running without a proxy instance".into()));
                        break;
                    },
                },
                State::Crashed => {
                    if let Some(mut record) = current.take() {
                        let exit = record.wait().await;
                        warn!(pid = record.pid, exit = %exit, "Proxy exited unexpectedly");
                        record.finish().await;
                    }
                    self.pid.send_replace(None);

                    info!(
                        delay_ms = self.options.restart_delay.as_millis(),
                        "Sleeping before restarting proxy"
                    );
                    wait_restart_delay(&mut self.stop, self.options.restart_delay).await
                },
                State::Stopping => {
                    let mut exit = None;
                    if let Some(mut record) = current.take() {
                        match self.shutdown(&mut record).await {
                            Ok(status) => exit = Some(status),
                            Err(e) => {
                                error!(pid = record.pid, error = %e, "Stopping proxy failed");
                                outcome = Err(e);
                            },
                        }
                        if exit.is_some() {
                            record.finish().await;
                        }
                    }
                    self.pid.send_replace(None);
                    // Stopping ends here whether or not the exit was confirmed.
                    Event::Exited(exit.unwrap_or(Exit::WatcherGone))
                },
                State::Stopped => break,
            };

            let next = state.on_event(&event);
            if next != state {
                debug!(from = ?state, to = ?next, event = ?event, "Supervisor transition");
                state = next;
                self.state.send_replace(state);
            }
        }

        info!("Proxy supervisor stopped");
        outcome
    }

    async fn launch(&self) -> Result<ProcessRecord> {
        // Read at launch time: a restart picks up settings changed meanwhile.
        let level = self.settings.native_level();

        let record = ProcessRecord::spawn(&self.options, level, &self.sink)?;
        self.admin.record_launch_level(level).await;
        self.pid.send_replace(Some(record.pid));
        self.launches.send_modify(|count| *count += 1);

        info!(
            pid = record.pid,
            level = %level,
            base_id = self.options.base_id,
            "Proxy started"
        );
        Ok(record)
    }

    /// Graceful quit through the admin interface, kill as the fallback.
    async fn shutdown(&self, record: &mut ProcessRecord) -> Result<Exit> {
        let pid = record.pid;
        info!(pid = pid, "Stopping proxy");

        match self.admin.request_shutdown().await {
            Ok(()) => {
                if let Some(exit) = record.wait_timeout(self.options.stop_timeout).await {
                    info!(pid = pid, exit = %exit, "Proxy exited after admin quit");
                    return Ok(exit);
                }
                warn!(
                    pid = pid,
                    timeout_ms = self.options.stop_timeout.as_millis(),
                    "Proxy did not exit after admin quit, killing process"
                );
            },
            Err(e) => {
                warn!(pid = pid, error = %e, "Proxy admin quit failed, killing process");
            },
        }

        let exit = record.kill(self.options.stop_timeout).await?;
        info!(pid = pid, exit = %exit, "Proxy killed");
        Ok(exit)
    }
}
