//! One launched proxy instance.
//!
//! A [`ProcessRecord`] lives from launch until the instance is gone. It owns
//! the exit watcher task (the only thing that waits on the child) and the
//! two tasks copying stdout and stderr into the log sink.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::state::Exit;
use super::types::SupervisorOptions;
use crate::log_sink::LogSink;
use crate::proxy::error::{Error, Result};
use crate::proxy::level::NativeLevel;

/// How long to wait for output pumps to drain after the instance exited.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const PUMP_BUFFER_SIZE: usize = 8 * 1024;

pub(crate) struct ProcessRecord {
    pub(crate) pid: u32,
    exit: oneshot::Receiver<Exit>,
    exited: Option<Exit>,
    watcher: JoinHandle<()>,
    pumps: Vec<JoinHandle<()>>,
}

impl ProcessRecord {
    /// Launch the proxy binary with `level` and wire its output into `sink`.
    pub(crate) fn spawn(
        options: &SupervisorOptions,
        level: NativeLevel,
        sink: &LogSink,
    ) -> Result<Self> {
        let mut cmd = Command::new(&options.binary);
        cmd.arg("-l")
            .arg(level.as_str())
            .arg("-c")
            .arg(&options.bootstrap_path)
            .arg("--base-id")
            .arg(options.base_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::launch(&options.binary, e))?;

        let pid = child.id().ok_or_else(|| {
            Error::launch(
                &options.binary,
                std::io::Error::other("process exited before its pid was read"),
            )
        })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, sink.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, sink.clone())));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let watcher = tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => Exit::Status(status),
                Err(e) => Exit::WaitFailed(e.to_string()),
            };
            let _ = exit_tx.send(exit);
        });

        Ok(Self {
            pid,
            exit: exit_rx,
            exited: None,
            watcher,
            pumps,
        })
    }

    /// Wait until the instance has exited. Cancel safe.
    pub(crate) async fn wait(&mut self) -> Exit {
        if let Some(exit) = &self.exited {
            return exit.clone();
        }
        let exit = (&mut self.exit).await.unwrap_or(Exit::WatcherGone);
        self.exited = Some(exit.clone());
        exit
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub(crate) async fn wait_timeout(&mut self, timeout: Duration) -> Option<Exit> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }

    /// The exit, if the watcher has already reported it.
    pub(crate) fn try_exited(&mut self) -> Option<Exit> {
        if self.exited.is_none() {
            self.exited = match self.exit.try_recv() {
                Ok(exit) => Some(exit),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(Exit::WatcherGone),
            };
        }
        self.exited.clone()
    }

    /// Kill the instance and wait up to `timeout` for the watcher to see it go.
    pub(crate) async fn kill(&mut self, timeout: Duration) -> Result<Exit> {
        if let Some(exit) = self.try_exited() {
            return Ok(exit);
        }

        kill_process(self.pid)?;

        self.wait_timeout(timeout).await.ok_or_else(|| {
            Error::forced_termination(
                self.pid,
                format!("still running {}ms after kill", timeout.as_millis()),
            )
        })
    }

    /// Join the watcher and let the output pumps drain.
    ///
    /// Call only after the exit was observed; the next instance is launched
    /// once this returns.
    pub(crate) async fn finish(self) {
        if let Err(e) = self.watcher.await {
            warn!(pid = self.pid, error = %e, "Proxy exit watcher failed");
        }

        for mut pump in self.pumps {
            if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pump).await.is_err() {
                // A grandchild may still hold the pipe open.
                debug!(pid = self.pid, "Abandoning proxy output pump");
                pump.abort();
            }
        }
    }
}

/// Copy everything from `reader` into `sink` until EOF.
async fn pump<R>(mut reader: R, sink: LogSink)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = sink.write(&buf[..n]) {
                    warn!(error = %e, "Failed to write proxy output to log");
                }
            },
            Err(e) => {
                debug!(error = %e, "Proxy output stream closed");
                break;
            },
        }
    }
    let _ = sink.flush();
}

/// Forcibly terminate `pid`. A process that is already gone is not an error.
#[cfg(unix)]
pub(crate) fn kill_process(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| Error::forced_termination(pid, "pid out of range"))?;

    match signal::kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::forced_termination(pid, e.to_string())),
    }
}

/// Forcibly terminate `pid`. A process that is already gone is not an error.
#[cfg(windows)]
pub(crate) fn kill_process(pid: u32) -> Result<()> {
    use std::os::windows::process::CommandExt;

    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .creation_flags(0x0800_0000) // CREATE_NO_WINDOW
        .status()
        .map_err(|e| Error::forced_termination(pid, e.to_string()))?;

    // 128: no such process
    if status.success() || status.code() == Some(128) {
        Ok(())
    } else {
        Err(Error::forced_termination(pid, format!("taskkill {status}")))
    }
}
