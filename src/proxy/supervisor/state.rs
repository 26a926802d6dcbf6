//! Supervisor state machine.
//!
//! Transitions are a pure function of the current [`State`] and an
//! [`Event`]; the control task performs the side effects for each state and
//! feeds the resulting events back in.

use std::fmt;
use std::future::Future;
use std::process::ExitStatus;

use tokio::sync::watch;

/// Lifecycle of one supervised proxy lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Launching a proxy instance.
    Starting,
    /// An instance is up; waiting for it to exit or for a stop request.
    Running,
    /// The instance exited on its own; waiting out the restart delay.
    Crashed,
    /// A stop was requested; shutting the instance down.
    Stopping,
    /// Terminal.
    Stopped,
}

/// How a proxy instance ended, as seen by its exit watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Status(ExitStatus),
    WaitFailed(String),
    /// The watcher went away without reporting.
    WatcherGone,
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "{status}"),
            Self::WaitFailed(reason) => write!(f, "wait failed: {reason}"),
            Self::WatcherGone => f.write_str("exit watcher ended without a status"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Launched,
    LaunchFailed,
    Exited(Exit),
    StopRequested,
    RestartDelayElapsed,
}

impl State {
    /// Next state after `event`.
    ///
    /// Events that do not apply to the current state leave it unchanged; a
    /// stop seen while `Starting` is picked up again once `Running`.
    pub fn on_event(self, event: &Event) -> Self {
        match (self, event) {
            (Self::Starting, Event::Launched) => Self::Running,
            (Self::Starting, Event::LaunchFailed) => Self::Stopped,
            (Self::Running, Event::Exited(_)) => Self::Crashed,
            (Self::Running, Event::StopRequested) => Self::Stopping,
            (Self::Crashed, Event::RestartDelayElapsed) => Self::Starting,
            (Self::Crashed, Event::StopRequested) => Self::Stopped,
            (Self::Stopping, Event::Exited(_)) => Self::Stopped,
            (state, _) => state,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Resolves once a stop has been requested or the handle is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    // An error means the handle was dropped, which counts as a stop.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Wait for the next event while `Running`.
///
/// When a stop request and an exit are both ready, the stop wins.
pub(crate) async fn wait_event<F>(stop: &mut watch::Receiver<bool>, exit: F) -> Event
where
    F: Future<Output = Exit>,
{
    tokio::select! {
        biased;
        () = stop_requested(stop) => Event::StopRequested,
        exit = exit => Event::Exited(exit),
    }
}

/// Wait out `delay` after a crash unless a stop arrives first.
pub(crate) async fn wait_restart_delay(
    stop: &mut watch::Receiver<bool>,
    delay: std::time::Duration,
) -> Event {
    tokio::select! {
        biased;
        () = stop_requested(stop) => Event::StopRequested,
        () = tokio::time::sleep(delay) => Event::RestartDelayElapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future;
    use std::time::Duration;

    const ALL_STATES: [State; 5] = [
        State::Starting,
        State::Running,
        State::Crashed,
        State::Stopping,
        State::Stopped,
    ];

    fn all_events() -> Vec<Event> {
        vec![
            Event::Launched,
            Event::LaunchFailed,
            Event::Exited(Exit::WatcherGone),
            Event::StopRequested,
            Event::RestartDelayElapsed,
        ]
    }

    #[test]
    fn test_crash_restart_cycle() {
        let state = State::Starting
            .on_event(&Event::Launched)
            .on_event(&Event::Exited(Exit::WatcherGone));
        assert_eq!(state, State::Crashed);

        let state = state.on_event(&Event::RestartDelayElapsed);
        assert_eq!(state, State::Starting);
        assert_eq!(state.on_event(&Event::Launched), State::Running);
    }

    #[test]
    fn test_stop_paths() {
        assert_eq!(State::Running.on_event(&Event::StopRequested), State::Stopping);
        assert_eq!(
            State::Stopping.on_event(&Event::Exited(Exit::WatcherGone)),
            State::Stopped
        );
        // Stop during the restart delay: no relaunch.
        assert_eq!(State::Crashed.on_event(&Event::StopRequested), State::Stopped);
    }

    #[test]
    fn test_launch_failure_is_terminal() {
        assert_eq!(State::Starting.on_event(&Event::LaunchFailed), State::Stopped);
    }

    #[test]
    fn test_stopped_absorbs_everything() {
        for event in all_events() {
            assert_eq!(State::Stopped.on_event(&event), State::Stopped);
        }
    }

    #[test]
    fn test_running_only_entered_from_starting() {
        for state in ALL_STATES {
            for event in all_events() {
                let next = state.on_event(&event);
                if next == State::Running && state != State::Running {
                    assert_eq!(state, State::Starting, "{state:?} + {event:?}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_stop_wins_over_simultaneous_exit() {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        stop_tx.send_replace(true);

        let event = wait_event(&mut stop_rx, future::ready(Exit::WatcherGone)).await;
        assert_eq!(event, Event::StopRequested);
    }

    #[tokio::test]
    async fn test_exit_observed_without_stop() {
        let (_stop_tx, mut stop_rx) = watch::channel(false);

        let event = wait_event(&mut stop_rx, future::ready(Exit::WatcherGone)).await;
        assert_eq!(event, Event::Exited(Exit::WatcherGone));
    }

    #[tokio::test]
    async fn test_dropped_handle_counts_as_stop() {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        drop(stop_tx);

        let event = wait_event(&mut stop_rx, future::pending::<Exit>()).await;
        assert_eq!(event, Event::StopRequested);
    }

    #[tokio::test]
    async fn test_restart_delay_interrupted_by_stop() {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let waiter = tokio::spawn(async move {
            wait_restart_delay(&mut stop_rx, Duration::from_secs(60)).await
        });

        stop_tx.send_replace(true);
        let event = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("restart delay should end on stop")
            .unwrap();
        assert_eq!(event, Event::StopRequested);
    }

    #[tokio::test]
    async fn test_restart_delay_elapses() {
        let (_stop_tx, mut stop_rx) = watch::channel(false);
        let event = wait_restart_delay(&mut stop_rx, Duration::from_millis(10)).await;
        assert_eq!(event, Event::RestartDelayElapsed);
    }
}
