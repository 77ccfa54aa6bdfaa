//! One-shot notification of the server's termination.
//!
//! The exit monitor owns the only [`ExitPublisher`]; every other component
//! holds an [`ExitSignal`] and may peek or wait any number of times. Once the
//! outcome is published it never changes.

use std::{fmt, io, process::ExitStatus, sync::Arc};

use tokio::sync::watch;

/// Terminal outcome of the server process as observed by the exit monitor.
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    /// The process was reaped with this status.
    Exited(ExitStatus),
    /// The process could not be observed at all.
    WaitFailed(Arc<io::Error>),
}

impl ExitOutcome {
    /// `true` for a voluntary exit with status zero.
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitOutcome::Exited(status) if status.success())
    }

    fn monitor_stopped() -> Self {
        let err = io::Error::other("exit monitor stopped without reporting");
        ExitOutcome::WaitFailed(Arc::new(err))
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(status) => write!(f, "{status}"),
            ExitOutcome::WaitFailed(err) => write!(f, "wait failed: {err}"),
        }
    }
}

/// Creates a connected publisher/signal pair.
pub(crate) fn channel() -> (ExitPublisher, ExitSignal) {
    let (tx, rx) = watch::channel(None);
    (ExitPublisher { tx }, ExitSignal { rx })
}

/// Write half. Publishing consumes it, so the outcome is set at most once.
///
/// Dropping it unpublished makes every waiter observe a wait failure.
#[derive(Debug)]
pub(crate) struct ExitPublisher {
    tx: watch::Sender<Option<ExitOutcome>>,
}

impl ExitPublisher {
    pub(crate) fn publish(self, outcome: ExitOutcome) {
        self.tx.send_replace(Some(outcome));
    }
}

/// Read half of the exit notification.
#[derive(Debug, Clone)]
pub(crate) struct ExitSignal {
    rx: watch::Receiver<Option<ExitOutcome>>,
}

impl ExitSignal {
    /// Returns the outcome if the server has already exited, without waiting.
    pub(crate) fn peek(&self) -> Option<ExitOutcome> {
        self.rx.borrow().clone()
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolves once the outcome is published.
    pub(crate) async fn wait(&self) -> ExitOutcome {
        let mut rx = self.rx.clone();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        published.unwrap_or_else(ExitOutcome::monitor_stopped)
    }
}
