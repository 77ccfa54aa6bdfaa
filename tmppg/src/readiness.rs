//! Readiness polling with `pg_isready`, raced against the server's exit.

use std::{io, path::Path, process::ExitStatus, time::Duration};

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{Error, Result},
    exit::ExitSignal,
    output::{Relay, tool_command},
};

// pg_isready exit codes
const PQPING_REJECT: i32 = 1;
const PQPING_NO_RESPONSE: i32 = 2;

/// Classified result of a single probe.
#[derive(Debug)]
pub(crate) enum Readiness {
    Ready,
    /// Server is starting up or not answering yet; probe again.
    NotReady(ExitStatus),
    Fatal(String),
}

impl Readiness {
    fn classify(result: io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) if status.success() => Readiness::Ready,
            Ok(status) => match status.code() {
                Some(PQPING_REJECT | PQPING_NO_RESPONSE) => {
                    Readiness::NotReady(status)
                }
                _ => Readiness::Fatal(status.to_string()),
            },
            Err(err) => Readiness::Fatal(err.to_string()),
        }
    }
}

/// Runs one `pg_isready` against the socket in `socket_dir`.
pub(crate) async fn probe(config: &Config, socket_dir: &Path) -> Readiness {
    let mut cmd = tool_command(config, "pg_isready");
    cmd.arg("-q")
        .arg("-h")
        .arg(socket_dir)
        .arg("-d")
        .arg(&config.database);

    let result = match cmd.spawn() {
        Ok(mut child) => {
            let relay = Relay::attach(config, "pg_isready", &mut child);
            let waited = child.wait().await;
            relay.join().await;
            waited
        }
        Err(err) => Err(err),
    };
    let readiness = Readiness::classify(result);
    if let Readiness::Fatal(reason) = &readiness {
        debug!(args = ?cmd, %reason, "pg_isready failed with arguments");
    }
    readiness
}

/// Polls until the server accepts connections.
pub(crate) async fn await_ready(
    config: &Config,
    socket_dir: &Path,
    exit: &ExitSignal,
) -> Result<()> {
    poll(exit, config.poll_interval, config.ready_timeout, || {
        probe(config, socket_dir)
    })
    .await
}

/// Waits `interval` for an exit, then probes once, until the probe reports
/// ready. An observed exit always wins over a probe result.
async fn poll<F, Fut>(
    exit: &ExitSignal,
    interval: Duration,
    timeout: Option<Duration>,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Readiness>,
{
    let started = Instant::now();
    loop {
        tokio::select! {
            biased;
            outcome = exit.wait() => {
                return Err(Error::UnexpectedExit { outcome });
            }
            () = sleep(interval) => {}
        }
        if let Some(timeout) = timeout
            && started.elapsed() >= timeout
        {
            return Err(Error::ReadinessTimeout { timeout });
        }

        let readiness = probe().await;
        // The server may have died while the probe was running.
        if let Some(outcome) = exit.peek() {
            return Err(Error::UnexpectedExit { outcome });
        }
        match readiness {
            Readiness::Ready => {
                debug!(elapsed = ?started.elapsed(), "postgres is ready");
                return Ok(());
            }
            Readiness::NotReady(status) => {
                info!(%status, "waiting for PostgreSQL to be ready");
            }
            Readiness::Fatal(reason) => {
                return Err(Error::Readiness { reason });
            }
        }
    }
}
