//! PostgreSQL process supervision: one-time bootstrap, server launch,
//! background exit monitoring and graceful termination.

use std::{ffi::OsString, io, path::Path, sync::Arc, time::Duration};

use nix::{
    errno::Errno,
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use tokio::{process::Child, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    config::Config,
    error::{Error, Result},
    exit::{self, ExitOutcome, ExitPublisher, ExitSignal},
    output::{Relay, tool_command},
};

/// How long teardown keeps draining server output after the exit.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs `initdb` against `data_dir` and waits for it to finish.
pub(crate) async fn initialize(config: &Config, data_dir: &Path) -> Result<()> {
    let mut cmd = tool_command(config, "initdb");
    cmd.arg("-D")
        .arg(data_dir)
        .args(["--no-sync", "--no-instructions"]);

    let program = config.program("initdb");
    let mut child = cmd.spawn().map_err(|source| {
        debug!(args = ?cmd, error = %source, "initdb failed to launch");
        Error::InitializationLaunch {
            program: program.clone(),
            source,
        }
    })?;
    let relay = Relay::attach(config, "initdb", &mut child);
    let waited = child.wait().await;
    relay.join().await;

    let status = waited
        .map_err(|source| Error::InitializationLaunch { program, source })?;
    if !status.success() {
        debug!(args = ?cmd, %status, "initdb failed with arguments");
        return Err(Error::Initialization { status });
    }
    Ok(())
}

/// Handle to a running server. Valid until its exit has been observed.
#[derive(Debug)]
pub(crate) struct ServerProcess {
    pid: Pid,
    exit: ExitSignal,
    monitor: Option<JoinHandle<()>>,
    relay: Option<Relay>,
}

/// Launches `postgres` on `data_dir` with TCP disabled, its socket in the
/// data directory, and durability traded for speed.
///
/// Must be called from within the runtime that will drive the monitor.
pub(crate) fn start(config: &Config, data_dir: &Path) -> Result<ServerProcess> {
    let mut socket_dirs = OsString::from("--unix_socket_directories=");
    socket_dirs.push(data_dir);

    let mut cmd = tool_command(config, "postgres");
    cmd.arg("-D")
        .arg(data_dir)
        .arg("--listen_addresses=")
        .arg(socket_dirs)
        .args([
            "--fsync=off",
            "--synchronous_commit=off",
            "--full_page_writes=off",
        ]);

    let mut child = cmd.spawn().map_err(|source| {
        debug!(args = ?cmd, error = %source, "postgres failed with arguments");
        Error::Start { source }
    })?;
    // Only unset once the child has been reaped, which needs an await.
    let Some(id) = child.id() else {
        return Err(Error::Start {
            source: io::Error::other("postgres has no pid"),
        });
    };
    debug!(pid = id, "postgres started");
    let relay = Relay::attach(config, "postgres", &mut child);
    Ok(ServerProcess::monitor(Pid::from_raw(id as i32), child, relay))
}

impl ServerProcess {
    /// Moves `child` onto a task that reaps it and publishes the outcome
    /// exactly once.
    fn monitor(pid: Pid, child: Child, relay: Relay) -> Self {
        let (publisher, exit) = exit::channel();
        let monitor = tokio::spawn(watch(child, publisher));
        Self {
            pid,
            exit,
            monitor: Some(monitor),
            relay: Some(relay),
        }
    }

    pub(crate) fn exit_signal(&self) -> &ExitSignal {
        &self.exit
    }

    /// Requests a graceful shutdown with `SIGTERM`.
    ///
    /// Skipped once the exit has been observed, since the pid may already
    /// belong to another process.
    pub(crate) fn terminate(&self) -> std::result::Result<(), Errno> {
        if self.exit.has_exited() {
            debug!(pid = %self.pid, "postgres already exited, not signalling");
            return Ok(());
        }
        debug!(pid = %self.pid, "sending SIGTERM to postgres");
        kill(self.pid, Signal::SIGTERM)
    }

    /// Resolves once the exit monitor published the outcome.
    pub(crate) async fn wait(&self) -> ExitOutcome {
        self.exit.wait().await
    }

    /// Joins the monitor task and stops relaying output. Only call after
    /// [`ServerProcess::wait`].
    pub(crate) async fn join_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take()
            && let Err(err) = monitor.await
            && err.is_panic()
        {
            warn!("postgres exit monitor panicked");
        }
        if let Some(relay) = self.relay.take() {
            relay.join_within(OUTPUT_DRAIN_GRACE).await;
        }
    }
}

/// Reaps `child` and publishes right away; output relays are drained
/// separately so an inherited pipe cannot delay the notification.
async fn watch(mut child: Child, publisher: ExitPublisher) {
    let outcome = match child.wait().await {
        Ok(status) => ExitOutcome::Exited(status),
        Err(err) => ExitOutcome::WaitFailed(Arc::new(err)),
    };
    debug!(%outcome, "postgres exit observed");
    publisher.publish(outcome);
}
