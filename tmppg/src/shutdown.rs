use tracing::{debug, error};

use crate::{exit::ExitOutcome, scratch::ScratchDir, server::ServerProcess};

/// Stops the server and removes its scratch directory.
///
/// Order is fixed: SIGTERM, wait for the exit, then remove the directory.
/// Every step is best effort; failures are logged and never returned.
pub(crate) async fn teardown(
    server: &mut ServerProcess,
    scratch: &mut ScratchDir,
) {
    if let Err(err) = server.terminate() {
        error!(error = %err, "failed to send SIGTERM to postgres");
    }

    match server.wait().await {
        ExitOutcome::Exited(status) if status.success() => {
            debug!("postgres exited cleanly");
        }
        ExitOutcome::Exited(status) => {
            error!(%status, "postgres exited with error");
        }
        ExitOutcome::WaitFailed(err) => {
            error!(error = %err, "failed to wait for postgres to exit");
        }
    }
    server.join_monitor().await;

    scratch.remove();
}
