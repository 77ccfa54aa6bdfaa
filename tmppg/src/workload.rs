use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// libpq variable naming the server host; a directory selects a unix socket.
/// See <https://www.postgresql.org/docs/current/libpq-envars.html>.
pub const PGHOST: &str = "PGHOST";

/// Runs `command` with `PGHOST` pointing at `socket_dir`.
///
/// The rest of the environment and all three standard streams are inherited
/// from the current process.
pub(crate) async fn run(command: &[String], socket_dir: &Path) -> Result<()> {
    let (program, args) = command.split_first().ok_or(Error::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args).env(PGHOST, socket_dir);
    debug!(?command, host = %socket_dir.display(), "running workload");

    let status = cmd.status().await.map_err(|source| Error::WorkloadLaunch {
        command: command.to_vec(),
        source,
    })?;
    if !status.success() {
        return Err(Error::WorkloadFailed {
            command: command.to_vec(),
            status,
        });
    }
    Ok(())
}
