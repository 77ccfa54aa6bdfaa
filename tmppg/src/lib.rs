//! Throwaway PostgreSQL instances for tests and wrapped commands.
//!
//! Each instance lives in a fresh scratch directory: `initdb` populates it,
//! `postgres` serves it over a unix socket placed in the same directory (TCP
//! is disabled and durability settings are relaxed), and `pg_isready` is
//! polled until the server accepts connections. Each instance owns a small
//! tokio runtime whose monitor task reaps the server, so that a crash during
//! startup is reported immediately instead of hanging the readiness loop.
//!
//! Shutdown is tied to [`TempPostgres`]'s `Drop`: the server receives
//! `SIGTERM`, its exit is awaited, and only then is the directory removed.
//! This holds for normal returns, errors and unwinding panics alike.
//!
//! ```no_run
//! use tmppg::{Config, with_postgres};
//!
//! let rows = with_postgres(&Config::default(), |_socket_dir| {
//!     // connect with host = socket_dir
//!     Ok::<_, tmppg::Error>(0)
//! })?;
//! # Ok::<(), tmppg::Error>(())
//! ```

#[cfg(not(unix))]
compile_error!("tmppg requires a Unix platform (Linux or macOS)");

pub mod config;
pub mod error;
mod exit;
mod instance;
mod output;
mod readiness;
pub mod scratch;
mod server;
mod shutdown;
mod workload;

use std::path::Path;

pub use config::{Config, OutputSink};
pub use error::{Error, Phase, Result};
pub use exit::ExitOutcome;
pub use instance::TempPostgres;
pub use workload::PGHOST;

/// Runs `f` against a temporary PostgreSQL instance.
///
/// `f` receives the socket directory and is only called once the server is
/// ready. The instance is shut down and removed after `f` returns, fails, or
/// panics; the result of `f` is returned unchanged.
pub fn with_postgres<T, E, F>(
    config: &Config,
    f: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(&Path) -> std::result::Result<T, E>,
    E: From<Error>,
{
    let instance = TempPostgres::start(config)?;
    let result = f(instance.socket_dir());
    instance.shutdown();
    result
}

/// Runs an external command with a temporary PostgreSQL instance available.
///
/// Connection information is passed through `PGHOST`; every other libpq
/// parameter keeps its default. The command inherits the caller's standard
/// streams.
pub fn run_with_postgres(command: &[String], config: &Config) -> Result<()> {
    if command.is_empty() {
        return Err(Error::EmptyCommand);
    }
    let instance = TempPostgres::start(config)?;
    let result =
        instance.block_on(workload::run(command, instance.socket_dir()));
    instance.shutdown();
    result
}
