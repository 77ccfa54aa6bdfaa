//! Instance configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::Level;

/// Database probed for readiness unless configured otherwise.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Delay between two readiness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Destination for one output stream of the PostgreSQL tools.
///
/// Only `initdb`, `postgres` and `pg_isready` are affected; wrapped workloads
/// always inherit the caller's streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSink {
    /// Drop everything (the null device).
    #[default]
    Discard,
    /// Share the calling process's stream.
    Inherit,
    /// Emit each line as a `tracing` event at the given level.
    Log(Level),
}

/// Settings for one temporary PostgreSQL instance.
///
/// `Config::default()` resolves binaries through `PATH`, discards server
/// output, probes the `postgres` database every 100ms and waits for
/// readiness without a deadline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing `initdb`, `postgres` and `pg_isready`.
    pub bin_dir: Option<PathBuf>,
    pub server_stdout: OutputSink,
    pub server_stderr: OutputSink,
    /// Database name handed to `pg_isready`.
    pub database: String,
    pub poll_interval: Duration,
    /// Upper bound on the readiness wait. `None` retries until the server
    /// becomes ready or exits.
    pub ready_timeout: Option<Duration>,
    /// Parent of the scratch directory; the system temp dir when `None`.
    pub temp_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bin_dir: None,
            server_stdout: OutputSink::Discard,
            server_stderr: OutputSink::Discard,
            database: DEFAULT_DATABASE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            ready_timeout: None,
            temp_root: None,
        }
    }
}

impl Config {
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    pub fn with_output(mut self, stdout: OutputSink, stderr: OutputSink) -> Self {
        self.server_stdout = stdout;
        self.server_stderr = stderr;
        self
    }

    /// Route both server streams into `tracing` at `level`.
    pub fn with_log_output(self, level: Level) -> Self {
        self.with_output(OutputSink::Log(level), OutputSink::Log(level))
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Path used to launch one of the PostgreSQL tools.
    pub(crate) fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    pub(crate) fn temp_root(&self) -> Option<&Path> {
        self.temp_root.as_deref()
    }
}
