use std::{ffi::OsStr, path::Path, thread};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::{
    config::Config,
    error::{Error, Result},
    readiness,
    scratch::ScratchDir,
    server::{self, ServerProcess},
    shutdown,
    workload::PGHOST,
};

/// A running, ready PostgreSQL instance backed by a scratch directory.
///
/// Dropping the handle shuts the server down and removes the directory. The
/// drop blocks until the server process has exited, so it also runs when the
/// owning scope unwinds from a panic.
#[derive(Debug)]
pub struct TempPostgres {
    server: Option<ServerProcess>,
    scratch: ScratchDir,
    driver: Driver,
}

impl TempPostgres {
    /// Creates a scratch directory, initializes and starts the server, then
    /// blocks until it accepts connections.
    ///
    /// On any error everything provisioned so far is torn down before
    /// returning.
    pub fn start(config: &Config) -> Result<Self> {
        let driver = Driver::new()?;
        let scratch = ScratchDir::create(config.temp_root())?;
        driver.block_on(server::initialize(config, scratch.path()))?;
        let server =
            driver.block_on(async { server::start(config, scratch.path()) })?;
        let exit = server.exit_signal().clone();

        let instance = Self {
            server: Some(server),
            scratch,
            driver,
        };
        instance.block_on(readiness::await_ready(
            config,
            instance.socket_dir(),
            &exit,
        ))?;
        debug!(
            dir = %instance.socket_dir().display(),
            "postgres instance ready"
        );
        Ok(instance)
    }

    /// [`TempPostgres::start`] on tokio's blocking pool.
    ///
    /// If the returned future is dropped early, the start still completes in
    /// the background and the resulting instance is torn down there.
    pub async fn start_async(config: Config) -> Result<Self> {
        let started =
            tokio::task::spawn_blocking(move || Self::start(&config)).await;
        match started {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                std::panic::resume_unwind(err.into_panic())
            }
            Err(err) => Err(Error::Setup {
                source: std::io::Error::other(err),
            }),
        }
    }

    /// Directory holding the server's unix socket (and its data files).
    pub fn socket_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn data_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Environment needed by libpq clients to reach this instance.
    pub fn connection_env(&self) -> [(&'static str, &OsStr); 1] {
        [(PGHOST, self.socket_dir().as_os_str())]
    }

    /// Whether the server process has already terminated.
    pub fn has_exited(&self) -> bool {
        self.server
            .as_ref()
            .is_none_or(|server| server.exit_signal().has_exited())
    }

    /// Stops the server and removes the scratch directory.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    /// Runs `future` to completion on the runtime supervising this instance.
    pub(crate) fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        self.driver.block_on(future)
    }

    fn teardown(&mut self) {
        if let Some(mut server) = self.server.take() {
            let scratch = &mut self.scratch;
            self.driver.block_on(shutdown::teardown(&mut server, scratch));
        }
    }
}

impl Drop for TempPostgres {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Runtime owned by one instance.
///
/// Its worker keeps reaping the server and relaying output while the caller
/// is busy elsewhere; the calling thread only blocks on it for lifecycle
/// steps.
#[derive(Debug)]
struct Driver {
    runtime: Option<Runtime>,
}

impl Driver {
    fn new() -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tmppg-runtime")
            .enable_all()
            .build()
            .map_err(|source| Error::Setup { source })?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        let Some(runtime) = &self.runtime else {
            unreachable!("runtime is only taken on drop");
        };
        if Handle::try_current().is_err() {
            return runtime.block_on(future);
        }
        // Already inside some runtime, where `block_on` would panic.
        thread::scope(|scope| {
            match scope.spawn(|| runtime.block_on(future)).join() {
                Ok(output) => output,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        // Dropping a runtime inline panics inside async contexts.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
