use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum, error::ErrorKind};
use tmppg::{Config, OutputSink, config::DEFAULT_DATABASE};
use tracing::{Level, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "tmppg",
    version,
    about = "Run a command against a throwaway PostgreSQL instance",
    override_usage = "tmppg [OPTIONS] -- <COMMAND> [ARGS]..."
)]
struct Cli {
    /// Directory containing initdb, postgres and pg_isready
    #[arg(long, env = "TMPPG_BIN_DIR")]
    bin_dir: Option<PathBuf>,
    /// Where the PostgreSQL tools' own output goes
    #[arg(
        long,
        env = "TMPPG_SERVER_OUTPUT",
        value_enum,
        default_value_t = ServerOutput::Discard
    )]
    server_output: ServerOutput,
    /// Give up if the server is not ready in time (e.g. "30s")
    #[arg(long, env = "TMPPG_READY_TIMEOUT", value_parser = humantime::parse_duration)]
    ready_timeout: Option<Duration>,
    /// Database probed for readiness
    #[arg(long, env = "TMPPG_DATABASE", default_value = DEFAULT_DATABASE)]
    database: String,
    /// Parent directory for the scratch directory
    #[arg(long, env = "TMPPG_TEMP_ROOT")]
    temp_root: Option<PathBuf>,
    /// Command to run once the server is ready; PGHOST points at it
    #[arg(last = true, required = true, num_args = 1.., value_name = "COMMAND")]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ServerOutput {
    Discard,
    Inherit,
    Log,
}

impl From<ServerOutput> for OutputSink {
    fn from(value: ServerOutput) -> Self {
        match value {
            ServerOutput::Discard => OutputSink::Discard,
            ServerOutput::Inherit => OutputSink::Inherit,
            ServerOutput::Log => OutputSink::Log(Level::INFO),
        }
    }
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::default().with_database(&self.database);
        if let Some(dir) = &self.bin_dir {
            if !dir.is_dir() {
                bail!("bin dir {} is not a directory", dir.display());
            }
            config = config.with_bin_dir(dir);
        }
        if let Some(root) = &self.temp_root {
            config = config.with_temp_root(root);
        }
        if let Some(timeout) = self.ready_timeout {
            config = config.with_ready_timeout(timeout);
        }
        let sink = OutputSink::from(self.server_output);
        Ok(config.with_output(sink, sink))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => {
                    error!("usage: tmppg -- command [args...]");
                    ExitCode::FAILURE
                }
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<tmppg::Error>() {
                Some(core) => {
                    error!(phase = %core.phase(), "uncaught error: {err:#}")
                }
                None => error!("uncaught error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;
    tmppg::run_with_postgres(&cli.command, &config)?;
    Ok(())
}
