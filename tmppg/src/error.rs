use std::{fmt, io, path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

use crate::exit::ExitOutcome;

/// Lifecycle phase in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Initialization,
    Start,
    Readiness,
    Workload,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Initialization => "initialization",
            Phase::Start => "start",
            Phase::Readiness => "readiness",
            Phase::Workload => "workload",
        };
        f.write_str(name)
    }
}

/// Fatal failures of a temporary PostgreSQL invocation.
///
/// Teardown problems (failing to signal the server, failing to remove the
/// scratch directory) are never represented here; they are logged while the
/// instance shuts down.
#[derive(Debug, Error)]
pub enum Error {
    #[error("setup temporary directory")]
    Setup {
        #[source]
        source: io::Error,
    },
    #[error("initdb: failed to launch {program}")]
    InitializationLaunch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("initdb: {status}")]
    Initialization { status: ExitStatus },
    #[error("start postgres")]
    Start {
        #[source]
        source: io::Error,
    },
    #[error("pg_isready: {reason}")]
    Readiness { reason: String },
    #[error("postgres did not become ready within {}", pretty(.timeout))]
    ReadinessTimeout { timeout: Duration },
    #[error("postgres exited unexpectedly: {outcome}")]
    UnexpectedExit { outcome: ExitOutcome },
    #[error("{command:?}: {source}")]
    WorkloadLaunch {
        command: Vec<String>,
        #[source]
        source: io::Error,
    },
    #[error("{command:?}: {status}")]
    WorkloadFailed {
        command: Vec<String>,
        status: ExitStatus,
    },
    #[error("no command given")]
    EmptyCommand,
}

impl Error {
    pub fn phase(&self) -> Phase {
        match self {
            Error::Setup { .. } => Phase::Setup,
            Error::InitializationLaunch { .. }
            | Error::Initialization { .. } => Phase::Initialization,
            Error::Start { .. } => Phase::Start,
            Error::Readiness { .. }
            | Error::ReadinessTimeout { .. }
            | Error::UnexpectedExit { .. } => Phase::Readiness,
            Error::WorkloadLaunch { .. }
            | Error::WorkloadFailed { .. }
            | Error::EmptyCommand => Phase::Workload,
        }
    }
}

fn pretty(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_failures_share_a_phase() {
        let errors = [
            Error::Readiness {
                reason: "exit status: 3".into(),
            },
            Error::ReadinessTimeout {
                timeout: Duration::from_secs(5),
            },
        ];
        for err in errors {
            assert_eq!(err.phase(), Phase::Readiness);
        }
    }

    #[test]
    fn timeout_message_is_human_readable() {
        let err = Error::ReadinessTimeout {
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "postgres did not become ready within 1s 500ms"
        );
    }

    #[test]
    fn workload_launch_mentions_command() {
        let err = Error::WorkloadLaunch {
            command: vec!["psql".into(), "-c".into(), "SELECT 1".into()],
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let message = err.to_string();
        assert!(message.starts_with(r#"["psql", "-c", "SELECT 1"]"#));
        assert_eq!(err.phase(), Phase::Workload);
    }
}
