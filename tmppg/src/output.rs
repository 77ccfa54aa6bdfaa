use std::{process::Stdio, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    task::JoinHandle,
    time::timeout,
};
use tracing::{Level, debug, error, info, trace, warn};

use crate::config::{Config, OutputSink};

impl OutputSink {
    fn stdio(self) -> Stdio {
        match self {
            OutputSink::Discard => Stdio::null(),
            OutputSink::Inherit => Stdio::inherit(),
            OutputSink::Log(_) => Stdio::piped(),
        }
    }
}

/// Builds a command for one of the PostgreSQL tools with the configured
/// output sinks attached.
pub(crate) fn tool_command(config: &Config, tool: &str) -> Command {
    let mut cmd = Command::new(config.program(tool));
    cmd.stdin(Stdio::null())
        .stdout(config.server_stdout.stdio())
        .stderr(config.server_stderr.stdio());
    cmd
}

/// Tasks forwarding piped tool output into `tracing`.
#[derive(Debug, Default)]
pub(crate) struct Relay {
    tasks: Vec<JoinHandle<()>>,
}

impl Relay {
    /// Takes the piped streams of `child`, if any, and starts forwarding.
    pub(crate) fn attach(
        config: &Config,
        tool: &'static str,
        child: &mut Child,
    ) -> Self {
        let mut relay = Relay::default();
        if let (OutputSink::Log(level), Some(out)) =
            (config.server_stdout, child.stdout.take())
        {
            relay.forward(out, tool, "stdout", level);
        }
        if let (OutputSink::Log(level), Some(err)) =
            (config.server_stderr, child.stderr.take())
        {
            relay.forward(err, tool, "stderr", level);
        }
        relay
    }

    fn forward<R>(
        &mut self,
        stream: R,
        tool: &'static str,
        output: &'static str,
        level: Level,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.tasks.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => emit(level, tool, output, &line),
                    Ok(None) => break,
                    Err(err) => {
                        debug!(
                            tool,
                            output,
                            error = %err,
                            "output relay stopped"
                        );
                        break;
                    }
                }
            }
        }));
    }

    /// Waits until every forwarded stream reached end of file.
    pub(crate) async fn join(self) {
        for task in self.tasks {
            if let Err(err) = task.await
                && err.is_panic()
            {
                warn!("output relay task panicked");
            }
        }
    }

    /// Like [`Relay::join`], but gives up after `grace`.
    ///
    /// A stream stays open as long as any process holding its write end is
    /// alive, which can outlast the tool itself. Relays still running after
    /// `grace` are aborted.
    pub(crate) async fn join_within(self, grace: Duration) {
        let aborts: Vec<_> =
            self.tasks.iter().map(JoinHandle::abort_handle).collect();
        if timeout(grace, self.join()).await.is_err() {
            debug!(?grace, "output still open, detaching relay");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

fn emit(level: Level, tool: &str, output: &str, line: &str) {
    if level == Level::ERROR {
        error!(tool, output, "{line}");
    } else if level == Level::WARN {
        warn!(tool, output, "{line}");
    } else if level == Level::INFO {
        info!(tool, output, "{line}");
    } else if level == Level::DEBUG {
        debug!(tool, output, "{line}");
    } else {
        trace!(tool, output, "{line}");
    }
}
