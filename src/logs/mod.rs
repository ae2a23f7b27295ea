// Log fan-out - broadcasts child output lines to any number of subscribers

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::broadcast;
use tracing::debug;

const LOG_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStream::Stdout => write!(f, "stdout"),
            LogStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of captured server output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub name: String,
    pub stream: LogStream,
    pub line: String,
    pub timestamp: SystemTime,
}

/// Append-only fan-out of child output: every subscriber sees every line
pub struct LogBroadcaster {
    tx: broadcast::Sender<LogLine>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.tx.subscribe()
    }

    /// Attach reader tasks to a freshly spawned child's output pipes
    pub fn attach(&self, name: &str, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
        if let Some(out) = stdout {
            self.spawn_reader(name.to_string(), LogStream::Stdout, out);
        }
        if let Some(err) = stderr {
            self.spawn_reader(name.to_string(), LogStream::Stderr, err);
        }
    }

    fn spawn_reader<R>(&self, name: String, stream: LogStream, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(LogLine {
                    name: name.clone(),
                    stream,
                    line,
                    timestamp: SystemTime::now(),
                });
            }
            debug!("Log stream {} for server {} closed", stream, name);
        });
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
