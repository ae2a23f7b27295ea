// Control socket client used by the CLI

use crate::error::{McprocError, Result};
use crate::ipc::protocol::{Command, Request, Response, ResponseData, StreamFrame};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct IpcClient {
    socket_path: PathBuf,
    next_id: AtomicU64,
}

impl IpcClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            next_id: AtomicU64::new(1),
        }
    }

    fn connect(&self) -> Result<UnixStream> {
        let mut last_error = None;
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match UnixStream::connect(&self.socket_path) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRY_ATTEMPTS {
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }
        Err(McprocError::ConnectionError(format!(
            "{} (is the daemon running at {}?)",
            last_error.map(|e| e.to_string()).unwrap_or_default(),
            self.socket_path.display()
        )))
    }

    /// Send one command and wait for its response
    pub fn send_command(&self, command: Command) -> Result<ResponseData> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, command };

        let mut stream = self.connect()?;
        let mut payload = serde_json::to_vec(&request)?;
        payload.push(b'\n');
        stream.write_all(&payload)?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line.is_empty() {
            return Err(McprocError::ProtocolError(
                "connection closed before response".to_string(),
            ));
        }

        let response: Response = serde_json::from_str(&line)
            .map_err(|e| McprocError::DeserializationError(e.to_string()))?;
        if response.id != id {
            return Err(McprocError::ProtocolError(format!(
                "response id {} does not match request id {}",
                response.id, id
            )));
        }

        response.result.map_err(McprocError::Other)
    }

    /// Open a long-lived push stream (the command must be `Subscribe` or
    /// `Tail`)
    pub fn open_stream(&self, command: Command) -> Result<IpcStream> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, command };

        let mut stream = self.connect()?;
        let mut payload = serde_json::to_vec(&request)?;
        payload.push(b'\n');
        stream.write_all(&payload)?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let response: Response = serde_json::from_str(&line)
            .map_err(|e| McprocError::DeserializationError(e.to_string()))?;
        match response.result {
            Ok(ResponseData::Subscribed) => Ok(IpcStream { reader }),
            Ok(other) => Err(McprocError::ProtocolError(format!(
                "expected subscription acknowledgement, got {:?}",
                other
            ))),
            Err(e) => Err(McprocError::Other(e)),
        }
    }
}

/// Reader side of a `Subscribe` or `Tail` stream
pub struct IpcStream {
    reader: BufReader<UnixStream>,
}

impl IpcStream {
    /// Block until the next frame arrives; `None` when the daemon closes
    /// the connection
    pub fn next_frame(&mut self) -> Result<Option<StreamFrame>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.reader.read_line(&mut line)?;
            if read == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            let frame = serde_json::from_str(&line)
                .map_err(|e| McprocError::DeserializationError(e.to_string()))?;
            return Ok(Some(frame));
        }
    }
}
