// Control socket server side

use crate::error::{McprocError, Result};
use crate::ipc::protocol::{Command, Request, Response, ResponseData, StreamFrame};
use crate::supervisor::Supervisor;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/mcproc.sock";

pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind the control socket, replacing a stale socket file if one exists
    pub fn bind(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();

        if socket_path.exists() {
            debug!("Removing stale socket at {}", socket_path.display());
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)
            .map_err(|e| McprocError::IpcError(format!("bind {}: {}", socket_path.display(), e)))?;

        // only the owning user may control the daemon
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!("Control socket listening at {}", socket_path.display());
        Ok(Self {
            socket_path,
            listener,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the task is dropped
    pub async fn run(&self, supervisor: Supervisor) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let supervisor = supervisor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, supervisor).await {
                            debug!("Connection ended with error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                }
            }
        }
    }

    pub fn cleanup(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove socket {}: {}", self.socket_path.display(), e);
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

async fn handle_connection(stream: UnixStream, supervisor: Supervisor) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let response = Response::error(0, format!("malformed request: {}", e));
                write_json(&mut writer, &response).await?;
                continue;
            }
        };

        debug!("Request {}: {:?}", request.id, request.command);

        // streaming commands take over the connection
        match request.command {
            Command::Subscribe => {
                write_json(&mut writer, &Response::success(request.id, ResponseData::Subscribed))
                    .await?;
                return stream_events(writer, supervisor).await;
            }
            Command::Tail { name } => {
                write_json(&mut writer, &Response::success(request.id, ResponseData::Subscribed))
                    .await?;
                return stream_logs(writer, supervisor, name).await;
            }
            command => {
                let response = dispatch(&supervisor, request.id, command).await;
                write_json(&mut writer, &response).await?;
            }
        }
    }

    Ok(())
}

/// Execute one control command against the supervisor
pub async fn dispatch(supervisor: &Supervisor, id: u64, command: Command) -> Response {
    let result = match command {
        Command::List => Ok(ResponseData::ServerList {
            servers: supervisor.list(),
        }),
        Command::Start { name, env } => {
            let env = if env.is_empty() { None } else { Some(env) };
            supervisor
                .start(&name, env)
                .await
                .map(|snapshot| ResponseData::Started {
                    name,
                    pid: snapshot.pid,
                })
        }
        Command::Stop { name } => supervisor
            .stop(&name)
            .await
            .map(|()| ResponseData::Stopped { name }),
        Command::Restart { name } => supervisor
            .restart(&name)
            .await
            .map(|snapshot| ResponseData::Restarted {
                name,
                pid: snapshot.pid,
            }),
        Command::Status { name } => supervisor
            .status(&name)
            .map(|server| ResponseData::Status { server }),
        Command::Add { definition } => {
            let name = definition.name.clone();
            supervisor
                .add_definition(definition)
                .map(|()| ResponseData::Added { name })
        }
        Command::Remove { name } => supervisor
            .remove_definition(&name)
            .await
            .map(|()| ResponseData::Removed { name }),
        Command::Subscribe | Command::Tail { .. } => {
            // handled at the connection level
            return Response::error(id, "streaming command on non-streaming path");
        }
    };

    match result {
        Ok(data) => Response::success(id, data),
        Err(e) => Response::error(id, e.to_string()),
    }
}

async fn stream_events(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    supervisor: Supervisor,
) -> Result<()> {
    let mut events = supervisor.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => write_json(&mut writer, &StreamFrame::Event(event)).await?,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event subscriber lagged, {} event(s) dropped", skipped);
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

async fn stream_logs(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    supervisor: Supervisor,
    name: Option<String>,
) -> Result<()> {
    let mut logs = supervisor.subscribe_logs();
    loop {
        match logs.recv().await {
            Ok(line) => {
                if let Some(ref wanted) = name {
                    if &line.name != wanted {
                        continue;
                    }
                }
                write_json(&mut writer, &StreamFrame::Log(line)).await?;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Log subscriber lagged, {} line(s) dropped", skipped);
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: serde::Serialize,
{
    let mut payload = serde_json::to_vec(value)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}
