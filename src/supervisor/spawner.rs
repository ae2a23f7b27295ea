use crate::config::ServerDefinition;
use crate::error::{McprocError, Result};
use crate::platform;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Metadata returned when spawning a server
#[derive(Debug)]
pub struct SpawnedServer {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Spawn a server process from its definition
///
/// The configured command is resolved through the platform adapter, the
/// definition's environment is merged over the inherited one (definition keys
/// win, per-call overrides win over both), and stdout/stderr are captured as
/// pipes for log fan-out.
pub async fn spawn_server(
    definition: &ServerDefinition,
    override_env: Option<&HashMap<String, String>>,
) -> Result<SpawnedServer> {
    let program = platform::resolve_command(&definition.command);

    let mut command = Command::new(&program);

    if !definition.args.is_empty() {
        command.args(&definition.args);
    }

    if let Some(ref dir) = definition.working_dir {
        command.current_dir(dir);
    }

    command.envs(&definition.env);
    if let Some(extra) = override_env {
        command.envs(extra);
    }

    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child = command.spawn().map_err(|e| {
        McprocError::SpawnFailure(definition.name.clone(), e.to_string())
    })?;

    let pid = child.id().ok_or_else(|| {
        McprocError::SpawnFailure(
            definition.name.clone(),
            "spawned child reported no PID".to_string(),
        )
    })?;

    Ok(SpawnedServer { child, pid })
}
