use crate::config::ServerDefinition;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Errored,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Stopped => write!(f, "stopped"),
            ServerStatus::Starting => write!(f, "starting"),
            ServerStatus::Running => write!(f, "running"),
            ServerStatus::Stopping => write!(f, "stopping"),
            ServerStatus::Crashed => write!(f, "crashed"),
            ServerStatus::Errored => write!(f, "errored"),
        }
    }
}

/// Live state of one supervised server, owned exclusively by the Supervisor
#[derive(Debug)]
pub struct ServerRuntime {
    pub definition: ServerDefinition,
    pub status: ServerStatus,
    pub pid: Option<u32>,
    pub started_at: Option<SystemTime>,
    pub last_exit_code: Option<i32>,
    pub last_exit_signal: Option<i32>,
    pub restart_attempts: u32,
    /// Incremented on every spawn; stale exit observers and stale scheduled
    /// restarts carry the generation they were created for and are ignored
    /// when it no longer matches.
    pub generation: u64,
}

impl ServerRuntime {
    pub fn new(definition: ServerDefinition) -> Self {
        Self {
            definition,
            status: ServerStatus::Stopped,
            pid: None,
            started_at: None,
            last_exit_code: None,
            last_exit_signal: None,
            restart_attempts: 0,
            generation: 0,
        }
    }

    /// Begin a spawn attempt; returns the new generation
    pub fn mark_starting(&mut self) -> u64 {
        self.status = ServerStatus::Starting;
        self.generation += 1;
        self.generation
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.status = ServerStatus::Running;
        self.pid = Some(pid);
        self.started_at = Some(SystemTime::now());
    }

    pub fn mark_stopping(&mut self) {
        self.status = ServerStatus::Stopping;
    }

    pub fn mark_stopped(&mut self) {
        self.status = ServerStatus::Stopped;
        self.pid = None;
    }

    pub fn mark_crashed(&mut self) {
        self.status = ServerStatus::Crashed;
        self.pid = None;
    }

    pub fn mark_errored(&mut self) {
        self.status = ServerStatus::Errored;
        self.pid = None;
    }

    pub fn record_exit(&mut self, code: Option<i32>, signal: Option<i32>) {
        self.last_exit_code = code;
        self.last_exit_signal = signal;
    }

    /// Uptime of the current incarnation, if it is running
    pub fn uptime(&self) -> Option<Duration> {
        match self.status {
            ServerStatus::Running | ServerStatus::Stopping => {
                self.started_at.and_then(|t| t.elapsed().ok())
            }
            _ => None,
        }
    }

    /// Time since the current incarnation started, regardless of status
    pub fn elapsed_since_start(&self) -> Option<Duration> {
        self.started_at.and_then(|t| t.elapsed().ok())
    }

    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            status: self.status,
            auto_restart: self.definition.auto_restart,
            pid: self.pid,
            started_at: self.started_at,
            uptime: self.uptime(),
            last_exit_code: self.last_exit_code,
            last_exit_signal: self.last_exit_signal,
            restart_attempts: self.restart_attempts,
        }
    }
}

/// Read-only, point-in-time copy of runtime state for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub name: String,
    pub description: String,
    pub status: ServerStatus,
    pub auto_restart: bool,
    pub pid: Option<u32>,
    pub started_at: Option<SystemTime>,
    pub uptime: Option<Duration>,
    pub last_exit_code: Option<i32>,
    pub last_exit_signal: Option<i32>,
    pub restart_attempts: u32,
}

/// State transition notification pushed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEvent {
    pub name: String,
    pub timestamp: SystemTime,
    pub kind: ServerEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEventKind {
    Started { pid: u32 },
    Stopped { uptime_secs: u64 },
    Crashed { exit_code: Option<i32>, signal: Option<i32> },
    RestartScheduled { attempt: u32, delay_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn definition(name: &str) -> ServerDefinition {
        ServerDefinition {
            name: name.to_string(),
            command: "/bin/echo".to_string(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            auto_restart: true,
            description: "test server".to_string(),
        }
    }

    #[test]
    fn test_runtime_starts_stopped() {
        let runtime = ServerRuntime::new(definition("fresh"));
        assert_eq!(runtime.status, ServerStatus::Stopped);
        assert_eq!(runtime.restart_attempts, 0);
        assert_eq!(runtime.generation, 0);
        assert!(runtime.pid.is_none());
        assert!(runtime.uptime().is_none());
    }

    #[test]
    fn test_generation_increments_per_spawn() {
        let mut runtime = ServerRuntime::new(definition("gen"));
        assert_eq!(runtime.mark_starting(), 1);
        runtime.mark_running(100);
        runtime.mark_crashed();
        assert_eq!(runtime.mark_starting(), 2);
    }

    #[test]
    fn test_mark_running_records_pid_and_start() {
        let mut runtime = ServerRuntime::new(definition("run"));
        runtime.mark_starting();
        runtime.mark_running(4242);
        assert_eq!(runtime.status, ServerStatus::Running);
        assert_eq!(runtime.pid, Some(4242));
        assert!(runtime.started_at.is_some());
        assert!(runtime.uptime().is_some());
    }

    #[test]
    fn test_mark_stopped_clears_pid() {
        let mut runtime = ServerRuntime::new(definition("stop"));
        runtime.mark_starting();
        runtime.mark_running(1);
        runtime.mark_stopped();
        assert_eq!(runtime.status, ServerStatus::Stopped);
        assert!(runtime.pid.is_none());
        assert!(runtime.uptime().is_none());
    }

    #[test]
    fn test_snapshot_reflects_runtime() {
        let mut runtime = ServerRuntime::new(definition("snap"));
        runtime.mark_starting();
        runtime.mark_running(7);
        runtime.record_exit(Some(0), None);

        let snapshot = runtime.snapshot();
        assert_eq!(snapshot.name, "snap");
        assert_eq!(snapshot.status, ServerStatus::Running);
        assert_eq!(snapshot.pid, Some(7));
        assert_eq!(snapshot.last_exit_code, Some(0));
        assert!(snapshot.auto_restart);
    }

    #[test]
    fn test_event_kind_wire_names() {
        let event = ServerEvent {
            name: "wire".to_string(),
            timestamp: SystemTime::now(),
            kind: ServerEventKind::RestartScheduled {
                attempt: 1,
                delay_ms: 50,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"restart-scheduled\""));

        let event = ServerEvent {
            name: "wire".to_string(),
            timestamp: SystemTime::now(),
            kind: ServerEventKind::Started { pid: 1 },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"started\""));
    }
}
