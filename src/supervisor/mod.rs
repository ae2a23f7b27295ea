// Supervisor - sole owner and mutator of all server runtime state

mod spawner;
mod types;

pub use types::{ServerEvent, ServerEventKind, ServerRuntime, ServerSnapshot, ServerStatus};

use crate::config::{ServerDefinition, SupervisorSettings};
use crate::error::{McprocError, Result};
use crate::logs::{LogBroadcaster, LogLine};
use spawner::spawn_server;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};
use tokio::process::Child;
use tokio::sync::{broadcast, Mutex as AsyncMutex, Notify};
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for the reaper after a forced kill
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

struct ServerEntry {
    name: String,
    /// Serializes whole operations (start/stop/restart/remove) per name.
    /// Held across awaits; never taken by exit observers.
    op_lock: AsyncMutex<()>,
    /// Guards the runtime state; shared with exit observers. Never held
    /// across an await.
    runtime: Mutex<ServerRuntime>,
    exited: Notify,
}

struct Inner {
    settings: SupervisorSettings,
    registry: Mutex<Vec<Arc<ServerEntry>>>,
    events: broadcast::Sender<ServerEvent>,
    logs: LogBroadcaster,
}

/// Process supervisor for a dynamic set of named servers
///
/// Cheap to clone; all clones share the same supervised state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

/// Non-owning handle used by read-side consumers such as the health monitor
#[derive(Clone)]
pub struct WeakSupervisor(Weak<Inner>);

impl WeakSupervisor {
    pub fn upgrade(&self) -> Option<Supervisor> {
        self.0.upgrade().map(|inner| Supervisor { inner })
    }
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                settings,
                registry: Mutex::new(Vec::new()),
                events,
                logs: LogBroadcaster::new(),
            }),
        }
    }

    /// Create a supervisor with default settings
    pub fn with_defaults() -> Self {
        Self::new(SupervisorSettings::default())
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    pub fn downgrade(&self) -> WeakSupervisor {
        WeakSupervisor(Arc::downgrade(&self.inner))
    }

    /// Subscribe to state transition events (per-name delivery order matches
    /// occurrence order)
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to captured server output
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogLine> {
        self.inner.logs.subscribe()
    }

    /// Register a set of definitions, eagerly creating stopped entries
    pub fn load_definitions(&self, definitions: Vec<ServerDefinition>) -> Result<()> {
        for definition in definitions {
            self.add_definition(definition)?;
        }
        Ok(())
    }

    /// Register a new definition, or overwrite one whose server is stopped
    pub fn add_definition(&self, definition: ServerDefinition) -> Result<()> {
        definition.validate()?;

        let mut registry = self.inner.registry.lock().unwrap();
        if let Some(entry) = registry.iter().find(|e| e.name == definition.name) {
            let mut runtime = entry.runtime.lock().unwrap();
            if runtime.status != ServerStatus::Stopped {
                return Err(McprocError::AlreadyExists(definition.name));
            }
            info!("Replacing definition for server {}", definition.name);
            runtime.definition = definition;
        } else {
            debug!("Registered server {}", definition.name);
            registry.push(Arc::new(ServerEntry {
                name: definition.name.clone(),
                op_lock: AsyncMutex::new(()),
                runtime: Mutex::new(ServerRuntime::new(definition)),
                exited: Notify::new(),
            }));
        }
        Ok(())
    }

    /// Stop the server (best effort, bounded by the stop timeout) and delete
    /// its runtime state
    pub async fn remove_definition(&self, name: &str) -> Result<()> {
        let entry = self.find_entry(name)?;
        let _guard = entry.op_lock.lock().await;

        match self.stop_locked(&entry).await {
            Ok(()) | Err(McprocError::NotRunning(_)) => {}
            Err(e) => warn!("Best-effort stop of server {} failed during removal: {}", name, e),
        }

        let mut registry = self.inner.registry.lock().unwrap();
        registry.retain(|e| e.name != name);
        info!("Removed server {}", name);
        Ok(())
    }

    /// Start a server by name, optionally merging extra environment variables
    /// over its definition
    pub async fn start(
        &self,
        name: &str,
        override_env: Option<HashMap<String, String>>,
    ) -> Result<ServerSnapshot> {
        let entry = self.find_entry(name)?;
        let _guard = entry.op_lock.lock().await;
        // the entry may have been removed while we waited on the lock
        self.find_entry(name)?;
        self.start_locked(&entry, override_env.as_ref(), true).await
    }

    /// Gracefully stop a server, escalating to SIGKILL after the stop timeout
    pub async fn stop(&self, name: &str) -> Result<()> {
        let entry = self.find_entry(name)?;
        let _guard = entry.op_lock.lock().await;
        self.stop_locked(&entry).await
    }

    /// Stop (tolerating an already-stopped server) and start under one held
    /// operation lock
    pub async fn restart(&self, name: &str) -> Result<ServerSnapshot> {
        let entry = self.find_entry(name)?;
        let _guard = entry.op_lock.lock().await;

        match self.stop_locked(&entry).await {
            Ok(()) | Err(McprocError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }

        self.start_locked(&entry, None, true).await
    }

    /// Read-only snapshot of one server
    pub fn status(&self, name: &str) -> Result<ServerSnapshot> {
        let entry = self.find_entry(name)?;
        let snapshot = entry.runtime.lock().unwrap().snapshot();
        Ok(snapshot)
    }

    /// Snapshots of every server, in definition insertion order
    pub fn list(&self) -> Vec<ServerSnapshot> {
        let entries: Vec<Arc<ServerEntry>> =
            self.inner.registry.lock().unwrap().iter().cloned().collect();
        entries
            .iter()
            .map(|entry| entry.runtime.lock().unwrap().snapshot())
            .collect()
    }

    /// Gracefully stop every server, in definition order
    pub async fn stop_all(&self) {
        let entries: Vec<Arc<ServerEntry>> =
            self.inner.registry.lock().unwrap().iter().cloned().collect();

        info!("Stopping {} server(s)", entries.len());
        for entry in entries {
            let _guard = entry.op_lock.lock().await;
            match self.stop_locked(&entry).await {
                Ok(()) | Err(McprocError::NotRunning(_)) => {}
                Err(e) => error!("Failed to stop server {}: {}", entry.name, e),
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<ServerEntry>> {
        self.inner
            .registry
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    fn find_entry(&self, name: &str) -> Result<Arc<ServerEntry>> {
        self.lookup(name)
            .ok_or_else(|| McprocError::ServerNotFound(name.to_string()))
    }

    fn emit(&self, name: &str, kind: ServerEventKind) {
        let _ = self.inner.events.send(ServerEvent {
            name: name.to_string(),
            timestamp: SystemTime::now(),
            kind,
        });
    }

    /// Spawn the server; the caller must hold the entry's operation lock.
    /// A manual start resets the restart counter, an automatic one does not.
    async fn start_locked(
        &self,
        entry: &Arc<ServerEntry>,
        override_env: Option<&HashMap<String, String>>,
        manual: bool,
    ) -> Result<ServerSnapshot> {
        let (definition, generation) = {
            let mut runtime = entry.runtime.lock().unwrap();
            match runtime.status {
                ServerStatus::Starting | ServerStatus::Running => {
                    return Err(McprocError::AlreadyRunning(entry.name.clone()))
                }
                _ => {}
            }
            let generation = runtime.mark_starting();
            if manual {
                runtime.restart_attempts = 0;
            }
            (runtime.definition.clone(), generation)
        };

        match spawn_server(&definition, override_env).await {
            Ok(mut spawned) => {
                self.inner.logs.attach(
                    &entry.name,
                    spawned.child.stdout.take(),
                    spawned.child.stderr.take(),
                );

                let snapshot = {
                    let mut runtime = entry.runtime.lock().unwrap();
                    runtime.mark_running(spawned.pid);
                    self.emit(&entry.name, ServerEventKind::Started { pid: spawned.pid });
                    runtime.snapshot()
                };

                info!("Server {} started (pid {})", entry.name, spawned.pid);
                self.spawn_exit_watcher(entry.name.clone(), generation, spawned.child);
                Ok(snapshot)
            }
            Err(e) => {
                // a failed spawn is misconfiguration, not a crash: no retry
                entry.runtime.lock().unwrap().mark_errored();
                warn!("Failed to spawn server {}: {}", entry.name, e);
                Err(e)
            }
        }
    }

    /// The caller must hold the entry's operation lock
    async fn stop_locked(&self, entry: &Arc<ServerEntry>) -> Result<()> {
        let pid = {
            let mut runtime = entry.runtime.lock().unwrap();
            match runtime.status {
                ServerStatus::Stopped | ServerStatus::Errored => {
                    return Err(McprocError::NotRunning(entry.name.clone()))
                }
                ServerStatus::Crashed => {
                    // a restart may be pending; settling to stopped makes the
                    // deferred spawn a no-op at fire time
                    runtime.mark_stopped();
                    info!(
                        "Server {} stopped while crashed, pending restart suppressed",
                        entry.name
                    );
                    self.emit(&entry.name, ServerEventKind::Stopped { uptime_secs: 0 });
                    return Ok(());
                }
                ServerStatus::Starting | ServerStatus::Running | ServerStatus::Stopping => {
                    runtime.mark_stopping();
                    runtime.pid
                }
            }
        };

        let Some(pid) = pid else {
            entry.runtime.lock().unwrap().mark_stopped();
            return Ok(());
        };

        debug!("Sending SIGTERM to server {} (pid {})", entry.name, pid);
        if let Err(e) = send_signal(pid, TermSignal::Terminate) {
            // the child may already be gone; the exit observer settles state
            debug!("Failed to send SIGTERM to server {} (pid {}): {}", entry.name, pid, e);
        }

        let timeout = self.inner.settings.stop_timeout();
        if !self.wait_for_stop(entry, timeout).await {
            warn!(
                "Server {} did not exit within {:?}, sending SIGKILL",
                entry.name, timeout
            );
            if let Err(e) = send_signal(pid, TermSignal::Kill) {
                debug!("Failed to send SIGKILL to server {} (pid {}): {}", entry.name, pid, e);
            }

            if !self.wait_for_stop(entry, KILL_REAP_TIMEOUT).await {
                // the exit observer never reported; settle the state ourselves
                let mut runtime = entry.runtime.lock().unwrap();
                if runtime.status == ServerStatus::Stopping {
                    runtime.mark_stopped();
                    self.emit(&entry.name, ServerEventKind::Stopped { uptime_secs: 0 });
                }
            }
        }

        Ok(())
    }

    /// Wait until the exit observer has settled the entry to `Stopped`
    async fn wait_for_stop(&self, entry: &Arc<ServerEntry>, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if entry.runtime.lock().unwrap().status == ServerStatus::Stopped {
                return true;
            }
            let notified = entry.exited.notified();
            // re-check after registering so a notification cannot slip past
            if entry.runtime.lock().unwrap().status == ServerStatus::Stopped {
                return true;
            }
            match tokio::time::timeout_at(deadline, notified).await {
                Ok(()) => {}
                Err(_) => {
                    return entry.runtime.lock().unwrap().status == ServerStatus::Stopped;
                }
            }
        }
    }

    fn spawn_exit_watcher(&self, name: String, generation: u64, mut child: Child) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            supervisor.handle_exit(&name, generation, status);
        });
    }

    /// Classify and record a child exit; runs without the operation lock so a
    /// blocked `stop` can observe it
    fn handle_exit(
        &self,
        name: &str,
        generation: u64,
        status: std::io::Result<std::process::ExitStatus>,
    ) {
        let Some(entry) = self.lookup(name) else {
            debug!("Exit notification for removed server {}", name);
            return;
        };

        let mut runtime = entry.runtime.lock().unwrap();
        if runtime.generation != generation {
            debug!(
                "Stale exit notification for server {} (generation {})",
                name, generation
            );
            return;
        }

        let (code, signal) = match &status {
            Ok(s) => (s.code(), exit_signal(s)),
            Err(e) => {
                warn!("Failed to reap server {}: {}", name, e);
                (None, None)
            }
        };
        runtime.record_exit(code, signal);

        let uptime_secs = runtime
            .elapsed_since_start()
            .map(|d| d.as_secs())
            .unwrap_or(0);

        match runtime.status {
            ServerStatus::Stopping => {
                runtime.mark_stopped();
                self.emit(name, ServerEventKind::Stopped { uptime_secs });
                info!("Server {} stopped after {}s", name, uptime_secs);
            }
            ServerStatus::Starting | ServerStatus::Running => {
                if code == Some(0) {
                    runtime.mark_stopped();
                    self.emit(name, ServerEventKind::Stopped { uptime_secs });
                    info!("Server {} exited cleanly after {}s", name, uptime_secs);
                } else {
                    runtime.mark_crashed();
                    self.emit(
                        name,
                        ServerEventKind::Crashed {
                            exit_code: code,
                            signal,
                        },
                    );
                    warn!(
                        "Server {} crashed (exit code {:?}, signal {:?})",
                        name, code, signal
                    );
                    self.consider_restart(name, &mut runtime, generation);
                }
            }
            other => {
                debug!("Ignoring exit for server {} in state {}", name, other);
            }
        }

        drop(runtime);
        entry.exited.notify_one();
    }

    /// Crash restart policy; the caller holds the runtime lock
    fn consider_restart(&self, name: &str, runtime: &mut ServerRuntime, generation: u64) {
        if !runtime.definition.auto_restart {
            debug!("Server {} has auto-restart disabled", name);
            return;
        }

        let max = self.inner.settings.max_restart_attempts;
        if runtime.restart_attempts >= max {
            runtime.mark_stopped();
            warn!(
                "Server {} exceeded {} restart attempt(s), giving up",
                name, max
            );
            return;
        }

        runtime.restart_attempts += 1;
        let attempt = runtime.restart_attempts;
        let delay = self.inner.settings.restart_delay();
        self.emit(
            name,
            ServerEventKind::RestartScheduled {
                attempt,
                delay_ms: delay.as_millis() as u64,
            },
        );
        info!(
            "Scheduling restart {}/{} for server {} in {:?}",
            attempt, max, name, delay
        );

        let supervisor = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            supervisor.run_scheduled_restart(&name, generation).await;
        });
    }

    /// Fire a scheduled restart; a manual stop, start, or removal in the
    /// crash window turns this into a logged no-op
    async fn run_scheduled_restart(&self, name: &str, generation: u64) {
        let Some(entry) = self.lookup(name) else {
            debug!("Skipping scheduled restart for removed server {}", name);
            return;
        };

        let _guard = entry.op_lock.lock().await;
        {
            let runtime = entry.runtime.lock().unwrap();
            if runtime.status != ServerStatus::Crashed || runtime.generation != generation {
                debug!(
                    "Scheduled restart for server {} superseded (state {})",
                    name, runtime.status
                );
                return;
            }
        }

        if let Err(e) = self.start_locked(&entry, None, false).await {
            warn!("Automatic restart of server {} failed: {}", name, e);
        }
    }
}

enum TermSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: TermSignal) -> Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        TermSignal::Terminate => Signal::SIGTERM,
        TermSignal::Kill => Signal::SIGKILL,
    };
    signal::kill(Pid::from_raw(pid as i32), signal)
        .map_err(|e| McprocError::SignalError(format!("kill({}, {}): {}", pid, signal, e)))
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: TermSignal) -> Result<()> {
    Err(McprocError::SignalError(
        "signal-based stop is only supported on Unix".to_string(),
    ))
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
