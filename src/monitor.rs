// Periodic health sampling over supervised servers

use crate::supervisor::{ServerSnapshot, ServerStatus, WeakSupervisor};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Sampling cadence for the health monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub snapshot_interval: Duration,
    pub list_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_secs(30),
            list_interval: Duration::from_secs(5),
        }
    }
}

/// Aggregate health counters derived from one pass over the server list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerHealth {
    pub total: usize,
    pub running: usize,
    pub crashed: usize,
    pub errored: usize,
    pub stopped: usize,
}

impl ServerHealth {
    fn from_servers(servers: &[ServerSnapshot]) -> Self {
        let mut health = Self {
            total: servers.len(),
            running: 0,
            crashed: 0,
            errored: 0,
            stopped: 0,
        };
        for server in servers {
            match server.status {
                ServerStatus::Running | ServerStatus::Starting | ServerStatus::Stopping => {
                    health.running += 1
                }
                ServerStatus::Crashed => health.crashed += 1,
                ServerStatus::Errored => health.errored += 1,
                ServerStatus::Stopped => health.stopped += 1,
            }
        }
        health
    }
}

/// A timestamped full snapshot of the supervised fleet
///
/// `degraded` is set when the supervisor was gone at sampling time; the
/// snapshot then carries no servers rather than stale ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub taken_at: SystemTime,
    pub degraded: bool,
    pub health: ServerHealth,
    pub servers: Vec<ServerSnapshot>,
}

impl StatusSnapshot {
    fn empty() -> Self {
        Self {
            taken_at: SystemTime::now(),
            degraded: false,
            health: ServerHealth::from_servers(&[]),
            servers: Vec::new(),
        }
    }

    fn degraded() -> Self {
        Self {
            taken_at: SystemTime::now(),
            degraded: true,
            health: ServerHealth::from_servers(&[]),
            servers: Vec::new(),
        }
    }
}

/// Samples the supervisor on two cadences: a fast list refresh and a slower
/// full status snapshot
///
/// Holds only a weak handle so a monitor task never keeps a shut-down
/// supervisor alive.
pub struct HealthMonitor {
    supervisor: WeakSupervisor,
    config: MonitorConfig,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    list_tx: watch::Sender<Vec<ServerSnapshot>>,
}

impl HealthMonitor {
    pub fn new(supervisor: WeakSupervisor, config: MonitorConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(StatusSnapshot::empty());
        let (list_tx, _) = watch::channel(Vec::new());
        Self {
            supervisor,
            config,
            snapshot_tx,
            list_tx,
        }
    }

    pub fn with_defaults(supervisor: WeakSupervisor) -> Self {
        Self::new(supervisor, MonitorConfig::default())
    }

    /// Latest full snapshots, updated every `snapshot_interval`
    pub fn snapshots(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Latest server lists, updated every `list_interval`
    pub fn list_updates(&self) -> watch::Receiver<Vec<ServerSnapshot>> {
        self.list_tx.subscribe()
    }

    /// Take one full snapshot immediately, outside the periodic schedule
    pub fn take_snapshot(&self) -> StatusSnapshot {
        let snapshot = match self.supervisor.upgrade() {
            Some(supervisor) => {
                let servers = supervisor.list();
                StatusSnapshot {
                    taken_at: SystemTime::now(),
                    degraded: false,
                    health: ServerHealth::from_servers(&servers),
                    servers,
                }
            }
            None => {
                warn!("Supervisor gone, reporting degraded snapshot");
                StatusSnapshot::degraded()
            }
        };
        let _ = self.snapshot_tx.send(snapshot.clone());
        snapshot
    }

    fn poll_list(&self) -> bool {
        match self.supervisor.upgrade() {
            Some(supervisor) => {
                let _ = self.list_tx.send(supervisor.list());
                true
            }
            None => false,
        }
    }

    /// Run the sampling loops until the supervisor is dropped
    pub async fn run(self) {
        info!(
            "Health monitor started (snapshot every {:?}, list every {:?})",
            self.config.snapshot_interval, self.config.list_interval
        );

        let mut snapshot_timer = tokio::time::interval(self.config.snapshot_interval);
        let mut list_timer = tokio::time::interval(self.config.list_interval);
        snapshot_timer.tick().await;
        list_timer.tick().await;

        loop {
            tokio::select! {
                _ = snapshot_timer.tick() => {
                    let snapshot = self.take_snapshot();
                    debug!(
                        "Health snapshot: {}/{} running, {} crashed",
                        snapshot.health.running, snapshot.health.total, snapshot.health.crashed
                    );
                    if snapshot.degraded {
                        break;
                    }
                }
                _ = list_timer.tick() => {
                    if !self.poll_list() {
                        break;
                    }
                }
            }
        }

        info!("Health monitor exiting, supervisor is gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerDefinition;
    use crate::supervisor::Supervisor;
    use std::collections::HashMap;

    fn noop_def(name: &str) -> ServerDefinition {
        ServerDefinition {
            name: name.to_string(),
            command: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "sleep 10".to_string()],
            env: HashMap::new(),
            working_dir: None,
            auto_restart: false,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_counts_by_status() {
        let supervisor = Supervisor::with_defaults();
        supervisor.add_definition(noop_def("a")).unwrap();
        supervisor.add_definition(noop_def("b")).unwrap();
        supervisor.start("a", None).await.unwrap();

        let monitor = HealthMonitor::with_defaults(supervisor.downgrade());
        let snapshot = monitor.take_snapshot();

        assert!(!snapshot.degraded);
        assert_eq!(snapshot.health.total, 2);
        assert_eq!(snapshot.health.running, 1);
        assert_eq!(snapshot.health.stopped, 1);
        assert_eq!(snapshot.servers.len(), 2);

        supervisor.stop("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_degrades_when_supervisor_dropped() {
        let supervisor = Supervisor::with_defaults();
        let monitor = HealthMonitor::with_defaults(supervisor.downgrade());
        drop(supervisor);

        let snapshot = monitor.take_snapshot();
        assert!(snapshot.degraded);
        assert!(snapshot.servers.is_empty());
    }

    #[tokio::test]
    async fn test_watch_channels_carry_updates() {
        let supervisor = Supervisor::with_defaults();
        supervisor.add_definition(noop_def("watched")).unwrap();

        let monitor = HealthMonitor::with_defaults(supervisor.downgrade());
        let mut snapshots = monitor.snapshots();

        monitor.take_snapshot();
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow().servers.len(), 1);
    }
}
