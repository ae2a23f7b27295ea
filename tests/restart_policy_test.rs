// Crash restart policy behavior with real crashing children

use mcproc::config::{ServerDefinition, SupervisorSettings};
use mcproc::supervisor::{ServerEventKind, ServerStatus, Supervisor};
use std::collections::HashMap;
use std::time::Duration;

fn crashing_def(name: &str) -> ServerDefinition {
    ServerDefinition {
        name: name.to_string(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), "exit 1".to_string()],
        env: HashMap::new(),
        working_dir: None,
        auto_restart: true,
        description: String::new(),
    }
}

#[tokio::test]
async fn test_crash_loop_gives_up_after_max_attempts() {
    let supervisor = Supervisor::new(SupervisorSettings {
        max_restart_attempts: 2,
        restart_delay_ms: 50,
        stop_timeout_ms: 500,
    });
    supervisor.add_definition(crashing_def("looper")).unwrap();

    supervisor.start("looper", None).await.unwrap();

    // crash, two restart attempts, crash again, give up
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let snapshot = supervisor.status("looper").unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
    assert_eq!(snapshot.restart_attempts, 2);
    assert_eq!(snapshot.last_exit_code, Some(1));
}

#[tokio::test]
async fn test_restart_events_carry_attempt_numbers() {
    let supervisor = Supervisor::new(SupervisorSettings {
        max_restart_attempts: 2,
        restart_delay_ms: 50,
        stop_timeout_ms: 500,
    });
    supervisor.add_definition(crashing_def("chatty")).unwrap();

    let mut events = supervisor.subscribe();
    supervisor.start("chatty", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let mut scheduled_attempts = Vec::new();
    let mut crashes = 0;
    while let Ok(event) = events.try_recv() {
        match event.kind {
            ServerEventKind::RestartScheduled { attempt, .. } => {
                scheduled_attempts.push(attempt)
            }
            ServerEventKind::Crashed { exit_code, .. } => {
                assert_eq!(exit_code, Some(1));
                crashes += 1;
            }
            _ => {}
        }
    }

    assert_eq!(scheduled_attempts, vec![1, 2]);
    assert_eq!(crashes, 3);
}

#[tokio::test]
async fn test_manual_start_resets_attempt_counter() {
    let supervisor = Supervisor::new(SupervisorSettings {
        max_restart_attempts: 1,
        restart_delay_ms: 50,
        stop_timeout_ms: 500,
    });
    supervisor.add_definition(crashing_def("reset")).unwrap();

    supervisor.start("reset", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    // policy exhausted
    let snapshot = supervisor.status("reset").unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
    assert_eq!(snapshot.restart_attempts, 1);

    // a manual start begins a fresh budget
    let snapshot = supervisor.start("reset", None).await.unwrap();
    assert_eq!(snapshot.restart_attempts, 0);
}

#[tokio::test]
async fn test_stop_during_crash_window_suppresses_restart() {
    let supervisor = Supervisor::new(SupervisorSettings {
        max_restart_attempts: 5,
        restart_delay_ms: 2000,
        stop_timeout_ms: 500,
    });
    supervisor.add_definition(crashing_def("window")).unwrap();

    supervisor.start("window", None).await.unwrap();

    // wait for the crash; the restart is now pending far in the future
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if supervisor.status("window").unwrap().status == ServerStatus::Crashed {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "never crashed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    supervisor.stop("window").await.unwrap();
    assert_eq!(
        supervisor.status("window").unwrap().status,
        ServerStatus::Stopped
    );

    // the scheduled restart must fire as a no-op
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        supervisor.status("window").unwrap().status,
        ServerStatus::Stopped
    );
}

#[tokio::test]
async fn test_restart_recovers_a_crashed_server() {
    let supervisor = Supervisor::new(SupervisorSettings {
        max_restart_attempts: 0,
        restart_delay_ms: 50,
        stop_timeout_ms: 500,
    });
    let mut def = crashing_def("phoenix");
    def.args = vec!["-c".to_string(), "sleep 30".to_string()];
    supervisor.add_definition(def).unwrap();

    supervisor.start("phoenix", None).await.unwrap();
    let first_pid = supervisor.status("phoenix").unwrap().pid;

    let snapshot = supervisor.restart("phoenix").await.unwrap();
    assert_eq!(snapshot.status, ServerStatus::Running);
    assert_ne!(snapshot.pid, first_pid);

    supervisor.stop("phoenix").await.unwrap();
}
