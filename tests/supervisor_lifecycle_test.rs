// End-to-end lifecycle tests driving real child processes

use mcproc::config::{ServerDefinition, SupervisorSettings};
use mcproc::supervisor::{ServerStatus, Supervisor};
use std::collections::HashMap;
use std::time::Duration;

fn shell_def(name: &str, script: &str, auto_restart: bool) -> ServerDefinition {
    ServerDefinition {
        name: name.to_string(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: HashMap::new(),
        working_dir: None,
        auto_restart,
        description: String::new(),
    }
}

fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        max_restart_attempts: 3,
        restart_delay_ms: 50,
        stop_timeout_ms: 500,
    }
}

async fn wait_for_status(
    supervisor: &Supervisor,
    name: &str,
    wanted: ServerStatus,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if supervisor.status(name).unwrap().status == wanted {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_clean_exit_settles_stopped() {
    let supervisor = Supervisor::new(fast_settings());
    supervisor
        .add_definition(shell_def("oneshot", "exit 0", true))
        .unwrap();

    supervisor.start("oneshot", None).await.unwrap();
    assert!(
        wait_for_status(
            &supervisor,
            "oneshot",
            ServerStatus::Stopped,
            Duration::from_secs(2)
        )
        .await
    );

    // a clean exit is not a crash, no restart may follow
    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = supervisor.status("oneshot").unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
    assert_eq!(snapshot.last_exit_code, Some(0));
    assert_eq!(snapshot.restart_attempts, 0);
}

#[tokio::test]
async fn test_graceful_stop() {
    let supervisor = Supervisor::new(fast_settings());
    supervisor
        .add_definition(shell_def("graceful", "sleep 30", false))
        .unwrap();

    let snapshot = supervisor.start("graceful", None).await.unwrap();
    assert_eq!(snapshot.status, ServerStatus::Running);

    supervisor.stop("graceful").await.unwrap();
    let snapshot = supervisor.status("graceful").unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill() {
    let supervisor = Supervisor::new(SupervisorSettings {
        max_restart_attempts: 0,
        restart_delay_ms: 50,
        stop_timeout_ms: 300,
    });
    // the child traps and ignores SIGTERM
    supervisor
        .add_definition(shell_def("stubborn", "trap '' TERM; sleep 30", false))
        .unwrap();

    supervisor.start("stubborn", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // stop still succeeds even though the child ignored SIGTERM
    supervisor.stop("stubborn").await.unwrap();
    assert_eq!(
        supervisor.status("stubborn").unwrap().status,
        ServerStatus::Stopped
    );
}

#[tokio::test]
async fn test_crash_without_auto_restart_stays_crashed() {
    let supervisor = Supervisor::new(fast_settings());
    supervisor
        .add_definition(shell_def("fragile", "exit 3", false))
        .unwrap();

    supervisor.start("fragile", None).await.unwrap();
    assert!(
        wait_for_status(
            &supervisor,
            "fragile",
            ServerStatus::Crashed,
            Duration::from_secs(2)
        )
        .await
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = supervisor.status("fragile").unwrap();
    assert_eq!(snapshot.status, ServerStatus::Crashed);
    assert_eq!(snapshot.last_exit_code, Some(3));
}

#[tokio::test]
async fn test_stop_all_stops_everything() {
    let supervisor = Supervisor::new(fast_settings());
    for name in ["one", "two", "three"] {
        supervisor
            .add_definition(shell_def(name, "sleep 30", false))
            .unwrap();
        supervisor.start(name, None).await.unwrap();
    }

    supervisor.stop_all().await;
    for snapshot in supervisor.list() {
        assert_eq!(snapshot.status, ServerStatus::Stopped);
    }
}

#[tokio::test]
async fn test_override_env_reaches_child() {
    let supervisor = Supervisor::new(fast_settings());
    supervisor
        .add_definition(shell_def(
            "envcheck",
            "test \"$MCPROC_TOKEN\" = sekrit",
            false,
        ))
        .unwrap();

    let mut env = HashMap::new();
    env.insert("MCPROC_TOKEN".to_string(), "sekrit".to_string());
    supervisor.start("envcheck", Some(env)).await.unwrap();

    // `test` exits 0 only when the variable was present
    assert!(
        wait_for_status(
            &supervisor,
            "envcheck",
            ServerStatus::Stopped,
            Duration::from_secs(2)
        )
        .await
    );
    assert_eq!(
        supervisor.status("envcheck").unwrap().last_exit_code,
        Some(0)
    );
}
