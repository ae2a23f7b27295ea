// Terminal formatting for CLI output

use crate::ipc::StreamFrame;
use crate::logs::LogStream;
use crate::supervisor::{ServerEventKind, ServerSnapshot, ServerStatus};
use chrono::{DateTime, Local};
use colored::Colorize;
use std::time::{Duration, SystemTime};
use tabled::settings::Style;
use tabled::{Table, Tabled};

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Restarts")]
    restarts: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn print_server_table(servers: &[ServerSnapshot]) {
    if servers.is_empty() {
        println!("No servers registered");
        return;
    }

    let rows: Vec<ServerRow> = servers
        .iter()
        .map(|server| ServerRow {
            name: server.name.clone(),
            status: colorize_status(server.status),
            pid: server
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            uptime: server
                .uptime
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string()),
            restarts: server.restart_attempts.to_string(),
            description: server.description.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

pub fn print_server_detail(server: &ServerSnapshot) {
    println!("{}: {}", "Name".bold(), server.name);
    if !server.description.is_empty() {
        println!("{}: {}", "Description".bold(), server.description);
    }
    println!("{}: {}", "Status".bold(), colorize_status(server.status));
    println!(
        "{}: {}",
        "Auto-restart".bold(),
        if server.auto_restart { "yes" } else { "no" }
    );
    if let Some(pid) = server.pid {
        println!("{}: {}", "PID".bold(), pid);
    }
    if let Some(started_at) = server.started_at {
        println!("{}: {}", "Started".bold(), format_timestamp(started_at));
    }
    if let Some(uptime) = server.uptime {
        println!("{}: {}", "Uptime".bold(), format_duration(uptime));
    }
    if let Some(code) = server.last_exit_code {
        println!("{}: {}", "Last exit code".bold(), code);
    }
    if let Some(signal) = server.last_exit_signal {
        println!("{}: {}", "Last exit signal".bold(), signal);
    }
    println!("{}: {}", "Restart attempts".bold(), server.restart_attempts);
}

pub fn print_frame(frame: &StreamFrame) {
    match frame {
        StreamFrame::Event(event) => {
            let when = format_timestamp(event.timestamp);
            let what = match &event.kind {
                ServerEventKind::Started { pid } => {
                    format!("{} (pid {})", "started".green(), pid)
                }
                ServerEventKind::Stopped { uptime_secs } => {
                    format!("{} after {}s", "stopped".yellow(), uptime_secs)
                }
                ServerEventKind::Crashed { exit_code, signal } => match (exit_code, signal) {
                    (Some(code), _) => format!("{} (exit code {})", "crashed".red(), code),
                    (None, Some(signal)) => format!("{} (signal {})", "crashed".red(), signal),
                    (None, None) => "crashed".red().to_string(),
                },
                ServerEventKind::RestartScheduled { attempt, delay_ms } => format!(
                    "{} (attempt {}, in {}ms)",
                    "restart scheduled".cyan(),
                    attempt,
                    delay_ms
                ),
            };
            println!("{} {} {}", when.dimmed(), event.name.bold(), what);
        }
        StreamFrame::Log(line) => {
            let tag = match line.stream {
                LogStream::Stdout => line.name.normal(),
                LogStream::Stderr => line.name.red(),
            };
            println!("{} {}", format!("[{}]", tag).bold(), line.line);
        }
    }
}

fn colorize_status(status: ServerStatus) -> String {
    let text = status.to_string();
    match status {
        ServerStatus::Running => text.green().to_string(),
        ServerStatus::Starting | ServerStatus::Stopping => text.yellow().to_string(),
        ServerStatus::Crashed | ServerStatus::Errored => text.red().to_string(),
        ServerStatus::Stopped => text.dimmed().to_string(),
    }
}

fn format_timestamp(when: SystemTime) -> String {
    let local: DateTime<Local> = when.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
