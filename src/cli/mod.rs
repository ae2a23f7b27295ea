// Command-line interface talking to the daemon over the control socket

pub mod output;

use crate::config::ConfigFile;
use crate::error::{McprocError, Result};
use crate::ipc::server::DEFAULT_SOCKET_PATH;
use crate::ipc::{Command, IpcClient, ResponseData};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mcproc")]
#[command(about = "Supervise and inspect managed server processes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the daemon control socket
    #[arg(long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all servers and their current state
    List,

    /// Start a server by name
    Start {
        name: String,

        /// Extra environment variables as KEY=VALUE, may be repeated
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
    },

    /// Stop a running server
    Stop { name: String },

    /// Restart a server
    Restart { name: String },

    /// Show detailed status for one server
    Status { name: String },

    /// Register server definitions from a config file
    Add {
        /// TOML or JSON config file with server definitions
        file: PathBuf,
    },

    /// Stop and remove a server definition
    Remove { name: String },

    /// Follow state transition events as they happen
    Events,

    /// Follow captured server output
    Logs {
        /// Only show output from this server
        name: Option<String>,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let client = IpcClient::new(&self.socket);

        match self.command {
            Commands::List => {
                let data = client.send_command(Command::List)?;
                if let ResponseData::ServerList { servers } = data {
                    output::print_server_table(&servers);
                }
            }
            Commands::Start { name, env } => {
                let env = parse_env_pairs(&env)?;
                let data = client.send_command(Command::Start { name, env })?;
                if let ResponseData::Started { name, pid } = data {
                    match pid {
                        Some(pid) => output::print_success(&format!(
                            "Server '{}' started (pid {})",
                            name, pid
                        )),
                        None => output::print_success(&format!("Server '{}' started", name)),
                    }
                }
            }
            Commands::Stop { name } => {
                let data = client.send_command(Command::Stop { name })?;
                if let ResponseData::Stopped { name } = data {
                    output::print_success(&format!("Server '{}' stopped", name));
                }
            }
            Commands::Restart { name } => {
                let data = client.send_command(Command::Restart { name })?;
                if let ResponseData::Restarted { name, pid } = data {
                    match pid {
                        Some(pid) => output::print_success(&format!(
                            "Server '{}' restarted (pid {})",
                            name, pid
                        )),
                        None => output::print_success(&format!("Server '{}' restarted", name)),
                    }
                }
            }
            Commands::Status { name } => {
                let data = client.send_command(Command::Status { name })?;
                if let ResponseData::Status { server } = data {
                    output::print_server_detail(&server);
                }
            }
            Commands::Add { file } => {
                let config = ConfigFile::from_file(&file)?;
                for definition in config.servers {
                    let name = definition.name.clone();
                    match client.send_command(Command::Add { definition }) {
                        Ok(_) => output::print_success(&format!("Added server '{}'", name)),
                        Err(e) => output::print_error(&format!("Failed to add '{}': {}", name, e)),
                    }
                }
            }
            Commands::Remove { name } => {
                let data = client.send_command(Command::Remove { name })?;
                if let ResponseData::Removed { name } = data {
                    output::print_success(&format!("Removed server '{}'", name));
                }
            }
            Commands::Events => {
                let mut stream = client.open_stream(Command::Subscribe)?;
                while let Some(frame) = stream.next_frame()? {
                    output::print_frame(&frame);
                }
            }
            Commands::Logs { name } => {
                let mut stream = client.open_stream(Command::Tail { name })?;
                while let Some(frame) = stream.next_frame()? {
                    output::print_frame(&frame);
                }
            }
        }

        Ok(())
    }
}

fn parse_env_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut env = HashMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                env.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(McprocError::Other(format!(
                    "invalid environment variable '{}', expected KEY=VALUE",
                    pair
                )))
            }
        }
    }
    Ok(env)
}
