// Wire types shared by the control socket server and client

use crate::config::ServerDefinition;
use crate::logs::LogLine;
use crate::supervisor::{ServerEvent, ServerSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Control commands accepted over the socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    List,
    Start {
        name: String,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Stop {
        name: String,
    },
    Restart {
        name: String,
    },
    Status {
        name: String,
    },
    Add {
        definition: ServerDefinition,
    },
    Remove {
        name: String,
    },
    /// Switch the connection into a push stream of state events
    Subscribe,
    /// Switch the connection into a push stream of captured output,
    /// optionally filtered to one server
    Tail {
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "data", rename_all = "lowercase")]
pub enum ResponseData {
    Started { name: String, pid: Option<u32> },
    Stopped { name: String },
    Restarted { name: String, pid: Option<u32> },
    ServerList { servers: Vec<ServerSnapshot> },
    Status { server: ServerSnapshot },
    Added { name: String },
    Removed { name: String },
    Subscribed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

impl Response {
    pub fn success(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            result: Ok(data),
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(message.into()),
        }
    }
}

/// One line of a push stream opened by `Subscribe` or `Tail`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "lowercase")]
pub enum StreamFrame {
    Event(ServerEvent),
    Log(LogLine),
}
