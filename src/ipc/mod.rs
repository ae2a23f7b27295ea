// Unix socket control surface: newline-delimited JSON requests and streams

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{Command, Request, Response, ResponseData, StreamFrame};
pub use server::IpcServer;
