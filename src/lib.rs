// Library exports for the mcproc supervisor

pub mod cli;
pub mod config;
pub mod error;
pub mod ipc;
pub mod logs;
pub mod monitor;
pub mod platform;
pub mod supervisor;
