use thiserror::Error;

/// Main error type for the mcproc supervisor
#[derive(Debug, Error)]
pub enum McprocError {
    // Server lifecycle errors
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Server {0} is already running")]
    AlreadyRunning(String),

    #[error("Server {0} is not running")]
    NotRunning(String),

    #[error("Server already exists and is not stopped: {0}")]
    AlreadyExists(String),

    #[error("Failed to spawn server {0}: {1}")]
    SpawnFailure(String, String),

    #[error("Failed to stop server {0}: {1}")]
    StopError(String, String),

    #[error("Signal error: {0}")]
    SignalError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Control surface errors
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Failed to connect to daemon: {0}")]
    ConnectionError(String),

    #[error("IPC protocol error: {0}")]
    ProtocolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for mcproc operations
pub type Result<T> = std::result::Result<T, McprocError>;
