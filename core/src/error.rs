//! Error types for the IRC daemon core

use thiserror::Error;

/// Main error type for the daemon core.
///
/// Validation and conflict errors resolve into numeric replies and leave
/// the connection open; protocol violations and resource exhaustion
/// propagate to connection teardown.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Erroneous nickname: {0}")]
    BadNickname(String),

    #[error("Nickname is already in use: {0}")]
    NicknameInUse(String),

    #[error("You have not registered")]
    NotRegistered,

    #[error("You may not reregister")]
    AlreadyRegistered,

    #[error("Not enough parameters for {0}")]
    NeedMoreParams(String),

    #[error("No origin specified")]
    NoOrigin,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Send queue full")]
    SendQueueFull,

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(&'static str),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
