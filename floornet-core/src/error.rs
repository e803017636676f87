//! Error types for the floornet core
//!
//! Every failure here is local and recoverable: a rejected frame leaves the
//! model untouched and the next periodic cycle tries again.

use std::fmt;
use thiserror::Error;

/// Level of the state hierarchy an id addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Floor,
    Room,
    Ultra,
    Hall,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Floor => write!(f, "floor"),
            Level::Room => write!(f, "room"),
            Level::Ultra => write!(f, "ultrasonic sensor"),
            Level::Hall => write!(f, "hall sensor"),
        }
    }
}

/// State model error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{level} id {id} out of range (capacity {capacity})")]
    CapacityExceeded { level: Level, id: u8, capacity: usize },
}

/// Wire decoding error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,

    #[error("topic has more than {0} segments")]
    TooManySegments(usize),

    #[error("input of {len} bytes exceeds limit {max}")]
    TooLong { len: usize, max: usize },

    #[error("missing or mismatched cloud prefix")]
    BadPrefix,

    #[error("no rule matches topic '{0}'")]
    NoRule(String),

    #[error("invalid byte value '{0}'")]
    InvalidByte(String),

    #[error("invalid boolean literal '{0}'")]
    InvalidBool(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid id '{0}'")]
    InvalidId(String),

    #[error("invalid keypad state {0}")]
    InvalidKeypad(u8),

    #[error("missing or malformed room header")]
    MissingHeader,

    #[error("malformed token '{0}'")]
    MalformedToken(String),

    #[error("token '{0}' needs a floor selected")]
    NoFloorSelected(String),

    #[error("token '{0}' needs a room selected")]
    NoRoomSelected(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Broadcast transport error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport not initialized")]
    NotReady,

    #[error("frame of {len} bytes exceeds link limit {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Broker session error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("network unavailable")]
    Unavailable,

    #[error("broker rejected connection: {0}")]
    Rejected(String),
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Umbrella error for the crate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for floornet operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
