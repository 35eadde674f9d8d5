// src/core/errors.rs

//! Defines the error type shared by every layer of the client.

use std::sync::Arc;
use strum_macros::Display;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MpdError>;

/// Well-known error codes carried by an `ACK` status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AckCode {
    NotList,
    Arg,
    Password,
    Permission,
    Unknown,
    NoExist,
    PlaylistMax,
    System,
    PlaylistLoad,
    UpdateAlready,
    PlayerSync,
    Exist,
    #[strum(to_string = "ACK_{0}")]
    Other(u16),
}

impl AckCode {
    /// Maps the numeric code found on the wire to its symbolic form.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => AckCode::NotList,
            2 => AckCode::Arg,
            3 => AckCode::Password,
            4 => AckCode::Permission,
            5 => AckCode::Unknown,
            50 => AckCode::NoExist,
            51 => AckCode::PlaylistMax,
            52 => AckCode::System,
            53 => AckCode::PlaylistLoad,
            54 => AckCode::UpdateAlready,
            55 => AckCode::PlayerSync,
            56 => AckCode::Exist,
            other => AckCode::Other(other),
        }
    }
}

/// Every failure a caller of the client can observe.
///
/// `Cancelled` is not a fault: it is the outcome of a request that was
/// withdrawn by its owner or swept away by a disconnect.
#[derive(Error, Debug, Clone)]
pub enum MpdError {
    #[error("Not connected: {0}")]
    Connection(String),

    #[error("ACK [{code}@{index}] {{{command}}} {message}")]
    Reply {
        code: u16,
        index: u32,
        command: String,
        message: String,
    },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Cannot encode command: {0}")]
    Encode(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MpdError {
    /// The symbolic `ACK` code, if this is a server reply error.
    pub fn ack_code(&self) -> Option<AckCode> {
        match self {
            MpdError::Reply { code, .. } => Some(AckCode::from_code(*code)),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MpdError::Cancelled)
    }

    /// True for errors that take the whole connection down with them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MpdError::Protocol(_) | MpdError::Io(_))
    }
}

impl PartialEq for MpdError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MpdError::Io(e1), MpdError::Io(e2)) => e1.kind() == e2.kind(),
            (MpdError::Connection(s1), MpdError::Connection(s2)) => s1 == s2,
            (
                MpdError::Reply {
                    code: c1,
                    index: i1,
                    command: cmd1,
                    message: m1,
                },
                MpdError::Reply {
                    code: c2,
                    index: i2,
                    command: cmd2,
                    message: m2,
                },
            ) => c1 == c2 && i1 == i2 && cmd1 == cmd2 && m1 == m2,
            (MpdError::Protocol(s1), MpdError::Protocol(s2)) => s1 == s2,
            (MpdError::Encode(s1), MpdError::Encode(s2)) => s1 == s2,
            (MpdError::UnknownCommand(s1), MpdError::UnknownCommand(s2)) => s1 == s2,
            (MpdError::Config(s1), MpdError::Config(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for MpdError {
    fn from(e: std::io::Error) -> Self {
        MpdError::Io(Arc::new(e))
    }
}

impl From<std::string::FromUtf8Error> for MpdError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        MpdError::Protocol(format!("reply is not valid UTF-8: {e}"))
    }
}

impl From<std::str::Utf8Error> for MpdError {
    fn from(e: std::str::Utf8Error) -> Self {
        MpdError::Protocol(format!("reply is not valid UTF-8: {e}"))
    }
}
