// src/lib.rs

//! An asynchronous client for the Music Player Daemon protocol.
//!
//! A [`Client`] owns one connection and keeps the server in push-wait
//! whenever nothing else is outstanding, so callers can both issue commands
//! and wait for change notifications through the same [`Executor`] tree.

pub mod config;
pub mod connection;
pub mod core;

// Re-export
pub use crate::config::{ClientConfig, Endpoint, ServerTarget};
pub use crate::connection::{Client, ClientBuilder, ConnectionState};
pub use crate::core::{
    AckCode, Arg, DisconnectReason, EventSet, Executor, MpdError, Reply, ReplyKind, Request,
    Result,
};
