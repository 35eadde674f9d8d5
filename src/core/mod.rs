// src/core/mod.rs

//! The protocol engine: errors, events, the wire format, requests, executors
//! and the background tasks that keep a connection in push-wait.

pub mod commands;
pub mod errors;
pub mod events;
pub mod executor;
pub mod protocol;
pub mod request;
pub mod tasks;

pub use commands::CommandRegistry;
pub use errors::{AckCode, MpdError, Result};
pub use events::{DisconnectReason, EventSet};
pub use executor::{ConnectHook, DisconnectHook, Executor};
pub use protocol::{Arg, Dict, Reply, ReplyKind};
pub use request::{Request, RequestState};
