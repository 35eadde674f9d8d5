// src/connection/mod.rs

//! Owns the single physical connection to the server: the state machine that
//! orders requests and replies, the client handle driving it, and the I/O
//! tasks that move bytes.

pub(crate) mod guard;
pub(crate) mod handler;
pub(crate) mod state;
pub(crate) mod stream;

pub use handler::{Client, ClientBuilder};
pub use state::ConnectionState;
