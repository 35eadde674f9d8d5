// src/core/tasks/mod.rs

//! Background tasks run on behalf of a client.

pub mod idle;
pub mod supervisor;
