// src/core/commands/mod.rs

//! The command vocabulary: which names may be called, and how their replies
//! are decoded.

pub mod registry;

pub use registry::{CommandRegistry, ENTITY_DELIMITERS};
