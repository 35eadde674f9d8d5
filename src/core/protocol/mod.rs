// src/core/protocol/mod.rs

//! The wire format: reply framing, command encoding and reply decoding.

pub mod command_codec;
pub mod reply;
pub mod reply_codec;

pub use command_codec::{Arg, CommandCodec, CommandLine};
pub use reply::{Dict, Reply, ReplyKind};
pub use reply_codec::{AckLine, ReplyBlock, ReplyCodec, Status};
