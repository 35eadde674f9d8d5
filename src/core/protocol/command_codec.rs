// src/core/protocol/command_codec.rs

//! Turns a command name and its arguments into one transmittable line, and
//! provides the matching `Encoder` used by the connection's writer task.

use crate::core::MpdError;
use bytes::{BufMut, BytesMut};
use std::fmt;
use tokio_util::codec::Encoder;

/// A single positional argument of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Free text. Always written quoted.
    Text(String),
    Int(i64),
    Float(f64),
    /// Written as `1` or `0`.
    Bool(bool),
    /// A `START:END` window. An open end is written as `START:`.
    Range(u32, Option<u32>),
}

impl Arg {
    fn write_to(&self, out: &mut String) -> Result<(), MpdError> {
        match self {
            Arg::Text(text) => {
                if let Some(bad) = text.chars().find(|c| *c == '\n' || *c == '\0') {
                    return Err(MpdError::Encode(format!(
                        "argument {text:?} contains {bad:?}, which the line protocol cannot carry"
                    )));
                }
                out.push('"');
                for c in text.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            Arg::Int(i) => out.push_str(&i.to_string()),
            Arg::Float(f) => {
                if !f.is_finite() {
                    return Err(MpdError::Encode(format!("non-finite number {f}")));
                }
                out.push_str(&f.to_string());
            }
            Arg::Bool(b) => out.push(if *b { '1' } else { '0' }),
            Arg::Range(start, end) => {
                out.push_str(&start.to_string());
                out.push(':');
                if let Some(end) = end {
                    out.push_str(&end.to_string());
                }
            }
        }
        Ok(())
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Text(s.clone())
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}

impl From<i32> for Arg {
    fn from(i: i32) -> Self {
        Arg::Int(i64::from(i))
    }
}

impl From<u32> for Arg {
    fn from(i: u32) -> Self {
        Arg::Int(i64::from(i))
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<std::ops::Range<u32>> for Arg {
    fn from(r: std::ops::Range<u32>) -> Self {
        Arg::Range(r.start, Some(r.end))
    }
}

impl From<std::ops::RangeFrom<u32>> for Arg {
    fn from(r: std::ops::RangeFrom<u32>) -> Self {
        Arg::Range(r.start, None)
    }
}

/// One encoded command line, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandLine(String);

impl CommandLine {
    /// Encodes `name` followed by its quoted arguments.
    pub fn encode(name: &str, args: &[Arg]) -> Result<Self, MpdError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(MpdError::Encode(format!("invalid command name {name:?}")));
        }
        let mut line = String::from(name);
        for arg in args {
            line.push(' ');
            arg.write_to(&mut line)?;
        }
        Ok(CommandLine(line))
    }

    /// The line that asks the server to push-wait, optionally limited to some subsystems.
    pub fn idle(subsystems: &[String]) -> Self {
        let mut line = String::from("idle");
        for name in subsystems {
            line.push(' ');
            line.push_str(name);
        }
        CommandLine(line)
    }

    /// The line that makes the server leave push-wait.
    pub fn noidle() -> Self {
        CommandLine("noidle".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a line back into its command name and unquoted arguments.
    pub fn parse(line: &str) -> Result<(String, Vec<String>), MpdError> {
        let mut tokens = Vec::new();
        let mut chars = line.trim_end_matches('\n').chars().peekable();
        loop {
            while chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                chars.next();
            }
            let Some(first) = chars.peek().copied() else {
                break;
            };
            let mut token = String::new();
            if first == '"' {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => token.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => token.push(other),
                    }
                }
                if !closed {
                    return Err(MpdError::Encode(format!("unterminated quote in {line:?}")));
                }
            } else {
                while let Some(c) = chars.peek().copied() {
                    if c.is_ascii_whitespace() {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
            }
            tokens.push(token);
        }
        if tokens.is_empty() {
            return Err(MpdError::Encode("empty command line".to_string()));
        }
        let name = tokens.remove(0);
        Ok((name, tokens))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Writes each [`CommandLine`] followed by a newline.
#[derive(Debug, Default)]
pub struct CommandCodec;

impl Encoder<CommandLine> for CommandCodec {
    type Error = MpdError;

    fn encode(&mut self, item: CommandLine, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.0.len() + 1);
        dst.extend_from_slice(item.0.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
