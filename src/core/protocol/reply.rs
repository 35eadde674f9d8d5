// src/core/protocol/reply.rs

//! Decoded reply values and the decoders that build them from a reply body.

use crate::core::{EventSet, MpdError};
use bytes::{Bytes, BytesMut};
use indexmap::IndexMap;

/// A flat `key: value` mapping, in the order the server sent it.
pub type Dict = IndexMap<String, String>;

/// The shape a command's reply body is decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Nothing but the status line is expected.
    Empty,
    /// One mapping built from every `key: value` line.
    Dict,
    /// The values of every `key: value` line.
    List,
    /// A sequence of mappings. A new mapping starts at any of the delimiter
    /// keys, or, with no delimiters, whenever a key repeats.
    Objects(&'static [&'static str]),
    /// The body bytes, newline terminated, untouched.
    Raw,
}

/// The value a successful request resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    Dict(Dict),
    List(Vec<String>),
    Objects(Vec<Dict>),
    Raw(Bytes),
    /// Subsystems that changed, or the matched events of an event-only wait.
    Events(EventSet),
    /// Protocol version announced in the server greeting.
    Version(String),
}

impl Reply {
    /// Decodes a reply body according to `kind`.
    pub fn decode(kind: ReplyKind, body: &[Bytes]) -> Result<Reply, MpdError> {
        match kind {
            ReplyKind::Empty => Ok(Reply::Empty),
            ReplyKind::Dict => {
                let mut dict = Dict::new();
                for line in body {
                    let (key, value) = split_pair(line)?;
                    dict.insert(key, value);
                }
                Ok(Reply::Dict(dict))
            }
            ReplyKind::List => body
                .iter()
                .map(|line| split_pair(line).map(|(_, value)| value))
                .collect::<Result<Vec<_>, _>>()
                .map(Reply::List),
            ReplyKind::Objects(delimiters) => {
                let mut objects: Vec<Dict> = Vec::new();
                let mut current = Dict::new();
                for line in body {
                    let (key, value) = split_pair(line)?;
                    let starts_new = if delimiters.is_empty() {
                        current.contains_key(&key)
                    } else {
                        delimiters.contains(&key.as_str())
                    };
                    if starts_new && !current.is_empty() {
                        objects.push(std::mem::take(&mut current));
                    }
                    current.insert(key, value);
                }
                if !current.is_empty() {
                    objects.push(current);
                }
                Ok(Reply::Objects(objects))
            }
            ReplyKind::Raw => {
                let mut raw = BytesMut::with_capacity(body.iter().map(|l| l.len() + 1).sum());
                for line in body {
                    raw.extend_from_slice(line);
                    raw.extend_from_slice(b"\n");
                }
                Ok(Reply::Raw(raw.freeze()))
            }
        }
    }

    /// Decodes the body of an idle reply: every `changed: <subsystem>` line
    /// contributes its flag; subsystems this client does not know are dropped.
    pub fn decode_changed(body: &[Bytes]) -> Result<Reply, MpdError> {
        let mut events = EventSet::empty();
        for line in body {
            let (key, value) = split_pair(line)?;
            if key == "changed"
                && let Some(flag) = EventSet::from_subsystem(&value)
            {
                events |= flag;
            }
        }
        Ok(Reply::Events(events))
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Reply::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Looks a key up in a `Dict` reply.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.as_dict()?.get(key).map(String::as_str)
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Reply::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_objects(&self) -> Option<&[Dict]> {
        match self {
            Reply::Objects(objects) => Some(objects),
            _ => None,
        }
    }

    pub fn events(&self) -> Option<EventSet> {
        match self {
            Reply::Events(events) => Some(*events),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            Reply::Version(version) => Some(version),
            _ => None,
        }
    }
}

/// Splits `key: value`.
fn split_pair(line: &[u8]) -> Result<(String, String), MpdError> {
    let text = std::str::from_utf8(line)?;
    let (key, value) = text
        .split_once(": ")
        .or_else(|| text.strip_suffix(':').map(|key| (key, "")))
        .ok_or_else(|| MpdError::Protocol(format!("expected 'key: value', got {text:?}")))?;
    Ok((key.to_string(), value.to_string()))
}
