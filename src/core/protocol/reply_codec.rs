// src/core/protocol/reply_codec.rs

//! Splits the server's byte stream into reply blocks.
//!
//! A reply block is a run of body lines closed by a status line. A status
//! line starting with `OK` closes a successful reply; one starting with `ACK`
//! closes a failed reply and carries `[code@index] {command} message`.

use crate::core::MpdError;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Longest line accepted before the stream is declared corrupt.
const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

const OK_MARKER: &[u8] = b"OK";
const ACK_MARKER: &[u8] = b"ACK";

/// The decoded `ACK` status line of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckLine {
    pub code: u16,
    pub index: u32,
    pub command: String,
    pub message: String,
}

impl From<AckLine> for MpdError {
    fn from(ack: AckLine) -> Self {
        MpdError::Reply {
            code: ack.code,
            index: ack.index,
            command: ack.command,
            message: ack.message,
        }
    }
}

/// How a reply block ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Success. Holds whatever followed the marker, e.g. `MPD 0.23.5` on the greeting.
    Ok(String),
    Ack(AckLine),
}

/// One complete reply: its body lines (without terminators) and its status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyBlock {
    pub body: Vec<Bytes>,
    pub status: Status,
}

impl ReplyBlock {
    pub fn is_ack(&self) -> bool {
        matches!(self.status, Status::Ack(_))
    }
}

/// A `tokio_util::codec` decoder turning raw bytes into [`ReplyBlock`]s.
///
/// Body lines of an unfinished block are kept between calls, so a block may
/// arrive split across any number of reads.
#[derive(Debug, Default)]
pub struct ReplyCodec {
    lines: Vec<Bytes>,
    pending: BytesMut,
}

impl ReplyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` to the internal partial-line buffer and returns every
    /// block it completes, in order. Bytes of an unfinished line are retained.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<ReplyBlock>, MpdError> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(data);
        let mut blocks = Vec::new();
        let outcome = loop {
            match self.decode(&mut buf) {
                Ok(Some(block)) => blocks.push(block),
                Ok(None) => break Ok(blocks),
                Err(e) => break Err(e),
            }
        };
        self.pending = buf;
        outcome
    }

    /// True when no partial line or unfinished block is buffered.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.pending.is_empty()
    }
}

impl Decoder for ReplyCodec {
    type Item = ReplyBlock;
    type Error = MpdError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(MpdError::Protocol(format!(
                        "line exceeds {MAX_LINE_LENGTH} bytes"
                    )));
                }
                return Ok(None);
            };

            let mut line = src.split_to(pos + 1).freeze();
            line.truncate(pos);

            if line.starts_with(OK_MARKER) {
                let rest = String::from_utf8_lossy(&line[OK_MARKER.len()..])
                    .trim()
                    .to_string();
                return Ok(Some(ReplyBlock {
                    body: std::mem::take(&mut self.lines),
                    status: Status::Ok(rest),
                }));
            }
            if line.starts_with(ACK_MARKER) {
                let ack = parse_ack_line(&line)?;
                return Ok(Some(ReplyBlock {
                    body: std::mem::take(&mut self.lines),
                    status: Status::Ack(ack),
                }));
            }
            self.lines.push(line);
        }
    }
}

/// Parses `ACK [code@index] {command} message`.
pub fn parse_ack_line(line: &[u8]) -> Result<AckLine, MpdError> {
    let text = std::str::from_utf8(line)?;
    let malformed = || MpdError::Protocol(format!("malformed ACK line: {text:?}"));

    let rest = text
        .strip_prefix("ACK")
        .ok_or_else(malformed)?
        .trim_start()
        .strip_prefix('[')
        .ok_or_else(malformed)?;
    let (position, rest) = rest.split_once(']').ok_or_else(malformed)?;
    let (code, index) = position.split_once('@').ok_or_else(malformed)?;
    let code = code.trim().parse::<u16>().map_err(|_| malformed())?;
    let index = index.trim().parse::<u32>().map_err(|_| malformed())?;

    let rest = rest.trim_start().strip_prefix('{').ok_or_else(malformed)?;
    let (command, message) = rest.split_once('}').ok_or_else(malformed)?;

    Ok(AckLine {
        code,
        index,
        command: command.to_string(),
        message: message.trim().to_string(),
    })
}
