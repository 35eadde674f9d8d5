// src/connection/stream.rs

//! Opens the byte stream to the server and runs its reader and writer tasks.

use crate::config::Endpoint;
use crate::connection::guard::TransportGuard;
use crate::connection::handler::Shared;
use crate::core::protocol::{CommandCodec, CommandLine, ReplyCodec};
use crate::core::{MpdError, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Weak;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{Instrument, Span, debug, warn};

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Connects to `endpoint` and splits the stream into its two halves.
pub(crate) async fn open(endpoint: &Endpoint) -> Result<(BoxedReader, BoxedWriter)> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(path) => Err(MpdError::Config(format!(
            "unix sockets are not supported on this platform: {}",
            path.display()
        ))),
    }
}

/// The write side of an attached connection plus the guard of its tasks.
pub(crate) struct Transport {
    outbound: mpsc::UnboundedSender<CommandLine>,
    _guard: TransportGuard,
}

impl Transport {
    pub(crate) fn new(outbound: mpsc::UnboundedSender<CommandLine>, guard: TransportGuard) -> Self {
        Self {
            outbound,
            _guard: guard,
        }
    }

    /// Queues one line for the writer task. Lines go out in call order.
    pub(crate) fn send(&self, line: CommandLine) -> Result<()> {
        debug!("Write: {}", line);
        self.outbound
            .send(line)
            .map_err(|_| MpdError::Connection("transport is closed".to_string()))
    }
}

/// Spawns the reader and writer tasks of a freshly opened stream.
pub(crate) fn start(
    reader: BoxedReader,
    writer: BoxedWriter,
    shared: Weak<Shared>,
    epoch: u64,
    span: &Span,
) -> Transport {
    let (tx, rx) = mpsc::unbounded_channel();
    let read_task = tokio::spawn(read_loop(reader, shared.clone(), epoch).instrument(span.clone()));
    let write_task = tokio::spawn(write_loop(writer, rx, shared, epoch).instrument(span.clone()));
    Transport::new(tx, TransportGuard::new(vec![read_task, write_task]))
}

async fn read_loop(reader: BoxedReader, shared: Weak<Shared>, epoch: u64) {
    let mut frames = FramedRead::new(reader, ReplyCodec::new());
    let reason = loop {
        match frames.next().await {
            Some(Ok(block)) => {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                shared.on_block(epoch, block);
            }
            Some(Err(e)) => {
                warn!("Reply stream error: {}", e);
                break e.to_string();
            }
            None => {
                debug!("Server closed the connection");
                break "connection closed by server".to_string();
            }
        }
    };
    if let Some(shared) = shared.upgrade() {
        shared.transport_closed(epoch, reason);
    }
}

async fn write_loop(
    writer: BoxedWriter,
    mut rx: mpsc::UnboundedReceiver<CommandLine>,
    shared: Weak<Shared>,
    epoch: u64,
) {
    let mut sink = FramedWrite::new(writer, CommandCodec);
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.send(line).await {
            warn!("Failed to write to server: {}", e);
            if let Some(shared) = shared.upgrade() {
                shared.transport_closed(epoch, e.to_string());
            }
            return;
        }
    }
}
