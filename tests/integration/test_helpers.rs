// tests/integration/test_helpers.rs

//! Test helpers: an in-process fake server speaking the line protocol, and
//! recorders for executor hooks.

use ampd::core::executor::{ConnectHook, DisconnectHook};
use ampd::{Client, DisconnectReason, Executor, ServerTarget};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const GREETING: &str = "OK MPD 0.21\n";
const LINE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sets up minimal tracing for tests. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A listening socket on 127.0.0.1 that plays the server side.
pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    pub async fn bind() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake server");
        Self { listener }
    }

    pub fn target(&self) -> ServerTarget {
        let port = self.listener.local_addr().unwrap().port();
        ServerTarget::tcp("127.0.0.1", port)
    }

    /// Accepts one connection and greets it.
    pub async fn accept(&self) -> ServerSession {
        let mut session = self.accept_silently().await;
        session.send(GREETING).await;
        session
    }

    /// Accepts one connection without sending anything.
    pub async fn accept_silently(&self) -> ServerSession {
        let (stream, _) = tokio::time::timeout(LINE_TIMEOUT, self.listener.accept())
            .await
            .expect("Timed out waiting for the client to connect")
            .expect("Accept failed");
        let (reader, writer) = stream.into_split();
        ServerSession {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }
}

/// The server end of one accepted connection.
pub struct ServerSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ServerSession {
    pub async fn send(&mut self, text: &str) {
        self.writer
            .write_all(text.as_bytes())
            .await
            .expect("Failed to write to client");
    }

    /// The next line the client sent, or `None` once it hung up.
    pub async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(LINE_TIMEOUT, self.lines.next_line())
            .await
            .expect("Timed out waiting for a line from the client")
            .expect("Read from client failed")
    }

    pub async fn expect(&mut self, expected: &str) {
        let line = self.next_line().await;
        assert_eq!(line.as_deref(), Some(expected));
    }

    /// Asserts the client sends nothing during `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(line) = tokio::time::timeout(window, self.lines.next_line()).await {
            panic!("Unexpected traffic from client: {line:?}");
        }
    }
}

/// Connects `client` to `server` and waits until the client has parked the
/// server in push-wait.
pub async fn connect(client: &Client, server: &FakeServer) -> ServerSession {
    let (mut session, version) =
        tokio::join!(server.accept(), client.connect_to_server(server.target()));
    assert_eq!(version.unwrap(), "0.21");
    session.expect("idle").await;
    session
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + LINE_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Records every connect and disconnect notification an executor receives.
#[derive(Clone, Default)]
pub struct HookLog {
    pub connects: Arc<Mutex<usize>>,
    pub disconnects: Arc<Mutex<Vec<(DisconnectReason, Option<String>)>>>,
}

impl HookLog {
    pub fn attach(executor: &Executor) -> Self {
        let log = HookLog::default();
        let connects = log.connects.clone();
        let on_connect: ConnectHook = Arc::new(move || *connects.lock() += 1);
        let disconnects = log.disconnects.clone();
        let on_disconnect: DisconnectHook =
            Arc::new(move |reason: DisconnectReason, message: Option<&str>| {
                disconnects
                    .lock()
                    .push((reason, message.map(str::to_string)))
            });
        executor
            .set_callbacks(Some(on_connect), Some(on_disconnect))
            .unwrap();
        log
    }

    pub fn connect_count(&self) -> usize {
        *self.connects.lock()
    }

    pub fn reasons(&self) -> Vec<DisconnectReason> {
        self.disconnects.lock().iter().map(|(r, _)| *r).collect()
    }
}
