// src/connection/handler.rs

//! Defines `Client`, the owner of one logical connection to the server, and
//! the shared state its executors, background tasks and I/O tasks work on.

use crate::config::{DEFAULT_CONNECT_TIMEOUT, ServerTarget};
use crate::connection::state::{ConnectionMachine, ConnectionState, Effects};
use crate::connection::stream;
use crate::core::commands::CommandRegistry;
use crate::core::executor::{Executor, ExecutorArena};
use crate::core::protocol::{CommandLine, ReplyBlock, ReplyKind};
use crate::core::request::Request;
use crate::core::tasks::idle;
use crate::core::tasks::supervisor::{self, ErrorHook};
use crate::core::{DisconnectReason, MpdError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, warn};

/// State shared by a client, its executors and its background tasks.
///
/// Lock order: `executors` before `conn`. Both are held together only where
/// readiness and the installed hooks must be observed as one step. Neither
/// is held while a request completes or a hook runs.
pub(crate) struct Shared {
    pub(crate) conn: Mutex<ConnectionMachine>,
    pub(crate) executors: Mutex<ExecutorArena>,
    pub(crate) registry: CommandRegistry,
    /// Where the last successful `connect_to_server` pointed, for reconnects.
    target: Mutex<Option<ServerTarget>>,
    connect_timeout: Duration,
    error_hook: ErrorHook,
    span: Span,
}

impl Shared {
    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Hands `request` to the state machine. On refusal the request is failed
    /// with the same error that is returned.
    pub(crate) fn submit(self: &Arc<Self>, request: Request) -> Result<()> {
        let outcome = self.conn.lock().submit(request.clone());
        match outcome {
            Ok(effects) => {
                self.settle(effects);
                Ok(())
            }
            Err(e) => {
                request.fail(e.clone());
                Err(e)
            }
        }
    }

    pub(crate) fn on_block(self: &Arc<Self>, epoch: u64, block: ReplyBlock) {
        let effects = self.conn.lock().on_block(epoch, block);
        self.settle(effects);
    }

    /// Called by the I/O tasks when the stream ends or fails.
    pub(crate) fn transport_closed(self: &Arc<Self>, epoch: u64, message: String) {
        self.disconnect_epoch(epoch, DisconnectReason::Error, Some(message));
    }

    pub(crate) fn disconnect(self: &Arc<Self>, reason: DisconnectReason, message: Option<String>) {
        let effects = self.conn.lock().disconnect(reason, message);
        self.settle(effects);
    }

    /// Disconnects only if the connection is still the one started at `epoch`.
    fn disconnect_epoch(
        self: &Arc<Self>,
        epoch: u64,
        reason: DisconnectReason,
        message: Option<String>,
    ) {
        let effects = {
            let mut conn = self.conn.lock();
            if conn.epoch() != epoch {
                return;
            }
            conn.disconnect(reason, message)
        };
        self.settle(effects);
    }

    /// Applies the outcome of a state transition. Must be called without
    /// holding either lock.
    pub(crate) fn settle(self: &Arc<Self>, effects: Effects) {
        let Effects {
            replies,
            fulfilled,
            failed,
            cancelled,
            parked,
            arm_idle,
            disconnected,
            released,
        } = effects;
        drop(released);

        for request in parked {
            let shared = Arc::downgrade(self);
            request.on_done(move |done| {
                if let Some(shared) = shared.upgrade() {
                    shared.conn.lock().forget_waiter(done);
                }
            });
        }
        for (request, block) in replies {
            request.process_reply(block);
        }
        for (request, reply) in fulfilled {
            request.fulfill(reply);
        }
        for (request, error) in failed {
            request.fail(error);
        }
        if !cancelled.is_empty() {
            debug!("Cancelling {} outstanding request(s)", cancelled.len());
        }
        for request in cancelled {
            request.cancel();
        }
        if let Some((reason, message)) = disconnected {
            match &message {
                Some(message) => info!("Disconnected ({}): {}", reason, message),
                None => info!("Disconnected ({})", reason),
            }
            self.fire_disconnect(reason, message.as_deref());
        }
        if arm_idle {
            idle::arm(self);
        }
    }

    fn fire_disconnect(&self, reason: DisconnectReason, message: Option<&str>) {
        let hooks = self.executors.lock().disconnect_hooks();
        for hook in hooks {
            hook(reason, message);
        }
    }

    async fn connect(self: &Arc<Self>, target: ServerTarget) -> Result<String> {
        let epoch = self.conn.lock().begin_connect()?;
        *self.target.lock() = Some(target.clone());
        info!("Connecting to {}", target.endpoint);

        let task = tokio::spawn(
            Shared::run_connect(Arc::downgrade(self), epoch, target).instrument(self.span.clone()),
        );
        self.conn.lock().set_connect_task(epoch, task.abort_handle());
        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(MpdError::Cancelled),
            Err(e) => Err(MpdError::Connection(format!("connect task failed: {e}"))),
        }
    }

    /// Opens the transport and runs the handshake: greeting, then the
    /// optional password. Only then is the connection announced.
    async fn run_connect(shared: Weak<Shared>, epoch: u64, target: ServerTarget) -> Result<String> {
        let Some(shared) = shared.upgrade() else {
            return Err(MpdError::Cancelled);
        };

        let opened =
            match tokio::time::timeout(shared.connect_timeout, stream::open(&target.endpoint)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(MpdError::Timeout),
            };
        let (reader, writer) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                warn!("Failed to connect to {}: {}", target.endpoint, e);
                let effects = shared.conn.lock().connect_failed(epoch, e.to_string());
                shared.settle(effects);
                return Err(e);
            }
        };

        let welcome = {
            let mut conn = shared.conn.lock();
            if !conn.is_connecting(epoch) {
                return Err(MpdError::Cancelled);
            }
            let transport = stream::start(reader, writer, Arc::downgrade(&shared), epoch, &shared.span);
            conn.attach(transport)
        };
        debug!("Transport open, waiting for the greeting");

        let version = match welcome.await_result().await {
            Ok(reply) => reply.version().unwrap_or_default().to_string(),
            Err(MpdError::Cancelled) => return Err(MpdError::Cancelled),
            Err(e) => {
                warn!("Bad greeting from {}: {}", target.endpoint, e);
                shared.disconnect_epoch(epoch, DisconnectReason::Error, Some(e.to_string()));
                return Err(e);
            }
        };
        if !shared.conn.lock().set_protocol_version(epoch, version.clone()) {
            return Err(MpdError::Cancelled);
        }

        if let Some(password) = target.password.as_deref() {
            let request = Request::command(
                CommandLine::encode("password", &[password.into()])?,
                ReplyKind::Empty,
            );
            shared.submit(request.clone())?;
            match request.await_result().await {
                Ok(_) => {}
                Err(e @ MpdError::Reply { .. }) => {
                    warn!("Password rejected: {}", e);
                    shared.disconnect_epoch(epoch, DisconnectReason::Password, Some(e.to_string()));
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        // Readiness and the hook snapshot change as one step.
        let (effects, hooks) = {
            let executors = shared.executors.lock();
            let Some(effects) = shared.conn.lock().handshake_done(epoch) else {
                return Err(MpdError::Cancelled);
            };
            (effects, executors.connect_hooks())
        };
        info!("Connected to {} (protocol {})", target.endpoint, version);
        for hook in hooks {
            hook();
        }
        shared.settle(effects);
        Ok(version)
    }
}

/// Configures and creates a [`Client`].
pub struct ClientBuilder {
    registry: CommandRegistry,
    connect_timeout: Duration,
    span: Span,
    error_hook: Option<ErrorHook>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            registry: CommandRegistry::standard(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            span: Span::none(),
            error_hook: None,
        }
    }

    /// Replaces the command vocabulary.
    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The span every background task of the client runs in.
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Where errors of tasks started with [`Client::spawn`] go. Defaults to
    /// logging them.
    pub fn error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }

    pub fn build(self) -> Client {
        let shared = Arc::new(Shared {
            conn: Mutex::new(ConnectionMachine::new()),
            executors: Mutex::new(ExecutorArena::new()),
            registry: self.registry,
            target: Mutex::new(None),
            connect_timeout: self.connect_timeout,
            error_hook: self.error_hook.unwrap_or_else(supervisor::log_error_hook),
            span: self.span,
        });
        Client {
            executor: Executor::root(shared.clone()),
            shared,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection to one server, multiplexed over a tree of executors.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    executor: Executor,
}

impl Client {
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The root of the executor tree.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Connects and runs the handshake. Resolves to the protocol version
    /// announced by the server.
    ///
    /// Fails at once if a connection exists or is being made. A transport
    /// that cannot be opened fires the disconnect hooks with
    /// [`DisconnectReason::FailedConnect`]; there is no retry.
    pub async fn connect_to_server(&self, target: ServerTarget) -> Result<String> {
        self.shared.connect(target).await
    }

    /// Drops the current connection, if any, and connects again to the last
    /// server given to [`connect_to_server`](Self::connect_to_server).
    pub async fn reconnect_to_server(&self) -> Result<String> {
        let target = self
            .shared
            .target
            .lock()
            .clone()
            .ok_or_else(|| MpdError::Connection("no server to reconnect to".to_string()))?;
        self.shared.disconnect(DisconnectReason::Reconnect, None);
        self.shared.connect(target).await
    }

    /// Cancels every outstanding request and closes the connection.
    pub fn disconnect_from_server(&self, reason: DisconnectReason) {
        self.shared.disconnect(reason, None);
    }

    /// Closes every executor, then disconnects with [`DisconnectReason::Shutdown`].
    pub fn close(&self) {
        debug!("Closing client");
        self.executor.close();
        self.shared.disconnect(DisconnectReason::Shutdown, None);
    }

    /// Runs `task` in the background. Cancellation ends it silently; any
    /// other error goes to the client's error hook.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        supervisor::spawn_supervised(task, self.shared.error_hook.clone(), self.shared.span.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.conn.lock().state()
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.executor.protocol_version()
    }

    /// Requests transmitted and not yet answered.
    pub fn in_flight(&self) -> usize {
        self.shared.conn.lock().in_flight()
    }

    /// Event-only requests currently parked.
    pub fn waiting(&self) -> usize {
        self.shared.conn.lock().waiting()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
