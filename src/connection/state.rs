// src/connection/state.rs

//! The connection state machine.
//!
//! `ConnectionMachine` is the single owner of the in-flight queue, the
//! waiting list and the transport of one logical connection. It is always
//! used behind the client's mutex and never completes a request itself:
//! every method returns the [`Effects`] of the transition, which the caller
//! applies once the lock has been released.

use crate::connection::stream::Transport;
use crate::core::protocol::{CommandLine, Reply, ReplyBlock, Status};
use crate::core::request::{Request, RequestKind};
use crate::core::{DisconnectReason, EventSet, MpdError, Result};
use std::collections::VecDeque;
use strum_macros::Display;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// The externally visible state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connected, nothing but a push-wait outstanding.
    Idle,
    /// Connected, the server is answering commands.
    Active,
}

/// Work that must happen after the state lock is released.
#[derive(Default)]
#[must_use]
pub(crate) struct Effects {
    /// Requests paired with the reply block that answers them, in wire order.
    pub(crate) replies: Vec<(Request, ReplyBlock)>,
    pub(crate) fulfilled: Vec<(Request, Reply)>,
    pub(crate) failed: Vec<(Request, MpdError)>,
    pub(crate) cancelled: Vec<Request>,
    /// Event-only requests that were parked and need removal-on-completion.
    pub(crate) parked: Vec<Request>,
    pub(crate) arm_idle: bool,
    pub(crate) disconnected: Option<(DisconnectReason, Option<String>)>,
    /// A torn-down transport, dropped outside the lock.
    pub(crate) released: Option<Transport>,
}

impl Effects {
    pub(crate) fn is_empty(&self) -> bool {
        self.replies.is_empty()
            && self.fulfilled.is_empty()
            && self.failed.is_empty()
            && self.cancelled.is_empty()
            && self.parked.is_empty()
            && !self.arm_idle
            && self.disconnected.is_none()
            && self.released.is_none()
    }
}

pub(crate) struct ConnectionMachine {
    /// A transport is attached.
    connected: bool,
    /// The server is not (or will not be) blocked in push-wait. Together with
    /// `connected` this yields the four states.
    server_active: bool,
    /// The handshake (greeting and password) has completed.
    ready: bool,
    queue: VecDeque<Request>,
    waiting: Vec<Request>,
    transport: Option<Transport>,
    connect_task: Option<AbortHandle>,
    /// Bumped on every connect attempt and teardown. Transport tasks carry the
    /// epoch they were started with and are ignored once it is stale.
    epoch: u64,
    protocol_version: Option<String>,
}

impl ConnectionMachine {
    pub(crate) fn new() -> Self {
        Self {
            connected: false,
            server_active: false,
            ready: false,
            queue: VecDeque::new(),
            waiting: Vec::new(),
            transport: None,
            connect_task: None,
            epoch: 0,
            protocol_version: None,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        match (self.connected, self.server_active) {
            (false, false) => ConnectionState::Disconnected,
            (false, true) => ConnectionState::Connecting,
            (true, false) => ConnectionState::Idle,
            (true, true) => ConnectionState::Active,
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.connected && self.ready
    }

    pub(crate) fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiting.len()
    }

    /// Moves DISCONNECTED to CONNECTING and returns the epoch of the attempt.
    pub(crate) fn begin_connect(&mut self) -> Result<u64> {
        if self.state() != ConnectionState::Disconnected {
            return Err(MpdError::Connection(format!(
                "cannot connect while {}",
                self.state()
            )));
        }
        self.epoch += 1;
        self.server_active = true;
        Ok(self.epoch)
    }

    pub(crate) fn is_connecting(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.state() == ConnectionState::Connecting
    }

    /// Remembers the task driving the attempt so a disconnect can abort it.
    pub(crate) fn set_connect_task(&mut self, epoch: u64, task: AbortHandle) {
        if self.is_connecting(epoch) {
            self.connect_task = Some(task);
        }
    }

    /// The transport could not be opened.
    pub(crate) fn connect_failed(&mut self, epoch: u64, message: String) -> Effects {
        let mut effects = Effects::default();
        if self.is_connecting(epoch) {
            self.server_active = false;
            self.connect_task = None;
            effects.disconnected = Some((DisconnectReason::FailedConnect, Some(message)));
        }
        effects
    }

    /// Installs an opened transport. The greeting is the first reply expected,
    /// so the returned welcome request becomes the sole in-flight entry.
    pub(crate) fn attach(&mut self, transport: Transport) -> Request {
        let welcome = Request::welcome();
        self.connected = true;
        self.server_active = true;
        self.connect_task = None;
        self.transport = Some(transport);
        self.queue.clear();
        self.queue.push_back(welcome.clone());
        welcome
    }

    pub(crate) fn set_protocol_version(&mut self, epoch: u64, version: String) -> bool {
        if self.epoch != epoch || !self.connected {
            return false;
        }
        self.protocol_version = Some(version);
        true
    }

    /// Marks the handshake complete and raises the CONNECT event.
    pub(crate) fn handshake_done(&mut self, epoch: u64) -> Option<Effects> {
        if self.epoch != epoch || !self.connected {
            return None;
        }
        self.ready = true;
        let mut effects = self.dispatch(EventSet::CONNECT);
        effects.arm_idle = true;
        Some(effects)
    }

    /// Transmits `request` or, for an event-only request, parks it.
    ///
    /// A failure leaves the request untouched; the caller fails it.
    pub(crate) fn submit(&mut self, request: Request) -> Result<Effects> {
        if request.is_passive() {
            return Ok(self.wait(request));
        }
        let line = match request.kind() {
            RequestKind::Passive { .. } | RequestKind::Welcome => {
                return Err(MpdError::Protocol(
                    "this request has no line to transmit".to_string(),
                ));
            }
            RequestKind::Command { line, .. } | RequestKind::Idle { line, .. } => line.clone(),
        };
        let transport = match (&self.transport, self.connected) {
            (Some(transport), true) => transport,
            _ => return Err(MpdError::Connection("not connected".to_string())),
        };

        if request.is_idle() {
            self.server_active = false;
            debug!("Going idle");
        } else if !self.server_active {
            transport.send(CommandLine::noidle())?;
            debug!("Unidle");
            self.server_active = true;
        }
        transport.send(line)?;
        self.queue.push_back(request);
        Ok(Effects::default())
    }

    /// Hands a complete reply block to the oldest in-flight request.
    pub(crate) fn on_block(&mut self, epoch: u64, block: ReplyBlock) -> Effects {
        if epoch != self.epoch || !self.connected {
            return Effects::default();
        }
        let Some(request) = self.queue.pop_front() else {
            warn!("Received a reply with no request waiting for it");
            return self.disconnect(
                DisconnectReason::Error,
                Some("reply received with no request in flight".to_string()),
            );
        };

        let mut effects = if request.is_idle() {
            self.server_active = true;
            match block.status {
                Status::Ack(ack) => Effects {
                    failed: vec![(request, ack.into())],
                    ..Default::default()
                },
                Status::Ok(_) => match Reply::decode_changed(&block.body) {
                    Ok(Reply::Events(events)) => {
                        debug!("Idle woke with {:?}", events);
                        let mut effects = self.dispatch(events);
                        effects.fulfilled.insert(0, (request, Reply::Events(events)));
                        effects
                    }
                    Ok(other) => Effects {
                        fulfilled: vec![(request, other)],
                        ..Default::default()
                    },
                    Err(e) => {
                        warn!("Undecodable idle reply: {}", e);
                        let mut effects =
                            self.disconnect(DisconnectReason::Error, Some(e.to_string()));
                        effects.failed.push((request, e));
                        return effects;
                    }
                },
            }
        } else {
            Effects {
                replies: vec![(request, block)],
                ..Default::default()
            }
        };

        if self.queue.is_empty() {
            effects.arm_idle = true;
        }
        effects
    }

    /// The synthetic events that hold right now.
    pub(crate) fn current_events(&self) -> EventSet {
        let mut events = EventSet::empty();
        if self.is_ready() {
            events |= EventSet::CONNECT;
        }
        if self.state() == ConnectionState::Idle {
            events |= EventSet::IDLE;
        }
        events
    }

    /// Resolves an event-only request now if its mask already holds,
    /// otherwise parks it in the waiting list.
    pub(crate) fn wait(&mut self, request: Request) -> Effects {
        let mut effects = Effects::default();
        let matched = self.current_events() & request.event_mask();
        if !matched.is_empty() {
            effects.fulfilled.push((request, Reply::Events(matched)));
        } else {
            self.waiting.push(request.clone());
            effects.parked.push(request);
        }
        effects
    }

    /// Wakes every parked request whose mask intersects `events`.
    pub(crate) fn dispatch(&mut self, events: EventSet) -> Effects {
        let mut effects = Effects::default();
        if events.is_empty() {
            return effects;
        }
        let mut index = 0;
        while index < self.waiting.len() {
            let matched = self.waiting[index].event_mask() & events;
            if matched.is_empty() {
                index += 1;
            } else {
                let request = self.waiting.remove(index);
                effects.fulfilled.push((request, Reply::Events(matched)));
            }
        }
        effects
    }

    /// Removes one parked request interested in `event`, if any.
    pub(crate) fn take_waiter(&mut self, event: EventSet) -> Option<Request> {
        let index = self
            .waiting
            .iter()
            .position(|r| !r.is_done() && r.event_mask().intersects(event))?;
        Some(self.waiting.remove(index))
    }

    /// The union of every parked mask, restricted to server-side subsystems.
    pub(crate) fn parked_mask(&self) -> EventSet {
        self.waiting
            .iter()
            .fold(EventSet::empty(), |acc, r| acc | r.event_mask())
            & EventSet::SUBSYSTEMS
    }

    pub(crate) fn forget_waiter(&mut self, request: &Request) {
        self.waiting.retain(|r| !r.same_as(request));
    }

    /// Tears the connection down. A second call in a row does nothing.
    pub(crate) fn disconnect(
        &mut self,
        reason: DisconnectReason,
        message: Option<String>,
    ) -> Effects {
        let mut effects = Effects::default();
        match self.state() {
            ConnectionState::Disconnected => return effects,
            ConnectionState::Connecting => {
                if let Some(task) = self.connect_task.take() {
                    task.abort();
                }
            }
            ConnectionState::Idle | ConnectionState::Active => {
                effects.released = self.transport.take();
                effects.cancelled.extend(self.queue.drain(..));
                effects.cancelled.append(&mut self.waiting);
                self.protocol_version = None;
            }
        }
        self.epoch += 1;
        self.connected = false;
        self.server_active = false;
        self.ready = false;
        effects.disconnected = Some((reason, message));
        effects
    }
}
