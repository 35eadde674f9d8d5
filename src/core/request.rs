// src/core/request.rs

//! A unit of pending work and the slot its outcome lands in.
//!
//! A [`Request`] is a cheap, cloneable handle. Its slot moves out of
//! `Pending` exactly once, to a value, a failure or a cancellation; every
//! clone and every awaiter observes that same outcome.

use crate::core::protocol::{CommandLine, Reply, ReplyBlock, ReplyKind, Status};
use crate::core::{EventSet, MpdError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// The result slot of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Pending,
    Fulfilled(Reply),
    Failed(MpdError),
    Cancelled,
}

impl RequestState {
    fn into_result(self) -> Result<Reply, MpdError> {
        match self {
            RequestState::Fulfilled(reply) => Ok(reply),
            RequestState::Failed(e) => Err(e),
            RequestState::Cancelled | RequestState::Pending => Err(MpdError::Cancelled),
        }
    }
}

/// What a request sends, if anything, and how its reply is decoded.
#[derive(Debug, Clone)]
pub(crate) enum RequestKind {
    /// An ordinary command, answered by the next reply block.
    Command { line: CommandLine, reply: ReplyKind },
    /// The push-wait command. Resolves to the set of changed subsystems.
    Idle { line: CommandLine, mask: EventSet },
    /// Answered by the server's unsolicited greeting. Resolves to the protocol version.
    Welcome,
    /// Never touches the wire. Resolved when a matching event is observed.
    Passive { mask: EventSet },
}

type DoneCallback = Box<dyn FnOnce(&Request) + Send>;

struct RequestInner {
    id: u64,
    kind: RequestKind,
    state: watch::Sender<RequestState>,
    callbacks: Mutex<Vec<DoneCallback>>,
}

#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    fn new(kind: RequestKind) -> Self {
        let (state, _) = watch::channel(RequestState::Pending);
        Self {
            inner: Arc::new(RequestInner {
                id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                state,
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn command(line: CommandLine, reply: ReplyKind) -> Self {
        Self::new(RequestKind::Command { line, reply })
    }

    pub(crate) fn idle(mask: EventSet) -> Self {
        // The wire form always watches every subsystem; the mask only records
        // which waiters this push-wait was issued for.
        Self::new(RequestKind::Idle {
            line: CommandLine::idle(&[]),
            mask,
        })
    }

    pub(crate) fn welcome() -> Self {
        Self::new(RequestKind::Welcome)
    }

    pub(crate) fn passive(mask: EventSet) -> Self {
        Self::new(RequestKind::Passive { mask })
    }

    pub(crate) fn kind(&self) -> &RequestKind {
        &self.inner.kind
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The line this request transmits. Event-only and welcome requests have none.
    pub fn command_line(&self) -> Option<&CommandLine> {
        match &self.inner.kind {
            RequestKind::Command { line, .. } | RequestKind::Idle { line, .. } => Some(line),
            RequestKind::Welcome | RequestKind::Passive { .. } => None,
        }
    }

    /// The events an idle or event-only request is interested in.
    pub fn event_mask(&self) -> EventSet {
        match &self.inner.kind {
            RequestKind::Idle { mask, .. } | RequestKind::Passive { mask } => *mask,
            RequestKind::Command { .. } | RequestKind::Welcome => EventSet::empty(),
        }
    }

    pub fn is_passive(&self) -> bool {
        matches!(self.inner.kind, RequestKind::Passive { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.inner.kind, RequestKind::Idle { .. })
    }

    pub fn state(&self) -> RequestState {
        self.inner.state.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.inner.state.borrow(), RequestState::Pending)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.state.borrow(), RequestState::Cancelled)
    }

    /// Marks the request cancelled if it is still pending. Returns whether it was.
    ///
    /// A request that was already transmitted keeps its place in the reply
    /// queue; its reply is consumed and dropped when it arrives.
    pub fn cancel(&self) -> bool {
        self.complete(RequestState::Cancelled)
    }

    /// Registers `callback` to run once the slot leaves `Pending`. Runs it
    /// immediately when the request is already done.
    pub fn on_done<F>(&self, callback: F)
    where
        F: FnOnce(&Request) + Send + 'static,
    {
        let mut callbacks = self.inner.callbacks.lock();
        if self.is_done() {
            drop(callbacks);
            callback(self);
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// Waits for the outcome. Cancellation surfaces as [`MpdError::Cancelled`].
    pub async fn await_result(&self) -> Result<Reply, MpdError> {
        let mut rx = self.inner.state.subscribe();
        let outcome = rx
            .wait_for(|state| !matches!(state, RequestState::Pending))
            .await
            .map(|state| state.clone())
            .map_err(|_| MpdError::Cancelled)?;
        outcome.into_result()
    }

    /// Like [`await_result`](Self::await_result), but cancels the request and
    /// fails with [`MpdError::Timeout`] once `limit` has passed.
    pub async fn wait_timeout(&self, limit: Duration) -> Result<Reply, MpdError> {
        match tokio::time::timeout(limit, self.await_result()).await {
            Ok(outcome) => outcome,
            Err(_) => self.expire(),
        }
    }

    /// Cancels a request whose wait ran out, unless it settled in the meantime.
    fn expire(&self) -> Result<Reply, MpdError> {
        if self.cancel() {
            Err(MpdError::Timeout)
        } else {
            self.state().into_result()
        }
    }

    pub(crate) fn fulfill(&self, reply: Reply) -> bool {
        self.complete(RequestState::Fulfilled(reply))
    }

    pub(crate) fn fail(&self, error: MpdError) -> bool {
        self.complete(RequestState::Failed(error))
    }

    /// Decodes the reply block that answers this request and settles the slot.
    pub(crate) fn process_reply(&self, block: ReplyBlock) {
        let outcome = match block.status {
            Status::Ack(ack) => Err(ack.into()),
            Status::Ok(rest) => match &self.inner.kind {
                RequestKind::Command { reply, .. } => Reply::decode(*reply, &block.body),
                RequestKind::Idle { .. } => Reply::decode_changed(&block.body),
                RequestKind::Welcome => parse_greeting(&rest),
                RequestKind::Passive { .. } => Err(MpdError::Protocol(
                    "event-only request was handed a reply".to_string(),
                )),
            },
        };
        match outcome {
            Ok(reply) => self.fulfill(reply),
            Err(e) => self.fail(e),
        };
    }

    fn complete(&self, outcome: RequestState) -> bool {
        let changed = self.inner.state.send_if_modified(|state| {
            if matches!(state, RequestState::Pending) {
                *state = outcome;
                true
            } else {
                false
            }
        });
        if changed {
            let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
            for callback in callbacks {
                callback(self);
            }
        }
        changed
    }

    pub(crate) fn same_as(&self, other: &Request) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Extracts the version from a greeting status such as `MPD 0.23.5`.
fn parse_greeting(status: &str) -> Result<Reply, MpdError> {
    status
        .strip_prefix("MPD ")
        .map(|version| Reply::Version(version.trim().to_string()))
        .ok_or_else(|| MpdError::Protocol(format!("unexpected greeting 'OK {status}'")))
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl IntoFuture for Request {
    type Output = Result<Reply, MpdError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.await_result().await })
    }
}
