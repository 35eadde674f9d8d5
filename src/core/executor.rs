// src/core/executor.rs

//! Executors are the caller-facing scopes that issue requests.
//!
//! Every executor of a client lives as a node in one arena owned by the
//! client. Nodes refer to their parent and children by id, so a subtree can
//! be closed (and every request it issued cancelled) without any ownership
//! cycles between handles.

use crate::connection::handler::Shared;
use crate::core::protocol::{Arg, CommandLine, Reply};
use crate::core::request::Request;
use crate::core::{DisconnectReason, EventSet, MpdError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Invoked once the connection has finished its handshake. Hooks of a
/// parent scope run before those of its children.
pub type ConnectHook = Arc<dyn Fn() + Send + Sync>;
/// Invoked when the connection ends, with the reason and an optional message.
/// Runs top-down like [`ConnectHook`]: a parent scope's hook fires before
/// its children's.
pub type DisconnectHook = Arc<dyn Fn(DisconnectReason, Option<&str>) + Send + Sync>;

pub(crate) const ROOT_EXECUTOR: u64 = 0;

struct Node {
    parent: Option<u64>,
    children: Vec<u64>,
    /// Requests issued through this node that have not completed yet.
    requests: Vec<Request>,
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<DisconnectHook>,
}

impl Node {
    fn new(parent: Option<u64>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            requests: Vec::new(),
            on_connect: None,
            on_disconnect: None,
        }
    }
}

/// The executor tree of one client. Closed nodes are removed from the map.
pub(crate) struct ExecutorArena {
    nodes: HashMap<u64, Node>,
    next_id: u64,
}

impl ExecutorArena {
    pub(crate) fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_EXECUTOR, Node::new(None));
        Self {
            nodes,
            next_id: ROOT_EXECUTOR + 1,
        }
    }

    fn closed(id: u64) -> MpdError {
        MpdError::Connection(format!("executor {id} is closed"))
    }

    pub(crate) fn add_child(&mut self, parent: u64) -> Result<u64> {
        let id = self.next_id;
        let node = self.nodes.get_mut(&parent).ok_or_else(|| Self::closed(parent))?;
        node.children.push(id);
        self.nodes.insert(id, Node::new(Some(parent)));
        self.next_id += 1;
        Ok(id)
    }

    pub(crate) fn log(&mut self, id: u64, request: Request) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or_else(|| Self::closed(id))?;
        node.requests.push(request);
        Ok(())
    }

    pub(crate) fn unlog(&mut self, id: u64, request: &Request) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.requests.retain(|r| !r.same_as(request));
        }
    }

    pub(crate) fn set_hooks(
        &mut self,
        id: u64,
        on_connect: Option<ConnectHook>,
        on_disconnect: Option<DisconnectHook>,
    ) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or_else(|| Self::closed(id))?;
        node.on_connect = on_connect;
        node.on_disconnect = on_disconnect;
        Ok(())
    }

    /// Removes `id` and its whole subtree from the arena.
    ///
    /// Returns the outstanding requests to cancel: each child's (depth-first)
    /// before the node's own. Closing an unknown id returns nothing.
    pub(crate) fn close(&mut self, id: u64) -> Vec<Request> {
        let Some(node) = self.nodes.remove(&id) else {
            return Vec::new();
        };
        let mut outstanding = Vec::new();
        for child in node.children {
            outstanding.extend(self.close(child));
        }
        outstanding.extend(node.requests);
        if let Some(parent) = node.parent
            && let Some(parent) = self.nodes.get_mut(&parent)
        {
            parent.children.retain(|c| *c != id);
        }
        outstanding
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn pending(&self, id: u64) -> usize {
        self.nodes.get(&id).map_or(0, |node| node.requests.len())
    }

    pub(crate) fn children(&self, id: u64) -> usize {
        self.nodes.get(&id).map_or(0, |node| node.children.len())
    }

    /// Live node ids in pre-order, starting at the root.
    fn top_down(&self) -> Vec<u64> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![ROOT_EXECUTOR];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(node.children.iter().rev());
        }
        order
    }

    pub(crate) fn connect_hooks(&self) -> Vec<ConnectHook> {
        self.top_down()
            .into_iter()
            .filter_map(|id| self.nodes.get(&id)?.on_connect.clone())
            .collect()
    }

    pub(crate) fn disconnect_hooks(&self) -> Vec<DisconnectHook> {
        self.top_down()
            .into_iter()
            .filter_map(|id| self.nodes.get(&id)?.on_disconnect.clone())
            .collect()
    }
}

/// A handle onto one node of a client's executor tree.
///
/// Cloning the handle does not create a new scope; use
/// [`sub_executor`](Self::sub_executor) for that.
#[derive(Clone)]
pub struct Executor {
    id: u64,
    shared: Arc<Shared>,
}

impl Executor {
    pub(crate) fn root(shared: Arc<Shared>) -> Self {
        Self {
            id: ROOT_EXECUTOR,
            shared,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Creates a child scope sharing this executor's connection.
    pub fn sub_executor(&self) -> Result<Executor> {
        let id = self.shared.executors.lock().add_child(self.id)?;
        debug!("Executor {} created under {}", id, self.id);
        Ok(Executor {
            id,
            shared: self.shared.clone(),
        })
    }

    /// Issues `name` with `args` and returns the in-flight request.
    ///
    /// Unknown names, unencodable arguments and a missing connection are
    /// reported here, before anything reaches the wire.
    pub fn send(&self, name: &str, args: &[Arg]) -> Result<Request> {
        let kind = self.shared.registry.lookup(name)?;
        let line = CommandLine::encode(name, args)?;
        self.issue(Request::command(line, kind))
    }

    /// Issues `name` with `args` and waits for its reply.
    pub async fn call(&self, name: &str, args: &[Arg]) -> Result<Reply> {
        self.send(name, args)?.await
    }

    /// Returns an event-only request that resolves to the subset of `mask`
    /// observed next. Nothing is sent to the server on its behalf.
    pub fn wait_for(&self, mask: EventSet) -> Result<Request> {
        self.issue(Request::passive(mask))
    }

    /// Waits for any event in `mask`. With a `timeout`, gives up after that
    /// long and returns an empty set.
    pub async fn idle(&self, mask: EventSet, timeout: Option<Duration>) -> Result<EventSet> {
        let request = self.wait_for(mask)?;
        let outcome = match timeout {
            Some(limit) => match request.wait_timeout(limit).await {
                Err(MpdError::Timeout) => return Ok(EventSet::empty()),
                other => other,
            },
            None => request.await_result().await,
        };
        Ok(outcome?.events().unwrap_or_default())
    }

    fn issue(&self, request: Request) -> Result<Request> {
        self.shared.executors.lock().log(self.id, request.clone())?;
        let shared = Arc::downgrade(&self.shared);
        let id = self.id;
        request.on_done(move |done| {
            if let Some(shared) = shared.upgrade() {
                shared.executors.lock().unlog(id, done);
            }
        });
        self.shared.submit(request.clone())?;
        Ok(request)
    }

    /// Closes every child scope, cancels this scope's outstanding requests
    /// and detaches it from its parent. Calling it again does nothing.
    pub fn close(&self) {
        let outstanding = self.shared.executors.lock().close(self.id);
        if !outstanding.is_empty() {
            debug!(
                "Closing executor {} cancels {} request(s)",
                self.id,
                outstanding.len()
            );
        }
        for request in outstanding {
            request.cancel();
        }
    }

    /// Installs the connect and disconnect hooks of this scope, replacing
    /// earlier ones. `on_connect` runs right away if the connection is
    /// already established.
    pub fn set_callbacks(
        &self,
        on_connect: Option<ConnectHook>,
        on_disconnect: Option<DisconnectHook>,
    ) -> Result<()> {
        let connected = {
            let mut executors = self.shared.executors.lock();
            executors.set_hooks(self.id, on_connect.clone(), on_disconnect)?;
            self.shared.conn.lock().is_ready()
        };
        if let Some(hook) = on_connect
            && connected
        {
            hook();
        }
        Ok(())
    }

    /// True once the handshake has completed and until the next disconnect.
    pub fn is_connected(&self) -> bool {
        self.shared.conn.lock().is_ready()
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.shared.conn.lock().protocol_version().map(str::to_string)
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.executors.lock().pending(self.id)
    }

    pub fn child_count(&self) -> usize {
        self.shared.executors.lock().children(self.id)
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.executors.lock().contains(self.id)
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor").field("id", &self.id).finish()
    }
}
