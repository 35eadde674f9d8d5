// src/core/tasks/idle.rs

//! The background idle loop.
//!
//! Whenever the in-flight queue empties on a connected client, the loop is
//! armed. On its turn it either wakes one waiter that asked for the IDLE
//! event, giving it the chance to issue commands first, or puts the server
//! into push-wait so changes can be reported.

use crate::connection::handler::Shared;
use crate::connection::state::Effects;
use crate::core::EventSet;
use crate::core::protocol::Reply;
use crate::core::request::Request;
use std::sync::{Arc, Weak};
use tracing::{Instrument, debug};

/// Schedules one turn of the idle loop.
pub(crate) fn arm(shared: &Arc<Shared>) {
    let weak = Arc::downgrade(shared);
    tokio::spawn(
        async move {
            // Let whatever completed the queue react before the server is parked.
            tokio::task::yield_now().await;
            step(weak);
        }
        .instrument(shared.span().clone()),
    );
}

fn step(shared: Weak<Shared>) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let effects = {
        let mut conn = shared.conn.lock();
        if !conn.is_ready() || conn.in_flight() > 0 {
            return;
        }
        if let Some(waiter) = conn.take_waiter(EventSet::IDLE) {
            debug!("Waking an IDLE waiter before going idle");
            Effects {
                fulfilled: vec![(waiter, Reply::Events(EventSet::IDLE))],
                arm_idle: true,
                ..Default::default()
            }
        } else {
            let mut mask = conn.parked_mask();
            if mask.is_empty() {
                mask = EventSet::SUBSYSTEMS;
            }
            match conn.submit(Request::idle(mask)) {
                Ok(effects) => effects,
                Err(e) => {
                    debug!("Could not go idle: {}", e);
                    return;
                }
            }
        }
    };
    shared.settle(effects);
}
