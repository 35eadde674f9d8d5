// src/core/events.rs

//! Defines the event vocabulary of the client: the subsystem-change flags the
//! server can push while idling, and the reasons a connection can end.

use bitflags::bitflags;
use strum_macros::{AsRefStr, Display, EnumString};

bitflags! {
    /// A set of server-side state changes.
    ///
    /// The subsystem flags mirror the names the server reports in `changed:`
    /// lines. `CONNECT` and `IDLE` are synthetic: they are never sent by the
    /// server and are derived from the connection state instead.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct EventSet: u32 {
        const DATABASE        = 1 << 0;
        const UPDATE          = 1 << 1;
        const STORED_PLAYLIST = 1 << 2;
        const PLAYLIST        = 1 << 3;
        const PLAYER          = 1 << 4;
        const MIXER           = 1 << 5;
        const OUTPUT          = 1 << 6;
        const OPTIONS         = 1 << 7;
        const PARTITION       = 1 << 8;
        const STICKER         = 1 << 9;
        const SUBSCRIPTION    = 1 << 10;
        const MESSAGE         = 1 << 11;
        const NEIGHBOR        = 1 << 12;
        const MOUNT           = 1 << 13;

        /// The connection finished its handshake.
        const CONNECT         = 1 << 30;
        /// The connection has nothing in flight and is about to push-wait.
        const IDLE            = 1 << 31;
    }
}

impl EventSet {
    /// Every flag the server itself can report.
    pub const SUBSYSTEMS: EventSet = EventSet::from_bits_truncate((1 << 14) - 1);

    /// Looks up a subsystem by its wire name (`"stored_playlist"`, `"player"`, ...).
    /// Synthetic members are not addressable this way.
    pub fn from_subsystem(name: &str) -> Option<EventSet> {
        EventSet::from_name(&name.trim().to_ascii_uppercase())
            .filter(|flag| EventSet::SUBSYSTEMS.contains(*flag))
    }

    /// Wire names of the subsystem flags in this set, in bit order.
    pub fn subsystem_names(&self) -> Vec<String> {
        (*self & EventSet::SUBSYSTEMS)
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect()
    }

    /// Builds a set from a list of wire names, dropping names it does not know.
    pub fn from_subsystems<'a, I>(names: I) -> EventSet
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(EventSet::from_subsystem)
            .fold(EventSet::empty(), |acc, flag| acc | flag)
    }
}

/// Why a connection ended, as reported to disconnect hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectReason {
    NotConnected,
    FailedConnect,
    Error,
    Requested,
    Reconnect,
    Shutdown,
    Password,
}
