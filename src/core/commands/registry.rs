// src/core/commands/registry.rs

//! Maps command names to the shape of their replies.
//!
//! Every call goes through the same path: the registry is consulted by name,
//! the arguments are encoded generically, and the reply body is decoded with
//! the [`ReplyKind`] registered for that name.

use crate::core::MpdError;
use crate::core::protocol::ReplyKind;
use std::collections::HashMap;

/// Keys that open a new entry in song/directory/playlist listings.
pub const ENTITY_DELIMITERS: &[&str] = &["file", "directory", "playlist"];
const OUTPUT_DELIMITERS: &[&str] = &["outputid"];
const MESSAGE_DELIMITERS: &[&str] = &["channel"];
const PLUGIN_DELIMITERS: &[&str] = &["plugin"];
const MOUNT_DELIMITERS: &[&str] = &["mount"];
const NEIGHBOR_DELIMITERS: &[&str] = &["neighbor"];
const POSITION_DELIMITERS: &[&str] = &["cpos"];

/// Names owned by the connection itself. They change the server's mode and
/// would desynchronise the reply queue if issued by hand.
const RESERVED: &[&str] = &[
    "idle",
    "noidle",
    "close",
    "command_list_begin",
    "command_list_ok_begin",
    "command_list_end",
];

/// The default vocabulary.
const STANDARD_COMMANDS: &[(&str, ReplyKind)] = &[
    // Status
    ("clearerror", ReplyKind::Empty),
    ("currentsong", ReplyKind::Dict),
    ("status", ReplyKind::Dict),
    ("stats", ReplyKind::Dict),
    // Playback options
    ("consume", ReplyKind::Empty),
    ("crossfade", ReplyKind::Empty),
    ("mixrampdb", ReplyKind::Empty),
    ("mixrampdelay", ReplyKind::Empty),
    ("random", ReplyKind::Empty),
    ("repeat", ReplyKind::Empty),
    ("setvol", ReplyKind::Empty),
    ("volume", ReplyKind::Empty),
    ("getvol", ReplyKind::Dict),
    ("single", ReplyKind::Empty),
    ("replay_gain_mode", ReplyKind::Empty),
    ("replay_gain_status", ReplyKind::Dict),
    // Playback control
    ("next", ReplyKind::Empty),
    ("pause", ReplyKind::Empty),
    ("play", ReplyKind::Empty),
    ("playid", ReplyKind::Empty),
    ("previous", ReplyKind::Empty),
    ("seek", ReplyKind::Empty),
    ("seekid", ReplyKind::Empty),
    ("seekcur", ReplyKind::Empty),
    ("stop", ReplyKind::Empty),
    // Queue
    ("add", ReplyKind::Empty),
    ("addid", ReplyKind::Dict),
    ("clear", ReplyKind::Empty),
    ("delete", ReplyKind::Empty),
    ("deleteid", ReplyKind::Empty),
    ("move", ReplyKind::Empty),
    ("moveid", ReplyKind::Empty),
    ("playlistfind", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("playlistid", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("playlistinfo", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("playlistsearch", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("plchanges", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("plchangesposid", ReplyKind::Objects(POSITION_DELIMITERS)),
    ("prio", ReplyKind::Empty),
    ("prioid", ReplyKind::Empty),
    ("rangeid", ReplyKind::Empty),
    ("shuffle", ReplyKind::Empty),
    ("swap", ReplyKind::Empty),
    ("swapid", ReplyKind::Empty),
    ("addtagid", ReplyKind::Empty),
    ("cleartagid", ReplyKind::Empty),
    // Stored playlists
    ("listplaylist", ReplyKind::List),
    ("listplaylistinfo", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("listplaylists", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("load", ReplyKind::Empty),
    ("playlistadd", ReplyKind::Empty),
    ("playlistclear", ReplyKind::Empty),
    ("playlistdelete", ReplyKind::Empty),
    ("playlistmove", ReplyKind::Empty),
    ("rename", ReplyKind::Empty),
    ("rm", ReplyKind::Empty),
    ("save", ReplyKind::Empty),
    // Database
    ("count", ReplyKind::Dict),
    ("find", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("findadd", ReplyKind::Empty),
    ("list", ReplyKind::List),
    ("listall", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("listallinfo", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("listfiles", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("lsinfo", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("readcomments", ReplyKind::Dict),
    ("search", ReplyKind::Objects(ENTITY_DELIMITERS)),
    ("searchadd", ReplyKind::Empty),
    ("searchaddpl", ReplyKind::Empty),
    ("update", ReplyKind::Dict),
    ("rescan", ReplyKind::Dict),
    // Mounts and neighbors
    ("mount", ReplyKind::Empty),
    ("unmount", ReplyKind::Empty),
    ("listmounts", ReplyKind::Objects(MOUNT_DELIMITERS)),
    ("listneighbors", ReplyKind::Objects(NEIGHBOR_DELIMITERS)),
    // Stickers
    ("sticker", ReplyKind::List),
    // Connection
    ("password", ReplyKind::Empty),
    ("ping", ReplyKind::Empty),
    ("tagtypes", ReplyKind::List),
    // Partitions
    ("partition", ReplyKind::Empty),
    ("listpartitions", ReplyKind::List),
    ("newpartition", ReplyKind::Empty),
    ("delpartition", ReplyKind::Empty),
    ("moveoutput", ReplyKind::Empty),
    // Audio outputs
    ("disableoutput", ReplyKind::Empty),
    ("enableoutput", ReplyKind::Empty),
    ("toggleoutput", ReplyKind::Empty),
    ("outputs", ReplyKind::Objects(OUTPUT_DELIMITERS)),
    ("outputset", ReplyKind::Empty),
    // Reflection
    ("config", ReplyKind::Dict),
    ("commands", ReplyKind::List),
    ("notcommands", ReplyKind::List),
    ("urlhandlers", ReplyKind::List),
    ("decoders", ReplyKind::Objects(PLUGIN_DELIMITERS)),
    // Client to client
    ("subscribe", ReplyKind::Empty),
    ("unsubscribe", ReplyKind::Empty),
    ("channels", ReplyKind::List),
    ("readmessages", ReplyKind::Objects(MESSAGE_DELIMITERS)),
    ("sendmessage", ReplyKind::Empty),
];

/// A lookup table from command name to [`ReplyKind`].
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: HashMap<String, ReplyKind>,
}

impl CommandRegistry {
    /// A registry with no commands at all.
    pub fn empty() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// A registry preloaded with the standard vocabulary.
    pub fn standard() -> Self {
        let commands = STANDARD_COMMANDS
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect();
        Self { commands }
    }

    /// Adds or replaces a command. Names the connection reserves for itself are refused.
    pub fn register(&mut self, name: &str, kind: ReplyKind) -> Result<(), MpdError> {
        if RESERVED.contains(&name) {
            return Err(MpdError::Encode(format!(
                "'{name}' is managed by the connection and cannot be registered"
            )));
        }
        self.commands.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<ReplyKind, MpdError> {
        self.commands
            .get(name)
            .copied()
            .ok_or_else(|| MpdError::UnknownCommand(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
