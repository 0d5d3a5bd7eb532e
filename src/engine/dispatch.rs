//! Verb dispatch table.
//!
//! Each verb has up to three kinds of handler:
//! - `bare`, run when the verb comes without arguments;
//! - `wildcard`, run whenever arguments are present;
//! - `literals`, selected by the first argument when there is no wildcard.
//!
//! A wildcard always wins over literals, so no verb defines both.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::handlers;
use super::Engine;
use super::Session;
use crate::protocol::Reply;
use crate::CommandError;

pub(crate) type Handler = fn(&Invocation<'_>) -> Result<Reply, CommandError>;

/// Arguments and context handed to a handler. `args` excludes the verb.
pub(crate) struct Invocation<'a> {
    pub engine: &'a Engine,
    pub session: &'a Session,
    pub args: &'a [Vec<u8>],
}

impl Invocation<'_> {
    pub fn arg(
        &self,
        index: usize,
    ) -> &[u8] {
        self.args.get(index).map(Vec::as_slice).unwrap_or_default()
    }

    /// Argument as text, lossily
    pub fn arg_str(
        &self,
        index: usize,
    ) -> String {
        String::from_utf8_lossy(self.arg(index)).into_owned()
    }
}

pub(crate) struct VerbEntry {
    pub name: &'static str,
    pub bare: Option<Handler>,
    pub wildcard: Option<Handler>,
    pub literals: &'static [(&'static str, Handler)],
    /// Successful runs are logged and replicated
    pub mutates: bool,
}

impl VerbEntry {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            bare: None,
            wildcard: None,
            literals: &[],
            mutates: false,
        }
    }

    fn bare(
        mut self,
        handler: Handler,
    ) -> Self {
        self.bare = Some(handler);
        self
    }

    fn wildcard(
        mut self,
        handler: Handler,
    ) -> Self {
        self.wildcard = Some(handler);
        self
    }

    fn literals(
        mut self,
        literals: &'static [(&'static str, Handler)],
    ) -> Self {
        self.literals = literals;
        self
    }

    fn mutating(mut self) -> Self {
        self.mutates = true;
        self
    }
}

static PEER_SUBCOMMANDS: &[(&str, Handler)] = &[
    ("list", handlers::peer_list),
    ("connect", handlers::peer_connect),
    ("remove", handlers::peer_remove),
    ("id", handlers::peer_id),
];

static CLIENT_SUBCOMMANDS: &[(&str, Handler)] = &[
    ("list", handlers::client_list),
    ("setname", handlers::client_setname),
    ("getname", handlers::client_getname),
    ("kill", handlers::client_kill),
];

static INFO_SECTIONS: &[(&str, Handler)] = &[
    ("server", handlers::info_server),
    ("keyspace", handlers::info_keyspace),
    ("vql", handlers::info_clients),
    ("wal", handlers::info_wal),
    ("replication", handlers::info_replication),
];

lazy_static! {
    static ref DISPATCH: HashMap<&'static str, VerbEntry> = [
        VerbEntry::new("peer").literals(PEER_SUBCOMMANDS),
        VerbEntry::new("client").literals(CLIENT_SUBCOMMANDS),
        VerbEntry::new("info").bare(handlers::info_all).literals(INFO_SECTIONS),
        VerbEntry::new("ping").bare(handlers::ping).wildcard(handlers::ping_echo),
        VerbEntry::new("flushdb").bare(handlers::flushdb).mutating(),
        VerbEntry::new("time").bare(handlers::time),
        VerbEntry::new("set").wildcard(handlers::set).mutating(),
        VerbEntry::new("get").wildcard(handlers::get),
        VerbEntry::new("del").wildcard(handlers::del).mutating(),
        VerbEntry::new("incr").wildcard(handlers::incr).mutating(),
        VerbEntry::new("decr").wildcard(handlers::decr).mutating(),
        VerbEntry::new("keys").wildcard(handlers::keys),
        VerbEntry::new("scan").wildcard(handlers::scan),
        VerbEntry::new("type").wildcard(handlers::key_type),
        VerbEntry::new("ttl").wildcard(handlers::ttl),
        VerbEntry::new("select").wildcard(handlers::select),
        VerbEntry::new("quit").bare(handlers::quit),
        VerbEntry::new("help").bare(handlers::help).wildcard(handlers::help),
    ]
    .into_iter()
    .map(|entry| (entry.name, entry))
    .collect();
}

/// Picks the handler for `verb` (lowercased) given its arguments.
pub(crate) fn resolve(
    verb: &str,
    args: &[Vec<u8>],
) -> Result<(&'static VerbEntry, Handler), CommandError> {
    let entry = DISPATCH.get(verb);
    match args.first() {
        Some(first) => {
            let unknown = || CommandError::UnknownCommand(format!("{} {}", verb, String::from_utf8_lossy(first)));
            let entry = entry.ok_or_else(unknown)?;
            if let Some(handler) = entry.wildcard {
                return Ok((entry, handler));
            }
            let literal = String::from_utf8_lossy(first).to_ascii_lowercase();
            entry
                .literals
                .iter()
                .find(|(name, _)| *name == literal)
                .map(|(_, handler)| (entry, *handler))
                .ok_or_else(unknown)
        }
        None => entry
            .and_then(|e| e.bare.map(|handler| (e, handler)))
            .ok_or_else(|| CommandError::UnknownCommand(verb.to_string())),
    }
}
