//! Session Registry
//!
//! Maps display name → `Session`. The registry is owned by the
//! `ChatServer` actor and only ever touched from its task, so each
//! method runs to completion before the next command is looked at:
//! the check-and-claim in `register` cannot interleave with another
//! registration or removal.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::message::ServerMessage;
use crate::session::Session;
use crate::types::ClientId;

/// Name → Session store with unique keys
///
/// Backed by a `BTreeMap` so snapshots come out sorted, giving the
/// same roster for the same membership set.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: BTreeMap<String, Session>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `requested`, or the first free `requested_N` (N = 1, 2, …)
    ///
    /// Returns the name actually claimed.
    pub fn register(
        &mut self,
        requested: &str,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> String {
        let mut name = requested.to_string();
        let mut suffix = 1u64;
        while self.sessions.contains_key(&name) {
            name = format!("{}_{}", requested, suffix);
            suffix += 1;
        }

        self.sessions
            .insert(name.clone(), Session::new(name.clone(), client_id, sender));
        name
    }

    /// Remove `name` if present
    ///
    /// Returns the removed session; `None` means nothing was registered
    /// under that name.
    pub fn unregister(&mut self, name: &str) -> Option<Session> {
        self.sessions.remove(name)
    }

    /// Find a session by exact name
    pub fn lookup(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    /// Current member names, sorted
    pub fn snapshot(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Iterate over registered sessions in name order
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
