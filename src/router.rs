//! Broadcaster / Router
//!
//! Builds typed `ServerMessage`s and fans them out to one, some or all
//! registered sessions. Owns the `Registry` so that membership changes
//! and the announcements that follow them happen in one step.
//!
//! A session whose outbound queue overflows is lagging: rather than
//! silently losing lines it is removed through the normal leave path,
//! which drops its queue sender and lets its writer wind down.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::event::ServerEvent;
use crate::message::{Direction, ServerMessage};
use crate::registry::Registry;
use crate::session::Session;
use crate::types::ClientId;

/// Message router over the session registry
#[derive(Debug)]
pub struct Router {
    registry: Registry,
    events: broadcast::Sender<ServerEvent>,
    /// Sessions whose queue overflowed during the current operation
    lagging: Vec<(String, ClientId)>,
}

impl Router {
    /// Create a router with an empty registry publishing to `events`
    pub fn new(events: broadcast::Sender<ServerEvent>) -> Self {
        Self {
            registry: Registry::new(),
            events,
            lagging: Vec::new(),
        }
    }

    /// Read access to the registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Claim a name, announce the arrival and push the new roster
    ///
    /// The joining session is registered before the announcement, so it
    /// sees its own join notice and the roster that includes it.
    pub fn join(
        &mut self,
        requested: &str,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> String {
        let name = self.registry.register(requested, client_id, sender);

        if name != requested {
            warn!(
                "Name '{}' already taken, client {} registered as '{}'",
                requested, client_id, name
            );
            self.emit(ServerEvent::NameReassigned {
                requested: requested.to_string(),
                assigned: name.clone(),
            });
        }

        info!("Client {} joined as '{}'", client_id, name);
        self.emit(ServerEvent::SessionOpened { name: name.clone() });

        self.fan_out(ServerMessage::joined(&name));
        self.push_roster();
        self.evict_lagging();
        name
    }

    /// Release a name, announce the departure and push the new roster
    ///
    /// Only the connection that claimed `name` can release it. Returns
    /// false (and does nothing) if `name` is not held by `client_id`.
    pub fn leave(&mut self, name: &str, client_id: ClientId) -> bool {
        let released = self.release(name, client_id);
        self.evict_lagging();
        released
    }

    /// Deliver `"<sender>: <body>"` to every session, sender included
    pub fn broadcast_chat(&mut self, sender: &str, body: &str) {
        self.announce(ServerMessage::Chat {
            sender: sender.to_string(),
            body: body.to_string(),
        });
    }

    /// Whisper from `sender` to `target`
    ///
    /// Exactly one message goes to each of the two parties. An unknown
    /// target gets the sender a "user not found" notice instead.
    pub fn deliver_private(&mut self, sender: &str, target: &str, body: &str) {
        if self.registry.lookup(target).is_none() {
            debug!("Whisper from '{}' to unknown '{}'", sender, target);
            self.reply(sender, ServerMessage::user_not_found(target));
            return;
        }

        let inbound = ServerMessage::Private {
            sender: sender.to_string(),
            target: target.to_string(),
            body: body.to_string(),
            direction: Direction::Inbound,
        };
        let outbound = ServerMessage::Private {
            sender: sender.to_string(),
            target: target.to_string(),
            body: body.to_string(),
            direction: Direction::Outbound,
        };

        self.send_to(target, inbound.clone());
        self.send_to(sender, outbound);
        self.emit(ServerEvent::MessageDelivered {
            message: inbound,
            recipients: 1,
        });
        self.evict_lagging();
    }

    /// Send a message to one named session only
    pub fn reply(&mut self, name: &str, msg: ServerMessage) {
        self.send_to(name, msg);
        self.evict_lagging();
    }

    /// Deliver a message to every registered session
    pub fn announce(&mut self, msg: ServerMessage) {
        self.fan_out(msg);
        self.evict_lagging();
    }

    /// Send the current roster to every registered session
    pub fn sync_roster(&mut self) {
        self.push_roster();
        self.evict_lagging();
    }

    fn release(&mut self, name: &str, client_id: ClientId) -> bool {
        match self.registry.lookup(name) {
            Some(session) if session.client_id == client_id => {}
            _ => {
                debug!("Ignoring leave of '{}' from client {}", name, client_id);
                return false;
            }
        }

        self.registry.unregister(name);
        info!("'{}' left ({} remaining)", name, self.registry.len());
        self.emit(ServerEvent::SessionClosed {
            name: name.to_string(),
        });

        self.fan_out(ServerMessage::left(name));
        self.push_roster();
        true
    }

    /// Remove every session that overflowed, announcing each departure
    ///
    /// Departure notices can overflow further sessions, so this runs
    /// until nothing is left to evict.
    fn evict_lagging(&mut self) {
        while let Some((name, client_id)) = self.lagging.pop() {
            warn!("'{}' is lagging, disconnecting", name);
            self.release(&name, client_id);
        }
    }

    fn fan_out(&mut self, msg: ServerMessage) {
        let mut recipients = 0;
        for session in self.registry.sessions() {
            if Self::deliver(session, msg.clone(), &mut self.lagging) {
                recipients += 1;
            }
        }

        self.emit(ServerEvent::MessageDelivered {
            message: msg,
            recipients,
        });
    }

    fn push_roster(&mut self) {
        let names = self.registry.snapshot();
        debug!("Roster sync: {:?}", names);

        for session in self.registry.sessions() {
            let roster = ServerMessage::Roster {
                names: names.clone(),
            };
            Self::deliver(session, roster, &mut self.lagging);
        }

        self.emit(ServerEvent::RosterChanged { names });
    }

    fn send_to(&mut self, name: &str, msg: ServerMessage) {
        if let Some(session) = self.registry.lookup(name) {
            Self::deliver(session, msg, &mut self.lagging);
        }
    }

    /// Queue a message on one session, marking it lagging on overflow
    fn deliver(
        session: &Session,
        msg: ServerMessage,
        lagging: &mut Vec<(String, ClientId)>,
    ) -> bool {
        match session.send(msg) {
            Ok(()) => true,
            Err(SendError::QueueFull) => {
                let entry = (session.name.clone(), session.client_id);
                if !lagging.contains(&entry) {
                    lagging.push(entry);
                }
                false
            }
            Err(SendError::ChannelClosed) => {
                debug!("Writer for '{}' already gone", session.name);
                false
            }
        }
    }

    fn emit(&self, event: ServerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
