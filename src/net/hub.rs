//! Connection hub
//!
//! Tracks every connected client and its room attachment, and fans typed
//! messages out to per-room client sets. Each client has a bounded send
//! buffer: when it is full the message is dropped for that client with a
//! warning — the publisher never blocks on a slow consumer. The hub does no
//! I/O under its lock; actual socket writes happen in the per-connection
//! write pump (`net::ws`).

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

use crate::net::protocol::ServerMessage;
use crate::room::room::PlayerId;

/// Per-client send buffer capacity.
pub const SEND_BUFFER: usize = 64;

struct Client {
    sender: mpsc::Sender<ServerMessage>,
    room_id: Option<String>,
    generation: u64,
}

#[derive(Default)]
struct HubInner {
    clients: HashMap<PlayerId, Client>,
    rooms: HashMap<String, HashSet<PlayerId>>,
    next_generation: u64,
}

/// Room-level broadcaster for all connected clients.
pub struct Hub {
    inner: RwLock<HubInner>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
        }
    }

    /// Registers a connection and returns its outbound receiver plus a
    /// generation token. A reconnect under the same player id replaces the
    /// old entry; the stale connection's pump sees its channel close. The
    /// generation token keeps a late unregister from the stale connection
    /// from tearing down the new one.
    pub fn register(&self, id: PlayerId) -> (mpsc::Receiver<ServerMessage>, u64) {
        let (tx, rx) = mpsc::channel(SEND_BUFFER);
        let mut inner = self.inner.write();
        inner.next_generation += 1;
        let generation = inner.next_generation;
        if let Some(old) = inner.clients.insert(
            id,
            Client {
                sender: tx,
                room_id: None,
                generation,
            },
        ) {
            if let Some(room_id) = old.room_id {
                if let Some(members) = inner.rooms.get_mut(&room_id) {
                    members.remove(&id);
                }
            }
        }
        (rx, generation)
    }

    /// Drops a connection and its room membership. Returns the room the
    /// client was attached to, if any, so the caller can run the
    /// disconnect policy. No-op when the generation does not match (a
    /// newer connection already took over).
    pub fn unregister(&self, id: PlayerId, generation: u64) -> Option<String> {
        let mut inner = self.inner.write();
        match inner.clients.get(&id) {
            Some(c) if c.generation == generation => {}
            _ => return None,
        }
        let client = inner.clients.remove(&id)?;
        if let Some(room_id) = &client.room_id {
            if let Some(members) = inner.rooms.get_mut(room_id) {
                members.remove(&id);
                if members.is_empty() {
                    inner.rooms.remove(room_id);
                }
            }
        }
        client.room_id
    }

    /// Moves a client's room attachment.
    pub fn join_room(&self, id: PlayerId, room_id: &str) {
        let mut inner = self.inner.write();
        let Some(client) = inner.clients.get_mut(&id) else {
            return;
        };
        let old = client.room_id.replace(room_id.to_string());
        if let Some(old_room) = old {
            if old_room != room_id {
                if let Some(members) = inner.rooms.get_mut(&old_room) {
                    members.remove(&id);
                }
            }
        }
        inner.rooms.entry(room_id.to_string()).or_default().insert(id);
    }

    /// The room a client is currently attached to.
    pub fn client_room(&self, id: PlayerId) -> Option<String> {
        self.inner.read().clients.get(&id)?.room_id.clone()
    }

    /// Sends a message to every client in a room. Full buffers drop the
    /// message for that client only.
    pub fn broadcast_room(&self, room_id: &str, msg: &ServerMessage) {
        let inner = self.inner.read();
        let Some(members) = inner.rooms.get(room_id) else {
            return;
        };
        for id in members {
            if let Some(client) = inner.clients.get(id) {
                if client.sender.try_send(msg.clone()).is_err() {
                    warn!(client = id, room = room_id, "client send buffer full, dropping");
                }
            }
        }
    }

    /// Sends a message to one client. Dropped silently if the buffer is
    /// full or the client is gone.
    pub fn send_to(&self, id: PlayerId, msg: ServerMessage) {
        let inner = self.inner.read();
        if let Some(client) = inner.clients.get(&id) {
            let _ = client.sender.try_send(msg);
        }
    }

    pub fn client_count(&self) -> usize {
        self.inner.read().clients.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
