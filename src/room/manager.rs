use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::room::room::{Room, RoomState, RoomType};
use crate::room::tier::tier_config;

/// Shared handle to a room. The runner holds one for the duration of a
/// round; the hub and supervisor take short read/write locks and never hold
/// them across awaits.
pub type SharedRoom = Arc<RwLock<Room>>;

/// Room registry — creation, lookup, cleanup. Reads are concurrent, writes
/// are serialized.
pub struct Manager {
    rooms: RwLock<HashMap<String, SharedRoom>>,
}

/// Manager errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagerError {
    #[error("unknown tier: {0}")]
    UnknownTier(u8),
}

impl Manager {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, room_type: RoomType, tier: u8) -> Result<SharedRoom, ManagerError> {
        let tc = tier_config(tier).ok_or(ManagerError::UnknownTier(tier))?;
        let id = Uuid::new_v4().to_string();
        let room = Arc::new(RwLock::new(Room::new(id.clone(), room_type, tc)));
        self.rooms.write().insert(id, room.clone());
        Ok(room)
    }

    pub fn get(&self, id: &str) -> Option<SharedRoom> {
        self.rooms.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.rooms.write().remove(id);
    }

    pub fn list_by_state(&self, state: RoomState) -> Vec<SharedRoom> {
        self.rooms
            .read()
            .values()
            .filter(|r| r.read().state == state)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.rooms.read().len()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
