//! Wire protocol
//!
//! JSON frames with a `{type, payload}` envelope in both directions.
//! Unknown inbound types are ignored, not errors, so older servers stay
//! compatible with newer clients.

use serde::{Deserialize, Serialize};

use crate::room::room::{PlayerId, Room, RoomState, RoomType};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter a room (charges the entry cost on success)
    JoinRoom { room_id: String },
    /// Keep-alive click during the survival phase
    Pulse,
    /// Request the open-room snapshot
    ListRooms,
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full room state, sent on every phase transition
    RoomState(RoomStatePayload),
    /// Compact timer/margin update, sent every 4th tick
    Tick(TickPayload),
    /// A player missed their pulse window
    Elimination { player_id: PlayerId, alive: usize },
    /// Server-authoritative pulse confirmation
    PulseAck {
        player_id: PlayerId,
        extension_ms: u64,
        timer_ms: u64,
        server_time_ms: u64,
    },
    /// Response to `list_rooms`, sent to the requester only
    RoomList(Vec<RoomInfo>),
    /// Per-player end-of-round summary for the results screen
    RoundResult {
        placement: usize,
        payout: i64,
        shards: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomStatePayload {
    pub room_id: String,
    pub state: RoomState,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub tier: u8,
    pub pool: i64,
    pub alive: usize,
    pub total: usize,
    pub timer_ms: u64,
    pub margin_ratio: f64,
    pub volatility_mul: f64,
    pub winner_id: Option<PlayerId>,
}

impl RoomStatePayload {
    pub fn from_room(room: &Room) -> Self {
        Self {
            room_id: room.id.clone(),
            state: room.state,
            room_type: room.room_type,
            tier: room.tier.tier,
            pool: room.pool,
            alive: room.alive_count(),
            total: room.player_count(),
            timer_ms: room.global_timer.as_millis() as u64,
            margin_ratio: room.margin_ratio,
            volatility_mul: room.volatility_mul,
            winner_id: room.winner_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickPayload {
    pub timer_ms: u64,
    pub margin_ratio: f64,
    pub volatility_mul: f64,
    pub alive: usize,
}

impl TickPayload {
    pub fn from_room(room: &Room) -> Self {
        Self {
            timer_ms: room.global_timer.as_millis() as u64,
            margin_ratio: room.margin_ratio,
            volatility_mul: room.volatility_mul,
            alive: room.alive_count(),
        }
    }
}

/// One row of the room browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub tier: u8,
    pub state: RoomState,
    pub players: usize,
    pub pool: i64,
}

impl RoomInfo {
    pub fn from_room(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            room_type: room.room_type,
            tier: room.tier.tier,
            state: room.state,
            players: room.player_count(),
            pool: room.pool,
        }
    }
}

/// Parses an inbound frame. Returns None for well-formed envelopes of
/// unknown type (forward compatibility); malformed JSON is an error and
/// terminates the connection upstream.
pub fn parse_client_message(raw: &str) -> Result<Option<ClientMessage>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(serde_json::from_value(value).ok())
}
