use std::time::Instant;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::room::tier::TierConfig;

pub type PlayerId = i64;

/// Room flavor: Blitz rooms run on the synthetic volatility walk, Alpha
/// rooms track a live oracle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Alpha,
    Blitz,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Alpha => "alpha",
            RoomType::Blitz => "blitz",
        }
    }
}

/// Round lifecycle. Transitions only move forward; `reset_round` is the
/// single sanctioned path back from Finished to Waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Waiting,
    Active,
    Survival,
    Finished,
}

impl RoomState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomState::Waiting => "waiting",
            RoomState::Active => "active",
            RoomState::Survival => "survival",
            RoomState::Finished => "finished",
        }
    }
}

/// Per-player state inside one round. Created on join, mutated only by the
/// owning runner (or the simulator), dropped with the room.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: PlayerId,
    pub username: String,
    pub alive: bool,
    pub pulse_count: u32,
    /// Equals the entry cost — pulses are free in the current design.
    pub stars_spent: i64,
    pub joined_at: Instant,
    pub last_pulse_at: Instant,
    pub eliminated_at: Option<Instant>,
    pub disconnected: bool,
}

/// Full mutable state of a single game room. Callers outside the owning
/// runner must go through the room's lock and never hold it across awaits.
pub struct Room {
    pub id: String,
    pub room_type: RoomType,
    pub tier: TierConfig,
    pub state: RoomState,
    pub pool: i64,
    pub players: HashMap<PlayerId, PlayerState>,
    pub winner_id: Option<PlayerId>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    pub elimination_order: Vec<PlayerId>,

    // Survival phase fields
    pub global_timer: std::time::Duration,
    /// 0..1 — 1.0 means liquidation.
    pub margin_ratio: f64,
    pub volatility_mul: f64,
}

impl Room {
    pub fn new(id: String, room_type: RoomType, tier: TierConfig) -> Self {
        Self {
            id,
            room_type,
            tier,
            state: RoomState::Waiting,
            pool: 0,
            players: HashMap::new(),
            winner_id: None,
            created_at: Instant::now(),
            started_at: None,
            ended_at: None,
            elimination_order: Vec::new(),
            global_timer: tier.survival_time,
            margin_ratio: 0.0,
            volatility_mul: 1.0,
        }
    }

    /// Adds a player when join is allowed: Waiting or Active (countdown).
    /// Survival and Finished are locked so there is no midgame or post-round
    /// join. Charges the entry cost into the pool on success.
    pub fn add_player(&mut self, id: PlayerId, username: &str) -> bool {
        if self.state == RoomState::Survival || self.state == RoomState::Finished {
            return false;
        }
        if self.players.len() >= self.tier.max_players {
            return false;
        }
        if self.players.contains_key(&id) {
            return false;
        }
        let now = Instant::now();
        self.players.insert(
            id,
            PlayerState {
                id,
                username: username.to_string(),
                alive: true,
                pulse_count: 0,
                stars_spent: self.tier.entry_cost,
                joined_at: now,
                last_pulse_at: now,
                eliminated_at: None,
                disconnected: false,
            },
        );
        self.pool += self.tier.entry_cost;
        true
    }

    /// Removes a player. `refund` deducts the entry cost from the pool (only
    /// sensible while Waiting — no refund once the countdown starts, which
    /// would let players scout the volatility curve for free).
    pub fn remove_player(&mut self, id: PlayerId, refund: bool) -> bool {
        if self.players.remove(&id).is_none() {
            return false;
        }
        if refund && self.pool >= self.tier.entry_cost {
            self.pool -= self.tier.entry_cost;
        }
        true
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| p.alive)
            .map(|p| p.id)
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Marks a player dead and appends to the elimination order. Idempotent
    /// for already-eliminated players.
    pub fn eliminate(&mut self, id: PlayerId) {
        if let Some(p) = self.players.get_mut(&id) {
            if p.alive {
                p.alive = false;
                p.eliminated_at = Some(Instant::now());
                self.elimination_order.push(id);
            }
        }
    }

    /// Records a pulse at server time. Returns the pulse timestamp when
    /// accepted; only alive players can pulse.
    pub fn record_pulse(&mut self, id: PlayerId) -> Option<Instant> {
        let p = self.players.get_mut(&id)?;
        if !p.alive {
            return None;
        }
        let now = Instant::now();
        p.pulse_count += 1;
        p.last_pulse_at = now;
        Some(now)
    }

    /// Marks a player as temporarily disconnected (app closed / connection
    /// lost). Not an exit; the pulse window still applies.
    pub fn mark_disconnected(&mut self, id: PlayerId) {
        if let Some(p) = self.players.get_mut(&id) {
            p.disconnected = true;
        }
    }

    /// Clears the disconnected flag after a successful reconnect.
    pub fn clear_disconnected(&mut self, id: PlayerId) {
        if let Some(p) = self.players.get_mut(&id) {
            p.disconnected = false;
        }
    }

    /// Decides restore vs eliminate for a reconnecting player.
    /// Server-authoritative: in Waiting/Active always restore; in Survival
    /// restore only if the pulse window has not lapsed, else eliminate.
    pub fn reconnect_check(&self, id: PlayerId) -> (bool, bool) {
        let Some(p) = self.players.get(&id) else {
            return (false, false);
        };
        if !p.disconnected || !p.alive {
            return (false, false);
        }
        match self.state {
            RoomState::Waiting | RoomState::Active => (true, false),
            RoomState::Survival => {
                if p.last_pulse_at.elapsed() > self.tier.pulse_window {
                    (false, true)
                } else {
                    (true, false)
                }
            }
            RoomState::Finished => (false, false),
        }
    }

    /// Player ids ordered by finishing position: alive players first, then
    /// eliminated players in reverse elimination order (last out ranks
    /// best). Co-survivors are ranked by a deterministic hash mix of the
    /// room id and player id — efficiency is identical for co-survivors in
    /// the same room, and a raw-id tie-break would bias placement toward
    /// whoever registered earlier.
    pub fn placements(&self) -> Vec<PlayerId> {
        let seed = placement_seed(&self.id);
        let mut alive: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.alive)
            .map(|p| p.id)
            .collect();
        alive.sort_by_key(|&id| placement_mix(seed, id));

        let mut out = Vec::with_capacity(self.players.len());
        out.extend(alive);
        out.extend(self.elimination_order.iter().rev());
        out
    }

    pub fn can_start(&self) -> bool {
        self.state == RoomState::Waiting && self.players.len() >= self.tier.min_players
    }

    /// Puts the room back to Waiting for the next round. Clears all players
    /// so everyone must re-enter and pay entry again — a free carry-over
    /// would let survivors scout the volatility curve across rounds.
    pub fn reset_round(&mut self) -> bool {
        if self.state != RoomState::Finished {
            return false;
        }
        self.state = RoomState::Waiting;
        self.pool = 0;
        self.winner_id = None;
        self.started_at = None;
        self.ended_at = None;
        self.elimination_order.clear();
        self.global_timer = self.tier.survival_time;
        self.margin_ratio = 0.0;
        self.volatility_mul = 1.0;
        self.players.clear();
        true
    }
}

/// Seed for the placement mix: the room id folded by multiplicative
/// accumulation, matching the reference mix exactly.
pub fn placement_seed(room_id: &str) -> i64 {
    let mut acc: i64 = 0;
    for c in room_id.chars() {
        acc = acc.wrapping_mul(31).wrapping_add(c as i64);
    }
    acc
}

/// Integer hash mix used to rank co-survivors. Deterministic and
/// id-neutral: the output order carries no correlation with raw id values.
pub fn placement_mix(seed: i64, id: PlayerId) -> i64 {
    let mut h = id ^ seed.wrapping_mul(2654435761);
    h ^= h >> 16;
    h = h.wrapping_mul(0x45d9f3b);
    h ^= h >> 16;
    h
}
