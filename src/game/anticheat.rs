//! Server-side pulse rate limiting
//!
//! Enforces a minimum interval between pulses per player. Timing is
//! server-authoritative; client timestamps are never trusted.

use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::room::room::PlayerId;

/// Minimum interval between accepted pulses.
pub const MIN_PULSE_INTERVAL: Duration = Duration::from_millis(500);

/// Tracks the last accepted pulse per player and rejects anything faster
/// than the minimum interval. Rejected pulses are dropped silently.
pub struct PulseRateLimiter {
    last_pulse: Mutex<HashMap<PlayerId, Instant>>,
    min_interval: Duration,
}

impl PulseRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_pulse: Mutex::new(HashMap::new()),
            min_interval,
        }
    }

    /// Returns true if enough time has passed since the player's last
    /// accepted pulse, and records this one.
    pub fn allow_pulse(&self, player_id: PlayerId) -> bool {
        let mut last = self.last_pulse.lock();
        let now = Instant::now();
        if let Some(prev) = last.get(&player_id) {
            if now.duration_since(*prev) < self.min_interval {
                return false;
            }
        }
        last.insert(player_id, now);
        true
    }

    /// Clears tracking for a player (called when they leave a room).
    pub fn reset(&self, player_id: PlayerId) {
        self.last_pulse.lock().remove(&player_id);
    }

    /// Clears all tracking data.
    pub fn reset_all(&self) {
        self.last_pulse.lock().clear();
    }
}

impl Default for PulseRateLimiter {
    fn default() -> Self {
        Self::new(MIN_PULSE_INTERVAL)
    }
}
