use std::time::Duration;

/// Per-tier rules for entry cost, room size, pulse timing and the survival
/// phase. The table below is part of the client contract — changing a value
/// changes payouts and elimination timing for every room of that tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierConfig {
    pub tier: u8,
    /// Entry cost in stars, charged into the pool on join.
    pub entry_cost: i64,
    pub min_players: usize,
    pub max_players: usize,
    /// Max idle time before a player is eliminated.
    pub pulse_window: Duration,
    /// Timer extension per pulse before diminishing returns.
    pub base_extension: Duration,
    /// Starting value of the global timer.
    pub survival_time: Duration,
    pub prestige_mult: f64,
}

pub const TIER_1: TierConfig = TierConfig {
    tier: 1,
    entry_cost: 5,
    min_players: 3,
    max_players: 20,
    pulse_window: Duration::from_secs(5),
    base_extension: Duration::from_secs(3),
    survival_time: Duration::from_secs(120),
    prestige_mult: 1.0,
};

pub const TIER_2: TierConfig = TierConfig {
    tier: 2,
    entry_cost: 20,
    min_players: 5,
    max_players: 30,
    pulse_window: Duration::from_secs(4),
    base_extension: Duration::from_millis(2500),
    survival_time: Duration::from_secs(150),
    prestige_mult: 1.5,
};

pub const TIER_3: TierConfig = TierConfig {
    tier: 3,
    entry_cost: 100,
    min_players: 5,
    max_players: 50,
    pulse_window: Duration::from_secs(3),
    base_extension: Duration::from_secs(2),
    survival_time: Duration::from_secs(180),
    prestige_mult: 2.0,
};

/// Look up a tier by number. Tier numbers outside 1..=3 are unknown.
pub fn tier_config(tier: u8) -> Option<TierConfig> {
    match tier {
        1 => Some(TIER_1),
        2 => Some(TIER_2),
        3 => Some(TIER_3),
        _ => None,
    }
}

/// All tiers in ascending order.
pub fn all_tiers() -> [TierConfig; 3] {
    [TIER_1, TIER_2, TIER_3]
}
