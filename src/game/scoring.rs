//! Scoring and economy primitives
//!
//! Pure functions only. Integer truncation is deliberate and part of the
//! contract: rounding loss stays with the house.

use std::time::Duration;

/// Rake taken from the pool before payout, in percent.
pub const RAKE_PCT: i64 = 12;

/// Fraction of the rake credited to squad war chests, in percent.
pub const WAR_CHEST_PCT: i64 = 3;

/// Multiplier rises as the margin ratio approaches liquidation (1.0).
/// Cubic curve for dramatic escalation near the end.
pub fn volatility_multiplier(margin_ratio: f64) -> f64 {
    let clamped = margin_ratio.clamp(0.0, 1.0);
    1.0 + 4.0 * clamped.powi(3)
}

/// Amount the global timer decreases each tick. Accelerates with the
/// margin ratio: x1 at 0, x3 at liquidation.
pub fn tick_decrement(tick_interval: Duration, margin_ratio: f64) -> Duration {
    tick_interval.mul_f64(1.0 + margin_ratio * 2.0)
}

/// How much time a pulse adds to the global timer. Diminishing returns:
/// base extension split across alive players.
pub fn pulse_extension(base_extension: Duration, alive_players: usize) -> Duration {
    if alive_players == 0 {
        return Duration::ZERO;
    }
    base_extension / alive_players as u32
}

/// The 12% pool rake.
pub fn rake_amount(pool: i64) -> i64 {
    pool * RAKE_PCT / 100
}

/// 3% of total rake goes to war chests.
pub fn war_chest_contribution(rake: i64) -> i64 {
    rake * WAR_CHEST_PCT / 100
}

/// A star payout for one finishing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    /// 1-based finishing position.
    pub place: usize,
    pub amount: i64,
}

/// Star payouts over the post-rake pool. Solo rooms pay the whole post-rake
/// pool; two players split 75/25; three or more split 60/25/15 across the
/// top three.
pub fn placement_payouts(pool: i64, player_count: usize) -> Vec<Payout> {
    let post_rake = pool - rake_amount(pool);
    match player_count {
        0 | 1 => vec![Payout { place: 1, amount: post_rake }],
        2 => vec![
            Payout { place: 1, amount: post_rake * 75 / 100 },
            Payout { place: 2, amount: post_rake * 25 / 100 },
        ],
        _ => vec![
            Payout { place: 1, amount: post_rake * 60 / 100 },
            Payout { place: 2, amount: post_rake * 25 / 100 },
            Payout { place: 3, amount: post_rake * 15 / 100 },
        ],
    }
}

/// Consolation shards for players outside the payout places. The base rate
/// scales from 40% to 60% of the entry cost with the volatility multiplier;
/// 4th and 5th place get a near-miss bonus.
pub fn shards_for_loser(entry_cost: i64, vol_mul: f64, placement: usize) -> i64 {
    let ratio = 0.4 + 0.2 * ((vol_mul - 1.0) / 4.0).min(1.0);
    let base = (entry_cost as f64 * ratio).floor() as i64;
    match placement {
        4 => base * 2,
        5 => base * 3 / 2,
        _ => base,
    }
}

/// The primary competitive metric:
/// efficiency = (seconds survived × volatility multiplier) / stars spent.
pub fn survival_efficiency(time_survived: Duration, vol_mul: f64, stars_spent: i64) -> f64 {
    if stars_spent <= 0 {
        return 0.0;
    }
    time_survived.as_secs_f64() * vol_mul / stars_spent as f64
}
