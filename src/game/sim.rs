//! Deterministic round simulator
//!
//! Executes a full round from a fixed script: no tasks, no channels, no
//! wall clock. Everything is driven by discrete tick steps, so identical
//! configs produce identical results across runs and machines. Used by the
//! test suite and the Monte Carlo driver.

use std::time::Duration;

use hashbrown::HashMap;

use crate::game::scoring::{
    placement_payouts, pulse_extension, shards_for_loser, survival_efficiency, tick_decrement,
    volatility_multiplier,
};
use crate::game::LATENCY_GRACE_TICKS;
use crate::room::room::{PlayerId, Room, RoomState, RoomType};
use crate::room::tier::TierConfig;

/// Fixed simulator tick, matching the live runner.
pub const SIM_TICK_RATE: Duration = Duration::from_millis(250);

/// Fully describes a deterministic round.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tier: TierConfig,
    pub player_ids: Vec<PlayerId>,

    /// Tick number → margin ratio. Ticks not in the map keep the previous
    /// value. Any value >= 1.0 ends the round with `Liquidation`.
    pub vol_script: HashMap<u32, f64>,

    /// Tick number → players that pulse at that tick, in list order.
    pub pulse_schedule: HashMap<u32, Vec<PlayerId>>,

    /// Safety cap; 0 defaults to 2400 (10 min at 250 ms).
    pub max_ticks: u32,

    /// Skip event recording (Monte Carlo throughput).
    pub silent: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tier: crate::room::tier::TIER_1,
            player_ids: Vec::new(),
            vol_script: HashMap::new(),
            pulse_schedule: HashMap::new(),
            max_ticks: 0,
            silent: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEventKind {
    Pulse,
    Elimination,
    Liquidation,
    TimerZero,
    LastAlive,
    Finish,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimEvent {
    pub tick: u32,
    pub kind: SimEventKind,
    pub player: Option<PlayerId>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    LastAlive,
    TimerZero,
    Liquidation,
    MaxTicks,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::LastAlive => "last_alive",
            FinishReason::TimerZero => "timer_zero",
            FinishReason::Liquidation => "liquidation",
            FinishReason::MaxTicks => "max_ticks",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimPlayerStat {
    pub alive: bool,
    pub pulse_count: u32,
    /// Entry cost only — pulses are free.
    pub stars_spent: i64,
    /// Tick of elimination; 0 means the player survived the round.
    pub eliminated_at: u32,
    pub efficiency: f64,
    pub shards_earned: i64,
    /// 1-based finishing position.
    pub placement: usize,
    /// Star payout for top finishers, 0 otherwise.
    pub payout: i64,
}

#[derive(Debug, Clone)]
pub struct SimResult {
    pub events: Vec<SimEvent>,
    pub winner_id: Option<PlayerId>,
    pub finish_reason: FinishReason,
    pub total_ticks: u32,
    pub final_timer: Duration,
    pub final_margin: f64,
    pub final_vol_mul: f64,
    pub player_stats: HashMap<PlayerId, SimPlayerStat>,
    pub placements: Vec<PlayerId>,
}

/// Runs a fully deterministic round.
///
/// Processing order per tick:
///  1. Apply volatility update (if scripted for this tick)
///  2. Process pulses (with rate limiting)
///  3. Decrement global timer
///  4. Check pulse window, eliminate expired players
///  5. Check end conditions
pub fn run_simulation(cfg: &SimConfig) -> SimResult {
    let max_ticks = if cfg.max_ticks == 0 { 2400 } else { cfg.max_ticks };

    let mut room = Room::new("sim-room".to_string(), RoomType::Blitz, cfg.tier);
    for &pid in &cfg.player_ids {
        room.add_player(pid, &format!("bot-{pid}"));
    }
    room.state = RoomState::Survival;

    let mut stats: HashMap<PlayerId, SimPlayerStat> =
        HashMap::with_capacity(cfg.player_ids.len());
    for &pid in &cfg.player_ids {
        stats.insert(
            pid,
            SimPlayerStat {
                alive: true,
                stars_spent: cfg.tier.entry_cost,
                ..Default::default()
            },
        );
    }

    // Rate-limit gate and window clock, both in ticks. The window clock
    // starts at 0 so a player who never pulses expires one window after
    // survival begins.
    let mut last_pulse_tick: HashMap<PlayerId, u32> = HashMap::new();
    let mut last_pulse_for_window: HashMap<PlayerId, u32> =
        cfg.player_ids.iter().map(|&pid| (pid, 0)).collect();

    let mut events: Vec<SimEvent> = Vec::new();
    let silent = cfg.silent;
    let mut margin_ratio = 0.0;
    let mut vol_mul = 1.0;
    let min_pulse_gap =
        (500u32).div_ceil(SIM_TICK_RATE.as_millis() as u32) + 1;
    let pulse_window_ticks =
        (cfg.tier.pulse_window.as_millis() / SIM_TICK_RATE.as_millis()) as u32
            + LATENCY_GRACE_TICKS;

    let mut finish_reason = FinishReason::MaxTicks;
    let mut total_ticks = max_ticks;
    let mut last_alive_winner = None;

    'round: for tick in 1..=max_ticks {
        // 1. Volatility update
        if let Some(&mr) = cfg.vol_script.get(&tick) {
            margin_ratio = mr;
            vol_mul = volatility_multiplier(mr);
            if mr >= 1.0 {
                if !silent {
                    events.push(SimEvent {
                        tick,
                        kind: SimEventKind::Liquidation,
                        player: None,
                        detail: format!("margin={mr:.4}"),
                    });
                }
                finish_reason = FinishReason::Liquidation;
                total_ticks = tick;
                break 'round;
            }
        }

        // 2. Process pulses (free — no star cost)
        if let Some(pulses) = cfg.pulse_schedule.get(&tick) {
            for &pid in pulses {
                let Some(st) = stats.get_mut(&pid) else { continue };
                if !st.alive {
                    continue;
                }
                if let Some(&last) = last_pulse_tick.get(&pid) {
                    if tick - last < min_pulse_gap {
                        continue;
                    }
                }

                st.pulse_count += 1;
                last_pulse_tick.insert(pid, tick);
                last_pulse_for_window.insert(pid, tick);

                let ext = pulse_extension(cfg.tier.base_extension, room.alive_count());
                room.global_timer += ext;

                if !silent {
                    events.push(SimEvent {
                        tick,
                        kind: SimEventKind::Pulse,
                        player: Some(pid),
                        detail: format!(
                            "ext={}ms timer={}ms",
                            ext.as_millis(),
                            room.global_timer.as_millis()
                        ),
                    });
                }
            }
        }

        // 3. Timer decrement
        let dec = tick_decrement(SIM_TICK_RATE, margin_ratio);
        room.global_timer = room.global_timer.saturating_sub(dec);

        // 4. Pulse window check (with latency grace), eliminations in
        // input id order for determinism
        for &pid in &cfg.player_ids {
            let st = stats.get_mut(&pid).expect("stat exists for every player");
            if !st.alive {
                continue;
            }
            let ticks_since = tick - last_pulse_for_window[&pid];
            if ticks_since > pulse_window_ticks {
                st.alive = false;
                st.eliminated_at = tick;
                room.eliminate(pid);
                if !silent {
                    events.push(SimEvent {
                        tick,
                        kind: SimEventKind::Elimination,
                        player: Some(pid),
                        detail: format!(
                            "no_pulse_for={ticks_since}_ticks window={pulse_window_ticks}_ticks"
                        ),
                    });
                }
            }
        }

        // 5. End conditions
        if room.alive_count() <= 1 {
            finish_reason = FinishReason::LastAlive;
            total_ticks = tick;
            last_alive_winner = cfg
                .player_ids
                .iter()
                .copied()
                .find(|pid| stats[pid].alive);
            if !silent {
                events.push(SimEvent {
                    tick,
                    kind: SimEventKind::LastAlive,
                    player: last_alive_winner,
                    detail: String::new(),
                });
            }
            break 'round;
        }
        if room.global_timer.is_zero() {
            finish_reason = FinishReason::TimerZero;
            total_ticks = tick;
            if !silent {
                events.push(SimEvent {
                    tick,
                    kind: SimEventKind::TimerZero,
                    player: None,
                    detail: String::new(),
                });
            }
            break 'round;
        }
    }

    // Placements: alive players ranked by the room's hash mix, then the
    // eliminated in reverse elimination order.
    let placements = room.placements();
    let winner_id = placements.first().copied();

    let pool = cfg.player_ids.len() as i64 * cfg.tier.entry_cost;
    let payouts = placement_payouts(pool, cfg.player_ids.len());
    let top_places = payouts.len();

    for (i, &pid) in placements.iter().enumerate() {
        let st = stats.get_mut(&pid).expect("stat exists for every placement");
        let place = i + 1;
        st.placement = place;

        let survival_ticks = if st.eliminated_at > 0 {
            st.eliminated_at
        } else {
            total_ticks
        };
        let survival_dur = SIM_TICK_RATE * survival_ticks;
        st.efficiency = survival_efficiency(survival_dur, vol_mul, st.stars_spent);

        if place <= top_places {
            st.payout = payouts
                .iter()
                .find(|pp| pp.place == place)
                .map(|pp| pp.amount)
                .unwrap_or(0);
            st.shards_earned = 0;
        } else {
            st.shards_earned = shards_for_loser(cfg.tier.entry_cost, vol_mul, place);
        }
    }

    if !silent && !placements.is_empty() {
        let mut detail = format!(
            "pool={pool} rake={} placements:",
            crate::game::scoring::rake_amount(pool)
        );
        for pp in &payouts {
            if pp.place <= placements.len() {
                detail.push_str(&format!(" {}→{}★", pp.place, pp.amount));
            }
        }
        events.push(SimEvent {
            tick: total_ticks,
            kind: SimEventKind::Finish,
            player: None,
            detail,
        });
    }

    SimResult {
        events,
        winner_id,
        finish_reason,
        total_ticks,
        final_timer: room.global_timer,
        final_margin: margin_ratio,
        final_vol_mul: vol_mul,
        player_stats: stats,
        placements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::tier::{TIER_1, TIER_3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn player_pulses(pid: PlayerId, ticks: &[u32]) -> HashMap<u32, Vec<PlayerId>> {
        let mut m: HashMap<u32, Vec<PlayerId>> = HashMap::new();
        for &t in ticks {
            m.entry(t).or_default().push(pid);
        }
        m
    }

    fn everyone_pulses(players: &[PlayerId], ticks: &[u32]) -> HashMap<u32, Vec<PlayerId>> {
        let mut m: HashMap<u32, Vec<PlayerId>> = HashMap::new();
        for &t in ticks {
            m.insert(t, players.to_vec());
        }
        m
    }

    fn merge_pulses(
        schedules: Vec<HashMap<u32, Vec<PlayerId>>>,
    ) -> HashMap<u32, Vec<PlayerId>> {
        let mut m: HashMap<u32, Vec<PlayerId>> = HashMap::new();
        for s in schedules {
            for (t, pids) in s {
                m.entry(t).or_default().extend(pids);
            }
        }
        m
    }

    fn vol_script(pairs: &[(u32, f64)]) -> HashMap<u32, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_timer_decrements() {
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.1)]),
            max_ticks: 30,
            ..Default::default()
        });
        assert!(result.final_timer < TIER_1.survival_time);
    }

    #[test]
    fn test_timer_accelerates_with_margin() {
        let players = vec![1, 2, 3];
        let pulses = everyone_pulses(&players, &[1, 4, 7, 10, 13, 16, 19]);

        let low = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: players.clone(),
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: pulses.clone(),
            max_ticks: 20,
            ..Default::default()
        });
        let high = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: players,
            vol_script: vol_script(&[(1, 0.9)]),
            pulse_schedule: pulses,
            max_ticks: 20,
            ..Default::default()
        });

        assert!(
            high.final_timer < low.final_timer,
            "higher margin should drain faster: low={:?} high={:?}",
            low.final_timer,
            high.final_timer
        );
    }

    #[test]
    fn test_timer_rises_with_enough_pulses() {
        // Extensions can outpace the drain, so the timer has no upper
        // bound below the max-tick cap.
        let players: Vec<PlayerId> = (1..=5).collect();
        let quiet = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: players.clone(),
            vol_script: vol_script(&[(1, 0.0)]),
            max_ticks: 10,
            ..Default::default()
        });
        let busy = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: players.clone(),
            vol_script: vol_script(&[(1, 0.0)]),
            pulse_schedule: everyone_pulses(&players, &[1, 4, 7, 10]),
            max_ticks: 10,
            ..Default::default()
        });

        assert!(quiet.final_timer < TIER_1.survival_time);
        assert!(busy.final_timer > quiet.final_timer);
        assert!(busy.final_timer > TIER_1.survival_time);
    }

    #[test]
    fn test_pulse_window_elimination() {
        // Tier 1: window 5s = 20 ticks + 1 grace. A player who never pulses
        // is eliminated around tick 21-22.
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(2, &[1, 4, 7, 10, 13, 16, 19]),
                player_pulses(3, &[1, 4, 7, 10, 13, 16, 19]),
            ]),
            max_ticks: 25,
            ..Default::default()
        });

        let st = &result.player_stats[&1];
        assert!(!st.alive, "player 1 should be eliminated (no pulses)");
        assert!(st.eliminated_at >= 20 && st.eliminated_at <= 24,
            "expected elimination around tick 21-22, got {}", st.eliminated_at);
    }

    #[test]
    fn test_late_pulse_does_not_count() {
        let pulse_window_ticks =
            (TIER_1.pulse_window.as_millis() / SIM_TICK_RATE.as_millis()) as u32;
        let late_tick = pulse_window_ticks + LATENCY_GRACE_TICKS + 2;

        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(2, &[1, 4, 7, 10, 13, 16, 19, 22, 25]),
                player_pulses(3, &[1, 4, 7, 10, 13, 16, 19, 22, 25]),
                player_pulses(1, &[late_tick]),
            ]),
            max_ticks: late_tick + 5,
            ..Default::default()
        });

        let st = &result.player_stats[&1];
        assert!(!st.alive, "pulsed after window + grace");
        assert_eq!(st.pulse_count, 0, "late pulse should not have counted");
    }

    #[test]
    fn test_pulse_spam_rate_limited() {
        // Pulsing every tick for 10 ticks at 250 ms: the 500 ms gate caps
        // accepted pulses well below 10.
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(1, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
                player_pulses(2, &[1, 4, 7, 10]),
                player_pulses(3, &[1, 4, 7, 10]),
            ]),
            max_ticks: 10,
            ..Default::default()
        });

        let count = result.player_stats[&1].pulse_count;
        assert!(count <= 6, "expected <= 6 accepted pulses, got {count}");
        assert!(count >= 3, "rate limiter rejected too much: {count}");
    }

    #[test]
    fn test_simultaneous_eliminations_single_survivor() {
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3, 4, 5],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: player_pulses(5, &[1, 4, 7, 10, 13, 16, 19, 22, 25]),
            max_ticks: 30,
            ..Default::default()
        });

        let elim_tick = result.player_stats[&1].eliminated_at;
        for pid in [2, 3, 4] {
            assert_eq!(
                result.player_stats[&pid].eliminated_at, elim_tick,
                "players should be eliminated simultaneously"
            );
        }
        assert_eq!(result.winner_id, Some(5));
        assert_eq!(result.finish_reason, FinishReason::LastAlive);
    }

    #[test]
    fn test_last_click_race() {
        let pw = (TIER_1.pulse_window.as_millis() / SIM_TICK_RATE.as_millis()) as u32;
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(1, &[1, 4, 7, 10]),
                player_pulses(2, &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31]),
                player_pulses(
                    3,
                    &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40, 43, 46, 49, 52, 55],
                ),
            ]),
            max_ticks: pw * 3 + 10,
            ..Default::default()
        });

        assert!(!result.player_stats[&1].alive);
        assert!(!result.player_stats[&2].alive);
        assert_eq!(result.winner_id, Some(3));
        assert!(
            result.player_stats[&1].eliminated_at < result.player_stats[&2].eliminated_at,
            "player 1 should fall before player 2"
        );
    }

    #[test]
    fn test_liquidation_trigger() {
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.2), (5, 0.5), (10, 0.8), (15, 1.0)]),
            pulse_schedule: everyone_pulses(&[1, 2, 3], &[1, 4, 7, 10, 13]),
            max_ticks: 20,
            ..Default::default()
        });

        assert_eq!(result.finish_reason, FinishReason::Liquidation);
        assert_eq!(result.total_ticks, 15);
    }

    #[test]
    fn test_timer_zero() {
        let mut pulses: HashMap<u32, Vec<PlayerId>> = HashMap::new();
        let mut tick = 1;
        while tick <= 300 {
            pulses.insert(tick, vec![1, 2, 3]);
            tick += 19;
        }

        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.95)]),
            pulse_schedule: pulses,
            max_ticks: 400,
            ..Default::default()
        });

        assert_eq!(result.finish_reason, FinishReason::TimerZero);
        assert!(result.final_timer.is_zero());
    }

    #[test]
    fn test_determinism() {
        let cfg = SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3, 4, 5],
            vol_script: vol_script(&[(1, 0.1), (50, 0.3), (100, 0.6), (150, 0.9)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(1, &[1, 4, 7, 10, 13, 16, 19]),
                player_pulses(2, &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40]),
                player_pulses(
                    3,
                    &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40, 43, 46, 49],
                ),
                player_pulses(
                    4,
                    &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40, 43, 46, 49, 52, 55, 58],
                ),
                player_pulses(
                    5,
                    &[
                        1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40, 43, 46, 49, 52, 55,
                        58, 61, 64, 67, 70,
                    ],
                ),
            ]),
            max_ticks: 200,
            ..Default::default()
        };

        let a = run_simulation(&cfg);
        let b = run_simulation(&cfg);

        assert_eq!(a.winner_id, b.winner_id);
        assert_eq!(a.total_ticks, b.total_ticks);
        assert_eq!(a.finish_reason, b.finish_reason);
        assert_eq!(a.final_timer, b.final_timer);
        assert_eq!(a.events, b.events);
        assert_eq!(a.placements, b.placements);
    }

    #[test]
    fn test_room_finish_state() {
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: player_pulses(3, &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34]),
            max_ticks: 40,
            ..Default::default()
        });

        assert_eq!(result.winner_id, Some(3));
        assert_eq!(result.finish_reason, FinishReason::LastAlive);
        assert!(!result.player_stats[&1].alive);
        assert!(!result.player_stats[&2].alive);
        assert!(result.player_stats[&3].alive);
    }

    #[test]
    fn test_placements_and_rewards() {
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3, 4, 5],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(
                    5,
                    &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40, 43, 46, 49, 52, 55],
                ),
                player_pulses(4, &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40]),
                player_pulses(3, &[1, 4, 7, 10, 13, 16, 19, 22, 25]),
                player_pulses(2, &[1, 4, 7, 10]),
                // player 1 never pulses → out first
            ]),
            max_ticks: 80,
            ..Default::default()
        });

        assert_eq!(result.winner_id, Some(5));
        assert_eq!(result.placements.len(), 5);
        assert_eq!(result.placements[0], 5);

        for pid in 1..=5i64 {
            assert!(result.player_stats[&pid].placement > 0);
        }

        let winner = &result.player_stats[&5];
        assert!(winner.payout > 0, "winner should have a payout");
        assert_eq!(winner.shards_earned, 0);

        let last = &result.player_stats[&result.placements[4]];
        assert!(last.shards_earned > 0, "last place should earn shards");
    }

    #[test]
    fn test_top3_payout_conservation() {
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3, 4, 5],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(
                    5,
                    &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40, 43, 46, 49, 52, 55],
                ),
                player_pulses(4, &[1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40]),
                player_pulses(3, &[1, 4, 7, 10, 13, 16, 19, 22, 25]),
                player_pulses(2, &[1, 4, 7, 10]),
            ]),
            max_ticks: 80,
            ..Default::default()
        });

        let pool = 5 * TIER_1.entry_cost;
        let post_rake = pool - crate::game::scoring::rake_amount(pool);
        let total: i64 = result.placements[..3]
            .iter()
            .map(|pid| result.player_stats[pid].payout)
            .sum();

        assert!(total <= post_rake);
        assert!(total >= post_rake - 3);

        for pid in &result.placements[3..] {
            let st = &result.player_stats[pid];
            assert_eq!(st.payout, 0, "place {} should have no payout", st.placement);
            assert!(st.shards_earned > 0, "place {} should earn shards", st.placement);
        }
    }

    #[test]
    fn test_free_pulses() {
        let result = run_simulation(&SimConfig {
            tier: TIER_1,
            player_ids: vec![1, 2, 3],
            vol_script: vol_script(&[(1, 0.1)]),
            pulse_schedule: merge_pulses(vec![
                player_pulses(1, &[1, 4, 7, 10, 13, 16, 19]),
                player_pulses(2, &[1, 4, 7]),
                player_pulses(3, &[1]),
            ]),
            max_ticks: 30,
            ..Default::default()
        });

        for pid in 1..=3i64 {
            assert_eq!(
                result.player_stats[&pid].stars_spent,
                TIER_1.entry_cost,
                "pulses are free — only the entry cost is spent"
            );
        }
    }

    // Latency fairness: three latency groups (0/1/2 ticks of base delay plus
    // modest jitter) play 1000 rounds with identical strategies. Tick
    // quantization plus the grace tick must keep the top-3 rate and average
    // placement spread within 15% between the best and worst group.
    #[test]
    fn test_latency_fairness() {
        struct LatencyGroup {
            delay: u32,
            jitter_max: u32,
            jitter_prob: f64,
        }
        let lats = [
            LatencyGroup { delay: 0, jitter_max: 1, jitter_prob: 0.02 },
            LatencyGroup { delay: 1, jitter_max: 1, jitter_prob: 0.05 },
            LatencyGroup { delay: 2, jitter_max: 2, jitter_prob: 0.03 },
        ];
        const PER_GROUP: usize = 5;
        const ROUNDS: usize = 1000;

        // Tier 3 has the tightest window (3 s = 12 ticks) — most
        // latency-sensitive.
        let tier = TIER_3;
        let pw_ticks = (tier.pulse_window.as_millis() / SIM_TICK_RATE.as_millis()) as u32;

        #[derive(Default)]
        struct GroupStat {
            top3: usize,
            games: usize,
            total_place: usize,
        }
        let mut gs: Vec<GroupStat> = (0..lats.len()).map(|_| GroupStat::default()).collect();

        let mut rng = StdRng::seed_from_u64(99991);

        for round in 0..ROUNDS {
            let mut pids = Vec::new();
            let mut pgroup = HashMap::new();
            // Interleave ids across groups so id order carries no group bias
            for p in 0..PER_GROUP {
                for (gi, _) in lats.iter().enumerate() {
                    let pid = (p * lats.len() + gi + 1) as PlayerId;
                    pids.push(pid);
                    pgroup.insert(pid, gi);
                }
            }

            let mut schedule: HashMap<u32, Vec<PlayerId>> = HashMap::new();
            for &pid in &pids {
                let group = &lats[pgroup[&pid]];
                // Same decision interval for every group; the first decision
                // is advanced by the delay so arrivals land on the same
                // cadence.
                let first = (pw_ticks.saturating_sub(group.delay)).max(1);
                let mut d = first;
                while d <= 2400 {
                    let mut arrival = d + group.delay;
                    if group.jitter_max > 0 && rng.gen::<f64>() < group.jitter_prob {
                        arrival += 1 + rng.gen_range(0..group.jitter_max);
                    }
                    if arrival > 2400 {
                        break;
                    }
                    schedule.entry(arrival).or_default().push(pid);
                    d += pw_ticks;
                }
            }

            let mut script = HashMap::new();
            let base = 0.05 + (round % 50) as f64 * 0.005;
            let mut tick = 4u32;
            while tick <= 2400 {
                script.insert(tick, (base + tick as f64 / 1400.0).min(1.0));
                tick += 4;
            }

            let res = run_simulation(&SimConfig {
                tier,
                player_ids: pids.clone(),
                vol_script: script,
                pulse_schedule: schedule,
                max_ticks: 2400,
                silent: true,
            });

            for &pid in &pids {
                let gi = pgroup[&pid];
                let st = &res.player_stats[&pid];
                gs[gi].games += 1;
                gs[gi].total_place += st.placement;
                if st.placement <= 3 {
                    gs[gi].top3 += 1;
                }
            }
        }

        let top3_rates: Vec<f64> = gs
            .iter()
            .map(|g| g.top3 as f64 / g.games as f64)
            .collect();
        let best = top3_rates.iter().cloned().fold(f64::MIN, f64::max);
        let worst = top3_rates.iter().cloned().fold(f64::MAX, f64::min);
        let spread = (best - worst) / best * 100.0;
        assert!(
            spread <= 15.0,
            "top-3 rate spread {spread:.1}% exceeds 15% (rates: {top3_rates:?})"
        );

        let avg_places: Vec<f64> = gs
            .iter()
            .map(|g| g.total_place as f64 / g.games as f64)
            .collect();
        let best_p = avg_places.iter().cloned().fold(f64::MAX, f64::min);
        let worst_p = avg_places.iter().cloned().fold(f64::MIN, f64::max);
        let place_spread = (worst_p - best_p) / worst_p * 100.0;
        assert!(
            place_spread <= 15.0,
            "placement spread {place_spread:.1}% exceeds 15% (avg: {avg_places:?})"
        );
    }
}
