//! Monte Carlo economy driver
//!
//! Runs a large batch of deterministic rounds over a synthetic player
//! population and prints an economy report: burn velocity, shard inflation,
//! survival lengths, archetype win rates and lifetime risk, with pass/warn
//! diagnosis lines. No flags — the distribution constants below are the
//! experiment definition.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use lastpulse::game::sim::{run_simulation, SimConfig, SIM_TICK_RATE};
use lastpulse::game::scoring::rake_amount;
use lastpulse::room::room::PlayerId;
use lastpulse::room::tier::{TierConfig, TIER_1, TIER_2, TIER_3};

const TOTAL_PLAYERS: usize = 10_000;
const TOTAL_ROUNDS: usize = 50_000;

// Archetype distribution
const PCT_CONSERVATIVE: f64 = 0.35;
const PCT_AGGRESSIVE: f64 = 0.25;
const PCT_WHALE: f64 = 0.15;
// casual = remainder (0.25)

// Tier distribution per round
const PCT_TIER1: f64 = 0.60;
const PCT_TIER2: f64 = 0.30;
// tier3 = remainder

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Archetype {
    Conservative,
    Aggressive,
    Whale,
    Casual,
}

impl Archetype {
    fn as_str(&self) -> &'static str {
        match self {
            Archetype::Conservative => "Conservative",
            Archetype::Aggressive => "Aggressive",
            Archetype::Whale => "Whale",
            Archetype::Casual => "Casual",
        }
    }
}

const ARCHETYPES: [Archetype; 4] = [
    Archetype::Conservative,
    Archetype::Aggressive,
    Archetype::Whale,
    Archetype::Casual,
];

#[derive(Default, Clone)]
struct PlayerTotals {
    burned: i64,
    shards: i64,
    wins: usize,
    places: usize,
    games: usize,
    payouts: i64,
}

#[derive(Clone, Copy)]
struct PStat {
    pid: PlayerId,
    arch: Archetype,
    burned: i64,
    shards: i64,
    ticks: u32,
    won: bool,
    placed: bool,
    payout: i64,
    eff: f64,
}

struct RoundOutcome {
    finish_reason: &'static str,
    pool: i64,
    rake: i64,
    winner_arch: Option<Archetype>,
    pstats: Vec<PStat>,
}

fn main() {
    let start = Instant::now();

    // Assign archetypes by population share, then shuffle so ids carry no
    // archetype signal.
    let mut archetypes: Vec<Archetype> = (0..TOTAL_PLAYERS)
        .map(|i| {
            let r = i as f64 / TOTAL_PLAYERS as f64;
            if r < PCT_CONSERVATIVE {
                Archetype::Conservative
            } else if r < PCT_CONSERVATIVE + PCT_AGGRESSIVE {
                Archetype::Aggressive
            } else if r < PCT_CONSERVATIVE + PCT_AGGRESSIVE + PCT_WHALE {
                Archetype::Whale
            } else {
                Archetype::Casual
            }
        })
        .collect();
    let mut rng = StdRng::seed_from_u64(42);
    archetypes.shuffle(&mut rng);

    let progress = AtomicUsize::new(0);
    let results: Vec<RoundOutcome> = (0..TOTAL_ROUNDS)
        .into_par_iter()
        .map(|round| {
            let mut rng = StdRng::seed_from_u64(round as u64 * 7919 + 1);
            let outcome = run_round(&mut rng, &archetypes);
            let n = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if n % (TOTAL_ROUNDS / 10) == 0 {
                println!(
                    "  ... {n}/{TOTAL_ROUNDS} rounds ({:.0}%)",
                    n as f64 / TOTAL_ROUNDS as f64 * 100.0
                );
            }
            outcome
        })
        .collect();

    print_report(&archetypes, &results, start.elapsed());
}

fn run_round(rng: &mut StdRng, archetypes: &[Archetype]) -> RoundOutcome {
    let tr: f64 = rng.gen();
    let tier: TierConfig = if tr < PCT_TIER1 {
        TIER_1
    } else if tr < PCT_TIER1 + PCT_TIER2 {
        TIER_2
    } else {
        TIER_3
    };

    let room_size = (tier.min_players
        + rng.gen_range(0..=(tier.max_players - tier.min_players)))
    .min(archetypes.len());

    // Distinct player sample for this round
    let mut ids: Vec<PlayerId> = Vec::with_capacity(room_size);
    let mut seen = std::collections::HashSet::with_capacity(room_size);
    while ids.len() < room_size {
        let idx = rng.gen_range(0..archetypes.len());
        if seen.insert(idx) {
            ids.push(idx as PlayerId + 1);
        }
    }

    let vol_script = gen_vol_script(rng, tier, 2400);

    let pulse_window_ticks =
        (tier.pulse_window.as_millis() / SIM_TICK_RATE.as_millis()) as u32;
    let mut pulse_schedule: HashMap<u32, Vec<PlayerId>> = HashMap::new();
    for &pid in &ids {
        let arch = archetypes[(pid - 1) as usize];
        gen_player_pulses(rng, pid, arch, pulse_window_ticks, 2400, &mut pulse_schedule);
    }

    let result = run_simulation(&SimConfig {
        tier,
        player_ids: ids.clone(),
        vol_script,
        pulse_schedule,
        max_ticks: 2400,
        silent: true,
    });

    let pool = room_size as i64 * tier.entry_cost;
    let rake = rake_amount(pool);

    let mut pstats = Vec::with_capacity(room_size);
    let mut winner_arch = None;

    for &pid in &ids {
        let st = &result.player_stats[&pid];
        let surv_ticks = if st.eliminated_at > 0 {
            st.eliminated_at
        } else {
            result.total_ticks
        };
        let won = result.winner_id == Some(pid);
        let arch = archetypes[(pid - 1) as usize];
        if won {
            winner_arch = Some(arch);
        }
        pstats.push(PStat {
            pid,
            arch,
            burned: tier.entry_cost,
            shards: st.shards_earned,
            ticks: surv_ticks,
            won,
            placed: st.placement > 0 && st.placement <= 3,
            payout: st.payout,
            eff: st.efficiency,
        });
    }

    RoundOutcome {
        finish_reason: result.finish_reason.as_str(),
        pool,
        rake,
        winner_arch,
        pstats,
    }
}

fn gen_vol_script(rng: &mut StdRng, tier: TierConfig, max_ticks: u32) -> HashMap<u32, f64> {
    let mut script = HashMap::new();
    let mut ratio = 0.1 + rng.gen::<f64>() * 0.2;
    let survival_ticks =
        (tier.survival_time.as_millis() / SIM_TICK_RATE.as_millis()) as f64;

    for tick in 1..=max_ticks {
        let progress = tick as f64 / survival_ticks;
        let noise: f64 = rng.sample::<f64, _>(rand_distr::StandardNormal) * 0.02;
        let target = 0.3 + 0.7 * progress.min(1.5).powf(1.5);
        let reversion = (target - ratio) * 0.05;
        let spike = if rng.gen::<f64>() < 0.03 {
            (rng.gen::<f64>() - 0.3) * 0.15
        } else {
            0.0
        };
        ratio = (ratio + 0.005 + noise + reversion + spike).clamp(0.01, 1.0);

        if tick % 4 == 0 {
            script.insert(tick, ratio);
        }
        if ratio >= 1.0 {
            script.insert(tick, 1.0);
            break;
        }
    }
    script
}

fn gen_player_pulses(
    rng: &mut StdRng,
    pid: PlayerId,
    arch: Archetype,
    pw_ticks: u32,
    max_ticks: u32,
    schedule: &mut HashMap<u32, Vec<PlayerId>>,
) {
    match arch {
        Archetype::Conservative => {
            let mut tick = 1 + rng.gen_range(0..3);
            while tick <= max_ticks {
                schedule.entry(tick).or_default().push(pid);
                tick += 3;
            }
        }
        Archetype::Aggressive => {
            // Rides the window edge with a little wobble
            let interval = pw_ticks.saturating_sub(2).max(3);
            let mut tick = 1u32;
            while tick <= max_ticks {
                schedule.entry(tick).or_default().push(pid);
                // interval plus a -1..=+1 wobble
                tick += interval + rng.gen_range(0..3) - 1;
            }
        }
        Archetype::Whale => {
            let mut tick = 1;
            while tick <= max_ticks {
                schedule.entry(tick).or_default().push(pid);
                tick += 2;
            }
        }
        Archetype::Casual => {
            let interval = 6 + rng.gen_range(0..5);
            let mut tick = 1 + rng.gen_range(0..5);
            while tick <= max_ticks {
                if rng.gen::<f64>() >= 0.25 {
                    schedule.entry(tick).or_default().push(pid);
                }
                tick += interval;
            }
        }
    }
}

fn print_report(archetypes: &[Archetype], results: &[RoundOutcome], elapsed: Duration) {
    let mut all_burns = Vec::new();
    let mut all_shards = Vec::new();
    let mut all_ticks = Vec::new();
    let mut all_eff = Vec::new();
    let mut all_payouts = Vec::new();
    let mut total_pool = 0i64;
    let mut total_rake = 0i64;
    let mut wins_by_arch: HashMap<Archetype, usize> = HashMap::new();
    let mut places_by_arch: HashMap<Archetype, usize> = HashMap::new();
    let mut games_by_arch: HashMap<Archetype, usize> = HashMap::new();
    let mut finish_reasons: HashMap<&'static str, usize> = HashMap::new();
    let mut totals: HashMap<PlayerId, PlayerTotals> = HashMap::new();
    let mut total_sessions = 0usize;
    let mut total_placed = 0usize;

    for r in results {
        total_pool += r.pool;
        total_rake += r.rake;
        *finish_reasons.entry(r.finish_reason).or_default() += 1;
        if let Some(arch) = r.winner_arch {
            *wins_by_arch.entry(arch).or_default() += 1;
        }
        for ps in &r.pstats {
            all_burns.push(ps.burned as f64);
            all_shards.push(ps.shards as f64);
            all_ticks.push(ps.ticks as f64);
            all_payouts.push(ps.payout as f64);
            if ps.eff > 0.0 {
                all_eff.push(ps.eff);
            }
            *games_by_arch.entry(ps.arch).or_default() += 1;
            total_sessions += 1;
            if ps.placed {
                *places_by_arch.entry(ps.arch).or_default() += 1;
                total_placed += 1;
            }

            let t = totals.entry(ps.pid).or_default();
            t.burned += ps.burned;
            t.shards += ps.shards;
            t.payouts += ps.payout;
            t.games += 1;
            if ps.won {
                t.wins += 1;
            }
            if ps.placed {
                t.places += 1;
            }
        }
    }

    for v in [&mut all_burns, &mut all_shards, &mut all_ticks, &mut all_eff, &mut all_payouts] {
        v.sort_by(f64::total_cmp);
    }

    let total_burned: f64 = all_burns.iter().sum();
    let total_shards_gen: f64 = all_shards.iter().sum();
    let total_payouts_sum: f64 = all_payouts.iter().sum();

    let mut net_results = Vec::new();
    let mut games_before_win = Vec::new();
    let mut games_before_place = Vec::new();
    let mut positive_count = 0usize;
    for t in totals.values() {
        if t.games == 0 {
            continue;
        }
        let net = (t.payouts - t.burned) as f64;
        net_results.push(net);
        if net > 0.0 {
            positive_count += 1;
        }
        if t.wins > 0 {
            games_before_win.push(t.games as f64 / t.wins as f64);
        }
        if t.places > 0 {
            games_before_place.push(t.games as f64 / t.places as f64);
        }
    }
    net_results.sort_by(f64::total_cmp);
    games_before_win.sort_by(f64::total_cmp);
    games_before_place.sort_by(f64::total_cmp);

    let tick_to_sec = |t: f64| t * 0.25;
    let total_wins: usize = wins_by_arch.values().sum();
    let active_players = net_results.len();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              MONTE CARLO SIMULATION REPORT                   ║");
    println!("║                  (v2 — Top-3 Payouts)                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "  Players: {TOTAL_PLAYERS}  |  Rounds: {TOTAL_ROUNDS}  |  Sessions: {total_sessions}"
    );
    println!(
        "  Tiers: T1({:.0}%) T2({:.0}%) T3({:.0}%)",
        PCT_TIER1 * 100.0,
        PCT_TIER2 * 100.0,
        (1.0 - PCT_TIER1 - PCT_TIER2) * 100.0
    );
    println!(
        "  Archetypes: Conservative({:.0}%) Aggressive({:.0}%) Whale({:.0}%) Casual({:.0}%)",
        PCT_CONSERVATIVE * 100.0,
        PCT_AGGRESSIVE * 100.0,
        PCT_WHALE * 100.0,
        (1.0 - PCT_CONSERVATIVE - PCT_AGGRESSIVE - PCT_WHALE) * 100.0
    );
    println!("  Rake: 12%  |  Payouts: Top-3 (60/25/15)  |  Pulses: Free");
    println!(
        "  Elapsed: {:.1}s  |  Workers: {}",
        elapsed.as_secs_f64(),
        rayon::current_num_threads()
    );

    println!();
    println!("─── BURN ECONOMICS ────────────────────────────────────────────");
    println!("  Mean Stars burned/session:     {:8.1}  (entry fee only)", mean(&all_burns));
    println!("  Median Stars burned/session:   {:8.1}", percentile(&all_burns, 50.0));
    println!("  90th pctl burned:              {:8.1}", percentile(&all_burns, 90.0));
    println!("  Total Stars burned:          {total_burned:10.0}");
    println!("  Total pool collected:        {total_pool:10}");
    println!("  Total rake (house):          {total_rake:10}");
    println!("  Total payouts (top 3):       {total_payouts_sum:10.0}");
    println!(
        "  Effective house take:          {:7.2}%",
        total_rake as f64 / total_burned * 100.0
    );

    println!();
    println!("─── SHARD ECONOMICS ───────────────────────────────────────────");
    println!("  Mean Shards earned/session:    {:8.1}", mean(&all_shards));
    println!("  Median Shards earned:          {:8.1}", percentile(&all_shards, 50.0));
    println!("  90th pctl Shards:              {:8.1}", percentile(&all_shards, 90.0));
    println!("  Total Shards generated:      {total_shards_gen:10.0}");
    if total_burned > 0.0 {
        println!(
            "  Shard inflation rate:          {:8.4} shards/star",
            total_shards_gen / total_burned
        );
    }

    println!();
    println!("─── SURVIVAL ──────────────────────────────────────────────────");
    println!("  Mean session length:           {:7.1}s", tick_to_sec(mean(&all_ticks)));
    println!("  Median session length:         {:7.1}s", tick_to_sec(percentile(&all_ticks, 50.0)));
    println!("  90th pctl session length:      {:7.1}s", tick_to_sec(percentile(&all_ticks, 90.0)));
    println!("  10th pctl session length:      {:7.1}s", tick_to_sec(percentile(&all_ticks, 10.0)));

    println!();
    println!("─── FINISH REASONS ────────────────────────────────────────────");
    let mut reasons: Vec<_> = finish_reasons.iter().collect();
    reasons.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
    for (reason, count) in reasons {
        println!(
            "  {reason:<20} {count:8}  ({:5.1}%)",
            *count as f64 / TOTAL_ROUNDS as f64 * 100.0
        );
    }

    println!();
    println!("─── WIN & PLACEMENT RATES BY ARCHETYPE ────────────────────────");
    for arch in ARCHETYPES {
        let wins = wins_by_arch.get(&arch).copied().unwrap_or(0);
        let places = places_by_arch.get(&arch).copied().unwrap_or(0);
        let games = games_by_arch.get(&arch).copied().unwrap_or(0);
        let (win_pct, place_pct) = if games > 0 {
            (
                wins as f64 / games as f64 * 100.0,
                places as f64 / games as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };
        println!(
            "  {:<15}  wins: {wins:5} ({win_pct:4.1}%)  top3: {places:6} ({place_pct:5.1}%)  games: {games:7}",
            arch.as_str()
        );
    }
    println!(
        "  {:<15}  wins: {total_wins:5}          top3: {total_placed:6}           sessions: {total_sessions}",
        "TOTAL"
    );

    println!();
    println!("─── EFFICIENCY DISTRIBUTION ───────────────────────────────────");
    if !all_eff.is_empty() {
        println!("  Mean efficiency:               {:8.2}", mean(&all_eff));
        println!("  Median efficiency:             {:8.2}", percentile(&all_eff, 50.0));
        println!("  90th pctl efficiency:          {:8.2}", percentile(&all_eff, 90.0));
        println!("  99th pctl efficiency:          {:8.2}", percentile(&all_eff, 99.0));
        println!("  Max efficiency:                {:8.2}", all_eff[all_eff.len() - 1]);
    }

    println!();
    println!("─── PLAYER LIFETIME RISK ──────────────────────────────────────");
    println!("  Active players (played >=1):   {active_players:8} / {TOTAL_PLAYERS}");
    println!(
        "  Net positive players:          {positive_count:8}  ({:5.1}%)",
        positive_count as f64 / active_players.max(1) as f64 * 100.0
    );
    println!("  Mean net P&L per player:       {:8.1} stars", mean(&net_results));
    println!("  Median net P&L:                {:8.1} stars", percentile(&net_results, 50.0));
    println!("  10th pctl (worst):             {:8.1} stars", percentile(&net_results, 10.0));
    println!("  90th pctl (best):              {:8.1} stars", percentile(&net_results, 90.0));
    if !games_before_win.is_empty() {
        println!("  Avg games per 1st place:       {:8.1}", mean(&games_before_win));
        println!("  Median games per 1st:          {:8.1}", percentile(&games_before_win, 50.0));
    }
    if !games_before_place.is_empty() {
        println!("  Avg games per top-3:           {:8.1}", mean(&games_before_place));
        println!("  Median games per top-3:        {:8.1}", percentile(&games_before_place, 50.0));
    }

    println!();
    println!("─── REINFORCEMENT FREQUENCY ───────────────────────────────────");
    if total_sessions > 0 {
        let win_freq = total_wins as f64 / total_sessions as f64 * 100.0;
        let place_freq = total_placed as f64 / total_sessions as f64 * 100.0;
        println!("  Win frequency (1st):           {win_freq:7.2}% per session");
        println!("  Placement frequency (top 3):   {place_freq:7.2}% per session");
        println!(
            "  Micro-win frequency (top 5):   {:7.2}% (4th/5th get 2x/1.5x shards)",
            place_freq * 5.0 / 3.0
        );
    }

    println!();
    println!("─── DIAGNOSIS ─────────────────────────────────────────────────");
    let avg_burn = mean(&all_burns);
    let avg_survival = tick_to_sec(mean(&all_ticks));
    let house_rate = total_rake as f64 / total_burned * 100.0;
    let shard_rate = if total_burned > 0.0 {
        total_shards_gen / total_burned
    } else {
        0.0
    };
    let net_pct = positive_count as f64 / active_players.max(1) as f64 * 100.0;
    let win_freq = total_wins as f64 / total_sessions.max(1) as f64 * 100.0;
    let place_freq = total_placed as f64 / total_sessions.max(1) as f64 * 100.0;

    if avg_survival < 15.0 {
        println!("  !! AVG SURVIVAL < 15s — HIGH CHURN RISK — players die too fast");
    } else if avg_survival < 30.0 {
        println!("  ~~ AVG SURVIVAL 15-30s — moderate — watch for casual dropout");
    } else {
        println!("  OK AVG SURVIVAL > 30s — healthy session length");
    }

    if avg_burn > 80.0 {
        println!("  !! AVG BURN > 80 — burn velocity too high, LTV at risk");
    } else if avg_burn < 5.0 {
        println!("  !! AVG BURN < 5 — burn velocity extremely low");
    } else {
        println!("  OK AVG BURN {avg_burn:.1} — within target range (entry-fee-only model)");
    }

    if house_rate < 7.0 {
        println!("  !! HOUSE TAKE < 7% — margins too thin");
    } else if house_rate > 15.0 {
        println!("  !! HOUSE TAKE > 15% — predatory — players will leave");
    } else {
        println!("  OK HOUSE TAKE {house_rate:.1}% — within 7-12% target");
    }

    if shard_rate > 0.8 {
        println!("  !! SHARD INFLATION > 0.8 — cosmetic economy will hyperinflate");
    } else if shard_rate < 0.1 {
        println!("  !! SHARD RATE < 0.1 — shards too scarce, players feel unrewarded");
    } else {
        println!("  OK SHARD RATE {shard_rate:.3} — balanced");
    }

    if (1.0..=3.0).contains(&win_freq) {
        println!("  OK WIN FREQ {win_freq:.2}% — within 1-3% target");
    } else if win_freq < 1.0 {
        println!("  !! WIN FREQ {win_freq:.2}% — below 1%, players feel hopeless");
    } else {
        println!("  ~~ WIN FREQ {win_freq:.2}% — above 3%, monitor pool sustainability");
    }

    if place_freq >= 5.0 {
        println!("  OK PLACEMENT FREQ {place_freq:.2}% — healthy reinforcement via top-3");
    } else {
        println!("  ~~ PLACEMENT FREQ {place_freq:.2}% — consider smaller rooms for more placements");
    }

    if net_pct > 40.0 {
        println!("  !! NET POSITIVE > 40% — house is losing money");
    } else if net_pct < 5.0 {
        println!("  !! NET POSITIVE < 5% — almost nobody wins, churn imminent");
    } else {
        println!("  OK NET POSITIVE {net_pct:.1}% — healthy winner pool");
    }

    println!();
}

fn mean(s: &[f64]) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    s.iter().sum::<f64>() / s.len() as f64
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * pct / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}
