//! End-of-round handoff
//!
//! Posts payouts, consolation shards and war-chest contributions for a
//! finished round to the settlement store. Best-effort: every store error
//! is logged and skipped so accounting problems never stall the fleet.

use hashbrown::HashMap;
use tracing::{info, warn};

use crate::economy::store::{SettlementStore, TxType};
use crate::game::scoring::{
    placement_payouts, rake_amount, shards_for_loser, war_chest_contribution,
};
use crate::room::room::{PlayerId, Room};
use crate::room::tier::TierConfig;

/// Immutable snapshot of a finished room, taken under the room lock before
/// the (awaitable) handoff runs.
#[derive(Debug, Clone)]
pub struct RoundSummary {
    pub room_id: String,
    pub tier: TierConfig,
    pub pool: i64,
    pub volatility_mul: f64,
    pub placements: Vec<PlayerId>,
}

impl RoundSummary {
    pub fn from_room(room: &Room) -> Self {
        Self {
            room_id: room.id.clone(),
            tier: room.tier,
            pool: room.pool,
            volatility_mul: room.volatility_mul,
            placements: room.placements(),
        }
    }
}

/// Per-player outcome, returned for the `round_result` broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerRoundResult {
    pub placement: usize,
    pub payout: i64,
    pub shards: i64,
}

pub struct Settlement<S> {
    store: S,
}

impl<S: SettlementStore> Settlement<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Settles a finished round: star payouts to the top places, shards to
    /// everyone else, and the war-chest share for each player with a squad.
    pub fn settle(&self, summary: &RoundSummary) -> HashMap<PlayerId, PlayerRoundResult> {
        let n = summary.placements.len();
        let rake = rake_amount(summary.pool);
        let payouts = placement_payouts(summary.pool, n);
        let top_places = payouts.len();

        let mut results: HashMap<PlayerId, PlayerRoundResult> = HashMap::with_capacity(n);

        for pp in &payouts {
            let Some(&pid) = summary.placements.get(pp.place - 1) else {
                continue;
            };
            if let Err(e) = self.store.update_balance(pid, pp.amount, 0) {
                warn!(player = pid, err = %e, "payout balance update failed");
            }
            if let Err(e) =
                self.store
                    .record_transaction(pid, TxType::Payout, pp.amount, Some(&summary.room_id))
            {
                warn!(player = pid, err = %e, "payout transaction failed");
            }
            results.insert(
                pid,
                PlayerRoundResult {
                    placement: pp.place,
                    payout: pp.amount,
                    shards: 0,
                },
            );
        }

        for (i, &pid) in summary.placements.iter().enumerate() {
            let place = i + 1;
            if place <= top_places {
                continue;
            }
            let shards = shards_for_loser(summary.tier.entry_cost, summary.volatility_mul, place);
            if shards > 0 {
                if let Err(e) = self.store.update_balance(pid, 0, shards) {
                    warn!(player = pid, err = %e, "shard balance update failed");
                }
                if let Err(e) = self.store.record_transaction(
                    pid,
                    TxType::ShardGrant,
                    shards,
                    Some(&summary.room_id),
                ) {
                    warn!(player = pid, err = %e, "shard transaction failed");
                }
            }
            results.insert(pid, PlayerRoundResult { placement: place, payout: 0, shards });
        }

        let war_chest = war_chest_contribution(rake);
        if war_chest > 0 && n > 0 {
            let share = war_chest / n as i64;
            for &pid in &summary.placements {
                let squad = match self.store.get_player(pid) {
                    Ok(Some(profile)) => profile.squad_id,
                    Ok(None) => None,
                    Err(e) => {
                        warn!(player = pid, err = %e, "player lookup failed");
                        None
                    }
                };
                if let Some(squad_id) = squad {
                    if let Err(e) = self.store.add_to_war_chest(&squad_id, share) {
                        warn!(squad = %squad_id, err = %e, "war chest credit failed");
                    }
                }
            }
        }

        info!(
            room = %summary.room_id,
            pool = summary.pool,
            rake,
            players = n,
            "round settled"
        );
        results
    }
}
