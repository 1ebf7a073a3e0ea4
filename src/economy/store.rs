//! Settlement store contract
//!
//! The narrow interface the engine consumes from durable storage. The real
//! player/transaction/squad stores live outside this crate; the in-memory
//! implementation below backs tests and single-node deployments. Every
//! operation may fail — callers log and continue, they never block a round.

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::room::room::PlayerId;

/// Ledger transaction categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Entry,
    Payout,
    ShardGrant,
    Rake,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Entry => "entry",
            TxType::Payout => "payout",
            TxType::ShardGrant => "shard_grant",
            TxType::Rake => "rake",
        }
    }
}

/// What the engine needs to know about a player at settlement time.
#[derive(Debug, Clone, Default)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub username: String,
    pub squad_id: Option<String>,
}

/// External-store operations consumed by the end-of-round handoff.
pub trait SettlementStore: Send + Sync {
    fn update_balance(
        &self,
        player_id: PlayerId,
        stars_delta: i64,
        shards_delta: i64,
    ) -> anyhow::Result<()>;

    fn record_transaction(
        &self,
        player_id: PlayerId,
        tx_type: TxType,
        amount: i64,
        room_id: Option<&str>,
    ) -> anyhow::Result<()>;

    fn add_to_war_chest(&self, squad_id: &str, amount: i64) -> anyhow::Result<()>;

    fn get_player(&self, player_id: PlayerId) -> anyhow::Result<Option<PlayerProfile>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTx {
    pub player_id: PlayerId,
    pub tx_type: TxType,
    pub amount: i64,
    pub room_id: Option<String>,
}

#[derive(Default)]
struct MemoryInner {
    stars: HashMap<PlayerId, i64>,
    shards: HashMap<PlayerId, i64>,
    transactions: Vec<RecordedTx>,
    war_chests: HashMap<String, i64>,
    profiles: HashMap<PlayerId, PlayerProfile>,
}

/// In-memory settlement store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_profile(&self, profile: PlayerProfile) {
        self.inner.lock().profiles.insert(profile.id, profile);
    }

    pub fn stars(&self, player_id: PlayerId) -> i64 {
        self.inner.lock().stars.get(&player_id).copied().unwrap_or(0)
    }

    pub fn shards(&self, player_id: PlayerId) -> i64 {
        self.inner.lock().shards.get(&player_id).copied().unwrap_or(0)
    }

    pub fn war_chest(&self, squad_id: &str) -> i64 {
        self.inner.lock().war_chests.get(squad_id).copied().unwrap_or(0)
    }

    pub fn transactions(&self) -> Vec<RecordedTx> {
        self.inner.lock().transactions.clone()
    }
}

impl SettlementStore for MemoryStore {
    fn update_balance(
        &self,
        player_id: PlayerId,
        stars_delta: i64,
        shards_delta: i64,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        *inner.stars.entry(player_id).or_insert(0) += stars_delta;
        *inner.shards.entry(player_id).or_insert(0) += shards_delta;
        Ok(())
    }

    fn record_transaction(
        &self,
        player_id: PlayerId,
        tx_type: TxType,
        amount: i64,
        room_id: Option<&str>,
    ) -> anyhow::Result<()> {
        self.inner.lock().transactions.push(RecordedTx {
            player_id,
            tx_type,
            amount,
            room_id: room_id.map(str::to_string),
        });
        Ok(())
    }

    fn add_to_war_chest(&self, squad_id: &str, amount: i64) -> anyhow::Result<()> {
        *self
            .inner
            .lock()
            .war_chests
            .entry(squad_id.to_string())
            .or_insert(0) += amount;
        Ok(())
    }

    fn get_player(&self, player_id: PlayerId) -> anyhow::Result<Option<PlayerProfile>> {
        Ok(self.inner.lock().profiles.get(&player_id).cloned())
    }
}
