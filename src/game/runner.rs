//! Live round runner and engine supervisor
//!
//! The engine owns the fleet: it keeps a baseline of waiting system rooms,
//! routes client messages, and runs one owner task per live round. The
//! runner task drives a room through active → survival → finished from
//! wall-clock ticks, pulse messages and a volatility feed, applying the
//! same per-tick order as the deterministic simulator.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::economy::settlement::RoundSummary;
use crate::game::anticheat::PulseRateLimiter;
use crate::game::scoring::{pulse_extension, tick_decrement, volatility_multiplier};
use crate::game::LATENCY_GRACE_TICKS;
use crate::net::hub::Hub;
use crate::net::protocol::{
    ClientMessage, RoomInfo, RoomStatePayload, ServerMessage, TickPayload,
};
use crate::room::manager::{Manager, SharedRoom};
use crate::room::room::{PlayerId, RoomState, RoomType};
use crate::volatility::live::LiveFeed;
use crate::volatility::synthetic::SyntheticFeed;
use crate::volatility::Feed;

pub const TICK_RATE: Duration = Duration::from_millis(250);

/// Armed-but-not-lethal interval between `active` and `survival`.
pub const RAMP_DURATION: Duration = Duration::from_secs(5);

/// How long a finished room stays visible before removal.
pub const POST_ROUND_DISPLAY: Duration = Duration::from_secs(30);

/// Pulse channel capacity per running room.
pub const PULSE_BUFFER: usize = 256;

/// Deadline for the end-of-round handoff.
pub const END_CALLBACK_DEADLINE: Duration = Duration::from_secs(5);

/// Rooms the system keeps available at all times.
pub const SYSTEM_SLOTS: [(RoomType, u8); 3] = [
    (RoomType::Blitz, 1),
    (RoomType::Blitz, 2),
    (RoomType::Alpha, 3),
];

#[derive(Debug, Clone)]
pub struct PulseEvent {
    pub player_id: PlayerId,
}

/// Invoked with a snapshot of every finished round; runs under a deadline
/// and must never assume the round still exists afterwards.
pub type EndCallback = Arc<dyn Fn(RoundSummary) -> BoxFuture<'static, ()> + Send + Sync>;

/// Builds the volatility feed for a starting round.
pub type FeedFactory = Box<dyn Fn(RoomType, Duration) -> Box<dyn Feed> + Send + Sync>;

/// Oracle position parameters for Alpha rooms.
#[derive(Debug, Clone, Default)]
pub struct OracleConfig {
    pub url: String,
    pub position_id: String,
    pub liquid_price: f64,
    pub entry_price: f64,
    pub is_long: bool,
}

struct RoomRunner {
    pulses: mpsc::Sender<PulseEvent>,
}

/// Orchestrates all active game rooms.
pub struct Engine {
    rooms: Arc<Manager>,
    hub: Arc<Hub>,
    on_end: EndCallback,
    running: Mutex<HashMap<String, RoomRunner>>,
    pulse_limiter: PulseRateLimiter,
    feed_factory: FeedFactory,
    shutdown_tx: watch::Sender<bool>,
    /// Product override for the tier-1 survival time (120 s default).
    tier1_survival: Option<Duration>,
}

impl Engine {
    pub fn new(
        rooms: Arc<Manager>,
        hub: Arc<Hub>,
        on_end: EndCallback,
        oracle: Option<OracleConfig>,
        tier1_survival: Option<Duration>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let feed_factory: FeedFactory =
            Box::new(move |room_type, survival_time| -> Box<dyn Feed> {
                match room_type {
                    RoomType::Alpha => {
                        let o = oracle.clone().unwrap_or_default();
                        Box::new(LiveFeed::new(
                            o.url,
                            o.position_id,
                            o.liquid_price,
                            o.entry_price,
                            o.is_long,
                        ))
                    }
                    RoomType::Blitz => Box::new(SyntheticFeed::new(survival_time)),
                }
            });
        Arc::new(Self {
            rooms,
            hub,
            on_end,
            running: Mutex::new(HashMap::new()),
            pulse_limiter: PulseRateLimiter::default(),
            feed_factory,
            shutdown_tx,
            tier1_survival,
        })
    }

    /// Like `new`, but with an explicit feed factory — scripted feeds in
    /// tests and demos.
    pub fn with_feed_factory(
        rooms: Arc<Manager>,
        hub: Arc<Hub>,
        on_end: EndCallback,
        feed_factory: FeedFactory,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            rooms,
            hub,
            on_end,
            running: Mutex::new(HashMap::new()),
            pulse_limiter: PulseRateLimiter::default(),
            feed_factory,
            shutdown_tx,
            tier1_survival: None,
        })
    }

    /// Signals every runner to unwind: feeds first, then tick loops.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Guarantees at least one waiting room per system slot.
    pub fn ensure_rooms(&self) {
        let waiting = self.rooms.list_by_state(RoomState::Waiting);
        for (room_type, tier) in SYSTEM_SLOTS {
            let found = waiting.iter().any(|r| {
                let r = r.read();
                r.room_type == room_type && r.tier.tier == tier
            });
            if found {
                continue;
            }
            match self.rooms.create(room_type, tier) {
                Ok(room) => {
                    if tier == 1 {
                        if let Some(survival) = self.tier1_survival {
                            let mut r = room.write();
                            r.tier.survival_time = survival;
                            r.global_timer = survival;
                        }
                    }
                    let r = room.read();
                    info!(
                        room = %r.id,
                        room_type = r.room_type.as_str(),
                        tier = r.tier.tier,
                        "system room created"
                    );
                }
                Err(e) => warn!(err = %e, "system room creation failed"),
            }
        }
    }

    /// Routes a pulse through the rate limiter into the room's runner.
    /// Rejected and overflowing pulses are dropped.
    pub fn submit_pulse(&self, player_id: PlayerId, room_id: &str) {
        if !self.pulse_limiter.allow_pulse(player_id) {
            return;
        }
        let sender = {
            let running = self.running.lock();
            running.get(room_id).map(|rr| rr.pulses.clone())
        };
        let Some(sender) = sender else { return };
        if sender.try_send(PulseEvent { player_id }).is_err() {
            warn!(room = room_id, player = player_id, "pulse dropped, buffer full");
        }
    }

    /// Starts the round for a startable room and spawns its owner task.
    pub fn start_room(self: &Arc<Self>, room_id: &str) {
        let Some(room) = self.rooms.get(room_id) else { return };
        if !room.read().can_start() {
            return;
        }

        let (pulse_tx, pulse_rx) = mpsc::channel(PULSE_BUFFER);
        {
            let mut running = self.running.lock();
            if running.contains_key(room_id) {
                return;
            }
            running.insert(room_id.to_string(), RoomRunner { pulses: pulse_tx });
        }

        {
            let mut r = room.write();
            r.state = RoomState::Active;
            r.started_at = Some(Instant::now());
        }
        self.broadcast_state(&room);

        let engine = self.clone();
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            engine.run_loop(room, pulse_rx, shutdown).await;
        });
    }

    async fn run_loop(
        self: Arc<Self>,
        room: SharedRoom,
        mut pulses: mpsc::Receiver<PulseEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (room_id, room_type, tier) = {
            let r = room.read();
            (r.id.clone(), r.room_type, r.tier)
        };

        // The runner owns the feed stop signal; every exit path below either
        // signals it or drops it, which the feeds treat the same way.
        let (feed_stop_tx, feed_stop_rx) = watch::channel(false);
        let feed = (self.feed_factory)(room_type, tier.survival_time);
        let mut vol_rx = feed.start(feed_stop_rx);

        // Ramp: the loop is armed but survival rules are not live yet
        tokio::select! {
            _ = tokio::time::sleep(RAMP_DURATION) => {}
            _ = shutdown.changed() => {
                let _ = feed_stop_tx.send(true);
                self.running.lock().remove(&room_id);
                return;
            }
        }

        {
            let mut r = room.write();
            r.state = RoomState::Survival;
            // The first pulse window starts at survival start
            let survival_start = Instant::now();
            for p in r.players.values_mut() {
                if p.alive {
                    p.last_pulse_at = survival_start;
                }
            }
        }
        self.broadcast_state(&room);

        // First tick lands one full interval after survival starts
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + TICK_RATE, TICK_RATE);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let grace = TICK_RATE * LATENCY_GRACE_TICKS;
        let mut tick_count: u64 = 0;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                update = vol_rx.recv() => {
                    let Some(u) = update else {
                        // Feed ended on its own — the position is gone
                        self.finish_room(&room).await;
                        break;
                    };
                    let liquidated = {
                        let mut r = room.write();
                        r.margin_ratio = u.margin_ratio;
                        r.volatility_mul = volatility_multiplier(u.margin_ratio);
                        u.margin_ratio >= 1.0
                    };
                    if liquidated {
                        self.finish_room(&room).await;
                        break;
                    }
                }

                pulse = pulses.recv() => {
                    let Some(pulse) = pulse else { continue };
                    let ack = {
                        let mut r = room.write();
                        if r.state != RoomState::Survival {
                            None
                        } else if r.record_pulse(pulse.player_id).is_some() {
                            let ext = pulse_extension(r.tier.base_extension, r.alive_count());
                            r.global_timer += ext;
                            Some((ext, r.global_timer))
                        } else {
                            None
                        }
                    };
                    if let Some((ext, timer)) = ack {
                        self.hub.broadcast_room(&room_id, &ServerMessage::PulseAck {
                            player_id: pulse.player_id,
                            extension_ms: ext.as_millis() as u64,
                            timer_ms: timer.as_millis() as u64,
                            server_time_ms: unix_millis(),
                        });
                    }
                }

                _ = ticker.tick() => {
                    tick_count += 1;
                    let mut eliminations = Vec::new();
                    let finished = {
                        let mut r = room.write();
                        let dec = tick_decrement(TICK_RATE, r.margin_ratio);
                        r.global_timer = r.global_timer.saturating_sub(dec);

                        let now = Instant::now();
                        let window = r.tier.pulse_window + grace;
                        let expired: Vec<PlayerId> = r
                            .players
                            .values()
                            .filter(|p| p.alive && now.duration_since(p.last_pulse_at) > window)
                            .map(|p| p.id)
                            .collect();
                        for id in expired {
                            r.eliminate(id);
                            eliminations.push((id, r.alive_count()));
                        }

                        r.alive_count() <= 1 || r.global_timer.is_zero()
                    };

                    for (player_id, alive) in eliminations {
                        self.hub.broadcast_room(&room_id, &ServerMessage::Elimination {
                            player_id,
                            alive,
                        });
                    }

                    if finished {
                        self.finish_room(&room).await;
                        break;
                    }

                    // Compact update every 4th tick (~1 s) to save bandwidth
                    if tick_count % 4 == 0 {
                        let payload = TickPayload::from_room(&room.read());
                        self.hub.broadcast_room(&room_id, &ServerMessage::Tick(payload));
                    }
                }
            }
        }

        let _ = feed_stop_tx.send(true);
        self.running.lock().remove(&room_id);
    }

    async fn finish_room(self: &Arc<Self>, room: &SharedRoom) {
        let summary = {
            let mut r = room.write();
            r.state = RoomState::Finished;
            r.ended_at = Some(Instant::now());
            let summary = RoundSummary::from_room(&r);
            r.winner_id = summary.placements.first().copied();
            summary
        };
        self.broadcast_state(room);

        let room_id = summary.room_id.clone();
        if tokio::time::timeout(END_CALLBACK_DEADLINE, (self.on_end)(summary))
            .await
            .is_err()
        {
            warn!(room = %room_id, "end-of-round callback exceeded deadline");
        }

        // Leave the results on screen, then recycle the slot
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(POST_ROUND_DISPLAY).await;
            engine.rooms.remove(&room_id);
            engine.ensure_rooms();
        });
    }

    /// Handles one inbound client message from the hub.
    pub fn handle_message(self: &Arc<Self>, client_id: PlayerId, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom { room_id } => {
                let Some(room) = self.rooms.get(&room_id) else { return };
                let joined = room.write().add_player(client_id, "");
                if !joined {
                    return;
                }
                self.hub.join_room(client_id, &room_id);
                self.broadcast_state(&room);
                if room.read().can_start() {
                    self.start_room(&room_id);
                    self.ensure_rooms();
                }
            }

            ClientMessage::Pulse => {
                let Some(room_id) = self.hub.client_room(client_id) else { return };
                self.submit_pulse(client_id, &room_id);
            }

            ClientMessage::ListRooms => {
                let mut list = Vec::new();
                for state in [RoomState::Waiting, RoomState::Active, RoomState::Survival] {
                    for room in self.rooms.list_by_state(state) {
                        list.push(RoomInfo::from_room(&room.read()));
                    }
                }
                self.hub.send_to(client_id, ServerMessage::RoomList(list));
            }
        }
    }

    /// Runs the reconnect policy when a known player connects. A player
    /// whose pulse window lapsed while offline is eliminated on the spot.
    pub fn handle_connect(self: &Arc<Self>, client_id: PlayerId) {
        for state in [RoomState::Waiting, RoomState::Active, RoomState::Survival] {
            for room in self.rooms.list_by_state(state) {
                let (restore, eliminate, room_id) = {
                    let r = room.read();
                    if !r.players.contains_key(&client_id) {
                        continue;
                    }
                    let (restore, eliminate) = r.reconnect_check(client_id);
                    (restore, eliminate, r.id.clone())
                };
                if restore {
                    room.write().clear_disconnected(client_id);
                    self.hub.join_room(client_id, &room_id);
                    let payload = RoomStatePayload::from_room(&room.read());
                    self.hub.send_to(client_id, ServerMessage::RoomState(payload));
                } else if eliminate {
                    let alive = {
                        let mut r = room.write();
                        r.eliminate(client_id);
                        r.alive_count()
                    };
                    self.hub.broadcast_room(
                        &room_id,
                        &ServerMessage::Elimination { player_id: client_id, alive },
                    );
                }
                return;
            }
        }
    }

    /// Marks the player disconnected in their room; the pulse window keeps
    /// running while they are away.
    pub fn handle_disconnect(&self, client_id: PlayerId, room_id: Option<String>) {
        self.pulse_limiter.reset(client_id);
        let Some(room_id) = room_id else { return };
        if let Some(room) = self.rooms.get(&room_id) {
            room.write().mark_disconnected(client_id);
        }
    }

    fn broadcast_state(&self, room: &SharedRoom) {
        let (room_id, payload) = {
            let r = room.read();
            (r.id.clone(), RoomStatePayload::from_room(&r))
        };
        self.hub
            .broadcast_room(&room_id, &ServerMessage::RoomState(payload));
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volatility::scripted::ScriptedFeed;

    fn scripted_engine(
        script: Vec<f64>,
    ) -> (
        Arc<Engine>,
        Arc<Manager>,
        Arc<Hub>,
        mpsc::UnboundedReceiver<RoundSummary>,
    ) {
        let rooms = Arc::new(Manager::new());
        let hub = Arc::new(Hub::new());
        let (end_tx, end_rx) = mpsc::unbounded_channel();
        let on_end: EndCallback = Arc::new(move |summary| -> BoxFuture<'static, ()> {
            let end_tx = end_tx.clone();
            Box::pin(async move {
                let _ = end_tx.send(summary);
            })
        });
        let factory: FeedFactory = Box::new(move |_, _| -> Box<dyn Feed> {
            Box::new(ScriptedFeed::new(script.clone()))
        });
        let engine = Engine::with_feed_factory(rooms.clone(), hub.clone(), on_end, factory);
        (engine, rooms, hub, end_rx)
    }

    fn seed_room(rooms: &Manager, players: &[PlayerId]) -> (SharedRoom, String) {
        let room = rooms.create(RoomType::Blitz, 1).unwrap();
        {
            let mut r = room.write();
            for &pid in players {
                assert!(r.add_player(pid, "p"));
            }
        }
        let id = room.read().id.clone();
        (room, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_liquidation_finishes_round() {
        let (engine, rooms, _hub, mut end_rx) = scripted_engine(vec![0.2, 0.5, 1.0]);
        let (room, room_id) = seed_room(&rooms, &[1, 2, 3]);

        engine.start_room(&room_id);
        assert_eq!(room.read().state, RoomState::Active);

        let summary = end_rx.recv().await.expect("round should settle");
        assert_eq!(summary.room_id, room_id);
        assert_eq!(summary.placements.len(), 3);
        assert_eq!(summary.pool, 15);

        let r = room.read();
        assert_eq!(r.state, RoomState::Finished);
        assert_eq!(r.winner_id, Some(summary.placements[0]));
        assert!((r.margin_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_zero_finishes_round() {
        // Constant high margin, no pulses: the timer drains to zero long
        // before the script runs out.
        let (engine, rooms, _hub, mut end_rx) = scripted_engine(vec![0.95; 4000]);
        let (room, room_id) = seed_room(&rooms, &[1, 2, 3]);

        engine.start_room(&room_id);
        let _summary = end_rx.recv().await.expect("round should settle");

        let r = room.read();
        assert_eq!(r.state, RoomState::Finished);
        assert!(r.global_timer.is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_unwinds_runner() {
        let (engine, rooms, _hub, mut end_rx) = scripted_engine(vec![0.1; 4000]);
        let (room, room_id) = seed_room(&rooms, &[1, 2, 3]);

        engine.start_room(&room_id);
        assert_eq!(engine.running_count(), 1);

        engine.shutdown();
        // Give the runner a chance to observe the signal
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(engine.running_count(), 0);
        assert!(end_rx.try_recv().is_err(), "cancelled rounds do not settle");
        assert_ne!(room.read().state, RoomState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_rooms_fills_system_slots() {
        let (engine, rooms, _hub, _end_rx) = scripted_engine(vec![0.1]);

        engine.ensure_rooms();
        assert_eq!(rooms.count(), SYSTEM_SLOTS.len());

        // Idempotent while the slots are still waiting
        engine.ensure_rooms();
        assert_eq!(rooms.count(), SYSTEM_SLOTS.len());

        // A slot leaving Waiting is refilled on the next scan
        let waiting = rooms.list_by_state(RoomState::Waiting);
        waiting[0].write().state = RoomState::Survival;
        engine.ensure_rooms();
        assert_eq!(rooms.count(), SYSTEM_SLOTS.len() + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_message_starts_round_at_min_players() {
        let (engine, rooms, hub, mut end_rx) = scripted_engine(vec![0.2, 0.5, 1.0]);
        let (room, room_id) = {
            let room = rooms.create(RoomType::Blitz, 1).unwrap();
            let id = room.read().id.clone();
            (room, id)
        };

        let mut receivers = Vec::new();
        for pid in 1..=3i64 {
            let (rx, _) = hub.register(pid);
            receivers.push(rx);
            engine.handle_message(pid, ClientMessage::JoinRoom { room_id: room_id.clone() });
        }

        assert_eq!(room.read().player_count(), 3);
        assert_ne!(room.read().state, RoomState::Waiting);

        // The round runs to liquidation and settles
        let summary = end_rx.recv().await.expect("round should settle");
        assert_eq!(summary.placements.len(), 3);

        // Every member saw at least the final room_state broadcast
        for rx in receivers.iter_mut() {
            let mut saw_finished = false;
            while let Ok(msg) = rx.try_recv() {
                if let ServerMessage::RoomState(p) = msg {
                    if p.state == RoomState::Finished {
                        saw_finished = true;
                    }
                }
            }
            assert!(saw_finished);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_rooms_snapshot() {
        let (engine, rooms, hub, _end_rx) = scripted_engine(vec![0.1]);
        engine.ensure_rooms();
        let finished = rooms.create(RoomType::Blitz, 1).unwrap();
        finished.write().state = RoomState::Finished;

        let (mut rx, _) = hub.register(9);
        engine.handle_message(9, ClientMessage::ListRooms);

        let msg = rx.recv().await.unwrap();
        let ServerMessage::RoomList(list) = msg else {
            panic!("expected room_list, got {msg:?}");
        };
        // Finished rooms are not listed
        assert_eq!(list.len(), SYSTEM_SLOTS.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_start_ignored() {
        let (engine, rooms, _hub, _end_rx) = scripted_engine(vec![0.1; 4000]);
        let (_room, room_id) = seed_room(&rooms, &[1, 2, 3]);

        engine.start_room(&room_id);
        engine.start_room(&room_id);
        assert_eq!(engine.running_count(), 1);
    }
}
