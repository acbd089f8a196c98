//! Rooms and the Room Manager
//!
//! A room pairs one [`RaceState`] with the outbound channels of its
//! connected clients. Each room with players runs its own 60 Hz tick task,
//! spawned lazily on the first join and torn down shortly after the room
//! empties.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::game::state::{PlayerId, RaceState};
use crate::game::tick::run_tick;
use crate::network::protocol::{
    MapPayload, PlayerSnapshot, RoomSnapshot, RoomStanding, ServerMessage,
};
use crate::store::leaderboard::{self, LeaderboardEntry, LeaderboardStore};
use crate::store::tracks::TrackCatalog;
use crate::TICK_RATE;

/// Seconds between leaderboard refreshes inside state broadcasts while a
/// race is running. Outside a race every broadcast carries them.
const LEADERBOARD_PUSH_INTERVAL: f64 = 0.5;

/// How long an empty room lingers before its tick task exits, so a quick
/// reconnect does not thrash task spawns.
const EMPTY_ROOM_GRACE: Duration = Duration::from_millis(200);

/// Capacity of each client's outbound frame queue.
pub const CLIENT_QUEUE_DEPTH: usize = 64;

/// Simulation clock in seconds: monotonic, anchored to the wall clock at
/// first use. Countdown deadlines, lap debounce and race times all run on
/// this clock, so an NTP step can never stall a countdown or skew a lap.
pub fn now_seconds() -> f64 {
    static CLOCK: OnceLock<(Instant, f64)> = OnceLock::new();
    let (start, epoch) = *CLOCK.get_or_init(|| (Instant::now(), wall_clock_seconds()));
    epoch + start.elapsed().as_secs_f64()
}

/// Raw wall-clock seconds, for clock-sync echoes only.
pub fn wall_clock_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// One room: simulation state plus client channels.
#[derive(Debug)]
pub struct Room {
    /// The authoritative simulation.
    pub race: RaceState,
    senders: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
    last_leaderboard_push: f64,
    loop_running: bool,
}

impl Room {
    fn new(race: RaceState) -> Self {
        Self {
            race,
            senders: BTreeMap::new(),
            last_leaderboard_push: 0.0,
            loop_running: false,
        }
    }

    /// Queue a message to every connected client. A client with a full
    /// queue loses this frame; the next broadcast supersedes it anyway.
    pub fn broadcast(&self, message: &ServerMessage) {
        for (id, sender) in &self.senders {
            if let Err(err) = sender.try_send(message.clone()) {
                debug!(player = %id, error = %err, "dropping frame for slow client");
            }
        }
    }

    /// Build the per-tick state broadcast.
    ///
    /// Leaderboards ride along on every frame outside a race, but only
    /// twice a second while racing to keep the hot-path frames small.
    pub fn build_state_update(
        &mut self,
        leaderboard: &LeaderboardStore,
        now: f64,
    ) -> ServerMessage {
        let race = &self.race;
        let include_boards = race.phase.allows_setup_changes()
            || now - self.last_leaderboard_push >= LEADERBOARD_PUSH_INTERVAL;
        if include_boards {
            self.last_leaderboard_push = now;
        }

        let (room_board, global_board) = if include_boards {
            (
                Some(room_standings(race)),
                Some(leaderboard.top_scores(&race.track.id, leaderboard::category(race.laps_to_win))),
            )
        } else {
            (None, None)
        };

        let room = RoomSnapshot {
            phase: race.phase,
            laps_to_win: race.laps_to_win,
            track_id: race.track.id.clone(),
            track_name: race.track.name.clone(),
            countdown_seconds_left: race.countdown_seconds_left(now),
            winner_id: race.winner_id.clone(),
            race_elapsed_ms: race.race_elapsed_ms(now),
            room_leaderboard: room_board,
            global_leaderboard: global_board,
        };

        let players = race.players.values().map(PlayerSnapshot::from_player).collect();

        ServerMessage::State {
            server_time: now,
            room,
            players,
        }
    }

    /// The map payload for the room's active track.
    pub fn map_payload(&self) -> MapPayload {
        MapPayload::from_track(&self.race.track)
    }
}

/// Room leaderboard rows: finishers only, ascending by total race time.
fn room_standings(race: &RaceState) -> Vec<RoomStanding> {
    let mut standings: Vec<RoomStanding> = race
        .players
        .values()
        .filter(|p| p.finished)
        .map(|p| RoomStanding {
            id: p.id.clone(),
            name: p.name.clone(),
            laps: p.laps,
            best_lap_ms: p.best_lap_time_ms,
            total_time_ms: p.race_total_time_ms,
        })
        .collect();

    standings.sort_by_key(|s| s.total_time_ms);
    standings
}

/// All rooms, plus the shared stores every room needs.
#[derive(Debug)]
pub struct RoomManager {
    rooms: RwLock<BTreeMap<String, Arc<RwLock<Room>>>>,
    catalog: Arc<TrackCatalog>,
    leaderboard: Arc<LeaderboardStore>,
}

impl RoomManager {
    /// Create an empty manager over the shared stores.
    pub fn new(catalog: Arc<TrackCatalog>, leaderboard: Arc<LeaderboardStore>) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            catalog,
            leaderboard,
        }
    }

    /// The shared track catalog.
    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    /// The shared leaderboard store.
    pub fn leaderboard(&self) -> &LeaderboardStore {
        &self.leaderboard
    }

    /// Normalize a client-supplied room id.
    pub fn normalize_room_id(raw: &str) -> String {
        let id = raw.trim();
        if id.is_empty() {
            "lobby".to_string()
        } else {
            id.chars().take(32).collect()
        }
    }

    /// Add a player to a room, creating the room and spawning its tick
    /// loop if needed. Returns the new player's id and the room handle.
    pub async fn join(
        self: &Arc<Self>,
        room_id: &str,
        name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> (PlayerId, Arc<RwLock<Room>>) {
        let room_id = Self::normalize_room_id(room_id);

        let room = {
            let mut rooms = self.rooms.write().await;
            rooms
                .entry(room_id.clone())
                .or_insert_with(|| {
                    info!(room = %room_id, "creating room");
                    let race = RaceState::new(room_id.clone(), self.catalog.default_track());
                    Arc::new(RwLock::new(Room::new(race)))
                })
                .clone()
        };

        let player_id = {
            let mut guard = room.write().await;
            let player_id = guard.race.add_player(name);
            guard.senders.insert(player_id.clone(), sender);

            if !guard.loop_running {
                guard.loop_running = true;
                let manager = Arc::clone(self);
                let handle = Arc::clone(&room);
                let id = room_id.clone();
                tokio::spawn(async move {
                    run_room_loop(manager, id, handle).await;
                });
            }
            player_id
        };

        info!(room = %room_id, player = %player_id, "player joined");
        (player_id, room)
    }

    /// Remove a player from a room.
    pub async fn leave(&self, room_id: &str, player_id: &PlayerId) {
        let room_id = Self::normalize_room_id(room_id);
        let room = {
            let rooms = self.rooms.read().await;
            rooms.get(&room_id).cloned()
        };
        let Some(room) = room else { return };

        let mut guard = room.write().await;
        guard.senders.remove(player_id);
        if guard.race.remove_player(player_id) {
            info!(room = %room_id, player = %player_id, "player left");
        }
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Prune a room, unless a concurrent join repopulated it.
    async fn remove_room_if_empty(&self, room_id: &str, room: &Arc<RwLock<Room>>) {
        let mut rooms = self.rooms.write().await;
        if room.read().await.race.players.is_empty() {
            rooms.remove(room_id);
        }
    }
}

/// The per-room fixed-rate simulation task.
///
/// Runs until the room has been empty for the grace period, then prunes
/// the room from the manager and exits.
async fn run_room_loop(manager: Arc<RoomManager>, room_id: String, room: Arc<RwLock<Room>>) {
    let dt = 1.0 / TICK_RATE as f32;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / TICK_RATE as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(room = %room_id, "tick loop started");

    loop {
        ticker.tick().await;

        if room.read().await.race.players.is_empty() {
            tokio::time::sleep(EMPTY_ROOM_GRACE).await;
            let mut guard = room.write().await;
            if guard.race.players.is_empty() {
                guard.loop_running = false;
                drop(guard);
                manager.remove_room_if_empty(&room_id, &room).await;
                info!(room = %room_id, "room empty, tick loop stopped");
                return;
            }
        }

        let now = now_seconds();
        let finish = {
            let mut guard = room.write().await;
            let result = run_tick(&mut guard.race, now, dt);

            let finish = result.winner.as_ref().and_then(|winner_id| {
                guard.race.players.get(winner_id).map(|p| {
                    (
                        guard.race.track.id.clone(),
                        guard.race.laps_to_win,
                        LeaderboardEntry {
                            name: p.name.clone(),
                            time_ms: p.race_total_time_ms,
                            car_id: p.car_id,
                            car_name: p.car().name.to_string(),
                        },
                    )
                })
            });

            let update = guard.build_state_update(manager.leaderboard(), now);
            guard.broadcast(&update);
            finish
        };

        // Persist outside the room lock; file IO must not stall the tick.
        if let Some((track_id, laps, entry)) = finish {
            info!(room = %room_id, winner = %entry.name, time_ms = entry.time_ms, "race won");
            manager.leaderboard().record_finish(&track_id, laps, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::RoomPhase;
    use crate::store::leaderboard::LeaderboardStore;
    use crate::store::tracks::TrackCatalog;

    fn temp_manager() -> Arc<RoomManager> {
        let dir = std::env::temp_dir().join(format!("slipstream-rooms-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Arc::new(RoomManager::new(
            Arc::new(TrackCatalog::open(dir.join("tracks.json"))),
            Arc::new(LeaderboardStore::open(dir.join("leaderboard.json"))),
        ))
    }

    #[test]
    fn test_simulation_clock_is_monotonic_near_wall_time() {
        let mut last = now_seconds();
        for _ in 0..1_000 {
            let now = now_seconds();
            assert!(now >= last, "clock went backwards: {now} < {last}");
            last = now;
        }
        // Anchored to the wall clock, so timestamps stay comparable.
        assert!((now_seconds() - wall_clock_seconds()).abs() < 1.0);
    }

    #[test]
    fn test_room_id_normalization() {
        assert_eq!(RoomManager::normalize_room_id("  alpha "), "alpha");
        assert_eq!(RoomManager::normalize_room_id(""), "lobby");
        assert_eq!(RoomManager::normalize_room_id("   "), "lobby");
        assert_eq!(RoomManager::normalize_room_id(&"x".repeat(100)).len(), 32);
    }

    #[tokio::test]
    async fn test_join_creates_room_and_registers_sender() {
        let manager = temp_manager();
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);

        let (player_id, room) = manager.join("alpha", "Ada", tx).await;
        assert_eq!(manager.room_count().await, 1);

        let guard = room.read().await;
        assert!(guard.race.players.contains_key(&player_id));
        assert_eq!(guard.race.phase, RoomPhase::Lobby);
        drop(guard);

        // The tick loop broadcasts state frames to the registered sender.
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("a state frame within a second")
            .expect("channel open");
        assert!(matches!(frame, ServerMessage::State { .. }));
    }

    #[tokio::test]
    async fn test_empty_room_is_pruned() {
        let manager = temp_manager();
        let (tx, _rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);

        let (player_id, _room) = manager.join("alpha", "Ada", tx).await;
        manager.leave("alpha", &player_id).await;

        tokio::time::sleep(EMPTY_ROOM_GRACE * 4).await;
        assert_eq!(manager.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_two_rooms_are_independent() {
        let manager = temp_manager();
        let (tx_a, _rx_a) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let (tx_b, _rx_b) = mpsc::channel(CLIENT_QUEUE_DEPTH);

        let (_, room_a) = manager.join("alpha", "Ada", tx_a).await;
        let (_, room_b) = manager.join("beta", "Brin", tx_b).await;
        assert_eq!(manager.room_count().await, 2);

        room_a.write().await.race.laps_to_win = 5;
        assert_eq!(room_b.read().await.race.laps_to_win, 3);
    }

    #[tokio::test]
    async fn test_state_update_throttles_leaderboards_while_racing() {
        let manager = temp_manager();
        let (tx, _rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let (_, room) = manager.join("alpha", "Ada", tx).await;

        let mut guard = room.write().await;
        guard.race.phase = RoomPhase::Racing;
        guard.race.race_start = 100.0;
        // The live tick loop stamps wall-clock times; rebase for the test.
        guard.last_leaderboard_push = 0.0;

        let first = guard.build_state_update(manager.leaderboard(), 100.0);
        let second = guard.build_state_update(manager.leaderboard(), 100.1);
        let third = guard.build_state_update(manager.leaderboard(), 100.7);

        let boards = |msg: &ServerMessage| match msg {
            ServerMessage::State { room, .. } => room.global_leaderboard.is_some(),
            _ => panic!("not a state frame"),
        };
        assert!(boards(&first), "first racing frame carries boards");
        assert!(!boards(&second), "throttled inside the interval");
        assert!(boards(&third), "carried again after the interval");
    }

    #[test]
    fn test_room_standings_list_finishers_by_total_time() {
        let track = crate::store::tracks::builtin_tracks().remove(0);
        let mut race = RaceState::new("alpha".to_string(), track);
        let slow = race.add_player("Slow");
        let fast = race.add_player("Fast");
        let mid = race.add_player("Midpack");

        for (id, total) in [(&slow, 90_000), (&fast, 60_000)] {
            let player = race.players.get_mut(id).unwrap();
            player.finished = true;
            player.race_total_time_ms = total;
        }
        race.players.get_mut(&mid).unwrap().laps = 2;

        let standings = room_standings(&race);
        assert_eq!(standings.len(), 2, "only finishers make the board");
        assert_eq!(standings[0].id, fast);
        assert_eq!(standings[0].total_time_ms, 60_000);
        assert_eq!(standings[1].id, slow);
    }
}
