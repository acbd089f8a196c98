//! Room Simulation State
//!
//! All per-room race state. This module is pure simulation: no sockets, no
//! clocks of its own. Callers pass the current monotonic time in seconds so
//! the state machine stays deterministic under test.
//!
//! Uses BTreeMap for stable iteration order across players.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::Vec2;
use crate::game::cars::{self, CarProfile};
use crate::game::input::InputState;
use crate::game::track::Track;

/// Seconds the pre-race countdown runs.
pub const COUNTDOWN_SECONDS: f64 = 3.0;

/// World-space spacing between grid slots at the start line.
pub const SPAWN_GRID_SPACING: f32 = 18.0;

/// Allowed race lengths.
pub const MIN_LAPS: u32 = 1;
/// Allowed race lengths.
pub const MAX_LAPS: u32 = 5;

/// Maximum accepted display-name length.
const MAX_NAME_LEN: usize = 18;

/// Opaque per-connection player identifier (short hex string).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub(crate) String);

impl PlayerId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self(id[..8].to_string())
    }

    /// Borrow the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.0)
    }
}

/// Race lifecycle phase of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    /// Garage / track selection. Initial phase, re-entered on reset.
    Lobby,
    /// Countdown running, players frozen at the grid.
    Countdown,
    /// Cars on track.
    Racing,
    /// A winner exists; results on display until reset.
    Finished,
}

impl RoomPhase {
    /// Whether garage/track changes are currently allowed.
    #[inline]
    pub fn allows_setup_changes(self) -> bool {
        matches!(self, RoomPhase::Lobby | RoomPhase::Finished)
    }
}

/// One connected racer.
#[derive(Debug, Clone)]
pub struct Player {
    /// Stable per-connection id.
    pub id: PlayerId,
    /// Display name (truncated on join).
    pub name: String,
    /// Index into the car profile table.
    pub car_id: usize,
    /// Body color, mirrors the chosen car.
    pub color: String,
    /// World position.
    pub position: Vec2,
    /// Heading in degrees.
    pub rotation_deg: f32,
    /// World velocity.
    pub velocity: Vec2,
    /// Current grip, interpolating toward the drift target while sliding.
    pub grip_state: f32,
    /// Completed laps this race.
    pub laps: u32,
    /// Armed by crossing a checkpoint; required before a finish crossing
    /// counts as a lap.
    pub checkpoint_passed: bool,
    /// Monotonic seconds of the last counted finish crossing.
    pub last_finish_cross_time: f64,
    /// Monotonic seconds when the current lap began.
    pub lap_start_time: f64,
    /// Best lap this race, milliseconds. Zero until set.
    pub best_lap_time_ms: u64,
    /// Total race time, milliseconds. Set when finishing.
    pub race_total_time_ms: u64,
    /// Ready flag for the lobby gate.
    pub ready: bool,
    /// Crossed the final finish line.
    pub finished: bool,
    /// Latest input snapshot; replaced by the protocol layer only.
    pub input: InputState,
}

impl Player {
    /// Create a player at a spawn slot.
    pub fn new(id: PlayerId, name: &str, x: f32, y: f32, rotation_deg: f32) -> Self {
        let name = name.chars().take(MAX_NAME_LEN).collect::<String>();
        let name = if name.trim().is_empty() {
            "Player".to_string()
        } else {
            name
        };

        let mut player = Self {
            id,
            name,
            car_id: 0,
            color: String::new(),
            position: Vec2::new(x, y),
            rotation_deg,
            velocity: Vec2::ZERO,
            grip_state: 1.0,
            laps: 0,
            checkpoint_passed: false,
            last_finish_cross_time: 0.0,
            lap_start_time: 0.0,
            best_lap_time_ms: 0,
            race_total_time_ms: 0,
            ready: false,
            finished: false,
            input: InputState::default(),
        };
        player.set_car(0);
        player
    }

    /// Change car, clamping unknown ids, and sync color/grip.
    pub fn set_car(&mut self, car_id: usize) {
        let car = cars::profile(cars::clamp_car_id(car_id));
        self.car_id = car.id;
        self.color = car.color.to_string();
        self.grip_state = car.grip;
    }

    /// The player's current car profile.
    #[inline]
    pub fn car(&self) -> &'static CarProfile {
        cars::profile(self.car_id)
    }

    /// Current speed magnitude.
    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Drift indicator for broadcasts: handbrake held at speed.
    pub fn is_drifting(&self) -> bool {
        self.input.handbrake && self.speed() > 50.0
    }

    /// Put the player back on its grid slot for a fresh race.
    pub fn reset_for_race(&mut self, spawn: Vec2, rotation_deg: f32, grid_index: usize, now: f64) {
        self.position = Vec2::new(
            spawn.x + grid_index as f32 * SPAWN_GRID_SPACING,
            spawn.y,
        );
        self.rotation_deg = rotation_deg;
        self.velocity = Vec2::ZERO;
        self.ready = false;
        self.finished = false;
        self.laps = 0;
        self.checkpoint_passed = false;
        self.last_finish_cross_time = 0.0;
        self.lap_start_time = now;
        self.best_lap_time_ms = 0;
        self.race_total_time_ms = 0;
        self.input = InputState::default();
        self.grip_state = self.car().grip;
    }
}

/// Errors from phase-transition requests. Reported to the requesting client
/// only; room state stays unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RaceError {
    /// Start requested with unready players.
    #[error("All players must be ready before starting race.")]
    NotAllReady,

    /// Start requested on an empty room.
    #[error("Cannot start a race without players.")]
    NoPlayers,

    /// Start requested while a race is already underway.
    #[error("Race already in progress.")]
    RaceInProgress,

    /// Setup change requested mid-race.
    #[error("Track can only be changed in lobby or after race finish.")]
    PhaseLocked,
}

/// Complete simulation state of one room.
#[derive(Debug, Clone)]
pub struct RaceState {
    /// Room identifier (client-chosen).
    pub room_id: String,
    /// Lifecycle phase.
    pub phase: RoomPhase,
    /// Laps required to finish, in [`MIN_LAPS`, `MAX_LAPS`].
    pub laps_to_win: u32,
    /// Monotonic deadline for Countdown -> Racing.
    pub countdown_end: f64,
    /// Monotonic seconds the race started; 0 before the first race.
    pub race_start: f64,
    /// First finisher of the current race.
    pub winner_id: Option<PlayerId>,
    /// Active track. Immutable while a race runs.
    pub track: Track,
    /// All connected players.
    pub players: BTreeMap<PlayerId, Player>,
}

impl RaceState {
    /// Create a room in the lobby phase.
    pub fn new(room_id: impl Into<String>, track: Track) -> Self {
        Self {
            room_id: room_id.into(),
            phase: RoomPhase::Lobby,
            laps_to_win: 3,
            countdown_end: 0.0,
            race_start: 0.0,
            winner_id: None,
            track,
            players: BTreeMap::new(),
        }
    }

    /// Add a player on the next free grid slot. Returns its id.
    pub fn add_player(&mut self, name: &str) -> PlayerId {
        let id = PlayerId::random();
        let (spawn_x, spawn_y) = self.track.spawn_point();
        let slot = self.players.len();

        let mut player = Player::new(
            id.clone(),
            name,
            spawn_x + slot as f32 * SPAWN_GRID_SPACING,
            spawn_y,
            self.track.spawn_rotation_deg,
        );
        player.set_car(slot % cars::car_profiles().len());

        self.players.insert(id.clone(), player);
        id
    }

    /// Remove a player. Returns true if it existed.
    pub fn remove_player(&mut self, id: &PlayerId) -> bool {
        self.players.remove(id).is_some()
    }

    /// Whether every connected player has readied up.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.ready)
    }

    /// Apply a garage request. Car changes are always allowed; laps and
    /// ready flags only while setup changes are permitted.
    pub fn apply_garage(
        &mut self,
        player_id: &PlayerId,
        car_id: Option<usize>,
        laps_to_win: Option<u32>,
        ready: Option<bool>,
    ) {
        let setup_open = self.phase.allows_setup_changes();

        if let Some(laps) = laps_to_win {
            if setup_open {
                self.laps_to_win = laps.clamp(MIN_LAPS, MAX_LAPS);
            }
        }

        if let Some(player) = self.players.get_mut(player_id) {
            if let Some(car) = car_id {
                player.set_car(car);
            }
            if let Some(ready) = ready {
                if setup_open {
                    player.ready = ready;
                }
            }
        }
    }

    /// Swap the active track and drop everyone back to the lobby.
    ///
    /// Only legal while setup changes are allowed.
    pub fn set_track(&mut self, track: Track) -> Result<(), RaceError> {
        if !self.phase.allows_setup_changes() {
            return Err(RaceError::PhaseLocked);
        }

        self.track = track;
        self.phase = RoomPhase::Lobby;
        self.winner_id = None;

        let (spawn_x, spawn_y) = self.track.spawn_point();
        let rotation = self.track.spawn_rotation_deg;
        for (slot, player) in self.players.values_mut().enumerate() {
            player.ready = false;
            player.finished = false;
            player.laps = 0;
            player.checkpoint_passed = false;
            player.velocity = Vec2::ZERO;
            player.position = Vec2::new(spawn_x + slot as f32 * SPAWN_GRID_SPACING, spawn_y);
            player.rotation_deg = rotation;
        }

        Ok(())
    }

    /// Lobby/Finished -> Countdown. Gated on at least one ready player set.
    pub fn start_countdown(&mut self, now: f64) -> Result<(), RaceError> {
        if !self.phase.allows_setup_changes() {
            return Err(RaceError::RaceInProgress);
        }
        if self.players.is_empty() {
            return Err(RaceError::NoPlayers);
        }
        if !self.all_ready() {
            return Err(RaceError::NotAllReady);
        }

        self.phase = RoomPhase::Countdown;
        self.winner_id = None;
        self.countdown_end = now + COUNTDOWN_SECONDS;

        let (spawn_x, spawn_y) = self.track.spawn_point();
        let spawn = Vec2::new(spawn_x, spawn_y);
        let rotation = self.track.spawn_rotation_deg;
        for (slot, player) in self.players.values_mut().enumerate() {
            player.reset_for_race(spawn, rotation, slot, now);
        }

        Ok(())
    }

    /// Countdown -> Racing once the deadline has passed. Polled each tick.
    pub fn maybe_begin_race(&mut self, now: f64) {
        if self.phase != RoomPhase::Countdown || now < self.countdown_end {
            return;
        }

        self.phase = RoomPhase::Racing;
        self.race_start = now;
        // Every lap timer starts at the same instant for fairness.
        for player in self.players.values_mut() {
            player.lap_start_time = now;
        }
    }

    /// Finished (or anywhere, on explicit request) -> Lobby. Identities and
    /// car choices persist; race progress is cleared.
    pub fn reset_to_lobby(&mut self) {
        self.phase = RoomPhase::Lobby;
        self.winner_id = None;
        for player in self.players.values_mut() {
            player.ready = false;
            player.finished = false;
            player.laps = 0;
            player.checkpoint_passed = false;
        }
    }

    /// Seconds left on the countdown clock, rounded up for display.
    pub fn countdown_seconds_left(&self, now: f64) -> u32 {
        if self.phase != RoomPhase::Countdown {
            return 0;
        }
        (self.countdown_end - now).ceil().max(0.0) as u32
    }

    /// Milliseconds since the race started.
    pub fn race_elapsed_ms(&self, now: f64) -> u64 {
        if !matches!(self.phase, RoomPhase::Racing | RoomPhase::Finished) || self.race_start <= 0.0
        {
            return 0;
        }
        ((now - self.race_start) * 1000.0).max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tracks::builtin_tracks;

    fn test_state() -> RaceState {
        RaceState::new("room-1", builtin_tracks().into_iter().next().unwrap())
    }

    #[test]
    fn test_join_assigns_grid_slots_and_cars() {
        let mut state = test_state();
        let a = state.add_player("Ada");
        let b = state.add_player("Brin");

        let pa = &state.players[&a];
        let pb = &state.players[&b];
        assert_eq!(pa.car_id, 0);
        assert_eq!(pb.car_id, 1);
        assert!((pb.position.x - pa.position.x - SPAWN_GRID_SPACING).abs() < 1e-3);
        assert_eq!(pa.rotation_deg, state.track.spawn_rotation_deg);
    }

    #[test]
    fn test_name_truncation_and_default() {
        let mut state = test_state();
        let long = state.add_player("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(state.players[&long].name.len(), 18);

        let blank = state.add_player("   ");
        assert_eq!(state.players[&blank].name, "Player");
    }

    #[test]
    fn test_start_requires_ready_players() {
        let mut state = test_state();
        assert_eq!(state.start_countdown(0.0), Err(RaceError::NoPlayers));

        let a = state.add_player("Ada");
        let b = state.add_player("Brin");
        assert_eq!(state.start_countdown(0.0), Err(RaceError::NotAllReady));

        state.apply_garage(&a, None, None, Some(true));
        assert_eq!(state.start_countdown(0.0), Err(RaceError::NotAllReady));

        state.apply_garage(&b, None, None, Some(true));
        assert_eq!(state.start_countdown(10.0), Ok(()));
        assert_eq!(state.phase, RoomPhase::Countdown);
        assert_eq!(state.countdown_end, 10.0 + COUNTDOWN_SECONDS);
        assert!(!state.players[&a].ready, "ready cleared on race start");
    }

    #[test]
    fn test_start_rejected_while_race_underway() {
        let mut state = test_state();
        let a = state.add_player("Ada");
        state.apply_garage(&a, None, None, Some(true));
        state.start_countdown(0.0).unwrap();

        assert_eq!(state.start_countdown(1.0), Err(RaceError::RaceInProgress));
        assert_eq!(
            state.start_countdown(1.0).unwrap_err().to_string(),
            "Race already in progress."
        );

        state.maybe_begin_race(5.0);
        assert_eq!(state.phase, RoomPhase::Racing);
        assert_eq!(state.start_countdown(6.0), Err(RaceError::RaceInProgress));
    }

    #[test]
    fn test_countdown_elapses_into_racing() {
        let mut state = test_state();
        let a = state.add_player("Ada");
        state.apply_garage(&a, None, None, Some(true));
        state.start_countdown(100.0).unwrap();

        state.maybe_begin_race(101.0);
        assert_eq!(state.phase, RoomPhase::Countdown);
        assert_eq!(state.countdown_seconds_left(101.0), 2);

        state.maybe_begin_race(103.0);
        assert_eq!(state.phase, RoomPhase::Racing);
        assert_eq!(state.race_start, 103.0);
        assert_eq!(state.players[&a].lap_start_time, 103.0);
    }

    #[test]
    fn test_garage_laps_clamped_and_phase_gated() {
        let mut state = test_state();
        let a = state.add_player("Ada");

        state.apply_garage(&a, None, Some(99), None);
        assert_eq!(state.laps_to_win, MAX_LAPS);
        state.apply_garage(&a, None, Some(0), None);
        assert_eq!(state.laps_to_win, MIN_LAPS);

        state.phase = RoomPhase::Racing;
        state.apply_garage(&a, Some(2), Some(3), Some(true));
        assert_eq!(state.laps_to_win, MIN_LAPS, "laps locked while racing");
        assert!(!state.players[&a].ready, "ready locked while racing");
        assert_eq!(state.players[&a].car_id, 2, "car change always allowed");
    }

    #[test]
    fn test_set_track_rejected_while_racing() {
        let mut state = test_state();
        state.add_player("Ada");
        state.phase = RoomPhase::Racing;

        let other = builtin_tracks().into_iter().last().unwrap();
        let before = state.track.id.clone();
        assert_eq!(state.set_track(other), Err(RaceError::PhaseLocked));
        assert_eq!(state.track.id, before, "track unchanged after rejection");
    }

    #[test]
    fn test_reset_to_lobby_keeps_identities() {
        let mut state = test_state();
        let a = state.add_player("Ada");
        {
            let p = state.players.get_mut(&a).unwrap();
            p.finished = true;
            p.laps = 3;
            p.ready = true;
        }
        state.phase = RoomPhase::Finished;
        state.winner_id = Some(a.clone());

        state.reset_to_lobby();
        assert_eq!(state.phase, RoomPhase::Lobby);
        assert_eq!(state.winner_id, None);
        let p = &state.players[&a];
        assert!(!p.finished && !p.ready);
        assert_eq!(p.laps, 0);
        assert_eq!(p.name, "Ada");
    }
}
