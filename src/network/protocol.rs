//! Wire Protocol
//!
//! JSON message types exchanged over the WebSocket, tagged by a `type`
//! field with camelCase payload fields. Unknown client message types fail
//! to parse and are answered with an error frame; they never disconnect.

use serde::{Deserialize, Serialize};

use crate::game::cars::CarProfile;
use crate::game::input::InputState;
use crate::game::state::{Player, PlayerId, RoomPhase};
use crate::game::track::Track;
use crate::store::leaderboard::LeaderboardEntry;
use crate::store::tracks::TrackSummary;
use crate::TILE_SIZE;

/// Messages a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room. Must be the first message on a connection.
    #[serde(rename_all = "camelCase")]
    Join {
        /// Target room id.
        room_id: String,
        /// Display name, truncated server-side.
        #[serde(default)]
        name: String,
    },

    /// Replace the sender's control snapshot.
    Input {
        /// The new control state.
        input: InputState,
    },

    /// Garage changes: car, race length, ready flag.
    #[serde(rename_all = "camelCase")]
    Garage {
        /// Requested car preset index.
        #[serde(default)]
        car_id: Option<usize>,
        /// Requested race length.
        #[serde(default)]
        laps_to_win: Option<u32>,
        /// Ready flag.
        #[serde(default)]
        ready: Option<bool>,
    },

    /// Switch the room's track, optionally submitting a custom map.
    #[serde(rename_all = "camelCase")]
    SetTrack {
        /// Catalog id, or `custom` together with `custom_map`.
        track_id: String,
        /// Custom map rows, when `track_id` is `custom`.
        #[serde(default)]
        custom_map: Option<Vec<String>>,
        /// Spawn facing for a custom map.
        #[serde(default)]
        spawn_rotation_deg: Option<f32>,
    },

    /// Request the countdown to start.
    StartRace,

    /// Drop the room back to the lobby.
    ResetLobby,

    /// Latency probe.
    #[serde(rename_all = "camelCase")]
    Ping {
        /// Client timestamp, echoed back verbatim.
        #[serde(default)]
        client_time: f64,
    },
}

/// Messages the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame after a successful join.
    #[serde(rename_all = "camelCase")]
    Welcome {
        /// The id assigned to this connection.
        player_id: PlayerId,
        /// Echo of the joined room id.
        room_id: String,
        /// Active track of the room.
        map: MapPayload,
        /// Track catalog.
        tracks: Vec<TrackSummary>,
        /// Car preset table.
        cars: Vec<CarProfile>,
    },

    /// The room switched tracks.
    Map {
        /// The new active track.
        map: MapPayload,
        /// Refreshed track catalog.
        tracks: Vec<TrackSummary>,
    },

    /// Authoritative per-tick room snapshot.
    #[serde(rename_all = "camelCase")]
    State {
        /// Simulation clock seconds, monotonic and anchored to wall time.
        server_time: f64,
        /// Room-level state.
        room: RoomSnapshot,
        /// All players, in stable id order.
        players: Vec<PlayerSnapshot>,
    },

    /// A request was rejected. The connection stays open.
    Error {
        /// Human-readable reason.
        message: String,
    },

    /// Latency probe reply.
    #[serde(rename_all = "camelCase")]
    Pong {
        /// The client timestamp from the ping.
        client_time: f64,
        /// Server wall-clock seconds.
        server_time: f64,
    },
}

/// Track geometry as sent to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPayload {
    /// Track id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Spawn facing in degrees.
    pub spawn_rotation_deg: f32,
    /// World units per tile.
    pub tile_size: f32,
    /// Width in tiles.
    pub width_tiles: usize,
    /// Height in tiles.
    pub height_tiles: usize,
    /// Tile rows.
    pub rows: Vec<String>,
}

impl MapPayload {
    /// Build the payload for a track.
    pub fn from_track(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            spawn_rotation_deg: track.spawn_rotation_deg,
            tile_size: TILE_SIZE,
            width_tiles: track.width_tiles,
            height_tiles: track.height_tiles,
            rows: track.rows.clone(),
        }
    }
}

/// Room-level fields of a state broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Lifecycle phase.
    pub phase: RoomPhase,
    /// Race length setting.
    pub laps_to_win: u32,
    /// Active track id.
    pub track_id: String,
    /// Active track name.
    pub track_name: String,
    /// Whole seconds left on the countdown, zero outside Countdown.
    pub countdown_seconds_left: u32,
    /// First finisher of the current race.
    pub winner_id: Option<PlayerId>,
    /// Milliseconds since the race started.
    pub race_elapsed_ms: u64,
    /// Finishers of the current race, ascending by total time. Omitted
    /// between throttled refreshes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_leaderboard: Option<Vec<RoomStanding>>,
    /// Persisted best times for this track and race length, omitted
    /// between throttled refreshes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_leaderboard: Option<Vec<LeaderboardEntry>>,
}

/// One finisher row of the room leaderboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStanding {
    /// Player id.
    pub id: PlayerId,
    /// Player name.
    pub name: String,
    /// Completed laps.
    pub laps: u32,
    /// Best lap this race in milliseconds, zero until set.
    pub best_lap_ms: u64,
    /// Total race time in milliseconds.
    pub total_time_ms: u64,
}

/// Per-player fields of a state broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Player id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Body color.
    pub color: String,
    /// Car preset index.
    pub car_id: usize,
    /// World position.
    pub x: f32,
    /// World position.
    pub y: f32,
    /// Heading in degrees.
    pub rotation_deg: f32,
    /// World velocity.
    pub vx: f32,
    /// World velocity.
    pub vy: f32,
    /// Speed magnitude.
    pub speed: f32,
    /// Steering indicator: -1, 0 or 1.
    pub turn_state: i8,
    /// Whether the car is visibly drifting.
    pub is_drifting: bool,
    /// Lobby ready flag.
    pub ready: bool,
    /// Completed laps.
    pub laps: u32,
    /// Whether the player finished the race.
    pub finished: bool,
    /// Best lap in milliseconds, zero until set.
    pub best_lap_ms: u64,
}

impl PlayerSnapshot {
    /// Snapshot a player for broadcast.
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            color: player.color.clone(),
            car_id: player.car_id,
            x: player.position.x,
            y: player.position.y,
            rotation_deg: player.rotation_deg,
            vx: player.velocity.x,
            vy: player.velocity.y,
            speed: player.speed(),
            turn_state: player.input.turn_indicator(),
            is_drifting: player.is_drifting(),
            ready: player.ready,
            laps: player.laps,
            finished: player.finished,
            best_lap_ms: player.best_lap_time_ms,
        }
    }
}

/// Serialize a server message to its wire form.
pub fn to_json(message: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Parse a client frame.
pub fn from_json(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_join() {
        let msg = from_json(r#"{"type":"join","roomId":"alpha","name":"Ada"}"#).unwrap();
        match msg {
            ClientMessage::Join { room_id, name } => {
                assert_eq!(room_id, "alpha");
                assert_eq!(name, "Ada");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_parses_garage_with_missing_fields() {
        let msg = from_json(r#"{"type":"garage","ready":true}"#).unwrap();
        match msg {
            ClientMessage::Garage {
                car_id,
                laps_to_win,
                ready,
            } => {
                assert_eq!(car_id, None);
                assert_eq!(laps_to_win, None);
                assert_eq!(ready, Some(true));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_parses_unit_variants() {
        assert!(matches!(
            from_json(r#"{"type":"start_race"}"#).unwrap(),
            ClientMessage::StartRace
        ));
        assert!(matches!(
            from_json(r#"{"type":"reset_lobby"}"#).unwrap(),
            ClientMessage::ResetLobby
        ));
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(from_json("not json").is_err());
    }

    #[test]
    fn test_error_frame_shape() {
        let json = to_json(&ServerMessage::Error {
            message: "nope".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "nope"}));
    }

    #[test]
    fn test_state_frame_uses_camel_case() {
        let room = RoomSnapshot {
            phase: RoomPhase::Lobby,
            laps_to_win: 3,
            track_id: "ridgeway".into(),
            track_name: "Ridgeway Ring".into(),
            countdown_seconds_left: 0,
            winner_id: None,
            race_elapsed_ms: 0,
            room_leaderboard: None,
            global_leaderboard: None,
        };
        let json = to_json(&ServerMessage::State {
            server_time: 12.5,
            room,
            players: vec![],
        })
        .unwrap();

        assert!(json.contains("\"serverTime\""));
        assert!(json.contains("\"lapsToWin\""));
        assert!(json.contains("\"countdownSecondsLeft\""));
        assert!(json.contains("\"phase\":\"lobby\""));
        // Throttled leaderboards are omitted entirely, not sent as null.
        assert!(!json.contains("Leaderboard"));
    }

    #[test]
    fn test_map_payload_from_track() {
        let track = crate::store::tracks::builtin_tracks().remove(0);
        let payload = MapPayload::from_track(&track);
        assert_eq!(payload.id, track.id);
        assert_eq!(payload.rows.len(), track.height_tiles);
        assert_eq!(payload.tile_size, TILE_SIZE);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"spawnRotationDeg\""));
        assert!(json.contains("\"widthTiles\""));
    }
}
