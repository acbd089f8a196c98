//! Per-Tick Simulation Step
//!
//! One entry point, [`run_tick`], advances a room by a single fixed step:
//! phase transitions, per-car physics, car-vs-car collisions and lap
//! accounting. Pure over the passed state; the caller owns scheduling.

use tracing::debug;

use crate::game::physics;
use crate::game::state::{PlayerId, RaceState, RoomPhase};
use crate::game::track::Tile;

/// Two finish crossings closer together than this count as one.
const LAP_DEBOUNCE_SECONDS: f64 = 1.0;

/// Outcome of one tick that the caller may need to act on.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickResult {
    /// Set on the tick a player wins the race.
    pub winner: Option<PlayerId>,
}

/// Advance the room by `dt` seconds at monotonic time `now`.
pub fn run_tick(state: &mut RaceState, now: f64, dt: f32) -> TickResult {
    state.maybe_begin_race(now);

    if state.phase != RoomPhase::Racing {
        return TickResult::default();
    }

    for player in state.players.values_mut() {
        let car = player.car();
        physics::step_player(&state.track, car, player, dt);
    }

    let mut bodies: Vec<&mut _> = state.players.values_mut().collect();
    physics::solve_car_collisions(&mut bodies);

    update_laps(state, now)
}

/// Checkpoint/finish bookkeeping for every racer.
///
/// A lap counts only when the car crosses a finish tile with its checkpoint
/// flag armed and outside the debounce window, so driving back and forth
/// over the line cannot farm laps.
fn update_laps(state: &mut RaceState, now: f64) -> TickResult {
    let mut result = TickResult::default();
    let laps_to_win = state.laps_to_win;
    let race_start = state.race_start;

    for player in state.players.values_mut() {
        if player.finished {
            continue;
        }

        match state.track.tile_at(player.position.x, player.position.y) {
            Tile::Checkpoint => {
                player.checkpoint_passed = true;
            }
            Tile::Finish => {
                if !player.checkpoint_passed {
                    continue;
                }
                if now - player.last_finish_cross_time < LAP_DEBOUNCE_SECONDS {
                    continue;
                }

                player.laps += 1;
                player.checkpoint_passed = false;
                player.last_finish_cross_time = now;

                let lap_ms = ((now - player.lap_start_time) * 1000.0).max(0.0) as u64;
                player.lap_start_time = now;
                if player.best_lap_time_ms == 0 || lap_ms < player.best_lap_time_ms {
                    player.best_lap_time_ms = lap_ms;
                }
                debug!(
                    player = %player.id,
                    lap = player.laps,
                    lap_ms,
                    "lap completed"
                );

                if player.laps >= laps_to_win {
                    player.finished = true;
                    player.race_total_time_ms = ((now - race_start) * 1000.0).max(0.0) as u64;

                    if state.winner_id.is_none() {
                        state.winner_id = Some(player.id.clone());
                        result.winner = Some(player.id.clone());
                    }
                }
            }
            _ => {}
        }
    }

    if result.winner.is_some() {
        state.phase = RoomPhase::Finished;
    }

    result
}
