//! Car Physics Integration
//!
//! Fixed-timestep integration of one car against the track, plus the
//! pairwise car-vs-car collision solver. All functions are pure over the
//! passed state so the same inputs always produce the same motion.
//!
//! Units: world units per second, headings in degrees.

use crate::core::Vec2;
use crate::game::cars::CarProfile;
use crate::game::state::Player;
use crate::game::track::Track;
use crate::{CAR_COLLISION_RADIUS, TILE_SIZE};

/// Base steering rate in degrees per second, before the grip modifier.
pub const TURN_RATE_DEG: f32 = 150.0;

/// Steering is disabled below this speed so stationary cars cannot spin.
const MIN_STEER_SPEED: f32 = 2.0;

/// Grip the drift interpolates toward while the handbrake is held.
const DRIFT_TARGET_GRIP: f32 = 0.05;

/// Rate of the drift-grip interpolation, per second.
const DRIFT_GRIP_RATE: f32 = 4.0;

/// Extra lateral damping applied when the handbrake is released.
const STRAIGHTEN_FACTOR: f32 = 0.55;

/// Speed below which a car with no pedal input comes to a full stop.
const STOP_SPEED: f32 = 3.0;

/// Velocity multiplier on hitting a wall. Negative: a small rebound.
const WALL_BOUNCE: f32 = -0.25;

/// Per-tick velocity decay for cars that already finished the race.
const FINISHED_DECAY: f32 = 0.9;

/// Collision restitution between two cars.
const CAR_RESTITUTION: f32 = 0.35;

/// Advance one car by `dt` seconds.
pub fn step_player(track: &Track, car: &CarProfile, player: &mut Player, dt: f32) {
    if player.finished {
        // Finished cars coast to a stop; inputs are ignored.
        player.velocity = player.velocity * FINISHED_DECAY;
        move_with_walls(track, player, dt);
        return;
    }

    apply_steering(player, dt);
    apply_pedals(car, player, dt);
    apply_friction(car, player, dt);
    player.velocity = player.velocity * car.drag;
    apply_drift(car, player, dt);

    player.velocity = player.velocity.clamp_length(car.max_speed);
    if player.speed() < STOP_SPEED && !player.input.wants_motion() {
        player.velocity = Vec2::ZERO;
    }

    move_with_walls(track, player, dt);
}

/// Rotate the heading from steering input. Drifting steers sharper.
fn apply_steering(player: &mut Player, dt: f32) {
    if player.speed() <= MIN_STEER_SPEED {
        return;
    }
    let direction = player.input.turn_direction();
    if direction == 0.0 {
        return;
    }
    let agility = if player.input.handbrake { 1.3 } else { 0.6 };
    player.rotation_deg += direction * TURN_RATE_DEG * agility * dt;
    player.rotation_deg = player.rotation_deg.rem_euclid(360.0);
}

/// Throttle pushes along the heading, brake at half strength against it.
fn apply_pedals(car: &CarProfile, player: &mut Player, dt: f32) {
    let heading = Vec2::from_heading_deg(player.rotation_deg);
    let throttle = player.input.throttle_amount();
    if throttle > 0.0 {
        player.velocity += heading * (car.accel * throttle * dt);
    }
    let brake = player.input.brake_amount();
    if brake > 0.0 {
        player.velocity += heading * (-car.accel * 0.5 * brake * dt);
    }
}

/// Rolling friction opposes the velocity direction at a fixed rate.
fn apply_friction(car: &CarProfile, player: &mut Player, dt: f32) {
    let speed = player.speed();
    if speed <= STOP_SPEED {
        return;
    }
    let decel = (car.friction * dt).min(speed);
    player.velocity += player.velocity.normalize_or_zero() * -decel;
}

/// Decompose velocity around the heading and bleed the lateral part.
///
/// While the handbrake is held, grip sinks toward the drift target so the
/// car keeps sliding. On release, grip snaps back to the car's base value
/// and an extra damping factor straightens the slide out quickly.
fn apply_drift(car: &CarProfile, player: &mut Player, dt: f32) {
    if player.input.handbrake {
        player.grip_state += (DRIFT_TARGET_GRIP - player.grip_state) * DRIFT_GRIP_RATE * dt;
    } else {
        player.grip_state = car.grip;
    }

    let heading = Vec2::from_heading_deg(player.rotation_deg);
    let side = heading.perp();

    let forward_speed = player.velocity.dot(heading);
    let mut lateral_speed = player.velocity.dot(side);

    lateral_speed *= 0.99 - player.grip_state * 0.25;
    if !player.input.handbrake {
        lateral_speed *= STRAIGHTEN_FACTOR;
    }

    player.velocity = heading * forward_speed + side * lateral_speed;
}

/// Move the car along its velocity, substepped so fast cars cannot tunnel
/// through a wall tile. A blocked substep bounces and ends the move.
fn move_with_walls(track: &Track, player: &mut Player, dt: f32) {
    let delta = player.velocity * dt;
    let max_component = delta.x.abs().max(delta.y.abs());
    if max_component == 0.0 {
        return;
    }

    let substeps = ((max_component / (TILE_SIZE / 3.0)).floor() as usize + 1).max(1);
    let step = delta * (1.0 / substeps as f32);

    for _ in 0..substeps {
        let candidate = player.position + step;
        if track.is_road(candidate.x, candidate.y) {
            player.position = candidate;
        } else {
            player.velocity = player.velocity * WALL_BOUNCE;
            break;
        }
    }
}

/// Resolve every overlapping car pair with equal positional correction and
/// a restitution impulse along the contact normal.
pub fn solve_car_collisions(players: &mut [&mut Player]) {
    let min_dist = CAR_COLLISION_RADIUS * 2.0;

    for i in 0..players.len() {
        let (head, tail) = players.split_at_mut(i + 1);
        let a = &mut *head[i];
        for b in tail.iter_mut() {
            let offset = b.position - a.position;
            let dist_sq = offset.length_squared();
            // Coincident centers have no usable normal.
            if dist_sq <= 0.0001 || dist_sq >= min_dist * min_dist {
                continue;
            }

            let dist = dist_sq.sqrt();
            let normal = offset * (1.0 / dist);
            let overlap = min_dist - dist;

            // Push both cars apart by half the overlap each.
            a.position += normal * (-overlap * 0.5);
            b.position += normal * (overlap * 0.5);

            // Impulse only when closing; separating pairs are left alone.
            let relative = b.velocity - a.velocity;
            let closing = relative.dot(normal);
            if closing < 0.0 {
                let impulse = -(1.0 + CAR_RESTITUTION) * closing * 0.5;
                a.velocity += normal * -impulse;
                b.velocity += normal * impulse;
            }
        }
    }
}
