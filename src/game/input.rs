//! Player Input Snapshots
//!
//! The latest control state received from a client. Snapshots are replaced
//! wholesale by the protocol layer and only ever read by the tick loop.
//! Malformed values are clamped, never rejected.

use serde::{Deserialize, Serialize};

/// Analog steer magnitudes below this fall back to the digital keys.
pub const STEER_DEADZONE: f32 = 0.05;

/// Latest control state for one player.
///
/// Digital keys and analog axes coexist: analog wins when it carries a
/// meaningful magnitude, digital keys map to full magnitude otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputState {
    /// Digital throttle key.
    pub up: bool,
    /// Digital brake key.
    pub down: bool,
    /// Digital steer-left key.
    pub left: bool,
    /// Digital steer-right key.
    pub right: bool,
    /// Handbrake / drift key.
    pub handbrake: bool,
    /// Analog throttle in [0, 1].
    pub throttle: f32,
    /// Analog brake in [0, 1].
    pub brake: f32,
    /// Analog steering in [-1, 1].
    pub steer: f32,
}

impl InputState {
    /// Clamp analog axes into their legal ranges. Non-finite values
    /// (possible through JSON) become zero.
    pub fn sanitized(mut self) -> Self {
        self.throttle = clamp_unit(self.throttle, 0.0, 1.0);
        self.brake = clamp_unit(self.brake, 0.0, 1.0);
        self.steer = clamp_unit(self.steer, -1.0, 1.0);
        self
    }

    /// Resolved turn direction in [-1, 1].
    pub fn turn_direction(&self) -> f32 {
        if self.steer.abs() >= STEER_DEADZONE {
            return self.steer;
        }
        let mut dir = 0.0;
        if self.left {
            dir -= 1.0;
        }
        if self.right {
            dir += 1.0;
        }
        dir
    }

    /// Resolved throttle in [0, 1]; the digital key maps to full throttle.
    pub fn throttle_amount(&self) -> f32 {
        if self.throttle > 0.0 {
            self.throttle
        } else if self.up {
            1.0
        } else {
            0.0
        }
    }

    /// Resolved brake in [0, 1]; the digital key maps to full brake.
    pub fn brake_amount(&self) -> f32 {
        if self.brake > 0.0 {
            self.brake
        } else if self.down {
            1.0
        } else {
            0.0
        }
    }

    /// Whether any accelerate/brake input is held.
    pub fn wants_motion(&self) -> bool {
        self.throttle_amount() > 0.0 || self.brake_amount() > 0.0
    }

    /// Turn indicator for state broadcasts: -1, 0 or 1.
    pub fn turn_indicator(&self) -> i8 {
        if self.steer < -0.1 {
            -1
        } else if self.steer > 0.1 {
            1
        } else if self.left && !self.right {
            -1
        } else if self.right && !self.left {
            1
        } else {
            0
        }
    }
}

fn clamp_unit(value: f32, min: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.0
    }
}
