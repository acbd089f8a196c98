//! Car Performance Profiles
//!
//! Static table of named presets. Profiles are process-wide constants;
//! players only ever hold an index into this table.

use serde::Serialize;

/// A car performance preset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarProfile {
    /// Index into the profile table.
    pub id: usize,
    /// Display name.
    pub name: &'static str,
    /// Body color as a hex string.
    pub color: &'static str,
    /// Forward acceleration (units/s^2).
    pub accel: f32,
    /// Speed cap (units/s).
    pub max_speed: f32,
    /// Base grip in [0, 1]. Low grip slides more.
    pub grip: f32,
    /// Per-tick multiplicative velocity decay.
    pub drag: f32,
    /// Rolling friction magnitude (units/s^2).
    pub friction: f32,
}

const PROFILES: [CarProfile; 4] = [
    CarProfile {
        id: 0,
        name: "Apex GT",
        color: "#3B82F6",
        accel: 380.0,
        max_speed: 560.0,
        grip: 0.9,
        drag: 0.990,
        friction: 180.0,
    },
    CarProfile {
        id: 1,
        name: "Dune Viper",
        color: "#EF4444",
        accel: 440.0,
        max_speed: 600.0,
        grip: 0.75,
        drag: 0.988,
        friction: 160.0,
    },
    CarProfile {
        id: 2,
        name: "Slip Angel",
        color: "#F59E0B",
        accel: 500.0,
        max_speed: 660.0,
        grip: 0.55,
        drag: 0.985,
        friction: 140.0,
    },
    CarProfile {
        id: 3,
        name: "Boulder S",
        color: "#10B981",
        accel: 320.0,
        max_speed: 500.0,
        grip: 1.0,
        drag: 0.992,
        friction: 220.0,
    },
];

/// The full profile table.
pub fn car_profiles() -> &'static [CarProfile] {
    &PROFILES
}

/// Look up a profile, clamping unknown ids to the first preset.
pub fn profile(id: usize) -> &'static CarProfile {
    PROFILES.get(id).unwrap_or(&PROFILES[0])
}

/// Clamp a requested car id to a valid table index.
pub fn clamp_car_id(id: usize) -> usize {
    if id < PROFILES.len() {
        id
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_sane() {
        for (idx, car) in car_profiles().iter().enumerate() {
            assert_eq!(car.id, idx);
            assert!(car.accel > 0.0);
            assert!(car.max_speed > 0.0);
            assert!((0.0..=1.0).contains(&car.grip));
            assert!(car.drag > 0.9 && car.drag < 1.0);
            assert!(car.friction > 0.0);
        }
    }

    #[test]
    fn test_unknown_id_clamps_to_default() {
        assert_eq!(profile(999).id, 0);
        assert_eq!(clamp_car_id(999), 0);
        assert_eq!(clamp_car_id(2), 2);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_string(profile(0)).unwrap();
        assert!(json.contains("\"maxSpeed\""));
        assert!(json.contains("\"friction\""));
    }
}
