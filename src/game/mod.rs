//! Authoritative race simulation: cars, tracks, physics and the per-room
//! state machine. Everything here is synchronous and deterministic; the
//! network layer drives it from the tick loop.

pub mod cars;
pub mod input;
pub mod physics;
pub mod state;
pub mod tick;
pub mod track;

pub use cars::{car_profiles, CarProfile};
pub use input::InputState;
pub use state::{Player, PlayerId, RaceError, RaceState, RoomPhase};
pub use tick::{run_tick, TickResult};
pub use track::{Track, TrackError};
