//! # Slipstream Server
//!
//! An authoritative multiplayer racing server. Clients connect over
//! WebSocket, join a room, and stream control inputs; each room runs a
//! fixed-rate simulation task that integrates drift physics, resolves
//! collisions, tracks laps, and broadcasts the authoritative state back to
//! every client. Race results persist to JSON leaderboards on disk.
//!
//! ## Architecture
//!
//! ```text
//! src/
//!   core/       vectors and tile-grid indexing
//!   game/       cars, tracks, inputs, physics, lap rules, tick step
//!   store/      leaderboard and track-catalog persistence
//!   network/    wire protocol, rooms, WebSocket server
//! ```
//!
//! The simulation (`core`, `game`) is synchronous and deterministic: all
//! timing arrives as explicit parameters. The `network` layer owns the
//! tokio runtime concerns and drives the simulation from per-room tick
//! loops.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

pub use game::{RaceState, RoomPhase};
pub use network::{RaceServer, ServerConfig};

/// Crate version, from Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation rate in ticks per second.
pub const TICK_RATE: u32 = 60;

/// World units per map tile.
pub const TILE_SIZE: f32 = 32.0;

/// Car body radius for car-vs-car collisions.
pub const CAR_COLLISION_RADIUS: f32 = 12.0;
