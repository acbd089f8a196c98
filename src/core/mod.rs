//! Core primitives shared by the simulation and the network layer.

pub mod grid;
pub mod vec2;

pub use grid::{tile_center, tile_coords, tile_index};
pub use vec2::Vec2;
