//! WebSocket transport: wire protocol, rooms with their tick tasks, and
//! the accept loop.

pub mod protocol;
pub mod room;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage};
pub use room::{Room, RoomManager};
pub use server::{RaceServer, ServerConfig, ServerError};
