//! File-backed persistence: leaderboards and the track catalog.

pub mod leaderboard;
pub mod tracks;

pub use leaderboard::{LeaderboardEntry, LeaderboardStore};
pub use tracks::{TrackCatalog, TrackSummary, CUSTOM_TRACK_ID};
