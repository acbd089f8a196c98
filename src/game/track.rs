//! Track Definitions and Validation
//!
//! A track is an ordered list of equal-length tile rows over the alphabet
//! `1`/`W` (wall), `.` (road), `P` (start, exactly one), `F` (finish, at
//! least one) and `C` (checkpoint, at least one). Tracks are validated once
//! and immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::core::{tile_center, tile_coords};
use crate::TILE_SIZE;

/// Minimum track width in tiles.
pub const MIN_WIDTH: usize = 16;
/// Maximum track width in tiles.
pub const MAX_WIDTH: usize = 128;
/// Minimum track height in tiles.
pub const MIN_HEIGHT: usize = 12;
/// Maximum track height in tiles.
pub const MAX_HEIGHT: usize = 96;

/// Spawn facing used when a track does not declare one.
pub const DEFAULT_SPAWN_ROTATION_DEG: f32 = 90.0;

/// Vertical nudge off the exact start-tile center, so cars do not sit on a
/// tile boundary.
const SPAWN_Y_OFFSET: f32 = 4.0;

/// One cell of the track grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    /// Impassable wall.
    Wall,
    /// Plain drivable road.
    Road,
    /// Spawn tile (drivable).
    Start,
    /// Finish line tile (drivable).
    Finish,
    /// Checkpoint tile (drivable).
    Checkpoint,
}

impl Tile {
    /// Parse a map character. Unknown characters are not drivable.
    pub fn from_char(c: char) -> Option<Tile> {
        match c {
            '1' | 'W' => Some(Tile::Wall),
            '.' => Some(Tile::Road),
            'P' => Some(Tile::Start),
            'F' => Some(Tile::Finish),
            'C' => Some(Tile::Checkpoint),
            _ => None,
        }
    }

    /// Whether a car may occupy this tile.
    #[inline]
    pub fn is_drivable(self) -> bool {
        !matches!(self, Tile::Wall)
    }
}

/// Track validation errors. Returned to the submitting client, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    /// No non-blank rows.
    #[error("Map is empty.")]
    Empty,

    /// Width below the minimum.
    #[error("Map width must be at least {MIN_WIDTH} tiles.")]
    TooNarrow,

    /// Height below the minimum.
    #[error("Map height must be at least {MIN_HEIGHT} tiles.")]
    TooShort,

    /// Exceeds the maximum dimensions.
    #[error("Map is too large. Max size is {MAX_WIDTH}x{MAX_HEIGHT}.")]
    TooLarge,

    /// Rows of differing lengths.
    #[error("All map rows must have the same width.")]
    RaggedRows,

    /// Character outside the tile alphabet.
    #[error("Invalid tile '{0}'. Use only 1, W, ., P, F, C.")]
    InvalidTile(char),

    /// Start tile count is not exactly one.
    #[error("Map must contain exactly one P start tile, found {0}.")]
    StartCount(usize),

    /// No finish tile.
    #[error("Map must contain at least one F finish tile.")]
    NoFinish,

    /// No checkpoint tile.
    #[error("Map must contain at least one C checkpoint tile.")]
    NoCheckpoint,
}

/// An immutable, validated track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Unique track id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Validated tile rows.
    pub rows: Vec<String>,
    /// Width in tiles.
    pub width_tiles: usize,
    /// Height in tiles.
    pub height_tiles: usize,
    /// Spawn facing in degrees, normalized into [0, 360).
    pub spawn_rotation_deg: f32,
}

/// Strip trailing line endings and drop blank rows.
pub fn normalize_rows<S: AsRef<str>>(rows: &[S]) -> Vec<String> {
    rows.iter()
        .map(|row| row.as_ref().trim_end_matches(['\n', '\r']).to_string())
        .filter(|row| !row.trim().is_empty())
        .collect()
}

/// Normalize a spawn rotation into [0, 360).
pub fn normalize_rotation(deg: f32) -> f32 {
    let mut rotation = if deg.is_finite() {
        deg
    } else {
        DEFAULT_SPAWN_ROTATION_DEG
    };
    rotation %= 360.0;
    if rotation < 0.0 {
        rotation += 360.0;
    }
    rotation
}

/// Validate raw rows against all track invariants.
///
/// Returns the normalized rows on success.
pub fn validate_rows<S: AsRef<str>>(rows: &[S]) -> Result<Vec<String>, TrackError> {
    let cleaned = normalize_rows(rows);
    if cleaned.is_empty() {
        return Err(TrackError::Empty);
    }

    let width = cleaned[0].chars().count();
    if width < MIN_WIDTH {
        return Err(TrackError::TooNarrow);
    }
    if cleaned.len() < MIN_HEIGHT {
        return Err(TrackError::TooShort);
    }
    if width > MAX_WIDTH || cleaned.len() > MAX_HEIGHT {
        return Err(TrackError::TooLarge);
    }

    let mut starts = 0usize;
    let mut finishes = 0usize;
    let mut checkpoints = 0usize;

    for row in &cleaned {
        if row.chars().count() != width {
            return Err(TrackError::RaggedRows);
        }
        for c in row.chars() {
            match Tile::from_char(c) {
                None => return Err(TrackError::InvalidTile(c)),
                Some(Tile::Start) => starts += 1,
                Some(Tile::Finish) => finishes += 1,
                Some(Tile::Checkpoint) => checkpoints += 1,
                Some(_) => {}
            }
        }
    }

    if starts != 1 {
        return Err(TrackError::StartCount(starts));
    }
    if finishes < 1 {
        return Err(TrackError::NoFinish);
    }
    if checkpoints < 1 {
        return Err(TrackError::NoCheckpoint);
    }

    Ok(cleaned)
}

impl Track {
    /// Build a validated track.
    pub fn new<S: AsRef<str>>(
        id: impl Into<String>,
        name: impl Into<String>,
        rows: &[S],
        spawn_rotation_deg: f32,
    ) -> Result<Track, TrackError> {
        let rows = validate_rows(rows)?;
        let width_tiles = rows[0].chars().count();
        let height_tiles = rows.len();

        Ok(Track {
            id: id.into(),
            name: name.into(),
            rows,
            width_tiles,
            height_tiles,
            spawn_rotation_deg: normalize_rotation(spawn_rotation_deg),
        })
    }

    /// Tile at a (column, row) index. Out-of-bounds indices are walls.
    pub fn tile(&self, col: i32, row: i32) -> Tile {
        if col < 0 || row < 0 {
            return Tile::Wall;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width_tiles || row >= self.height_tiles {
            return Tile::Wall;
        }
        self.rows[row]
            .chars()
            .nth(col)
            .and_then(Tile::from_char)
            .unwrap_or(Tile::Wall)
    }

    /// Tile under a world position.
    pub fn tile_at(&self, x: f32, y: f32) -> Tile {
        let (col, row) = tile_coords(x, y);
        self.tile(col, row)
    }

    /// Whether a world position is on a drivable tile.
    #[inline]
    pub fn is_road(&self, x: f32, y: f32) -> bool {
        self.tile_at(x, y).is_drivable()
    }

    /// World-space spawn point: the center of the start tile.
    ///
    /// Validation guarantees exactly one start tile exists.
    pub fn spawn_point(&self) -> (f32, f32) {
        for (row_idx, row) in self.rows.iter().enumerate() {
            if let Some(col_idx) = row.chars().position(|c| c == 'P') {
                let (x, y) = tile_center(col_idx, row_idx);
                return (x, y + SPAWN_Y_OFFSET);
            }
        }
        // Unreachable on a validated track; keep a defined fallback.
        (8.5 * TILE_SIZE, 8.5 * TILE_SIZE + SPAWN_Y_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ring_rows() -> Vec<String> {
        // 16x12 minimal ring: outer wall, 2-tile road band.
        let mut rows = vec!["1111111111111111".to_string()];
        rows.push("1....F.P.......1".to_string());
        rows.push("1..............1".to_string());
        for _ in 0..6 {
            rows.push("1..111111111...1".to_string());
        }
        rows.push("1......C.......1".to_string());
        rows.push("1..............1".to_string());
        rows.push("1111111111111111".to_string());
        rows
    }

    #[test]
    fn test_valid_track_accepted() {
        let track = Track::new("ring", "Ring", &ring_rows(), 90.0).unwrap();
        assert_eq!(track.width_tiles, 16);
        assert_eq!(track.height_tiles, 12);
        assert_eq!(track.spawn_rotation_deg, 90.0);
    }

    #[test]
    fn test_rejects_empty() {
        let rows: Vec<String> = vec!["   ".into(), "\n".into()];
        assert_eq!(validate_rows(&rows).unwrap_err(), TrackError::Empty);
    }

    #[test]
    fn test_rejects_dimensions() {
        let narrow = vec!["1P.FC1".to_string(); 12];
        assert_eq!(validate_rows(&narrow).unwrap_err(), TrackError::TooNarrow);

        let short = vec!["1111111111111111".to_string(); 4];
        assert_eq!(validate_rows(&short).unwrap_err(), TrackError::TooShort);

        let huge = vec!["1".repeat(129); 12];
        assert_eq!(validate_rows(&huge).unwrap_err(), TrackError::TooLarge);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let mut rows = ring_rows();
        rows[3].push('1');
        assert_eq!(validate_rows(&rows).unwrap_err(), TrackError::RaggedRows);
    }

    #[test]
    fn test_rejects_bad_alphabet() {
        let mut rows = ring_rows();
        rows[2].replace_range(2..3, "X");
        assert_eq!(
            validate_rows(&rows).unwrap_err(),
            TrackError::InvalidTile('X')
        );
    }

    #[test]
    fn test_rejects_wrong_start_count() {
        let mut rows = ring_rows();
        rows[2].replace_range(3..4, "P"); // second start
        assert_eq!(validate_rows(&rows).unwrap_err(), TrackError::StartCount(2));

        let mut rows = ring_rows();
        rows[1] = rows[1].replace('P', ".");
        assert_eq!(validate_rows(&rows).unwrap_err(), TrackError::StartCount(0));
    }

    #[test]
    fn test_rejects_missing_finish_and_checkpoint() {
        let mut rows = ring_rows();
        rows[1] = rows[1].replace('F', ".");
        assert_eq!(validate_rows(&rows).unwrap_err(), TrackError::NoFinish);

        let mut rows = ring_rows();
        rows[9] = rows[9].replace('C', ".");
        assert_eq!(validate_rows(&rows).unwrap_err(), TrackError::NoCheckpoint);
    }

    #[test]
    fn test_out_of_bounds_is_wall() {
        let track = Track::new("ring", "Ring", &ring_rows(), 90.0).unwrap();
        assert_eq!(track.tile_at(-1.0, 5.0), Tile::Wall);
        assert_eq!(track.tile_at(5.0, -1.0), Tile::Wall);
        assert_eq!(track.tile_at(10_000.0, 5.0), Tile::Wall);
        assert!(!track.is_road(-0.01, -0.01));
    }

    #[test]
    fn test_spawn_point_is_start_tile_center() {
        let track = Track::new("ring", "Ring", &ring_rows(), 90.0).unwrap();
        let (x, y) = track.spawn_point();
        assert_eq!(track.tile_at(x, y), Tile::Start);
        // col 7, row 1 of the fixture
        assert_eq!((x, y), (7.5 * TILE_SIZE, 1.5 * TILE_SIZE + 4.0));
    }

    #[test]
    fn test_rotation_normalization() {
        assert_eq!(normalize_rotation(-90.0), 270.0);
        assert_eq!(normalize_rotation(450.0), 90.0);
        assert_eq!(normalize_rotation(0.0), 0.0);
        assert_eq!(normalize_rotation(f32::NAN), DEFAULT_SPAWN_ROTATION_DEG);
    }

    proptest! {
        /// validate accepts iff the invariants hold: generated grids with a
        /// single start, at least one finish/checkpoint and legal dimensions
        /// always pass; removing the start always fails.
        #[test]
        fn prop_validate_matches_invariants(
            width in MIN_WIDTH..40usize,
            height in MIN_HEIGHT..30usize,
            p_col in 1usize..10,
            f_col in 11usize..14,
        ) {
            let mut rows: Vec<String> = (0..height)
                .map(|_| ".".repeat(width))
                .collect();
            rows[1].replace_range(p_col..p_col + 1, "P");
            rows[2].replace_range(f_col..f_col + 1, "F");
            rows[3].replace_range(1..2, "C");

            prop_assert!(validate_rows(&rows).is_ok());

            let mut no_start = rows.clone();
            no_start[1] = no_start[1].replace('P', ".");
            prop_assert_eq!(
                validate_rows(&no_start).unwrap_err(),
                TrackError::StartCount(0)
            );
        }
    }
}
