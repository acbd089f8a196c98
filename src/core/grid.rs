//! Tile Grid Indexing
//!
//! World-space to tile-space conversion. Indexing uses floor division so
//! that negative world coordinates map to negative tile indices instead of
//! truncating toward zero and aliasing onto tile 0.

use crate::TILE_SIZE;

/// Convert one world coordinate to a tile index (floor division).
#[inline]
pub fn tile_index(coord: f32) -> i32 {
    (coord / TILE_SIZE).floor() as i32
}

/// Convert a world position to (column, row) tile coordinates.
#[inline]
pub fn tile_coords(x: f32, y: f32) -> (i32, i32) {
    (tile_index(x), tile_index(y))
}

/// World-space center of a tile.
#[inline]
pub fn tile_center(col: usize, row: usize) -> (f32, f32) {
    (
        (col as f32 + 0.5) * TILE_SIZE,
        (row as f32 + 0.5) * TILE_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_index_in_bounds() {
        assert_eq!(tile_index(0.0), 0);
        assert_eq!(tile_index(TILE_SIZE - 0.01), 0);
        assert_eq!(tile_index(TILE_SIZE), 1);
        assert_eq!(tile_index(TILE_SIZE * 4.0 + 1.0), 4);
    }

    #[test]
    fn test_tile_index_negative_coordinates() {
        // Truncation would give 0 here; floor must give -1.
        assert_eq!(tile_index(-0.01), -1);
        assert_eq!(tile_index(-TILE_SIZE), -1);
        assert_eq!(tile_index(-TILE_SIZE - 0.01), -2);
    }

    #[test]
    fn test_tile_center_roundtrip() {
        let (x, y) = tile_center(3, 7);
        assert_eq!(tile_coords(x, y), (3, 7));
    }
}
