use serde::{Deserialize, Serialize};

/// Compass face of a tile. Ordering matters: several sweep loops iterate
/// `Face::ALL` and tests rely on the deterministic order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    North,
    East,
    South,
    West,
}

impl Face {
    pub const ALL: [Face; 4] = [Face::North, Face::East, Face::South, Face::West];

    /// Tile-space delta toward the neighbor across this face.
    pub fn delta(self) -> (i64, i64) {
        match self {
            Face::North => (0, 1),
            Face::East => (1, 0),
            Face::South => (0, -1),
            Face::West => (-1, 0),
        }
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::North => Face::South,
            Face::East => Face::West,
            Face::South => Face::North,
            Face::West => Face::East,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Face::North => 0,
            Face::East => 1,
            Face::South => 2,
            Face::West => 3,
        }
    }
}

/// Number of vertical wall levels a tile face can carry.
pub const WALL_LEVELS: u8 = 8;

/// Ground-level wall slot, the one that gates movement.
pub const BASE_LEVEL: u8 = 0;

/// Immutable per-cell record built from the content collaborator's tile data.
///
/// A tile carries floor and roof heights plus per-face wall presence at each
/// vertical level (one bit per level). Tiles never change after world build;
/// dynamic solidity (blocking entities parked on a tile) lives in the mutable
/// per-block overlay, not here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub floor_height: i16,
    pub roof_height: i16,
    /// Downhill direction of a slanted roof, if any. Irrelevant to movement,
    /// carried through for the rendering collaborator.
    pub roof_slant: Option<Face>,
    /// Per-face bitmask of wall levels, indexed by `Face::index()`.
    pub walls: [u8; 4],
}

impl Tile {
    /// A flat, open, wall-less tile.
    pub fn open() -> Self {
        Self::default()
    }

    /// A raised tile. Any positive floor height makes the tile solid.
    pub fn raised(floor_height: i16) -> Self {
        Self {
            floor_height,
            ..Self::default()
        }
    }

    pub fn with_wall(mut self, face: Face, level: u8) -> Self {
        debug_assert!(level < WALL_LEVELS);
        self.walls[face.index()] |= 1 << level;
        self
    }

    pub fn has_wall(&self, face: Face, level: u8) -> bool {
        debug_assert!(level < WALL_LEVELS);
        self.walls[face.index()] & (1 << level) != 0
    }

    /// Raised tiles are solid regardless of entity content.
    pub fn is_raised(&self) -> bool {
        self.floor_height > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_tile_has_no_walls_and_is_not_raised() {
        let tile = Tile::open();
        assert!(!tile.is_raised());
        for face in Face::ALL {
            assert!(!tile.has_wall(face, BASE_LEVEL));
        }
    }

    #[test]
    fn wall_levels_are_independent() {
        let tile = Tile::open().with_wall(Face::East, 2);
        assert!(tile.has_wall(Face::East, 2));
        assert!(!tile.has_wall(Face::East, BASE_LEVEL));
        assert!(!tile.has_wall(Face::West, 2));
    }

    #[test]
    fn face_opposites_are_involutions() {
        for face in Face::ALL {
            assert_eq!(face.opposite().opposite(), face);
            let (dx, dy) = face.delta();
            let (ox, oy) = face.opposite().delta();
            assert_eq!((dx, dy), (-ox, -oy));
        }
    }
}
