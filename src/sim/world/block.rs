use serde::{Deserialize, Serialize};

use crate::sim::math::{FixedNum, FixedVec2};
use crate::sim::world::tile::Tile;

/// Index into `TorusMap::blocks`. Assigned densely in BSP leaf order, so it
/// doubles as an index into the per-block tables in `BodyIndex`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Axis-aligned tile rectangle, `[x, x + w) x [y, y + h)` in global tile
/// coordinates. Rects never straddle the wrap seam; the BSP split keeps every
/// rect inside `[0, world) ` on both axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl TileRect {
    pub fn contains(&self, tx: u32, ty: u32) -> bool {
        tx >= self.x && tx < self.x + self.w && ty >= self.y && ty < self.y + self.h
    }

    pub fn area(&self) -> u32 {
        self.w * self.h
    }

    /// World-space corner points, counter-clockwise from the min corner.
    pub fn corners(&self) -> [(u32, u32); 4] {
        [
            (self.x, self.y),
            (self.x + self.w, self.y),
            (self.x + self.w, self.y + self.h),
            (self.x, self.y + self.h),
        ]
    }

    pub fn center(&self) -> FixedVec2 {
        FixedVec2::new(
            FixedNum::from_num(self.x) + FixedNum::from_num(self.w) / 2,
            FixedNum::from_num(self.y) + FixedNum::from_num(self.h) / 2,
        )
    }
}

/// One BSP leaf worth of immutable tile data.
///
/// Blocks own only frozen geometry. Entity membership, the static-solid
/// overlay, and the enclosedness flag are per-tick mutable state and live in
/// `BodyIndex`, keyed by `BlockId`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub rect: TileRect,
    /// Row-major, `rect.w * rect.h` entries, local coordinates.
    tiles: Vec<Tile>,
}

impl Block {
    pub fn new(id: BlockId, rect: TileRect, tiles: Vec<Tile>) -> Self {
        debug_assert_eq!(tiles.len(), rect.area() as usize);
        Self { id, rect, tiles }
    }

    /// Local tile index for a global tile coordinate inside this block.
    pub fn local_index(&self, tx: u32, ty: u32) -> usize {
        debug_assert!(self.rect.contains(tx, ty));
        ((ty - self.rect.y) * self.rect.w + (tx - self.rect.x)) as usize
    }

    pub fn tile(&self, tx: u32, ty: u32) -> &Tile {
        &self.tiles[self.local_index(tx, ty)]
    }

    /// World-space midpoints of the four boundary edges, in `Face::ALL` order
    /// (north, east, south, west). Used as escape probes when deciding whether
    /// a block is enclosed.
    pub fn boundary_midpoints(&self) -> [FixedVec2; 4] {
        let half = FixedNum::from_num(1) / 2;
        let mid_x = FixedNum::from_num(self.rect.x) + FixedNum::from_num(self.rect.w) / 2;
        let mid_y = FixedNum::from_num(self.rect.y) + FixedNum::from_num(self.rect.h) / 2;
        [
            FixedVec2::new(
                mid_x,
                FixedNum::from_num(self.rect.y + self.rect.h - 1) + half,
            ),
            FixedVec2::new(
                FixedNum::from_num(self.rect.x + self.rect.w - 1) + half,
                mid_y,
            ),
            FixedVec2::new(mid_x, FixedNum::from_num(self.rect.y) + half),
            FixedVec2::new(FixedNum::from_num(self.rect.x) + half, mid_y),
        ]
    }
}
