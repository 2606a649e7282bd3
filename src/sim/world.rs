use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::sim::math::{wrap_coord, wrap_delta, FixedNum, FixedVec2};

pub mod block;
pub mod bodies;
pub mod district;
pub mod gen;
pub mod intersect;
pub mod tile;

use block::{Block, BlockId, TileRect};
use bodies::BodyIndex;
use district::{build_district, District};
use intersect::{Intersection, IntersectionId};
use tile::{Face, Tile, BASE_LEVEL};

/// Frozen world geometry: the tile grid, the district BSP over it, the block
/// list, and the intersection graph. Built once, then shared immutably by
/// tracing, collision, and routing. All mutable spatial state lives in
/// [`BodyIndex`].
///
/// Both axes wrap. Every public query accepts unwrapped inputs and normalizes
/// them, so callers never reason about the seam.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TorusMap {
    width: u32,
    height: u32,
    size: FixedVec2,
    blocks: Vec<Block>,
    district: District,
    intersections: Vec<Intersection>,
    block_corners: Vec<SmallVec<[IntersectionId; 4]>>,
}

impl TorusMap {
    /// An all-open world, the starting point for tests and the builder.
    pub fn open(width: u32, height: u32, block_size: u32) -> Self {
        WorldBuilder::new(width, height, block_size).build()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> FixedVec2 {
        self.size
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn district(&self) -> &District {
        &self.district
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    pub fn intersection(&self, id: IntersectionId) -> &Intersection {
        &self.intersections[id.0 as usize]
    }

    pub fn block_corners(&self, block: BlockId) -> &[IntersectionId] {
        &self.block_corners[block.0 as usize]
    }

    /// Wrap a world position into `[0, width) x [0, height)`.
    pub fn wrap(&self, pos: FixedVec2) -> FixedVec2 {
        FixedVec2::new(wrap_coord(pos.x, self.size.x), wrap_coord(pos.y, self.size.y))
    }

    /// Shortest delta from `a` to `b`, per axis, around the torus.
    pub fn difference(&self, a: FixedVec2, b: FixedVec2) -> FixedVec2 {
        FixedVec2::new(
            wrap_delta(a.x, b.x, self.size.x),
            wrap_delta(a.y, b.y, self.size.y),
        )
    }

    pub fn wrapped_distance_sq(&self, a: FixedVec2, b: FixedVec2) -> FixedNum {
        self.difference(a, b).length_squared()
    }

    /// Wrap signed tile coordinates into grid range.
    pub fn wrap_tile(&self, tx: i64, ty: i64) -> (u32, u32) {
        (
            tx.rem_euclid(self.width as i64) as u32,
            ty.rem_euclid(self.height as i64) as u32,
        )
    }

    /// Tile containing a world position.
    pub fn tile_coords(&self, pos: FixedVec2) -> (u32, u32) {
        let pos = self.wrap(pos);
        (
            pos.x.floor().to_num::<i64>() as u32,
            pos.y.floor().to_num::<i64>() as u32,
        )
    }

    pub fn tile_center(&self, tx: u32, ty: u32) -> FixedVec2 {
        let half = FixedNum::from_num(1) / 2;
        FixedVec2::new(
            FixedNum::from_num(tx) + half,
            FixedNum::from_num(ty) + half,
        )
    }

    pub fn block_at(&self, tx: u32, ty: u32) -> BlockId {
        self.district.locate(tx, ty)
    }

    pub fn block_at_pos(&self, pos: FixedVec2) -> BlockId {
        let (tx, ty) = self.tile_coords(pos);
        self.block_at(tx, ty)
    }

    pub fn tile(&self, tx: u32, ty: u32) -> &Tile {
        self.block(self.block_at(tx, ty)).tile(tx, ty)
    }

    /// A tile is solid when raised or covered by a static blocking body.
    pub fn is_solid(&self, bodies: &BodyIndex, tx: u32, ty: u32) -> bool {
        self.tile(tx, ty).is_raised() || bodies.is_static_solid(self, tx, ty)
    }

    /// Whether crossing out of tile `(tx, ty)` through `face` is blocked:
    /// either side may carry a ground-level wall on the shared edge, or the
    /// neighbor tile may be solid.
    pub fn is_wall_solid(&self, bodies: &BodyIndex, tx: u32, ty: u32, face: Face) -> bool {
        let (dx, dy) = face.delta();
        let (nx, ny) = self.wrap_tile(tx as i64 + dx, ty as i64 + dy);
        self.is_solid(bodies, nx, ny)
            || self.tile(tx, ty).has_wall(face, BASE_LEVEL)
            || self.tile(nx, ny).has_wall(face.opposite(), BASE_LEVEL)
    }

    /// Corner intersection of `block` nearest to `pos` by wrapped distance.
    pub fn nearest_corner(&self, block: BlockId, pos: FixedVec2) -> IntersectionId {
        let corners = self.block_corners(block);
        debug_assert!(!corners.is_empty());
        let mut best = corners[0];
        let mut best_dist = self.wrapped_distance_sq(pos, self.intersection(best).pos);
        for &id in &corners[1..] {
            let dist = self.wrapped_distance_sq(pos, self.intersection(id).pos);
            if dist < best_dist {
                best = id;
                best_dist = dist;
            }
        }
        best
    }
}

/// Mutable tile editing surface used before the world is frozen.
pub struct WorldBuilder {
    width: u32,
    height: u32,
    block_size: u32,
    tiles: Vec<Tile>,
}

impl WorldBuilder {
    pub fn new(width: u32, height: u32, block_size: u32) -> Self {
        assert!(width > 0 && height > 0 && block_size > 0);
        Self {
            width,
            height,
            block_size,
            tiles: vec![Tile::open(); (width * height) as usize],
        }
    }

    fn index(&self, tx: u32, ty: u32) -> usize {
        debug_assert!(tx < self.width && ty < self.height);
        (ty * self.width + tx) as usize
    }

    pub fn set_tile(&mut self, tx: u32, ty: u32, tile: Tile) {
        let index = self.index(tx, ty);
        self.tiles[index] = tile;
    }

    pub fn tile_at(&self, tx: u32, ty: u32) -> &Tile {
        &self.tiles[self.index(tx, ty)]
    }

    pub fn tile_mut(&mut self, tx: u32, ty: u32) -> &mut Tile {
        let index = self.index(tx, ty);
        &mut self.tiles[index]
    }

    pub fn add_wall(&mut self, tx: u32, ty: u32, face: Face, level: u8) {
        let index = self.index(tx, ty);
        self.tiles[index] = self.tiles[index].with_wall(face, level);
    }

    pub fn build(self) -> TorusMap {
        let mut blocks = Vec::new();
        let district = build_district(
            TileRect {
                x: 0,
                y: 0,
                w: self.width,
                h: self.height,
            },
            self.block_size,
            |rect| {
                let id = BlockId(blocks.len() as u32);
                let mut tiles = Vec::with_capacity(rect.area() as usize);
                for ty in rect.y..rect.y + rect.h {
                    for tx in rect.x..rect.x + rect.w {
                        tiles.push(self.tiles[(ty * self.width + tx) as usize]);
                    }
                }
                blocks.push(Block::new(id, rect, tiles));
                id
            },
        );
        let rects: Vec<TileRect> = blocks.iter().map(|b| b.rect).collect();
        let (intersections, block_corners) =
            intersect::build_graph(&rects, self.width, self.height);
        info!(
            "[WORLD] built {}x{} map: {} blocks, {} intersections",
            self.width,
            self.height,
            blocks.len(),
            intersections.len()
        );
        TorusMap {
            width: self.width,
            height: self.height,
            size: FixedVec2::new(
                FixedNum::from_num(self.width),
                FixedNum::from_num(self.height),
            ),
            blocks,
            district,
            intersections,
            block_corners,
        }
    }
}

/// Recompute the enclosedness flag for one block: sample walkable tiles and
/// micro-route each toward the block's boundary midpoints, nearest first.
/// The block counts as enclosed when no sample reaches any midpoint.
///
/// Probabilistic by design: sampling can miss an open pocket and report a
/// false negative. The flag is only recomputed on invalidation, never per
/// tick.
pub fn recompute_block_enclosure(
    map: &TorusMap,
    bodies: &mut BodyIndex,
    block_id: BlockId,
    samples: u32,
    seed: u64,
) {
    let block = map.block(block_id);
    let rect = block.rect;
    let mut walkable = Vec::new();
    for ty in rect.y..rect.y + rect.h {
        for tx in rect.x..rect.x + rect.w {
            if !map.is_solid(bodies, tx, ty) {
                walkable.push((tx, ty));
            }
        }
    }
    if walkable.is_empty() {
        bodies.set_enclosed(block_id, true);
        return;
    }

    let mut rng =
        StdRng::seed_from_u64(seed ^ (block_id.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    walkable.shuffle(&mut rng);
    walkable.truncate(samples.max(1) as usize);

    let midpoints: Vec<(u32, u32)> = block
        .boundary_midpoints()
        .iter()
        .map(|&point| map.tile_coords(point))
        .collect();

    let escaped = walkable.iter().any(|&sample| {
        let center = map.tile_center(sample.0, sample.1);
        let mut targets = midpoints.clone();
        targets.sort_by_key(|&(tx, ty)| {
            map.wrapped_distance_sq(center, map.tile_center(tx, ty))
        });
        targets
            .iter()
            .any(|&goal| crate::sim::routing::local::micro_route(map, bodies, block_id, sample, goal).is_some())
    });

    if !escaped {
        info!("[WORLD] block {:?} is now enclosed", block_id);
    }
    bodies.set_enclosed(block_id, !escaped);
}
