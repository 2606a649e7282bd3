use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sim::config::WorldConfig;
use crate::sim::world::tile::{Face, Tile, BASE_LEVEL};
use crate::sim::world::{TorusMap, WorldBuilder};

/// Seeded demo world: raised building footprints scattered over the grid plus
/// a few wall runs with door gaps. Deterministic for a given seed; the same
/// config always produces the same map.
pub fn generate(config: &WorldConfig) -> TorusMap {
    let width = config.world_width;
    let height = config.world_height;
    let mut rng = StdRng::seed_from_u64(config.world_seed);
    let mut builder = WorldBuilder::new(width, height, config.block_size);

    let buildings = (width * height) / 128;
    let mut placed = 0u32;
    for _ in 0..buildings * 4 {
        if placed >= buildings {
            break;
        }
        let w = rng.random_range(2..=5u32);
        let h = rng.random_range(2..=5u32);
        let x = rng.random_range(0..width);
        let y = rng.random_range(0..height);
        if !footprint_clear(&builder, width, height, x, y, w, h) {
            continue;
        }
        let floor = rng.random_range(1..=4i16);
        for dy in 0..h {
            for dx in 0..w {
                builder.set_tile((x + dx) % width, (y + dy) % height, Tile::raised(floor));
            }
        }
        placed += 1;
    }

    let wall_runs = (width + height) / 16;
    for _ in 0..wall_runs {
        let len = rng.random_range(4..=12u32);
        let gap = rng.random_range(0..len);
        let x = rng.random_range(0..width);
        let y = rng.random_range(0..height);
        let face = if rng.random_bool(0.5) {
            Face::North
        } else {
            Face::East
        };
        for i in 0..len {
            if i == gap {
                continue;
            }
            let (tx, ty) = match face {
                Face::North | Face::South => ((x + i) % width, y),
                Face::East | Face::West => (x, (y + i) % height),
            };
            if !builder.tile_mut(tx, ty).is_raised() {
                builder.add_wall(tx, ty, face, BASE_LEVEL);
            }
        }
    }

    info!(
        "[WORLDGEN] seed {} placed {} buildings, {} wall runs",
        config.world_seed, placed, wall_runs
    );
    builder.build()
}

/// True when the candidate footprint plus a one-tile border is still open,
/// which keeps buildings from merging into sealed mazes.
fn footprint_clear(
    builder: &WorldBuilder,
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
) -> bool {
    for dy in -1..=(h as i64) {
        for dx in -1..=(w as i64) {
            let tx = (x as i64 + dx).rem_euclid(width as i64) as u32;
            let ty = (y as i64 + dy).rem_euclid(height as i64) as u32;
            if builder.tile_at(tx, ty).is_raised() {
                return false;
            }
        }
    }
    true
}
