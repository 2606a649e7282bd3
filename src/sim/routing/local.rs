use bevy::prelude::*;
use std::collections::{BTreeMap, BinaryHeap};

use crate::sim::math::FixedNum;
use crate::sim::world::block::BlockId;
use crate::sim::world::bodies::BodyIndex;
use crate::sim::world::tile::Face;
use crate::sim::world::TorusMap;

/// Cap on A* pops. A single block is at most a few hundred tiles, so hitting
/// this means corrupted input, not a hard map.
const MAX_ITERATIONS: usize = 10_000;

#[derive(Clone, Copy, PartialEq, Eq)]
struct State {
    cost: FixedNum,
    tile: (u32, u32),
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the BinaryHeap pops the cheapest state first.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| self.tile.cmp(&other.tile))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over the tiles of one block, 4-connected, gated on wall-solid
/// crossings. Returns the tile sequence from `start` to `goal` inclusive, or
/// None when the goal is solid or unreachable within the block.
///
/// Blocks never straddle the wrap seam, so the search works in plain rect
/// coordinates; only the crossing checks consult the wrapped map.
pub fn micro_route(
    map: &TorusMap,
    bodies: &BodyIndex,
    block: BlockId,
    start: (u32, u32),
    goal: (u32, u32),
) -> Option<Vec<(u32, u32)>> {
    search(map, bodies, block, start, goal, |_| {})
}

/// Search core. `on_expand` sees the priority of every popped state, in pop
/// order, which is what the expansion tests observe.
fn search(
    map: &TorusMap,
    bodies: &BodyIndex,
    block: BlockId,
    start: (u32, u32),
    goal: (u32, u32),
    mut on_expand: impl FnMut(FixedNum),
) -> Option<Vec<(u32, u32)>> {
    let rect = map.block(block).rect;
    debug_assert!(rect.contains(start.0, start.1));
    debug_assert!(rect.contains(goal.0, goal.1));
    if map.is_solid(bodies, goal.0, goal.1) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let goal_center = map.tile_center(goal.0, goal.1);
    let heuristic = |tile: (u32, u32)| {
        map.difference(map.tile_center(tile.0, tile.1), goal_center)
            .length()
    };

    let mut heap = BinaryHeap::new();
    let mut g_score: BTreeMap<(u32, u32), FixedNum> = BTreeMap::new();
    let mut came_from: BTreeMap<(u32, u32), (u32, u32)> = BTreeMap::new();

    g_score.insert(start, FixedNum::ZERO);
    heap.push(State {
        cost: heuristic(start),
        tile: start,
    });

    let step = FixedNum::from_num(1);
    let mut iterations = 0;
    while let Some(State { cost, tile }) = heap.pop() {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            error!(
                "[ROUTE] micro search in block {:?} exceeded {} iterations",
                block, MAX_ITERATIONS
            );
            return None;
        }
        on_expand(cost);
        if tile == goal {
            let mut path = vec![tile];
            let mut current = tile;
            while let Some(&prev) = came_from.get(&current) {
                path.push(prev);
                current = prev;
            }
            path.reverse();
            return Some(path);
        }

        let current_g = g_score[&tile];
        for face in Face::ALL {
            if map.is_wall_solid(bodies, tile.0, tile.1, face) {
                continue;
            }
            let (dx, dy) = face.delta();
            let (nx, ny) = map.wrap_tile(tile.0 as i64 + dx, tile.1 as i64 + dy);
            if !rect.contains(nx, ny) {
                continue;
            }
            let next = (nx, ny);
            let tentative = current_g + step;
            if g_score.get(&next).is_none_or(|&g| tentative < g) {
                g_score.insert(next, tentative);
                came_from.insert(next, tile);
                heap.push(State {
                    cost: tentative + heuristic(next),
                    tile: next,
                });
            }
        }
    }
    None
}
