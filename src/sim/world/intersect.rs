use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::sim::math::{FixedNum, FixedVec2};
use crate::sim::world::block::TileRect;

/// Index into `TorusMap::intersections`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntersectionId(pub u32);

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IntersectionEdge {
    pub to: IntersectionId,
    /// Straight-line wrapped distance between the two nodes.
    pub cost: FixedNum,
}

/// Node of the macro routing graph: a deduplicated block corner with edges to
/// the nearest node along each cardinal direction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intersection {
    pub id: IntersectionId,
    pub pos: FixedVec2,
    pub edges: SmallVec<[IntersectionEdge; 4]>,
}

/// Build the intersection graph from the leaf rects. Corners on the wrap seam
/// fold back to zero, so opposite world edges share nodes. Edges are created
/// by linking ring-sorted neighbors per row and per column, which makes every
/// edge reciprocal by construction.
pub fn build_graph(
    rects: &[TileRect],
    width: u32,
    height: u32,
) -> (Vec<Intersection>, Vec<SmallVec<[IntersectionId; 4]>>) {
    let mut ids: FxHashMap<(u32, u32), IntersectionId> = FxHashMap::default();
    let mut nodes: Vec<Intersection> = Vec::new();
    let mut block_corners: Vec<SmallVec<[IntersectionId; 4]>> = Vec::with_capacity(rects.len());

    for rect in rects {
        let mut corners: SmallVec<[IntersectionId; 4]> = SmallVec::new();
        for (cx, cy) in rect.corners() {
            let key = (cx % width, cy % height);
            let id = *ids.entry(key).or_insert_with(|| {
                let id = IntersectionId(nodes.len() as u32);
                nodes.push(Intersection {
                    id,
                    pos: FixedVec2::new(FixedNum::from_num(key.0), FixedNum::from_num(key.1)),
                    edges: SmallVec::new(),
                });
                id
            });
            if !corners.contains(&id) {
                corners.push(id);
            }
        }
        block_corners.push(corners);
    }

    link_rings(&mut nodes, width, |pos| (pos.1, pos.0));
    link_rings(&mut nodes, height, |pos| (pos.0, pos.1));

    (nodes, block_corners)
}

/// Link every node to its ring neighbors along one axis. `group_sort` maps a
/// node position to (group key, in-group coordinate).
fn link_rings(
    nodes: &mut [Intersection],
    axis_size: u32,
    group_sort: impl Fn((u32, u32)) -> (u32, u32),
) {
    let mut groups: FxHashMap<u32, Vec<(u32, usize)>> = FxHashMap::default();
    for (index, node) in nodes.iter().enumerate() {
        let pos = (
            node.pos.x.to_num::<i64>() as u32,
            node.pos.y.to_num::<i64>() as u32,
        );
        let (group, coord) = group_sort(pos);
        groups.entry(group).or_default().push((coord, index));
    }
    let size = FixedNum::from_num(axis_size);
    for ring in groups.values_mut() {
        if ring.len() < 2 {
            continue;
        }
        ring.sort_unstable();
        // A two-node ring would otherwise get the same pair linked twice.
        let links = if ring.len() == 2 { 1 } else { ring.len() };
        for i in 0..links {
            let (coord, index) = ring[i];
            let (next_coord, next_index) = ring[(i + 1) % ring.len()];
            let gap = if next_coord > coord {
                FixedNum::from_num(next_coord - coord)
            } else {
                size - FixedNum::from_num(coord - next_coord)
            };
            let (a, b) = (index, next_index);
            nodes[a].edges.push(IntersectionEdge {
                to: nodes[b].id,
                cost: gap,
            });
            nodes[b].edges.push(IntersectionEdge {
                to: nodes[a].id,
                cost: gap,
            });
        }
    }
}
