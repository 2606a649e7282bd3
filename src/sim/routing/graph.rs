use bevy::prelude::*;
use std::collections::{BTreeMap, BinaryHeap};

use crate::sim::math::FixedNum;
use crate::sim::world::intersect::IntersectionId;
use crate::sim::world::TorusMap;

/// Cap on A* pops over the intersection graph.
const MAX_ITERATIONS: usize = 100_000;

#[derive(Clone, Copy, PartialEq, Eq)]
struct State {
    cost: FixedNum,
    node: IntersectionId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over the intersection graph. There is no closed set: a node whose g
/// score improves is simply pushed again, and stale heap entries are skipped
/// on pop. Returns the node sequence from `from` to `to` inclusive.
pub fn macro_route(
    map: &TorusMap,
    from: IntersectionId,
    to: IntersectionId,
) -> Option<Vec<IntersectionId>> {
    search(map, from, to, |_| {})
}

/// Search core. `on_expand` sees the priority of every popped state, in pop
/// order, which is what the expansion tests observe.
fn search(
    map: &TorusMap,
    from: IntersectionId,
    to: IntersectionId,
    mut on_expand: impl FnMut(FixedNum),
) -> Option<Vec<IntersectionId>> {
    if from == to {
        return Some(vec![from]);
    }

    let goal_pos = map.intersection(to).pos;
    let heuristic =
        |node: IntersectionId| map.difference(map.intersection(node).pos, goal_pos).length();

    let mut heap = BinaryHeap::new();
    let mut g_score: BTreeMap<IntersectionId, FixedNum> = BTreeMap::new();
    let mut came_from: BTreeMap<IntersectionId, IntersectionId> = BTreeMap::new();

    g_score.insert(from, FixedNum::ZERO);
    heap.push(State {
        cost: heuristic(from),
        node: from,
    });

    let mut iterations = 0;
    while let Some(State { cost, node }) = heap.pop() {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            error!(
                "[ROUTE] macro search exceeded {} iterations ({:?} -> {:?})",
                MAX_ITERATIONS, from, to
            );
            return None;
        }
        on_expand(cost);
        let current_g = g_score[&node];
        // Stale entry from a later improvement.
        if cost > current_g + heuristic(node) {
            continue;
        }
        if node == to {
            let mut path = vec![node];
            let mut current = node;
            while let Some(&prev) = came_from.get(&current) {
                path.push(prev);
                current = prev;
            }
            path.reverse();
            return Some(path);
        }

        for edge in &map.intersection(node).edges {
            let tentative = current_g + edge.cost;
            if g_score.get(&edge.to).is_none_or(|&g| tentative < g) {
                g_score.insert(edge.to, tentative);
                came_from.insert(edge.to, node);
                heap.push(State {
                    cost: tentative + heuristic(edge.to),
                    node: edge.to,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::math::FixedVec2;

    #[test]
    fn route_between_adjacent_corners_is_direct() {
        let map = TorusMap::open(64, 64, 16);
        let from = map.nearest_corner(map.block_at(2, 2), FixedVec2::ZERO);
        let goal_pos = FixedVec2::new(FixedNum::from_num(16), FixedNum::ZERO);
        let to = map.nearest_corner(map.block_at(18, 2), goal_pos);
        assert_ne!(from, to);
        let path = macro_route(&map, from, to).expect("route");
        assert_eq!(path.first(), Some(&from));
        assert_eq!(path.last(), Some(&to));
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn path_costs_are_non_decreasing() {
        let map = TorusMap::open(64, 64, 16);
        let from = map.nearest_corner(map.block_at(2, 2), FixedVec2::ZERO);
        let far = FixedVec2::new(FixedNum::from_num(32), FixedNum::from_num(32));
        let to = map.nearest_corner(map.block_at(34, 34), far);
        let path = macro_route(&map, from, to).expect("route");
        assert!(path.len() >= 2);
        // Every hop must be a real graph edge.
        for pair in path.windows(2) {
            let node = map.intersection(pair[0]);
            assert!(node.edges.iter().any(|e| e.to == pair[1]));
        }
    }

    #[test]
    fn expansion_costs_never_decrease() {
        let map = TorusMap::open(64, 64, 16);
        let from = map.nearest_corner(map.block_at(2, 2), FixedVec2::ZERO);
        let far = FixedVec2::new(FixedNum::from_num(32), FixedNum::from_num(32));
        let to = map.nearest_corner(map.block_at(34, 34), far);
        let mut expanded = Vec::new();
        let path = search(&map, from, to, |cost| expanded.push(cost)).expect("route");
        assert_eq!(path.last(), Some(&to));
        assert!(expanded.len() >= path.len());
        for pair in expanded.windows(2) {
            assert!(
                pair[1] >= pair[0],
                "expansion cost dropped from {} to {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn macro_route_prefers_the_wrapped_side() {
        let map = TorusMap::open(64, 64, 16);
        let from = map.nearest_corner(map.block_at(2, 2), FixedVec2::ZERO);
        let near_seam = FixedVec2::new(FixedNum::from_num(48), FixedNum::ZERO);
        let to = map.nearest_corner(map.block_at(50, 2), near_seam);
        let path = macro_route(&map, from, to).expect("route");
        // 0 -> 48 the long way is three hops; through the seam it is one.
        assert_eq!(path.len(), 2);
    }
}
