use crate::sim::math::{FixedNum, FixedVec2};
use crate::sim::routing::{graph, local};
use crate::sim::trace::{trace_clear, TraceOptions};
use crate::sim::world::block::BlockId;
use crate::sim::world::bodies::BodyIndex;
use crate::sim::world::TorusMap;

/// Plan a full waypoint route from `origin` to `target`.
///
/// Cheap cases first: a clear line of sight yields a two-point route, and a
/// shared block yields a pure micro route. Otherwise the macro level picks a
/// corner-to-corner walk and each leg that is not directly traversable gets a
/// micro splice inside the block it crosses.
///
/// On success the list is non-empty, free of consecutive duplicates, and its
/// final waypoint is the exact wrapped target. None means unreachable, which
/// callers surface as a terminal route state.
pub fn plan_route(
    map: &TorusMap,
    bodies: &BodyIndex,
    origin: FixedVec2,
    target: FixedVec2,
) -> Option<Vec<FixedVec2>> {
    let origin = map.wrap(origin);
    let target = map.wrap(target);
    if origin == target {
        return Some(vec![target]);
    }

    let (goal_tx, goal_ty) = map.tile_coords(target);
    if map.is_solid(bodies, goal_tx, goal_ty) {
        return None;
    }

    if line_clear(map, bodies, origin, target) {
        return Some(vec![origin, target]);
    }

    let origin_block = map.block_at_pos(origin);
    let target_block = map.block_at_pos(target);
    if origin_block == target_block {
        let route = splice(map, bodies, origin_block, origin, target)?;
        return Some(finish(route, target));
    }

    let start_corner = map.nearest_corner(origin_block, origin);
    let goal_corner = map.nearest_corner(target_block, target);
    let corners = graph::macro_route(map, start_corner, goal_corner)?;

    let mut points = Vec::with_capacity(corners.len() + 2);
    points.push(origin);
    points.extend(corners.iter().map(|&id| map.intersection(id).pos));
    points.push(target);

    let mut route = vec![origin];
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a == b {
            continue;
        }
        if line_clear(map, bodies, a, b) {
            route.push(b);
            continue;
        }
        // Splice through the block the leg crosses.
        let mid = map.wrap(a + map.difference(a, b) / FixedNum::from_num(2));
        let leg_block = map.block_at_pos(mid);
        match splice(map, bodies, leg_block, a, b) {
            Some(spliced) => route.extend(spliced.into_iter().skip(1)),
            // Interior legs fall back to the straight hop; the endpoint legs
            // decide reachability and must not.
            None if a == origin || b == target => return None,
            None => route.push(b),
        }
    }
    Some(finish(route, target))
}

fn line_clear(map: &TorusMap, bodies: &BodyIndex, from: FixedVec2, to: FixedVec2) -> bool {
    let vector = map.difference(from, to);
    trace_clear(map, bodies, from, vector, TraceOptions::point_geometry(), |_| true)
}

/// Micro route between two points, both clamped into `block`, expressed as
/// tile-center waypoints ending on the exact `to` point.
fn splice(
    map: &TorusMap,
    bodies: &BodyIndex,
    block: BlockId,
    from: FixedVec2,
    to: FixedVec2,
) -> Option<Vec<FixedVec2>> {
    let start = clamp_tile(map, block, from);
    let goal = clamp_tile(map, block, to);
    let tiles = local::micro_route(map, bodies, block, start, goal)?;
    let mut route = vec![from];
    route.extend(
        tiles
            .into_iter()
            .map(|(tx, ty)| map.tile_center(tx, ty)),
    );
    route.push(to);
    Some(route)
}

/// Tile of `point` pulled into the rect of `block`. Corner waypoints sit on
/// block boundaries and may floor into a neighbor; the clamp keeps the micro
/// search inside one block.
fn clamp_tile(map: &TorusMap, block: BlockId, point: FixedVec2) -> (u32, u32) {
    let rect = map.block(block).rect;
    let (tx, ty) = map.tile_coords(point);
    (
        tx.clamp(rect.x, rect.x + rect.w - 1),
        ty.clamp(rect.y, rect.y + rect.h - 1),
    )
}

/// Drop consecutive duplicates and pin the final waypoint to the exact
/// target.
fn finish(mut route: Vec<FixedVec2>, target: FixedVec2) -> Vec<FixedVec2> {
    route.dedup();
    if route.last() != Some(&target) {
        route.push(target);
    }
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::world::tile::{Face, BASE_LEVEL};
    use crate::sim::world::WorldBuilder;

    fn vec2(x: f32, y: f32) -> FixedVec2 {
        FixedVec2::new(FixedNum::from_num(x), FixedNum::from_num(y))
    }

    #[test]
    fn open_block_route_is_two_points() {
        let map = TorusMap::open(32, 32, 16);
        let bodies = BodyIndex::new(&map);
        let origin = vec2(1.5, 1.5);
        let target = vec2(8.5, 8.5);
        let route = plan_route(&map, &bodies, origin, target).expect("route");
        assert_eq!(route, vec![origin, target]);
    }

    #[test]
    fn wall_with_gap_routes_through_the_gap() {
        let mut builder = WorldBuilder::new(32, 32, 16);
        for ty in 0..16 {
            if ty != 5 {
                builder.add_wall(7, ty, Face::East, BASE_LEVEL);
            }
        }
        let map = builder.build();
        let bodies = BodyIndex::new(&map);
        let origin = vec2(2.5, 2.5);
        let target = vec2(12.5, 2.5);
        let route = plan_route(&map, &bodies, origin, target).expect("route");
        assert_eq!(route.last(), Some(&target));
        // The route must pass through the gap row.
        assert!(route.contains(&map.tile_center(7, 5)));
        for pair in route.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn cross_block_route_ends_on_the_exact_target() {
        let mut builder = WorldBuilder::new(64, 64, 16);
        // Block a straight line between the two points.
        for ty in 0..24 {
            builder.add_wall(20, ty, Face::East, BASE_LEVEL);
        }
        let map = builder.build();
        let bodies = BodyIndex::new(&map);
        let origin = vec2(4.5, 4.5);
        let target = vec2(40.25, 9.75);
        let route = plan_route(&map, &bodies, origin, target).expect("route");
        assert_eq!(route.first(), Some(&origin));
        assert_eq!(route.last(), Some(&target));
        assert!(route.len() >= 2);
    }

    #[test]
    fn sealed_target_is_unreachable() {
        let mut builder = WorldBuilder::new(32, 32, 16);
        for face in Face::ALL {
            builder.add_wall(10, 10, face, BASE_LEVEL);
        }
        let map = builder.build();
        let bodies = BodyIndex::new(&map);
        let route = plan_route(&map, &bodies, vec2(2.5, 2.5), vec2(10.5, 10.5));
        assert!(route.is_none());
    }

    #[test]
    fn zero_distance_request_is_a_single_waypoint() {
        let map = TorusMap::open(32, 32, 16);
        let bodies = BodyIndex::new(&map);
        let spot = vec2(3.25, 7.5);
        let route = plan_route(&map, &bodies, spot, spot).expect("route");
        assert_eq!(route, vec![spot]);
    }
}
