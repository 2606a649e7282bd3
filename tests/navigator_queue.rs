use bevy::prelude::*;
use std::time::{Duration, Instant};

use borough::sim::collision::{Collider, CollisionModel};
use borough::sim::math::{FixedNum, FixedVec2};
use borough::sim::routing::navigator::{Navigators, RouteState};
use borough::sim::world::bodies::BodyIndex;
use borough::sim::world::TorusMap;

fn vec2(x: f32, y: f32) -> FixedVec2 {
    FixedVec2::new(FixedNum::from_num(x), FixedNum::from_num(y))
}

fn agent_collider() -> Collider {
    Collider {
        size: vec2(0.6, 0.6),
        offset: FixedVec2::ZERO,
        model: CollisionModel::Repel,
    }
}

/// A realistic burst: a thousand requests land on the same tick. The drain
/// must make progress every tick, stay near its per-tick budget, and leave no
/// session behind in `Queued`.
#[test]
fn thousand_request_burst_drains_within_budget() {
    let map = TorusMap::open(128, 128, 16);
    let mut bodies = BodyIndex::new(&map);
    let mut world = World::new();
    let mut navigators = Navigators::default();
    let mut rng = fastrand::Rng::with_seed(0xB0B);

    let mut ids = Vec::with_capacity(1000);
    for _ in 0..1000 {
        let entity = world.spawn_empty().id();
        let pos = vec2(
            rng.u32(0..128) as f32 + 0.5,
            rng.u32(0..128) as f32 + 0.5,
        );
        bodies.insert(&map, entity, pos, agent_collider(), false);
        let target = vec2(
            rng.u32(0..128) as f32 + 0.5,
            rng.u32(0..128) as f32 + 0.5,
        );
        ids.push(navigators.request(entity, target));
    }
    assert_eq!(navigators.pending(), 1000);

    let budget = Duration::from_millis(8);
    let mut ticks = 0;
    while navigators.pending() > 0 {
        let before = navigators.pending();
        let started = Instant::now();
        navigators.think(&map, &bodies, budget);
        // Budget is checked between plans, so a tick may overshoot by at most
        // one plan; 50ms is far beyond any single plan on this map.
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(navigators.pending() < before, "no progress on tick {}", ticks);
        ticks += 1;
        assert!(ticks < 1000, "queue never drained");
    }

    for id in ids {
        let state = navigators.state(id).expect("session exists");
        assert_ne!(state, RouteState::Queued);
    }
}

/// Requests are planned strictly in arrival order.
#[test]
fn queue_is_fifo() {
    let map = TorusMap::open(32, 32, 16);
    let mut bodies = BodyIndex::new(&map);
    let mut world = World::new();
    let mut navigators = Navigators::default();

    let mut ids = Vec::new();
    for i in 0..8 {
        let entity = world.spawn_empty().id();
        bodies.insert(&map, entity, vec2(2.5 + i as f32, 2.5), agent_collider(), false);
        ids.push(navigators.request(entity, vec2(20.5, 20.5)));
    }

    // Generous budget: everything drains on the first tick, front to back.
    navigators.think(&map, &bodies, Duration::from_secs(5));
    assert_eq!(navigators.pending(), 0);
    for id in ids {
        assert_eq!(navigators.state(id), Some(RouteState::Active));
    }
}

/// Disposal mid-queue neither stalls the drain nor resurrects the session.
#[test]
fn disposed_requests_drop_out_of_the_drain() {
    let map = TorusMap::open(32, 32, 16);
    let mut bodies = BodyIndex::new(&map);
    let mut world = World::new();
    let mut navigators = Navigators::default();

    let mut ids = Vec::new();
    for i in 0..10 {
        let entity = world.spawn_empty().id();
        bodies.insert(&map, entity, vec2(2.5 + i as f32, 2.5), agent_collider(), false);
        ids.push(navigators.request(entity, vec2(20.5, 20.5)));
    }
    for id in ids.iter().step_by(2) {
        navigators.dispose(*id);
    }

    navigators.think(&map, &bodies, Duration::from_secs(5));
    assert_eq!(navigators.pending(), 0);
    for (index, id) in ids.iter().enumerate() {
        if index % 2 == 0 {
            assert_eq!(navigators.state(*id), None);
        } else {
            assert_eq!(navigators.state(*id), Some(RouteState::Active));
        }
    }
}
