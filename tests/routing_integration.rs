use bevy::prelude::*;

use borough::sim::collision::{Collider, CollisionModel};
use borough::sim::math::{FixedNum, FixedVec2};
use borough::sim::routing::navigator::Navigators;
use borough::sim::simulation::components::{Agent, NavigateTo, NavigatorHandle, SimCollider, SimPosition};
use borough::sim::simulation::{Bodies, WorldRes};
use borough::sim::world::bodies::BodyIndex;
use borough::sim::world::tile::{Face, BASE_LEVEL};
use borough::sim::world::{TorusMap, WorldBuilder};
use borough::sim::SimPlugin;

fn vec2(x: f32, y: f32) -> FixedVec2 {
    FixedVec2::new(FixedNum::from_num(x), FixedNum::from_num(y))
}

/// App with the full plugin stack, with the generated startup world swapped
/// for a test map.
fn test_app(map: TorusMap) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(SimPlugin);
    // Run Startup, then replace the generated world with the test one.
    app.update();
    let bodies = BodyIndex::new(&map);
    app.insert_resource(Bodies(bodies));
    app.insert_resource(WorldRes(map));
    app
}

/// Drive the simulation deterministically, independent of wall-clock time.
fn step(app: &mut App, ticks: usize) {
    for _ in 0..ticks {
        app.world_mut().run_schedule(First);
        app.world_mut().run_schedule(FixedUpdate);
        app.world_mut().run_schedule(Last);
    }
}

fn spawn_agent(app: &mut App, pos: FixedVec2) -> Entity {
    app.world_mut()
        .spawn((
            SimPosition(pos),
            Agent {
                speed: FixedNum::from_num(4),
            },
            SimCollider(Collider {
                size: vec2(0.6, 0.6),
                offset: FixedVec2::ZERO,
                model: CollisionModel::Repel,
            }),
        ))
        .id()
}

#[test]
fn agent_walks_a_straight_line_in_the_open() {
    let mut app = test_app(TorusMap::open(32, 32, 16));
    let start = vec2(2.5, 2.5);
    let target = vec2(10.5, 2.5);
    let agent = spawn_agent(&mut app, start);
    app.world_mut().write_message(NavigateTo {
        entity: agent,
        target,
    });

    step(&mut app, 120);

    let pos = app.world().get::<SimPosition>(agent).unwrap().0;
    let map = &app.world().resource::<WorldRes>().0;
    let dist = map.difference(pos, target).length();
    assert!(
        dist < FixedNum::from_num(0.6),
        "agent stopped at {:?}, {} from target",
        pos,
        dist
    );
}

#[test]
fn agent_routes_through_a_wall_gap() {
    let mut builder = WorldBuilder::new(32, 32, 16);
    for ty in 0..16 {
        if ty != 5 {
            builder.add_wall(7, ty, Face::East, BASE_LEVEL);
        }
    }
    let mut app = test_app(builder.build());
    let start = vec2(2.5, 2.5);
    let target = vec2(12.5, 2.5);
    let agent = spawn_agent(&mut app, start);
    app.world_mut().write_message(NavigateTo {
        entity: agent,
        target,
    });

    step(&mut app, 400);

    let pos = app.world().get::<SimPosition>(agent).unwrap().0;
    let map = &app.world().resource::<WorldRes>().0;
    let dist = map.difference(pos, target).length();
    assert!(
        dist < FixedNum::from_num(0.6),
        "agent stopped at {:?}, {} from target",
        pos,
        dist
    );
}

#[test]
fn agent_crosses_the_wrap_seam_the_short_way() {
    let mut app = test_app(TorusMap::open(32, 32, 16));
    let start = vec2(30.5, 16.5);
    let target = vec2(2.5, 16.5);
    let agent = spawn_agent(&mut app, start);
    app.world_mut().write_message(NavigateTo {
        entity: agent,
        target,
    });

    // 4 tiles through the seam at 4 tiles/sec: far less time than the 28-tile
    // long way would need.
    step(&mut app, 90);

    let pos = app.world().get::<SimPosition>(agent).unwrap().0;
    let map = &app.world().resource::<WorldRes>().0;
    let dist = map.difference(pos, target).length();
    assert!(
        dist < FixedNum::from_num(0.6),
        "agent stopped at {:?}, {} from target",
        pos,
        dist
    );
}

#[test]
fn sealed_destination_ends_the_session_without_movement() {
    let mut builder = WorldBuilder::new(32, 32, 16);
    for face in Face::ALL {
        builder.add_wall(10, 10, face, BASE_LEVEL);
    }
    let mut app = test_app(builder.build());
    let start = vec2(2.5, 2.5);
    let agent = spawn_agent(&mut app, start);
    app.world_mut().write_message(NavigateTo {
        entity: agent,
        target: vec2(10.5, 10.5),
    });

    step(&mut app, 30);

    let handle = app.world().get::<NavigatorHandle>(agent).unwrap().0;
    assert!(app.world().resource::<Navigators>().has_ended(handle));
    let pos = app.world().get::<SimPosition>(agent).unwrap().0;
    assert_eq!(pos, start);
}

#[test]
fn new_order_replaces_the_previous_session() {
    let mut app = test_app(TorusMap::open(32, 32, 16));
    let agent = spawn_agent(&mut app, vec2(2.5, 2.5));
    app.world_mut().write_message(NavigateTo {
        entity: agent,
        target: vec2(20.5, 2.5),
    });
    step(&mut app, 10);
    let first = app.world().get::<NavigatorHandle>(agent).unwrap().0;

    app.world_mut().write_message(NavigateTo {
        entity: agent,
        target: vec2(2.5, 20.5),
    });
    step(&mut app, 5);
    let second = app.world().get::<NavigatorHandle>(agent).unwrap().0;
    assert_ne!(first, second);

    let navigators = app.world().resource::<Navigators>();
    // The first session was disposed and is gone; the second one steers.
    assert_eq!(navigators.state(first), None);
    assert!(navigators.has_direction(second));
    assert_eq!(
        navigators.target(second),
        Some(vec2(2.5, 20.5)),
        "direction should follow the replacement order"
    );
}
