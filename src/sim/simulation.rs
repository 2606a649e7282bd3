use bevy::prelude::*;
use borough_macros::profile;

use crate::profile_log;
use crate::sim::collision::{resolve_repulsion, try_move};
use crate::sim::config::{SimConfig, WorldConfig};
use crate::sim::routing::navigator::Navigators;
use crate::sim::world::block::BlockId;
use crate::sim::world::bodies::{Body, BodyIndex};
use crate::sim::world::{gen, recompute_block_enclosure, TorusMap};

pub mod components;

use components::{
    Agent, NavigateTo, NavigatorHandle, SimCollider, SimPosition, SimPositionPrev, StaticBlocker,
};

/// The frozen world geometry, inserted at startup and never replaced.
#[derive(Resource, Debug)]
pub struct WorldRes(pub TorusMap);

/// Mutable spatial state, kept in lockstep with the ECS by the registration
/// and movement systems.
#[derive(Resource, Debug)]
pub struct Bodies(pub BodyIndex);

/// Fixed-tick counter, advanced once per `FixedUpdate` pass.
#[derive(Resource, Debug, Default)]
pub struct SimTick(pub u64);

/// Per-tick phases, chained in declaration order. Movement must see the
/// plans drained this tick, and repulsion must see final movement.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimSet {
    Input,
    Plan,
    Move,
    Resolve,
    Maintain,
}

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<NavigateTo>();
        app.init_resource::<Navigators>();
        app.init_resource::<SimTick>();
        app.configure_sets(
            FixedUpdate,
            (
                SimSet::Input,
                SimSet::Plan,
                SimSet::Move,
                SimSet::Resolve,
                SimSet::Maintain,
            )
                .chain(),
        );
        app.add_systems(Startup, (configure_tick_rate, init_world));
        app.add_systems(
            FixedUpdate,
            (
                (register_bodies, unregister_bodies, process_navigate_orders)
                    .in_set(SimSet::Input),
                drain_navigator_queue.in_set(SimSet::Plan),
                (cache_previous_positions, steer_agents)
                    .chain()
                    .in_set(SimSet::Move),
                apply_repulsion.in_set(SimSet::Resolve),
                (world_think, advance_tick).in_set(SimSet::Maintain),
            ),
        );
    }
}

fn configure_tick_rate(mut time: ResMut<Time<Fixed>>, config: Res<SimConfig>) {
    time.set_timestep_hz(config.tick_rate);
}

fn init_world(mut commands: Commands, config: Res<WorldConfig>) {
    let map = gen::generate(&config);
    let bodies = BodyIndex::new(&map);
    commands.insert_resource(Bodies(bodies));
    commands.insert_resource(WorldRes(map));
}

/// Register freshly added colliders with the body index.
fn register_bodies(
    added: Query<(Entity, &SimPosition, &SimCollider, Has<StaticBlocker>), Added<SimCollider>>,
    map: Res<WorldRes>,
    mut bodies: ResMut<Bodies>,
) {
    for (entity, pos, collider, is_static) in &added {
        bodies.0.insert(&map.0, entity, pos.0, collider.0, is_static);
    }
}

fn unregister_bodies(
    mut removed: RemovedComponents<SimCollider>,
    map: Res<WorldRes>,
    mut bodies: ResMut<Bodies>,
) {
    for entity in removed.read() {
        bodies.0.remove(&map.0, entity);
    }
}

/// Turn `NavigateTo` orders into routing sessions. A fresh order replaces an
/// existing session for the same entity.
fn process_navigate_orders(
    mut commands: Commands,
    mut orders: MessageReader<NavigateTo>,
    mut navigators: ResMut<Navigators>,
    handles: Query<&NavigatorHandle>,
) {
    for order in orders.read() {
        if let Ok(handle) = handles.get(order.entity) {
            navigators.dispose(handle.0);
        }
        let id = navigators.request(order.entity, order.target);
        commands.entity(order.entity).insert(NavigatorHandle(id));
    }
}

#[profile]
fn drain_navigator_queue(
    map: Res<WorldRes>,
    bodies: Res<Bodies>,
    mut navigators: ResMut<Navigators>,
    config: Res<SimConfig>,
    tick: Res<SimTick>,
) {
    navigators.think(&map.0, &bodies.0, config.nav_queue_budget);
    profile_log!(
        tick,
        "[NAVQUEUE] tick {}: {} sessions pending",
        tick.0,
        navigators.pending()
    );
}

/// Snapshot positions before movement so render-side code can interpolate
/// between ticks.
fn cache_previous_positions(
    mut query: Query<(&SimPosition, &mut SimPositionPrev), With<Agent>>,
) {
    for (pos, mut prev) in &mut query {
        prev.0 = pos.0;
    }
}

/// Advance every routed agent one tick of movement: ask its session for a
/// direction, clamp the step against walls and hard bodies, then commit the
/// wrapped result to both the ECS and the body index.
///
/// Integration uses the configured tick step and the tick counter as the
/// clock, never wall time, so runs replay exactly.
fn steer_agents(
    tick: Res<SimTick>,
    map: Res<WorldRes>,
    mut bodies: ResMut<Bodies>,
    mut navigators: ResMut<Navigators>,
    config: Res<SimConfig>,
    mut agents: Query<(Entity, &mut SimPosition, &Agent, &NavigatorHandle)>,
) {
    let dt = config.tick_dt;
    let now = std::time::Duration::from_secs_f64(tick.0 as f64 / config.tick_rate);
    for (entity, mut pos, agent, handle) in &mut agents {
        let Some(dir) = navigators.direction(handle.0, &map.0, &bodies.0, &config, now) else {
            continue;
        };
        let step = dir * (agent.speed * dt);
        let moved = try_move(&map.0, &bodies.0, entity, step, config.epsilon);
        pos.0 = bodies.0.set_position(&map.0, entity, pos.0 + moved);
    }
}

/// Push overlapping soft bodies apart after movement has settled.
#[profile]
fn apply_repulsion(
    map: Res<WorldRes>,
    mut bodies: ResMut<Bodies>,
    mut positions: Query<&mut SimPosition>,
) {
    let pushes = resolve_repulsion(&map.0, &bodies.0);
    for (entity, push) in pushes {
        let Some(&Body { pos: current, .. }) = bodies.0.body(entity) else {
            continue;
        };
        let moved = bodies.0.set_position(&map.0, entity, current + push);
        if let Ok(mut pos) = positions.get_mut(entity) {
            pos.0 = moved;
        }
    }
}

/// Recompute enclosedness for blocks whose static content changed this tick.
fn world_think(map: Res<WorldRes>, mut bodies: ResMut<Bodies>, config: Res<SimConfig>) {
    let dirty: Vec<BlockId> = bodies.0.dirty_blocks().collect();
    for block in dirty {
        recompute_block_enclosure(
            &map.0,
            &mut bodies.0,
            block,
            config.enclosure_samples as u32,
            config.world_seed,
        );
    }
}

fn advance_tick(mut tick: ResMut<SimTick>) {
    tick.0 += 1;
}
