use bevy::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::sim::config::SimConfig;
use crate::sim::math::FixedVec2;
use crate::sim::routing::combined;
use crate::sim::trace::{trace_clear, TraceOptions};
use crate::sim::world::bodies::BodyIndex;
use crate::sim::world::TorusMap;

/// Handle to one routing session. Stale handles are harmless: every lookup
/// on a disposed or unknown id is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NavigatorId(u64);

/// Lifecycle of a session. `Ended` is terminal and covers both arrival and
/// failure; callers that care which it was check the position themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteState {
    Queued,
    Active,
    Ended,
}

#[derive(Debug)]
struct Session {
    entity: Entity,
    target: FixedVec2,
    waypoints: Vec<FixedVec2>,
    cursor: usize,
    state: RouteState,
    disposed: bool,
    queued: bool,
    last_validation: Duration,
}

/// All routing sessions plus the process-wide planning queue.
///
/// Requests are planned FIFO by [`Navigators::think`], which runs once per
/// tick and stops when its wall-clock budget is spent; what it does not reach
/// waits for the next tick. Steering reads are cheap and happen every tick
/// through [`Navigators::direction`].
#[derive(Resource, Debug, Default)]
pub struct Navigators {
    sessions: FxHashMap<u64, Session>,
    queue: VecDeque<u64>,
    next_id: u64,
}

impl Navigators {
    /// Enqueue a new session. Planning happens later in `think`; until then
    /// the session yields no direction.
    pub fn request(&mut self, entity: Entity, target: FixedVec2) -> NavigatorId {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(
            id,
            Session {
                entity,
                target,
                waypoints: Vec::new(),
                cursor: 0,
                state: RouteState::Queued,
                disposed: false,
                queued: true,
                last_validation: Duration::ZERO,
            },
        );
        self.queue.push_back(id);
        NavigatorId(id)
    }

    /// Release a session. Queued entries are only flagged and get skipped on
    /// dequeue; scanning the queue here would make disposal O(queue).
    pub fn dispose(&mut self, id: NavigatorId) {
        if let Some(session) = self.sessions.get_mut(&id.0) {
            if session.queued {
                session.disposed = true;
            } else {
                self.sessions.remove(&id.0);
            }
        }
    }

    pub fn state(&self, id: NavigatorId) -> Option<RouteState> {
        self.sessions
            .get(&id.0)
            .filter(|s| !s.disposed)
            .map(|s| s.state)
    }

    pub fn has_ended(&self, id: NavigatorId) -> bool {
        self.state(id) == Some(RouteState::Ended)
    }

    pub fn has_direction(&self, id: NavigatorId) -> bool {
        self.sessions
            .get(&id.0)
            .is_some_and(|s| !s.disposed && s.state == RouteState::Active && s.cursor < s.waypoints.len())
    }

    pub fn target(&self, id: NavigatorId) -> Option<FixedVec2> {
        self.sessions
            .get(&id.0)
            .filter(|s| !s.disposed)
            .map(|s| s.target)
    }

    pub fn waypoints(&self, id: NavigatorId) -> Option<&[FixedVec2]> {
        self.sessions
            .get(&id.0)
            .filter(|s| !s.disposed)
            .map(|s| s.waypoints.as_slice())
    }

    /// Sessions still waiting for their first plan.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Current steering direction for an active session, normalized, or None
    /// when the session has no direction this tick. Advances past reached
    /// waypoints, and at most once per revalidation interval re-checks line
    /// of sight: a clear hull trace to the waypoint after the current one
    /// skips ahead, a blocked current waypoint falls back to the previous one
    /// when that one is still clear and unreached, and otherwise the route is
    /// replanned from the live position, ending the session when no route
    /// remains.
    ///
    /// `now` is simulation time, so revalidation cadence replays exactly.
    pub fn direction(
        &mut self,
        id: NavigatorId,
        map: &TorusMap,
        bodies: &BodyIndex,
        config: &SimConfig,
        now: Duration,
    ) -> Option<FixedVec2> {
        let session = self.sessions.get_mut(&id.0)?;
        if session.disposed || session.state != RouteState::Active {
            return None;
        }
        let body = bodies.body(session.entity)?;
        let pos = body.pos;

        while session.cursor < session.waypoints.len()
            && map.wrapped_distance_sq(pos, session.waypoints[session.cursor])
                < config.waypoint_radius_sq
        {
            session.cursor += 1;
        }
        if session.cursor >= session.waypoints.len() {
            session.state = RouteState::Ended;
            return None;
        }

        if now.saturating_sub(session.last_validation) >= config.revalidate_interval {
            session.last_validation = now;
            let entity = session.entity;
            let hull = body.collider.size * config.shortcut_hull_scale;
            let options = TraceOptions::hull_all(hull);
            let filter = |e: Entity| e != entity && bodies.is_static_blocker(e);

            let probe = (session.cursor + 1).min(session.waypoints.len() - 1);
            let ahead = map.difference(pos, session.waypoints[probe]);
            if trace_clear(map, bodies, pos, ahead, options, filter) {
                session.cursor = probe;
            } else {
                let current = map.difference(pos, session.waypoints[session.cursor]);
                if !trace_clear(map, bodies, pos, current, options, filter) {
                    // Current waypoint is cut off. Retreating to the previous
                    // one only helps when it is not already reached and the
                    // trace back to it is clear. Otherwise replan from the
                    // live position, ending the session if no route is left.
                    let fallback = session.cursor.checked_sub(1).filter(|&prev| {
                        let back = map.difference(pos, session.waypoints[prev]);
                        map.wrapped_distance_sq(pos, session.waypoints[prev])
                            >= config.waypoint_radius_sq
                            && trace_clear(map, bodies, pos, back, options, filter)
                    });
                    match fallback {
                        Some(prev) => session.cursor = prev,
                        None => match combined::plan_route(map, bodies, pos, session.target) {
                            Some(waypoints) => {
                                debug!(
                                    "[NAV] session {} replanned, {} waypoints",
                                    id.0,
                                    waypoints.len()
                                );
                                session.waypoints = waypoints;
                                session.cursor = 0;
                            }
                            None => {
                                warn!("[NAV] session {} lost its route, ending", id.0);
                                session.state = RouteState::Ended;
                                return None;
                            }
                        },
                    }
                }
            }
        }

        let toward = map.difference(pos, session.waypoints[session.cursor]);
        Some(toward.normalize())
    }

    /// Plan queued sessions FIFO until the wall-clock budget runs out.
    /// Dispatched once per tick; leftover work simply stays queued.
    pub fn think(&mut self, map: &TorusMap, bodies: &BodyIndex, budget: Duration) {
        let started = Instant::now();
        let mut planned = 0usize;
        while started.elapsed() < budget {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            let Some(session) = self.sessions.get_mut(&id) else {
                continue;
            };
            session.queued = false;
            if session.disposed {
                self.sessions.remove(&id);
                continue;
            }
            let Some(body) = bodies.body(session.entity) else {
                session.state = RouteState::Ended;
                continue;
            };
            match combined::plan_route(map, bodies, body.pos, session.target) {
                Some(waypoints) => {
                    session.waypoints = waypoints;
                    session.cursor = 0;
                    session.state = RouteState::Active;
                }
                None => session.state = RouteState::Ended,
            }
            planned += 1;
        }
        if !self.queue.is_empty() {
            info!(
                "[NAVQUEUE] budget spent after {} plans, {} still queued",
                planned,
                self.queue.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::collision::{Collider, CollisionModel};
    use crate::sim::math::FixedNum;
    use crate::sim::world::TorusMap;

    fn vec2(x: f32, y: f32) -> FixedVec2 {
        FixedVec2::new(FixedNum::from_num(x), FixedNum::from_num(y))
    }

    fn setup() -> (TorusMap, BodyIndex, World, Entity) {
        let map = TorusMap::open(32, 32, 16);
        let mut bodies = BodyIndex::new(&map);
        let mut world = World::new();
        let agent = world.spawn_empty().id();
        bodies.insert(
            &map,
            agent,
            vec2(2.5, 2.5),
            Collider {
                size: vec2(0.6, 0.6),
                offset: FixedVec2::ZERO,
                model: CollisionModel::Repel,
            },
            false,
        );
        (map, bodies, world, agent)
    }

    #[test]
    fn request_is_queued_until_think_runs() {
        let (map, bodies, _world, agent) = setup();
        let mut navigators = Navigators::default();
        let id = navigators.request(agent, vec2(10.5, 10.5));
        assert_eq!(navigators.state(id), Some(RouteState::Queued));
        assert!(!navigators.has_direction(id));
        assert_eq!(navigators.pending(), 1);

        navigators.think(&map, &bodies, Duration::from_millis(8));
        assert_eq!(navigators.state(id), Some(RouteState::Active));
        assert!(navigators.has_direction(id));
        assert_eq!(navigators.pending(), 0);
    }

    #[test]
    fn direction_points_at_the_next_waypoint() {
        let (map, bodies, _world, agent) = setup();
        let mut navigators = Navigators::default();
        let id = navigators.request(agent, vec2(10.5, 2.5));
        navigators.think(&map, &bodies, Duration::from_millis(8));

        let config = SimConfig::default();
        let dir = navigators
            .direction(id, &map, &bodies, &config, Duration::ZERO)
            .expect("direction");
        assert!(dir.x > FixedNum::from_num(0.99));
        assert_eq!(dir.y, FixedNum::ZERO);
    }

    #[test]
    fn arrival_ends_the_session() {
        let (map, mut bodies, _world, agent) = setup();
        let mut navigators = Navigators::default();
        let target = vec2(10.5, 2.5);
        let id = navigators.request(agent, target);
        navigators.think(&map, &bodies, Duration::from_millis(8));

        let config = SimConfig::default();
        // First read consumes the leading waypoint at the agent's own position.
        assert!(navigators
            .direction(id, &map, &bodies, &config, Duration::ZERO)
            .is_some());

        bodies.set_position(&map, agent, target);
        let dir = navigators.direction(id, &map, &bodies, &config, Duration::ZERO);
        assert!(dir.is_none());
        assert!(navigators.has_ended(id));
    }

    #[test]
    fn sealed_in_agent_replans_and_ends_instead_of_oscillating() {
        let (map, mut bodies, mut world, agent) = setup();
        let mut navigators = Navigators::default();
        let id = navigators.request(agent, vec2(20.5, 2.5));
        navigators.think(&map, &bodies, Duration::from_millis(8));
        assert_eq!(navigators.state(id), Some(RouteState::Active));

        // Park a blocker on each tile around the agent after planning.
        for (tx, ty) in [(1, 2), (3, 2), (2, 1), (2, 3)] {
            let blocker = world.spawn_empty().id();
            bodies.insert(
                &map,
                blocker,
                map.tile_center(tx, ty),
                Collider {
                    size: vec2(1.0, 1.0),
                    offset: FixedVec2::ZERO,
                    model: CollisionModel::Box,
                },
                true,
            );
        }

        let config = SimConfig::default();
        let mut now = Duration::ZERO;
        let mut ended_after = None;
        for interval in 1..=4u32 {
            now += config.revalidate_interval;
            navigators.direction(id, &map, &bodies, &config, now);
            if navigators.has_ended(id) {
                ended_after = Some(interval);
                break;
            }
        }
        assert_eq!(
            ended_after,
            Some(1),
            "session must end on the first revalidation once no route remains"
        );
    }

    #[test]
    fn unreachable_target_ends_immediately() {
        let (map, bodies, mut world, _agent) = setup();
        let mut navigators = Navigators::default();
        let ghost = world.spawn_empty().id();
        // Never registered with the body index.
        let id = navigators.request(ghost, vec2(10.5, 10.5));
        navigators.think(&map, &bodies, Duration::from_millis(8));
        assert!(navigators.has_ended(id));
    }

    #[test]
    fn disposed_queued_session_is_skipped_on_dequeue() {
        let (map, bodies, _world, agent) = setup();
        let mut navigators = Navigators::default();
        let id = navigators.request(agent, vec2(10.5, 10.5));
        navigators.dispose(id);
        assert_eq!(navigators.state(id), None);
        assert_eq!(navigators.pending(), 1);

        navigators.think(&map, &bodies, Duration::from_millis(8));
        assert_eq!(navigators.pending(), 0);
        assert_eq!(navigators.state(id), None);
        assert!(!navigators.has_direction(id));
    }

    #[test]
    fn zero_budget_leaves_the_queue_untouched() {
        let (map, bodies, _world, agent) = setup();
        let mut navigators = Navigators::default();
        let id = navigators.request(agent, vec2(10.5, 10.5));
        navigators.think(&map, &bodies, Duration::ZERO);
        assert_eq!(navigators.state(id), Some(RouteState::Queued));
        assert_eq!(navigators.pending(), 1);
    }
}
