use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::sim::math::{FixedNum, FixedVec2};
use crate::sim::trace::{axis_sweep, Axis};
use crate::sim::world::bodies::BodyIndex;
use crate::sim::world::TorusMap;

/// How a body participates in collision.
///
/// `Repel` bodies overlap freely and get pushed apart after movement; `Box`
/// bodies are hard and truncate movement up front. A pair resolves hard when
/// either side is `Box`; two `Repel` bodies resolve soft.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionModel {
    #[default]
    None,
    Repel,
    Box,
}

impl CollisionModel {
    pub fn is_none(self) -> bool {
        self == CollisionModel::None
    }

    pub fn is_hard(self) -> bool {
        self == CollisionModel::Box
    }
}

fn pair_is_hard(a: CollisionModel, b: CollisionModel) -> bool {
    !a.is_none() && !b.is_none() && (a.is_hard() || b.is_hard())
}

fn pair_repels(a: CollisionModel, b: CollisionModel) -> bool {
    a == CollisionModel::Repel && b == CollisionModel::Repel
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Collider {
    pub size: FixedVec2,
    /// Collider center relative to the body position.
    pub offset: FixedVec2,
    pub model: CollisionModel,
}

impl Collider {
    pub fn half(&self) -> FixedVec2 {
        self.size / FixedNum::from_num(2)
    }
}

/// Search pad for partner candidates, covering the largest collider extent.
const PAIR_SEARCH_PAD: i64 = 3;

/// Clamp a desired movement delta against walls, solid tiles, and hard
/// bodies. Each axis is truncated independently, which is what produces wall
/// sliding: a diagonal push into a wall keeps its parallel component.
///
/// The returned delta stops `skin` short of any contact so the mover never
/// ends flush against what it hit.
pub fn try_move(
    map: &TorusMap,
    bodies: &BodyIndex,
    entity: Entity,
    delta: FixedVec2,
    skin: FixedNum,
) -> FixedVec2 {
    let Some(body) = bodies.body(entity) else {
        return FixedVec2::ZERO;
    };
    let center = body.pos + body.collider.offset;
    let half = body.collider.half();
    let one = FixedNum::from_num(1);

    let mut x_mult = one;
    let mut y_mult = one;
    if let Some((t, _)) = axis_sweep(map, bodies, center, half, delta, Axis::X, one) {
        x_mult = back_off(t, delta.x, skin);
    }
    if let Some((t, _)) = axis_sweep(map, bodies, center, half, delta, Axis::Y, one) {
        y_mult = back_off(t, delta.y, skin);
    }

    let reach = delta.length() + half.x.max(half.y) + FixedNum::from_num(PAIR_SEARCH_PAD);
    for other in bodies.nearby(map, center, reach) {
        if other == entity {
            continue;
        }
        let other_body = bodies.body(other).expect("nearby returned a live body");
        if !pair_is_hard(body.collider.model, other_body.collider.model) {
            continue;
        }
        let rel = map.difference(center, other_body.pos + other_body.collider.offset);
        let extent = half + other_body.collider.half();

        // X truncation applies only while the Y spans overlap, and vice
        // versa; that is what lets a mover slide along a box face.
        if rel.y.abs() < extent.y && delta.x != FixedNum::ZERO && rel.x.signum() == delta.x.signum()
        {
            let gap = rel.x.abs() - extent.x;
            let t = if gap <= FixedNum::ZERO {
                FixedNum::ZERO
            } else {
                gap / delta.x.abs()
            };
            if t < x_mult {
                x_mult = back_off(t, delta.x, skin);
            }
        }
        if rel.x.abs() < extent.x && delta.y != FixedNum::ZERO && rel.y.signum() == delta.y.signum()
        {
            let gap = rel.y.abs() - extent.y;
            let t = if gap <= FixedNum::ZERO {
                FixedNum::ZERO
            } else {
                gap / delta.y.abs()
            };
            if t < y_mult {
                y_mult = back_off(t, delta.y, skin);
            }
        }
    }

    FixedVec2::new(delta.x * x_mult, delta.y * y_mult)
}

/// Pull a contact-time multiplier back by `skin` worth of travel, clamped at
/// zero so penetration never produces a reverse push.
fn back_off(t: FixedNum, delta: FixedNum, skin: FixedNum) -> FixedNum {
    if delta == FixedNum::ZERO {
        return t;
    }
    (t - skin / delta.abs()).max(FixedNum::ZERO)
}

/// Post-movement soft resolution: every overlapping Repel pair contributes a
/// push of a quarter of the overlap to each side, along the axis of least
/// penetration. Pairs close half their overlap per tick, so dense crowds
/// relax over several ticks instead of teleporting apart.
///
/// Pure with respect to `bodies`; the caller applies the returned pushes so
/// every pair is judged against the same snapshot.
pub fn resolve_repulsion(map: &TorusMap, bodies: &BodyIndex) -> Vec<(Entity, FixedVec2)> {
    let mut pushes: FxHashMap<Entity, FixedVec2> = FxHashMap::default();
    let quarter = FixedNum::from_num(0.25);
    for (entity, body) in bodies.iter() {
        if body.collider.model != CollisionModel::Repel {
            continue;
        }
        let center = body.pos + body.collider.offset;
        let half = body.collider.half();
        let reach = half.x.max(half.y) + FixedNum::from_num(PAIR_SEARCH_PAD);
        for other in bodies.nearby(map, center, reach) {
            // Each unordered pair once.
            if other <= entity {
                continue;
            }
            let other_body = bodies.body(other).expect("nearby returned a live body");
            if !pair_repels(body.collider.model, other_body.collider.model) {
                continue;
            }
            let rel = map.difference(center, other_body.pos + other_body.collider.offset);
            let extent = half + other_body.collider.half();
            let overlap_x = extent.x - rel.x.abs();
            let overlap_y = extent.y - rel.y.abs();
            if overlap_x <= FixedNum::ZERO || overlap_y <= FixedNum::ZERO {
                continue;
            }
            let (push, overlap) = if overlap_x < overlap_y {
                (FixedVec2::new(axis_direction(rel.x, entity, other), FixedNum::ZERO), overlap_x)
            } else {
                (FixedVec2::new(FixedNum::ZERO, axis_direction(rel.y, entity, other)), overlap_y)
            };
            let amount = overlap * quarter;
            *pushes.entry(entity).or_insert(FixedVec2::ZERO) -= push * amount;
            *pushes.entry(other).or_insert(FixedVec2::ZERO) += push * amount;
        }
    }
    let mut resolved: Vec<(Entity, FixedVec2)> = pushes.into_iter().collect();
    // Hash order is not deterministic; application order must be.
    resolved.sort_unstable_by_key(|&(entity, _)| entity);
    resolved
}

/// Unit direction from `a` toward `b` along one axis. Perfectly coincident
/// centers fall back to entity identity so the pair still separates, the same
/// way every tick.
fn axis_direction(rel: FixedNum, a: Entity, b: Entity) -> FixedNum {
    if rel > FixedNum::ZERO {
        FixedNum::from_num(1)
    } else if rel < FixedNum::ZERO {
        FixedNum::from_num(-1)
    } else if a < b {
        FixedNum::from_num(1)
    } else {
        FixedNum::from_num(-1)
    }
}
