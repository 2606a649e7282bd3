use bevy::prelude::*;

use crate::sim::collision::Collider;
use crate::sim::math::{FixedNum, FixedVec2};
use crate::sim::routing::navigator::NavigatorId;

/// Authoritative simulation position, always wrapped. Rendering or interest
/// layers read this; only the movement systems write it.
#[derive(Component, Clone, Copy, Debug)]
pub struct SimPosition(pub FixedVec2);

/// Position at the start of the current tick's movement pass. Interpolation
/// between this and [`SimPosition`] gives smooth rendering at any frame rate.
#[derive(Component, Clone, Copy, Debug)]
pub struct SimPositionPrev(pub FixedVec2);

/// Marks an entity as a moving agent and carries its walk speed in tiles per
/// second.
#[derive(Component, Clone, Copy, Debug)]
pub struct Agent {
    pub speed: FixedNum,
}

/// Collider registered with the body index. Adding this component registers
/// the entity; removing it unregisters.
#[derive(Component, Clone, Copy, Debug)]
pub struct SimCollider(pub Collider);

/// Entities that contribute to tile solidity while parked. Combine with a
/// `Box` collider model.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct StaticBlocker;

/// Live routing session of an agent. Replaced wholesale when a new order
/// arrives; the old session is disposed first.
#[derive(Component, Clone, Copy, Debug)]
pub struct NavigatorHandle(pub NavigatorId);

/// Order an entity to route toward a world position.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct NavigateTo {
    pub entity: Entity,
    pub target: FixedVec2,
}
