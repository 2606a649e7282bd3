use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::sim::collision::Collider;
use crate::sim::math::{FixedNum, FixedVec2};
use crate::sim::world::block::BlockId;
use crate::sim::world::TorusMap;

/// Extra reach when gathering blocks whose members may cover a rect, in
/// tiles. Must cover the largest static collider half-extent in use.
const STATIC_FOOTPRINT_PAD: FixedNum = FixedNum::lit("4");

/// Registered spatial state of one entity.
#[derive(Clone, Copy, Debug)]
pub struct Body {
    /// Wrapped into `[0, width) x [0, height)` at all times.
    pub pos: FixedVec2,
    pub collider: Collider,
    pub block: BlockId,
    /// Static blockers contribute to tile solidity and to block enclosure.
    pub static_blocking: bool,
}

/// Mutable spatial registry layered over the frozen `TorusMap`.
///
/// The map owns geometry that never changes after build; everything that
/// moves per tick lives here: body positions, per-block membership lists, the
/// static-solid tile overlay, and the enclosedness flags. All tables are
/// indexed by `BlockId` so lookups stay allocation-free on the hot path.
#[derive(Debug, Default)]
pub struct BodyIndex {
    bodies: FxHashMap<Entity, Body>,
    members: Vec<SmallVec<[Entity; 8]>>,
    static_solid: Vec<FixedBitSet>,
    enclosed: Vec<bool>,
    enclosure_dirty: Vec<bool>,
}

impl BodyIndex {
    pub fn new(map: &TorusMap) -> Self {
        let count = map.block_count();
        Self {
            bodies: FxHashMap::default(),
            members: vec![SmallVec::new(); count],
            static_solid: map
                .blocks()
                .iter()
                .map(|block| FixedBitSet::with_capacity(block.rect.area() as usize))
                .collect(),
            enclosed: vec![false; count],
            enclosure_dirty: vec![false; count],
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn body(&self, entity: Entity) -> Option<&Body> {
        self.bodies.get(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &Body)> {
        self.bodies.iter().map(|(&entity, body)| (entity, body))
    }

    pub fn members(&self, block: BlockId) -> &[Entity] {
        &self.members[block.0 as usize]
    }

    pub fn is_static_blocker(&self, entity: Entity) -> bool {
        self.bodies
            .get(&entity)
            .is_some_and(|body| body.static_blocking)
    }

    pub fn insert(
        &mut self,
        map: &TorusMap,
        entity: Entity,
        pos: FixedVec2,
        collider: Collider,
        static_blocking: bool,
    ) {
        debug_assert!(!self.bodies.contains_key(&entity));
        let pos = map.wrap(pos);
        let block = map.block_at_pos(pos);
        self.members[block.0 as usize].push(entity);
        let body = Body {
            pos,
            collider,
            block,
            static_blocking,
        };
        self.bodies.insert(entity, body);
        if static_blocking {
            for touched in self.footprint_blocks(map, &body) {
                self.rebuild_static(map, touched);
            }
        }
    }

    pub fn remove(&mut self, map: &TorusMap, entity: Entity) {
        let Some(body) = self.bodies.remove(&entity) else {
            return;
        };
        let members = &mut self.members[body.block.0 as usize];
        if let Some(at) = members.iter().position(|&e| e == entity) {
            members.swap_remove(at);
        }
        if body.static_blocking {
            for touched in self.footprint_blocks(map, &body) {
                self.rebuild_static(map, touched);
            }
        }
    }

    /// Move a body, updating block membership and (for static blockers) the
    /// solidity overlay of every touched block. Returns the wrapped position
    /// actually stored.
    pub fn set_position(&mut self, map: &TorusMap, entity: Entity, pos: FixedVec2) -> FixedVec2 {
        let pos = map.wrap(pos);
        let Some(body) = self.bodies.get_mut(&entity) else {
            return pos;
        };
        let old_body = *body;
        let old_block = old_body.block;
        let new_block = map.block_at_pos(pos);
        body.pos = pos;
        body.block = new_block;
        let new_body = *body;
        if new_block != old_block {
            let members = &mut self.members[old_block.0 as usize];
            if let Some(at) = members.iter().position(|&e| e == entity) {
                members.swap_remove(at);
            }
            self.members[new_block.0 as usize].push(entity);
        }
        if new_body.static_blocking {
            let mut touched = self.footprint_blocks(map, &old_body);
            for block in self.footprint_blocks(map, &new_body) {
                if !touched.contains(&block) {
                    touched.push(block);
                }
            }
            for block in touched {
                self.rebuild_static(map, block);
            }
        }
        pos
    }

    /// True when the tile is covered by a static blocking body.
    pub fn is_static_solid(&self, map: &TorusMap, tx: u32, ty: u32) -> bool {
        let block_id = map.block_at(tx, ty);
        let block = map.block(block_id);
        self.static_solid[block_id.0 as usize].contains(block.local_index(tx, ty))
    }

    pub fn is_enclosed(&self, block: BlockId) -> bool {
        self.enclosed[block.0 as usize]
    }

    pub fn set_enclosed(&mut self, block: BlockId, enclosed: bool) {
        self.enclosed[block.0 as usize] = enclosed;
        self.enclosure_dirty[block.0 as usize] = false;
    }

    pub fn dirty_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.enclosure_dirty
            .iter()
            .enumerate()
            .filter(|(_, &dirty)| dirty)
            .map(|(index, _)| BlockId(index as u32))
    }

    /// Entities whose registered center lies within `radius` of `center`,
    /// shortest way around the torus. Callers pad the radius by the largest
    /// collider extent they care about.
    pub fn nearby(&self, map: &TorusMap, center: FixedVec2, radius: FixedNum) -> Vec<Entity> {
        let mut blocks = Vec::new();
        map.district()
            .blocks_in_radius(center, radius, map.size(), &mut blocks);
        let radius_sq = radius * radius;
        let mut found = Vec::new();
        for block in blocks {
            for &entity in self.members(block) {
                let body = &self.bodies[&entity];
                if map.difference(center, body.pos).length_squared() <= radius_sq {
                    found.push(entity);
                }
            }
        }
        found
    }

    /// Every block covered by the body's tile footprint. A blocker parked on
    /// a block boundary contributes solidity to both sides.
    fn footprint_blocks(&self, map: &TorusMap, body: &Body) -> SmallVec<[BlockId; 4]> {
        let half = body.collider.size / FixedNum::from_num(2);
        let center = body.pos + body.collider.offset;
        let min_x = (center.x - half.x).floor().to_num::<i64>();
        let max_x = (center.x + half.x).floor().to_num::<i64>();
        let min_y = (center.y - half.y).floor().to_num::<i64>();
        let max_y = (center.y + half.y).floor().to_num::<i64>();
        let mut blocks = SmallVec::new();
        for ty in min_y..=max_y {
            for tx in min_x..=max_x {
                let (wx, wy) = map.wrap_tile(tx, ty);
                let block = map.block_at(wx, wy);
                if !blocks.contains(&block) {
                    blocks.push(block);
                }
            }
        }
        blocks
    }

    /// Recount the static-solid overlay of one block. Removal cannot just
    /// clear bits since blockers may overlap, and blockers centered in a
    /// neighboring block can still cover tiles here, so the recount scans
    /// members of every block within footprint reach of this rect.
    fn rebuild_static(&mut self, map: &TorusMap, block_id: BlockId) {
        let rect = map.block(block_id).rect;
        let half_w = FixedNum::from_num(rect.w) / FixedNum::from_num(2);
        let half_h = FixedNum::from_num(rect.h) / FixedNum::from_num(2);
        let rect_center = FixedVec2::new(
            FixedNum::from_num(rect.x) + half_w,
            FixedNum::from_num(rect.y) + half_h,
        );
        let reach = FixedVec2::new(half_w, half_h).length() + STATIC_FOOTPRINT_PAD;
        let mut sources = Vec::new();
        map.district()
            .blocks_in_radius(rect_center, reach, map.size(), &mut sources);

        let bits = &mut self.static_solid[block_id.0 as usize];
        bits.clear();
        for source in sources {
            for &entity in &self.members[source.0 as usize] {
                let body = &self.bodies[&entity];
                if !body.static_blocking {
                    continue;
                }
                let half = body.collider.size / FixedNum::from_num(2);
                let center = body.pos + body.collider.offset;
                let min_x = (center.x - half.x).floor().to_num::<i64>();
                let max_x = (center.x + half.x).floor().to_num::<i64>();
                let min_y = (center.y - half.y).floor().to_num::<i64>();
                let max_y = (center.y + half.y).floor().to_num::<i64>();
                for ty in min_y..=max_y {
                    for tx in min_x..=max_x {
                        let (wx, wy) = map.wrap_tile(tx, ty);
                        if rect.contains(wx, wy) {
                            bits.insert(((wy - rect.y) * rect.w + (wx - rect.x)) as usize);
                        }
                    }
                }
            }
        }
        self.enclosure_dirty[block_id.0 as usize] = true;
    }
}
