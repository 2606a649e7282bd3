use serde::{Deserialize, Serialize};

use crate::sim::math::{wrap_delta, FixedNum, FixedVec2};
use crate::sim::world::block::{BlockId, TileRect};

/// Immutable BSP tree over the world's tile rectangle.
///
/// Leaves correspond one-to-one with blocks. The tree is built once at world
/// construction and never rebalanced; lookups are pure descents with no
/// interior mutability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum District {
    Branch {
        rect: TileRect,
        children: Box<[District; 2]>,
    },
    Leaf {
        rect: TileRect,
        block: BlockId,
    },
}

impl District {
    pub fn rect(&self) -> &TileRect {
        match self {
            District::Branch { rect, .. } => rect,
            District::Leaf { rect, .. } => rect,
        }
    }

    /// Block containing the given global tile coordinate. The coordinate must
    /// already be wrapped into the world rect.
    pub fn locate(&self, tx: u32, ty: u32) -> BlockId {
        debug_assert!(self.rect().contains(tx, ty));
        match self {
            District::Leaf { block, .. } => *block,
            District::Branch { children, .. } => {
                if children[0].rect().contains(tx, ty) {
                    children[0].locate(tx, ty)
                } else {
                    children[1].locate(tx, ty)
                }
            }
        }
    }

    /// Collect blocks whose rect comes within `radius` of `center`, pruning
    /// subtrees by wrapped distance. Distances to a rect are measured to its
    /// nearest edge per axis, shortest way around the torus.
    pub fn blocks_in_radius(
        &self,
        center: FixedVec2,
        radius: FixedNum,
        world_size: FixedVec2,
        out: &mut Vec<BlockId>,
    ) {
        if rect_axis_distance(center.x, self.rect().x, self.rect().w, world_size.x) > radius
            || rect_axis_distance(center.y, self.rect().y, self.rect().h, world_size.y) > radius
        {
            return;
        }
        match self {
            District::Leaf { block, .. } => out.push(*block),
            District::Branch { children, .. } => {
                children[0].blocks_in_radius(center, radius, world_size, out);
                children[1].blocks_in_radius(center, radius, world_size, out);
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            District::Leaf { .. } => 1,
            District::Branch { children, .. } => {
                children[0].leaf_count() + children[1].leaf_count()
            }
        }
    }
}

/// Build the BSP over the full world rect, splitting the longer axis in half
/// until both sides fit within `block_size`. Leaves are numbered in
/// depth-first order; the caller creates the matching `Block` for each leaf
/// rect as it is assigned.
pub fn build_district(
    rect: TileRect,
    block_size: u32,
    mut on_leaf: impl FnMut(TileRect) -> BlockId,
) -> District {
    fn split(rect: TileRect, block_size: u32, on_leaf: &mut impl FnMut(TileRect) -> BlockId) -> District {
        if rect.w <= block_size && rect.h <= block_size {
            let block = on_leaf(rect);
            return District::Leaf { rect, block };
        }
        let (a, b) = if rect.w >= rect.h {
            let left = rect.w / 2;
            (
                TileRect { w: left, ..rect },
                TileRect {
                    x: rect.x + left,
                    w: rect.w - left,
                    ..rect
                },
            )
        } else {
            let bottom = rect.h / 2;
            (
                TileRect { h: bottom, ..rect },
                TileRect {
                    y: rect.y + bottom,
                    h: rect.h - bottom,
                    ..rect
                },
            )
        };
        let children = Box::new([split(a, block_size, on_leaf), split(b, block_size, on_leaf)]);
        District::Branch { rect, children }
    }
    split(rect, block_size, &mut on_leaf)
}

/// Shortest wrapped distance from a point coordinate to a rect span on one
/// axis; zero when the point lies inside the span.
fn rect_axis_distance(point: FixedNum, start: u32, len: u32, size: FixedNum) -> FixedNum {
    let lo = FixedNum::from_num(start);
    let hi = lo + FixedNum::from_num(len);
    let wrapped = point.rem_euclid(size);
    if wrapped >= lo && wrapped < hi {
        return FixedNum::ZERO;
    }
    let to_lo = wrap_delta(wrapped, lo, size).abs();
    let to_hi = wrap_delta(wrapped, hi, size).abs();
    to_lo.min(to_hi)
}
