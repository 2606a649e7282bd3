//! Deterministic fixed-point mathematics.
//!
//! All simulation state uses fixed-point arithmetic so that a given world seed
//! and command stream replay identically on every platform. Floating point only
//! appears at the config boundary (human-readable RON files) and is converted
//! once on load.

use bevy::prelude::*;
use fixed::types::I48F16;
use serde::{Deserialize, Serialize};

/// Fixed-point number type used throughout the simulation.
///
/// I48F16: 48 integer bits, 16 fractional bits. Precision is ~0.000015 world
/// units, far below the collision skin.
pub type FixedNum = I48F16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedVec2 {
    pub x: FixedNum,
    pub y: FixedNum,
}

impl FixedVec2 {
    pub const ZERO: Self = Self { x: FixedNum::ZERO, y: FixedNum::ZERO };

    pub fn new(x: FixedNum, y: FixedNum) -> Self {
        Self { x, y }
    }

    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            y: FixedNum::from_num(y),
        }
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x.to_num(), self.y.to_num())
    }

    pub fn length(self) -> FixedNum {
        let len_sq = self.length_squared();
        if len_sq == FixedNum::ZERO {
            return FixedNum::ZERO;
        }
        len_sq.sqrt()
    }

    pub fn length_squared(self) -> FixedNum {
        self.x * self.x + self.y * self.y
    }

    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == FixedNum::ZERO {
            Self::ZERO
        } else {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        }
    }

    pub fn dot(self, other: Self) -> FixedNum {
        self.x * other.x + self.y * other.y
    }
}

impl std::ops::Add for FixedVec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for FixedVec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl std::ops::AddAssign for FixedVec2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for FixedVec2 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<FixedNum> for FixedVec2 {
    type Output = Self;
    fn mul(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

impl std::ops::Div<FixedNum> for FixedVec2 {
    type Output = Self;
    fn div(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x / rhs, y: self.y / rhs }
    }
}

impl std::ops::Neg for FixedVec2 {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self { x: -self.x, y: -self.y }
    }
}

/// Signed shortest delta from `from` to `to` on a wrapping axis of the given
/// size. The result is always in `(-size / 2, size / 2]`.
pub fn wrap_delta(from: FixedNum, to: FixedNum, size: FixedNum) -> FixedNum {
    let mut delta = (to - from).rem_euclid(size);
    if delta > size / 2 {
        delta -= size;
    }
    delta
}

/// Wrap a scalar coordinate into `[0, size)`.
pub fn wrap_coord(value: FixedNum, size: FixedNum) -> FixedNum {
    value.rem_euclid(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_delta_takes_the_short_way_around() {
        let size = FixedNum::from_num(256);
        let a = FixedNum::from_num(250);
        let b = FixedNum::from_num(6);
        assert_eq!(wrap_delta(a, b, size), FixedNum::from_num(12));
        assert_eq!(wrap_delta(b, a, size), FixedNum::from_num(-12));
    }

    #[test]
    fn wrap_coord_identity_inside_range() {
        let size = FixedNum::from_num(64);
        let v = FixedNum::from_num(17.5);
        assert_eq!(wrap_coord(v, size), v);
        assert_eq!(wrap_coord(v + size, size), v);
        assert_eq!(wrap_coord(v - size, size), v);
    }
}
