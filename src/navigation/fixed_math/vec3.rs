use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use super::{FixedNum, FixedVec2};

/// World-space position used by the navigation graphs.
///
/// `x`/`y` span the ground plane (the same plane flow fields are laid out
/// on) and `z` is elevation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedVec3 {
    pub x: FixedNum,
    pub y: FixedNum,
    pub z: FixedNum,
}

impl FixedVec3 {
    pub const ZERO: Self = Self {
        x: FixedNum::ZERO,
        y: FixedNum::ZERO,
        z: FixedNum::ZERO,
    };

    pub fn new(x: FixedNum, y: FixedNum, z: FixedNum) -> Self {
        Self { x, y, z }
    }

    pub fn from_f32(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            y: FixedNum::from_num(y),
            z: FixedNum::from_num(z),
        }
    }

    /// Lift a ground-plane point to elevation zero.
    pub fn from_ground(p: FixedVec2) -> Self {
        Self { x: p.x, y: p.y, z: FixedNum::ZERO }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x.to_num(), self.y.to_num(), self.z.to_num())
    }

    /// Projection onto the ground plane.
    pub fn ground(self) -> FixedVec2 {
        FixedVec2::new(self.x, self.y)
    }

    pub fn length_squared(self) -> FixedNum {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(self) -> FixedNum {
        let len_sq = self.length_squared();
        if len_sq == FixedNum::ZERO {
            return FixedNum::ZERO;
        }
        len_sq.sqrt()
    }

    pub fn distance_squared(self, other: Self) -> FixedNum {
        (self - other).length_squared()
    }

    pub fn distance(self, other: Self) -> FixedNum {
        (self - other).length()
    }

    pub fn lerp(self, other: Self, t: FixedNum) -> Self {
        self + (other - self) * t
    }
}

impl std::ops::Add for FixedVec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self { x: self.x + rhs.x, y: self.y + rhs.y, z: self.z + rhs.z }
    }
}

impl std::ops::Sub for FixedVec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self { x: self.x - rhs.x, y: self.y - rhs.y, z: self.z - rhs.z }
    }
}

impl std::ops::Mul<FixedNum> for FixedVec3 {
    type Output = Self;
    fn mul(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x * rhs, y: self.y * rhs, z: self.z * rhs }
    }
}

impl std::ops::Div<FixedNum> for FixedVec3 {
    type Output = Self;
    fn div(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x / rhs, y: self.y / rhs, z: self.z / rhs }
    }
}
