//! Deterministic fixed-point mathematics.
//!
//! Every navigation cost, distance and direction is computed in fixed point so
//! that two simulations fed the same inputs plan identical routes and step
//! agents identically, regardless of platform.

use fixed::types::I48F16;

pub use vec2::FixedVec2;
pub use vec3::FixedVec3;

mod vec2;
mod vec3;

/// Fixed-point number type used throughout navigation.
///
/// I48F16: 48 integer bits, 16 fractional bits (~0.000015 precision).
pub type FixedNum = I48F16;

/// Shorthand for `FixedNum::from_num` on literals in tests and configs.
#[inline]
pub fn fx(value: f32) -> FixedNum {
    FixedNum::from_num(value)
}
