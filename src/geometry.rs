use std::{
    cmp::Ordering,
    ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign},
};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const RADIANS_PER_DEG: f32 = 0.017_453_292_4;

/// Default tolerance for distance and angle comparisons. This constant is part
/// of the simulation contract: changing it changes replay results.
pub const FLOAT_EPSILON: f32 = 0.005;

pub fn float_eq(x: f32, y: f32) -> bool {
    float_eq_eps(x, y, FLOAT_EPSILON)
}

pub fn float_eq_eps(x: f32, y: f32, epsilon: f32) -> bool {
    (x - y).abs() < epsilon
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const MIN: Self = Self::new(f32::MIN, f32::MIN, f32::MIN);
    pub const MAX: Self = Self::new(f32::MAX, f32::MAX, f32::MAX);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    pub fn dot(&self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn min_components(&self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    pub fn max_components(&self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }

    pub fn magnitude_squared(&self) -> f32 {
        self.dot(*self)
    }

    pub fn magnitude(&self) -> f32 {
        self.magnitude_squared().sqrt()
    }

    pub fn normalized(&self) -> Vec3 {
        *self * (1.0 / self.magnitude())
    }

    pub fn approximately(&self, other: Vec3) -> bool {
        float_eq(self.x, other.x) && float_eq(self.y, other.y) && float_eq(self.z, other.z)
    }

    /// Deterministic total order, componentwise on the IEEE 754 total order.
    pub fn total_cmp(&self, other: &Vec3) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then(self.y.total_cmp(&other.y))
            .then(self.z.total_cmp(&other.z))
    }
}

impl Add<Vec3> for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign<Vec3> for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub<Vec3> for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign<Vec3> for Vec3 {
    fn sub_assign(&mut self, rhs: Vec3) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Self::Output {
        rhs * self
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;

    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// Orientation as a unit quaternion. Only the operations the simulation needs
/// are provided; all angles are in radians and operations expect (but do not
/// validate) normalized inputs. `w` is the scalar part; the memory order
/// `x, y, z, w` matches common game-engine layouts.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation by `angle` around `axis`. The axis must be a unit vector.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let half = angle * 0.5;
        let axis = axis * half.sin();
        Self {
            x: axis.x,
            y: axis.y,
            z: axis.z,
            w: half.cos(),
        }
    }

    pub fn dot(&self, other: Quaternion) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn normalized(&self) -> Quaternion {
        let m = 1.0 / self.dot(*self).sqrt();
        Quaternion {
            x: self.x * m,
            y: self.y * m,
            z: self.z * m,
            w: self.w * m,
        }
    }

    pub fn approximately(&self, other: Quaternion) -> bool {
        float_eq(self.x, other.x)
            && float_eq(self.y, other.y)
            && float_eq(self.z, other.z)
            && float_eq(self.w, other.w)
    }

    /// Spherical interpolation between `a` and `b`. Undefined when `a` and `b`
    /// are (anti)parallel; callers guard with an identity check.
    pub fn interpolate(a: Quaternion, b: Quaternion, t: f32) -> Quaternion {
        let d = a.dot(b);
        let angle = d.acos();
        let s = 1.0 / (1.0 - d * d).sqrt();
        let w1 = (angle * (1.0 - t)).sin() * s;
        let w2 = (angle * t).sin() * s;
        Quaternion {
            x: a.x * w1 + b.x * w2,
            y: a.y * w1 + b.y * w2,
            z: a.z * w1 + b.z * w2,
            w: a.w * w1 + b.w * w2,
        }
    }

    pub fn total_cmp(&self, other: &Quaternion) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then(self.y.total_cmp(&other.y))
            .then(self.z.total_cmp(&other.z))
            .then(self.w.total_cmp(&other.w))
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Quaternion> for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Self::Output {
        Quaternion {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y + self.y * rhs.w + self.z * rhs.x - self.x * rhs.z,
            z: self.w * rhs.z + self.z * rhs.w + self.x * rhs.y - self.y * rhs.x,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }
}

impl MulAssign<Quaternion> for Quaternion {
    fn mul_assign(&mut self, rhs: Quaternion) {
        *self = *self * rhs;
    }
}

impl Mul<Vec3> for Quaternion {
    type Output = Vec3;

    fn mul(self, v: Vec3) -> Self::Output {
        // https://gamedev.stackexchange.com/questions/28395
        let u = Vec3::new(self.x, self.y, self.z);
        2.0 * u.dot(v) * u + (self.w * self.w - u.dot(u)) * v + 2.0 * self.w * u.cross(v)
    }
}

/// Axis-aligned bounding box. Used to quickly check that two volumes
/// definitely don't intersect. Overlap is closed on both ends: boxes that
/// merely touch count as overlapping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_and_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn from_center_and_extents(center: Vec3, extents: Vec3) -> Self {
        Self::from_center_and_half_extents(center, extents / 2.0)
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.max.x >= other.min.x
            && self.max.y >= other.min.y
            && self.max.z >= other.min.z
            && self.min.x <= other.max.x
            && self.min.y <= other.max.y
            && self.min.z <= other.max.z
    }

    pub fn encapsulate(&mut self, other: &Aabb) {
        self.max = self.max.max_components(other.max);
        self.min = self.min.min_components(other.min);
    }

    pub fn encapsulate_point(&mut self, point: Vec3) {
        self.max = self.max.max_components(point);
        self.min = self.min.min_components(point);
    }

    /// Extends the box to also cover its translation by `motion`.
    pub fn sweep(&mut self, motion: Vec3) {
        self.max = self.max.max_components(self.max + motion);
        self.min = self.min.min_components(self.min + motion);
    }
}

/// Symmetric 32x32 bit matrix deciding which collider layers interact.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMatrix {
    layers: [u32; 32],
}

impl LayerMatrix {
    pub fn new(layer_pairs: &[(u32, u32)]) -> Result<Self> {
        let mut matrix = Self::default();
        for &(x, y) in layer_pairs {
            matrix.set(x, y, true)?;
        }
        Ok(matrix)
    }

    pub fn set(&mut self, x: u32, y: u32, enabled: bool) -> Result<()> {
        if x >= 32 || y >= 32 {
            return Err(Error::OutOfRange("layer outside [0, 32)"));
        }
        if enabled {
            self.layers[x as usize] |= 1 << y;
            self.layers[y as usize] |= 1 << x;
        } else {
            self.layers[x as usize] &= !(1 << y);
            self.layers[y as usize] &= !(1 << x);
        }
        Ok(())
    }

    /// Panics when either index is outside `[0, 32)`.
    pub fn check(&self, x: u32, y: u32) -> bool {
        assert!(x < 32 && y < 32);
        self.layers[x as usize] & (1 << y) != 0
    }
}
