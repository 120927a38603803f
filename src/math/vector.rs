// Copyright 2021 Tristam MacDonald
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A minimal 3 dimensional vector type, used for mesh positions, normals and
//! field gradients.

/// A 3 dimensional vector
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

pub fn vec3(x: f32, y: f32, z: f32) -> Vec3 {
    Vec3::new(x, y, z)
}

macro_rules! impl_arithmetic_op {
    ($op_name:ident, $op_small_name:ident, $op:tt) => {
        impl std::ops::$op_name for Vec3 {
            type Output = Vec3;
            fn $op_small_name(self, other: Vec3) -> Vec3 {
                Vec3::new(self.x $op other.x, self.y $op other.y, self.z $op other.z)
            }
        }
        impl std::ops::$op_name<f32> for Vec3 {
            type Output = Vec3;
            fn $op_small_name(self, other: f32) -> Vec3 {
                Vec3::new(self.x $op other, self.y $op other, self.z $op other)
            }
        }
        impl std::ops::$op_name<Vec3> for f32 {
            type Output = Vec3;
            fn $op_small_name(self, other: Vec3) -> Vec3 {
                Vec3::new(self $op other.x, self $op other.y, self $op other.z)
            }
        }
    };
}

macro_rules! impl_arithmetic_assign_op {
    ($op_assign_name:ident, $op_assign_small_name:ident, $op:tt) => {
        impl std::ops::$op_assign_name for Vec3 {
            fn $op_assign_small_name(&mut self, other: Vec3) {
                self.x $op other.x;
                self.y $op other.y;
                self.z $op other.z;
            }
        }
    };
}

impl_arithmetic_op!(Add, add, +);
impl_arithmetic_op!(Sub, sub, -);
impl_arithmetic_op!(Mul, mul, *);
impl_arithmetic_op!(Div, div, /);
impl_arithmetic_assign_op!(AddAssign, add_assign, +=);
impl_arithmetic_assign_op!(SubAssign, sub_assign, -=);

impl Vec3 {
    /// Create a vector
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Create a vector with all coordinates set to zero
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Create a vector with all coordinates set to one
    pub fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    /// Squared Euclidean length of this vector
    pub fn len_sq(&self) -> f32 {
        self.dot(*self)
    }

    /// Euclidean length of this vector
    pub fn len(&self) -> f32 {
        self.len_sq().sqrt()
    }

    /// Normalised copy of this vector, or `None` for a (near) zero vector
    pub fn normalised(&self) -> Option<Self> {
        let l = self.len();
        if !l.is_finite() || l < std::f32::EPSILON {
            None
        } else {
            Some(*self / l)
        }
    }

    /// Calculate the dot product of this vector and another
    pub fn dot(&self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Compute the cross product of this vector and another
    pub fn cross(&self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    /// Create a vector by taking the min value of each component in this vector
    /// and another
    pub fn min(&self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Create a vector by taking the max value of each component in this vector
    /// and another
    pub fn max(&self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// The components as an array, in (x, y, z) order
    pub fn to_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl std::default::Default for Vec3 {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(a: [f32; 3]) -> Self {
        Vec3::new(a[0], a[1], a[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::lerp;

    #[test]
    fn test_vector_ops() {
        assert_eq!(vec3(1.0, 2.0, 3.0).len_sq(), 14.0);
        assert_eq!(
            vec3(1.0, 0.0, 0.0).cross(vec3(0.0, 1.0, 0.0)),
            vec3(0.0, 0.0, 1.0)
        );
        assert_eq!(vec3(0.0, 3.0, 4.0).normalised(), Some(vec3(0.0, 0.6, 0.8)));
        assert_eq!(Vec3::zero().normalised(), None);
        assert_eq!(
            lerp(Vec3::zero(), vec3(2.0, 4.0, 8.0), 0.5),
            vec3(1.0, 2.0, 4.0)
        );
    }
}
