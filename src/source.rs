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
use crate::{
    math::Vec3,
    volume::{Dimensions, Volume, Voxel},
};

/// A scalar field sampled on a regular grid, as consumed by the isosurface
/// extractor.
pub trait ScalarField: Sync {
    /// The number of grid points along each axis.
    fn dims(&self) -> Dimensions;

    /// Physical distance between neighbouring grid points along each axis.
    fn spacing(&self) -> Vec3;

    /// Samples the field at the given grid point, which must be in bounds.
    fn sample(&self, x: usize, y: usize, z: usize) -> f32;

    /// Estimates the gradient of the field at a grid point, in physical units.
    ///
    /// Uses central differences in the interior and one-sided differences on
    /// the faces of the volume. Axes only one sample thick have no gradient.
    fn gradient(&self, x: usize, y: usize, z: usize) -> Vec3 {
        let dims = self.dims();
        let spacing = self.spacing();
        let p = [x, y, z];

        let mut g = [0f32; 3];
        for axis in 0..3 {
            let extent = dims.axis(axis);
            if extent < 2 {
                continue;
            }

            let lo = p[axis].saturating_sub(1);
            let hi = (p[axis] + 1).min(extent - 1);

            let mut a = p;
            let mut b = p;
            a[axis] = lo;
            b[axis] = hi;

            let delta = self.sample(b[0], b[1], b[2]) - self.sample(a[0], a[1], a[2]);
            g[axis] = delta / ((hi - lo) as f32 * spacing.to_array()[axis]);
        }

        Vec3::from(g)
    }
}

impl<T: Voxel> ScalarField for Volume<T> {
    fn dims(&self) -> Dimensions {
        Volume::dims(self)
    }

    fn spacing(&self) -> Vec3 {
        Volume::spacing(self)
    }

    #[inline]
    fn sample(&self, x: usize, y: usize, z: usize) -> f32 {
        self.get(x, y, z).to_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_of_linear_ramp() {
        // value = 2x + 3y + 4z, with z samples twice as far apart
        let dims = Dimensions::new(4, 4, 4);
        let volume = Volume::from_fn(dims, Vec3::new(1.0, 1.0, 2.0), |x, y, z| {
            (2 * x + 3 * y + 4 * z) as f32
        });

        // interior and faces agree on a linear field
        for &(x, y, z) in &[(1, 1, 1), (0, 0, 0), (3, 3, 3), (0, 2, 3)] {
            assert_eq!(volume.gradient(x, y, z), Vec3::new(2.0, 3.0, 2.0));
        }
    }

    #[test]
    fn test_flat_axis_has_no_gradient() {
        let volume = Volume::from_fn(Dimensions::new(3, 3, 1), Vec3::one(), |x, _, _| x as u16);
        assert_eq!(volume.gradient(1, 1, 0), Vec3::new(1.0, 0.0, 0.0));
    }
}
