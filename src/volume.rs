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
use crate::math::Vec3;

/// A scalar type that can be stored in a [Volume].
///
/// Samples are widened to `f32` for thresholding, smoothing and
/// interpolation. Every `u16` is exactly representable as an `f32`.
pub trait Voxel: Copy + Send + Sync + 'static {
    fn to_f32(self) -> f32;
}

impl Voxel for u16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Voxel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

/// The extent of a volume in voxels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dimensions {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Number of samples in a single z-plane.
    pub fn slice_len(&self) -> usize {
        self.width * self.height
    }

    /// Total number of samples.
    pub fn voxel_count(&self) -> usize {
        self.slice_len() * self.depth
    }

    /// Offset of the sample at (x, y, z) in x-fastest order.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    /// A volume with fewer than two samples along any axis contains no cubes,
    /// and so can never produce a surface.
    pub fn is_degenerate(&self) -> bool {
        self.width < 2 || self.height < 2 || self.depth < 2
    }

    /// The extent along axis 0 (x), 1 (y) or 2 (z).
    pub fn axis(&self, axis: usize) -> usize {
        match axis {
            0 => self.width,
            1 => self.height,
            _ => self.depth,
        }
    }
}

/// A dense 3D grid of scalar samples with physical spacing between
/// neighbouring samples.
///
/// Volumes are immutable once built. Operations that change the data
/// (re-slicing, smoothing) produce a new volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    dims: Dimensions,
    spacing: Vec3,
    data: Vec<T>,
}

/// Raw samples as loaded from a slice stack.
pub type ScalarVolume = Volume<u16>;

/// Samples after Gaussian smoothing, same shape and spacing as their source.
pub type SmoothedVolume = Volume<f32>;

impl<T: Voxel> Volume<T> {
    /// Wrap `data`, stored x-fastest then y then z.
    ///
    /// Panics if `data` does not hold exactly `dims.voxel_count()` samples.
    pub fn new(dims: Dimensions, spacing: Vec3, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            dims.voxel_count(),
            "volume data does not match its dimensions"
        );
        Self {
            dims,
            spacing,
            data,
        }
    }

    /// A volume with every sample set to `value`.
    pub fn filled(dims: Dimensions, spacing: Vec3, value: T) -> Self {
        Self::new(dims, spacing, vec![value; dims.voxel_count()])
    }

    /// Build a volume by evaluating `f` at every grid coordinate.
    pub fn from_fn<F>(dims: Dimensions, spacing: Vec3, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> T,
    {
        let mut data = Vec::with_capacity(dims.voxel_count());
        for z in 0..dims.depth {
            for y in 0..dims.height {
                for x in 0..dims.width {
                    data.push(f(x, y, z));
                }
            }
        }
        Self::new(dims, spacing, data)
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Physical distance between neighbouring samples along each axis.
    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// The sample at (x, y, z). Coordinates must be in bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> T {
        self.data[self.dims.index(x, y, z)]
    }

    /// The samples of z-plane `z`.
    pub fn slice(&self, z: usize) -> &[T] {
        let len = self.dims.slice_len();
        &self.data[z * len..(z + 1) * len]
    }

    /// Copy of the first `count` z-planes, in the same order.
    ///
    /// `count` is clamped to `[1, depth]`.
    pub fn first_slices(&self, count: usize) -> Self {
        let depth = count.max(1).min(self.dims.depth);
        let dims = Dimensions::new(self.dims.width, self.dims.height, depth);
        Self {
            dims,
            spacing: self.spacing,
            data: self.data[..dims.voxel_count()].to_vec(),
        }
    }

    /// Physical position of the grid point (x, y, z).
    pub fn position(&self, x: usize, y: usize, z: usize) -> Vec3 {
        Vec3::new(x as f32, y as f32, z as f32) * self.spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing() {
        let dims = Dimensions::new(3, 2, 4);
        let volume = Volume::from_fn(dims, Vec3::one(), |x, y, z| (x + 10 * y + 100 * z) as u16);

        assert_eq!(dims.voxel_count(), 24);
        assert_eq!(volume.get(2, 1, 3), 312);
        assert_eq!(volume.slice(1)[4], 111);
        assert_eq!(volume.data()[dims.index(1, 0, 2)], 201);
    }

    #[test]
    fn test_first_slices() {
        let dims = Dimensions::new(2, 2, 5);
        let volume = Volume::from_fn(dims, Vec3::new(1.0, 1.0, 2.0), |_, _, z| z as u16);

        let sliced = volume.first_slices(3);
        assert_eq!(sliced.dims(), Dimensions::new(2, 2, 3));
        assert_eq!(sliced.spacing(), volume.spacing());
        assert_eq!(sliced.get(1, 1, 2), 2);

        assert_eq!(volume.first_slices(0).dims().depth, 1);
        assert_eq!(volume.first_slices(99), volume);
    }

    #[test]
    fn test_degenerate() {
        assert!(Dimensions::new(1, 8, 8).is_degenerate());
        assert!(Dimensions::new(8, 8, 1).is_degenerate());
        assert!(!Dimensions::new(2, 2, 2).is_degenerate());
    }

    #[test]
    fn test_position_uses_spacing() {
        let volume = Volume::filled(Dimensions::new(4, 4, 4), Vec3::new(1.0, 0.5, 2.0), 0u16);
        assert_eq!(volume.position(1, 2, 3), Vec3::new(1.0, 1.0, 6.0));
    }
}
