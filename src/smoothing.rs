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
use crate::volume::{Dimensions, SmoothedVolume, Volume, Voxel};
use log::info;
use rayon::prelude::*;
use std::time::Instant;

/// A normalised, symmetric 1D Gaussian kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Sample a Gaussian with standard deviation `sigma` (in voxels), truncated
    /// at `truncate` standard deviations either side of the centre.
    ///
    /// A non-positive `sigma` yields the identity kernel.
    pub fn new(sigma: f32, truncate: f32) -> Self {
        if sigma.is_nan() || sigma <= 0.0 || sigma.is_infinite() {
            return Self::identity();
        }

        let radius = (sigma * truncate.max(0.0)).ceil() as usize;
        if radius == 0 {
            return Self::identity();
        }

        let denominator = 2.0 * (sigma as f64) * (sigma as f64);
        let raw: Vec<f64> = (0..=2 * radius)
            .map(|i| {
                let d = i as f64 - radius as f64;
                (-d * d / denominator).exp()
            })
            .collect();
        let total: f64 = raw.iter().sum();

        Self {
            weights: raw.iter().map(|w| (w / total) as f32).collect(),
        }
    }

    pub fn identity() -> Self {
        Self { weights: vec![1.0] }
    }

    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn is_identity(&self) -> bool {
        self.weights.len() == 1
    }

    /// Convolve at `pos` along a line of `len` samples, replicating the end
    /// samples for taps that fall outside the line.
    ///
    /// The sum is taken over differences from the centre sample in `f64`, so a
    /// constant signal is returned unchanged and the only rounding is the final
    /// conversion to `f32`.
    #[inline]
    fn convolve<F>(&self, pos: usize, len: usize, fetch: F) -> f32
    where
        F: Fn(usize) -> f32,
    {
        let radius = self.radius();
        let centre = fetch(pos) as f64;

        let mut acc = 0f64;
        for (k, &w) in self.weights.iter().enumerate() {
            let p = (pos + k).saturating_sub(radius).min(len - 1);
            acc += w as f64 * (fetch(p) as f64 - centre);
        }

        (centre + acc) as f32
    }
}

/// Separable 3D Gaussian smoothing, used to suppress acquisition noise before
/// surface extraction.
///
/// The volume is convolved along x, then y, then z. Samples beyond the faces
/// of the volume take the value of the nearest sample inside it
/// (clamp-to-edge), so a uniform volume remains exactly uniform. Output
/// samples are `f32`, which represents every 16-bit input exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianSmoother {
    kernels: [GaussianKernel; 3],
}

impl Default for GaussianSmoother {
    fn default() -> Self {
        Self::new([1.0; 3], 3.0)
    }
}

impl GaussianSmoother {
    /// Create a smoother from per-axis standard deviations (in voxels) and
    /// the number of standard deviations at which to truncate each kernel.
    pub fn new(sigma: [f32; 3], truncate: f32) -> Self {
        Self {
            kernels: [
                GaussianKernel::new(sigma[0], truncate),
                GaussianKernel::new(sigma[1], truncate),
                GaussianKernel::new(sigma[2], truncate),
            ],
        }
    }

    /// A smoother that copies its input unchanged.
    pub fn identity() -> Self {
        Self::new([0.0; 3], 0.0)
    }

    pub fn kernel(&self, axis: usize) -> &GaussianKernel {
        &self.kernels[axis]
    }

    /// Smooth `volume`, producing a new volume of identical shape and spacing.
    pub fn smooth<T: Voxel>(&self, volume: &Volume<T>) -> SmoothedVolume {
        self.smooth_cancellable(volume, &|| false)
            .unwrap_or_else(|| unreachable!("smoothing cancelled without a cancel flag"))
    }

    /// As [GaussianSmoother::smooth], but checks `cancelled` between passes and
    /// gives up, returning `None`, once it reports true.
    pub fn smooth_cancellable<T: Voxel>(
        &self,
        volume: &Volume<T>,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Option<SmoothedVolume> {
        let start = Instant::now();
        let dims = volume.dims();

        let mut current: Vec<f32> = volume.data().par_iter().map(|v| v.to_f32()).collect();
        let mut scratch = vec![0f32; current.len()];

        for axis in 0..3 {
            if cancelled() {
                return None;
            }
            let kernel = &self.kernels[axis];
            if kernel.is_identity() || dims.axis(axis) < 2 {
                continue;
            }

            match axis {
                0 => convolve_x(kernel, dims, &current, &mut scratch),
                1 => convolve_y(kernel, dims, &current, &mut scratch),
                _ => convolve_z(kernel, dims, &current, &mut scratch),
            }
            std::mem::swap(&mut current, &mut scratch);
        }

        info!(
            "Smoothed {}x{}x{} volume in {:.1?}",
            dims.width,
            dims.height,
            dims.depth,
            start.elapsed()
        );

        Some(Volume::new(dims, volume.spacing(), current))
    }
}

fn convolve_x(kernel: &GaussianKernel, dims: Dimensions, src: &[f32], dst: &mut [f32]) {
    let width = dims.width;
    dst.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(out, row)| {
            for (x, o) in out.iter_mut().enumerate() {
                *o = kernel.convolve(x, width, |i| row[i]);
            }
        });
}

fn convolve_y(kernel: &GaussianKernel, dims: Dimensions, src: &[f32], dst: &mut [f32]) {
    let (width, height) = (dims.width, dims.height);
    dst.par_chunks_mut(dims.slice_len())
        .zip(src.par_chunks(dims.slice_len()))
        .for_each(|(out, plane)| {
            for y in 0..height {
                for x in 0..width {
                    out[y * width + x] = kernel.convolve(y, height, |i| plane[i * width + x]);
                }
            }
        });
}

fn convolve_z(kernel: &GaussianKernel, dims: Dimensions, src: &[f32], dst: &mut [f32]) {
    let (plane_len, depth) = (dims.slice_len(), dims.depth);
    dst.par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(z, out)| {
            for (i, o) in out.iter_mut().enumerate() {
                *o = kernel.convolve(z, depth, |k| src[k * plane_len + i]);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_kernel_shape() {
        let kernel = GaussianKernel::new(1.0, 3.0);
        assert_eq!(kernel.radius(), 3);

        let w = kernel.weights();
        let total: f32 = w.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        for i in 0..kernel.radius() {
            assert_eq!(w[i], w[w.len() - 1 - i]);
            assert!(w[i] < w[i + 1]);
        }

        assert!(GaussianKernel::new(0.0, 3.0).is_identity());
        assert!(GaussianKernel::new(-1.0, 3.0).is_identity());
        assert!(GaussianKernel::new(f32::NAN, 3.0).is_identity());
        assert!(GaussianKernel::new(f32::INFINITY, 3.0).is_identity());
        assert_eq!(GaussianKernel::new(0.5, 2.0).radius(), 1);
    }

    #[test]
    fn test_shape_preserved() {
        let smoother = GaussianSmoother::default();
        for &(w, h, d) in &[(5, 4, 3), (1, 6, 2), (7, 1, 1), (2, 2, 9)] {
            let dims = Dimensions::new(w, h, d);
            let volume = Volume::from_fn(dims, Vec3::new(1.0, 1.0, 2.0), |x, y, z| {
                (x * 7 + y * 13 + z * 31) as u16
            });

            let smoothed = smoother.smooth(&volume);
            assert_eq!(smoothed.dims(), dims);
            assert_eq!(smoothed.spacing(), volume.spacing());
        }
    }

    #[test]
    fn test_uniform_stays_uniform() {
        let dims = Dimensions::new(6, 5, 4);
        let volume = Volume::filled(dims, Vec3::one(), 1234u16);

        for smoother in &[
            GaussianSmoother::default(),
            GaussianSmoother::new([2.0, 0.5, 3.0], 2.5),
        ] {
            let smoothed = smoother.smooth(&volume);
            assert!(smoothed.data().iter().all(|&v| v == 1234.0));
        }
    }

    #[test]
    fn test_identity_copies_input() {
        let dims = Dimensions::new(3, 3, 3);
        let volume = Volume::from_fn(dims, Vec3::one(), |x, y, z| (x + y * z) as u16);

        let smoothed = GaussianSmoother::identity().smooth(&volume);
        for (a, b) in volume.data().iter().zip(smoothed.data()) {
            assert_eq!(*a as f32, *b);
        }
    }

    #[test]
    fn test_impulse_response_is_separable() {
        let dims = Dimensions::new(9, 9, 9);
        let volume = Volume::from_fn(dims, Vec3::one(), |x, y, z| {
            if (x, y, z) == (4, 4, 4) {
                1000u16
            } else {
                0
            }
        });

        let smoother = GaussianSmoother::default();
        let smoothed = smoother.smooth(&volume);
        let w = smoother.kernel(0).weights();
        let r = smoother.kernel(0).radius();

        // the spike spreads out as the outer product of the 1D kernels
        for &(x, y, z) in &[(4, 4, 4), (5, 4, 4), (3, 6, 5), (1, 4, 7)] {
            let expected = 1000.0 * w[x + r - 4] * w[y + r - 4] * w[z + r - 4];
            assert!((smoothed.get(x, y, z) - expected).abs() < 1e-3);
        }

        // and preserves total mass while it stays clear of the faces
        let total: f32 = smoothed.data().iter().sum();
        assert!((total - 1000.0).abs() < 1e-2);
    }

    #[test]
    fn test_clamp_to_edge_at_faces() {
        // a step along x: the first column is replicated beyond the face, so the
        // face sample only sees its own value and its inner neighbours
        let dims = Dimensions::new(8, 1, 1);
        let volume = Volume::from_fn(dims, Vec3::one(), |x, _, _| if x < 4 { 0u16 } else { 100 });

        let smoothed = GaussianSmoother::default().smooth(&volume);
        assert_eq!(smoothed.get(0, 0, 0), 0.0);
        assert_eq!(smoothed.get(7, 0, 0), 100.0);
        assert!(smoothed.get(3, 0, 0) > 0.0 && smoothed.get(3, 0, 0) < 50.0);
        assert!(smoothed.get(4, 0, 0) > 50.0 && smoothed.get(4, 0, 0) < 100.0);
    }

    #[test]
    fn test_cancelled_before_first_pass() {
        let volume = Volume::filled(Dimensions::new(4, 4, 4), Vec3::one(), 1u16);
        assert!(GaussianSmoother::default()
            .smooth_cancellable(&volume, &|| true)
            .is_none());
    }
}
