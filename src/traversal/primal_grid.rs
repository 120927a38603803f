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
use crate::{marching_cubes_tables::CORNERS, math::Vec3, source::ScalarField};

/// Walks the cubes of a sampled scalar field one z-layer at a time.
///
/// A layer is the slab of cubes between grid planes `z` and `z + 1`. Layers
/// share no mutable state, so separate layers may be traversed concurrently.
pub struct PrimalGrid<'a, F: ScalarField> {
    field: &'a F,
}

impl<'a, F: ScalarField> PrimalGrid<'a, F> {
    pub fn new(field: &'a F) -> Self {
        Self { field }
    }

    /// The number of cube layers, zero if the field is too thin along any
    /// axis to contain a cube.
    pub fn layer_count(&self) -> usize {
        let dims = self.field.dims();
        if dims.is_degenerate() {
            0
        } else {
            dims.depth - 1
        }
    }

    /// Traverse the cubes of layer `z`. The callback will be invoked for each
    /// 2x2x2 set of neighbouring grid points, and provided the corner grid
    /// references, the physical corner positions, and the field values at
    /// those points.
    pub fn traverse_layer<C>(&self, z: usize, mut callback: C)
    where
        C: FnMut(&[(usize, usize, usize); 8], &[Vec3; 8], &[f32; 8]),
    {
        let dims = self.field.dims();
        if z >= self.layer_count() {
            return;
        }

        let spacing = self.field.spacing();
        let (width, height) = (dims.width, dims.height);

        // Cache both planes bounding the layer
        let mut layers = [vec![0f32; width * height], vec![0f32; width * height]];
        for (dz, layer) in layers.iter_mut().enumerate() {
            for y in 0..height {
                for x in 0..width {
                    layer[y * width + x] = self.field.sample(x, y, z + dz);
                }
            }
        }

        let mut keys = [(0, 0, 0); 8];
        let mut corners = [Vec3::zero(); 8];
        let mut values = [0f32; 8];

        for y in 0..height - 1 {
            for x in 0..width - 1 {
                for i in 0..8 {
                    let [cx, cy, cz] = CORNERS[i];
                    keys[i] = (x + cx, y + cy, z + cz);
                    corners[i] =
                        Vec3::new((x + cx) as f32, (y + cy) as f32, (z + cz) as f32) * spacing;
                    values[i] = layers[cz][(y + cy) * width + x + cx];
                }

                callback(&keys, &corners, &values);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Dimensions, Volume};

    #[test]
    fn test_visits_every_cube_once() {
        let dims = Dimensions::new(4, 3, 5);
        let volume = Volume::from_fn(dims, Vec3::new(1.0, 1.0, 2.0), |x, y, z| {
            (x + 10 * y + 100 * z) as u16
        });
        let grid = PrimalGrid::new(&volume);
        assert_eq!(grid.layer_count(), 4);

        let mut visited = 0;
        for z in 0..grid.layer_count() {
            grid.traverse_layer(z, |keys, corners, values| {
                visited += 1;
                for i in 0..8 {
                    let (x, y, z) = keys[i];
                    assert_eq!(values[i], volume.get(x, y, z) as f32);
                    assert_eq!(corners[i], volume.position(x, y, z));
                }
            });
        }
        assert_eq!(visited, 3 * 2 * 4);
    }

    #[test]
    fn test_degenerate_field_has_no_layers() {
        let volume = Volume::filled(Dimensions::new(5, 5, 1), Vec3::one(), 7u16);
        let grid = PrimalGrid::new(&volume);
        assert_eq!(grid.layer_count(), 0);

        let mut visited = 0;
        grid.traverse_layer(0, |_, _, _| visited += 1);
        assert_eq!(visited, 0);
    }
}
