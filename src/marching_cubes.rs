// Copyright 2018 Tristam MacDonald
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
    index_cache::GridKey,
    marching_cubes_impl::{classify_corners, find_edge_crossings, march_cube},
    marching_cubes_tables::EDGE_CONNECTION,
    math::{lerp, Vec3},
    mesh::{stitch, IsoMesh, MeshBuilder},
    source::ScalarField,
    traversal::PrimalGrid,
};
use log::{debug, info};
use rayon::prelude::*;
use std::time::Instant;

/// Extracts isosurface meshes from sampled scalar fields using the marching
/// cubes algorithm.
///
/// Corners with a value on or above the threshold are inside the surface.
/// Vertex normals come from the central-difference gradient of the field,
/// interpolated along each edge and negated, so they point toward lower
/// values. Thresholds outside the range of the field, and fields less than
/// two samples thick along any axis, produce an empty mesh.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MarchingCubes {
    threshold: f32,
}

impl MarchingCubes {
    /// Create a new MarchingCubes that extracts the surface at `threshold`.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Extracts a mesh from the given [ScalarField].
    ///
    /// Layers of cubes are processed in parallel and stitched back together in
    /// order, so the result is identical to a sequential traversal.
    pub fn extract<F: ScalarField>(&self, field: &F) -> IsoMesh {
        self.extract_cancellable(field, &|| false)
            .unwrap_or_else(|| unreachable!("extraction cancelled without a cancel flag"))
    }

    /// As [MarchingCubes::extract], but polls `cancelled` before each layer of
    /// cubes and returns `None` once it reports true. A cancelled extraction
    /// never yields a partial mesh.
    pub fn extract_cancellable<F: ScalarField>(
        &self,
        field: &F,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Option<IsoMesh> {
        let start = Instant::now();
        let grid = PrimalGrid::new(field);

        let layers: Option<Vec<(IsoMesh, Vec<GridKey>)>> = (0..grid.layer_count())
            .into_par_iter()
            .map(|z| {
                if cancelled() {
                    None
                } else {
                    Some(self.extract_layer(&grid, field, z))
                }
            })
            .collect();

        let layers = match layers {
            Some(layers) => layers,
            None => {
                debug!("Extraction at threshold {} cancelled", self.threshold);
                return None;
            }
        };

        let mesh = stitch(layers);
        info!(
            "Extracted {} triangles ({} vertices) at threshold {} in {:.1?}",
            mesh.triangle_count(),
            mesh.vertex_count(),
            self.threshold,
            start.elapsed()
        );

        Some(mesh)
    }

    fn extract_layer<F: ScalarField>(
        &self,
        grid: &PrimalGrid<F>,
        field: &F,
        z: usize,
    ) -> (IsoMesh, Vec<GridKey>) {
        let threshold = self.threshold;
        let mut mesh_builder = MeshBuilder::new();

        grid.traverse_layer(z, |keys, corners, values| {
            let cube_index = classify_corners(values, threshold);
            if cube_index == 0 || cube_index == 0xff {
                return;
            }

            let mut offsets = [0f32; 12];
            let mut vertices = [Vec3::zero(); 12];
            find_edge_crossings(
                cube_index,
                corners,
                values,
                threshold,
                &mut offsets,
                &mut vertices,
            );

            march_cube(cube_index, |a, b, c| {
                let mut face = [0u32; 3];
                for (slot, &edge) in face.iter_mut().zip(&[a, b, c]) {
                    let key = GridKey::new(keys, edge);
                    *slot = mesh_builder.add_vertex(key, vertices[edge], || {
                        edge_normal(field, keys, corners, cube_index, edge, offsets[edge])
                    });
                }
                mesh_builder.add_face(face[0], face[1], face[2]);
            });
        });

        mesh_builder.build()
    }
}

/// The surface normal where the surface crosses `edge`.
///
/// Interpolates the field gradient between the edge's corners and points it
/// toward lower values. Where the gradient vanishes, falls back to the
/// direction along the edge from its inside corner to its outside corner.
fn edge_normal<F: ScalarField>(
    field: &F,
    keys: &[(usize, usize, usize); 8],
    corners: &[Vec3; 8],
    cube_index: usize,
    edge: usize,
    t: f32,
) -> Vec3 {
    let [u, v] = EDGE_CONNECTION[edge];
    let (ux, uy, uz) = keys[u];
    let (vx, vy, vz) = keys[v];

    let gradient = lerp(field.gradient(ux, uy, uz), field.gradient(vx, vy, vz), t);

    (-gradient)
        .normalised()
        .or_else(|| {
            let outward = if (cube_index >> u) & 1 == 1 {
                corners[v] - corners[u]
            } else {
                corners[u] - corners[v]
            };
            outward.normalised()
        })
        .unwrap_or_else(|| Vec3::new(0.0, 0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Dimensions, Volume};
    use std::collections::HashMap;

    fn sphere(size: usize, spacing: Vec3) -> Volume<f32> {
        let c = (size - 1) as f32 / 2.0;
        Volume::from_fn(Dimensions::new(size, size, size), spacing, |x, y, z| {
            let d = Vec3::new(x as f32 - c, y as f32 - c, z as f32 - c).len();
            1000.0 - 100.0 * d
        })
    }

    /// Every directed edge must be matched by the reverse edge of a
    /// neighbouring triangle.
    fn assert_closed(mesh: &IsoMesh) {
        let mut directed = HashMap::new();
        for face in mesh.indices().chunks_exact(3) {
            for &(a, b) in &[(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                *directed.entry((a, b)).or_insert(0) += 1;
            }
        }
        for (&(a, b), &n) in &directed {
            assert_eq!(directed.get(&(b, a)), Some(&n), "open edge {}-{}", a, b);
        }
    }

    #[test]
    fn test_single_corner() {
        let values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
        // corner 7 sits at (0, 1, 1)
        let volume = Volume::from_fn(Dimensions::new(2, 2, 2), Vec3::one(), |x, y, z| {
            if (x, y, z) == (0, 1, 1) {
                values[7]
            } else {
                values[0]
            }
        });

        let mesh = MarchingCubes::new(5.0).extract(&volume);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);

        let mut positions = mesh.positions().to_vec();
        positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(
            positions,
            [
                Vec3::new(0.0, 0.5, 1.0),
                Vec3::new(0.0, 1.0, 0.5),
                Vec3::new(0.5, 1.0, 1.0),
            ]
        );

        // normals face away from the lone high corner
        let corner = Vec3::new(0.0, 1.0, 1.0);
        for (p, n) in mesh.positions().iter().zip(mesh.normals()) {
            assert!((n.len() - 1.0).abs() < 1e-5);
            assert!(n.dot(*p - corner) > 0.0);
        }
    }

    #[test]
    fn test_out_of_range_thresholds_are_empty() {
        let volume = sphere(8, Vec3::one());
        assert!(MarchingCubes::new(-1.0e6).extract(&volume).is_empty());
        assert!(MarchingCubes::new(1.0e6).extract(&volume).is_empty());
        assert!(MarchingCubes::new(f32::NAN).extract(&volume).is_empty());
    }

    #[test]
    fn test_degenerate_volumes_are_empty() {
        for &dims in &[
            Dimensions::new(1, 6, 6),
            Dimensions::new(6, 1, 6),
            Dimensions::new(6, 6, 1),
        ] {
            let volume = Volume::from_fn(dims, Vec3::one(), |x, y, z| ((x + y + z) % 2) as u16);
            assert!(MarchingCubes::new(0.5).extract(&volume).is_empty());
        }
    }

    #[test]
    fn test_uniform_volume_is_empty() {
        let volume = Volume::filled(Dimensions::new(4, 4, 4), Vec3::one(), 300u16);
        assert!(MarchingCubes::new(300.0).extract(&volume).is_empty());
    }

    #[test]
    fn test_sphere_is_closed_and_outward() {
        let spacing = Vec3::new(1.0, 1.0, 2.0);
        let volume = sphere(12, spacing);
        let mesh = MarchingCubes::new(700.0).extract(&volume);
        assert!(!mesh.is_empty());
        assert_closed(&mesh);

        let centre = Vec3::new(5.5, 5.5, 5.5) * spacing;
        let mut signed_volume = 0.0;
        for triangle in mesh.triangles() {
            let [a, b, c] = triangle.positions;
            signed_volume += (a - centre).dot((b - centre).cross(c - centre)) / 6.0;

            for (p, n) in triangle.positions.iter().zip(&triangle.normals) {
                assert!((n.len() - 1.0).abs() < 1e-4);
                assert!(n.dot(*p - centre) > 0.0);
            }
        }
        // counter-clockwise winding seen from outside gives a positive volume
        assert!(signed_volume > 0.0);
    }

    #[test]
    fn test_thresholds_on_sample_values_stay_closed() {
        // integer samples with a zero border, so every surface is closed and
        // many corners sit exactly on the threshold
        let mut state = 0x2545_f491u32;
        for _ in 0..40 {
            let volume = Volume::from_fn(Dimensions::new(7, 7, 7), Vec3::one(), |x, y, z| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let border = x == 0 || y == 0 || z == 0 || x == 6 || y == 6 || z == 6;
                if border {
                    0u16
                } else {
                    (state % 7) as u16 * 5
                }
            });

            for &threshold in &[5.0, 10.0, 15.0, 20.0, 25.0] {
                let mesh = MarchingCubes::new(threshold).extract(&volume);
                assert_closed(&mesh);
            }
        }
    }

    #[test]
    fn test_vertices_scaled_by_spacing() {
        let spacing = Vec3::new(0.5, 1.0, 3.0);
        let volume = sphere(10, spacing);
        let mesh = MarchingCubes::new(800.0).extract(&volume);

        let (lo, hi) = mesh.bounds().unwrap();
        let extent = hi - lo;
        // a sphere of radius 2 voxels, stretched by the spacing
        assert!((extent.x - 4.0 * 0.5).abs() < 0.2);
        assert!((extent.z - 4.0 * 3.0).abs() < 1.2);
    }

    #[test]
    fn test_shared_vertices_emitted_once() {
        let volume = sphere(10, Vec3::one());
        let mesh = MarchingCubes::new(750.0).extract(&volume);

        let mut seen = std::collections::HashSet::new();
        for p in mesh.positions() {
            assert!(seen.insert((p.x.to_bits(), p.y.to_bits(), p.z.to_bits())));
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let volume = sphere(14, Vec3::one());
        let a = MarchingCubes::new(620.0).extract(&volume);
        let b = MarchingCubes::new(620.0).extract(&volume);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancelled_extraction_yields_nothing() {
        let volume = sphere(8, Vec3::one());
        assert!(MarchingCubes::new(700.0)
            .extract_cancellable(&volume, &|| true)
            .is_none());
    }
}
