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
use crate::{extractor::Extractor, index_cache::IndexCache, math::Vec3};
use std::hash::Hash;

/// A single triangle of an [IsoMesh], with its vertex positions and normals.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
}

/// An indexed triangle mesh extracted from a scalar field.
///
/// Positions are in the physical units of the source volume (grid index
/// scaled by spacing). Normals are unit length and point toward decreasing
/// scalar values, out of the region above the threshold. Triangles wind
/// counter-clockwise when viewed from the side their normals face.
///
/// A mesh is a complete snapshot: each extraction produces a new mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsoMesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    indices: Vec<u32>,
}

impl IsoMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Vertex indices, three per triangle.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// An iterator over the triangles of the mesh, in extraction order.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.indices.chunks_exact(3).map(move |face| {
            let mut triangle = Triangle {
                positions: [Vec3::zero(); 3],
                normals: [Vec3::zero(); 3],
            };
            for (i, &index) in face.iter().enumerate() {
                triangle.positions[i] = self.positions[index as usize];
                triangle.normals[i] = self.normals[index as usize];
            }
            triangle
        })
    }

    /// The axis-aligned bounds of the mesh, or `None` if it is empty.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }

    /// Output the mesh through an [Extractor], vertices first, then indices.
    pub fn extract<E: Extractor>(&self, extractor: &mut E) {
        for (&position, &normal) in self.positions.iter().zip(&self.normals) {
            extractor.extract_vertex(position, normal);
        }
        for &index in &self.indices {
            extractor.extract_index(index as usize);
        }
    }

    pub(crate) fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push(position);
        self.normals.push(normal);
        index
    }

    pub(crate) fn push_face(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }
}

/// Accumulates a mesh, emitting each keyed vertex only once.
///
/// Vertices are keyed by whatever identifies them uniquely within the mesh
/// (for marching cubes, the grid edge they lie on). The key of every emitted
/// vertex is retained, in vertex order, so that meshes built independently
/// can later be stitched together.
pub struct MeshBuilder<K: Eq + Hash + Copy> {
    index_cache: IndexCache<K, u32>,
    keys: Vec<K>,
    mesh: IsoMesh,
}

impl<K: Eq + Hash + Copy> MeshBuilder<K> {
    pub fn new() -> Self {
        Self {
            index_cache: IndexCache::new(),
            keys: vec![],
            mesh: IsoMesh::new(),
        }
    }

    /// Look up the vertex for `key`, creating it if this is the first time
    /// the key has been seen. The normal is only evaluated for new vertices.
    pub fn add_vertex<N>(&mut self, key: K, position: Vec3, normal: N) -> u32
    where
        N: FnOnce() -> Vec3,
    {
        if let Some(index) = self.index_cache.get(key) {
            index
        } else {
            let index = self.mesh.push_vertex(position, normal());
            self.index_cache.put(key, index);
            self.keys.push(key);
            index
        }
    }

    /// Add a new face, given 3 vertices in counter-clockwise order.
    pub fn add_face(&mut self, a: u32, b: u32, c: u32) {
        self.mesh.push_face(a, b, c);
    }

    /// Finish the mesh, returning it along with the key of each vertex.
    pub fn build(self) -> (IsoMesh, Vec<K>) {
        (self.mesh, self.keys)
    }
}

/// Join meshes that were built separately from neighbouring regions.
///
/// Each part is paired with its vertex keys. A vertex of one part whose key
/// also appears in the part before it is merged with that earlier vertex, so
/// a surface split along a shared boundary is rejoined without duplicates.
/// Parts are appended in order.
pub fn stitch<K, I>(parts: I) -> IsoMesh
where
    K: Eq + Hash + Copy,
    I: IntoIterator<Item = (IsoMesh, Vec<K>)>,
{
    let mut mesh = IsoMesh::new();
    let mut previous: IndexCache<K, u32> = IndexCache::new();

    for (part, keys) in parts {
        let mut current = IndexCache::new();

        let remap: Vec<u32> = keys
            .iter()
            .enumerate()
            .map(|(i, &key)| {
                let index = match previous.get(key) {
                    Some(index) => index,
                    None => mesh.push_vertex(part.positions[i], part.normals[i]),
                };
                current.put(key, index);
                index
            })
            .collect();

        for face in part.indices.chunks_exact(3) {
            mesh.push_face(
                remap[face[0] as usize],
                remap[face[1] as usize],
                remap[face[2] as usize],
            );
        }

        previous = current;
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::vec3;

    fn quad(builder: &mut MeshBuilder<u32>, keys: [u32; 4], z: f32) {
        let n = || vec3(0.0, 0.0, 1.0);
        let v: Vec<u32> = keys
            .iter()
            .map(|&k| builder.add_vertex(k, vec3((k % 2) as f32, (k / 2) as f32, z), n))
            .collect();
        builder.add_face(v[0], v[1], v[3]);
        builder.add_face(v[0], v[3], v[2]);
    }

    #[test]
    fn test_builder_dedupes_keys() {
        let mut builder = MeshBuilder::new();
        quad(&mut builder, [0, 1, 2, 3], 0.0);
        quad(&mut builder, [2, 3, 4, 5], 0.0);
        let (mesh, keys) = builder.build();

        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(keys, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_builder_evaluates_normals_once() {
        let mut builder = MeshBuilder::new();
        let mut evaluated = 0;
        for _ in 0..3 {
            builder.add_vertex(9u32, Vec3::zero(), || {
                evaluated += 1;
                Vec3::one()
            });
        }
        assert_eq!(evaluated, 1);
    }

    #[test]
    fn test_stitch_merges_shared_vertices() {
        let mut a = MeshBuilder::new();
        quad(&mut a, [0, 1, 2, 3], 0.0);
        let mut b = MeshBuilder::new();
        quad(&mut b, [2, 3, 4, 5], 0.0);

        let mesh = stitch(vec![a.build(), b.build()]);
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(mesh.indices()[6..], [2, 3, 5, 2, 5, 4]);
    }

    #[test]
    fn test_triangles_and_bounds() {
        let mut builder = MeshBuilder::new();
        quad(&mut builder, [0, 1, 2, 3], 2.0);
        let (mesh, _) = builder.build();

        let triangles: Vec<Triangle> = mesh.triangles().collect();
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[0].positions[1], vec3(1.0, 0.0, 2.0));
        assert_eq!(triangles[1].normals[2], vec3(0.0, 0.0, 1.0));

        assert_eq!(
            mesh.bounds(),
            Some((vec3(0.0, 0.0, 2.0), vec3(1.0, 1.0, 2.0)))
        );
        assert_eq!(IsoMesh::new().bounds(), None);
    }
}
