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

/// Trait for outputting mesh vertices and indices into renderer buffers.
pub trait Extractor {
    fn extract_vertex(&mut self, position: Vec3, normal: Vec3);
    fn extract_index(&mut self, index: usize);
}

/// Output vertex positions as a tightly packed array of floats, and
/// triangles as an index buffer. Normals are discarded.
pub struct IndexedVertices<'a> {
    vertices: &'a mut Vec<f32>,
    indices: &'a mut Vec<u32>,
}

impl<'a> IndexedVertices<'a> {
    pub fn new(vertices: &'a mut Vec<f32>, indices: &'a mut Vec<u32>) -> Self {
        Self { vertices, indices }
    }
}

impl<'a> Extractor for IndexedVertices<'a> {
    fn extract_vertex(&mut self, p: Vec3, _: Vec3) {
        self.vertices.extend_from_slice(&p.to_array());
    }

    fn extract_index(&mut self, index: usize) {
        self.indices.push(index as u32);
    }
}

/// Output positions interleaved with normals, as a tightly packed array of
/// floats (six per vertex), with triangles as an index buffer.
pub struct IndexedInterleavedNormals<'a> {
    vertices: &'a mut Vec<f32>,
    indices: &'a mut Vec<u32>,
}

impl<'a> IndexedInterleavedNormals<'a> {
    pub fn new(vertices: &'a mut Vec<f32>, indices: &'a mut Vec<u32>) -> Self {
        Self { vertices, indices }
    }
}

impl<'a> Extractor for IndexedInterleavedNormals<'a> {
    fn extract_vertex(&mut self, p: Vec3, n: Vec3) {
        self.vertices.extend_from_slice(&p.to_array());
        self.vertices.extend_from_slice(&n.to_array());
    }

    fn extract_index(&mut self, index: usize) {
        self.indices.push(index as u32);
    }
}

/// Output an unindexed triangle list: three vertices per triangle, each as a
/// position followed by a normal. Shared vertices are repeated.
pub struct TriangleSoup<'a> {
    vertices: &'a mut Vec<f32>,
    staged: Vec<(Vec3, Vec3)>,
}

impl<'a> TriangleSoup<'a> {
    pub fn new(vertices: &'a mut Vec<f32>) -> Self {
        Self {
            vertices,
            staged: vec![],
        }
    }
}

impl<'a> Extractor for TriangleSoup<'a> {
    fn extract_vertex(&mut self, p: Vec3, n: Vec3) {
        self.staged.push((p, n));
    }

    fn extract_index(&mut self, index: usize) {
        let (p, n) = self.staged[index];
        self.vertices.extend_from_slice(&p.to_array());
        self.vertices.extend_from_slice(&n.to_array());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{math::vec3, mesh::MeshBuilder};

    fn triangle() -> crate::mesh::IsoMesh {
        let mut builder = MeshBuilder::new();
        let n = || vec3(0.0, 0.0, 1.0);
        let a = builder.add_vertex(0u8, vec3(0.0, 0.0, 0.0), n);
        let b = builder.add_vertex(1, vec3(1.0, 0.0, 0.0), n);
        let c = builder.add_vertex(2, vec3(0.0, 1.0, 0.0), n);
        builder.add_face(a, b, c);
        builder.build().0
    }

    #[test]
    fn test_indexed_vertices() {
        let (mut vertices, mut indices) = (vec![], vec![]);
        triangle().extract(&mut IndexedVertices::new(&mut vertices, &mut indices));
        assert_eq!(vertices, [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn test_interleaved_normals() {
        let (mut vertices, mut indices) = (vec![], vec![]);
        triangle().extract(&mut IndexedInterleavedNormals::new(&mut vertices, &mut indices));
        assert_eq!(vertices.len(), 18);
        assert_eq!(vertices[6..12], [1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn test_triangle_soup() {
        let mut vertices = vec![];
        triangle().extract(&mut TriangleSoup::new(&mut vertices));
        assert_eq!(vertices.len(), 18);
        assert_eq!(vertices[12..], [0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
