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
    marching_cubes_tables::{EDGE_CONNECTION, TRIANGLE_CONNECTION},
    math::{lerp, Vec3},
};

/// Build the 8-bit case index for a cube. Corner `i` sets bit `i` when its
/// value lies on or above the threshold, so a corner exactly at the
/// threshold always counts as above.
pub fn classify_corners(values: &[f32; 8], threshold: f32) -> usize {
    let mut cube_index = 0;
    for (i, &value) in values.iter().enumerate() {
        if value >= threshold {
            cube_index |= 1 << i;
        }
    }
    cube_index
}

/// Whether the surface crosses `edge` for the given case index.
#[inline]
pub fn edge_is_crossed(cube_index: usize, edge: usize) -> bool {
    let [u, v] = EDGE_CONNECTION[edge];
    ((cube_index >> u) & 1) != ((cube_index >> v) & 1)
}

/// Locate the threshold crossing on every edge the surface passes through.
///
/// For each crossed edge, `offsets` receives the interpolation factor from
/// the edge's first corner to its second, and `vertices` the interpolated
/// position. Entries for uncrossed edges are left untouched.
pub fn find_edge_crossings(
    cube_index: usize,
    corners: &[Vec3; 8],
    values: &[f32; 8],
    threshold: f32,
    offsets: &mut [f32; 12],
    vertices: &mut [Vec3; 12],
) {
    for edge in 0..12 {
        if !edge_is_crossed(cube_index, edge) {
            continue;
        }

        let [u, v] = EDGE_CONNECTION[edge];
        let t = get_offset(values[u], values[v], threshold);
        offsets[edge] = t;
        vertices[edge] = lerp(corners[u], corners[v], t);
    }
}

/// Emit each triangle of the case's triangulation as a triple of edge indices.
pub fn march_cube<T>(cube_index: usize, mut triangle_func: T)
where
    T: FnMut(usize, usize, usize),
{
    let triangles = &TRIANGLE_CONNECTION[cube_index];
    for i in 0..5 {
        if triangles[3 * i] < 0 {
            break;
        }

        triangle_func(
            triangles[3 * i] as usize,
            triangles[3 * i + 1] as usize,
            triangles[3 * i + 2] as usize,
        );
    }
}

/// The fraction of the way from `a` to `b` at which the threshold is met.
pub fn get_offset(a: f32, b: f32, threshold: f32) -> f32 {
    let delta = b - a;
    if delta == 0.0 {
        0.5
    } else {
        ((threshold - a) / delta).max(0.0).min(1.0)
    }
}
