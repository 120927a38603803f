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
use crate::marching_cubes_tables::EDGE_CONNECTION;
use std::{cmp::Eq, collections::HashMap, hash::Hash};

/// Identifies a cube edge by the grid coordinates of its two end points,
/// so that every cube sharing the edge produces the same key.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GridKey((usize, usize, usize), (usize, usize, usize));

/// Tracks vertex indices to avoid emitting duplicate vertices during marching
/// cubes mesh generation
pub struct IndexCache<K: Eq + Hash, I: Clone> {
    indices: HashMap<K, I>,
}

impl<K: Eq + Hash, I: Clone> IndexCache<K, I> {
    /// Create a new IndexCache
    pub fn new() -> Self {
        Self {
            indices: HashMap::new(),
        }
    }

    /// Put an index in the cache under the given key
    pub fn put(&mut self, key: K, index: I) {
        self.indices.insert(key, index);
    }

    /// Retrieve an index from the cache for the given key
    pub fn get(&self, key: K) -> Option<I> {
        self.indices.get(&key).cloned()
    }
}

impl GridKey {
    pub fn new(corners: &[(usize, usize, usize); 8], edge: usize) -> Self {
        let [u, v] = EDGE_CONNECTION[edge];

        let a = corners[u];
        let b = corners[v];

        if a > b {
            Self(b, a)
        } else {
            Self(a, b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_edge_same_key() {
        // edge 1 of the cube at x = 0 is edge 3 of its neighbour at x = 1
        let left = [
            (0, 0, 0),
            (1, 0, 0),
            (1, 1, 0),
            (0, 1, 0),
            (0, 0, 1),
            (1, 0, 1),
            (1, 1, 1),
            (0, 1, 1),
        ];
        let mut right = left;
        for corner in right.iter_mut() {
            corner.0 += 1;
        }

        assert_eq!(GridKey::new(&left, 1), GridKey::new(&right, 3));
        assert_ne!(GridKey::new(&left, 0), GridKey::new(&right, 0));
    }

    #[test]
    fn test_cache() {
        let mut cache = IndexCache::new();
        cache.put((1, 2), 7u32);
        assert_eq!(cache.get((1, 2)), Some(7));
        assert_eq!(cache.get((2, 1)), None);
        cache.put((1, 2), 9u32);
        assert_eq!(cache.get((1, 2)), Some(9));
    }
}
