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
    error::{Error, Result},
    math::Vec3,
    volume::{Dimensions, ScalarVolume, Volume},
};
use log::{debug, info};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

const BYTES_PER_SAMPLE: usize = 2;

/// Loads stacks of headerless slice images into a [ScalarVolume].
///
/// Each slice file must hold exactly `width * height` unsigned 16-bit samples
/// in big-endian byte order. Slices are stacked along z in the order given.
#[derive(Debug, Copy, Clone)]
pub struct VolumeLoader {
    width: usize,
    height: usize,
    spacing: Vec3,
}

impl VolumeLoader {
    /// Create a loader for slices of `width * height` samples.
    ///
    /// Samples within a slice are one unit apart; `z_spacing` is the distance
    /// between consecutive slices in the same units.
    pub fn new(width: usize, height: usize, z_spacing: f32) -> Self {
        Self {
            width,
            height,
            spacing: Vec3::new(1.0, 1.0, z_spacing),
        }
    }

    /// The exact size in bytes every slice file must have.
    pub fn slice_bytes(&self) -> usize {
        self.width * self.height * BYTES_PER_SAMPLE
    }

    /// Read every slice in `paths` and stack them into a single volume.
    ///
    /// Fails with [Error::MalformedSlice] if any slice has the wrong size. When
    /// several slices fail, the error names the earliest in stack order. No
    /// file handles outlive this call.
    pub fn load<P>(&self, paths: &[P]) -> Result<ScalarVolume>
    where
        P: AsRef<Path> + Sync,
    {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if paths.is_empty() {
            return Err(Error::EmptyStack);
        }

        let start = Instant::now();
        let dims = Dimensions::new(self.width, self.height, paths.len());
        let mut data = vec![0u16; dims.voxel_count()];

        let results: Vec<Result<()>> = data
            .par_chunks_mut(dims.slice_len())
            .zip(paths.par_iter())
            .map(|(samples, path)| self.read_slice(path.as_ref(), samples))
            .collect();
        results.into_iter().collect::<Result<()>>()?;

        info!(
            "Loaded {} slices of {}x{} in {:.1?}",
            dims.depth,
            dims.width,
            dims.height,
            start.elapsed()
        );

        Ok(Volume::new(dims, self.spacing, data))
    }

    fn read_slice(&self, path: &Path, samples: &mut [u16]) -> Result<()> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;

        let expected = self.slice_bytes();
        if bytes.len() != expected {
            return Err(Error::MalformedSlice {
                path: path.to_path_buf(),
                expected,
                actual: bytes.len(),
            });
        }

        decode_slice(&bytes, samples);
        debug!("Read slice {:?}", path);
        Ok(())
    }
}

/// Decode big-endian 16-bit samples from `bytes` into host order.
///
/// `samples` must hold exactly half as many entries as `bytes`.
pub fn decode_slice(bytes: &[u8], samples: &mut [u16]) {
    debug_assert_eq!(bytes.len(), samples.len() * BYTES_PER_SAMPLE);
    for (sample, pair) in samples.iter_mut().zip(bytes.chunks_exact(BYTES_PER_SAMPLE)) {
        *sample = u16::from_be_bytes([pair[0], pair[1]]);
    }
}

/// List the files in `dir`, ordered by their numeric index suffix.
///
/// Slice files are expected to be named `<name>.<index>`, e.g. `CThead.1`
/// through `CThead.113`.
pub fn discover_slices<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut paths = vec![];

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if file_type.is_file() {
            paths.push(entry.path());
        }
    }

    sort_slice_paths(paths)
}

/// Order slice paths by the integer following the final `.` in their names.
pub fn sort_slice_paths(paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut indexed = paths
        .into_iter()
        .map(|path| match slice_index(&path) {
            Some(index) => Ok((index, path)),
            None => Err(Error::UnsortableSlice { path }),
        })
        .collect::<Result<Vec<_>>>()?;

    indexed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    Ok(indexed.into_iter().map(|(_, path)| path).collect())
}

fn slice_index(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let (_, suffix) = name.rsplit_once('.')?;
    suffix.parse().ok()
}
