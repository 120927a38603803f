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
use std::{io, path::PathBuf};

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading slice stacks or configuring a session.
///
/// Empty meshes (uniform volumes, thresholds outside the data range, volumes
/// only one voxel thick) are valid outcomes and are never reported here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed slice {path:?}: expected {expected} bytes, found {actual}")]
    MalformedSlice {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no slices to load")]
    EmptyStack,

    #[error("invalid slice dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("slice {path:?} has no numeric index suffix")]
    UnsortableSlice { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to start recompute worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("recompute controller has stopped")]
    ControllerStopped,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
