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

//! Isosurface extraction from stacks of raw scalar slice images.
//!
//! A stack of big-endian 16-bit slices is loaded into a [ScalarVolume],
//! smoothed with a separable Gaussian filter and turned into a triangle mesh
//! with [MarchingCubes]. A [Pipeline] keeps the intermediate results so that
//! changing the threshold or the number of active slices only reruns the
//! stages that depend on it, and a [RecomputeController] runs the pipeline on
//! a background worker for interactive use.

/// Common math types
pub mod math;

/// Dense scalar volumes and their dimensions.
pub mod volume;

/// Traits for defining isosurface data sources
pub mod source;

/// Reading raw slice stacks from disk.
pub mod loader;

/// Deriving threshold ranges from volume contents.
pub mod threshold;

/// Separable Gaussian smoothing of volumes.
pub mod smoothing;

/// Algorithms for traversing the cells of sampled fields.
pub mod traversal;

/// Indexed triangle meshes.
pub mod mesh;

/// Utilities for outputting mesh data in specific formats.
pub mod extractor;

/// Session configuration and per-dataset presets.
pub mod config;

/// Errors produced while loading and configuring volumes.
pub mod error;

/// Staged recomputation of the surface as parameters change.
pub mod pipeline;

/// Background recomputation with cancellation and debouncing.
pub mod controller;

mod index_cache;
mod marching_cubes;
mod marching_cubes_impl;
mod marching_cubes_tables;

pub use self::{
    config::{DatasetPresets, Preset, SessionConfig, SmoothingConfig},
    controller::{MeshReady, RecomputeController, Request},
    error::{Error, Result},
    loader::VolumeLoader,
    marching_cubes::*,
    mesh::IsoMesh,
    pipeline::{Pipeline, Snapshot},
    smoothing::GaussianSmoother,
    threshold::{estimate_threshold, ThresholdPolicy, ThresholdRange},
    volume::{Dimensions, ScalarVolume, SmoothedVolume, Volume},
};
