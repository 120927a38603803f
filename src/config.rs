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
//! Session configuration, including per-dataset presets.
//!
//! Thresholds and slice spacing that are specific to a particular dataset
//! are resolved here, by name, before a session starts. The extraction
//! pipeline itself only ever sees the resolved values.
use crate::{
    error::{Error, Result},
    loader::VolumeLoader,
    smoothing::GaussianSmoother,
    threshold::ThresholdPolicy,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path, time::Duration};

/// Parameters of the Gaussian smoothing applied before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// Standard deviation along x, y and z, in voxels.
    pub sigma: [f32; 3],
    /// Kernels are cut off this many standard deviations from their centre.
    pub truncate: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sigma: [1.0; 3],
            truncate: 3.0,
        }
    }
}

impl SmoothingConfig {
    pub fn smoother(&self) -> GaussianSmoother {
        if self.enabled {
            GaussianSmoother::new(self.sigma, self.truncate)
        } else {
            GaussianSmoother::identity()
        }
    }
}

/// Everything needed to load a slice stack and extract its surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Samples per row of each slice.
    pub width: usize,
    /// Rows per slice.
    pub height: usize,
    /// Distance between consecutive slices, in units of the in-slice sample
    /// spacing.
    pub z_spacing: f32,
    pub smoothing: SmoothingConfig,
    pub threshold: ThresholdPolicy,
    /// How long slice count changes are held back waiting for a newer one.
    pub debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            z_spacing: 2.0,
            smoothing: SmoothingConfig::default(),
            threshold: ThresholdPolicy::default(),
            debounce_ms: 150,
        }
    }
}

impl SessionConfig {
    pub fn loader(&self) -> VolumeLoader {
        VolumeLoader::new(self.width, self.height, self.z_spacing)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Override the threshold and spacing with any values the preset supplies.
    pub fn apply_preset(&mut self, preset: &Preset) {
        if let Some(threshold) = preset.threshold {
            self.threshold = ThresholdPolicy::Fixed(threshold);
        }
        if let Some(z_spacing) = preset.z_spacing {
            self.z_spacing = z_spacing;
        }
    }
}

/// Dataset specific overrides.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub threshold: Option<f32>,
    pub z_spacing: Option<f32>,
}

/// Presets keyed by a dataset identifier.
///
/// A preset applies to any dataset whose name contains its key, e.g. the key
/// `"CThead"` matches slices named `CThead.1`. Serialised as a plain JSON
/// object of key to preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetPresets {
    presets: BTreeMap<String, Preset>,
}

impl DatasetPresets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, key: S, preset: Preset) {
        self.presets.insert(key.into(), preset);
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&json)
    }

    /// Find the preset for `dataset`. Keys are tried in sorted order and the
    /// first key contained in the name wins.
    pub fn resolve(&self, dataset: &str) -> Option<(&str, &Preset)> {
        self.presets
            .iter()
            .find(|(key, _)| dataset.contains(key.as_str()))
            .map(|(key, preset)| (key.as_str(), preset))
    }
}
