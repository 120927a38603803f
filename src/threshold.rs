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
use crate::volume::{Volume, Voxel};
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How the default isosurface threshold is derived from a volume's range.
///
/// Different datasets have historically been normalised in different ways,
/// so the formula is always an explicit choice rather than a hidden constant.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "value", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// `min + (max - min) * f`
    FractionOfRange(f32),
    /// `floor(max * f)`, clamped into the range. `FractionOfMax(0.1)` matches
    /// an integer `max / 10`.
    FractionOfMax(f32),
    /// A fixed, caller supplied threshold, clamped into the range.
    Fixed(f32),
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::FractionOfRange(0.1)
    }
}

/// The valid range of thresholds for a volume, and the default within it.
///
/// Always satisfies `min <= default <= max`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ThresholdRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ThresholdRange {
    /// Build a range, pulling `default` inside `[min, max]`.
    pub fn new(min: f32, max: f32, default: f32) -> Self {
        let default = if default.is_nan() {
            min
        } else {
            default.max(min).min(max)
        };
        Self { min, max, default }
    }

    /// Clamp a requested threshold to the nearest valid value.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.max(self.min).min(self.max)
        }
    }

    /// Whether `value` is a valid threshold as given. NaN never is.
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// True when every sample in the volume had the same value.
    pub fn is_uniform(&self) -> bool {
        self.min == self.max
    }
}

/// Find the smallest and largest sample in a volume with a single scan.
///
/// An empty volume reports `(0, 0)`.
pub fn value_range<T: Voxel>(volume: &Volume<T>) -> (f32, f32) {
    let (min, max) = volume
        .data()
        .par_iter()
        .fold(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |(lo, hi), v| {
                let v = v.to_f32();
                (lo.min(v), hi.max(v))
            },
        )
        .reduce(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        );

    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

/// Compute the threshold range of a volume and pick its default threshold.
pub fn estimate_threshold<T: Voxel>(volume: &Volume<T>, policy: ThresholdPolicy) -> ThresholdRange {
    let (min, max) = value_range(volume);

    let default = match policy {
        ThresholdPolicy::FractionOfRange(f) => min + (max - min) * f,
        ThresholdPolicy::FractionOfMax(f) => (max as f64 * f as f64).floor() as f32,
        ThresholdPolicy::Fixed(v) => v,
    };
    let range = ThresholdRange::new(min, max, default);

    info!(
        "Scalar range [{}, {}], default threshold {} ({:?})",
        range.min, range.max, range.default, policy
    );

    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{math::Vec3, volume::Dimensions};

    fn ramp(lo: u16, hi: u16) -> Volume<u16> {
        let dims = Dimensions::new(4, 4, 4);
        let n = dims.voxel_count() as u32 - 1;
        Volume::from_fn(dims, Vec3::one(), |x, y, z| {
            let i = dims.index(x, y, z) as u32;
            (lo as u32 + (hi - lo) as u32 * i / n) as u16
        })
    }

    #[test]
    fn test_range_and_default() {
        let range = estimate_threshold(&ramp(100, 1100), ThresholdPolicy::default());
        assert_eq!(range.min, 100.0);
        assert_eq!(range.max, 1100.0);
        assert_eq!(range.default, 200.0);
    }

    #[test]
    fn test_fraction_of_max_matches_integer_division() {
        let range = estimate_threshold(&ramp(0, 3277), ThresholdPolicy::FractionOfMax(0.1));
        assert_eq!(range.default, 327.0);

        // never drops below the minimum
        let range = estimate_threshold(&ramp(900, 1000), ThresholdPolicy::FractionOfMax(0.1));
        assert_eq!(range.default, 900.0);
    }

    #[test]
    fn test_default_always_within_range() {
        let policies = [
            ThresholdPolicy::FractionOfRange(0.1),
            ThresholdPolicy::FractionOfRange(0.25),
            ThresholdPolicy::FractionOfRange(7.0),
            ThresholdPolicy::FractionOfMax(0.1),
            ThresholdPolicy::Fixed(-5.0),
            ThresholdPolicy::Fixed(1.0e9),
        ];
        for &(lo, hi) in &[(0, 0), (3, 3), (0, 65535), (10, 20)] {
            for &policy in &policies {
                let range = estimate_threshold(&ramp(lo, hi), policy);
                assert!(range.min <= range.default && range.default <= range.max);
            }
        }
    }

    #[test]
    fn test_uniform_volume() {
        let range = estimate_threshold(&ramp(42, 42), ThresholdPolicy::default());
        assert!(range.is_uniform());
        assert_eq!(range.default, 42.0);
    }

    #[test]
    fn test_clamp() {
        let range = ThresholdRange::new(10.0, 20.0, 12.0);
        assert_eq!(range.clamp(5.0), 10.0);
        assert_eq!(range.clamp(25.0), 20.0);
        assert_eq!(range.clamp(15.5), 15.5);
        assert_eq!(range.clamp(f32::NAN), 12.0);

        assert!(range.contains(10.0) && range.contains(20.0));
        assert!(!range.contains(20.5));
        assert!(!range.contains(f32::NAN));
    }

    #[test]
    fn test_policy_serialization() {
        let json = serde_json::to_string(&ThresholdPolicy::FractionOfMax(0.25)).unwrap();
        assert_eq!(json, r#"{"policy":"fraction_of_max","value":0.25}"#);
        let policy: ThresholdPolicy =
            serde_json::from_str(r#"{"policy":"fixed","value":600.0}"#).unwrap();
        assert_eq!(policy, ThresholdPolicy::Fixed(600.0));
    }
}
