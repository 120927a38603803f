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
    config::SessionConfig,
    marching_cubes::MarchingCubes,
    mesh::IsoMesh,
    smoothing::GaussianSmoother,
    threshold::{estimate_threshold, ThresholdPolicy, ThresholdRange},
    volume::{ScalarVolume, SmoothedVolume},
};
use log::{debug, info, warn};
use std::{ops::RangeInclusive, sync::Arc};

/// The parameters a UI can change between extractions.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Target {
    pub threshold: f32,
    pub active_slices: usize,
}

/// A complete, immutable result of the pipeline: the active volume, its
/// smoothed form and the mesh extracted from it.
///
/// Snapshots are only ever replaced as a whole, never modified.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Increases by one with every snapshot that differs from its predecessor.
    pub generation: u64,
    pub threshold: f32,
    pub active_slices: usize,
    pub volume: Arc<ScalarVolume>,
    pub smoothed: Arc<SmoothedVolume>,
    pub mesh: Arc<IsoMesh>,
}

impl Snapshot {
    pub fn target(&self) -> Target {
        Target {
            threshold: self.threshold,
            active_slices: self.active_slices,
        }
    }
}

/// The work needed to move from one snapshot to another.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stages {
    /// The target is already current.
    None,
    /// Only the threshold changed: extract again from the existing smoothed
    /// volume.
    Extract,
    /// The active slice count changed: re-slice, smooth and extract.
    Reslice,
}

/// Loads once, then recomputes the surface as the threshold and active slice
/// count change, running only the stages each change requires.
pub struct Pipeline {
    source: Arc<ScalarVolume>,
    smoother: GaussianSmoother,
    range: ThresholdRange,
    current: Arc<Snapshot>,
}

impl Pipeline {
    /// Build a pipeline over a freshly loaded volume, with every slice active
    /// and the surface extracted at the policy's default threshold.
    pub fn new(
        volume: ScalarVolume,
        smoother: GaussianSmoother,
        policy: ThresholdPolicy,
    ) -> Self {
        let range = estimate_threshold(&volume, policy);
        let source = Arc::new(volume);
        let smoothed = Arc::new(smoother.smooth(&*source));
        let mesh = Arc::new(MarchingCubes::new(range.default).extract(&*smoothed));

        let current = Arc::new(Snapshot {
            generation: 0,
            threshold: range.default,
            active_slices: source.dims().depth,
            volume: source.clone(),
            smoothed,
            mesh,
        });

        Self {
            source,
            smoother,
            range,
            current,
        }
    }

    pub fn from_config(volume: ScalarVolume, config: &SessionConfig) -> Self {
        Self::new(volume, config.smoothing.smoother(), config.threshold)
    }

    /// Valid thresholds, and the default, for the loaded volume.
    pub fn threshold_range(&self) -> ThresholdRange {
        self.range
    }

    /// Valid active slice counts.
    pub fn slice_range(&self) -> RangeInclusive<usize> {
        1..=self.source.dims().depth
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.clone()
    }

    /// Change the threshold, extracting a new mesh if it differs.
    pub fn set_threshold(&mut self, threshold: f32) -> Arc<Snapshot> {
        let target = Target {
            threshold,
            ..self.current.target()
        };
        self.update(target)
    }

    /// Change the number of active slices, rebuilding the surface from the
    /// first `count` slices if it differs.
    pub fn set_active_slice_count(&mut self, count: usize) -> Arc<Snapshot> {
        let target = Target {
            active_slices: count,
            ..self.current.target()
        };
        self.update(target)
    }

    fn update(&mut self, target: Target) -> Arc<Snapshot> {
        if let Some(snapshot) = self.recompute(target, &|| false) {
            self.commit(snapshot);
        }
        self.snapshot()
    }

    /// Pull a requested target into the published valid ranges.
    pub fn clamp(&self, target: Target) -> Target {
        let threshold = self.range.clamp(target.threshold);
        if !self.range.contains(target.threshold) {
            warn!(
                "Threshold {} outside [{}, {}], using {}",
                target.threshold, self.range.min, self.range.max, threshold
            );
        }

        let slices = self.slice_range();
        let active_slices = target.active_slices.max(*slices.start()).min(*slices.end());
        if active_slices != target.active_slices {
            warn!(
                "Slice count {} outside [{}, {}], using {}",
                target.active_slices,
                slices.start(),
                slices.end(),
                active_slices
            );
        }

        Target {
            threshold,
            active_slices,
        }
    }

    /// Decide which stages must run to reach an (already clamped) target.
    pub fn plan(&self, target: Target) -> Stages {
        if target.active_slices != self.current.active_slices {
            Stages::Reslice
        } else if target.threshold != self.current.threshold {
            Stages::Extract
        } else {
            Stages::None
        }
    }

    /// Compute the snapshot for `target` without making it current.
    ///
    /// Returns the current snapshot when nothing needs to change, and `None`
    /// if `cancelled` reported true before the work was finished.
    pub fn recompute(
        &self,
        target: Target,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Option<Arc<Snapshot>> {
        let target = self.clamp(target);
        let stages = self.plan(target);
        debug!("Recomputing for {:?}: {:?}", target, stages);

        let (volume, smoothed) = match stages {
            Stages::None => return Some(self.current.clone()),
            Stages::Extract => (self.current.volume.clone(), self.current.smoothed.clone()),
            Stages::Reslice => {
                let volume = if target.active_slices == self.source.dims().depth {
                    self.source.clone()
                } else {
                    Arc::new(self.source.first_slices(target.active_slices))
                };
                let smoothed = self.smoother.smooth_cancellable(&*volume, cancelled)?;
                (volume, Arc::new(smoothed))
            }
        };

        let mesh =
            MarchingCubes::new(target.threshold).extract_cancellable(&*smoothed, cancelled)?;

        Some(Arc::new(Snapshot {
            generation: self.current.generation + 1,
            threshold: target.threshold,
            active_slices: target.active_slices,
            volume,
            smoothed,
            mesh: Arc::new(mesh),
        }))
    }

    /// Make a snapshot produced by [Pipeline::recompute] current.
    pub fn commit(&mut self, snapshot: Arc<Snapshot>) {
        if !Arc::ptr_eq(&snapshot, &self.current) {
            info!(
                "Snapshot {}: {} slices, threshold {}, {} triangles",
                snapshot.generation,
                snapshot.active_slices,
                snapshot.threshold,
                snapshot.mesh.triangle_count()
            );
            self.current = snapshot;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        math::Vec3,
        volume::{Dimensions, Volume},
    };

    /// A blob of bright material centred in a dark volume.
    pub(crate) fn blob() -> ScalarVolume {
        let dims = Dimensions::new(16, 14, 12);
        Volume::from_fn(dims, Vec3::new(1.0, 1.0, 2.0), |x, y, z| {
            let d = Vec3::new(x as f32 - 7.5, y as f32 - 6.5, (z as f32 - 5.5) * 2.0).len();
            (2000.0 - 250.0 * d).max(100.0) as u16
        })
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(blob(), GaussianSmoother::default(), ThresholdPolicy::FractionOfRange(0.5))
    }

    #[test]
    fn test_initial_snapshot() {
        let pipeline = pipeline();
        let snapshot = pipeline.snapshot();
        let range = pipeline.threshold_range();

        assert_eq!(snapshot.generation, 0);
        assert_eq!(snapshot.active_slices, 12);
        assert_eq!(snapshot.threshold, range.default);
        assert_eq!(pipeline.slice_range(), 1..=12);
        assert!(!snapshot.mesh.is_empty());
        assert_eq!(snapshot.smoothed.dims(), snapshot.volume.dims());
    }

    #[test]
    fn test_threshold_change_reuses_smoothed_volume() {
        let mut pipeline = pipeline();
        let before = pipeline.snapshot();
        let t = before.threshold + 100.0;

        assert_eq!(
            pipeline.plan(Target {
                threshold: t,
                active_slices: 12
            }),
            Stages::Extract
        );
        let after = pipeline.set_threshold(t);

        assert_eq!(after.generation, 1);
        assert!(Arc::ptr_eq(&before.smoothed, &after.smoothed));
        assert_eq!(*after.mesh, MarchingCubes::new(t).extract(&*after.smoothed));
        assert_ne!(after.mesh, before.mesh);
    }

    #[test]
    fn test_repeated_request_is_a_no_op() {
        let mut pipeline = pipeline();
        let before = pipeline.snapshot();
        let after = pipeline.set_threshold(before.threshold);
        assert!(Arc::ptr_eq(&before, &after));

        let after = pipeline.set_active_slice_count(12);
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_reslice_and_restore_reproduces_mesh() {
        let mut pipeline = pipeline();
        let full = pipeline.snapshot();

        let reduced = pipeline.set_active_slice_count(6);
        assert_eq!(reduced.active_slices, 6);
        assert_eq!(reduced.volume.dims().depth, 6);
        assert_eq!(reduced.smoothed.dims().depth, 6);
        assert_ne!(reduced.mesh, full.mesh);

        let restored = pipeline.set_active_slice_count(12);
        assert_eq!(restored.generation, 2);
        assert_eq!(restored.mesh, full.mesh);
        assert_eq!(restored.smoothed, full.smoothed);
    }

    #[test]
    fn test_requests_are_clamped() {
        let mut pipeline = pipeline();
        let range = pipeline.threshold_range();

        assert_eq!(pipeline.set_threshold(1.0e9).threshold, range.max);
        assert_eq!(pipeline.set_threshold(-1.0e9).threshold, range.min);
        assert_eq!(pipeline.set_active_slice_count(0).active_slices, 1);
        assert_eq!(pipeline.set_active_slice_count(500).active_slices, 12);
        assert_eq!(pipeline.set_threshold(f32::NAN).threshold, range.default);
    }

    #[test]
    fn test_single_slice_gives_empty_mesh() {
        let mut pipeline = pipeline();
        let snapshot = pipeline.set_active_slice_count(1);
        assert_eq!(snapshot.active_slices, 1);
        assert!(snapshot.mesh.is_empty());
    }

    #[test]
    fn test_cancelled_recompute_leaves_current() {
        let pipeline = pipeline();
        let before = pipeline.snapshot();
        let target = Target {
            threshold: before.threshold + 50.0,
            active_slices: 8,
        };

        assert!(pipeline.recompute(target, &|| true).is_none());
        assert!(Arc::ptr_eq(&before, &pipeline.snapshot()));
    }
}
