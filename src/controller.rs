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
    mesh::IsoMesh,
    pipeline::{Pipeline, Snapshot, Target},
    threshold::ThresholdRange,
};
use log::{debug, info, warn};
use std::{
    ops::RangeInclusive,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, RwLock,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// A parameter change requested by the user interface.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Request {
    SetThreshold(f32),
    SetActiveSliceCount(usize),
}

enum Message {
    Request { sequence: u64, request: Request },
    Shutdown,
}

/// Sent whenever a new mesh has been published.
#[derive(Debug, Clone)]
pub struct MeshReady {
    pub generation: u64,
    pub threshold: f32,
    pub active_slices: usize,
    pub mesh: Arc<IsoMesh>,
}

impl From<&Snapshot> for MeshReady {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            generation: snapshot.generation,
            threshold: snapshot.threshold,
            active_slices: snapshot.active_slices,
            mesh: snapshot.mesh.clone(),
        }
    }
}

/// Runs a [Pipeline] on a background worker so that parameter changes never
/// block the caller.
///
/// Requests that arrive while a recompute is running cancel it, and requests
/// that queue up are coalesced so that only the most recent value of each
/// parameter is computed. Slice count changes additionally wait for
/// `debounce` of quiet before the worker starts rebuilding the volume. A
/// result is only published if no newer request arrived while it was being
/// computed, so a stale mesh never replaces a newer one.
pub struct RecomputeController {
    sender: Sender<Message>,
    latest: Arc<AtomicU64>,
    published: Arc<RwLock<Arc<Snapshot>>>,
    threshold_range: ThresholdRange,
    slice_range: RangeInclusive<usize>,
    worker: Option<JoinHandle<()>>,
}

impl RecomputeController {
    /// Move `pipeline` onto a new worker thread. Returns the controller and a
    /// channel on which each newly published mesh is announced.
    ///
    /// Fails with [Error::Spawn] if the worker thread cannot be started.
    pub fn spawn(pipeline: Pipeline, debounce: Duration) -> Result<(Self, Receiver<MeshReady>)> {
        let (sender, requests) = mpsc::channel();
        let (notify, ready) = mpsc::channel();
        let latest = Arc::new(AtomicU64::new(0));
        let published = Arc::new(RwLock::new(pipeline.snapshot()));
        let threshold_range = pipeline.threshold_range();
        let slice_range = pipeline.slice_range();

        let worker = Worker {
            pipeline,
            requests,
            notify,
            latest: latest.clone(),
            published: published.clone(),
            debounce,
        };
        let worker = thread::Builder::new()
            .name("isovolume-recompute".into())
            .spawn(move || worker.run())
            .map_err(Error::Spawn)?;

        let controller = Self {
            sender,
            latest,
            published,
            threshold_range,
            slice_range,
            worker: Some(worker),
        };
        Ok((controller, ready))
    }

    pub fn threshold_range(&self) -> ThresholdRange {
        self.threshold_range
    }

    pub fn slice_range(&self) -> RangeInclusive<usize> {
        self.slice_range.clone()
    }

    pub fn set_threshold(&self, threshold: f32) -> Result<()> {
        self.request(Request::SetThreshold(threshold))
    }

    pub fn set_active_slice_count(&self, count: usize) -> Result<()> {
        self.request(Request::SetActiveSliceCount(count))
    }

    /// Queue a request for the worker. Returns immediately.
    pub fn request(&self, request: Request) -> Result<()> {
        if self.worker.is_none() {
            return Err(Error::ControllerStopped);
        }
        let sequence = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.sender
            .send(Message::Request { sequence, request })
            .map_err(|_| Error::ControllerStopped)
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.published.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Stop the worker, abandoning any recompute in progress, and wait for
    /// it to exit.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            // bump the sequence so an in-flight recompute notices
            self.latest.fetch_add(1, Ordering::SeqCst);
            let _ = self.sender.send(Message::Shutdown);
            if worker.join().is_err() {
                warn!("Recompute worker panicked");
            }
            debug!("Recompute worker stopped");
        }
    }
}

impl Drop for RecomputeController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    pipeline: Pipeline,
    requests: Receiver<Message>,
    notify: Sender<MeshReady>,
    latest: Arc<AtomicU64>,
    published: Arc<RwLock<Arc<Snapshot>>>,
    debounce: Duration,
}

/// Requests folded into a single target.
struct Pending {
    target: Target,
    sequence: u64,
    shutdown: bool,
}

impl Pending {
    fn apply(&mut self, message: Message) {
        match message {
            Message::Request { sequence, request } => {
                self.sequence = self.sequence.max(sequence);
                match request {
                    Request::SetThreshold(threshold) => self.target.threshold = threshold,
                    Request::SetActiveSliceCount(count) => self.target.active_slices = count,
                }
            }
            Message::Shutdown => self.shutdown = true,
        }
    }
}

impl Worker {
    fn run(mut self) {
        info!("Recompute worker started");
        let mut pending = Pending {
            target: self.pipeline.snapshot().target(),
            sequence: 0,
            shutdown: false,
        };

        loop {
            match self.requests.recv() {
                Ok(message) => pending.apply(message),
                Err(_) => break,
            }
            while let Ok(message) = self.requests.try_recv() {
                pending.apply(message);
            }

            if !pending.shutdown
                && self.debounce > Duration::from_millis(0)
                && pending.target.active_slices != self.pipeline.snapshot().active_slices
            {
                loop {
                    match self.requests.recv_timeout(self.debounce) {
                        Ok(message) => pending.apply(message),
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => {
                            pending.shutdown = true;
                            break;
                        }
                    }
                    if pending.shutdown {
                        break;
                    }
                }
            }
            if pending.shutdown {
                break;
            }

            let sequence = pending.sequence;
            let latest = &self.latest;
            let cancelled = move || latest.load(Ordering::SeqCst) != sequence;

            let snapshot = match self.pipeline.recompute(pending.target, &cancelled) {
                Some(snapshot) => snapshot,
                None => {
                    debug!("Recompute for request {} superseded", sequence);
                    continue;
                }
            };
            self.pipeline.commit(snapshot.clone());
            self.publish(snapshot, sequence);
        }
        info!("Recompute worker exiting");
    }

    fn publish(&self, snapshot: Arc<Snapshot>, sequence: u64) {
        let mut published = self.published.write().unwrap_or_else(|e| e.into_inner());
        if self.latest.load(Ordering::SeqCst) != sequence {
            debug!("Discarding snapshot {}, a newer request is pending", snapshot.generation);
            return;
        }
        if published.generation == snapshot.generation {
            return;
        }
        *published = snapshot.clone();
        drop(published);

        // nobody listening is not an error
        let _ = self.notify.send(MeshReady::from(&*snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        marching_cubes::MarchingCubes, pipeline::tests::blob, smoothing::GaussianSmoother,
        threshold::ThresholdPolicy,
    };

    const WAIT: Duration = Duration::from_secs(30);

    fn spawn(debounce: Duration) -> (RecomputeController, Receiver<MeshReady>) {
        let pipeline = Pipeline::new(
            blob(),
            GaussianSmoother::default(),
            ThresholdPolicy::FractionOfRange(0.5),
        );
        RecomputeController::spawn(pipeline, debounce).unwrap()
    }

    /// Receive notifications until one matches `done`, checking generations
    /// increase along the way.
    fn wait_for<F: Fn(&MeshReady) -> bool>(ready: &Receiver<MeshReady>, done: F) -> MeshReady {
        let mut generation = 0;
        loop {
            let message = ready.recv_timeout(WAIT).expect("no mesh published");
            assert!(message.generation > generation);
            generation = message.generation;
            if done(&message) {
                return message;
            }
        }
    }

    #[test]
    fn test_threshold_change_is_published() {
        let (controller, ready) = spawn(Duration::from_millis(0));
        let initial = controller.snapshot();
        let t = initial.threshold + 120.0;

        controller.set_threshold(t).unwrap();
        let message = wait_for(&ready, |m| m.threshold == t);

        assert_eq!(message.active_slices, 12);
        assert_eq!(*message.mesh, MarchingCubes::new(t).extract(&*initial.smoothed));
        assert!(Arc::ptr_eq(&controller.snapshot().mesh, &message.mesh));
    }

    #[test]
    fn test_last_request_wins() {
        let (controller, ready) = spawn(Duration::from_millis(0));
        let base = controller.snapshot().threshold;
        let requested: Vec<f32> = (1..=20).map(|i| base + i as f32 * 10.0).collect();

        for &t in &requested {
            controller.set_threshold(t).unwrap();
        }
        let last = requested[requested.len() - 1];
        let message = wait_for(&ready, |m| m.threshold == last);
        assert!(requested.contains(&message.threshold));

        // nothing older may follow the final result
        assert!(ready.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(controller.snapshot().threshold, last);
        assert_eq!(controller.snapshot().generation, message.generation);
    }

    #[test]
    fn test_slice_changes_are_debounced_and_coalesced() {
        let (controller, ready) = spawn(Duration::from_millis(50));
        let full = controller.snapshot();

        for count in (4..=11).rev() {
            controller.set_active_slice_count(count).unwrap();
        }
        let message = wait_for(&ready, |m| m.active_slices == 4);
        assert_eq!(controller.snapshot().volume.dims().depth, 4);

        controller.set_active_slice_count(12).unwrap();
        let restored = wait_for(&ready, |m| m.active_slices == 12);
        assert!(restored.generation > message.generation);
        assert_eq!(*restored.mesh, *full.mesh);
    }

    #[test]
    fn test_requests_are_clamped() {
        let (controller, ready) = spawn(Duration::from_millis(0));
        let range = controller.threshold_range();

        controller.set_threshold(1.0e9).unwrap();
        wait_for(&ready, |m| m.threshold == range.max);

        controller.set_active_slice_count(0).unwrap();
        let message = wait_for(&ready, |m| m.active_slices == 1);
        assert!(message.mesh.is_empty());
    }

    #[test]
    fn test_stopped_controller_rejects_requests() {
        let (mut controller, _ready) = spawn(Duration::from_millis(0));
        controller.shutdown();
        assert!(matches!(
            controller.set_threshold(1.0),
            Err(Error::ControllerStopped)
        ));
        // the last snapshot is still readable
        assert_eq!(controller.snapshot().generation, 0);
    }

    #[test]
    fn test_spawn_returns_running_worker() {
        let pipeline = Pipeline::new(
            blob(),
            GaussianSmoother::default(),
            ThresholdPolicy::FractionOfRange(0.5),
        );
        let (controller, ready) =
            RecomputeController::spawn(pipeline, Duration::from_millis(0)).unwrap();
        assert!(controller.worker.is_some());

        controller.set_active_slice_count(5).unwrap();
        wait_for(&ready, |m| m.active_slices == 5);
    }

    #[test]
    fn test_spawn_failure_keeps_cause() {
        let err = Error::Spawn(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "thread limit reached",
        ));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "thread limit reached");
        assert!(err.to_string().contains("recompute worker"));
    }
}
