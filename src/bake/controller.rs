//! Bounce state machine.
//!
//! ```text
//!   Sampling --batch--> Sampling             (Tick::Continuing)
//!   Sampling --last batch--> Snapshot
//!   Snapshot --bounces left--> Sampling      (Tick::BounceComplete)
//!   Snapshot --max_bounces reached--> Done   (Tick::Done)
//!   Done --> Done                            (Tick::Done, no-op)
//! ```
//!
//! `Snapshot` never survives a `tick()`.

use tracing::info;

use super::sampler::Sampler;
use super::scheduler::{BakeTarget, BatchOutcome, BatchReport, BatchScheduler};
use crate::scene::{capture, Scene, Snapshot};
use crate::util::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Sampling,
    /// Transient: a bounce just finished and the next snapshot is being taken.
    Snapshot,
    Done,
}

/// What one `tick()` accomplished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// A batch ran; the bounce has vertices left.
    Continuing,
    /// A bounce finished and the next one is ready to start.
    BounceComplete,
    /// Baking is over (or never started). Further ticks do nothing.
    Done,
}

/// Observable progress of a bake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BounceState {
    pub bounce_index: u32,
    pub cursor: usize,
    pub vertex_count: usize,
    pub phase: Phase,
}

/// One tick's outcome plus the batch it ran, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    pub batch: Option<BatchReport>,
}

/// Drives batches and swaps snapshots at bounce boundaries.
#[derive(Debug)]
pub struct BounceController {
    max_bounces: u32,
    bounce_index: u32,
    phase: Phase,
    scheduler: BatchScheduler,
    snapshot: Option<Snapshot>,
}

impl BounceController {
    /// Start in `Sampling` with a generation-0 snapshot of `scene`, or in
    /// `Done` with no snapshot when `max_bounces == 0`.
    pub fn new(max_bounces: u32, vertex_count: usize, scene: &Scene) -> Self {
        if max_bounces == 0 {
            return Self::finished(vertex_count);
        }
        Self {
            max_bounces,
            bounce_index: 0,
            phase: Phase::Sampling,
            scheduler: BatchScheduler::new(vertex_count),
            snapshot: Some(capture(scene, 0)),
        }
    }

    /// Controller that is already `Done`.
    pub fn finished(vertex_count: usize) -> Self {
        Self {
            max_bounces: 0,
            bounce_index: 0,
            phase: Phase::Done,
            scheduler: BatchScheduler::new(vertex_count),
            snapshot: None,
        }
    }

    /// Stop where the bake is. Keeps `bounce_index` and the cursor so
    /// `state()` still describes the frozen bake.
    pub fn halt(&mut self) {
        self.phase = Phase::Done;
        self.snapshot = None;
    }

    pub fn state(&self) -> BounceState {
        BounceState {
            bounce_index: self.bounce_index,
            cursor: self.scheduler.cursor(),
            vertex_count: self.scheduler.vertex_count(),
            phase: self.phase,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn max_bounces(&self) -> u32 {
        self.max_bounces
    }

    /// Snapshot lighting the current bounce. `None` once `Done`.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Advance by one batch. See the module docs for the transitions.
    ///
    /// `target` names the mesh object in `scene` whose colors are baked.
    pub fn tick<S: Sampler + ?Sized>(
        &mut self,
        scene: &mut Scene,
        target: &str,
        sampler: &mut S,
        batch_size: usize,
        clamp: bool,
    ) -> Result<TickReport> {
        if self.phase == Phase::Done {
            return Ok(TickReport { tick: Tick::Done, batch: None });
        }
        let Some(snapshot) = &self.snapshot else {
            return Err(Error::render("sampling without a snapshot"));
        };

        let (world, object) = scene
            .find_with_world_mut(target)
            .ok_or_else(|| Error::ObjectNotFound(target.to_string()))?;
        let mesh = object
            .mesh
            .as_mut()
            .ok_or_else(|| Error::NotAMesh(target.to_string()))?;

        let report = self.scheduler.run_batch(
            batch_size,
            BakeTarget::new(target, mesh, world),
            sampler,
            snapshot,
            clamp,
        )?;

        let tick = match report.outcome {
            BatchOutcome::Continuing => Tick::Continuing,
            BatchOutcome::BounceComplete => self.finish_bounce(scene),
        };
        Ok(TickReport { tick, batch: Some(report) })
    }

    fn finish_bounce(&mut self, scene: &Scene) -> Tick {
        self.phase = Phase::Snapshot;
        self.scheduler.reset();
        self.bounce_index += 1;

        if self.bounce_index >= self.max_bounces {
            self.phase = Phase::Done;
            self.snapshot = None;
            info!(bounces = self.bounce_index, "bake complete");
            return Tick::Done;
        }

        // Replaces (and drops) the previous bounce's snapshot.
        self.snapshot = Some(capture(scene, self.bounce_index));
        self.phase = Phase::Sampling;
        info!(bounce = self.bounce_index, "bounce complete, next snapshot captured");
        Tick::BounceComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Mesh, SceneObject};
    use glam::Vec3;

    /// Returns the snapshot generation as the red channel.
    struct Generation;

    impl Sampler for Generation {
        fn sample(&mut self, _: Vec3, _: Vec3, snapshot: &Snapshot) -> Result<Option<Vec3>> {
            Ok(Some(Vec3::new(snapshot.generation() as f32 / 10.0, 0.0, 0.0)))
        }
    }

    fn scene(n: usize) -> Scene {
        let positions = (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        let mut scene = Scene::new();
        scene.add(SceneObject::mesh("target", Mesh::new(positions, Some(vec![Vec3::Y; n]), vec![])));
        scene
    }

    #[test]
    fn test_zero_bounces_done() {
        let mut scene = scene(4);
        let mut ctl = BounceController::new(0, 4, &scene);
        assert_eq!(ctl.phase(), Phase::Done);
        assert!(ctl.snapshot().is_none());
        let report = ctl.tick(&mut scene, "target", &mut Generation, 32, false).unwrap();
        assert_eq!(report.tick, Tick::Done);
        assert!(report.batch.is_none());
        assert!(scene.find("target").unwrap().mesh.as_ref().unwrap().colors.is_none());
    }

    #[test]
    fn test_single_tick_completes_small_bounce() {
        let mut scene = scene(4);
        let mut ctl = BounceController::new(3, 4, &scene);
        let report = ctl.tick(&mut scene, "target", &mut Generation, 32, false).unwrap();
        assert_eq!(report.tick, Tick::BounceComplete);
        assert_eq!(
            ctl.state(),
            BounceState { bounce_index: 1, cursor: 0, vertex_count: 4, phase: Phase::Sampling }
        );
        assert_eq!(ctl.snapshot().unwrap().generation(), 1);
    }

    #[test]
    fn test_terminates_after_max_bounces() {
        let mut scene = scene(4);
        let mut ctl = BounceController::new(2, 4, &scene);
        let mut ticks = Vec::new();
        for _ in 0..4 {
            ticks.push(ctl.tick(&mut scene, "target", &mut Generation, 2, false).unwrap().tick);
        }
        assert_eq!(
            ticks,
            vec![Tick::Continuing, Tick::BounceComplete, Tick::Continuing, Tick::Done]
        );
        assert_eq!(ctl.state().bounce_index, 2);
        assert_eq!(ctl.state().phase, Phase::Done);
        assert!(ctl.snapshot().is_none());

        // Second bounce was lit by generation 1.
        let colors = scene.find("target").unwrap().mesh.as_ref().unwrap().colors.clone().unwrap();
        assert!((colors.get(3).unwrap().x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_done_is_frozen() {
        let mut scene = scene(2);
        let mut ctl = BounceController::new(1, 2, &scene);
        assert_eq!(ctl.tick(&mut scene, "target", &mut Generation, 8, false).unwrap().tick, Tick::Done);
        let state = ctl.state();
        let colors = scene.clone();
        for _ in 0..3 {
            assert_eq!(ctl.tick(&mut scene, "target", &mut Generation, 8, false).unwrap().tick, Tick::Done);
        }
        assert_eq!(ctl.state(), state);
        assert_eq!(scene, colors);
    }

    #[test]
    fn test_halt_keeps_progress() {
        let mut scene = scene(4);
        let mut ctl = BounceController::new(2, 4, &scene);
        ctl.tick(&mut scene, "target", &mut Generation, 4, false).unwrap();
        ctl.tick(&mut scene, "target", &mut Generation, 2, false).unwrap();
        ctl.halt();
        assert_eq!(
            ctl.state(),
            BounceState { bounce_index: 1, cursor: 2, vertex_count: 4, phase: Phase::Done }
        );
        assert!(ctl.snapshot().is_none());
        let report = ctl.tick(&mut scene, "target", &mut Generation, 2, false).unwrap();
        assert_eq!(report.tick, Tick::Done);
        assert_eq!(ctl.state().cursor, 2);
    }

    #[test]
    fn test_missing_target_is_error() {
        let mut scene = scene(2);
        let mut ctl = BounceController::new(1, 2, &scene);
        let err = ctl.tick(&mut scene, "nope", &mut Generation, 8, false).unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }
}
