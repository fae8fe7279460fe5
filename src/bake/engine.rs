//! Host-facing baking engine.

use std::ops::Range;

use tracing::{debug, info, warn};

use super::accumulator::Accumulator;
use super::controller::{BounceController, BounceState, Phase, Tick};
use super::sampler::{RenderSampler, Sampler};
use super::scheduler::validate_target;
use super::BakeConfig;
use crate::render::RenderBackend;
use crate::scene::{Scene, Snapshot};
use crate::util::{Error, Result};

/// Color sub-range a host must re-upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirtyRange {
    /// Vertex indices, half-open.
    pub vertices: Range<usize>,
}

impl DirtyRange {
    /// Offset into the flat float buffer (three floats per vertex).
    pub fn offset(&self) -> usize {
        self.vertices.start * 3
    }

    /// Number of floats to upload.
    pub fn len(&self) -> usize {
        self.vertices.len() * 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// `offset()..offset() + len()`.
    pub fn component_range(&self) -> Range<usize> {
        self.offset()..self.offset() + self.len()
    }
}

/// Running totals across all ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BakeStats {
    pub samples_taken: u64,
    pub samples_skipped: u64,
    pub batches: u64,
    pub bounces_completed: u32,
}

/// Progressive per-vertex GI baker.
///
/// Owns the scene while baking. Call [`tick`](Self::tick) once per host
/// frame; each call samples at most `batch_size` vertices of the target
/// mesh and writes them into its color attribute. After each tick the host
/// may [`flush`](Self::flush) the written range for upload.
///
/// A bad target (missing, not a mesh, missing or mis-sized attributes) or an
/// invalid config does not fail construction. The engine goes inert
/// instead: every tick returns [`Tick::Done`] and the error is available
/// once from [`take_error`](Self::take_error).
pub struct Engine<S> {
    scene: Scene,
    target: String,
    config: BakeConfig,
    sampler: S,
    controller: BounceController,
    stats: BakeStats,
    inert: bool,
    error: Option<Error>,
}

impl<B: RenderBackend> Engine<RenderSampler<B>> {
    /// Bake `target` in `scene`, sampling through `renderer`.
    pub fn new(renderer: B, scene: Scene, target: &str, config: BakeConfig) -> Self {
        let sampler = RenderSampler::new(renderer, &config);
        Self::with_sampler(sampler, scene, target, config)
    }
}

impl<S: Sampler> Engine<S> {
    /// Bake with a custom sampler.
    pub fn with_sampler(sampler: S, scene: Scene, target: &str, config: BakeConfig) -> Self {
        let mut engine = Self {
            controller: BounceController::finished(0),
            scene,
            target: target.to_string(),
            config,
            sampler,
            stats: BakeStats::default(),
            inert: false,
            error: None,
        };

        match engine.resolve_vertex_count() {
            Ok(vertex_count) => {
                engine.controller =
                    BounceController::new(engine.config.max_bounces, vertex_count, &engine.scene);
                info!(
                    object = %engine.target,
                    vertex_count,
                    max_bounces = engine.config.max_bounces,
                    batch_size = engine.config.batch_size,
                    resolution = engine.config.sample_resolution,
                    "bake engine ready"
                );
            }
            Err(err) => engine.go_inert(err),
        }
        engine
    }

    fn resolve_vertex_count(&self) -> Result<usize> {
        self.config.validate()?;
        let object = self
            .scene
            .find(&self.target)
            .ok_or_else(|| Error::ObjectNotFound(self.target.clone()))?;
        let mesh = object
            .mesh
            .as_ref()
            .ok_or_else(|| Error::NotAMesh(self.target.clone()))?;
        validate_target(&self.target, mesh)?;
        Ok(mesh.vertex_count())
    }

    fn go_inert(&mut self, err: Error) {
        warn!(object = %self.target, error = %err, "bake engine inert");
        self.inert = true;
        self.controller.halt();
        self.error = Some(err);
    }

    /// Run one batch. Returns `Done` forever once baking has finished or the
    /// engine is inert.
    ///
    /// Render failures are returned as errors and leave the engine where it
    /// stopped; the host decides whether to keep ticking.
    pub fn tick(&mut self) -> Result<Tick> {
        if self.inert {
            return Ok(Tick::Done);
        }

        let result = self.controller.tick(
            &mut self.scene,
            &self.target,
            &mut self.sampler,
            self.config.batch_size,
            self.config.clamp_channels,
        );
        let report = match result {
            Ok(report) => report,
            Err(err) if err.is_configuration() => {
                self.go_inert(err);
                return Ok(Tick::Done);
            }
            Err(err) => return Err(err),
        };

        if let Some(batch) = &report.batch {
            self.stats.batches += 1;
            self.stats.samples_taken += batch.sampled as u64;
            self.stats.samples_skipped += batch.skipped as u64;
        }
        if report.batch.is_some() && report.tick != Tick::Continuing {
            self.stats.bounces_completed += 1;
        }
        debug!(tick = ?report.tick, state = ?self.controller.state(), "tick");
        Ok(report.tick)
    }

    /// Take the vertex range written since the last flush.
    pub fn flush(&mut self) -> Option<DirtyRange> {
        let colors = self.scene.find_mut(&self.target)?.mesh.as_mut()?.colors.as_mut()?;
        Accumulator::new(colors).flush().map(|vertices| DirtyRange { vertices })
    }

    pub fn state(&self) -> BounceState {
        self.controller.state()
    }

    pub fn is_done(&self) -> bool {
        self.inert || self.controller.state().phase == Phase::Done
    }

    /// Whether a configuration error stopped the engine.
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    /// The configuration error that made the engine inert. Returned once.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub fn stats(&self) -> BakeStats {
        self.stats
    }

    pub fn config(&self) -> &BakeConfig {
        &self.config
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable access for hosts that edit the scene between ticks. Edits
    /// show up in the next bounce's snapshot, not the current one.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn into_scene(self) -> Scene {
        self.scene
    }

    /// Snapshot lighting the current bounce.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.controller.snapshot()
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut S {
        &mut self.sampler
    }
}
