//! Per-vertex light sampling.
//!
//! A [`Sampler`] turns a world-space position and normal into an RGB
//! estimate of the light arriving there. [`RenderSampler`] does this by
//! rendering the bounce's snapshot from the vertex with a single wide-angle
//! camera aimed along the normal and averaging the pixels.
//!
//! One projection stands in for the whole hemisphere, so the estimate is
//! biased toward light near the normal and misses grazing light outside the
//! frustum. No correction term is applied.

use glam::{Mat4, Vec3};
use tracing::trace;

use super::BakeConfig;
use crate::render::{RenderBackend, SampleTarget, SampleView};
use crate::scene::Snapshot;
use crate::util::{mat4_is_finite, up_for_direction, Error, Result};

/// Source of per-vertex light estimates.
pub trait Sampler {
    /// Estimate the light arriving at `position` from the hemisphere around
    /// `normal` (both world space), as lit by `snapshot`.
    ///
    /// `Ok(None)` means no sample could be taken for this vertex (degenerate
    /// normal, non-finite input); the caller leaves its color untouched.
    fn sample(&mut self, position: Vec3, normal: Vec3, snapshot: &Snapshot) -> Result<Option<Vec3>>;
}

impl<S: Sampler + ?Sized> Sampler for &mut S {
    fn sample(&mut self, position: Vec3, normal: Vec3, snapshot: &Snapshot) -> Result<Option<Vec3>> {
        (**self).sample(position, normal, snapshot)
    }
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    fn sample(&mut self, position: Vec3, normal: Vec3, snapshot: &Snapshot) -> Result<Option<Vec3>> {
        (**self).sample(position, normal, snapshot)
    }
}

/// Perspective camera re-aimed for every sample. Aspect ratio is always 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleCamera {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl Default for SampleCamera {
    fn default() -> Self {
        Self::from_config(&BakeConfig::default())
    }
}

impl SampleCamera {
    pub fn from_config(config: &BakeConfig) -> Self {
        Self {
            fov_y: config.fov_y_degrees.to_radians(),
            near: config.near,
            far: config.far,
            eye: Vec3::ZERO,
            target: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }

    /// Place the camera at `position` looking at `position + normal`.
    ///
    /// Returns `false` and leaves the camera unchanged if the inputs cannot
    /// define a view.
    pub fn orient(&mut self, position: Vec3, normal: Vec3) -> bool {
        if !position.is_finite() || !normal.is_finite() {
            return false;
        }
        let Some(dir) = normal.try_normalize() else {
            return false;
        };
        self.eye = position;
        self.target = position + dir;
        self.up = up_for_direction(dir);
        true
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, 1.0, self.near, self.far)
    }

    /// Matrices for the current orientation, or `None` if any are not finite.
    pub fn sample_view(&self, background: Vec3) -> Option<SampleView> {
        let view = self.view();
        let proj = self.projection();
        let view_proj = proj * view;
        if !mat4_is_finite(&view) || !mat4_is_finite(&view_proj) {
            return None;
        }
        Some(SampleView {
            view,
            proj,
            view_proj,
            eye: self.eye,
            background,
        })
    }
}

/// Sampler that renders the snapshot through a [`RenderBackend`].
///
/// Owns the single camera and sample target used for every sample.
pub struct RenderSampler<B> {
    backend: B,
    camera: SampleCamera,
    target: SampleTarget,
    background: Vec3,
    /// Target allocation failure, reported by the next `sample` call.
    failure: Option<Error>,
}

impl<B: RenderBackend> RenderSampler<B> {
    /// Build the sampler and allocate the backend's target.
    ///
    /// An invalid `config` or an allocation failure does not fail
    /// construction; the error is returned by the first [`Sampler::sample`].
    /// Nothing is allocated for an invalid config.
    pub fn new(mut backend: B, config: &BakeConfig) -> Self {
        let prepared = config
            .validate()
            .and_then(|()| backend.prepare_target(config.sample_resolution));
        let (target, failure) = match prepared {
            Ok(()) => (SampleTarget::new(config.sample_resolution), None),
            Err(err) => (SampleTarget::new(0), Some(err)),
        };
        Self {
            backend,
            camera: SampleCamera::from_config(config),
            target,
            background: Vec3::from_array(config.background),
            failure,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn camera(&self) -> &SampleCamera {
        &self.camera
    }

    /// Pixels of the most recent sample.
    pub fn target(&self) -> &SampleTarget {
        &self.target
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B: RenderBackend> Sampler for RenderSampler<B> {
    fn sample(&mut self, position: Vec3, normal: Vec3, snapshot: &Snapshot) -> Result<Option<Vec3>> {
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        if !self.camera.orient(position, normal) {
            trace!(?position, ?normal, "degenerate sample camera");
            return Ok(None);
        }
        let Some(view) = self.camera.sample_view(self.background) else {
            trace!(?position, ?normal, "non-finite sample view");
            return Ok(None);
        };

        self.backend.render(snapshot, &view, &mut self.target)?;
        let rgb = self.target.mean_rgb();
        trace!(?position, ?rgb, "sample");
        Ok(Some(rgb))
    }
}
