//! Offscreen render backends used to take samples.
//!
//! A [`RenderBackend`] draws a [`Snapshot`] from a [`SampleView`] into a
//! [`SampleTarget`] and reads the pixels back before returning. Two
//! implementations ship with the crate: [`SoftwareRenderer`] (CPU, always
//! available) and `GpuRenderer` (wgpu, behind the `gpu` feature).

#[cfg(feature = "gpu")]
mod gpu;
mod software;

#[cfg(feature = "gpu")]
pub use gpu::GpuRenderer;
pub use software::SoftwareRenderer;

use glam::{Mat4, Vec3};

use crate::scene::Snapshot;
use crate::util::Result;

/// Bytes per pixel of the sample target (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Camera matrices and clear color for one sample render.
#[derive(Clone, Copy, Debug)]
pub struct SampleView {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub eye: Vec3,
    pub background: Vec3,
}

/// Small square RGBA8 color buffer every sample is rendered into.
///
/// One target is created per engine and reused for every sample.
#[derive(Debug)]
pub struct SampleTarget {
    resolution: u32,
    pixels: Vec<u8>,
}

impl SampleTarget {
    pub fn new(resolution: u32) -> Self {
        let len = (resolution as usize).pow(2) * BYTES_PER_PIXEL;
        Self { resolution, pixels: vec![0; len] }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn pixel_count(&self) -> usize {
        (self.resolution as usize).pow(2)
    }

    /// Tightly packed RGBA8 rows, top row first.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Fill every pixel with one color.
    pub fn clear(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Per-channel mean of all pixels divided by 255. Alpha is ignored.
    pub fn mean_rgb(&self) -> Vec3 {
        let mut sum = [0u64; 3];
        for px in self.pixels.chunks_exact(BYTES_PER_PIXEL) {
            sum[0] += px[0] as u64;
            sum[1] += px[1] as u64;
            sum[2] += px[2] as u64;
        }
        let denom = (self.pixel_count() * 255) as f64;
        Vec3::new(
            (sum[0] as f64 / denom) as f32,
            (sum[1] as f64 / denom) as f32,
            (sum[2] as f64 / denom) as f32,
        )
    }
}

/// Renders snapshots offscreen with a blocking pixel readback.
pub trait RenderBackend {
    /// Allocate backend-side resources for a target of this size. Called
    /// once when the engine is built.
    fn prepare_target(&mut self, resolution: u32) -> Result<()>;

    /// Render `snapshot` as seen from `view` and copy the result into
    /// `target`. Returns only after the pixels are available.
    fn render(&mut self, snapshot: &Snapshot, view: &SampleView, target: &mut SampleTarget) -> Result<()>;
}

impl<B: RenderBackend + ?Sized> RenderBackend for Box<B> {
    fn prepare_target(&mut self, resolution: u32) -> Result<()> {
        (**self).prepare_target(resolution)
    }

    fn render(&mut self, snapshot: &Snapshot, view: &SampleView, target: &mut SampleTarget) -> Result<()> {
        (**self).render(snapshot, view, target)
    }
}

/// Convert a linear [0, 1] color to RGBA8 with opaque alpha.
pub fn to_rgba8(color: Vec3) -> [u8; 4] {
    let c = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
    [c.x.round() as u8, c.y.round() as u8, c.z.round() as u8, 255]
}
