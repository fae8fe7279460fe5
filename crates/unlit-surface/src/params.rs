//! GPU-side data layouts.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Interleaved vertex: world position and resolved color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
        }
    }
}

/// Camera uniform (group 0, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new(view_proj: Mat4) -> Self {
        Self { view_proj: view_proj.to_cols_array_2d() }
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}
