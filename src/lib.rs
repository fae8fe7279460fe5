//! # vertex-gi
//!
//! Progressive per-vertex global illumination baking.
//!
//! For every vertex of a target mesh the engine renders the scene from the
//! vertex, looking along its normal, averages the pixels and stores the
//! result in the mesh's vertex colors. Work is split into small batches so a
//! host can call [`Engine::tick`](bake::Engine::tick) once per frame. Each
//! full pass over the vertices is a bounce; the next bounce renders a
//! snapshot that already contains the colors baked so far.
//!
//! ## Modules
//!
//! - [`util`] - Errors and math helpers
//! - [`scene`] - Scene graph, meshes, snapshots and demo primitives
//! - [`render`] - Offscreen sample renderers (software, wgpu)
//! - [`bake`] - Sampler, accumulator, scheduler, bounce controller, engine
//!
//! ## Example
//!
//! ```ignore
//! use vertex_gi::prelude::*;
//!
//! let scene = vertex_gi::scene::primitives::demo_scene(32);
//! let mut engine = Engine::new(SoftwareRenderer::new(), scene, "torus", BakeConfig::default());
//!
//! loop {
//!     let tick = engine.tick()?;
//!     if let Some(range) = engine.flush() {
//!         // upload range.component_range() of the color buffer
//!     }
//!     if tick == Tick::Done {
//!         break;
//!     }
//! }
//! ```

pub mod util;
pub mod scene;
pub mod render;
pub mod bake;

// Re-export commonly used types
pub use bake::{BakeConfig, Engine, Tick};
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bake::{
        BakeConfig, BakeStats, BounceState, DirtyRange, Engine, Phase, RenderSampler, Sampler, Tick,
    };
    #[cfg(feature = "gpu")]
    pub use crate::render::GpuRenderer;
    pub use crate::render::{RenderBackend, SoftwareRenderer};
    pub use crate::scene::{capture, Material, Mesh, Scene, SceneObject, Snapshot, VertexColors};
    pub use crate::util::{Error, Result};
}
