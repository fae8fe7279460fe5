//! Unlit vertex-color surface for wgpu.
//!
//! Every fragment takes the interpolated vertex color unchanged: no lights,
//! no normals, no textures. Used for offscreen sample renders where the
//! scene's own colors are the only light.
//!
//! ## Usage
//!
//! ```ignore
//! use unlit_surface::{create_bind_group_layout, create_pipeline, PipelineConfig};
//!
//! let layout = create_bind_group_layout(&device);
//! let pipeline = create_pipeline(&device, &layout, &PipelineConfig::default());
//! ```

mod params;

pub use params::{CameraUniform, Vertex};

/// Embedded shader source
pub const SHADER_SOURCE: &str = include_str!("shaders/unlit.wgsl");

/// Vertex buffer layout matching [`Vertex`].
pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // color
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    }
}

/// Group 0: camera uniform.
pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let camera_uniform_size = std::num::NonZeroU64::new(std::mem::size_of::<CameraUniform>() as u64);

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("unlit_surface_camera"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: camera_uniform_size,
            },
            count: None,
        }],
    })
}

/// Pipeline configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Debug label for the pipeline (defaults to "unlit_surface_pipeline")
    pub label: Option<&'static str>,
    /// Color target format
    pub format: wgpu::TextureFormat,
    /// Depth texture format (None to disable depth)
    pub depth_format: Option<wgpu::TextureFormat>,
    /// Cull mode
    pub cull_mode: Option<wgpu::Face>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label: None,
            format: wgpu::TextureFormat::Rgba8Unorm,
            depth_format: Some(wgpu::TextureFormat::Depth32Float),
            cull_mode: Some(wgpu::Face::Back),
        }
    }
}

impl PipelineConfig {
    /// Same config with culling disabled.
    pub fn double_sided(mut self) -> Self {
        self.cull_mode = None;
        self
    }
}

/// Create the unlit render pipeline. Front faces are counter-clockwise.
pub fn create_pipeline(
    device: &wgpu::Device,
    camera_layout: &wgpu::BindGroupLayout,
    config: &PipelineConfig,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("unlit_surface_shader"),
        source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("unlit_surface_pipeline_layout"),
        bind_group_layouts: &[camera_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(config.label.unwrap_or("unlit_surface_pipeline")),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[vertex_buffer_layout()],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: config.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: config.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: config.format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}
