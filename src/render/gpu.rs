//! wgpu backend: headless render into an RGBA8 texture with blocking readback.

use std::sync::mpsc;

use tracing::{debug, info, trace};
use wgpu::util::DeviceExt;

use unlit_surface::{CameraUniform, PipelineConfig, Vertex};

use super::{RenderBackend, SampleTarget, SampleView, BYTES_PER_PIXEL};
use crate::scene::Snapshot;
use crate::util::{Error, Result};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Color + depth attachments and the padded readback buffer.
struct OffscreenTarget {
    resolution: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl OffscreenTarget {
    fn new(device: &wgpu::Device, resolution: u32) -> Self {
        let size = wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sample_color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sample_depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        // bytes_per_row must be aligned to COPY_BYTES_PER_ROW_ALIGNMENT (256)
        let unpadded = resolution * BYTES_PER_PIXEL as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded.div_ceil(align) * align;

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sample_readback"),
            size: (padded_bytes_per_row * resolution) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            resolution,
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            readback,
            padded_bytes_per_row,
        }
    }
}

/// Uploaded geometry of one draw batch.
struct GpuDraw {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    double_sided: bool,
}

/// Geometry for the snapshot currently being sampled. A snapshot never
/// changes, so buffers are uploaded once and reused for every sample of
/// the bounce.
struct SnapshotGeometry {
    snapshot_id: u64,
    draws: Vec<GpuDraw>,
}

/// GPU render backend.
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
    pipeline_double_sided: wgpu::RenderPipeline,
    target: Option<OffscreenTarget>,
    geometry: Option<SnapshotGeometry>,
}

impl GpuRenderer {
    /// Create a renderer on the default adapter without a window.
    pub fn new_headless() -> Result<Self> {
        pollster::block_on(Self::request_headless())
    }

    async fn request_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| Error::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!("GPU: {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("vertex_gi_device"),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::DeviceRequest(e.to_string()))?;

        Ok(Self::from_device(device, queue))
    }

    /// Create a renderer on a device the host already owns.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let camera_layout = unlit_surface::create_bind_group_layout(&device);
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sample_camera"),
            contents: bytemuck::bytes_of(&CameraUniform::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sample_camera_bind_group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let config = PipelineConfig {
            label: Some("sample_pipeline"),
            format: COLOR_FORMAT,
            depth_format: Some(DEPTH_FORMAT),
            ..Default::default()
        };
        let pipeline = unlit_surface::create_pipeline(&device, &camera_layout, &config);
        let double_sided = PipelineConfig {
            label: Some("sample_pipeline_double_sided"),
            ..config.double_sided()
        };
        let pipeline_double_sided = unlit_surface::create_pipeline(&device, &camera_layout, &double_sided);

        Self {
            device,
            queue,
            camera_buffer,
            camera_bind_group,
            pipeline,
            pipeline_double_sided,
            target: None,
            geometry: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn upload(&mut self, snapshot: &Snapshot) {
        if self.geometry.as_ref().is_some_and(|g| g.snapshot_id == snapshot.id()) {
            return;
        }

        let draws = snapshot
            .draws()
            .iter()
            .filter(|d| !d.indices.is_empty())
            .map(|draw| {
                let vertices: Vec<Vertex> = draw
                    .positions
                    .iter()
                    .zip(&draw.colors)
                    .map(|(p, c)| Vertex::new(*p, *c))
                    .collect();
                GpuDraw {
                    vertex_buffer: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(draw.name.as_str()),
                        contents: bytemuck::cast_slice(&vertices),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    index_buffer: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(draw.name.as_str()),
                        contents: bytemuck::cast_slice(&draw.indices),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    index_count: draw.indices.len() as u32,
                    double_sided: draw.double_sided,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            generation = snapshot.generation(),
            draws = draws.len(),
            "uploaded snapshot geometry"
        );
        self.geometry = Some(SnapshotGeometry { snapshot_id: snapshot.id(), draws });
    }

    fn read_back(&self, target: &mut SampleTarget) -> Result<()> {
        let Some(offscreen) = &self.target else {
            return Err(Error::render("render target not prepared"));
        };

        let slice = offscreen.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| Error::render(format!("device poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| Error::render("readback callback dropped"))?
            .map_err(|e| Error::render(format!("readback map failed: {e}")))?;

        {
            let data = slice.get_mapped_range();
            let row_bytes = offscreen.resolution as usize * BYTES_PER_PIXEL;
            let padded = offscreen.padded_bytes_per_row as usize;
            for (row, dst) in target.pixels_mut().chunks_exact_mut(row_bytes).enumerate() {
                let start = row * padded;
                dst.copy_from_slice(&data[start..start + row_bytes]);
            }
        }
        offscreen.readback.unmap();
        Ok(())
    }
}

impl RenderBackend for GpuRenderer {
    fn prepare_target(&mut self, resolution: u32) -> Result<()> {
        if self.target.as_ref().is_some_and(|t| t.resolution == resolution) {
            return Ok(());
        }
        debug!(resolution, "allocating sample target");
        self.target = Some(OffscreenTarget::new(&self.device, resolution));
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(generation = snapshot.generation()))]
    fn render(&mut self, snapshot: &Snapshot, view: &SampleView, target: &mut SampleTarget) -> Result<()> {
        self.prepare_target(target.resolution())?;
        self.upload(snapshot);

        let (Some(offscreen), Some(geometry)) = (&self.target, &self.geometry) else {
            return Err(Error::render("render target not prepared"));
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniform::new(view.view_proj)),
        );

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sample_encoder"),
        });
        {
            let bg = view.background;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sample_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &offscreen.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: bg.x as f64,
                            g: bg.y as f64,
                            b: bg.z as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &offscreen.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            for draw in &geometry.draws {
                let pipeline = if draw.double_sided {
                    &self.pipeline_double_sided
                } else {
                    &self.pipeline
                };
                pass.set_pipeline(pipeline);
                pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                pass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &offscreen.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &offscreen.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(offscreen.padded_bytes_per_row),
                    rows_per_image: Some(offscreen.resolution),
                },
            },
            wgpu::Extent3d {
                width: offscreen.resolution,
                height: offscreen.resolution,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::render(err.to_string()));
        }

        self.read_back(target)?;
        trace!("sample rendered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{capture, primitives, Material, Scene, SceneObject};
    use glam::{Mat4, Vec3};

    fn renderer() -> Option<GpuRenderer> {
        match GpuRenderer::new_headless() {
            Ok(r) => Some(r),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    fn view(background: Vec3) -> SampleView {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.01, 100.0);
        SampleView { view, proj, view_proj: proj * view, eye: Vec3::ZERO, background }
    }

    #[test]
    fn test_gpu_background_clear() {
        let Some(mut gpu) = renderer() else { return };
        gpu.prepare_target(32).unwrap();
        let mut target = SampleTarget::new(32);
        gpu.render(&capture(&Scene::new(), 0), &view(Vec3::new(0.0, 0.0, 1.0)), &mut target)
            .unwrap();
        assert_eq!(target.mean_rgb(), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_gpu_matches_software_on_wall() {
        let Some(mut gpu) = renderer() else { return };
        let mut scene = Scene::new();
        scene.add(
            SceneObject::mesh(
                "wall",
                primitives::plane(10.0, 10.0).with_material(Material::color(Vec3::new(1.0, 0.25, 0.0))),
            )
            .with_transform(Mat4::from_translation(Vec3::NEG_Z)),
        );
        let snapshot = capture(&scene, 0);
        let view = view(Vec3::ZERO);

        let mut gpu_target = SampleTarget::new(32);
        gpu.prepare_target(32).unwrap();
        gpu.render(&snapshot, &view, &mut gpu_target).unwrap();

        let mut cpu = super::super::SoftwareRenderer::new();
        let mut cpu_target = SampleTarget::new(32);
        cpu.prepare_target(32).unwrap();
        cpu.render(&snapshot, &view, &mut cpu_target).unwrap();

        assert!((gpu_target.mean_rgb() - cpu_target.mean_rgb()).length() < 2.0 / 255.0);
    }
}
