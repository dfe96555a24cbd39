//! wgpu renderer for display lists
//!
//! Renders off-screen into an RGBA texture and reads the result back into a
//! [`Canvas`], so hosts see the same pixel surface as the CPU backend.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::canvas::Canvas;
use crate::config::Backend;
use crate::engine::FrameRenderer;
use crate::error::{SceneError, SceneResult};
use crate::frame::FrameList;
use crate::gpu::shaders::{quad_shader, shape_shader};
use crate::gpu::types::{QuadInstance, ShapeInstance, ViewUniforms};
use crate::labels::LabelAtlas;

/// Render target format; blending happens on the stored values like the CPU
/// canvas does
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Initial instance buffer capacities, grown on demand
const INITIAL_SHAPES: usize = 4096;
const INITIAL_QUADS: usize = 512;

/// Size-dependent render targets
struct Targets {
    width: u32,
    height: u32,
    color: wgpu::Texture,
    staging: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl Targets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Color Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        // Readback rows must be padded to COPY_BYTES_PER_ROW_ALIGNMENT
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = (width * 4).div_ceil(align) * align;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            width,
            height,
            color,
            staging,
            padded_bytes_per_row,
        }
    }
}

/// GPU backend: instanced SDF shapes plus atlas quads.
///
/// Shapes are drawn first in display-list order, then every atlas quad, which
/// matches the order the scene emits them in.
pub struct GpuRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    shape_pipeline: wgpu::RenderPipeline,
    quad_pipeline: wgpu::RenderPipeline,

    view_buffer: wgpu::Buffer,
    view_bind_group: wgpu::BindGroup,
    atlas_texture: wgpu::Texture,
    atlas_bind_group: wgpu::BindGroup,
    atlas_size: u32,

    shape_buffer: wgpu::Buffer,
    shape_capacity: usize,
    quad_buffer: wgpu::Buffer,
    quad_capacity: usize,

    targets: Targets,
    pixels: Canvas,
    atlas_uploads: u64,
}

impl std::fmt::Debug for GpuRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuRenderer")
            .field("width", &self.targets.width)
            .field("height", &self.targets.height)
            .field("atlas_size", &self.atlas_size)
            .field("shape_capacity", &self.shape_capacity)
            .field("quad_capacity", &self.quad_capacity)
            .finish()
    }
}

impl GpuRenderer {
    /// Acquire a device and build a renderer of the given size
    pub fn create(width: u32, height: u32, atlas_size: u32) -> SceneResult<Self> {
        let (device, queue) = pollster::block_on(create_render_device())?;
        Ok(Self::new(Arc::new(device), Arc::new(queue), width, height, atlas_size))
    }

    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        width: u32,
        height: u32,
        atlas_size: u32,
    ) -> Self {
        let (width, height, atlas_size) = (width.max(1), height.max(1), atlas_size.max(1));

        let shape_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shape Shader"),
            source: wgpu::ShaderSource::Wgsl(shape_shader().into()),
        });
        let quad_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(quad_shader().into()),
        });

        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("View Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let atlas_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Atlas Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shape_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shape Pipeline Layout"),
            bind_group_layouts: &[&view_layout],
            push_constant_ranges: &[],
        });
        let quad_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&view_layout, &atlas_layout],
            push_constant_ranges: &[],
        });

        let shape_pipeline = create_pipeline(
            &device,
            "Shape Render Pipeline",
            &shape_layout,
            &shape_module,
            ("vs_shape", "fs_shape"),
            ShapeInstance::layout(),
        );
        let quad_pipeline = create_pipeline(
            &device,
            "Quad Render Pipeline",
            &quad_layout,
            &quad_module,
            ("vs_quad", "fs_quad"),
            QuadInstance::layout(),
        );

        let view_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("View Uniform Buffer"),
            size: std::mem::size_of::<ViewUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("View Bind Group"),
            layout: &view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: view_buffer.as_entire_binding(),
            }],
        });

        let atlas_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Label Atlas"),
            size: wgpu::Extent3d {
                width: atlas_size,
                height: atlas_size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        // Labels are drawn at 1:1, so nearest sampling matches the CPU blit
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Atlas Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let atlas_view = atlas_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let atlas_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Atlas Bind Group"),
            layout: &atlas_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&atlas_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let shape_buffer = instance_buffer::<ShapeInstance>(&device, "Shape Instance Buffer", INITIAL_SHAPES);
        let quad_buffer = instance_buffer::<QuadInstance>(&device, "Quad Instance Buffer", INITIAL_QUADS);
        let targets = Targets::new(&device, width, height);

        info!(width, height, atlas_size, "gpu renderer ready");
        Self {
            device,
            queue,
            shape_pipeline,
            quad_pipeline,
            view_buffer,
            view_bind_group,
            atlas_texture,
            atlas_bind_group,
            atlas_size,
            shape_buffer,
            shape_capacity: INITIAL_SHAPES,
            quad_buffer,
            quad_capacity: INITIAL_QUADS,
            targets,
            pixels: Canvas::new(width, height),
            atlas_uploads: 0,
        }
    }

    /// Number of atlas texture uploads so far
    pub fn atlas_uploads(&self) -> u64 {
        self.atlas_uploads
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn upload_atlas(&mut self, atlas: &LabelAtlas) {
        let canvas = atlas.canvas();
        if canvas.width() != self.atlas_size || canvas.height() != self.atlas_size {
            warn!(
                expected = self.atlas_size,
                width = canvas.width(),
                "atlas size does not match the texture, skipping upload"
            );
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.atlas_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            canvas.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.atlas_size * 4),
                rows_per_image: Some(self.atlas_size),
            },
            wgpu::Extent3d {
                width: self.atlas_size,
                height: self.atlas_size,
                depth_or_array_layers: 1,
            },
        );
        self.atlas_uploads += 1;
        debug!(uploads = self.atlas_uploads, entries = atlas.len(), "atlas uploaded");
    }

    fn ensure_capacity(&mut self, shapes: usize, quads: usize) {
        if shapes > self.shape_capacity {
            self.shape_capacity = shapes.next_power_of_two();
            self.shape_buffer =
                instance_buffer::<ShapeInstance>(&self.device, "Shape Instance Buffer", self.shape_capacity);
        }
        if quads > self.quad_capacity {
            self.quad_capacity = quads.next_power_of_two();
            self.quad_buffer = instance_buffer::<QuadInstance>(&self.device, "Quad Instance Buffer", self.quad_capacity);
        }
    }

    /// Copy the color target back into `self.pixels`
    fn read_pixels(&mut self) -> SceneResult<()> {
        let Targets {
            width,
            height,
            color,
            staging,
            padded_bytes_per_row,
        } = &self.targets;
        let unpadded_bytes_per_row = width * 4;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(*padded_bytes_per_row),
                    rows_per_image: Some(*height),
                },
            },
            wgpu::Extent3d {
                width: *width,
                height: *height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        // Headless readback is the one place the frame waits on the device.
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| SceneError::Gpu(format!("readback channel closed: {e}")))?
            .map_err(|e| SceneError::Gpu(format!("failed to map staging buffer: {e}")))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for y in 0..*height {
            let start = (y * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        staging.unmap();

        self.pixels = Canvas::from_rgba(*width, *height, pixels)?;
        Ok(())
    }
}

impl FrameRenderer for GpuRenderer {
    fn backend(&self) -> Backend {
        Backend::Gpu
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) != (self.targets.width, self.targets.height) {
            debug!(width, height, "resizing gpu targets");
            self.targets = Targets::new(&self.device, width, height);
            self.pixels = Canvas::new(width, height);
        }
    }

    fn render(&mut self, frame: &FrameList, atlas: &mut LabelAtlas) {
        self.resize(frame.width, frame.height);
        if atlas.commit() {
            self.upload_atlas(atlas);
        }

        let shapes: Vec<ShapeInstance> = frame.items.iter().filter_map(ShapeInstance::from_item).collect();
        let quads: Vec<QuadInstance> = frame
            .items
            .iter()
            .filter_map(|item| QuadInstance::from_item(item, self.atlas_size))
            .collect();
        self.ensure_capacity(shapes.len(), quads.len());

        self.queue.write_buffer(
            &self.view_buffer,
            0,
            bytemuck::bytes_of(&ViewUniforms::new(self.targets.width, self.targets.height)),
        );
        if !shapes.is_empty() {
            self.queue.write_buffer(&self.shape_buffer, 0, bytemuck::cast_slice(&shapes));
        }
        if !quads.is_empty() {
            self.queue.write_buffer(&self.quad_buffer, 0, bytemuck::cast_slice(&quads));
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        let color_view = self.targets.color.create_view(&wgpu::TextureViewDescriptor::default());
        {
            let bg = frame.background;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: bg.r as f64,
                            g: bg.g as f64,
                            b: bg.b as f64,
                            a: bg.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if !shapes.is_empty() {
                pass.set_pipeline(&self.shape_pipeline);
                pass.set_bind_group(0, &self.view_bind_group, &[]);
                pass.set_vertex_buffer(0, self.shape_buffer.slice(..));
                pass.draw(0..6, 0..shapes.len() as u32);
            }
            if !quads.is_empty() {
                pass.set_pipeline(&self.quad_pipeline);
                pass.set_bind_group(0, &self.view_bind_group, &[]);
                pass.set_bind_group(1, &self.atlas_bind_group, &[]);
                pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
                pass.draw(0..6, 0..quads.len() as u32);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Err(e) = self.read_pixels() {
            warn!(error = %e, "gpu readback failed, keeping previous frame");
        }
    }

    fn pixels(&self) -> &Canvas {
        &self.pixels
    }
}

fn instance_buffer<T>(device: &wgpu::Device, label: &str, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (capacity.max(1) * std::mem::size_of::<T>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    (vertex_entry, fragment_entry): (&str, &str),
    instances: wgpu::VertexBufferLayout<'static>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(vertex_entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[instances],
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

/// Create a headless GPU device and queue
pub async fn create_render_device() -> SceneResult<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| SceneError::Gpu("no compatible GPU adapter found".to_string()))?;
    debug!(adapter = ?adapter.get_info().name, "gpu adapter selected");

    adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .map_err(|e| SceneError::Gpu(format!("failed to create GPU device: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::frame::DrawItem;
    use crate::labels::{LabelConfig, MonospaceText};

    /// Tests run on machines without a GPU adapter too; those skip
    fn renderer(width: u32, height: u32) -> Option<(GpuRenderer, LabelAtlas)> {
        let config = LabelConfig {
            atlas_size: 256,
            ..Default::default()
        };
        match GpuRenderer::create(width, height, config.atlas_size) {
            Ok(r) => Some((r, LabelAtlas::new(config, Box::new(MonospaceText)))),
            Err(e) => {
                eprintln!("skipping gpu test: {e}");
                None
            }
        }
    }

    #[test]
    fn empty_frame_clears_to_background() {
        let Some((mut r, mut atlas)) = renderer(64, 32) else {
            return;
        };
        let frame = FrameList::new(64, 32, Rgba::rgb8(255, 0, 0, 1.0));
        r.render(&frame, &mut atlas);
        assert_eq!((r.pixels().width(), r.pixels().height()), (64, 32));
        assert_eq!(r.pixels().pixel(5, 5), Some([255, 0, 0, 255]));
    }

    #[test]
    fn circle_covers_its_center() {
        let Some((mut r, mut atlas)) = renderer(64, 64) else {
            return;
        };
        let mut frame = FrameList::new(64, 64, Rgba::rgb8(0, 0, 0, 1.0));
        frame.push(DrawItem::Circle {
            center: (32.0, 32.0),
            radius: 10.0,
            fill: Rgba::WHITE,
            outline: None,
        });
        r.render(&frame, &mut atlas);
        assert_eq!(r.pixels().pixel(32, 32), Some([255, 255, 255, 255]));
        assert_eq!(r.pixels().pixel(2, 2), Some([0, 0, 0, 255]));
    }

    #[test]
    fn atlas_uploads_only_when_dirty() {
        let Some((mut r, mut atlas)) = renderer(64, 64) else {
            return;
        };
        let frame = FrameList::new(64, 64, Rgba::rgb8(0, 0, 0, 1.0));
        atlas.ensure("label");
        r.render(&frame, &mut atlas);
        r.render(&frame, &mut atlas);
        assert_eq!(r.atlas_uploads(), 1);
    }

    #[test]
    fn resize_recreates_targets() {
        let Some((mut r, mut atlas)) = renderer(32, 32) else {
            return;
        };
        r.render(&FrameList::new(300, 20, Rgba::WHITE), &mut atlas);
        assert_eq!((r.pixels().width(), r.pixels().height()), (300, 20));
    }
}
