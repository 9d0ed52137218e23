//! [`RenderDevice`] backed by wgpu textures.
//!
//! Every texture is an `Rgba8Unorm` render target that can also be sampled,
//! so a bucket's front texture can be drawn straight into the screen target.
//! Batch vertices are converted to NDC on the CPU against the target size and
//! uploaded once per submit; each batch becomes one indexed draw call with the
//! pipeline matching its composite operation.

use std::collections::HashMap;

use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, BlendComponent, BlendFactor, BlendOperation, BlendState, Device,
    Extent3d, PipelineLayout, Queue, RenderPipeline, Sampler, ShaderModule, Texture,
    TextureDimension, TextureFormat, TextureUsages, TextureView, VertexAttribute,
    VertexBufferLayout, VertexFormat, VertexStepMode,
};

use crate::error::DeviceError;
use crate::renderer::batch::{Batch, Quad, Vertex};
use crate::renderer::device::{RenderDevice, TextureHandle};
use crate::renderer::types::{Color, CompositeOperation, FilterMode};
use crate::SceneConfig;

const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

struct GpuTexture {
    texture: Texture,
    view: TextureView,
    bind_group: BindGroup,
    width: u32,
    height: u32,
}

pub struct WgpuDevice {
    device: Device,
    queue: Queue,
    shader: ShaderModule,
    bind_group_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
    pipelines: HashMap<CompositeOperation, RenderPipeline>,
    linear_sampler: Sampler,
    nearest_sampler: Sampler,
    white: GpuTexture,
    textures: HashMap<u64, GpuTexture>,
    screen_targets: Vec<u64>,
    next_id: u64,
    clear_color: Color,
}

impl WgpuDevice {
    /// Create a device without a surface, for offscreen rendering.
    pub fn new_headless(config: &SceneConfig) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| DeviceError::Backend(e.to_string()))?;
        log::info!("Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Layerkit Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| DeviceError::Backend(e.to_string()))?;

        Ok(Self::from_device(device, queue, config))
    }

    /// Wrap an existing device, e.g. one shared with a windowing layer.
    pub fn from_device(device: Device, queue: Queue, config: &SceneConfig) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("quad_shader.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let linear_sampler = create_sampler(&device, wgpu::FilterMode::Linear);
        let nearest_sampler = create_sampler(&device, wgpu::FilterMode::Nearest);

        let white = create_gpu_texture(&device, &bind_group_layout, &linear_sampler, 1, 1);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &white.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255u8; 4],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        Self {
            device,
            queue,
            shader,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            white,
            textures: HashMap::new(),
            screen_targets: Vec::new(),
            next_id: 0,
            clear_color: config.clear_color,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Allocate a texture that `clear` fills with the configured clear color
    /// instead of transparent.
    pub fn create_screen_texture(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<TextureHandle, DeviceError> {
        let handle = self.create_texture(width, height, FilterMode::Linear)?;
        self.screen_targets.push(handle.id);
        Ok(handle)
    }

    /// Underlying wgpu texture, e.g. to copy it to a surface.
    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(&handle.id).map(|t| &t.texture)
    }

    fn target(&self, target: TextureHandle) -> Result<&GpuTexture, DeviceError> {
        self.textures
            .get(&target.id)
            .ok_or(DeviceError::UnknownTexture(target.id))
    }

    fn ensure_pipeline(&mut self, op: CompositeOperation) {
        if self.pipelines.contains_key(&op) {
            return;
        }
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quad Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: Some(blend_state(op)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.pipelines.insert(op, pipeline);
    }
}

impl RenderDevice for WgpuDevice {
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        filter: FilterMode,
    ) -> Result<TextureHandle, DeviceError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(DeviceError::TextureAllocation {
                width,
                height,
                reason: format!("exceeds max texture dimension {max}"),
            });
        }

        let sampler = match filter {
            FilterMode::Linear => &self.linear_sampler,
            FilterMode::Nearest => &self.nearest_sampler,
        };
        // Zero-sized buckets still get a backing texture
        let texture = create_gpu_texture(
            &self.device,
            &self.bind_group_layout,
            sampler,
            width.max(1),
            height.max(1),
        );

        self.next_id += 1;
        self.textures.insert(self.next_id, texture);
        Ok(TextureHandle {
            id: self.next_id,
            width,
            height,
        })
    }

    fn free_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture.id) {
            Some(gpu) => gpu.texture.destroy(),
            None => log::warn!("free of unknown texture {}", texture.id),
        }
        self.screen_targets.retain(|&id| id != texture.id);
    }

    fn clear(&mut self, target: TextureHandle) -> Result<(), DeviceError> {
        let color = if self.screen_targets.contains(&target.id) {
            self.clear_color
        } else {
            Color::TRANSPARENT
        };
        let view = &self.target(target)?.view;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: (color.r * color.a) as f64,
                            g: (color.g * color.a) as f64,
                            b: (color.b * color.a) as f64,
                            a: color.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn submit(&mut self, target: TextureHandle, batches: &[Batch]) -> Result<(), DeviceError> {
        if batches.is_empty() {
            self.target(target)?;
            return Ok(());
        }

        for batch in batches {
            if let Some(texture) = batch.texture() {
                if texture.id == target.id {
                    return Err(DeviceError::Backend(format!(
                        "texture {} sampled while being rendered to",
                        texture.id
                    )));
                }
                self.target(texture)?;
            }
            self.ensure_pipeline(batch.operation());
        }

        let gpu_target = self.target(target)?;
        let vertices = vertices_in_ndc(batches, gpu_target.width as f32, gpu_target.height as f32);
        let quad_total: usize = batches.iter().map(|b| b.quads().len()).sum();
        let indices = quad_indices(quad_total);

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Batch Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Batch Index Buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Batch Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Batch Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &gpu_target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);

            let mut first_quad = 0u32;
            for batch in batches {
                let quad_count = batch.quads().len() as u32;
                let bind_group = match batch.texture() {
                    Some(texture) => &self.target(texture)?.bind_group,
                    None => &self.white.bind_group,
                };
                if let Some(pipeline) = self.pipelines.get(&batch.operation()) {
                    render_pass.set_pipeline(pipeline);
                    render_pass.set_bind_group(0, bind_group, &[]);
                    render_pass.draw_indexed(first_quad * 6..(first_quad + quad_count) * 6, 0, 0..1);
                }
                first_quad += quad_count;
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        log::trace!(
            "submitted {} batches ({} quads) to texture {}",
            batches.len(),
            quad_total,
            target.id
        );
        Ok(())
    }
}

fn create_sampler(device: &Device, filter: wgpu::FilterMode) -> Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Quad Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

fn create_gpu_texture(
    device: &Device,
    layout: &BindGroupLayout,
    sampler: &Sampler,
    width: u32,
    height: u32,
) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Bucket Texture"),
        size: Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT
            | TextureUsages::TEXTURE_BINDING
            | TextureUsages::COPY_SRC
            | TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Quad Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    GpuTexture {
        texture,
        view,
        bind_group,
        width,
        height,
    }
}

fn vertex_layout() -> VertexBufferLayout<'static> {
    VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &[
            // position (NDC)
            VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: VertexFormat::Float32x2,
            },
            // uv
            VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: VertexFormat::Float32x2,
            },
            // color
            VertexAttribute {
                offset: 16,
                shader_location: 2,
                format: VertexFormat::Float32x4,
            },
        ],
    }
}

/// Convert pixel coordinates to NDC.
fn to_ndc(x: f32, y: f32, target_width: f32, target_height: f32) -> [f32; 2] {
    [
        (x / target_width) * 2.0 - 1.0,
        1.0 - (y / target_height) * 2.0,
    ]
}

fn vertices_in_ndc(batches: &[Batch], target_width: f32, target_height: f32) -> Vec<Vertex> {
    batches
        .iter()
        .flat_map(|b| b.quads())
        .flat_map(|q: &Quad| q.vertices)
        .map(|v| Vertex {
            position: to_ndc(v.position[0], v.position[1], target_width, target_height),
            ..v
        })
        .collect()
}

fn quad_indices(quads: usize) -> Vec<u32> {
    (0..quads as u32)
        .flat_map(|q| Quad::INDICES.map(|i| q * 4 + i as u32))
        .collect()
}

/// Porter-Duff factors for premultiplied colors.
fn blend_state(op: CompositeOperation) -> BlendState {
    use BlendFactor::*;
    let (src, dst) = match op {
        CompositeOperation::Clear => (Zero, Zero),
        CompositeOperation::Copy => (One, Zero),
        CompositeOperation::SourceOver => (One, OneMinusSrcAlpha),
        CompositeOperation::SourceIn => (DstAlpha, Zero),
        CompositeOperation::SourceOut => (OneMinusDstAlpha, Zero),
        CompositeOperation::SourceAtop => (DstAlpha, OneMinusSrcAlpha),
        CompositeOperation::DestinationOver => (OneMinusDstAlpha, One),
        CompositeOperation::DestinationIn => (Zero, SrcAlpha),
        CompositeOperation::DestinationOut => (Zero, OneMinusSrcAlpha),
        CompositeOperation::DestinationAtop => (OneMinusDstAlpha, SrcAlpha),
        CompositeOperation::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
        CompositeOperation::Lighter => (One, One),
        CompositeOperation::Multiply => (Dst, OneMinusSrcAlpha),
    };
    let component = BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: BlendOperation::Add,
    };
    BlendState {
        color: component,
        alpha: component,
    }
}
