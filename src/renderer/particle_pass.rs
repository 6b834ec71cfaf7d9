use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::particles::render::{INDICES_PER_QUAD, VERTICES_PER_QUAD};
use crate::particles::{BlendMode, ParticleDrawBatch, ParticleRenderer, ParticleVertex, StencilMode, StencilOp};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    proj: [[f32; 4]; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    blend: BlendMode,
    stencil: StencilMode,
}

#[derive(Debug, Clone, PartialEq)]
struct StagedDraw {
    key: PipelineKey,
    texture: PathBuf,
    first_quad: u32,
    quad_count: u32,
}

struct ParticleTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// wgpu backend for particle quads.
///
/// Batches are staged through [`ParticleRenderer::draw_quads`] during the
/// simulation's draw call, uploaded by [`ParticlePass::prepare`] and replayed
/// into a render pass by [`ParticlePass::encode_pass`]. Textures and pipelines
/// are created lazily and cached for the lifetime of the pass.
pub struct ParticlePass {
    surface_format: wgpu::TextureFormat,
    depth_stencil_format: Option<wgpu::TextureFormat>,
    shader: Option<wgpu::ShaderModule>,
    pipeline_layout: Option<wgpu::PipelineLayout>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    globals_buf: Option<wgpu::Buffer>,
    globals_bg: Option<wgpu::BindGroup>,
    texture_bgl: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    vertex_buffer: Option<wgpu::Buffer>,
    vertex_capacity: usize,
    index_buffer: Option<wgpu::Buffer>,
    index_capacity: usize,
    textures: HashMap<PathBuf, ParticleTexture>,
    staged_vertices: Vec<ParticleVertex>,
    draws: Vec<StagedDraw>,
    warned_stencil: bool,
}

impl ParticlePass {
    /// `depth_stencil_format` must match the attachment bound when encoding;
    /// without one, stencil batches are drawn unmasked.
    pub fn new(surface_format: wgpu::TextureFormat, depth_stencil_format: Option<wgpu::TextureFormat>) -> Self {
        Self {
            surface_format,
            depth_stencil_format,
            shader: None,
            pipeline_layout: None,
            pipelines: HashMap::new(),
            globals_buf: None,
            globals_bg: None,
            texture_bgl: None,
            sampler: None,
            vertex_buffer: None,
            vertex_capacity: 0,
            index_buffer: None,
            index_capacity: 0,
            textures: HashMap::new(),
            staged_vertices: Vec::new(),
            draws: Vec::new(),
            warned_stencil: false,
        }
    }

    pub fn init_pipeline(&mut self, device: &wgpu::Device) -> Result<()> {
        self.pipelines.clear();
        self.textures.clear();
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/particle.wgsl").into()),
        });

        let globals_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Globals BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Globals Buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Globals BG"),
            layout: &globals_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: globals_buf.as_entire_binding() }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Texture BGL"),
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
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Particle Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[&globals_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        self.shader = Some(shader);
        self.pipeline_layout = Some(pipeline_layout);
        self.globals_buf = Some(globals_buf);
        self.globals_bg = Some(globals_bg);
        self.texture_bgl = Some(texture_bgl);
        self.sampler = Some(sampler);
        Ok(())
    }

    pub fn write_globals(&self, queue: &wgpu::Queue, view_proj: Mat4) -> Result<()> {
        let globals = self.globals_buf.as_ref().context("Particle globals buffer missing")?;
        queue.write_buffer(globals, 0, bytemuck::bytes_of(&Globals { proj: view_proj.to_cols_array_2d() }));
        Ok(())
    }

    /// Quads staged since the last [`ParticlePass::finish_frame`].
    pub fn staged_quads(&self) -> usize {
        self.staged_vertices.len() / VERTICES_PER_QUAD
    }

    /// Draw calls `encode_pass` will issue for the staged quads.
    pub fn staged_draws(&self) -> usize {
        self.draws.len()
    }

    /// Uploads staged geometry and creates any textures and pipelines the
    /// staged draws reference.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        if self.draws.is_empty() {
            return Ok(());
        }
        let mut missing_keys = Vec::new();
        let mut missing_textures = Vec::new();
        for draw in &self.draws {
            if !self.pipelines.contains_key(&draw.key) && !missing_keys.contains(&draw.key) {
                missing_keys.push(draw.key);
            }
            if !self.textures.contains_key(&draw.texture) && !missing_textures.contains(&draw.texture) {
                missing_textures.push(draw.texture.clone());
            }
        }
        for key in missing_keys {
            let pipeline = self.create_pipeline(device, key)?;
            self.pipelines.insert(key, pipeline);
        }
        for path in missing_textures {
            let texture = self
                .load_texture(device, queue, &path)
                .with_context(|| format!("Failed to upload particle texture {}", path.display()))?;
            self.textures.insert(path, texture);
        }

        self.ensure_vertex_capacity(device, self.staged_vertices.len());
        self.ensure_index_capacity(device, self.staged_quads());
        let vertex_buffer = self.vertex_buffer.as_ref().context("Particle vertex buffer missing")?;
        queue.write_buffer(vertex_buffer, 0, bytemuck::cast_slice(&self.staged_vertices));
        Ok(())
    }

    pub fn encode_pass(&self, pass: &mut wgpu::RenderPass<'_>) -> Result<()> {
        if self.draws.is_empty() {
            return Ok(());
        }
        pass.set_bind_group(0, self.globals_bg.as_ref().context("Particle globals bind group missing")?, &[]);
        let vertex_buffer = self.vertex_buffer.as_ref().context("Particle vertex buffer missing")?;
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        let index_buffer = self.index_buffer.as_ref().context("Particle index buffer missing")?;
        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        if self.depth_stencil_format.is_some() {
            pass.set_stencil_reference(1);
        }
        for draw in &self.draws {
            let pipeline = self.pipelines.get(&draw.key).context("Particle pipeline missing; call prepare first")?;
            let texture = self
                .textures
                .get(&draw.texture)
                .with_context(|| format!("Particle texture {} not uploaded", draw.texture.display()))?;
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, &texture.bind_group, &[]);
            let per_quad = INDICES_PER_QUAD as u32;
            let start = draw.first_quad * per_quad;
            let end = (draw.first_quad + draw.quad_count) * per_quad;
            pass.draw_indexed(start..end, 0, 0..1);
        }
        Ok(())
    }

    /// Drops staged geometry. Cached textures and pipelines are kept.
    pub fn finish_frame(&mut self) {
        self.staged_vertices.clear();
        self.draws.clear();
    }

    /// Forces the texture at `path` to be re-read on the next `prepare`.
    pub fn invalidate_texture(&mut self, path: &Path) {
        self.textures.remove(path);
    }

    fn resolve_stencil(&mut self, stencil: StencilMode) -> StencilMode {
        if stencil == StencilMode::Disabled || self.depth_stencil_format.is_some() {
            return stencil;
        }
        if !self.warned_stencil {
            log::warn!("Particle pass has no stencil attachment; stencil batches are drawn unmasked");
            self.warned_stencil = true;
        }
        StencilMode::Disabled
    }

    fn stage(&mut self, batch: &ParticleDrawBatch<'_>) {
        let quad_count = batch.quad_count();
        if quad_count == 0 {
            return;
        }
        let key = PipelineKey { blend: batch.blend_mode, stencil: self.resolve_stencil(batch.stencil) };
        let first_quad = self.staged_quads() as u32;
        self.staged_vertices.extend_from_slice(&batch.vertices[..quad_count * VERTICES_PER_QUAD]);
        if let Some(last) = self.draws.last_mut() {
            if last.key == key && last.texture == batch.frame.path && last.first_quad + last.quad_count == first_quad
            {
                last.quad_count += quad_count as u32;
                return;
            }
        }
        self.draws.push(StagedDraw {
            key,
            texture: batch.frame.path.clone(),
            first_quad,
            quad_count: quad_count as u32,
        });
    }

    fn ensure_vertex_capacity(&mut self, device: &wgpu::Device, vertices: usize) {
        if vertices <= self.vertex_capacity && self.vertex_buffer.is_some() {
            return;
        }
        let capacity = vertices.next_power_of_two().max(256);
        self.vertex_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle VB"),
            size: (capacity * std::mem::size_of::<ParticleVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.vertex_capacity = capacity;
    }

    fn ensure_index_capacity(&mut self, device: &wgpu::Device, quads: usize) {
        if quads <= self.index_capacity && self.index_buffer.is_some() {
            return;
        }
        let capacity = quads.next_power_of_two().max(64);
        let indices = quad_indices(capacity);
        self.index_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle IB"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        }));
        self.index_capacity = capacity;
    }

    fn load_texture(&self, device: &wgpu::Device, queue: &wgpu::Queue, path: &Path) -> Result<ParticleTexture> {
        let layout = self.texture_bgl.as_ref().context("Particle texture layout missing; call init_pipeline")?;
        let sampler = self.sampler.as_ref().context("Particle sampler missing; call init_pipeline")?;
        let img = image::open(path)?.to_rgba8();
        let (w, h) = img.dimensions();
        let rgba = img.into_raw();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Particle Texture"),
            size: wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * w), rows_per_image: Some(h) },
            wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Texture BG"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
            ],
        });
        log::debug!("Uploaded particle texture {} ({w}x{h})", path.display());
        Ok(ParticleTexture { _texture: texture, bind_group })
    }

    fn create_pipeline(&self, device: &wgpu::Device, key: PipelineKey) -> Result<wgpu::RenderPipeline> {
        let shader = self.shader.as_ref().context("Particle shader missing; call init_pipeline")?;
        let layout = self.pipeline_layout.as_ref().context("Particle pipeline layout missing")?;
        let depth_stencil = self.depth_stencil_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: stencil_state(key.stencil),
            bias: wgpu::DepthBiasState::default(),
        });
        Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ParticleVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute { shader_location: 0, format: wgpu::VertexFormat::Float32x3, offset: 0 },
                        wgpu::VertexAttribute { shader_location: 1, format: wgpu::VertexFormat::Float32x4, offset: 12 },
                        wgpu::VertexAttribute { shader_location: 2, format: wgpu::VertexFormat::Float32x2, offset: 28 },
                    ],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.surface_format,
                    blend: blend_state(key.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState { topology: wgpu::PrimitiveTopology::TriangleList, ..Default::default() },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        }))
    }
}

impl ParticleRenderer for ParticlePass {
    fn draw_quads(&mut self, batch: &ParticleDrawBatch<'_>) -> Result<()> {
        self.stage(batch);
        Ok(())
    }
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        }),
    }
}

fn stencil_state(mode: StencilMode) -> wgpu::StencilState {
    let (face, write_mask) = match mode {
        StencilMode::Disabled => return wgpu::StencilState::default(),
        StencilMode::Write(op) => (
            wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: stencil_operation(op),
            },
            0xff,
        ),
        StencilMode::Test => (
            wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Equal,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Keep,
            },
            0,
        ),
    };
    wgpu::StencilState { front: face, back: face, read_mask: 0xff, write_mask }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        // Written against a reference of 1.
        StencilOp::One => wgpu::StencilOperation::Replace,
    }
}

fn quad_indices(quads: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(quads * INDICES_PER_QUAD);
    for quad in 0..quads as u32 {
        let base = quad * VERTICES_PER_QUAD as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    indices
}
