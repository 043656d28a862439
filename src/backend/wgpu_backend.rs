//! `wgpu` implementation of [`RenderBackend`].
//!
//! Renders either into a window surface or into an offscreen texture. All
//! engine textures are `Rgba8Unorm`; each pass is encoded and submitted on
//! its own, so uniform writes and render-target reads are ordered exactly as
//! the simulation issues them.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use log::{debug, info, warn};
use winit::window::Window;

use super::{
    BlendMode, DrawPass, FilterMode, FrameStats, ProgramHandle, QuadPass, RenderBackend, RenderTarget,
    TextureDesc, TextureHandle, UpdatePass,
};
use crate::error::{Result, WindError};
use crate::shader::{DrawUniforms, ProgramKind, ProgramSource, ScreenUniforms, UpdateUniforms};

/// Format of every engine-owned texture.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

enum SurfaceTarget {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
    },
}

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuProgram {
    kind: ProgramKind,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    pipelines: HashMap<(wgpu::TextureFormat, BlendMode), wgpu::RenderPipeline>,
}

/// GPU backend built on `wgpu`.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: SurfaceTarget,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    textures: HashMap<TextureHandle, GpuTexture>,
    programs: HashMap<ProgramHandle, GpuProgram>,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    max_texture_dimension: u32,
    next_id: u64,
    stats: FrameStats,
}

impl WgpuBackend {
    /// Create a backend presenting into `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Compositing math assumes a linear 8-bit target, like a WebGL canvas.
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| WindError::UnsupportedSurface("surface reports no texture formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            "wgpu backend on '{}' ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            config.width,
            config.height,
            surface_format
        );

        Ok(Self::from_parts(device, queue, SurfaceTarget::Window { surface, config }))
    }

    /// Create a backend rendering into an offscreen `width`×`height` texture.
    pub async fn headless(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = request_device(&adapter).await?;
        info!("wgpu headless backend on '{}', target {}x{}", adapter.get_info().name, width, height);

        let (texture, view) = create_offscreen(&device, width, height);
        let target = SurfaceTarget::Offscreen {
            texture,
            view,
            width: width.max(1),
            height: height.max(1),
        };
        Ok(Self::from_parts(device, queue, target))
    }

    fn from_parts(device: wgpu::Device, queue: wgpu::Queue, target: SurfaceTarget) -> Self {
        let linear_sampler = create_sampler(&device, "Linear Sampler", wgpu::FilterMode::Linear);
        let nearest_sampler = create_sampler(&device, "Nearest Sampler", wgpu::FilterMode::Nearest);
        let max_texture_dimension = device.limits().max_texture_dimension_2d;
        Self {
            device,
            queue,
            target,
            frame: None,
            textures: HashMap::new(),
            programs: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            max_texture_dimension,
            next_id: 1,
            stats: FrameStats::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn surface_format(&self) -> wgpu::TextureFormat {
        match &self.target {
            SurfaceTarget::Window { config, .. } => config.format,
            SurfaceTarget::Offscreen { .. } => TEXTURE_FORMAT,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, handle: TextureHandle) -> Result<&GpuTexture> {
        self.textures
            .get(&handle)
            .ok_or_else(|| WindError::UnknownResource(format!("texture {handle:?}")))
    }

    fn program(&self, handle: ProgramHandle, kind: ProgramKind) -> Result<&GpuProgram> {
        match self.programs.get(&handle) {
            Some(p) if p.kind == kind => Ok(p),
            _ => Err(WindError::UnknownResource(format!(
                "{} program {handle:?}",
                kind.label()
            ))),
        }
    }

    fn sampler(&self, filter: FilterMode) -> &wgpu::Sampler {
        match filter {
            FilterMode::Linear => &self.linear_sampler,
            FilterMode::Nearest => &self.nearest_sampler,
        }
    }

    /// View and format of a pass destination.
    fn target_view(&self, target: RenderTarget) -> Result<(&wgpu::TextureView, wgpu::TextureFormat)> {
        match target {
            RenderTarget::Texture(handle) => Ok((&self.texture(handle)?.view, TEXTURE_FORMAT)),
            RenderTarget::Surface => match &self.target {
                SurfaceTarget::Offscreen { view, .. } => Ok((view, TEXTURE_FORMAT)),
                SurfaceTarget::Window { config, .. } => self
                    .frame
                    .as_ref()
                    .map(|(_, view)| (view, config.format))
                    .ok_or_else(|| WindError::UnknownResource("surface frame not acquired".into())),
            },
        }
    }

    /// Encode one render pass and submit it immediately.
    #[allow(clippy::too_many_arguments)]
    fn submit_pass(
        &self,
        label: &str,
        program: &GpuProgram,
        bind_group: &wgpu::BindGroup,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        blend: BlendMode,
        load: wgpu::LoadOp<wgpu::Color>,
        vertices: Range<u32>,
    ) -> Result<()> {
        let pipeline = program.pipelines.get(&(format, blend)).ok_or_else(|| {
            WindError::UnknownResource(format!(
                "{} pipeline for {format:?}/{blend:?}",
                program.kind.label()
            ))
        })?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.draw(vertices, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn check_texture(&self, desc: &TextureDesc) -> Result<()> {
        let max = self.max_texture_dimension;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(WindError::allocation(
                desc.label,
                desc.width,
                desc.height,
                format!("texture sides must be in 1..={max}"),
            ));
        }
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureHandle> {
        self.check_texture(desc)?;
        if let Some(bytes) = data {
            if bytes.len() != desc.byte_len() {
                return Err(WindError::allocation(
                    desc.label,
                    desc.width,
                    desc.height,
                    format!("initial data is {} bytes, expected {}", bytes.len(), desc.byte_len()),
                ));
            }
        }

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: extent(desc.width, desc.height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage,
            view_formats: &[],
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(WindError::allocation(desc.label, desc.width, desc.height, err.to_string()));
        }

        if let Some(bytes) = data {
            write_rgba(&self.queue, &texture, desc.width, desc.height, bytes);
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let handle = TextureHandle(self.allocate_id());
        debug!("wgpu: created texture {:?} '{}' {}x{}", handle, desc.label, desc.width, desc.height);
        self.textures.insert(handle, GpuTexture { desc: *desc, texture, view });
        Ok(handle)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()> {
        let tex = self.texture(texture)?;
        if data.len() != tex.desc.byte_len() {
            return Err(WindError::InvalidParameter(format!(
                "write of {} bytes into '{}' ({} bytes)",
                data.len(),
                tex.desc.label,
                tex.desc.byte_len()
            )));
        }
        write_rgba(&self.queue, &tex.texture, tex.desc.width, tex.desc.height, data);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture) {
            Some(tex) => {
                debug!("wgpu: destroyed texture {:?} '{}'", texture, tex.desc.label);
                tex.texture.destroy();
            }
            None => warn!("wgpu: texture {:?} released twice", texture),
        }
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        let kind = source.kind;
        let label = kind.label();
        let surface_format = self.surface_format();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
        });
        let bind_group_layout = create_bind_group_layout(&self.device, kind);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let mut pipelines = HashMap::new();
        for variant in pipeline_variants(kind, surface_format) {
            pipelines.entry(variant).or_insert_with(|| {
                create_pipeline(&self.device, &pipeline_layout, &module, source, variant.0, variant.1)
            });
        }

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(WindError::shader(label, err.to_string()));
        }

        let uniform_size = match kind {
            ProgramKind::Update => std::mem::size_of::<UpdateUniforms>(),
            ProgramKind::Draw => std::mem::size_of::<DrawUniforms>(),
            ProgramKind::Screen => std::mem::size_of::<ScreenUniforms>(),
        };
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} uniforms")),
            size: uniform_size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let handle = ProgramHandle(self.allocate_id());
        debug!("wgpu: compiled {} program {:?} ({} pipelines)", label, handle, pipelines.len());
        self.programs.insert(
            handle,
            GpuProgram {
                kind,
                bind_group_layout,
                uniform_buffer,
                pipelines,
            },
        );
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        match self.programs.remove(&program) {
            Some(p) => p.uniform_buffer.destroy(),
            None => warn!("wgpu: program {:?} released twice", program),
        }
    }

    fn program_kind(&self, program: ProgramHandle) -> Option<ProgramKind> {
        self.programs.get(&program).map(|p| p.kind)
    }

    fn surface_size(&self) -> (u32, u32) {
        match &self.target {
            SurfaceTarget::Window { config, .. } => (config.width, config.height),
            SurfaceTarget::Offscreen { width, height, .. } => (*width, *height),
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        match &mut self.target {
            SurfaceTarget::Window { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            SurfaceTarget::Offscreen {
                texture,
                view,
                width: w,
                height: h,
            } => {
                texture.destroy();
                let (new_texture, new_view) = create_offscreen(&self.device, width, height);
                *texture = new_texture;
                *view = new_view;
                *w = width;
                *h = height;
            }
        }
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<()> {
        let SurfaceTarget::Window { surface, config } = &self.target else {
            return Ok(());
        };
        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("wgpu: surface lost, reconfiguring");
                surface.configure(&self.device, config);
                surface.get_current_texture()?
            }
            Err(e) => return Err(e.into()),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some((frame, view));
        Ok(())
    }

    fn update_particles(&mut self, pass: &UpdatePass) -> Result<()> {
        let program = self.program(pass.program, ProgramKind::Update)?;
        let field = self.texture(pass.field)?;
        let particles = self.texture(pass.particles)?;
        let (view, format) = self.target_view(RenderTarget::Texture(pass.target))?;

        self.queue
            .write_buffer(&program.uniform_buffer, 0, bytemuck::bytes_of(&pass.uniforms));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Update Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: program.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&field.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(self.sampler(field.desc.filter)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&particles.view),
                },
            ],
        });

        self.submit_pass(
            "Update Pass",
            program,
            &bind_group,
            view,
            format,
            BlendMode::Replace,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            0..3,
        )?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn draw_particles(&mut self, pass: &DrawPass) -> Result<()> {
        let program = self.program(pass.program, ProgramKind::Draw)?;
        let field = self.texture(pass.field)?;
        let particles = self.texture(pass.particles)?;
        let ramp = self.texture(pass.color_ramp)?;
        let (view, format) = self.target_view(RenderTarget::Texture(pass.target))?;

        self.queue
            .write_buffer(&program.uniform_buffer, 0, bytemuck::bytes_of(&pass.uniforms));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: program.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&field.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(self.sampler(field.desc.filter)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&particles.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&ramp.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(self.sampler(ramp.desc.filter)),
                },
            ],
        });

        self.submit_pass(
            "Draw Pass",
            program,
            &bind_group,
            view,
            format,
            BlendMode::Replace,
            wgpu::LoadOp::Load,
            0..pass.count,
        )?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn draw_quad(&mut self, pass: &QuadPass) -> Result<()> {
        let program = self.program(pass.program, ProgramKind::Screen)?;
        let source = self.texture(pass.source)?;
        let (view, format) = self.target_view(pass.target)?;

        self.queue
            .write_buffer(&program.uniform_buffer, 0, bytemuck::bytes_of(&pass.uniforms));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Screen Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: program.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(self.sampler(source.desc.filter)),
                },
            ],
        });

        let load = match pass.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        self.submit_pass("Screen Pass", program, &bind_group, view, format, pass.blend, load, 0..3)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if let Some((frame, view)) = self.frame.take() {
            drop(view);
            frame.present();
        }
        self.stats.frames += 1;
        Ok(())
    }

    fn stats(&self) -> FrameStats {
        FrameStats {
            live_textures: self.textures.len(),
            live_programs: self.programs.len(),
            ..self.stats
        }
    }
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        })
        .await?;
    Ok((device, queue))
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn write_rgba(queue: &wgpu::Queue, texture: &wgpu::Texture, width: u32, height: u32, data: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        extent(width, height),
    );
}

fn create_offscreen(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Surface"),
        size: extent(width.max(1), height.max(1)),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_sampler(device: &wgpu::Device, label: &str, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Target format and blend combinations a program is used with.
fn pipeline_variants(
    kind: ProgramKind,
    surface_format: wgpu::TextureFormat,
) -> Vec<(wgpu::TextureFormat, BlendMode)> {
    match kind {
        ProgramKind::Update | ProgramKind::Draw => vec![(TEXTURE_FORMAT, BlendMode::Replace)],
        ProgramKind::Screen => vec![
            (TEXTURE_FORMAT, BlendMode::Replace),
            (TEXTURE_FORMAT, BlendMode::Alpha),
            (surface_format, BlendMode::Replace),
            (surface_format, BlendMode::Alpha),
        ],
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, visibility: wgpu::ShaderStages, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn create_bind_group_layout(device: &wgpu::Device, kind: ProgramKind) -> wgpu::BindGroupLayout {
    let entries = match kind {
        ProgramKind::Update => {
            let stage = wgpu::ShaderStages::VERTEX_FRAGMENT;
            vec![
                uniform_entry(0, stage),
                texture_entry(1, stage, true),
                sampler_entry(2, stage),
                // Particle state is fetched exactly, never filtered.
                texture_entry(3, stage, false),
            ]
        }
        ProgramKind::Draw => {
            let stage = wgpu::ShaderStages::VERTEX_FRAGMENT;
            vec![
                uniform_entry(0, stage),
                texture_entry(1, stage, true),
                sampler_entry(2, stage),
                texture_entry(3, stage, false),
                texture_entry(4, stage, true),
                sampler_entry(5, stage),
            ]
        }
        ProgramKind::Screen => {
            let stage = wgpu::ShaderStages::FRAGMENT;
            vec![
                uniform_entry(0, stage),
                texture_entry(1, stage, true),
                sampler_entry(2, stage),
            ]
        }
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{} Bind Group Layout", kind.label())),
        entries: &entries,
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    source: &ProgramSource,
    format: wgpu::TextureFormat,
    blend: BlendMode,
) -> wgpu::RenderPipeline {
    let topology = match source.kind {
        ProgramKind::Draw => wgpu::PrimitiveTopology::PointList,
        ProgramKind::Update | ProgramKind::Screen => wgpu::PrimitiveTopology::TriangleList,
    };
    let blend = match blend {
        BlendMode::Replace => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(source.kind.label()),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(source.vertex_entry),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(source.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
