//! CPU reference backend.
//!
//! Executes the update, draw and screen programs with the functions in
//! [`crate::kernels`] on plain byte buffers. Used for headless runs, for
//! deterministic frame-by-frame tests, and as an executable description of
//! what the WGSL programs compute. Programs are parsed and validated with
//! `naga`, so broken WGSL fails here exactly as it would on a device.

use std::collections::HashMap;

use glam::{UVec2, Vec2, Vec4};
use log::{debug, warn};

use super::{
    BlendMode, DrawPass, FilterMode, FrameStats, ProgramHandle, QuadPass, RenderBackend, RenderTarget,
    TextureDesc, TextureHandle, UpdatePass,
};
use crate::error::{Result, WindError};
use crate::kernels;
use crate::shader::{ProgramKind, ProgramSource};

/// Resource limits of a [`SoftwareBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareLimits {
    /// Largest allowed texture side.
    pub max_texture_dimension: u32,
    /// Total texel memory across all live textures.
    pub max_texture_bytes: usize,
}

impl Default for SoftwareLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension: 8192,
            max_texture_bytes: 1 << 30,
        }
    }
}

struct SoftTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

impl SoftTexture {
    fn sample(&self, uv: Vec2) -> Vec4 {
        match self.desc.filter {
            FilterMode::Linear => kernels::sample_bilinear(&self.data, self.desc.width, self.desc.height, uv),
            FilterMode::Nearest => kernels::sample_nearest(&self.data, self.desc.width, self.desc.height, uv),
        }
    }

    fn fetch(&self, x: u32, y: u32) -> [u8; 4] {
        kernels::texel_fetch(&self.data, self.desc.width, self.desc.height, x as i64, y as i64)
    }
}

/// Software implementation of [`RenderBackend`].
pub struct SoftwareBackend {
    limits: SoftwareLimits,
    textures: HashMap<TextureHandle, SoftTexture>,
    programs: HashMap<ProgramHandle, ProgramKind>,
    next_id: u64,
    surface: Vec<u8>,
    surface_size: (u32, u32),
    stats: FrameStats,
    stale_releases: u64,
}

impl SoftwareBackend {
    /// Create a backend with a `width`×`height` surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            limits: SoftwareLimits::default(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            surface: vec![0; width as usize * height as usize * 4],
            surface_size: (width, height),
            stats: FrameStats::default(),
            stale_releases: 0,
        }
    }

    pub fn with_limits(mut self, limits: SoftwareLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn set_limits(&mut self, limits: SoftwareLimits) {
        self.limits = limits;
    }

    /// Texel data of a live texture.
    pub fn texture_data(&self, texture: TextureHandle) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.data.as_slice())
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(&texture).map(|t| t.desc)
    }

    /// Current surface contents, RGBA8, top row first.
    pub fn surface_pixels(&self) -> &[u8] {
        &self.surface
    }

    /// Number of destroy calls that named an already released resource.
    pub fn stale_releases(&self) -> u64 {
        self.stale_releases
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, handle: TextureHandle) -> Result<&SoftTexture> {
        self.textures
            .get(&handle)
            .ok_or_else(|| WindError::UnknownResource(format!("texture {handle:?}")))
    }

    fn check_program(&self, program: ProgramHandle, kind: ProgramKind) -> Result<()> {
        match self.programs.get(&program) {
            Some(k) if *k == kind => Ok(()),
            Some(k) => Err(WindError::UnknownResource(format!(
                "program {program:?} is a {} program, expected {}",
                k.label(),
                kind.label()
            ))),
            None => Err(WindError::UnknownResource(format!("program {program:?}"))),
        }
    }

    fn check_render_target(&self, handle: TextureHandle) -> Result<()> {
        if self.texture(handle)?.desc.render_target {
            Ok(())
        } else {
            Err(WindError::UnknownResource(format!(
                "texture {handle:?} is not a render target"
            )))
        }
    }

    fn live_bytes(&self) -> usize {
        self.textures.values().map(|t| t.data.len()).sum()
    }
}

impl RenderBackend for SoftwareBackend {
    fn check_texture(&self, desc: &TextureDesc) -> Result<()> {
        if desc.width == 0 || desc.height == 0 {
            return Err(WindError::allocation(desc.label, desc.width, desc.height, "zero-sized texture"));
        }
        let max = self.limits.max_texture_dimension;
        if desc.width > max || desc.height > max {
            return Err(WindError::allocation(
                desc.label,
                desc.width,
                desc.height,
                format!("exceeds max texture dimension {max}"),
            ));
        }
        if self.live_bytes() + desc.byte_len() > self.limits.max_texture_bytes {
            return Err(WindError::allocation(desc.label, desc.width, desc.height, "out of texture memory"));
        }
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureHandle> {
        self.check_texture(desc)?;

        let data = match data {
            Some(bytes) if bytes.len() != desc.byte_len() => {
                return Err(WindError::allocation(
                    desc.label,
                    desc.width,
                    desc.height,
                    format!("initial data is {} bytes, expected {}", bytes.len(), desc.byte_len()),
                ));
            }
            Some(bytes) => bytes.to_vec(),
            None => vec![0; desc.byte_len()],
        };

        let handle = TextureHandle(self.allocate_id());
        debug!("software: created texture {:?} '{}' {}x{}", handle, desc.label, desc.width, desc.height);
        self.textures.insert(handle, SoftTexture { desc: *desc, data });
        Ok(handle)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()> {
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| WindError::UnknownResource(format!("texture {texture:?}")))?;
        if data.len() != tex.data.len() {
            return Err(WindError::InvalidParameter(format!(
                "write of {} bytes into '{}' ({} bytes)",
                data.len(),
                tex.desc.label,
                tex.data.len()
            )));
        }
        tex.data.copy_from_slice(data);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            debug!("software: destroyed texture {:?}", texture);
        } else {
            warn!("software: texture {:?} released twice", texture);
            self.stale_releases += 1;
        }
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        let label = source.kind.label();
        let module = naga::front::wgsl::parse_str(&source.wgsl)
            .map_err(|e| WindError::shader(label, e.emit_to_string(&source.wgsl)))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| WindError::shader(label, format!("WGSL validation error: {:?}", e)))?;

        for (entry, stage) in [
            (source.vertex_entry, naga::ShaderStage::Vertex),
            (source.fragment_entry, naga::ShaderStage::Fragment),
        ] {
            if !module.entry_points.iter().any(|ep| ep.name == entry && ep.stage == stage) {
                return Err(WindError::shader(
                    label,
                    format!("{stage:?} entry point '{entry}' not found"),
                ));
            }
        }

        let handle = ProgramHandle(self.allocate_id());
        self.programs.insert(handle, source.kind);
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            warn!("software: program {:?} released twice", program);
            self.stale_releases += 1;
        }
    }

    fn program_kind(&self, program: ProgramHandle) -> Option<ProgramKind> {
        self.programs.get(&program).copied()
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.surface_size = (width, height);
        self.surface = vec![0; width as usize * height as usize * 4];
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<()> {
        Ok(())
    }

    fn update_particles(&mut self, pass: &UpdatePass) -> Result<()> {
        self.check_program(pass.program, ProgramKind::Update)?;
        self.check_render_target(pass.target)?;
        if pass.target == pass.particles {
            return Err(WindError::InvalidParameter(
                "update pass reads and writes the same state texture".into(),
            ));
        }

        let params = pass.uniforms.advect_params();
        let field = self.texture(pass.field)?;
        let particles = self.texture(pass.particles)?;
        let target_desc = self.texture(pass.target)?.desc;

        let mut out = Vec::with_capacity(target_desc.byte_len());
        for y in 0..target_desc.height {
            for x in 0..target_desc.width {
                let pos = kernels::decode_position(particles.fetch(x, y));
                let channels = field.sample(pos).truncate().truncate();
                let next = kernels::advect(pos, channels, UVec2::new(x, y), &params);
                out.extend_from_slice(&kernels::encode_position(next.position()));
            }
        }

        self.write_texture(pass.target, &out)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn draw_particles(&mut self, pass: &DrawPass) -> Result<()> {
        self.check_program(pass.program, ProgramKind::Draw)?;
        self.check_render_target(pass.target)?;

        let u = &pass.uniforms;
        let (wind_min, wind_max) = (Vec2::from(u.wind_min), Vec2::from(u.wind_max));
        let speed_range = Vec2::from(u.speed_range);
        let res = u.particles_res.max(1);

        let field = self.texture(pass.field)?;
        let particles = self.texture(pass.particles)?;
        let ramp = self.texture(pass.color_ramp)?;
        let target_desc = self.texture(pass.target)?.desc;

        let mut points = Vec::with_capacity(pass.count as usize);
        for index in 0..pass.count {
            let (tx, ty) = (index % res, index / res);
            if ty >= particles.desc.height {
                break;
            }
            let pos = kernels::decode_position(particles.fetch(tx, ty));
            let channels = field.sample(pos).truncate().truncate();
            let velocity = kernels::decode_velocity(channels, wind_min, wind_max);
            let speed_t = kernels::normalized_speed(velocity, speed_range);
            let color = ramp.sample(Vec2::new(kernels::ramp_coord(speed_t), 0.5));

            let px = (pos.x * target_desc.width as f32).floor();
            let py = (pos.y * target_desc.height as f32).floor();
            if px < 0.0 || py < 0.0 || px >= target_desc.width as f32 || py >= target_desc.height as f32 {
                continue;
            }
            points.push((px as usize, py as usize, color));
        }

        let width = target_desc.width as usize;
        let target = self
            .textures
            .get_mut(&pass.target)
            .ok_or_else(|| WindError::UnknownResource(format!("texture {:?}", pass.target)))?;
        for (x, y, color) in points {
            let i = (y * width + x) * 4;
            target.data[i..i + 4].copy_from_slice(&vec4_to_bytes(color));
        }

        self.stats.draw_calls += 1;
        Ok(())
    }

    fn draw_quad(&mut self, pass: &QuadPass) -> Result<()> {
        self.check_program(pass.program, ProgramKind::Screen)?;
        if pass.target == RenderTarget::Texture(pass.source) {
            return Err(WindError::InvalidParameter(
                "screen pass samples its own render target".into(),
            ));
        }
        if let RenderTarget::Texture(t) = pass.target {
            self.check_render_target(t)?;
        }

        let source = self.texture(pass.source)?;
        let (width, height) = match pass.target {
            RenderTarget::Texture(t) => {
                let desc = self.texture(t)?.desc;
                (desc.width, desc.height)
            }
            RenderTarget::Surface => self.surface_size,
        };

        let opacity = pass.uniforms.opacity;
        let mut shaded = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let uv = Vec2::new((x as f32 + 0.5) / width as f32, (y as f32 + 0.5) / height as f32);
                let c = source.sample(uv);
                shaded.push(Vec4::new(
                    kernels::fade_channel(c.x, opacity),
                    kernels::fade_channel(c.y, opacity),
                    kernels::fade_channel(c.z, opacity),
                    kernels::fade_channel(c.w, opacity),
                ));
            }
        }

        let dst: &mut Vec<u8> = match pass.target {
            RenderTarget::Texture(t) => {
                &mut self
                    .textures
                    .get_mut(&t)
                    .ok_or_else(|| WindError::UnknownResource(format!("texture {t:?}")))?
                    .data
            }
            RenderTarget::Surface => &mut self.surface,
        };

        if let Some(clear) = pass.clear {
            let bytes = vec4_to_bytes(Vec4::from(clear));
            for px in dst.chunks_exact_mut(4) {
                px.copy_from_slice(&bytes);
            }
        }

        for (px, src) in dst.chunks_exact_mut(4).zip(shaded) {
            let out = match pass.blend {
                BlendMode::Replace => src,
                BlendMode::Alpha => {
                    let d = kernels::byte_to_unorm4([px[0], px[1], px[2], px[3]]);
                    let a = src.w;
                    let rgb = src.truncate() * a + d.truncate() * (1.0 - a);
                    rgb.extend(a + d.w * (1.0 - a))
                }
            };
            px.copy_from_slice(&vec4_to_bytes(out));
        }

        self.stats.draw_calls += 1;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
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

fn vec4_to_bytes(c: Vec4) -> [u8; 4] {
    [
        kernels::unorm_to_byte(c.x),
        kernels::unorm_to_byte(c.y),
        kernels::unorm_to_byte(c.z),
        kernels::unorm_to_byte(c.w),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ScreenUniforms;

    fn screen_program(backend: &mut SoftwareBackend) -> ProgramHandle {
        backend
            .create_program(&ProgramSource::builtin(ProgramKind::Screen))
            .unwrap()
    }

    #[test]
    fn test_allocation_limits() {
        let mut backend = SoftwareBackend::new(4, 4).with_limits(SoftwareLimits {
            max_texture_dimension: 64,
            max_texture_bytes: 64 * 64 * 4,
        });
        let too_wide = TextureDesc::new("wide", 65, 1, FilterMode::Nearest);
        assert!(matches!(
            backend.create_texture(&too_wide, None),
            Err(WindError::Allocation { .. })
        ));

        let full = TextureDesc::new("full", 64, 64, FilterMode::Nearest);
        let handle = backend.create_texture(&full, None).unwrap();
        let extra = TextureDesc::new("extra", 1, 1, FilterMode::Nearest);
        assert!(backend.create_texture(&extra, None).is_err());

        backend.destroy_texture(handle);
        assert!(backend.create_texture(&extra, None).is_ok());
    }

    #[test]
    fn test_double_destroy_is_counted_not_fatal() {
        let mut backend = SoftwareBackend::new(4, 4);
        let desc = TextureDesc::new("t", 2, 2, FilterMode::Linear);
        let handle = backend.create_texture(&desc, None).unwrap();
        backend.destroy_texture(handle);
        assert_eq!(backend.stale_releases(), 0);
        backend.destroy_texture(handle);
        assert_eq!(backend.stale_releases(), 1);
        assert_eq!(backend.stats().live_textures, 0);
    }

    #[test]
    fn test_program_missing_entry_point_fails() {
        let mut backend = SoftwareBackend::new(4, 4);
        let src = ProgramSource::custom(ProgramKind::Draw, "fn something_else() {}");
        let err = backend.create_program(&src).unwrap_err();
        assert!(matches!(err, WindError::ShaderCompile { .. }));
        assert_eq!(backend.stats().live_programs, 0);
    }

    #[test]
    fn test_program_with_invalid_wgsl_fails() {
        let mut backend = SoftwareBackend::new(4, 4);
        let src = ProgramSource::custom(ProgramKind::Screen, "fn vs_main( fn fs_main( this is not wgsl }}}");
        match backend.create_program(&src).unwrap_err() {
            WindError::ShaderCompile { label, log } => {
                assert_eq!(label, "screen");
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.stats().live_programs, 0);
    }

    #[test]
    fn test_program_with_type_error_fails() {
        let mut backend = SoftwareBackend::new(4, 4);
        let src = ProgramSource::custom(
            ProgramKind::Draw,
            "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return 1.0; }\n\
             @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
        );
        assert!(matches!(
            backend.create_program(&src),
            Err(WindError::ShaderCompile { .. })
        ));
    }

    #[test]
    fn test_quad_fades_into_texture() {
        let mut backend = SoftwareBackend::new(2, 2);
        let program = screen_program(&mut backend);
        let desc = TextureDesc::new("fade", 2, 2, FilterMode::Nearest).render_target();
        let source = backend.create_texture(&desc, Some(&[200; 16])).unwrap();
        let target = backend.create_texture(&desc, None).unwrap();

        backend
            .draw_quad(&QuadPass {
                program,
                source,
                target: RenderTarget::Texture(target),
                blend: BlendMode::Replace,
                clear: None,
                uniforms: ScreenUniforms::new(0.5),
            })
            .unwrap();

        assert!(backend.texture_data(target).unwrap().iter().all(|&b| b == 100));
        assert_eq!(backend.stats().draw_calls, 1);
    }

    #[test]
    fn test_alpha_composite_keeps_background() {
        let mut backend = SoftwareBackend::new(1, 1);
        let program = screen_program(&mut backend);
        let desc = TextureDesc::new("screen", 1, 1, FilterMode::Nearest).render_target();
        let transparent = backend.create_texture(&desc, None).unwrap();

        backend
            .draw_quad(&QuadPass {
                program,
                source: transparent,
                target: RenderTarget::Surface,
                blend: BlendMode::Alpha,
                clear: Some([0.0, 0.0, 1.0, 1.0]),
                uniforms: ScreenUniforms::new(1.0),
            })
            .unwrap();

        assert_eq!(backend.surface_pixels(), &[0, 0, 255, 255]);
    }

    #[test]
    fn test_quad_rejects_feedback_loop() {
        let mut backend = SoftwareBackend::new(1, 1);
        let program = screen_program(&mut backend);
        let desc = TextureDesc::new("loop", 1, 1, FilterMode::Nearest).render_target();
        let tex = backend.create_texture(&desc, None).unwrap();
        let pass = QuadPass {
            program,
            source: tex,
            target: RenderTarget::Texture(tex),
            blend: BlendMode::Replace,
            clear: None,
            uniforms: ScreenUniforms::new(1.0),
        };
        assert!(backend.draw_quad(&pass).is_err());
    }
}
