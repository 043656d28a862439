//! The per-frame simulation loop.
//!
//! [`WindSimulation`] owns every GPU resource of one engine instance and runs
//! one advection step per [`WindSimulation::step`]:
//!
//! 1. fade last frame's trails (`background`) into `screen`
//! 2. draw the particles into `screen`
//! 3. composite `screen` over the visible surface
//! 4. swap the fade buffers
//! 5. advect the particle state into the next buffer
//! 6. swap the particle state
//!
//! Nothing runs until a field has been supplied with
//! [`WindSimulation::set_field`]. The host owns the backend and passes it to
//! every call, so several simulations can share one device.

use glam::Vec2;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{
    BlendMode, DrawPass, FilterMode, QuadPass, RenderBackend, RenderTarget, TextureDesc, TextureHandle, UpdatePass,
};
use crate::error::Result;
use crate::field::WindFieldDescriptor;
use crate::kernels::RAMP_SIZE;
use crate::params::{EngineConfig, SimulationParameters};
use crate::particles::ParticleStateStore;
use crate::pipeline::RenderPipelineSet;
use crate::ramp::{ColorRamp, ColorStop};
use crate::shader::{DrawUniforms, ScreenUniforms, UpdateUniforms};
use crate::viewport::ViewportManager;

/// Result of a [`WindSimulation::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No field yet, or the simulation was disposed. Nothing was submitted.
    Skipped,
    /// A full frame was rendered and the particles advanced one step.
    Rendered,
}

struct FieldTexture {
    descriptor: WindFieldDescriptor,
    texture: TextureHandle,
}

/// A running wind particle simulation.
pub struct WindSimulation {
    config: EngineConfig,
    rng: StdRng,
    pipelines: Option<RenderPipelineSet>,
    particles: ParticleStateStore,
    viewport: ViewportManager,
    ramp: ColorRamp,
    ramp_texture: Option<TextureHandle>,
    field: Option<FieldTexture>,
    draw_count: u32,
    frame: u64,
    disposed: bool,
}

impl WindSimulation {
    /// Build a simulation on `backend`.
    ///
    /// Compiles the programs, rasterizes the color ramp, allocates the particle
    /// state and sizes the fade buffers to the backend's surface. Anything
    /// already allocated is released if a later step fails.
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let ramp = ColorRamp::new(config.color_ramp.clone())?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut sim = Self {
            viewport: ViewportManager::new(config.pixel_ratio),
            config,
            rng,
            pipelines: None,
            particles: ParticleStateStore::new(),
            ramp,
            ramp_texture: None,
            field: None,
            draw_count: 0,
            frame: 0,
            disposed: false,
        };

        if let Err(e) = sim.allocate(backend) {
            sim.dispose(backend);
            return Err(e);
        }

        info!(
            "wind simulation ready: {} particles ({}x{} state), viewport {:?}",
            sim.draw_count,
            sim.particles.resolution(),
            sim.particles.resolution(),
            sim.viewport.size()
        );
        Ok(sim)
    }

    fn allocate<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        self.pipelines = Some(RenderPipelineSet::new(backend)?);

        let desc = TextureDesc::new("color ramp", RAMP_SIZE, RAMP_SIZE, FilterMode::Linear);
        self.ramp_texture = Some(backend.create_texture(&desc, Some(&self.ramp.build()))?);

        self.configure(backend, self.config.particle_count)?;

        let (width, height) = backend.surface_size();
        let ratio = self.config.pixel_ratio;
        self.viewport
            .resize(backend, width as f32 / ratio, height as f32 / ratio, ratio)?;
        Ok(())
    }

    /// Supply the field to advect through, replacing any previous one.
    pub fn set_field<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, field: WindFieldDescriptor) -> Result<()> {
        if self.disposed {
            warn!("set_field on a disposed simulation ignored");
            return Ok(());
        }

        let desc = TextureDesc::new("wind field", field.width(), field.height(), FilterMode::Linear);
        let texture = backend.create_texture(&desc, Some(field.image()))?;
        if let Some(old) = self.field.take() {
            backend.destroy_texture(old.texture);
        }

        let bounds = field.bounds();
        info!(
            "wind field set: {}x{}, u [{}, {}], v [{}, {}]",
            field.width(),
            field.height(),
            bounds.u_min,
            bounds.u_max,
            bounds.v_min,
            bounds.v_max
        );
        self.field = Some(FieldTexture {
            descriptor: field,
            texture,
        });
        Ok(())
    }

    /// Replace the simulation parameters. Takes effect on the next step.
    pub fn set_params(&mut self, params: SimulationParameters) -> Result<()> {
        params.validate()?;
        debug!("parameters updated: {:?}", params);
        self.config.params = params;
        Ok(())
    }

    /// Reallocate particle state for `particle_count` particles.
    ///
    /// On failure the previous state and draw count stay in use.
    pub fn configure<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, particle_count: u32) -> Result<()> {
        if self.disposed {
            warn!("configure on a disposed simulation ignored");
            return Ok(());
        }
        self.particles.configure(backend, particle_count, &mut self.rng)?;
        self.draw_count = particle_count;
        self.config.particle_count = particle_count;
        Ok(())
    }

    /// Replace the speed color ramp.
    pub fn set_color_ramp<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, stops: Vec<ColorStop>) -> Result<()> {
        let ramp = ColorRamp::new(stops)?;
        if let Some(texture) = self.ramp_texture {
            backend.write_texture(texture, &ramp.build())?;
        }
        self.config.color_ramp = ramp.stops().to_vec();
        self.ramp = ramp;
        Ok(())
    }

    /// React to a change of the host surface. Returns whether the fade
    /// buffers were reallocated.
    pub fn on_viewport_changed<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: f32,
        height: f32,
        pixel_ratio: f32,
    ) -> Result<bool> {
        if self.disposed {
            return Ok(false);
        }
        let resized = self.viewport.resize(backend, width, height, pixel_ratio)?;
        self.config.pixel_ratio = self.viewport.pixel_ratio();
        Ok(resized)
    }

    /// Change pixel density at the current logical size.
    pub fn set_pixel_density<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, ratio: f32) -> Result<bool> {
        if self.disposed {
            return Ok(false);
        }
        let resized = self.viewport.set_pixel_density(backend, ratio)?;
        self.config.pixel_ratio = self.viewport.pixel_ratio();
        Ok(resized)
    }

    /// Render one frame and advance every particle by one step.
    pub fn step<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> Result<StepOutcome> {
        if self.disposed {
            return Ok(StepOutcome::Skipped);
        }
        let Some(field) = self.field.as_ref() else {
            return Ok(StepOutcome::Skipped);
        };
        let (Some(pipelines), Some(buffers), Some(ramp), Some(current), Some(next)) = (
            self.pipelines,
            self.viewport.buffers(),
            self.ramp_texture,
            self.particles.current(),
            self.particles.next(),
        ) else {
            return Ok(StepOutcome::Skipped);
        };

        let params = self.config.params;
        let bounds = field.descriptor.bounds();
        let (wind_min, wind_max) = (bounds.min(), bounds.max());
        let speed_range: Vec2 = bounds.speed_range();

        backend.begin_frame()?;

        backend.draw_quad(&QuadPass {
            program: pipelines.screen,
            source: buffers.background,
            target: RenderTarget::Texture(buffers.screen),
            blend: BlendMode::Replace,
            clear: Some([0.0; 4]),
            uniforms: ScreenUniforms::new(params.fade_opacity),
        })?;

        backend.draw_particles(&DrawPass {
            program: pipelines.draw,
            field: field.texture,
            particles: current,
            color_ramp: ramp,
            target: buffers.screen,
            count: self.draw_count,
            uniforms: DrawUniforms {
                wind_min: wind_min.to_array(),
                wind_max: wind_max.to_array(),
                speed_range: speed_range.to_array(),
                particles_res: self.particles.resolution(),
                _pad: 0,
            },
        })?;

        backend.draw_quad(&QuadPass {
            program: pipelines.screen,
            source: buffers.screen,
            target: RenderTarget::Surface,
            blend: BlendMode::Alpha,
            clear: Some(self.config.clear_color),
            uniforms: ScreenUniforms::new(1.0),
        })?;

        self.viewport.swap();

        backend.update_particles(&UpdatePass {
            program: pipelines.update,
            field: field.texture,
            particles: current,
            target: next,
            uniforms: UpdateUniforms {
                wind_min: wind_min.to_array(),
                wind_max: wind_max.to_array(),
                speed_range: speed_range.to_array(),
                rand_seed: self.rng.gen(),
                speed_factor: params.speed_factor,
                drop_rate: params.drop_rate,
                drop_rate_bump: params.drop_rate_bump,
                _pad: [0.0; 2],
            },
        })?;

        self.particles.swap();
        backend.end_frame()?;
        self.frame += 1;
        Ok(StepOutcome::Rendered)
    }

    /// Release every GPU resource. Safe to call more than once and before a
    /// field was ever set; later calls do nothing.
    pub fn dispose<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(field) = self.field.take() {
            backend.destroy_texture(field.texture);
        }
        if let Some(ramp) = self.ramp_texture.take() {
            backend.destroy_texture(ramp);
        }
        self.particles.release(backend);
        self.viewport.release(backend);
        if let Some(pipelines) = self.pipelines.take() {
            pipelines.release(backend);
        }
        self.draw_count = 0;
        info!("wind simulation disposed after {} frames", self.frame);
    }

    /// Parameters used by the next step.
    pub fn params(&self) -> &SimulationParameters {
        &self.config.params
    }

    /// Current configuration, reflecting every runtime change.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Field being advected through, if one was set.
    pub fn field(&self) -> Option<&WindFieldDescriptor> {
        self.field.as_ref().map(|f| &f.descriptor)
    }

    /// Active speed color ramp.
    pub fn color_ramp(&self) -> &ColorRamp {
        &self.ramp
    }

    /// Fade buffers and surface sizing.
    pub fn viewport(&self) -> &ViewportManager {
        &self.viewport
    }

    /// Particles drawn per frame; the requested count.
    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    /// Particles simulated per frame, including padding.
    pub fn allocated_particles(&self) -> u32 {
        self.particles.allocated_count()
    }

    /// Side of the square particle state textures.
    pub fn state_resolution(&self) -> u32 {
        self.particles.resolution()
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
