//! Double-buffered particle state.
//!
//! Positions live in two `R×R` RGBA8 textures, one particle per texel, with
//! `R = ceil(sqrt(n))`. The update pass reads `current()` and writes `next()`;
//! [`ParticleStateStore::swap`] then exchanges the two handles.

use log::{debug, info};
use rand::RngCore;

use crate::backend::{FilterMode, RenderBackend, TextureDesc, TextureHandle};
use crate::error::{Result, WindError};

/// Side length of the square state texture needed for `count` particles.
pub fn state_resolution(count: u32) -> u32 {
    let mut r = (count as f64).sqrt().ceil() as u32;
    // Guard against float rounding right at perfect squares.
    while (r as u64) * (r as u64) < count as u64 {
        r += 1;
    }
    while r > 1 && ((r - 1) as u64) * ((r - 1) as u64) >= count as u64 {
        r -= 1;
    }
    r
}

/// Owner of the particle state texture pair.
#[derive(Debug, Default)]
pub struct ParticleStateStore {
    textures: Option<[TextureHandle; 2]>,
    resolution: u32,
    requested: u32,
}

impl ParticleStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate state for `count` particles at uniformly random positions.
    ///
    /// The new pair is allocated before the old one is released, so on error
    /// the store keeps its previous textures and counts.
    pub fn configure<B, R>(&mut self, backend: &mut B, count: u32, rng: &mut R) -> Result<()>
    where
        B: RenderBackend + ?Sized,
        R: RngCore + ?Sized,
    {
        if count == 0 {
            return Err(WindError::InvalidParameter("particle count must be > 0".into()));
        }

        let resolution = state_resolution(count);
        let desc = TextureDesc::new("particle state", resolution, resolution, FilterMode::Nearest).render_target();
        backend.check_texture(&desc)?;

        let mut seed = vec![0u8; desc.byte_len()];
        rng.fill_bytes(&mut seed);

        let first = backend.create_texture(&desc, Some(&seed))?;
        let second = match backend.create_texture(&desc, Some(&seed)) {
            Ok(handle) => handle,
            Err(e) => {
                backend.destroy_texture(first);
                return Err(e);
            }
        };

        self.release(backend);
        self.textures = Some([first, second]);
        self.resolution = resolution;
        self.requested = count;
        info!(
            "particle state configured: {} requested, {}x{} texels ({} simulated)",
            count,
            resolution,
            resolution,
            self.allocated_count()
        );
        Ok(())
    }

    /// Exchange the current and next textures.
    pub fn swap(&mut self) {
        if let Some(textures) = self.textures.as_mut() {
            textures.swap(0, 1);
        }
    }

    /// State read by this frame's passes.
    pub fn current(&self) -> Option<TextureHandle> {
        self.textures.map(|t| t[0])
    }

    /// State written by this frame's update pass.
    pub fn next(&self) -> Option<TextureHandle> {
        self.textures.map(|t| t[1])
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of simulated particles, `R*R`.
    pub fn allocated_count(&self) -> u32 {
        self.resolution * self.resolution
    }

    /// Number of particles asked for in the last successful `configure`.
    pub fn requested_count(&self) -> u32 {
        self.requested
    }

    pub fn is_allocated(&self) -> bool {
        self.textures.is_some()
    }

    /// Release both textures. Safe to call repeatedly.
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some([a, b]) = self.textures.take() {
            debug!("releasing particle state {:?}, {:?}", a, b);
            backend.destroy_texture(a);
            backend.destroy_texture(b);
        }
        self.resolution = 0;
        self.requested = 0;
    }
}
