//! Viewport-sized trail buffers.

use log::{debug, info};

use crate::backend::{FilterMode, RenderBackend, TextureDesc, TextureHandle};
use crate::error::{Result, WindError};

/// The two ping-ponged trail textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeBuffers {
    /// Last frame's composited trails, faded into `screen` this frame.
    pub background: TextureHandle,
    /// This frame's render target.
    pub screen: TextureHandle,
}

/// Tracks surface size and pixel density and owns the [`FadeBuffers`].
#[derive(Debug)]
pub struct ViewportManager {
    buffers: Option<FadeBuffers>,
    logical_size: (f32, f32),
    physical_size: (u32, u32),
    pixel_ratio: f32,
}

impl ViewportManager {
    pub fn new(pixel_ratio: f32) -> Self {
        Self {
            buffers: None,
            logical_size: (0.0, 0.0),
            physical_size: (0, 0),
            pixel_ratio,
        }
    }

    /// Physical pixel size for a logical size at `pixel_ratio`.
    pub fn physical_size(width: f32, height: f32, pixel_ratio: f32) -> (u32, u32) {
        (
            (width * pixel_ratio).round().max(1.0) as u32,
            (height * pixel_ratio).round().max(1.0) as u32,
        )
    }

    /// Reallocate the fade buffers for a new logical size and density.
    ///
    /// Returns `Ok(false)` without touching the backend when the physical size
    /// is unchanged. New buffers are allocated before the old ones are freed.
    pub fn resize<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: f32,
        height: f32,
        pixel_ratio: f32,
    ) -> Result<bool> {
        if !(width.is_finite() && height.is_finite() && width >= 0.0 && height >= 0.0) {
            return Err(WindError::InvalidParameter(format!(
                "viewport size must be finite and non-negative, got {width}x{height}"
            )));
        }
        if !(pixel_ratio.is_finite() && pixel_ratio > 0.0) {
            return Err(WindError::InvalidParameter(format!(
                "pixel ratio must be > 0, got {pixel_ratio}"
            )));
        }

        let (pw, ph) = Self::physical_size(width, height, pixel_ratio);
        if self.buffers.is_some() && (pw, ph) == self.physical_size {
            debug!("viewport unchanged at {}x{}", pw, ph);
            self.logical_size = (width, height);
            self.pixel_ratio = pixel_ratio;
            return Ok(false);
        }

        let buffers = allocate_buffers(backend, pw, ph)?;
        if let Err(e) = backend.resize_surface(pw, ph) {
            backend.destroy_texture(buffers.background);
            backend.destroy_texture(buffers.screen);
            return Err(e);
        }

        self.release_buffers(backend);
        self.buffers = Some(buffers);
        self.physical_size = (pw, ph);
        self.logical_size = (width, height);
        self.pixel_ratio = pixel_ratio;
        info!(
            "viewport resized to {}x{} ({}x{} @ {})",
            pw, ph, width, height, pixel_ratio
        );
        Ok(true)
    }

    /// Change pixel density and resize at the current logical size.
    pub fn set_pixel_density<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, ratio: f32) -> Result<bool> {
        let (w, h) = self.logical_size;
        self.resize(backend, w, h, ratio)
    }

    /// Exchange background and screen.
    pub fn swap(&mut self) {
        if let Some(b) = self.buffers.as_mut() {
            std::mem::swap(&mut b.background, &mut b.screen);
        }
    }

    pub fn buffers(&self) -> Option<FadeBuffers> {
        self.buffers
    }

    pub fn size(&self) -> (u32, u32) {
        self.physical_size
    }

    pub fn logical_size(&self) -> (f32, f32) {
        self.logical_size
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.release_buffers(backend);
        self.physical_size = (0, 0);
    }

    fn release_buffers<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(b) = self.buffers.take() {
            backend.destroy_texture(b.background);
            backend.destroy_texture(b.screen);
        }
    }
}

fn allocate_buffers<B: RenderBackend + ?Sized>(backend: &mut B, width: u32, height: u32) -> Result<FadeBuffers> {
    let desc = TextureDesc::new("fade buffer", width, height, FilterMode::Nearest).render_target();
    let background = backend.create_texture(&desc, None)?;
    match backend.create_texture(&desc, None) {
        Ok(screen) => Ok(FadeBuffers { background, screen }),
        Err(e) => {
            backend.destroy_texture(background);
            Err(e)
        }
    }
}
