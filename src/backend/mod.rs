//! Rendering backends.
//!
//! The engine never touches a global GPU context. Every component receives a
//! `&mut B where B: RenderBackend` and talks to the device only through this
//! trait, which makes a window-bound `wgpu` device, an offscreen `wgpu`
//! device and the CPU [`SoftwareBackend`] interchangeable.
//!
//! Each pass method submits its work before returning, so the passes of a
//! frame execute in exactly the order the simulation issues them.

mod software;
mod wgpu_backend;

pub use software::{SoftwareBackend, SoftwareLimits};
pub use wgpu_backend::WgpuBackend;

use crate::error::Result;
use crate::shader::{DrawUniforms, ProgramKind, ProgramSource, ScreenUniforms, UpdateUniforms};

/// Opaque texture id owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Opaque program id owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub(crate) u64);

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Smooth linear filtering. Required for the field and the color ramp.
    #[default]
    Linear,
    /// Exact texel reads. Required for encoded particle state.
    Nearest,
}

/// Description of an RGBA8 texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub filter: FilterMode,
    /// Whether passes may render into it.
    pub render_target: bool,
}

impl TextureDesc {
    pub fn new(label: &'static str, width: u32, height: u32, filter: FilterMode) -> Self {
        Self {
            label,
            width,
            height,
            filter,
            render_target: false,
        }
    }

    pub fn render_target(mut self) -> Self {
        self.render_target = true;
        self
    }

    /// Size of the texel data in bytes.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Destination of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Texture(TextureHandle),
    /// The backend's visible surface (window or offscreen frame).
    Surface,
}

/// How a pass combines its output with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Output overwrites the target.
    Replace,
    /// `src * srcAlpha + dst * (1 - srcAlpha)`.
    Alpha,
}

/// Advect particles from `particles` into `target`.
#[derive(Debug, Clone, Copy)]
pub struct UpdatePass {
    pub program: ProgramHandle,
    pub field: TextureHandle,
    pub particles: TextureHandle,
    pub target: TextureHandle,
    pub uniforms: UpdateUniforms,
}

/// Draw `count` particle points into `target`.
#[derive(Debug, Clone, Copy)]
pub struct DrawPass {
    pub program: ProgramHandle,
    pub field: TextureHandle,
    pub particles: TextureHandle,
    pub color_ramp: TextureHandle,
    pub target: TextureHandle,
    pub count: u32,
    pub uniforms: DrawUniforms,
}

/// Draw `source` as a full-screen quad scaled by the opacity uniform.
#[derive(Debug, Clone, Copy)]
pub struct QuadPass {
    pub program: ProgramHandle,
    pub source: TextureHandle,
    pub target: RenderTarget,
    pub blend: BlendMode,
    /// Clear the target to this color before drawing.
    pub clear: Option<[f32; 4]>,
    pub uniforms: ScreenUniforms,
}

/// Counters every backend maintains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls issued since creation.
    pub draw_calls: u64,
    /// Frames ended since creation.
    pub frames: u64,
    /// Textures currently allocated.
    pub live_textures: usize,
    /// Programs currently compiled.
    pub live_programs: usize,
}

/// Explicit rendering context passed to every engine component.
pub trait RenderBackend {
    /// Check that a texture matching `desc` fits the backend's limits,
    /// without allocating anything.
    fn check_texture(&self, desc: &TextureDesc) -> Result<()>;

    /// Allocate a texture, optionally filled with `data` (`desc.byte_len()` bytes).
    /// Without data the texture starts as transparent black.
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureHandle>;

    /// Overwrite the whole texture.
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()>;

    /// Release a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Compile and link a program.
    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle>;

    /// Release a program. Unknown handles are ignored.
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Kind of a live program.
    fn program_kind(&self, program: ProgramHandle) -> Option<ProgramKind>;

    /// Current surface size in physical pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Resize the visible surface.
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()>;

    /// Acquire the surface for a new frame.
    fn begin_frame(&mut self) -> Result<()>;

    fn update_particles(&mut self, pass: &UpdatePass) -> Result<()>;

    fn draw_particles(&mut self, pass: &DrawPass) -> Result<()>;

    fn draw_quad(&mut self, pass: &QuadPass) -> Result<()>;

    /// Present the surface.
    fn end_frame(&mut self) -> Result<()>;

    fn stats(&self) -> FrameStats;
}
