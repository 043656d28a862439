//! # windgl - GPU wind particle advection
//!
//! Visualizes a 2D wind field as tens of thousands of particles that are
//! advected and drawn entirely on the GPU, leaving fading trails behind them.
//!
//! Particle positions never leave GPU memory. They are stored one per texel
//! in a pair of RGBA8 textures (16 bits per axis, split over two channels),
//! advanced by a full-screen update pass and swapped every frame.
//!
//! ## Quick Start
//!
//! ```ignore
//! use windgl::prelude::*;
//!
//! let mut backend = pollster::block_on(WgpuBackend::headless(1024, 512))?;
//! let mut sim = WindSimulation::new(&mut backend, EngineConfig::default())?;
//!
//! let field = ImageFieldLoader::from_image_path("wind/2016112000.png").load()?;
//! sim.set_field(&mut backend, field)?;
//!
//! loop {
//!     sim.step(&mut backend)?;
//! }
//! ```
//!
//! ## Frame
//!
//! Each [`WindSimulation::step`] runs four passes in order:
//!
//! | Pass | Program | Reads | Writes |
//! |------|---------|-------|--------|
//! | fade | screen | background trails | screen trails |
//! | draw | draw | field, current state, ramp | screen trails |
//! | composite | screen | screen trails | visible surface |
//! | update | update | field, current state | next state |
//!
//! then swaps the trail buffers and the particle state.
//!
//! ## Backends
//!
//! Every component takes the rendering context explicitly as a
//! `&mut impl` [`RenderBackend`]. [`WgpuBackend`] renders to a window or an
//! offscreen target; [`SoftwareBackend`] runs the same math on the CPU for
//! deterministic tests.

pub mod backend;
pub mod error;
pub mod field;
pub mod kernels;
pub mod loader;
pub mod params;
pub mod particles;
pub mod pipeline;
pub mod ramp;
pub mod shader;
pub mod simulation;
pub mod viewport;

pub use backend::{FrameStats, RenderBackend, SoftwareBackend, WgpuBackend};
pub use error::{Result, WindError};
pub use field::{VelocityBounds, WindFieldDescriptor};
pub use glam::{UVec2, Vec2, Vec4};
pub use loader::{FieldMetadata, FieldSource, ImageFieldLoader};
pub use params::{EngineConfig, SimulationParameters};
pub use particles::ParticleStateStore;
pub use pipeline::RenderPipelineSet;
pub use ramp::{ColorRamp, ColorStop};
pub use simulation::{StepOutcome, WindSimulation};
pub use viewport::{FadeBuffers, ViewportManager};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use windgl::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{RenderBackend, SoftwareBackend, WgpuBackend};
    pub use crate::error::WindError;
    pub use crate::field::{VelocityBounds, WindFieldDescriptor};
    pub use crate::loader::{FieldSource, ImageFieldLoader};
    pub use crate::params::{EngineConfig, SimulationParameters};
    pub use crate::ramp::{ColorRamp, ColorStop};
    pub use crate::simulation::{StepOutcome, WindSimulation};
    pub use crate::{Vec2, Vec4};
}
