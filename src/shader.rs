//! WGSL programs and their uniform layouts.
//!
//! Three programs drive the engine:
//!
//! - **update**: full-screen pass over the particle state texture; reads the
//!   field (linear) and current state (exact fetch), writes the next state.
//! - **draw**: one point per particle index, colored by speed via the ramp.
//! - **screen**: full-screen textured quad with an opacity multiplier, used
//!   for trail fading and for compositing onto the visible surface.
//!
//! Each program is `common.wgsl` followed by its own module. The uniform
//! structs below match the WGSL layouts byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::kernels::AdvectParams;

pub const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
pub const UPDATE_WGSL: &str = include_str!("shaders/update.wgsl");
pub const DRAW_WGSL: &str = include_str!("shaders/draw.wgsl");
pub const SCREEN_WGSL: &str = include_str!("shaders/screen.wgsl");

/// Which of the three programs a source or handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Update,
    Draw,
    Screen,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 3] = [ProgramKind::Update, ProgramKind::Draw, ProgramKind::Screen];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Update => "update",
            ProgramKind::Draw => "draw",
            ProgramKind::Screen => "screen",
        }
    }
}

/// Source text and entry points of one program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub kind: ProgramKind,
    pub wgsl: String,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

impl ProgramSource {
    /// The built-in source for a program.
    pub fn builtin(kind: ProgramKind) -> Self {
        let body = match kind {
            ProgramKind::Update => UPDATE_WGSL,
            ProgramKind::Draw => DRAW_WGSL,
            ProgramKind::Screen => SCREEN_WGSL,
        };
        Self {
            kind,
            wgsl: format!("{COMMON_WGSL}\n{body}"),
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
        }
    }

    /// Replace the WGSL body, keeping the shared helpers in front.
    pub fn custom(kind: ProgramKind, body: &str) -> Self {
        Self {
            wgsl: format!("{COMMON_WGSL}\n{body}"),
            ..Self::builtin(kind)
        }
    }
}

/// Uniforms of the update program.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct UpdateUniforms {
    pub wind_min: [f32; 2],
    pub wind_max: [f32; 2],
    pub speed_range: [f32; 2],
    pub rand_seed: u32,
    pub speed_factor: f32,
    pub drop_rate: f32,
    pub drop_rate_bump: f32,
    pub _pad: [f32; 2],
}

impl UpdateUniforms {
    /// The same values in the form the CPU kernels take.
    pub fn advect_params(&self) -> AdvectParams {
        AdvectParams {
            wind_min: Vec2::from(self.wind_min),
            wind_max: Vec2::from(self.wind_max),
            speed_range: Vec2::from(self.speed_range),
            speed_factor: self.speed_factor,
            drop_rate: self.drop_rate,
            drop_rate_bump: self.drop_rate_bump,
            seed: self.rand_seed,
        }
    }
}

/// Uniforms of the draw program.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub wind_min: [f32; 2],
    pub wind_max: [f32; 2],
    pub speed_range: [f32; 2],
    pub particles_res: u32,
    pub _pad: u32,
}

/// Uniforms of the screen program.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ScreenUniforms {
    pub opacity: f32,
    pub _pad: [f32; 3],
}

impl ScreenUniforms {
    pub fn new(opacity: f32) -> Self {
        Self {
            opacity,
            _pad: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<naga::Module, String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(module)
    }

    fn struct_size(module: &naga::Module, name: &str) -> u32 {
        module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some(name))
            .map(|(_, ty)| ty.inner.size(module.to_ctx()))
            .unwrap_or_else(|| panic!("struct {name} not found"))
    }

    #[test]
    fn test_update_program_validates() {
        let src = ProgramSource::builtin(ProgramKind::Update);
        validate_wgsl(&src.wgsl).expect("update WGSL should be valid");
    }

    #[test]
    fn test_draw_program_validates() {
        let src = ProgramSource::builtin(ProgramKind::Draw);
        validate_wgsl(&src.wgsl).expect("draw WGSL should be valid");
    }

    #[test]
    fn test_screen_program_validates() {
        let src = ProgramSource::builtin(ProgramKind::Screen);
        validate_wgsl(&src.wgsl).expect("screen WGSL should be valid");
    }

    #[test]
    fn test_uniform_layouts_match_wgsl() {
        let update = validate_wgsl(&ProgramSource::builtin(ProgramKind::Update).wgsl).unwrap();
        assert_eq!(
            struct_size(&update, "UpdateUniforms") as usize,
            std::mem::size_of::<UpdateUniforms>()
        );
        let draw = validate_wgsl(&ProgramSource::builtin(ProgramKind::Draw).wgsl).unwrap();
        assert_eq!(
            struct_size(&draw, "DrawUniforms") as usize,
            std::mem::size_of::<DrawUniforms>()
        );
        let screen = validate_wgsl(&ProgramSource::builtin(ProgramKind::Screen).wgsl).unwrap();
        assert_eq!(
            struct_size(&screen, "ScreenUniforms") as usize,
            std::mem::size_of::<ScreenUniforms>()
        );
    }

    #[test]
    fn test_entry_points_present() {
        for kind in ProgramKind::ALL {
            let src = ProgramSource::builtin(kind);
            assert!(src.wgsl.contains("fn vs_main"), "{kind:?}");
            assert!(src.wgsl.contains("fn fs_main"), "{kind:?}");
        }
    }

    #[test]
    fn test_broken_source_fails_validation() {
        let src = ProgramSource::custom(ProgramKind::Screen, "fn fs_main( -> {");
        assert!(validate_wgsl(&src.wgsl).is_err());
    }
}
