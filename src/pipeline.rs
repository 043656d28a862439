//! The three GPU programs the engine runs every frame.

use log::{error, info};

use crate::backend::{ProgramHandle, RenderBackend};
use crate::error::Result;
use crate::shader::{ProgramKind, ProgramSource};

/// Compiled update, draw and screen programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPipelineSet {
    pub update: ProgramHandle,
    pub draw: ProgramHandle,
    pub screen: ProgramHandle,
}

impl RenderPipelineSet {
    /// Compile the built-in programs.
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B) -> Result<Self> {
        Self::with_sources(
            backend,
            &ProgramSource::builtin(ProgramKind::Update),
            &ProgramSource::builtin(ProgramKind::Draw),
            &ProgramSource::builtin(ProgramKind::Screen),
        )
    }

    /// Compile custom programs. If any fails, the ones already compiled are
    /// released and the compile error is returned.
    pub fn with_sources<B: RenderBackend + ?Sized>(
        backend: &mut B,
        update: &ProgramSource,
        draw: &ProgramSource,
        screen: &ProgramSource,
    ) -> Result<Self> {
        let mut compiled: Vec<ProgramHandle> = Vec::with_capacity(3);
        for source in [update, draw, screen] {
            match backend.create_program(source) {
                Ok(handle) => compiled.push(handle),
                Err(e) => {
                    error!("{} program failed: {}", source.kind.label(), e);
                    for handle in compiled {
                        backend.destroy_program(handle);
                    }
                    return Err(e);
                }
            }
        }
        info!("compiled update, draw and screen programs");
        Ok(Self {
            update: compiled[0],
            draw: compiled[1],
            screen: compiled[2],
        })
    }

    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_program(self.update);
        backend.destroy_program(self.draw);
        backend.destroy_program(self.screen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::error::WindError;

    #[test]
    fn test_builds_three_distinct_programs() {
        let mut backend = SoftwareBackend::new(4, 4);
        let set = RenderPipelineSet::new(&mut backend).unwrap();
        assert_eq!(backend.program_kind(set.update), Some(ProgramKind::Update));
        assert_eq!(backend.program_kind(set.draw), Some(ProgramKind::Draw));
        assert_eq!(backend.program_kind(set.screen), Some(ProgramKind::Screen));
        assert_eq!(backend.stats().live_programs, 3);
    }

    #[test]
    fn test_compile_failure_releases_partial_set() {
        let mut backend = SoftwareBackend::new(4, 4);
        let broken = ProgramSource::custom(ProgramKind::Screen, "// no entry points");
        let err = RenderPipelineSet::with_sources(
            &mut backend,
            &ProgramSource::builtin(ProgramKind::Update),
            &ProgramSource::builtin(ProgramKind::Draw),
            &broken,
        )
        .unwrap_err();

        match err {
            WindError::ShaderCompile { label, .. } => assert_eq!(label, "screen"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.stats().live_programs, 0);
        assert_eq!(backend.stale_releases(), 0);
    }

    #[test]
    fn test_release() {
        let mut backend = SoftwareBackend::new(4, 4);
        let set = RenderPipelineSet::new(&mut backend).unwrap();
        set.release(&mut backend);
        assert_eq!(backend.stats().live_programs, 0);
    }
}
