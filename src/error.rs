//! Error types for windgl.
//!
//! Every fallible operation in the crate returns [`WindError`]. Shader and
//! allocation failures are fatal to the call that produced them but leave
//! previously valid engine state untouched.

use thiserror::Error;

/// Errors that can occur while building or running a wind simulation.
#[derive(Debug, Error)]
pub enum WindError {
    /// A GPU program failed to compile or link.
    #[error("failed to compile shader program '{label}':\n{log}")]
    ShaderCompile {
        /// Program label (`update`, `draw` or `screen`).
        label: String,
        /// Compiler or validation log.
        log: String,
    },

    /// A color ramp stop list was rejected.
    #[error("invalid color ramp: {0}")]
    InvalidRamp(String),

    /// A texture or buffer could not be allocated.
    #[error("failed to allocate '{label}' ({width}x{height}): {reason}")]
    Allocation {
        /// Resource label.
        label: String,
        /// Requested width in texels.
        width: u32,
        /// Requested height in texels.
        height: u32,
        /// Backend-specific reason.
        reason: String,
    },

    /// A wind field descriptor did not satisfy its invariants.
    #[error("invalid wind field: {0}")]
    InvalidField(String),

    /// A simulation parameter was out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An operation referenced a texture or program the backend does not own.
    #[error("unknown GPU resource: {0}")]
    UnknownResource(String),

    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    /// Failed to create the GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),

    /// The surface cannot be configured for rendering.
    #[error("unsupported surface: {0}")]
    UnsupportedSurface(String),

    /// Failed to create a surface for rendering.
    #[error("failed to create GPU surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),

    /// The surface could not provide a frame.
    #[error("failed to acquire surface texture: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// Failed to decode a field image.
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),

    /// Failed to read a file from disk.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON configuration or metadata.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WindError>;

impl WindError {
    pub(crate) fn allocation(label: &str, width: u32, height: u32, reason: impl Into<String>) -> Self {
        WindError::Allocation {
            label: label.to_string(),
            width,
            height,
            reason: reason.into(),
        }
    }

    pub(crate) fn shader(label: &str, log: impl Into<String>) -> Self {
        WindError::ShaderCompile {
            label: label.to_string(),
            log: log.into(),
        }
    }

    /// Whether the error leaves the engine usable with its previous state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WindError::InvalidRamp(_)
                | WindError::Allocation { .. }
                | WindError::InvalidField(_)
                | WindError::InvalidParameter(_)
                | WindError::Surface(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_error_carries_log() {
        let err = WindError::shader("update", "error: expected ';'");
        let msg = err.to_string();
        assert!(msg.contains("update"));
        assert!(msg.contains("expected ';'"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_allocation_error_is_recoverable() {
        let err = WindError::allocation("particle state", 70000, 70000, "exceeds limit");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("70000x70000"));
    }
}
