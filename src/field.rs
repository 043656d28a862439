//! Wind field descriptors.
//!
//! A [`WindFieldDescriptor`] is the only external input of the engine: an
//! RGBA8 image whose red and green channels hold the `u` and `v` velocity
//! components, quantized over per-axis bounds.
//!
//! # Example
//!
//! ```ignore
//! use windgl::field::{VelocityBounds, WindFieldDescriptor};
//!
//! // A uniform eastward wind
//! let bounds = VelocityBounds::new(-10.0, 10.0, -10.0, 10.0);
//! let field = WindFieldDescriptor::from_fn(64, 32, bounds, |_, _| (8.0, 0.0))?;
//! assert_eq!(field.image().len(), 64 * 32 * 4);
//! ```

use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WindError};
use crate::kernels;

/// Per-axis velocity bounds used to quantize the field image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityBounds {
    pub u_min: f32,
    pub u_max: f32,
    pub v_min: f32,
    pub v_max: f32,
}

impl VelocityBounds {
    pub fn new(u_min: f32, u_max: f32, v_min: f32, v_max: f32) -> Self {
        Self {
            u_min,
            u_max,
            v_min,
            v_max,
        }
    }

    /// Lower corner `(u_min, v_min)`.
    pub fn min(&self) -> Vec2 {
        Vec2::new(self.u_min, self.v_min)
    }

    /// Upper corner `(u_max, v_max)`.
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.u_max, self.v_max)
    }

    /// `(min_speed, max_speed)` reachable inside the bounds.
    pub fn speed_range(&self) -> Vec2 {
        kernels::speed_range(self.min(), self.max())
    }

    fn validate(&self) -> Result<()> {
        let all = [self.u_min, self.u_max, self.v_min, self.v_max];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(WindError::InvalidField(format!("non-finite velocity bounds {self:?}")));
        }
        if self.u_min > self.u_max || self.v_min > self.v_max {
            return Err(WindError::InvalidField(format!("inverted velocity bounds {self:?}")));
        }
        Ok(())
    }
}

/// An immutable, validated wind field.
///
/// The image buffer is shared behind an [`Arc`] so descriptors are cheap to
/// clone between the loader and the simulation.
#[derive(Debug, Clone)]
pub struct WindFieldDescriptor {
    width: u32,
    height: u32,
    bounds: VelocityBounds,
    image: Arc<[u8]>,
}

impl WindFieldDescriptor {
    /// Create a descriptor from raw RGBA8 data.
    ///
    /// Fails with [`WindError::InvalidField`] if the dimensions are zero, the
    /// buffer length is not `width * height * 4`, or the bounds are not finite
    /// and ordered. Equal bounds on an axis are accepted; that axis decodes
    /// to zero velocity.
    pub fn new(width: u32, height: u32, bounds: VelocityBounds, image: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(WindError::InvalidField(format!("zero-sized field {width}x{height}")));
        }
        let expected = width as usize * height as usize * 4;
        if image.len() != expected {
            return Err(WindError::InvalidField(format!(
                "image is {} bytes, expected {expected} for {width}x{height} RGBA8",
                image.len()
            )));
        }
        bounds.validate()?;
        Ok(Self {
            width,
            height,
            bounds,
            image: image.into(),
        })
    }

    /// Build a field by quantizing a velocity function.
    ///
    /// `f` is called with the texel centre in UV space and returns `(u, v)`.
    /// Values outside the bounds are clamped by the quantization.
    pub fn from_fn<F>(width: u32, height: u32, bounds: VelocityBounds, f: F) -> Result<Self>
    where
        F: Fn(f32, f32) -> (f32, f32),
    {
        let mut image = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let uv_x = (x as f32 + 0.5) / width as f32;
                let uv_y = (y as f32 + 0.5) / height as f32;
                let (u, v) = f(uv_x, uv_y);
                image.push(kernels::quantize_component(u, bounds.u_min, bounds.u_max));
                image.push(kernels::quantize_component(v, bounds.v_min, bounds.v_max));
                image.push(0);
                image.push(255);
            }
        }
        Self::new(width, height, bounds, image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> VelocityBounds {
        self.bounds
    }

    /// Raw RGBA8 texels, row-major, top row first.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Bilinearly interpolated velocity at a UV position.
    ///
    /// Mirrors what the update and draw programs read from the field texture.
    pub fn velocity_at(&self, uv: Vec2) -> Vec2 {
        let channels = kernels::sample_bilinear(&self.image, self.width, self.height, uv);
        kernels::decode_velocity(channels.truncate().truncate(), self.bounds.min(), self.bounds.max())
    }

    /// Velocity stored at an exact texel, without interpolation.
    pub fn velocity_at_texel(&self, x: u32, y: u32) -> Vec2 {
        let texel = kernels::texel_fetch(&self.image, self.width, self.height, x as i64, y as i64);
        let channels = Vec2::new(texel[0] as f32, texel[1] as f32) / 255.0;
        kernels::decode_velocity(channels, self.bounds.min(), self.bounds.max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> VelocityBounds {
        VelocityBounds::new(-21.32, 26.8, -21.57, 21.42)
    }

    #[test]
    fn test_rejects_wrong_buffer_length() {
        let err = WindFieldDescriptor::new(4, 4, bounds(), vec![0; 63]).unwrap_err();
        assert!(matches!(err, WindError::InvalidField(_)));
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        assert!(WindFieldDescriptor::new(0, 4, bounds(), vec![]).is_err());
    }

    #[test]
    fn test_rejects_inverted_or_nan_bounds() {
        let inverted = VelocityBounds::new(5.0, -5.0, 0.0, 1.0);
        assert!(WindFieldDescriptor::new(1, 1, inverted, vec![0; 4]).is_err());
        let nan = VelocityBounds::new(f32::NAN, 1.0, 0.0, 1.0);
        assert!(WindFieldDescriptor::new(1, 1, nan, vec![0; 4]).is_err());
    }

    #[test]
    fn test_accepts_degenerate_axis() {
        let flat = VelocityBounds::new(3.0, 3.0, -1.0, 1.0);
        let field = WindFieldDescriptor::from_fn(2, 2, flat, |_, _| (3.0, 1.0)).unwrap();
        let v = field.velocity_at(Vec2::splat(0.5));
        assert_eq!(v.x, 0.0);
        assert!((v.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_from_fn_round_trip_within_quantization() {
        let b = bounds();
        let field = WindFieldDescriptor::from_fn(36, 18, b, |x, y| (x * 20.0 - 5.0, y * 30.0 - 15.0)).unwrap();
        let step_u = (b.u_max - b.u_min) / 255.0;
        let step_v = (b.v_max - b.v_min) / 255.0;
        for (x, y) in [(0, 0), (10, 5), (35, 17)] {
            let uv_x = (x as f32 + 0.5) / 36.0;
            let uv_y = (y as f32 + 0.5) / 18.0;
            let v = field.velocity_at_texel(x, y);
            assert!((v.x - (uv_x * 20.0 - 5.0)).abs() <= step_u);
            assert!((v.y - (uv_y * 30.0 - 15.0)).abs() <= step_v);
        }
    }

    #[test]
    fn test_velocity_at_texel_centre_matches_texel() {
        let field = WindFieldDescriptor::from_fn(8, 8, bounds(), |x, _| (x * 10.0, 0.0)).unwrap();
        let centre = Vec2::new(2.5 / 8.0, 4.5 / 8.0);
        let sampled = field.velocity_at(centre);
        let exact = field.velocity_at_texel(2, 4);
        assert!((sampled - exact).length() < 1e-4);
    }
}
