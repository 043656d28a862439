//! Color ramps for speed-based particle coloring.
//!
//! A ramp is an ordered list of [`ColorStop`]s rasterized into a 16×16 RGBA8
//! lookup texture. Every row is identical so linear filtering in `v` never
//! blends in anything but the same gradient.
//!
//! # Example
//!
//! ```ignore
//! use windgl::ramp::{ColorRamp, ColorStop};
//!
//! let ramp = ColorRamp::new(vec![
//!     ColorStop::new(0.0, [0, 0, 255, 255]),
//!     ColorStop::new(1.0, [255, 0, 0, 255]),
//! ])?;
//! let texels = ramp.build();
//! assert_eq!(texels.len(), 16 * 16 * 4);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, WindError};
use crate::kernels::RAMP_SIZE;

/// One gradient stop: a position in `[0, 1]` and an RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub t: f32,
    pub color: [u8; 4],
}

impl ColorStop {
    pub fn new(t: f32, color: [u8; 4]) -> Self {
        Self { t, color }
    }

    /// Parse a `#rrggbb` or `#rrggbbaa` color.
    pub fn hex(t: f32, hex: &str) -> Result<Self> {
        let digits = hex.trim_start_matches('#');
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return Err(WindError::InvalidRamp(format!("malformed color '{hex}'")));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| WindError::InvalidRamp(format!("malformed color '{hex}'")))
        };
        let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::new(t, [channel(0)?, channel(2)?, channel(4)?, alpha]))
    }
}

/// A validated color ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
}

impl ColorRamp {
    /// Validate a stop list.
    ///
    /// Requires at least two stops with strictly increasing positions.
    /// Positions outside `[0, 1]` are then clamped to the nearest bound.
    pub fn new(stops: Vec<ColorStop>) -> Result<Self> {
        if stops.len() < 2 {
            return Err(WindError::InvalidRamp(format!(
                "need at least 2 stops, got {}",
                stops.len()
            )));
        }
        if let Some(bad) = stops.iter().find(|s| !s.t.is_finite()) {
            return Err(WindError::InvalidRamp(format!("non-finite stop position {}", bad.t)));
        }
        for pair in stops.windows(2) {
            if pair[1].t <= pair[0].t {
                return Err(WindError::InvalidRamp(format!(
                    "stops must be strictly increasing ({} then {})",
                    pair[0].t, pair[1].t
                )));
            }
        }

        let stops = stops
            .into_iter()
            .map(|s| ColorStop::new(s.t.clamp(0.0, 1.0), s.color))
            .collect();
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Continuous color at `t`.
    ///
    /// Below the first stop returns the first color, above the last stop the
    /// last color, and linearly interpolates each channel in between.
    pub fn sample(&self, t: f32) -> [u8; 4] {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if t <= first.t {
            return first.color;
        }
        if t >= last.t {
            return last.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.t {
                let span = b.t - a.t;
                // Clamped duplicates collapse to a hard edge.
                let f = if span > 0.0 { (t - a.t) / span } else { 1.0 };
                return lerp_rgba(a.color, b.color, f);
            }
        }
        last.color
    }

    /// Rasterize into a 16×16 RGBA8 lookup texture.
    ///
    /// Column `i` holds `sample(i / 15)`, so the first and last columns carry
    /// the exact end colors; all rows are identical.
    pub fn build(&self) -> Vec<u8> {
        let size = RAMP_SIZE as usize;
        let row: Vec<u8> = (0..size)
            .flat_map(|i| self.sample(i as f32 / (size - 1) as f32))
            .collect();
        row.repeat(size)
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self {
            stops: default_stops(),
        }
    }
}

/// Build a lookup texture directly from a stop list.
pub fn build(stops: &[ColorStop]) -> Result<Vec<u8>> {
    Ok(ColorRamp::new(stops.to_vec())?.build())
}

/// The default blue → green → yellow → red speed ramp.
pub fn default_stops() -> Vec<ColorStop> {
    const STOPS: [(f32, [u8; 3]); 8] = [
        (0.0, [0x32, 0x88, 0xbd]),
        (0.1, [0x66, 0xc2, 0xa5]),
        (0.2, [0xab, 0xdd, 0xa4]),
        (0.3, [0xe6, 0xf5, 0x98]),
        (0.4, [0xfe, 0xe0, 0x8b]),
        (0.5, [0xfd, 0xae, 0x61]),
        (0.6, [0xf4, 0x6d, 0x43]),
        (1.0, [0xd5, 0x3e, 0x4f]),
    ];
    STOPS
        .iter()
        .map(|&(t, [r, g, b])| ColorStop::new(t, [r, g, b, 255]))
        .collect()
}

fn lerp_rgba(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = lerp_u8(a[i], b[i], t);
    }
    out
}

fn lerp_u8(a: u8, b: u8, t: f32) -> u8 {
    let a = a as f32;
    let b = b as f32;
    (a + (b - a) * t).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_stop() -> ColorRamp {
        ColorRamp::new(vec![
            ColorStop::new(0.0, [0, 0, 0, 255]),
            ColorStop::new(1.0, [255, 128, 0, 255]),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_single_stop() {
        let err = ColorRamp::new(vec![ColorStop::new(0.0, [0; 4])]).unwrap_err();
        assert!(matches!(err, WindError::InvalidRamp(_)));
    }

    #[test]
    fn test_rejects_non_increasing_stops() {
        let stops = vec![
            ColorStop::new(0.0, [0; 4]),
            ColorStop::new(0.5, [0; 4]),
            ColorStop::new(0.5, [0; 4]),
        ];
        assert!(ColorRamp::new(stops).is_err());
        let stops = vec![ColorStop::new(0.8, [0; 4]), ColorStop::new(0.2, [0; 4])];
        assert!(ColorRamp::new(stops).is_err());
    }

    #[test]
    fn test_out_of_range_stops_are_clamped() {
        let ramp = ColorRamp::new(vec![
            ColorStop::new(-0.5, [10, 10, 10, 255]),
            ColorStop::new(1.5, [20, 20, 20, 255]),
        ])
        .unwrap();
        assert_eq!(ramp.stops()[0].t, 0.0);
        assert_eq!(ramp.stops()[1].t, 1.0);
    }

    #[test]
    fn test_sample_outside_stops_uses_end_colors() {
        let ramp = ColorRamp::new(vec![
            ColorStop::new(0.2, [1, 2, 3, 255]),
            ColorStop::new(0.8, [9, 8, 7, 255]),
        ])
        .unwrap();
        assert_eq!(ramp.sample(0.0), [1, 2, 3, 255]);
        assert_eq!(ramp.sample(1.0), [9, 8, 7, 255]);
    }

    #[test]
    fn test_sample_interpolates_linearly() {
        let ramp = two_stop();
        assert_eq!(ramp.sample(0.5), [128, 64, 0, 255]);
    }

    #[test]
    fn test_build_layout() {
        let ramp = two_stop();
        let data = ramp.build();
        assert_eq!(data.len(), 16 * 16 * 4);
        assert_eq!(&data[0..4], &[0, 0, 0, 255]);
        assert_eq!(&data[15 * 4..16 * 4], &[255, 128, 0, 255]);

        let row = &data[0..64];
        for r in 1..16 {
            assert_eq!(&data[r * 64..(r + 1) * 64], row, "row {r} differs");
        }
    }

    #[test]
    fn test_build_is_monotonic_for_monotonic_ramp() {
        let data = two_stop().build();
        for i in 1..16 {
            assert!(data[i * 4] >= data[(i - 1) * 4]);
        }
    }

    #[test]
    fn test_hex_parsing() {
        let stop = ColorStop::hex(0.3, "#e6f598").unwrap();
        assert_eq!(stop.color, [0xe6, 0xf5, 0x98, 255]);
        let stop = ColorStop::hex(0.3, "10203040").unwrap();
        assert_eq!(stop.color, [0x10, 0x20, 0x30, 0x40]);
        assert!(ColorStop::hex(0.0, "#12345").is_err());
        assert!(ColorStop::hex(0.0, "#zzzzzz").is_err());
    }

    #[test]
    fn test_default_ramp_is_valid() {
        let ramp = ColorRamp::new(default_stops()).unwrap();
        assert_eq!(ramp, ColorRamp::default());
        assert_eq!(ramp.sample(0.0), [0x32, 0x88, 0xbd, 255]);
        assert_eq!(ramp.sample(1.0), [0xd5, 0x3e, 0x4f, 255]);
    }
}
