//! Runtime configuration.
//!
//! [`SimulationParameters`] holds the per-frame tunables and can be swapped at
//! any time. [`EngineConfig`] is the full configuration surface used to build
//! a simulation, loadable from JSON.
//!
//! ```json
//! {
//!   "params": { "fadeOpacity": 0.996, "speedFactor": 0.25, "dropRate": 0.003, "dropRateBump": 0.01 },
//!   "particleCount": 65536,
//!   "colorRamp": [ { "t": 0.0, "color": [50, 136, 189, 255] }, { "t": 1.0, "color": [213, 62, 79, 255] } ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WindError};
use crate::ramp::{self, ColorStop};

/// Per-frame simulation tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationParameters {
    /// Multiplier applied to last frame's trails, in `[0, 1]`.
    pub fade_opacity: f32,
    /// Velocity multiplier, `> 0`.
    pub speed_factor: f32,
    /// Base probability that a particle is reseeded each step, in `[0, 1]`.
    pub drop_rate: f32,
    /// Extra drop probability at maximum speed, in `[0, 1]`.
    pub drop_rate_bump: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            fade_opacity: 0.996,
            speed_factor: 0.25,
            drop_rate: 0.003,
            drop_rate_bump: 0.01,
        }
    }
}

impl SimulationParameters {
    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        unit_interval("fadeOpacity", self.fade_opacity)?;
        unit_interval("dropRate", self.drop_rate)?;
        unit_interval("dropRateBump", self.drop_rate_bump)?;
        if !(self.speed_factor.is_finite() && self.speed_factor > 0.0) {
            return Err(WindError::InvalidParameter(format!(
                "speedFactor must be > 0, got {}",
                self.speed_factor
            )));
        }
        Ok(())
    }

    pub fn with_fade_opacity(mut self, fade_opacity: f32) -> Self {
        self.fade_opacity = fade_opacity;
        self
    }

    pub fn with_speed_factor(mut self, speed_factor: f32) -> Self {
        self.speed_factor = speed_factor;
        self
    }

    pub fn with_drop_rate(mut self, drop_rate: f32) -> Self {
        self.drop_rate = drop_rate;
        self
    }

    pub fn with_drop_rate_bump(mut self, drop_rate_bump: f32) -> Self {
        self.drop_rate_bump = drop_rate_bump;
        self
    }
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(WindError::InvalidParameter(format!("{name} must be in [0, 1], got {value}")))
    }
}

/// Everything needed to construct a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub params: SimulationParameters,
    /// Requested particle count, `> 0`.
    pub particle_count: u32,
    /// Speed color ramp stops.
    pub color_ramp: Vec<ColorStop>,
    /// Physical pixels per logical pixel.
    pub pixel_ratio: f32,
    /// Color the visible surface is cleared to before compositing.
    pub clear_color: [f32; 4],
    /// Seed for particle placement and per-frame randomness.
    /// `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            params: SimulationParameters::default(),
            particle_count: 256 * 256,
            color_ramp: ramp::default_stops(),
            pixel_ratio: 1.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        if self.particle_count == 0 {
            return Err(WindError::InvalidParameter("particleCount must be > 0".into()));
        }
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(WindError::InvalidParameter(format!(
                "pixelRatio must be > 0, got {}",
                self.pixel_ratio
            )));
        }
        ramp::ColorRamp::new(self.color_ramp.clone())?;
        Ok(())
    }

    pub fn with_params(mut self, params: SimulationParameters) -> Self {
        self.params = params;
        self
    }

    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = count;
        self
    }

    pub fn with_color_ramp(mut self, stops: Vec<ColorStop>) -> Self {
        self.color_ramp = stops;
        self
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
