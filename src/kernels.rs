//! CPU reference implementations of the shader math.
//!
//! Every function here has a WGSL twin in [`crate::shader`]. The software
//! backend executes the three programs with these functions, and the tests
//! use them to pin down the numeric formats:
//!
//! - particle positions: 16 bits per axis split over two RGBA8 channels
//! - field velocities: 8 bits per axis, linearly mapped onto `[min, max]`
//! - per-particle random numbers: integer PCG hash, identical on CPU and GPU

use glam::{UVec2, Vec2, Vec4};

/// Scale between one encoded byte step and the position axis.
pub const STATE_SCALE: f32 = 255.0;

/// Conversion from field velocity units to UV units per simulation step.
pub const VELOCITY_TO_UV: f32 = 1.0e-4;

/// Side length of the color ramp lookup texture.
pub const RAMP_SIZE: u32 = 16;

/// Encode a normalized position into the split RGBA8 layout.
///
/// `R`/`G` hold the low byte of x/y, `B`/`A` the high byte.
pub fn encode_position(pos: Vec2) -> [u8; 4] {
    let scaled = pos * STATE_SCALE;
    let high = scaled.floor();
    let low = scaled - high;
    [
        unorm_to_byte(low.x),
        unorm_to_byte(low.y),
        unorm_to_byte(high.x / STATE_SCALE),
        unorm_to_byte(high.y / STATE_SCALE),
    ]
}

/// Decode the split RGBA8 layout back into a normalized position.
pub fn decode_position(texel: [u8; 4]) -> Vec2 {
    let c = byte_to_unorm4(texel);
    Vec2::new(c.x / STATE_SCALE + c.z, c.y / STATE_SCALE + c.w)
}

/// Quantize one velocity component into a byte over `[min, max]`.
pub fn quantize_component(value: f32, min: f32, max: f32) -> u8 {
    if max <= min {
        return 0;
    }
    unorm_to_byte((value - min) / (max - min))
}

/// Map normalized field channels back onto velocity.
///
/// An axis with `min == max` carries no information and decodes to zero.
pub fn decode_velocity(channels: Vec2, min: Vec2, max: Vec2) -> Vec2 {
    let v = min + (max - min) * channels;
    Vec2::new(
        if max.x > min.x { v.x } else { 0.0 },
        if max.y > min.y { v.y } else { 0.0 },
    )
}

/// Smallest and largest speed representable inside the velocity box.
///
/// Degenerate axes are treated as zero, matching [`decode_velocity`].
pub fn speed_range(min: Vec2, max: Vec2) -> Vec2 {
    let axis = |lo: f32, hi: f32| -> (f32, f32) {
        if hi <= lo {
            return (0.0, 0.0);
        }
        let nearest = 0.0_f32.clamp(lo, hi);
        let farthest = lo.abs().max(hi.abs());
        (nearest, farthest)
    };
    let (nx, fx) = axis(min.x, max.x);
    let (ny, fy) = axis(min.y, max.y);
    Vec2::new(Vec2::new(nx, ny).length(), Vec2::new(fx, fy).length())
}

/// Normalize a speed into `[0, 1]` over `range = (min_speed, max_speed)`.
///
/// Returns 0 for an empty range instead of dividing by zero.
pub fn normalized_speed(velocity: Vec2, range: Vec2) -> f32 {
    let span = range.y - range.x;
    if span <= 0.0 {
        return 0.0;
    }
    ((velocity.length() - range.x) / span).clamp(0.0, 1.0)
}

/// Horizontal ramp texture coordinate for a normalized speed.
///
/// `t = 0` and `t = 1` land on the first and last texel centres.
pub fn ramp_coord(t: f32) -> f32 {
    let n = RAMP_SIZE as f32;
    (0.5 + t.clamp(0.0, 1.0) * (n - 1.0)) / n
}

/// PCG output hash.
pub fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747796405).wrapping_add(2891336453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277803737);
    (word >> 22) ^ word
}

/// Per-particle random number in `[0, 1)`.
///
/// Combines the frame seed, the particle's texel and a stream index so the
/// drop test and the two reseed coordinates are independent.
pub fn random01(texel: UVec2, seed: u32, stream: u32) -> f32 {
    let h = pcg_hash(seed ^ stream.wrapping_mul(0x9e37_79b9));
    let h = pcg_hash(h.wrapping_add(texel.x));
    let h = pcg_hash(h.wrapping_add(texel.y));
    (h >> 8) as f32 / 16_777_216.0
}

/// Uniforms consumed by one advection step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvectParams {
    pub wind_min: Vec2,
    pub wind_max: Vec2,
    pub speed_range: Vec2,
    pub speed_factor: f32,
    pub drop_rate: f32,
    pub drop_rate_bump: f32,
    pub seed: u32,
}

/// Result of advecting one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advected {
    /// Moved along the field.
    Moved(Vec2),
    /// Randomly dropped and reseeded.
    Dropped(Vec2),
    /// Left the unit square and was reseeded.
    Escaped(Vec2),
}

impl Advected {
    pub fn position(self) -> Vec2 {
        match self {
            Advected::Moved(p) | Advected::Dropped(p) | Advected::Escaped(p) => p,
        }
    }
}

/// Advance one particle.
///
/// `channels` is the bilinear field sample (normalized RG) at `pos`.
/// Positions that leave `[0, 1]` are never wrapped or clamped: they are
/// reseeded on the same step.
pub fn advect(pos: Vec2, channels: Vec2, texel: UVec2, params: &AdvectParams) -> Advected {
    let velocity = decode_velocity(channels, params.wind_min, params.wind_max);
    let speed_t = normalized_speed(velocity, params.speed_range);

    let offset = Vec2::new(velocity.x, -velocity.y) * params.speed_factor * VELOCITY_TO_UV;
    let next = pos + offset;

    let drop_probability = params.drop_rate + speed_t * params.drop_rate_bump;
    let escaped = next.x < 0.0 || next.x > 1.0 || next.y < 0.0 || next.y > 1.0;
    let dropped = random01(texel, params.seed, 0) < drop_probability;

    if escaped || dropped {
        let fresh = Vec2::new(
            random01(texel, params.seed, 1),
            random01(texel, params.seed, 2),
        );
        if escaped {
            Advected::Escaped(fresh)
        } else {
            Advected::Dropped(fresh)
        }
    } else {
        Advected::Moved(next)
    }
}

/// Trail fade applied by the screen program to one normalized channel.
pub fn fade_channel(value: f32, opacity: f32) -> f32 {
    (STATE_SCALE * value * opacity + 1.0e-3).floor() / STATE_SCALE
}

/// Read one RGBA8 texel with clamped integer coordinates.
pub fn texel_fetch(data: &[u8], width: u32, height: u32, x: i64, y: i64) -> [u8; 4] {
    let x = x.clamp(0, width as i64 - 1) as usize;
    let y = y.clamp(0, height as i64 - 1) as usize;
    let i = (y * width as usize + x) * 4;
    [data[i], data[i + 1], data[i + 2], data[i + 3]]
}

/// Nearest-neighbour sample with clamp-to-edge addressing.
pub fn sample_nearest(data: &[u8], width: u32, height: u32, uv: Vec2) -> Vec4 {
    let x = (uv.x * width as f32).floor() as i64;
    let y = (uv.y * height as f32).floor() as i64;
    byte_to_unorm4(texel_fetch(data, width, height, x, y))
}

/// Bilinear sample with clamp-to-edge addressing.
pub fn sample_bilinear(data: &[u8], width: u32, height: u32, uv: Vec2) -> Vec4 {
    let x = uv.x * width as f32 - 0.5;
    let y = uv.y * height as f32 - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let tl = byte_to_unorm4(texel_fetch(data, width, height, x0, y0));
    let tr = byte_to_unorm4(texel_fetch(data, width, height, x0 + 1, y0));
    let bl = byte_to_unorm4(texel_fetch(data, width, height, x0, y0 + 1));
    let br = byte_to_unorm4(texel_fetch(data, width, height, x0 + 1, y0 + 1));

    tl.lerp(tr, fx).lerp(bl.lerp(br, fx), fy)
}

pub fn unorm_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn byte_to_unorm4(texel: [u8; 4]) -> Vec4 {
    Vec4::new(
        texel[0] as f32,
        texel[1] as f32,
        texel[2] as f32,
        texel[3] as f32,
    ) / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AdvectParams {
        AdvectParams {
            wind_min: Vec2::new(-10.0, -10.0),
            wind_max: Vec2::new(10.0, 10.0),
            speed_range: speed_range(Vec2::splat(-10.0), Vec2::splat(10.0)),
            speed_factor: 0.25,
            drop_rate: 0.0,
            drop_rate_bump: 0.0,
            seed: 7,
        }
    }

    #[test]
    fn test_position_round_trip_precision() {
        for &(x, y) in &[(0.0, 0.0), (0.5, 0.25), (0.123456, 0.987654), (1.0, 1.0)] {
            let pos = Vec2::new(x, y);
            let back = decode_position(encode_position(pos));
            // 16-bit split: error bounded by one low-byte step
            assert!((back - pos).abs().max_element() <= 1.0 / (255.0 * 255.0) + 1e-6, "{pos} -> {back}");
        }
    }

    #[test]
    fn test_decode_random_bytes_stays_near_unit_square() {
        let max = decode_position([255, 255, 255, 255]);
        assert!(max.x <= 1.0 + 1.0 / 255.0 + 1e-6);
        assert_eq!(decode_position([0, 0, 0, 0]), Vec2::ZERO);
    }

    #[test]
    fn test_velocity_quantization_error_bound() {
        let (min, max) = (-21.32_f32, 26.8_f32);
        let step = (max - min) / 255.0;
        let mut v = min;
        while v <= max {
            let byte = quantize_component(v, min, max);
            let decoded = decode_velocity(Vec2::new(byte as f32 / 255.0, 0.5), Vec2::new(min, 0.0), Vec2::new(max, 1.0)).x;
            assert!((decoded - v).abs() <= step, "{v} decoded as {decoded}");
            v += 0.37;
        }
    }

    #[test]
    fn test_degenerate_axis_decodes_to_zero() {
        let v = decode_velocity(Vec2::new(0.7, 0.7), Vec2::new(5.0, -3.0), Vec2::new(5.0, 3.0));
        assert_eq!(v.x, 0.0);
        assert!(v.y != 0.0);
        assert_eq!(normalized_speed(Vec2::new(3.0, 4.0), Vec2::new(2.0, 2.0)), 0.0);
    }

    #[test]
    fn test_speed_range_box() {
        let range = speed_range(Vec2::new(-21.32, -21.57), Vec2::new(26.8, 21.42));
        assert_eq!(range.x, 0.0);
        let expected = Vec2::new(26.8, 21.57).length();
        assert!((range.y - expected).abs() < 1e-4);

        let shifted = speed_range(Vec2::new(3.0, 4.0), Vec2::new(6.0, 8.0));
        assert!((shifted.x - 5.0).abs() < 1e-6);
        assert!((shifted.y - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_ramp_coord_hits_texel_centres() {
        assert_eq!(ramp_coord(0.0), 0.5 / 16.0);
        assert_eq!(ramp_coord(1.0), 15.5 / 16.0);
        assert_eq!(ramp_coord(-3.0), ramp_coord(0.0));
    }

    #[test]
    fn test_random01_range_and_independence() {
        let mut sum = 0.0;
        for i in 0..4096u32 {
            let r = random01(UVec2::new(i % 64, i / 64), 1234, 0);
            assert!((0.0..1.0).contains(&r));
            sum += r;
        }
        let mean = sum / 4096.0;
        assert!((mean - 0.5).abs() < 0.03, "mean {mean}");

        let t = UVec2::new(3, 9);
        assert_ne!(random01(t, 1, 0), random01(t, 1, 1));
        assert_ne!(random01(t, 1, 0), random01(t, 2, 0));
    }

    #[test]
    fn test_advect_moves_with_field() {
        // channels (1.0, 0.5) => velocity (10, 0)
        let out = advect(Vec2::splat(0.5), Vec2::new(1.0, 0.5), UVec2::ZERO, &params());
        match out {
            Advected::Moved(p) => {
                assert!((p.x - (0.5 + 10.0 * 0.25 * VELOCITY_TO_UV)).abs() < 1e-6);
                assert!((p.y - 0.5).abs() < 1e-6);
            }
            other => panic!("expected move, got {other:?}"),
        }
    }

    #[test]
    fn test_advect_escape_reseeds_inside() {
        let start = Vec2::new(1.0 + 1.0 / 255.0, 0.5);
        for seed in 0..64 {
            let mut p = params();
            p.seed = seed;
            let out = advect(start, Vec2::new(0.5, 0.5), UVec2::new(4, 4), &p);
            let Advected::Escaped(pos) = out else {
                panic!("expected escape, got {out:?}");
            };
            assert!((0.0..1.0).contains(&pos.x) && (0.0..1.0).contains(&pos.y));
        }
    }

    #[test]
    fn test_advect_drop_rate_one_always_drops() {
        let mut p = params();
        p.drop_rate = 1.0;
        let out = advect(Vec2::splat(0.5), Vec2::splat(0.5), UVec2::new(1, 2), &p);
        assert!(matches!(out, Advected::Dropped(_)));
    }

    #[test]
    fn test_fade_channel_reaches_zero() {
        let mut v = 1.0;
        for _ in 0..2000 {
            v = fade_channel(v, 0.996);
        }
        assert_eq!(v, 0.0);
        assert_eq!(fade_channel(1.0, 1.0), 1.0);
        assert_eq!(fade_channel(3.0 / 255.0, 1.0), 3.0 / 255.0);
    }

    #[test]
    fn test_bilinear_interpolates_between_texels() {
        // 2x1 texture: black then white
        let data = [0, 0, 0, 255, 255, 255, 255, 255];
        let mid = sample_bilinear(&data, 2, 1, Vec2::new(0.5, 0.5));
        assert!((mid.x - 0.5).abs() < 1e-6);
        let left = sample_bilinear(&data, 2, 1, Vec2::new(0.25, 0.5));
        assert!(left.x.abs() < 1e-6);
        let near = sample_nearest(&data, 2, 1, Vec2::new(0.6, 0.5));
        assert_eq!(near.x, 1.0);
    }
}
