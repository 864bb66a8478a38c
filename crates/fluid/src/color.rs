//! Splat color generation: a hue wheel advanced at a configured rate.

use glam::Vec3;

/// Standard sector-based HSV to RGB conversion with h, s, v in [0, 1].
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let h = (h.rem_euclid(1.0)) * 6.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match i as u32 % 6 {
        0 => Vec3::new(v, t, p),
        1 => Vec3::new(q, v, p),
        2 => Vec3::new(p, v, t),
        3 => Vec3::new(p, q, v),
        4 => Vec3::new(t, p, v),
        _ => Vec3::new(v, p, q),
    }
}

/// Intensity applied to generated splat colors. Full-brightness dye blows out
/// immediately once bloom is applied.
const COLOR_INTENSITY: f32 = 0.15;

/// Hue accumulator cycled over time. `speed` is the COLOR_UPDATE_SPEED
/// config value; one full wheel takes `100 / speed` seconds.
#[derive(Debug, Clone)]
pub struct ColorCycler {
    hue: f32,
    speed: f32,
}

impl ColorCycler {
    pub fn new(speed: f32) -> Self {
        Self { hue: 0.0, speed }
    }

    pub fn with_hue(hue: f32, speed: f32) -> Self {
        Self { hue: hue.rem_euclid(1.0), speed }
    }

    pub fn advance(&mut self, dt: f32) {
        self.hue = (self.hue + dt * self.speed * 0.01).rem_euclid(1.0);
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }

    /// Color at the current hue, saturation = value = 1, scaled for splats.
    pub fn color(&self) -> Vec3 {
        hsv_to_rgb(self.hue, 1.0, 1.0) * COLOR_INTENSITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dominant_channel(c: Vec3) -> usize {
        if c.x >= c.y && c.x >= c.z {
            0
        } else if c.y >= c.z {
            1
        } else {
            2
        }
    }

    #[test]
    fn hue_sectors_map_to_primaries() {
        // hue 0 -> red, 120deg -> green, 240deg -> blue
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(dominant_channel(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0)), 1);
        assert_eq!(dominant_channel(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0)), 2);
    }

    #[test]
    fn zero_saturation_is_grey() {
        let c = hsv_to_rgb(0.37, 0.0, 0.5);
        assert!((c.x - 0.5).abs() < 1e-6);
        assert!((c.y - 0.5).abs() < 1e-6);
        assert!((c.z - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cycler_wraps_and_advances_at_rate() {
        let mut cycler = ColorCycler::new(10.0);
        // 10 units of speed -> 0.1 hue per second.
        cycler.advance(1.0);
        assert!((cycler.hue() - 0.1).abs() < 1e-6);
        cycler.advance(10.0);
        assert!(cycler.hue() < 1.0);
    }

    #[test]
    fn cycled_colors_stay_dim() {
        let mut cycler = ColorCycler::new(10.0);
        for _ in 0..100 {
            cycler.advance(0.016);
            let c = cycler.color();
            assert!(c.max_element() <= COLOR_INTENSITY + 1e-6);
        }
    }
}
