//! Simulation configuration.
//!
//! `SimulationConfig` is fixed for the lifetime of an engine except for the
//! capability downgrade applied once at construction. Optional render passes
//! are resolved once into a `PassSet` instead of being re-checked per frame.

/// Dye resolution used when linear filtering on float textures is missing.
pub const FALLBACK_DYE_RESOLUTION: u32 = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Base resolution of the velocity/pressure grids (shorter screen axis).
    pub sim_resolution: u32,
    /// Base resolution of the dye grid.
    pub dye_resolution: u32,
    /// Base resolution for screenshot capture.
    pub capture_resolution: u32,
    /// Per-step multiplier applied to dye, in (0, 1].
    pub density_dissipation: f32,
    /// Per-step multiplier applied to velocity, in (0, 1].
    pub velocity_dissipation: f32,
    /// Pressure carried over between frames, in [0, 1].
    pub pressure: f32,
    /// Jacobi relaxation steps per frame. Zero is valid and leaves the
    /// pressure field at its cleared prior value.
    pub pressure_iterations: u32,
    /// Vorticity confinement strength.
    pub curl: f32,
    /// Splat radius in percent of the shorter screen axis.
    pub splat_radius: f32,
    /// Scale from pointer texcoord delta to velocity impulse.
    pub splat_force: f32,
    pub shading: bool,
    /// Cycle splat colors over the hue wheel.
    pub colorful: bool,
    pub color_update_speed: f32,
    pub bloom: bool,
    pub bloom_iterations: u32,
    pub bloom_resolution: u32,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub bloom_soft_knee: f32,
    pub sunrays: bool,
    pub sunrays_resolution: u32,
    pub sunrays_weight: f32,
    pub back_color: [f32; 3],
    pub transparent: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1024,
            capture_resolution: 512,
            density_dissipation: 0.97,
            velocity_dissipation: 0.98,
            pressure: 0.8,
            pressure_iterations: 20,
            curl: 30.0,
            splat_radius: 0.25,
            splat_force: 6000.0,
            shading: true,
            colorful: true,
            color_update_speed: 10.0,
            bloom: true,
            bloom_iterations: 8,
            bloom_resolution: 256,
            bloom_intensity: 0.8,
            bloom_threshold: 0.6,
            bloom_soft_knee: 0.7,
            sunrays: true,
            sunrays_resolution: 196,
            sunrays_weight: 1.0,
            back_color: [0.0, 0.0, 0.0],
            transparent: false,
        }
    }
}

/// Partial configuration supplied by the embedding page. Unset fields keep
/// their defaults; out-of-range values are rejected with a warning.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sim_resolution: Option<u32>,
    pub dye_resolution: Option<u32>,
    pub capture_resolution: Option<u32>,
    pub density_dissipation: Option<f32>,
    pub velocity_dissipation: Option<f32>,
    pub pressure: Option<f32>,
    pub pressure_iterations: Option<u32>,
    pub curl: Option<f32>,
    pub splat_radius: Option<f32>,
    pub splat_force: Option<f32>,
    pub shading: Option<bool>,
    pub colorful: Option<bool>,
    pub color_update_speed: Option<f32>,
    pub bloom: Option<bool>,
    pub bloom_iterations: Option<u32>,
    pub bloom_resolution: Option<u32>,
    pub bloom_intensity: Option<f32>,
    pub bloom_threshold: Option<f32>,
    pub bloom_soft_knee: Option<f32>,
    pub sunrays: Option<bool>,
    pub sunrays_resolution: Option<u32>,
    pub sunrays_weight: Option<f32>,
    pub back_color: Option<[f32; 3]>,
    pub transparent: Option<bool>,
}

/// Optional passes enabled for this session, resolved once from config and
/// GPU capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSet {
    pub shading: bool,
    pub bloom: bool,
    pub sunrays: bool,
    pub colorful: bool,
}

impl SimulationConfig {
    pub fn with_overrides(overrides: &ConfigOverrides) -> Self {
        let mut config = Self::default();
        config.apply(overrides);
        config
    }

    /// Applies recognized, in-range overrides. Invalid values are skipped so
    /// a bad page-level tweak cannot wedge the engine.
    pub fn apply(&mut self, o: &ConfigOverrides) {
        apply_u32(&mut self.sim_resolution, o.sim_resolution, "SIM_RESOLUTION", 16, 4096);
        apply_u32(&mut self.dye_resolution, o.dye_resolution, "DYE_RESOLUTION", 16, 4096);
        apply_u32(
            &mut self.capture_resolution,
            o.capture_resolution,
            "CAPTURE_RESOLUTION",
            16,
            4096,
        );
        apply_f32(
            &mut self.density_dissipation,
            o.density_dissipation,
            "DENSITY_DISSIPATION",
            0.0..=1.0,
        );
        apply_f32(
            &mut self.velocity_dissipation,
            o.velocity_dissipation,
            "VELOCITY_DISSIPATION",
            0.0..=1.0,
        );
        apply_f32(&mut self.pressure, o.pressure, "PRESSURE", 0.0..=1.0);
        if let Some(v) = o.pressure_iterations {
            // Zero is a valid degenerate case: projection becomes a no-op.
            self.pressure_iterations = v.min(512);
        }
        apply_f32(&mut self.curl, o.curl, "CURL", 0.0..=100.0);
        apply_f32(&mut self.splat_radius, o.splat_radius, "SPLAT_RADIUS", 0.01..=10.0);
        apply_f32(&mut self.splat_force, o.splat_force, "SPLAT_FORCE", 0.0..=100_000.0);
        apply_f32(
            &mut self.color_update_speed,
            o.color_update_speed,
            "COLOR_UPDATE_SPEED",
            0.0..=1000.0,
        );
        apply_u32(
            &mut self.bloom_iterations,
            o.bloom_iterations,
            "BLOOM_ITERATIONS",
            1,
            16,
        );
        apply_u32(
            &mut self.bloom_resolution,
            o.bloom_resolution,
            "BLOOM_RESOLUTION",
            16,
            2048,
        );
        apply_f32(&mut self.bloom_intensity, o.bloom_intensity, "BLOOM_INTENSITY", 0.0..=10.0);
        apply_f32(&mut self.bloom_threshold, o.bloom_threshold, "BLOOM_THRESHOLD", 0.0..=10.0);
        apply_f32(&mut self.bloom_soft_knee, o.bloom_soft_knee, "BLOOM_SOFT_KNEE", 0.0..=1.0);
        apply_u32(
            &mut self.sunrays_resolution,
            o.sunrays_resolution,
            "SUNRAYS_RESOLUTION",
            16,
            2048,
        );
        apply_f32(&mut self.sunrays_weight, o.sunrays_weight, "SUNRAYS_WEIGHT", 0.0..=10.0);

        if let Some(v) = o.shading {
            self.shading = v;
        }
        if let Some(v) = o.colorful {
            self.colorful = v;
        }
        if let Some(v) = o.bloom {
            self.bloom = v;
        }
        if let Some(v) = o.sunrays {
            self.sunrays = v;
        }
        if let Some(v) = o.back_color {
            self.back_color = v;
        }
        if let Some(v) = o.transparent {
            self.transparent = v;
        }
    }

    /// Hard consistency rule: without linear filtering on float textures the
    /// dye grid shrinks and every filtering-dependent pass is disabled. This
    /// is the `UnsupportedFeatureDowngrade` notice path, not an error.
    pub fn downgrade_without_linear_filtering(&mut self) {
        log::warn!(
            "linear filtering on float textures unsupported; \
             reducing dye resolution to {} and disabling shading/bloom/sunrays",
            FALLBACK_DYE_RESOLUTION
        );
        self.dye_resolution = self.dye_resolution.min(FALLBACK_DYE_RESOLUTION);
        self.shading = false;
        self.bloom = false;
        self.sunrays = false;
    }

    pub fn pass_set(&self) -> PassSet {
        PassSet {
            shading: self.shading,
            bloom: self.bloom,
            sunrays: self.sunrays,
            colorful: self.colorful,
        }
    }
}

fn apply_u32(slot: &mut u32, value: Option<u32>, key: &str, min: u32, max: u32) {
    if let Some(v) = value {
        if v >= min && v <= max {
            *slot = v;
        } else {
            log::warn!("ignoring {key}={v}: outside [{min}, {max}]");
        }
    }
}

fn apply_f32(slot: &mut f32, value: Option<f32>, key: &str, range: std::ops::RangeInclusive<f32>) {
    if let Some(v) = value {
        if v.is_finite() && range.contains(&v) {
            *slot = v;
        } else {
            log::warn!(
                "ignoring {key}={v}: outside [{}, {}]",
                range.start(),
                range.end()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_in_range_values() {
        let overrides = ConfigOverrides {
            sim_resolution: Some(64),
            pressure_iterations: Some(0),
            curl: Some(0.0),
            bloom: Some(false),
            ..Default::default()
        };
        let config = SimulationConfig::with_overrides(&overrides);
        assert_eq!(config.sim_resolution, 64);
        assert_eq!(config.pressure_iterations, 0);
        assert_eq!(config.curl, 0.0);
        assert!(!config.bloom);
        // Untouched keys keep their defaults.
        assert_eq!(config.dye_resolution, 1024);
    }

    #[test]
    fn out_of_range_overrides_are_ignored() {
        let overrides = ConfigOverrides {
            sim_resolution: Some(0),
            velocity_dissipation: Some(2.0),
            splat_radius: Some(f32::NAN),
            ..Default::default()
        };
        let config = SimulationConfig::with_overrides(&overrides);
        let defaults = SimulationConfig::default();
        assert_eq!(config, defaults);
    }

    #[test]
    fn downgrade_disables_filtering_dependent_features() {
        let mut config = SimulationConfig::default();
        assert!(config.shading && config.bloom && config.sunrays);
        config.downgrade_without_linear_filtering();
        assert_eq!(config.dye_resolution, FALLBACK_DYE_RESOLUTION);
        assert!(!config.shading);
        assert!(!config.bloom);
        assert!(!config.sunrays);
        let passes = config.pass_set();
        assert!(!passes.shading && !passes.bloom && !passes.sunrays);
    }

    #[test]
    fn downgrade_never_raises_dye_resolution() {
        let mut config = SimulationConfig::with_overrides(&ConfigOverrides {
            dye_resolution: Some(256),
            ..Default::default()
        });
        config.downgrade_without_linear_filtering();
        assert_eq!(config.dye_resolution, 256);
    }
}
