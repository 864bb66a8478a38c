//! Per-frame solver pipeline: the fixed sequence of kernel passes over the
//! surface pool, plus the composite render path.
//!
//! Passes run in strict order inside one command encoder; each depends on
//! the previous pass's output, with a read/write swap after every pass that
//! rewrites a double-buffered field.

use bytemuck::bytes_of;
use glam::{Vec2, Vec3};

use crate::engine::{CaptureImage, FluidEngine, MAX_DT};
use crate::error::FluidError;
use crate::gpu::kernels::{
    AdvectionUniforms, BloomFinalUniforms, BloomPrefilterUniforms, ClearUniforms, DisplayUniforms,
    KernelLibrary, SplatUniforms, SunraysUniforms, TexelUniforms, VorticityUniforms,
    DISPLAY_BLOOM, DISPLAY_OPAQUE, DISPLAY_SHADING, DISPLAY_SUNRAYS,
};
use crate::gpu::surface::{resolve_resolution, FieldBuffer, SurfacePool};
use crate::gpu::{readback, GpuContext};

impl FluidEngine {
    /// Runs one simulation step with `raw_dt` seconds of elapsed wall time.
    /// The step is clamped to `MAX_DT` before it reaches the advection
    /// kernel; a stalled tab or debugger pause must not blow up the solver.
    pub fn advance(&mut self, raw_dt: f32) {
        if !self.is_running() {
            return;
        }
        let dt = if raw_dt.is_finite() && raw_dt >= 0.0 {
            raw_dt.min(MAX_DT)
        } else {
            MAX_DT
        };
        self.last_dt = dt;
        if self.passes.colorful {
            self.cycler.advance(dt);
        }

        let Some(res) = self.resources.as_mut() else {
            return;
        };
        let kernels = &res.kernels;
        let pool = &mut res.pool;
        let ctx = &self.ctx;
        let caps = &ctx.caps;
        let manual_filtering = u32::from(!caps.linear_filtering);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("solver step"),
            });

        let sim_texel = pool.velocity.texel_size();

        // Velocity self-advection.
        let uniforms = AdvectionUniforms {
            texel_size: sim_texel.into(),
            src_texel_size: sim_texel.into(),
            dt,
            dissipation: self.config.velocity_dissipation,
            manual_filtering,
            _pad: 0,
        };
        kernels.advection.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&uniforms),
            &kernels.sampler,
            &[pool.velocity.read().view(), pool.velocity.read().view()],
            pool.velocity.write().view(),
            caps.rg_format,
        );
        pool.velocity.swap();

        // Dye advected by the freshly updated velocity.
        let uniforms = AdvectionUniforms {
            texel_size: sim_texel.into(),
            src_texel_size: pool.dye.texel_size().into(),
            dt,
            dissipation: self.config.density_dissipation,
            manual_filtering,
            _pad: 0,
        };
        kernels.advection.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&uniforms),
            &kernels.sampler,
            &[pool.velocity.read().view(), pool.dye.read().view()],
            pool.dye.write().view(),
            caps.rgba_format,
        );
        pool.dye.swap();

        let texel = TexelUniforms {
            texel_size: sim_texel.into(),
            _pad: [0.0; 2],
        };

        // Curl, then vorticity confinement back into velocity.
        kernels.curl.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&texel),
            &kernels.sampler,
            &[pool.velocity.read().view()],
            pool.curl.view(),
            caps.r_format,
        );
        let uniforms = VorticityUniforms {
            texel_size: sim_texel.into(),
            curl: self.config.curl,
            dt,
        };
        kernels.vorticity.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&uniforms),
            &kernels.sampler,
            &[pool.velocity.read().view(), pool.curl.view()],
            pool.velocity.write().view(),
            caps.rg_format,
        );
        pool.velocity.swap();

        // Projection: divergence, decayed pressure, Jacobi relaxation,
        // gradient subtraction.
        kernels.divergence.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&texel),
            &kernels.sampler,
            &[pool.velocity.read().view()],
            pool.divergence.view(),
            caps.r_format,
        );

        let uniforms = ClearUniforms {
            value: self.config.pressure,
            _pad: [0.0; 3],
        };
        kernels.clear.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&uniforms),
            &kernels.sampler,
            &[pool.pressure.read().view()],
            pool.pressure.write().view(),
            caps.r_format,
        );
        pool.pressure.swap();

        for _ in 0..self.config.pressure_iterations {
            kernels.pressure.encode(
                &ctx.device,
                &mut encoder,
                bytes_of(&texel),
                &kernels.sampler,
                &[pool.pressure.read().view(), pool.divergence.view()],
                pool.pressure.write().view(),
                caps.r_format,
            );
            pool.pressure.swap();
        }

        kernels.gradient_subtract.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&texel),
            &kernels.sampler,
            &[pool.pressure.read().view(), pool.velocity.read().view()],
            pool.velocity.write().view(),
            caps.rg_format,
        );
        pool.velocity.swap();

        // Queued impulses, then the pointer's own movement splat.
        let aspect = self.width as f32 / self.height.max(1) as f32;
        let radius = splat_radius(self.config.splat_radius, aspect);
        let queued: Vec<_> = self.splats.drain().collect();
        for splat in queued {
            encode_splat(
                ctx,
                kernels,
                pool,
                &mut encoder,
                splat.position,
                splat.velocity_delta,
                splat.color,
                radius,
                aspect,
            );
        }
        if let Some((position, delta, color)) = self.input.take_movement() {
            let color = if self.passes.colorful {
                self.cycler.color()
            } else {
                color
            };
            encode_splat(
                ctx,
                kernels,
                pool,
                &mut encoder,
                position,
                delta * self.config.splat_force,
                color,
                radius,
                aspect,
            );
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Composites the dye field (plus enabled bloom/sunrays contributions)
    /// into `target`, which must match the engine's output format.
    pub fn render(&self, target: &wgpu::TextureView) {
        self.render_sized(target, self.width, self.height);
    }

    fn render_sized(&self, target: &wgpu::TextureView, width: u32, height: u32) {
        let Some(res) = self.resources.as_ref() else {
            return;
        };
        let kernels = &res.kernels;
        let pool = &res.pool;
        let ctx = &self.ctx;

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render"),
            });

        if self.passes.bloom {
            apply_bloom(ctx, kernels, pool, &self.config, &mut encoder);
        }
        if self.passes.sunrays {
            apply_sunrays(ctx, kernels, pool, &self.config, &mut encoder);
        }

        let mut flags = 0;
        if self.passes.shading {
            flags |= DISPLAY_SHADING;
        }
        if self.passes.bloom {
            flags |= DISPLAY_BLOOM;
        }
        if self.passes.sunrays {
            flags |= DISPLAY_SUNRAYS;
        }
        if !self.config.transparent {
            flags |= DISPLAY_OPAQUE;
        }
        let uniforms = DisplayUniforms {
            texel_size: [1.0 / width as f32, 1.0 / height as f32],
            flags,
            _pad: 0,
            back_color: self.config.back_color,
            _pad2: 0.0,
        };
        kernels.display.encode(
            &ctx.device,
            &mut encoder,
            bytes_of(&uniforms),
            &kernels.sampler,
            &[
                pool.dye.read().view(),
                pool.bloom.view(),
                pool.sunrays.view(),
            ],
            target,
            self.output_format,
        );

        ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Renders the composite at the configured capture resolution and reads
    /// it back as RGBA8.
    pub fn capture(&self) -> Result<CaptureImage, FluidError> {
        if self.is_disposed() {
            return Err(FluidError::Disposed);
        }
        let format = self.output_format;
        if readback::bytes_per_pixel(format) != Some(4) {
            return Err(FluidError::Readback(format!(
                "cannot capture {format:?} as RGBA8"
            )));
        }
        let size = resolve_resolution(self.config.capture_resolution, self.width, self.height);
        let frame = FieldBuffer::create(
            &self.ctx.device,
            "capture",
            size.width,
            size.height,
            format,
        );
        self.render_sized(frame.view(), size.width, size.height);
        let mut pixels = readback::read_texture(&self.ctx, frame.texture())?;
        if matches!(
            format,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        ) {
            for px in pixels.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        Ok(CaptureImage {
            width: size.width,
            height: size.height,
            pixels,
        })
    }
}

/// Radius in texcoord space, widened on wide screens so splats stay round.
fn splat_radius(config_radius: f32, aspect: f32) -> f32 {
    let radius = config_radius / 100.0;
    if aspect > 1.0 {
        radius * aspect
    } else {
        radius
    }
}

#[allow(clippy::too_many_arguments)]
fn encode_splat(
    ctx: &GpuContext,
    kernels: &KernelLibrary,
    pool: &mut SurfacePool,
    encoder: &mut wgpu::CommandEncoder,
    position: Vec2,
    velocity_delta: Vec2,
    color: Vec3,
    radius: f32,
    aspect: f32,
) {
    let uniforms = SplatUniforms {
        point: position.into(),
        radius,
        aspect_ratio: aspect,
        color: [velocity_delta.x, velocity_delta.y, 0.0],
        _pad: 0.0,
    };
    kernels.splat.encode(
        &ctx.device,
        encoder,
        bytes_of(&uniforms),
        &kernels.sampler,
        &[pool.velocity.read().view()],
        pool.velocity.write().view(),
        ctx.caps.rg_format,
    );
    pool.velocity.swap();

    let uniforms = SplatUniforms {
        point: position.into(),
        radius,
        aspect_ratio: aspect,
        color: color.into(),
        _pad: 0.0,
    };
    kernels.splat.encode(
        &ctx.device,
        encoder,
        bytes_of(&uniforms),
        &kernels.sampler,
        &[pool.dye.read().view()],
        pool.dye.write().view(),
        ctx.caps.rgba_format,
    );
    pool.dye.swap();
}

/// Prefilter the dye, blur down the halved chain, accumulate back up and
/// gather into the bloom target.
fn apply_bloom(
    ctx: &GpuContext,
    kernels: &KernelLibrary,
    pool: &SurfacePool,
    config: &crate::config::SimulationConfig,
    encoder: &mut wgpu::CommandEncoder,
) {
    if pool.bloom_chain.len() < 2 {
        return;
    }
    let rgba = ctx.caps.rgba_format;

    let knee = config.bloom_threshold * config.bloom_soft_knee + 0.0001;
    let uniforms = BloomPrefilterUniforms {
        curve: [config.bloom_threshold - knee, knee * 2.0, 0.25 / knee],
        threshold: config.bloom_threshold,
    };
    kernels.bloom_prefilter.encode(
        &ctx.device,
        encoder,
        bytes_of(&uniforms),
        &kernels.sampler,
        &[pool.dye.read().view()],
        pool.bloom.view(),
        rgba,
    );

    let mut last: &FieldBuffer = &pool.bloom;
    for dest in &pool.bloom_chain {
        let uniforms = TexelUniforms {
            texel_size: last.texel_size().into(),
            _pad: [0.0; 2],
        };
        kernels.bloom_blur.encode(
            &ctx.device,
            encoder,
            bytes_of(&uniforms),
            &kernels.sampler,
            &[last.view()],
            dest.view(),
            rgba,
        );
        last = dest;
    }
    for base in pool.bloom_chain[..pool.bloom_chain.len() - 1].iter().rev() {
        let uniforms = TexelUniforms {
            texel_size: last.texel_size().into(),
            _pad: [0.0; 2],
        };
        kernels.bloom_blur_add.encode(
            &ctx.device,
            encoder,
            bytes_of(&uniforms),
            &kernels.sampler,
            &[last.view()],
            base.view(),
            rgba,
        );
        last = base;
    }
    let uniforms = BloomFinalUniforms {
        texel_size: last.texel_size().into(),
        intensity: config.bloom_intensity,
        _pad: 0.0,
    };
    kernels.bloom_final.encode(
        &ctx.device,
        encoder,
        bytes_of(&uniforms),
        &kernels.sampler,
        &[last.view()],
        pool.bloom.view(),
        rgba,
    );
}

/// Occlusion mask into the dye scratch target, radial march into the
/// sunrays field, then a separable blur to soften the shafts.
fn apply_sunrays(
    ctx: &GpuContext,
    kernels: &KernelLibrary,
    pool: &SurfacePool,
    config: &crate::config::SimulationConfig,
    encoder: &mut wgpu::CommandEncoder,
) {
    let caps = &ctx.caps;
    kernels.sunrays_mask.encode(
        &ctx.device,
        encoder,
        &[],
        &kernels.sampler,
        &[pool.dye.read().view()],
        pool.dye.write().view(),
        caps.rgba_format,
    );
    let uniforms = SunraysUniforms {
        weight: config.sunrays_weight,
        _pad: [0.0; 3],
    };
    kernels.sunrays.encode(
        &ctx.device,
        encoder,
        bytes_of(&uniforms),
        &kernels.sampler,
        &[pool.dye.write().view()],
        pool.sunrays.view(),
        caps.r_format,
    );

    let texel = pool.sunrays.texel_size();
    let horizontal = TexelUniforms {
        texel_size: [texel.x, 0.0],
        _pad: [0.0; 2],
    };
    kernels.blur.encode(
        &ctx.device,
        encoder,
        bytes_of(&horizontal),
        &kernels.sampler,
        &[pool.sunrays.view()],
        pool.sunrays_temp.view(),
        caps.r_format,
    );
    let vertical = TexelUniforms {
        texel_size: [0.0, texel.y],
        _pad: [0.0; 2],
    };
    kernels.blur.encode(
        &ctx.device,
        encoder,
        bytes_of(&vertical),
        &kernels.sampler,
        &[pool.sunrays_temp.view()],
        pool.sunrays.view(),
        caps.r_format,
    );
}
