//! The engine handle: owns config, GPU resources, pointer state and the
//! splat queue, and exposes the lifecycle and event-sink surface that page
//! collaborators call into.

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::color::ColorCycler;
use crate::config::{ConfigOverrides, PassSet, SimulationConfig};
use crate::error::FluidError;
use crate::gpu::kernels::KernelLibrary;
use crate::gpu::surface::SurfacePool;
use crate::gpu::GpuContext;
use crate::input::{InputAdapter, Splat, SplatQueue};

/// Upper bound on the advection timestep. Explicit Euler back-tracing goes
/// unstable when a stalled frame hands us a large elapsed time.
pub const MAX_DT: f32 = 1.0 / 60.0;

/// GPU state released on `dispose`.
pub(crate) struct EngineResources {
    pub kernels: KernelLibrary,
    pub pool: SurfacePool,
}

/// RGBA8 snapshot produced by `capture`.
pub struct CaptureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub struct FluidEngine {
    pub(crate) ctx: GpuContext,
    pub(crate) config: SimulationConfig,
    pub(crate) passes: PassSet,
    pub(crate) resources: Option<EngineResources>,
    pub(crate) input: InputAdapter,
    pub(crate) splats: SplatQueue,
    pub(crate) cycler: ColorCycler,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) output_format: wgpu::TextureFormat,
    running: bool,
    pub(crate) last_dt: f32,
}

impl FluidEngine {
    /// Builds kernels and field buffers for the given output size and
    /// format. Applies the capability downgrade before anything is
    /// allocated, so a reduced tier never sees the full-size dye grid.
    pub fn new(
        ctx: GpuContext,
        width: u32,
        height: u32,
        output_format: wgpu::TextureFormat,
        overrides: &ConfigOverrides,
    ) -> Result<Self, FluidError> {
        let mut config = SimulationConfig::with_overrides(overrides);
        if !ctx.caps.linear_filtering {
            config.downgrade_without_linear_filtering();
        }
        let passes = config.pass_set();
        let kernels = KernelLibrary::new(&ctx, output_format)?;
        let pool = SurfacePool::allocate(&ctx, &config, width, height);
        let cycler = ColorCycler::with_hue(rand::thread_rng().gen::<f32>(), config.color_update_speed);

        Ok(Self {
            ctx,
            passes,
            resources: Some(EngineResources { kernels, pool }),
            input: InputAdapter::new(width, height),
            splats: SplatQueue::default(),
            cycler,
            width,
            height,
            output_format,
            running: false,
            last_dt: 0.0,
            config,
        })
    }

    pub fn start(&mut self) {
        if !self.is_disposed() {
            self.running = true;
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Releases every GPU resource. Final: all later calls are no-ops, so a
    /// frame callback still in flight cannot touch freed state.
    pub fn dispose(&mut self) {
        self.running = false;
        self.resources = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.resources.is_none()
    }

    /// Reallocates size-dependent targets; a call with the current size is a
    /// no-op.
    pub fn resize(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        self.width = width;
        self.height = height;
        self.input.set_surface_size(width, height);
        let Some(res) = self.resources.as_mut() else {
            return;
        };
        res.pool.resize(
            &self.ctx,
            &res.kernels.copy,
            &res.kernels.sampler,
            &self.config,
            width,
            height,
        );
    }

    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        self.input.on_pointer_move(x, y);
    }

    pub fn on_pointer_down(&mut self) {
        self.input.on_pointer_down(self.cycler.color());
    }

    pub fn on_pointer_up(&mut self) {
        self.input.on_pointer_up();
    }

    /// Programmatic impulse at normalized position `(x, y)` with velocity
    /// delta `(dx, dy)`.
    pub fn queue_splat(&mut self, x: f32, y: f32, dx: f32, dy: f32, color: [f32; 3]) {
        self.splats.push(Splat {
            position: Vec2::new(x, y),
            velocity_delta: Vec2::new(dx, dy),
            color: Vec3::from_array(color),
        });
    }

    /// Queues `count` random splats, the page-load/click burst effect.
    pub fn splat_burst(&mut self, count: usize) {
        let mut rng = rand::thread_rng();
        for _ in 0..count {
            let color = crate::color::hsv_to_rgb(rng.gen(), 1.0, 1.0) * 1.5;
            self.splats.push(Splat {
                position: Vec2::new(rng.gen(), rng.gen()),
                velocity_delta: Vec2::new(
                    1000.0 * (rng.gen::<f32>() - 0.5),
                    1000.0 * (rng.gen::<f32>() - 0.5),
                ),
                color,
            });
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn passes(&self) -> PassSet {
        self.passes
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// The clamped timestep used by the most recent `advance`.
    pub fn last_dt(&self) -> f32 {
        self.last_dt
    }

    pub fn pending_splats(&self) -> usize {
        self.splats.len()
    }

    /// Live field buffers, for diagnostics and tests. `None` once disposed.
    pub fn pool(&self) -> Option<&SurfacePool> {
        self.resources.as_ref().map(|r| &r.pool)
    }
}
